//! Append-only JSONL export of stack events.

use super::types::{Event, ResourceStatus};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// One line of the exported log.
#[derive(Debug, Serialize)]
struct EventRecord<'a> {
    stack_id: &'a str,
    #[serde(flatten)]
    event: &'a Event,
}

/// Append events for a stack to a JSONL file, creating parent directories.
pub fn append_events(path: &Path, stack_id: &str, events: &[Event]) -> Result<(), String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| format!("cannot create log dir: {}", e))?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("cannot open event log {}: {}", path.display(), e))?;

    for event in events {
        let json = serde_json::to_string(&EventRecord { stack_id, event })
            .map_err(|e| format!("JSON serialize error: {}", e))?;
        writeln!(file, "{}", json).map_err(|e| format!("write error: {}", e))?;
    }
    Ok(())
}

/// Count of events per status, for the CLI summary line.
pub fn status_counts(events: &[Event]) -> [(ResourceStatus, usize); 3] {
    let count = |s: ResourceStatus| events.iter().filter(|e| e.status == s).count();
    [
        (ResourceStatus::CreateInProgress, count(ResourceStatus::CreateInProgress)),
        (ResourceStatus::CreateComplete, count(ResourceStatus::CreateComplete)),
        (ResourceStatus::CreateFailed, count(ResourceStatus::CreateFailed)),
    ]
}
