//! CLI subcommands: validate, resolve, create.

use crate::core::evaluator::{self, ResolutionContext};
use crate::core::namer::ResourceNamer;
use crate::core::orchestrator::StackManager;
use crate::core::{eventlog, parser, types};
use crate::provider::memory::MemoryProvider;
use clap::Subcommand;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a template without creating anything
    Validate {
        /// Path to the JSON template
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Evaluate every resource and print the resolved declarations
    Resolve {
        /// Path to the JSON template
        #[arg(short, long)]
        file: PathBuf,

        /// Stack id used for generated names
        #[arg(long)]
        stack: String,

        /// Parameter value (repeatable)
        #[arg(short = 'p', long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Settings file (YAML)
        #[arg(long)]
        settings: Option<PathBuf>,
    },

    /// Create a stack against the simulated provider
    Create {
        /// Path to the JSON template
        #[arg(short, long)]
        file: PathBuf,

        /// Stack id
        #[arg(long)]
        stack: String,

        /// Parameter value (repeatable)
        #[arg(short = 'p', long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Seconds to wait for instances to become ready
        #[arg(long, default_value_t = 600)]
        timeout_secs: u64,

        /// Settings file (YAML)
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Append stack events to this JSONL file
        #[arg(long)]
        events_out: Option<PathBuf>,
    },
}

/// Parse a `KEY=VALUE` parameter argument.
pub fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Resolve {
            file,
            stack,
            params,
            settings,
        } => cmd_resolve(&file, &stack, &params, settings.as_deref()),
        Commands::Create {
            file,
            stack,
            params,
            timeout_secs,
            settings,
            events_out,
        } => cmd_create(
            &file,
            &stack,
            &params,
            Duration::from_secs(timeout_secs),
            settings.as_deref(),
            events_out.as_deref(),
        ),
    }
}

fn load_settings(path: Option<&Path>) -> Result<types::Settings, String> {
    match path {
        Some(p) => parser::load_settings(p),
        None => Ok(types::Settings::default()),
    }
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let body = parser::read_template_file(file)?;
    let doc = parser::parse_template(&body).map_err(|e| e.to_string())?;
    let errors = parser::validate_template(&doc);

    if !errors.is_empty() {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        return Err(format!("{} validation error(s)", errors.len()));
    }

    let template = parser::prepare_template(&doc).map_err(|e| e.to_string())?;
    println!(
        "OK: {} ({} parameters, {} resources, {})",
        file.display(),
        template.parameters.len(),
        template.resources.len(),
        parser::fingerprint(&body)
    );
    Ok(())
}

fn cmd_resolve(
    file: &Path,
    stack_id: &str,
    params: &[(String, String)],
    settings: Option<&Path>,
) -> Result<(), String> {
    let settings = load_settings(settings)?;
    parser::validate_stack_id(stack_id).map_err(|e| e.to_string())?;
    let body = parser::read_template_file(file)?;
    let doc = parser::parse_template(&body).map_err(|e| e.to_string())?;
    let template = parser::prepare_template(&doc).map_err(|e| e.to_string())?;
    let values = parser::check_parameters(&template, params).map_err(|e| e.to_string())?;

    let ctx = ResolutionContext::new(
        template,
        values,
        ResourceNamer::generate(stack_id, settings.suffix_len),
        &settings.region,
        settings.max_eval_depth,
    );
    let resolved = evaluator::resolve_all(&ctx).map_err(|e| e.to_string())?;
    let json = serde_json::to_string_pretty(&resolved)
        .map_err(|e| format!("JSON serialize error: {}", e))?;
    println!("{}", json);
    Ok(())
}

fn cmd_create(
    file: &Path,
    stack_id: &str,
    params: &[(String, String)],
    timeout: Duration,
    settings: Option<&Path>,
    events_out: Option<&Path>,
) -> Result<(), String> {
    let settings = load_settings(settings)?;
    let body = parser::read_template_file(file)?;
    let manager = StackManager::new(MemoryProvider::new(&settings.region), settings);

    let result = manager.create_stack(stack_id, &body, params, timeout);

    // A stack that never registered (bad id, bad JSON) has nothing to show
    if let Ok(events) = manager.describe_stack_events(stack_id) {
        if let Ok(summary) = manager.describe_stack(stack_id) {
            print_summary(&summary);
        }
        print_events(&events);
        if let Ok(resources) = manager.describe_stack_resources(stack_id) {
            print_resources(&resources);
        }
        if let Some(path) = events_out {
            eventlog::append_events(path, stack_id, &events)?;
        }
    }

    result.map_err(|e| e.to_string())?;
    println!();
    println!("Stack {} created.", stack_id);
    Ok(())
}

fn print_summary(summary: &types::StackSummary) {
    let state = if summary.complete { "complete" } else { "incomplete" };
    println!(
        "Stack {} ({}), created {}, suffix {}, {}",
        summary.stack_id,
        state,
        summary.created_at.format("%Y-%m-%dT%H:%M:%SZ"),
        summary.suffix,
        summary.template_hash
    );
}

fn print_events(events: &[types::Event]) {
    println!("Events:");
    for e in events {
        println!(
            "  {} {:<20} {:<16} {}",
            e.timestamp.format("%H:%M:%S%.3f"),
            e.logical_id,
            e.resource_type,
            e.status
        );
    }
    let counts = eventlog::status_counts(events)
        .iter()
        .map(|(status, n)| format!("{} {}", n, status))
        .collect::<Vec<_>>()
        .join(", ");
    println!("  ({})", counts);
}

fn print_resources(resources: &[types::RealizedResource]) {
    println!("Resources:");
    if resources.is_empty() {
        println!("  (none)");
    }
    for r in resources {
        println!("  {:<20} {:<16} {}", r.logical_id, r.resource_type, r.physical_id);
    }
}
