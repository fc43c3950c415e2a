//! Template, stack, and event types.
//!
//! Templates are JSON documents; resource declarations stay as raw
//! `serde_json::Value` trees until the evaluator reduces them. Once
//! evaluated, properties of the recognised resource types deserialize into
//! typed structs.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// The only accepted `format-version`.
pub const FORMAT_VERSION: &str = "2010-09-09";

/// Permitted top-level template keys.
pub const TOP_LEVEL_KEYS: [&str; 6] = [
    "description",
    "parameters",
    "format-version",
    "outputs",
    "resources",
    "mappings",
];

/// Top-level keys that must be present.
pub const REQUIRED_KEYS: [&str; 2] = ["format-version", "resources"];

/// Resource type used for stack-level events.
pub const STACK_TYPE: &str = "stack";

/// Pseudo-parameter resolving to the provider's region identity.
pub const REGION_PSEUDO_PARAMETER: &str = "Stack::Region";

// ============================================================================
// Template
// ============================================================================

/// Parsed, validated template document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "format-version")]
    pub format_version: String,

    /// Accepted in any shape, never interpreted
    #[serde(default)]
    pub description: Option<Value>,

    /// Parameter declarations (name → declaration body)
    #[serde(default)]
    pub parameters: IndexMap<String, Value>,

    /// Resource declarations in document order
    pub resources: IndexMap<String, Value>,

    /// Kept raw so lookups can report a malformed section precisely
    #[serde(default)]
    pub mappings: Option<Value>,

    #[serde(default)]
    pub outputs: Option<Value>,
}

// ============================================================================
// Resources
// ============================================================================

/// Resource kinds the orchestrator acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    SecurityGroup,
    Instance,
    /// Evaluated but otherwise inert
    Other(String),
}

impl ResourceKind {
    pub fn from_type(type_name: &str) -> Self {
        match type_name {
            "security-group" => Self::SecurityGroup,
            "instance" => Self::Instance,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SecurityGroup => write!(f, "security-group"),
            Self::Instance => write!(f, "instance"),
            Self::Other(name) => write!(f, "{}", name),
        }
    }
}

/// A resource declaration after evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedResource {
    pub logical_id: String,
    /// Generated external name
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub properties: serde_json::Map<String, Value>,
}

impl ResolvedResource {
    pub fn kind(&self) -> ResourceKind {
        ResourceKind::from_type(&self.resource_type)
    }
}

/// Single string or list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringList {
    Single(String),
    Multiple(Vec<String>),
}

impl StringList {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::Single(s) => vec![s.clone()],
            Self::Multiple(v) => v.clone(),
        }
    }
}

/// Properties of a `security-group` resource.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SecurityGroupProperties {
    #[serde(default)]
    pub group_description: Option<String>,

    #[serde(default)]
    pub vpc_id: Option<String>,

    #[serde(default)]
    pub security_group_ingress: Vec<IngressRule>,
}

/// One ingress rule. Ports accept numbers or numeric strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IngressRule {
    pub ip_protocol: String,
    #[serde(deserialize_with = "de_port")]
    pub from_port: i32,
    #[serde(deserialize_with = "de_port")]
    pub to_port: i32,
    pub cidr_ip: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(i64),
    Text(String),
}

fn de_port<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
    use serde::de::Error;
    let raw = match PortValue::deserialize(deserializer)? {
        PortValue::Number(n) => n,
        PortValue::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| D::Error::custom(format!("invalid port '{}'", s)))?,
    };
    i32::try_from(raw).map_err(|_| D::Error::custom(format!("port {} out of range", raw)))
}

/// Properties of an `instance` resource.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InstanceProperties {
    pub image_id: String,

    #[serde(default)]
    pub instance_type: Option<String>,

    #[serde(default)]
    pub key_name: Option<String>,

    #[serde(default)]
    pub subnet_id: Option<String>,

    /// Group names (classic placement)
    #[serde(default)]
    pub security_groups: Option<StringList>,

    /// Group names or ids, resolved to ids before launch
    #[serde(default)]
    pub security_group_ids: Option<StringList>,

    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// Key/value tag applied to an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

// ============================================================================
// Events and realized resources
// ============================================================================

/// Creation status carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceStatus {
    CreateInProgress,
    CreateComplete,
    CreateFailed,
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateInProgress => write!(f, "CREATE_IN_PROGRESS"),
            Self::CreateComplete => write!(f, "CREATE_COMPLETE"),
            Self::CreateFailed => write!(f, "CREATE_FAILED"),
        }
    }
}

/// Immutable, timestamped progress record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Stack id for stack-level events, logical name otherwise
    pub logical_id: String,
    pub resource_type: String,
    pub status: ResourceStatus,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn now(logical_id: &str, resource_type: &str, status: ResourceStatus) -> Self {
        Self {
            logical_id: logical_id.to_string(),
            resource_type: resource_type.to_string(),
            status,
            timestamp: Utc::now(),
        }
    }

    pub fn is_stack_event(&self) -> bool {
        self.resource_type == STACK_TYPE
    }
}

/// A resource the provider confirmed as created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealizedResource {
    pub logical_id: String,
    pub physical_id: String,
    pub resource_type: String,
}

/// Read-only overview of a registered stack.
#[derive(Debug, Clone, Serialize)]
pub struct StackSummary {
    pub stack_id: String,
    pub template_hash: String,
    pub created_at: DateTime<Utc>,
    pub suffix: String,
    /// True once a stack-level CREATE_COMPLETE was recorded
    pub complete: bool,
    pub events: usize,
    pub resources: usize,
}

// ============================================================================
// Settings
// ============================================================================

/// Engine tuning, loadable from YAML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Region identity reported by the simulated provider
    #[serde(default = "default_region")]
    pub region: String,

    /// Pause between readiness polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Pause after group creation and instance launch
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    #[serde(default = "default_instance_type")]
    pub default_instance_type: String,

    #[serde(default = "default_max_eval_depth")]
    pub max_eval_depth: usize,

    /// Length of the random per-stack name suffix
    #[serde(default = "default_suffix_len")]
    pub suffix_len: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            region: default_region(),
            poll_interval_ms: default_poll_interval_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            default_instance_type: default_instance_type(),
            max_eval_depth: default_max_eval_depth(),
            suffix_len: default_suffix_len(),
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.settle_delay_ms)
    }
}

fn default_region() -> String {
    "local-1".to_string()
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_settle_delay_ms() -> u64 {
    3000
}

fn default_instance_type() -> String {
    "m1.small".to_string()
}

fn default_max_eval_depth() -> usize {
    64
}

fn default_suffix_len() -> usize {
    4
}
