//! Error taxonomy for template evaluation and stack orchestration.

use crate::provider::{Operation, ProviderError};
use std::time::Duration;
use thiserror::Error;

/// Intrinsic-function resolution failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// A declared parameter was referenced but no value was supplied.
    #[error("parameter '{0}' is not set")]
    ParameterNotSet(String),

    /// `Ref` target is neither a parameter, a resource, nor a pseudo-parameter.
    #[error("unresolvable reference '{0}'")]
    UnresolvableReference(String),

    /// Function argument has the wrong shape.
    #[error("malformed arguments for {function}: {detail}")]
    MalformedArguments {
        function: &'static str,
        detail: String,
    },

    /// Function argument evaluated to something other than a string.
    #[error("{function} expects a string argument, got {found}")]
    NonStringArgument {
        function: &'static str,
        found: String,
    },

    /// `FindInMap` used on a template without a `mappings` section.
    #[error("template has no mappings section, '{0}' requested")]
    NoMappings(String),

    /// `FindInMap` named a map that is not declared.
    #[error("no mapping named '{0}'")]
    UnknownMap(String),

    /// First-level key missing from a map.
    #[error("no key '{key}' in mapping '{map}'")]
    UnknownTopKey { map: String, key: String },

    /// Second-level key missing from a map entry.
    #[error("no key '{key}' in mapping '{map}/{top_key}'")]
    UnknownSecondKey {
        map: String,
        top_key: String,
        key: String,
    },

    /// A level of the mapping lookup held a non-mapping value.
    #[error("'{path}' is not a mapping")]
    NotAMapping { path: String },

    /// Function recognised but deliberately unsupported.
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    /// Expression tree nests deeper than the configured bound.
    #[error("expression nesting exceeds maximum depth {0}")]
    DepthExceeded(usize),
}

/// Failure of a top-level stack operation.
#[derive(Error, Debug)]
pub enum StackError {
    /// Template body is not valid JSON.
    #[error("template is not valid JSON: {0}")]
    TemplateParse(#[from] serde_json::Error),

    /// Template document shape is unsupported.
    #[error("template invalid: {0}")]
    TemplateInvalid(String),

    /// Evaluating a resource declaration failed.
    #[error("evaluating resource '{resource}': {source}")]
    Eval {
        resource: String,
        #[source]
        source: EvalError,
    },

    /// A provisioning call failed.
    #[error("{operation} failed for '{resource}': {source}")]
    Provider {
        resource: String,
        operation: Operation,
        #[source]
        source: ProviderError,
    },

    /// Instance reached a terminal state other than running.
    #[error("instance {instance_id} for '{resource}' entered state '{state}'")]
    InstanceFailed {
        resource: String,
        instance_id: String,
        state: String,
    },

    /// Readiness wait exceeded the caller's bound.
    #[error("timed out after {timeout:?} waiting for '{resource}' ({instance_id})")]
    Timeout {
        resource: String,
        instance_id: String,
        timeout: Duration,
    },

    /// Describe query against an unknown stack.
    #[error("stack '{0}' not found")]
    NotFound(String),

    /// Stack identifier already registered.
    #[error("stack '{0}' already exists")]
    AlreadyExists(String),

    /// Stack identifier does not match the accepted pattern.
    #[error("invalid stack id '{0}': must start with a letter and contain only letters, digits, '_', and '-'")]
    InvalidStackId(String),
}

impl StackError {
    /// Wrap an evaluation failure with the logical resource it came from.
    pub fn eval(resource: &str, source: EvalError) -> Self {
        Self::Eval {
            resource: resource.to_string(),
            source,
        }
    }

    /// True for failures of the readiness wait bound.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
