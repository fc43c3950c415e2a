//! Provisioning provider abstraction.
//!
//! The orchestrator talks to compute/network infrastructure only through
//! [`Provider`]. Each call is assumed atomic; no transport or retry
//! behaviour is implied.

pub mod memory;

use crate::core::types::IngressRule;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Provider operations, used for error context and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    CreateSecurityGroup,
    AuthorizeIngress,
    ListSecurityGroups,
    RunInstances,
    GetInstanceStatus,
    AddTag,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateSecurityGroup => write!(f, "create-security-group"),
            Self::AuthorizeIngress => write!(f, "authorize-ingress"),
            Self::ListSecurityGroups => write!(f, "list-security-groups"),
            Self::RunInstances => write!(f, "run-instances"),
            Self::GetInstanceStatus => write!(f, "get-instance-status"),
            Self::AddTag => write!(f, "add-tag"),
        }
    }
}

/// Failure reported by a provider call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{operation} rejected: {message}")]
    Rejected {
        operation: Operation,
        message: String,
    },

    #[error("security group '{0}' already exists")]
    DuplicateGroup(String),

    #[error("unknown security group '{0}'")]
    UnknownGroup(String),

    #[error("unknown instance '{0}'")]
    UnknownInstance(String),

    #[error("security groups not found: {}", .0.join(", "))]
    MissingGroups(Vec<String>),

    #[error("reservation '{0}' contains no instances")]
    EmptyReservation(String),
}

/// Handle to a created security group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub id: String,
    pub name: String,
}

/// Handle to a launched instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceHandle {
    pub id: String,
}

/// Result of `run_instances`; only the first instance is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: String,
    pub instances: Vec<InstanceHandle>,
}

/// Instance launch parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInstancesRequest {
    pub image_id: String,
    pub instance_type: String,
    pub key_name: Option<String>,
    pub security_groups: Option<Vec<String>>,
    pub security_group_ids: Option<Vec<String>>,
    pub subnet_id: Option<String>,
}

/// Observed instance state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceStatus {
    Pending,
    Running,
    /// Any other state, e.g. "terminated"
    Other(String),
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Other(state) => write!(f, "{}", state),
        }
    }
}

/// Narrow interface to the provisioning backend.
pub trait Provider: Send + Sync {
    /// Region/provider identity, exposed to templates as a pseudo-parameter.
    fn region(&self) -> &str;

    fn create_security_group(
        &self,
        name: &str,
        description: &str,
        vpc_id: Option<&str>,
    ) -> Result<SecurityGroup, ProviderError>;

    fn authorize_ingress(
        &self,
        group: &SecurityGroup,
        rule: &IngressRule,
    ) -> Result<(), ProviderError>;

    fn list_security_groups(&self) -> Result<Vec<SecurityGroup>, ProviderError>;

    fn run_instances(&self, request: &RunInstancesRequest) -> Result<Reservation, ProviderError>;

    fn get_instance_status(
        &self,
        instance: &InstanceHandle,
    ) -> Result<InstanceStatus, ProviderError>;

    fn add_tag(&self, instance: &InstanceHandle, key: &str, value: &str)
        -> Result<(), ProviderError>;
}
