//! In-process simulated provider.
//!
//! Keeps groups and instances in memory, journals every call, and follows a
//! scripted lifecycle for launched instances. Failures can be injected per
//! operation.

use super::*;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// How launched instances progress when polled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceScript {
    /// Pending for `n` polls, then running
    RunningAfter(u32),
    AlwaysPending,
    /// Pending for `n` polls, then the given terminal state
    FailAfter(u32, String),
}

impl Default for InstanceScript {
    fn default() -> Self {
        Self::RunningAfter(1)
    }
}

/// One recorded provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    CreateSecurityGroup {
        name: String,
        description: String,
        vpc_id: Option<String>,
    },
    AuthorizeIngress {
        group_id: String,
        rule: IngressRule,
    },
    ListSecurityGroups,
    RunInstances(RunInstancesRequest),
    GetInstanceStatus {
        instance_id: String,
    },
    AddTag {
        instance_id: String,
        key: String,
        value: String,
    },
}

#[derive(Debug)]
struct SimInstance {
    polls: u32,
    tags: Vec<(String, String)>,
}

#[derive(Debug, Default)]
struct MemoryState {
    groups: Vec<SecurityGroup>,
    instances: HashMap<String, SimInstance>,
    journal: Vec<ProviderCall>,
    failing: HashSet<Operation>,
    next_id: u64,
}

impl MemoryState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{:08x}", prefix, self.next_id)
    }

    fn check(&self, operation: Operation) -> Result<(), ProviderError> {
        if self.failing.contains(&operation) {
            return Err(ProviderError::Rejected {
                operation,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

/// Simulated provider backed by in-memory state.
#[derive(Debug)]
pub struct MemoryProvider {
    region: String,
    script: InstanceScript,
    state: Mutex<MemoryState>,
}

impl MemoryProvider {
    pub fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
            script: InstanceScript::default(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub fn with_script(mut self, script: InstanceScript) -> Self {
        self.script = script;
        self
    }

    /// Make every call of `operation` fail.
    pub fn with_failure(self, operation: Operation) -> Self {
        self.lock().failing.insert(operation);
        self
    }

    /// Calls made so far, in order.
    pub fn journal(&self) -> Vec<ProviderCall> {
        self.lock().journal.clone()
    }

    pub fn groups(&self) -> Vec<SecurityGroup> {
        self.lock().groups.clone()
    }

    /// Tags applied to an instance, in order.
    pub fn instance_tags(&self, instance_id: &str) -> Vec<(String, String)> {
        self.lock()
            .instances
            .get(instance_id)
            .map(|i| i.tags.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status_after(&self, polls: u32) -> InstanceStatus {
        match &self.script {
            InstanceScript::RunningAfter(n) if polls > *n => InstanceStatus::Running,
            InstanceScript::FailAfter(n, state) if polls > *n => InstanceStatus::Other(state.clone()),
            _ => InstanceStatus::Pending,
        }
    }
}

impl Provider for MemoryProvider {
    fn region(&self) -> &str {
        &self.region
    }

    fn create_security_group(
        &self,
        name: &str,
        description: &str,
        vpc_id: Option<&str>,
    ) -> Result<SecurityGroup, ProviderError> {
        let mut state = self.lock();
        state.journal.push(ProviderCall::CreateSecurityGroup {
            name: name.to_string(),
            description: description.to_string(),
            vpc_id: vpc_id.map(str::to_string),
        });
        state.check(Operation::CreateSecurityGroup)?;
        if state.groups.iter().any(|g| g.name == name) {
            return Err(ProviderError::DuplicateGroup(name.to_string()));
        }
        let group = SecurityGroup {
            id: state.next_id("sg"),
            name: name.to_string(),
        };
        state.groups.push(group.clone());
        Ok(group)
    }

    fn authorize_ingress(
        &self,
        group: &SecurityGroup,
        rule: &IngressRule,
    ) -> Result<(), ProviderError> {
        let mut state = self.lock();
        state.journal.push(ProviderCall::AuthorizeIngress {
            group_id: group.id.clone(),
            rule: rule.clone(),
        });
        state.check(Operation::AuthorizeIngress)?;
        if !state.groups.iter().any(|g| g.id == group.id) {
            return Err(ProviderError::UnknownGroup(group.id.clone()));
        }
        Ok(())
    }

    fn list_security_groups(&self) -> Result<Vec<SecurityGroup>, ProviderError> {
        let mut state = self.lock();
        state.journal.push(ProviderCall::ListSecurityGroups);
        state.check(Operation::ListSecurityGroups)?;
        Ok(state.groups.clone())
    }

    fn run_instances(&self, request: &RunInstancesRequest) -> Result<Reservation, ProviderError> {
        let mut state = self.lock();
        state.journal.push(ProviderCall::RunInstances(request.clone()));
        state.check(Operation::RunInstances)?;
        for id in request.security_group_ids.iter().flatten() {
            if !state.groups.iter().any(|g| &g.id == id) {
                return Err(ProviderError::UnknownGroup(id.clone()));
            }
        }
        let instance_id = state.next_id("i");
        state.instances.insert(
            instance_id.clone(),
            SimInstance {
                polls: 0,
                tags: Vec::new(),
            },
        );
        Ok(Reservation {
            id: state.next_id("r"),
            instances: vec![InstanceHandle { id: instance_id }],
        })
    }

    fn get_instance_status(
        &self,
        instance: &InstanceHandle,
    ) -> Result<InstanceStatus, ProviderError> {
        let mut state = self.lock();
        state.journal.push(ProviderCall::GetInstanceStatus {
            instance_id: instance.id.clone(),
        });
        state.check(Operation::GetInstanceStatus)?;
        let sim = state
            .instances
            .get_mut(&instance.id)
            .ok_or_else(|| ProviderError::UnknownInstance(instance.id.clone()))?;
        sim.polls += 1;
        let polls = sim.polls;
        drop(state);
        Ok(self.status_after(polls))
    }

    fn add_tag(
        &self,
        instance: &InstanceHandle,
        key: &str,
        value: &str,
    ) -> Result<(), ProviderError> {
        let mut state = self.lock();
        state.journal.push(ProviderCall::AddTag {
            instance_id: instance.id.clone(),
            key: key.to_string(),
            value: value.to_string(),
        });
        state.check(Operation::AddTag)?;
        let sim = state
            .instances
            .get_mut(&instance.id)
            .ok_or_else(|| ProviderError::UnknownInstance(instance.id.clone()))?;
        sim.tags.push((key.to_string(), value.to_string()));
        Ok(())
    }
}
