//! Stack registry: owns every stack, its events, and realized resources.
//!
//! One coarse `RwLock` guards the id → stack table; each stack carries its
//! own `Mutex`, so writers to different stacks never contend. Describe
//! queries return copies.

use super::error::StackError;
use super::evaluator::ResolutionContext;
use super::types::*;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// A registered stack.
#[derive(Debug)]
pub struct Stack {
    pub stack_id: String,
    pub template_hash: String,
    pub created_at: DateTime<Utc>,
    /// Random name suffix, fixed for the stack's lifetime
    pub suffix: String,
    /// Set once the template has validated
    context: Option<Arc<ResolutionContext>>,
    events: Vec<Event>,
    resources: Vec<RealizedResource>,
}

impl Stack {
    pub fn new(stack_id: &str, template_hash: &str, suffix: &str) -> Self {
        Self {
            stack_id: stack_id.to_string(),
            template_hash: template_hash.to_string(),
            created_at: Utc::now(),
            suffix: suffix.to_string(),
            context: None,
            events: Vec::new(),
            resources: Vec::new(),
        }
    }

    fn is_complete(&self) -> bool {
        self.events
            .iter()
            .any(|e| e.is_stack_event() && e.status == ResourceStatus::CreateComplete)
    }
}

/// Shared handle to one registered stack.
#[derive(Debug, Clone)]
pub struct StackHandle {
    inner: Arc<Mutex<Stack>>,
}

impl StackHandle {
    fn lock(&self) -> MutexGuard<'_, Stack> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_context(&self, context: ResolutionContext) -> Arc<ResolutionContext> {
        let context = Arc::new(context);
        self.lock().context = Some(context.clone());
        context
    }

    pub fn context(&self) -> Option<Arc<ResolutionContext>> {
        self.lock().context.clone()
    }

    pub fn record_event(&self, logical_id: &str, resource_type: &str, status: ResourceStatus) {
        self.lock()
            .events
            .push(Event::now(logical_id, resource_type, status));
    }

    pub fn record_resource(&self, logical_id: &str, physical_id: &str, resource_type: &str) {
        self.lock().resources.push(RealizedResource {
            logical_id: logical_id.to_string(),
            physical_id: physical_id.to_string(),
            resource_type: resource_type.to_string(),
        });
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    pub fn resources(&self) -> Vec<RealizedResource> {
        self.lock().resources.clone()
    }

    pub fn summary(&self) -> StackSummary {
        let stack = self.lock();
        StackSummary {
            stack_id: stack.stack_id.clone(),
            template_hash: stack.template_hash.clone(),
            created_at: stack.created_at,
            suffix: stack.suffix.clone(),
            complete: stack.is_complete(),
            events: stack.events.len(),
            resources: stack.resources.len(),
        }
    }
}

/// Owner of all stacks.
#[derive(Debug, Default)]
pub struct StackRegistry {
    stacks: RwLock<HashMap<String, StackHandle>>,
}

impl StackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new stack. An existing id is rejected, never replaced.
    pub fn register(&self, stack: Stack) -> Result<StackHandle, StackError> {
        let mut stacks = self.stacks.write().unwrap_or_else(PoisonError::into_inner);
        if stacks.contains_key(&stack.stack_id) {
            return Err(StackError::AlreadyExists(stack.stack_id));
        }
        let id = stack.stack_id.clone();
        let handle = StackHandle {
            inner: Arc::new(Mutex::new(stack)),
        };
        stacks.insert(id, handle.clone());
        Ok(handle)
    }

    pub fn get(&self, stack_id: &str) -> Result<StackHandle, StackError> {
        self.stacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(stack_id)
            .cloned()
            .ok_or_else(|| StackError::NotFound(stack_id.to_string()))
    }

    pub fn describe_stack_events(&self, stack_id: &str) -> Result<Vec<Event>, StackError> {
        Ok(self.get(stack_id)?.events())
    }

    pub fn describe_stack_resources(
        &self,
        stack_id: &str,
    ) -> Result<Vec<RealizedResource>, StackError> {
        Ok(self.get(stack_id)?.resources())
    }

    pub fn describe_stack(&self, stack_id: &str) -> Result<StackSummary, StackError> {
        Ok(self.get(stack_id)?.summary())
    }
}
