//! Stack orchestration: phased creation and readiness wait.
//!
//! create_stack: parse → register → validate → phase 1 (security groups,
//! synchronous) → phase 2 (instances, launched without waiting) → wait
//! (poll each instance until running, bounded by the caller's timeout).
//! Any failure aborts the call; whatever was recorded stays in the registry.

use super::error::StackError;
use super::evaluator::{self, ResolutionContext};
use super::namer::ResourceNamer;
use super::parser;
use super::registry::{Stack, StackHandle, StackRegistry};
use super::types::*;
use crate::provider::{
    InstanceHandle, InstanceStatus, Operation, Provider, ProviderError, RunInstancesRequest,
};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// An instance launched in phase 2, awaiting readiness.
#[derive(Debug, Clone)]
struct LaunchedInstance {
    logical_id: String,
    name: String,
    handle: InstanceHandle,
}

/// Creates stacks through a provider and serves describe queries.
pub struct StackManager<P: Provider> {
    provider: P,
    registry: StackRegistry,
    settings: Settings,
}

impl<P: Provider> StackManager<P> {
    pub fn new(provider: P, settings: Settings) -> Self {
        Self {
            provider,
            registry: StackRegistry::new(),
            settings,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn registry(&self) -> &StackRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Create a stack from a JSON template body.
    pub fn create_stack(
        &self,
        stack_id: &str,
        template_body: &str,
        parameters: &[(String, String)],
        timeout: Duration,
    ) -> Result<(), StackError> {
        parser::validate_stack_id(stack_id)?;
        let doc = parser::parse_template(template_body)?;

        let namer = ResourceNamer::generate(stack_id, self.settings.suffix_len);
        let stack = self.registry.register(Stack::new(
            stack_id,
            &parser::fingerprint(template_body),
            namer.suffix(),
        ))?;
        stack.record_event(stack_id, STACK_TYPE, ResourceStatus::CreateInProgress);
        info!(stack = %stack_id, "stack creation started");

        let result = self.run(&stack, &doc, namer, parameters, timeout);
        match &result {
            Ok(()) => {
                stack.record_event(stack_id, STACK_TYPE, ResourceStatus::CreateComplete);
                info!(stack = %stack_id, "stack creation complete");
            }
            Err(e) => warn!(stack = %stack_id, error = %e, "stack creation failed"),
        }
        result
    }

    pub fn describe_stack_events(&self, stack_id: &str) -> Result<Vec<Event>, StackError> {
        self.registry.describe_stack_events(stack_id)
    }

    pub fn describe_stack_resources(
        &self,
        stack_id: &str,
    ) -> Result<Vec<RealizedResource>, StackError> {
        self.registry.describe_stack_resources(stack_id)
    }

    pub fn describe_stack(&self, stack_id: &str) -> Result<StackSummary, StackError> {
        self.registry.describe_stack(stack_id)
    }

    fn run(
        &self,
        stack: &StackHandle,
        doc: &serde_json::Value,
        namer: ResourceNamer,
        parameters: &[(String, String)],
        timeout: Duration,
    ) -> Result<(), StackError> {
        let template = parser::prepare_template(doc)?;
        let values = parser::check_parameters(&template, parameters)?;
        let ctx = stack.set_context(ResolutionContext::new(
            template,
            values,
            namer,
            self.provider.region(),
            self.settings.max_eval_depth,
        ));

        // Phase 1: evaluate everything, create security groups as they come
        let mut resolved = Vec::with_capacity(ctx.template().resources.len());
        for (logical_id, declaration) in &ctx.template().resources {
            let resource = evaluator::resolve_resource(&ctx, logical_id, declaration)?;
            if resource.kind() == ResourceKind::SecurityGroup {
                self.create_security_group(stack, &resource)?;
            } else if let ResourceKind::Other(ref t) = resource.kind() {
                debug!(resource = %logical_id, resource_type = %t, "ignoring unsupported resource type");
            }
            resolved.push(resource);
        }

        // Phase 2: launch instances
        let started = Instant::now();
        let mut launched = Vec::new();
        for resource in resolved.iter().filter(|r| r.kind() == ResourceKind::Instance) {
            launched.push(self.launch_instance(stack, resource)?);
        }

        self.await_instances(stack, &launched, started, timeout)
    }

    fn create_security_group(
        &self,
        stack: &StackHandle,
        resource: &ResolvedResource,
    ) -> Result<(), StackError> {
        let props: SecurityGroupProperties = parse_properties(resource)?;
        let kind = resource.resource_type.as_str();
        stack.record_event(&resource.logical_id, kind, ResourceStatus::CreateInProgress);
        debug!(resource = %resource.logical_id, name = %resource.name, "creating security group");

        let description = props
            .group_description
            .as_deref()
            .unwrap_or(&resource.name);
        let group = self.provider_call(
            stack,
            resource,
            Operation::CreateSecurityGroup,
            self.provider
                .create_security_group(&resource.name, description, props.vpc_id.as_deref()),
        )?;
        self.settle();

        for rule in &props.security_group_ingress {
            self.provider_call(
                stack,
                resource,
                Operation::AuthorizeIngress,
                self.provider.authorize_ingress(&group, rule),
            )?;
        }

        stack.record_resource(&resource.logical_id, &group.id, kind);
        stack.record_event(&resource.logical_id, kind, ResourceStatus::CreateComplete);
        info!(resource = %resource.logical_id, name = %group.name, id = %group.id, "security group created");
        Ok(())
    }

    fn launch_instance(
        &self,
        stack: &StackHandle,
        resource: &ResolvedResource,
    ) -> Result<LaunchedInstance, StackError> {
        let props: InstanceProperties = parse_properties(resource)?;
        stack.record_event(
            &resource.logical_id,
            &resource.resource_type,
            ResourceStatus::CreateInProgress,
        );
        debug!(resource = %resource.logical_id, name = %resource.name, "launching instance");

        let security_group_ids = match &props.security_group_ids {
            Some(requested) => Some(self.resolve_group_ids(stack, resource, &requested.to_vec())?),
            None => None,
        };
        let request = RunInstancesRequest {
            image_id: props.image_id.clone(),
            instance_type: props
                .instance_type
                .clone()
                .unwrap_or_else(|| self.settings.default_instance_type.clone()),
            key_name: props.key_name.clone(),
            security_groups: props.security_groups.as_ref().map(StringList::to_vec),
            security_group_ids,
            subnet_id: props.subnet_id.clone(),
        };

        let reservation = self.provider_call(
            stack,
            resource,
            Operation::RunInstances,
            self.provider.run_instances(&request),
        )?;
        let reservation_id = reservation.id.clone();
        let handle = self.provider_call(
            stack,
            resource,
            Operation::RunInstances,
            reservation
                .instances
                .into_iter()
                .next()
                .ok_or(ProviderError::EmptyReservation(reservation_id)),
        )?;
        self.settle();

        for tag in &props.tags {
            self.provider_call(
                stack,
                resource,
                Operation::AddTag,
                self.provider.add_tag(&handle, &tag.key, &tag.value),
            )?;
        }

        info!(resource = %resource.logical_id, instance = %handle.id, "instance launched");
        Ok(LaunchedInstance {
            logical_id: resource.logical_id.clone(),
            name: resource.name.clone(),
            handle,
        })
    }

    /// Map group names or ids to ids, preserving the requested order.
    fn resolve_group_ids(
        &self,
        stack: &StackHandle,
        resource: &ResolvedResource,
        requested: &[String],
    ) -> Result<Vec<String>, StackError> {
        let groups = self.provider_call(
            stack,
            resource,
            Operation::ListSecurityGroups,
            self.provider.list_security_groups(),
        )?;
        let mut ids = Vec::with_capacity(requested.len());
        let mut missing = Vec::new();
        for wanted in requested {
            match groups.iter().find(|g| &g.name == wanted || &g.id == wanted) {
                Some(group) => ids.push(group.id.clone()),
                None => missing.push(wanted.clone()),
            }
        }
        if !missing.is_empty() {
            return self.provider_call(
                stack,
                resource,
                Operation::ListSecurityGroups,
                Err(ProviderError::MissingGroups(missing)),
            );
        }
        Ok(ids)
    }

    fn await_instances(
        &self,
        stack: &StackHandle,
        launched: &[LaunchedInstance],
        started: Instant,
        timeout: Duration,
    ) -> Result<(), StackError> {
        for instance in launched {
            loop {
                let status = self
                    .provider
                    .get_instance_status(&instance.handle)
                    .map_err(|source| {
                        self.mark_failed(stack, &instance.logical_id, "instance");
                        StackError::Provider {
                            resource: instance.name.clone(),
                            operation: Operation::GetInstanceStatus,
                            source,
                        }
                    })?;
                debug!(resource = %instance.logical_id, instance = %instance.handle.id, status = %status, "polled instance");

                match status {
                    InstanceStatus::Pending => {
                        let elapsed = started.elapsed();
                        if elapsed >= timeout {
                            self.mark_failed(stack, &instance.logical_id, "instance");
                            return Err(StackError::Timeout {
                                resource: instance.logical_id.clone(),
                                instance_id: instance.handle.id.clone(),
                                timeout,
                            });
                        }
                        std::thread::sleep(self.settings.poll_interval().min(timeout - elapsed));
                    }
                    InstanceStatus::Running => {
                        stack.record_resource(&instance.logical_id, &instance.handle.id, "instance");
                        stack.record_event(
                            &instance.logical_id,
                            "instance",
                            ResourceStatus::CreateComplete,
                        );
                        info!(resource = %instance.logical_id, instance = %instance.handle.id, "instance running");
                        break;
                    }
                    InstanceStatus::Other(state) => {
                        self.mark_failed(stack, &instance.logical_id, "instance");
                        return Err(StackError::InstanceFailed {
                            resource: instance.logical_id.clone(),
                            instance_id: instance.handle.id.clone(),
                            state,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Wrap a provider result, recording a failure event on error.
    fn provider_call<T>(
        &self,
        stack: &StackHandle,
        resource: &ResolvedResource,
        operation: Operation,
        result: Result<T, ProviderError>,
    ) -> Result<T, StackError> {
        result.map_err(|source| {
            self.mark_failed(stack, &resource.logical_id, &resource.resource_type);
            StackError::Provider {
                resource: resource.name.clone(),
                operation,
                source,
            }
        })
    }

    fn mark_failed(&self, stack: &StackHandle, logical_id: &str, resource_type: &str) {
        warn!(resource = %logical_id, resource_type = %resource_type, "resource creation failed");
        stack.record_event(logical_id, resource_type, ResourceStatus::CreateFailed);
    }

    fn settle(&self) {
        let delay = self.settings.settle_delay();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

fn parse_properties<T: serde::de::DeserializeOwned>(
    resource: &ResolvedResource,
) -> Result<T, StackError> {
    serde_json::from_value(serde_json::Value::Object(resource.properties.clone())).map_err(|e| {
        StackError::TemplateInvalid(format!(
            "resource '{}' has invalid properties: {}",
            resource.logical_id, e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::memory::{InstanceScript, MemoryProvider, ProviderCall};

    const TWO_TIER: &str = r#"{
        "format-version": "2010-09-09",
        "description": "group plus instance",
        "parameters": {"KeyName": {"type": "string"}},
        "mappings": {"Images": {"eu-test-1": {"ami": "ami-42"}}},
        "resources": {
            "Web": {
                "type": "instance",
                "properties": {
                    "image-id": {"FindInMap": ["Images", {"Ref": "Stack::Region"}, "ami"]},
                    "key-name": {"Ref": "KeyName"},
                    "security-group-ids": [{"Ref": "WebSG"}],
                    "tags": [{"key": "Name", "value": {"Join": ["-", ["web", {"Ref": "Stack::Region"}]]}}]
                }
            },
            "WebSG": {
                "type": "security-group",
                "properties": {
                    "group-description": "web access",
                    "security-group-ingress": [
                        {"ip-protocol": "tcp", "from-port": "22", "to-port": 22, "cidr-ip": "0.0.0.0/0"}
                    ]
                }
            },
            "Bucket": {"type": "storage-bucket", "properties": {"name": {"Ref": "KeyName"}}}
        },
        "outputs": {"WebId": {"value": {"Ref": "Web"}}}
    }"#;

    fn fast_settings() -> Settings {
        Settings {
            poll_interval_ms: 1,
            settle_delay_ms: 0,
            ..Settings::default()
        }
    }

    fn manager(script: InstanceScript) -> StackManager<MemoryProvider> {
        StackManager::new(
            MemoryProvider::new("eu-test-1").with_script(script),
            fast_settings(),
        )
    }

    fn params() -> Vec<(String, String)> {
        vec![("KeyName".to_string(), "ops".to_string())]
    }

    fn stack_statuses(events: &[Event]) -> Vec<ResourceStatus> {
        events
            .iter()
            .filter(|e| e.is_stack_event())
            .map(|e| e.status)
            .collect()
    }

    #[test]
    fn test_create_stack_end_to_end() {
        let m = manager(InstanceScript::RunningAfter(2));
        m.create_stack("demo", TWO_TIER, &params(), Duration::from_secs(5))
            .unwrap();

        let journal = m.provider().journal();
        let sg_pos = journal
            .iter()
            .position(|c| matches!(c, ProviderCall::CreateSecurityGroup { .. }))
            .unwrap();
        let run_pos = journal
            .iter()
            .position(|c| matches!(c, ProviderCall::RunInstances(_)))
            .unwrap();
        assert!(sg_pos < run_pos, "group must exist before instance launch");

        let group = &m.provider().groups()[0];
        let ctx = m.registry().get("demo").unwrap().context().unwrap();
        assert_eq!(group.name, ctx.namer().name_for("WebSG"));

        match &journal[run_pos] {
            ProviderCall::RunInstances(req) => {
                assert_eq!(req.image_id, "ami-42");
                assert_eq!(req.key_name.as_deref(), Some("ops"));
                assert_eq!(req.instance_type, "m1.small");
                assert_eq!(req.security_group_ids, Some(vec![group.id.clone()]));
            }
            other => panic!("unexpected call {other:?}"),
        }

        let events = m.describe_stack_events("demo").unwrap();
        assert_eq!(
            stack_statuses(&events),
            vec![ResourceStatus::CreateInProgress, ResourceStatus::CreateComplete]
        );
        let resources = m.describe_stack_resources("demo").unwrap();
        let types: Vec<_> = resources.iter().map(|r| r.resource_type.as_str()).collect();
        assert_eq!(types, vec!["security-group", "instance"]);
        assert!(m.describe_stack("demo").unwrap().complete);
    }

    #[test]
    fn test_ref_name_matches_created_group_name() {
        let m = manager(InstanceScript::RunningAfter(0));
        m.create_stack("demo", TWO_TIER, &params(), Duration::from_secs(5))
            .unwrap();
        let ctx = m.registry().get("demo").unwrap().context().unwrap();
        let resolved = evaluator::resolve_all(&ctx).unwrap();
        let web = resolved.iter().find(|r| r.logical_id == "Web").unwrap();
        let group = &m.provider().groups()[0];
        assert_eq!(
            web.properties["security-group-ids"],
            serde_json::json!([group.name.clone()])
        );
    }

    #[test]
    fn test_ingress_and_tags_applied() {
        let m = manager(InstanceScript::RunningAfter(0));
        m.create_stack("demo", TWO_TIER, &params(), Duration::from_secs(5))
            .unwrap();
        let journal = m.provider().journal();
        let rule = journal.iter().find_map(|c| match c {
            ProviderCall::AuthorizeIngress { rule, .. } => Some(rule.clone()),
            _ => None,
        });
        let rule = rule.unwrap();
        assert_eq!((rule.from_port, rule.to_port), (22, 22));
        assert_eq!(rule.ip_protocol, "tcp");

        let instance = m
            .describe_stack_resources("demo")
            .unwrap()
            .into_iter()
            .find(|r| r.resource_type == "instance")
            .unwrap();
        assert_eq!(
            m.provider().instance_tags(&instance.physical_id),
            vec![("Name".to_string(), "web-eu-test-1".to_string())]
        );
    }

    #[test]
    fn test_unknown_types_are_inert() {
        let body = r#"{"format-version":"2010-09-09","resources":{"B":{"type":"queue","properties":{"x":"y"}}}}"#;
        let m = manager(InstanceScript::default());
        m.create_stack("inert", body, &[], Duration::from_secs(1)).unwrap();
        assert!(m.provider().journal().is_empty());
        assert!(m.describe_stack_resources("inert").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_types_still_evaluated() {
        let body = r#"{"format-version":"2010-09-09","resources":{"B":{"type":"queue","properties":{"x":{"Ref":"Nope"}}}}}"#;
        let m = manager(InstanceScript::default());
        let err = m.create_stack("inert", body, &[], Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, StackError::Eval { ref resource, .. } if resource == "B"));
    }

    #[test]
    fn test_timeout_zero_fails_fast() {
        let m = manager(InstanceScript::AlwaysPending);
        let start = Instant::now();
        let err = m
            .create_stack("slow", TWO_TIER, &params(), Duration::ZERO)
            .unwrap_err();
        assert!(err.is_timeout(), "expected timeout, got {err}");
        assert!(start.elapsed() < Duration::from_secs(2));

        let events = m.describe_stack_events("slow").unwrap();
        assert_eq!(stack_statuses(&events), vec![ResourceStatus::CreateInProgress]);
        assert!(events
            .iter()
            .any(|e| e.logical_id == "Web" && e.status == ResourceStatus::CreateFailed));
    }

    #[test]
    fn test_timeout_small_bound_stops_polling() {
        let m = StackManager::new(
            MemoryProvider::new("eu-test-1").with_script(InstanceScript::AlwaysPending),
            Settings {
                poll_interval_ms: 5,
                settle_delay_ms: 0,
                ..Settings::default()
            },
        );
        let err = m
            .create_stack("slow", TWO_TIER, &params(), Duration::from_millis(30))
            .unwrap_err();
        assert!(err.is_timeout());
        let polls = m
            .provider()
            .journal()
            .iter()
            .filter(|c| matches!(c, ProviderCall::GetInstanceStatus { .. }))
            .count();
        assert!(polls >= 2, "expected several polls, got {polls}");
    }

    #[test]
    fn test_instance_terminal_failure() {
        let m = manager(InstanceScript::FailAfter(1, "terminated".into()));
        let err = m
            .create_stack("doomed", TWO_TIER, &params(), Duration::from_secs(5))
            .unwrap_err();
        match err {
            StackError::InstanceFailed { resource, state, .. } => {
                assert_eq!(resource, "Web");
                assert_eq!(state, "terminated");
            }
            other => panic!("unexpected error: {other}"),
        }
        // Group stays recorded; no rollback
        let resources = m.describe_stack_resources("doomed").unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].resource_type, "security-group");
    }

    #[test]
    fn test_validation_failure_leaves_stack_registered() {
        let m = manager(InstanceScript::default());
        let body = r#"{"format-version":"2010-09-09","resources":{},"Foo":1}"#;
        let err = m.create_stack("bad", body, &[], Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, StackError::TemplateInvalid(ref msg) if msg.contains("Foo")));

        let events = m.describe_stack_events("bad").unwrap();
        assert_eq!(stack_statuses(&events), vec![ResourceStatus::CreateInProgress]);
        assert!(m.describe_stack_resources("bad").unwrap().is_empty());
        assert!(m.provider().journal().is_empty());
    }

    #[test]
    fn test_invalid_json_registers_nothing() {
        let m = manager(InstanceScript::default());
        let err = m.create_stack("bad", "{", &[], Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, StackError::TemplateParse(_)));
        assert!(matches!(
            m.describe_stack_events("bad"),
            Err(StackError::NotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_stack_rejected() {
        let m = manager(InstanceScript::RunningAfter(0));
        m.create_stack("demo", TWO_TIER, &params(), Duration::from_secs(5))
            .unwrap();
        let before = m.describe_stack_events("demo").unwrap();
        let err = m
            .create_stack("demo", TWO_TIER, &params(), Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, StackError::AlreadyExists(_)));
        assert_eq!(m.describe_stack_events("demo").unwrap(), before);
    }

    #[test]
    fn test_missing_parameter_value() {
        let m = manager(InstanceScript::default());
        let err = m
            .create_stack("noparam", TWO_TIER, &[], Duration::from_secs(1))
            .unwrap_err();
        match err {
            StackError::Eval { source, .. } => assert_eq!(
                source,
                crate::core::error::EvalError::ParameterNotSet("KeyName".into())
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_undeclared_parameter_rejected() {
        let m = manager(InstanceScript::default());
        let mut p = params();
        p.push(("Extra".into(), "1".into()));
        let err = m
            .create_stack("extra", TWO_TIER, &p, Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, StackError::TemplateInvalid(ref msg) if msg.contains("Extra")));
    }

    #[test]
    fn test_invalid_stack_id() {
        let m = manager(InstanceScript::default());
        let err = m
            .create_stack("9 lives", TWO_TIER, &params(), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, StackError::InvalidStackId(_)));
    }

    #[test]
    fn test_underscore_stack_id_accepted() {
        let m = manager(InstanceScript::RunningAfter(0));
        m.create_stack("web_stack", TWO_TIER, &params(), Duration::from_secs(5))
            .unwrap();
        assert!(m.describe_stack("web_stack").unwrap().complete);
        assert!(m.provider().groups()[0].name.starts_with("web_stack-WebSG-"));
    }

    #[test]
    fn test_structured_description_accepted() {
        let body = r#"{"format-version":"2010-09-09","description":{"en":"web tier"},"resources":{}}"#;
        let m = manager(InstanceScript::default());
        m.create_stack("described", body, &[], Duration::from_secs(1))
            .unwrap();
        let events = m.describe_stack_events("described").unwrap();
        assert_eq!(
            stack_statuses(&events),
            vec![ResourceStatus::CreateInProgress, ResourceStatus::CreateComplete]
        );
    }

    #[test]
    fn test_provider_error_wrapped_with_context() {
        let m = StackManager::new(
            MemoryProvider::new("eu-test-1").with_failure(Operation::CreateSecurityGroup),
            fast_settings(),
        );
        let err = m
            .create_stack("broken", TWO_TIER, &params(), Duration::from_secs(1))
            .unwrap_err();
        match err {
            StackError::Provider {
                resource,
                operation,
                ..
            } => {
                assert!(resource.starts_with("broken-WebSG-"));
                assert_eq!(operation, Operation::CreateSecurityGroup);
            }
            other => panic!("unexpected error: {other}"),
        }
        let events = m.describe_stack_events("broken").unwrap();
        assert!(events
            .iter()
            .any(|e| e.logical_id == "WebSG" && e.status == ResourceStatus::CreateFailed));
        // No instance launched after a phase-1 failure
        assert!(!m
            .provider()
            .journal()
            .iter()
            .any(|c| matches!(c, ProviderCall::RunInstances(_))));
    }

    #[test]
    fn test_unknown_group_reference_fails() {
        let body = r#"{
            "format-version": "2010-09-09",
            "resources": {
                "Web": {"type": "instance", "properties": {"image-id": "ami-1", "security-group-ids": ["nope"]}}
            }
        }"#;
        let m = manager(InstanceScript::default());
        let err = m.create_stack("lost", body, &[], Duration::from_secs(1)).unwrap_err();
        match err {
            StackError::Provider { operation, source, .. } => {
                assert_eq!(operation, Operation::ListSecurityGroups);
                assert_eq!(source, ProviderError::MissingGroups(vec!["nope".into()]));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_get_att_aborts_creation() {
        let body = r#"{
            "format-version": "2010-09-09",
            "resources": {
                "Web": {"type": "instance", "properties": {"image-id": {"GetAtt": ["X", "Id"]}}}
            }
        }"#;
        let m = manager(InstanceScript::default());
        let err = m.create_stack("att", body, &[], Duration::from_secs(1)).unwrap_err();
        assert!(err.to_string().contains("GetAtt is not implemented"));
    }

    #[test]
    fn test_invalid_instance_properties() {
        let body = r#"{
            "format-version": "2010-09-09",
            "resources": {"Web": {"type": "instance", "properties": {"instance-type": "t1"}}}
        }"#;
        let m = manager(InstanceScript::default());
        let err = m.create_stack("noimg", body, &[], Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, StackError::TemplateInvalid(ref msg) if msg.contains("image-id")));
    }

    #[test]
    fn test_concurrent_stacks_independent() {
        let m = std::sync::Arc::new(manager(InstanceScript::RunningAfter(1)));
        let threads: Vec<_> = ["alpha", "beta", "gamma"]
            .into_iter()
            .map(|id| {
                let m = std::sync::Arc::clone(&m);
                std::thread::spawn(move || {
                    m.create_stack(id, TWO_TIER, &params(), Duration::from_secs(5))
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap().unwrap();
        }
        for id in ["alpha", "beta", "gamma"] {
            assert!(m.describe_stack(id).unwrap().complete);
            assert_eq!(m.describe_stack_resources(id).unwrap().len(), 2);
        }
        assert_eq!(m.provider().groups().len(), 3);
    }
}
