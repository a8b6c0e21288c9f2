//! In-memory platform for testing.
//!
//! Models the parts of the remote services the reconcilers depend on:
//! asynchronous deletions that stay visible for a configurable number of
//! probes, the queue-name cooldown after deletion, permission statement
//! conflicts, and refusal to delete a function that still has live
//! event-source mappings. Every call is journaled so tests can assert on
//! ordering or on the absence of remote traffic.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;

use crate::error::{PlatformError, PlatformResult};

use super::{
    BlobStore, CodeLocation, EventSourceMapping, FunctionApi, FunctionConfiguration,
    FunctionSpec, InvokeOutcome, InvokePermission, QueueApi, QueueAttributes, RuleApi,
    RuleDescription, RuleTarget,
};

const ACCOUNT: &str = "000000000000";

#[derive(Debug, Clone)]
struct StoredFunction {
    config: FunctionConfiguration,
    code: Option<CodeLocation>,
    deleting: Option<u32>,
}

#[derive(Debug, Clone)]
struct StoredMapping {
    mapping: EventSourceMapping,
    function_name: String,
    batch_size: u32,
    deleting: Option<u32>,
}

#[derive(Debug, Clone)]
struct StoredRule {
    arn: String,
    schedule_expression: String,
    targets: Vec<RuleTarget>,
}

#[derive(Debug, Clone)]
struct StoredQueue {
    url: String,
    arn: String,
    attributes: QueueAttributes,
    generation: u64,
    deleting: Option<u32>,
}

/// Snapshot of a queue held by [`MemoryPlatform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    /// Queue URL.
    pub url: String,
    /// Queue ARN.
    pub arn: String,
    /// Attributes the queue was created with.
    pub attributes: QueueAttributes,
    /// Creation counter, distinct for every queue ever created.
    pub generation: u64,
}

#[derive(Debug, Default)]
struct State {
    functions: BTreeMap<String, StoredFunction>,
    mappings: BTreeMap<String, StoredMapping>,
    rules: BTreeMap<String, StoredRule>,
    permissions: BTreeMap<(String, String), InvokePermission>,
    queues: BTreeMap<String, StoredQueue>,
    queue_deleted_at: HashMap<String, Instant>,
    objects: BTreeMap<String, Bytes>,
    invocations: Vec<(String, Option<Vec<u8>>)>,
    failures: HashMap<&'static str, PlatformError>,
    calls: Vec<String>,
    next_id: u64,
}

impl State {
    fn begin(&mut self, operation: &'static str, subject: &str) -> PlatformResult<()> {
        self.calls.push(format!("{operation} {subject}"));
        match self.failures.remove(operation) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn live_function(&self, name: &str) -> Option<&StoredFunction> {
        self.functions.get(name).filter(|f| f.deleting.is_none())
    }

    fn live_function_mut(&mut self, name: &str) -> PlatformResult<&mut StoredFunction> {
        self.functions
            .get_mut(name)
            .filter(|f| f.deleting.is_none())
            .ok_or_else(|| PlatformError::not_found("function", name))
    }
}

/// In-memory implementation of every platform trait.
#[derive(Debug)]
pub struct MemoryPlatform {
    region: String,
    bucket: String,
    settle_polls: u32,
    queue_cooldown: Duration,
    state: RwLock<State>,
}

impl MemoryPlatform {
    /// Create an empty platform in `region` with artifact bucket `bucket`.
    #[must_use]
    pub fn new(region: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            bucket: bucket.into(),
            settle_polls: 0,
            queue_cooldown: Duration::ZERO,
            state: RwLock::new(State::default()),
        }
    }

    /// Keep deleted resources visible for `polls` probes.
    #[must_use]
    pub const fn with_settle_polls(mut self, polls: u32) -> Self {
        self.settle_polls = polls;
        self
    }

    /// Reject queue creation within `cooldown` of deleting a queue of the
    /// same name.
    #[must_use]
    pub const fn with_queue_cooldown(mut self, cooldown: Duration) -> Self {
        self.queue_cooldown = cooldown;
        self
    }

    /// ARN a function named `name` receives in `region`.
    #[must_use]
    pub fn function_arn(region: &str, name: &str) -> String {
        format!("arn:aws:lambda:{region}:{ACCOUNT}:function:{name}")
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn deletion_delay(&self) -> Option<u32> {
        (self.settle_polls > 0).then_some(self.settle_polls)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Seeding
    // ─────────────────────────────────────────────────────────────────────

    /// Plant an existing function, as if deployed earlier.
    pub fn seed_function(&self, config: FunctionConfiguration) {
        self.write().functions.insert(
            config.name.clone(),
            StoredFunction {
                config,
                code: None,
                deleting: None,
            },
        );
    }

    /// Plant an existing rule with its targets.
    pub fn seed_rule(&self, name: &str, schedule_expression: &str, targets: Vec<RuleTarget>) {
        let arn = format!("arn:aws:events:{}:{ACCOUNT}:rule/{name}", self.region);
        self.write().rules.insert(
            name.to_owned(),
            StoredRule {
                arn,
                schedule_expression: schedule_expression.to_owned(),
                targets,
            },
        );
    }

    /// Plant an existing queue. Returns its URL.
    pub fn seed_queue(&self, name: &str, attributes: QueueAttributes) -> String {
        let mut state = self.write();
        let generation = state.next_id();
        let queue = self.new_queue(name, attributes, generation);
        let url = queue.url.clone();
        state.queues.insert(name.to_owned(), queue);
        url
    }

    /// Plant an event-source mapping from `source_arn` to `function_name`.
    pub fn seed_mapping(&self, function_name: &str, source_arn: &str) -> String {
        let mut state = self.write();
        let uuid = format!("mapping-{}", state.next_id());
        let mapping = EventSourceMapping {
            uuid: uuid.clone(),
            event_source_arn: Some(source_arn.to_owned()),
            function_arn: Some(Self::function_arn(&self.region, function_name)),
            state: Some("Enabled".to_owned()),
        };
        state.mappings.insert(
            uuid.clone(),
            StoredMapping {
                mapping,
                function_name: function_name.to_owned(),
                batch_size: 1,
                deleting: None,
            },
        );
        uuid
    }

    /// Make the next call to `operation` fail with `error`.
    pub fn fail_next(&self, operation: &'static str, error: PlatformError) {
        self.write().failures.insert(operation, error);
    }

    fn new_queue(&self, name: &str, attributes: QueueAttributes, generation: u64) -> StoredQueue {
        StoredQueue {
            url: format!("https://sqs.{}.amazonaws.com/{ACCOUNT}/{name}", self.region),
            arn: format!("arn:aws:sqs:{}:{ACCOUNT}:{name}", self.region),
            attributes,
            generation,
            deleting: None,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Inspection
    // ─────────────────────────────────────────────────────────────────────

    /// Every call made so far, as `"<Operation> <subject>"`.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.read().calls.clone()
    }

    /// Forget the call journal.
    pub fn clear_calls(&self) {
        self.write().calls.clear();
    }

    /// Live configuration of a function.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<FunctionConfiguration> {
        self.read().live_function(name).map(|f| f.config.clone())
    }

    /// Code location a function currently points at.
    #[must_use]
    pub fn function_code(&self, name: &str) -> Option<CodeLocation> {
        self.read().live_function(name).and_then(|f| f.code.clone())
    }

    /// Schedule expression and targets of a rule.
    #[must_use]
    pub fn rule(&self, name: &str) -> Option<(String, Vec<RuleTarget>)> {
        self.read()
            .rules
            .get(name)
            .map(|r| (r.schedule_expression.clone(), r.targets.clone()))
    }

    /// Names of every rule, sorted.
    #[must_use]
    pub fn rule_names(&self) -> Vec<String> {
        self.read().rules.keys().cloned().collect()
    }

    /// Permission statements granted on a function.
    #[must_use]
    pub fn permissions(&self, function_name: &str) -> Vec<InvokePermission> {
        self.read()
            .permissions
            .values()
            .filter(|p| p.function_name == function_name)
            .cloned()
            .collect()
    }

    /// Live event-source mappings of a function, with their batch sizes.
    #[must_use]
    pub fn mappings(&self, function_name: &str) -> Vec<(EventSourceMapping, u32)> {
        self.read()
            .mappings
            .values()
            .filter(|m| m.function_name == function_name && m.deleting.is_none())
            .map(|m| (m.mapping.clone(), m.batch_size))
            .collect()
    }

    /// Snapshot of a live queue.
    #[must_use]
    pub fn queue(&self, name: &str) -> Option<QueueSnapshot> {
        self.read()
            .queues
            .get(name)
            .filter(|q| q.deleting.is_none())
            .map(|q| QueueSnapshot {
                url: q.url.clone(),
                arn: q.arn.clone(),
                attributes: q.attributes,
                generation: q.generation,
            })
    }

    /// Contents of an uploaded object.
    #[must_use]
    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.read().objects.get(key).cloned()
    }

    /// Invocations made so far, with their payloads.
    #[must_use]
    pub fn invocations(&self) -> Vec<(String, Option<Vec<u8>>)> {
        self.read().invocations.clone()
    }
}

/// Report `deleting` entries once per probe, then drop them.
fn tick(deleting: &mut Option<u32>) -> bool {
    match deleting {
        Some(0) => false,
        Some(remaining) => {
            *remaining -= 1;
            true
        }
        None => true,
    }
}

#[async_trait]
impl FunctionApi for MemoryPlatform {
    async fn get_function(&self, name: &str) -> PlatformResult<Option<FunctionConfiguration>> {
        let mut state = self.write();
        state.begin("GetFunction", name)?;

        let Some(function) = state.functions.get_mut(name) else {
            return Ok(None);
        };
        if tick(&mut function.deleting) {
            return Ok(Some(function.config.clone()));
        }
        state.functions.remove(name);
        Ok(None)
    }

    async fn create_function(
        &self,
        spec: &FunctionSpec,
        code: &CodeLocation,
    ) -> PlatformResult<String> {
        let mut state = self.write();
        state.begin("CreateFunction", &spec.name)?;

        if state.functions.contains_key(&spec.name) {
            return Err(PlatformError::conflict(
                "CreateFunction",
                format!("function already exist: {}", spec.name),
            ));
        }
        if code.bucket != self.bucket || !state.objects.contains_key(&code.key) {
            return Err(PlatformError::service(
                "CreateFunction",
                format!("code object s3://{}/{} does not exist", code.bucket, code.key),
            ));
        }

        let arn = Self::function_arn(&self.region, &spec.name);
        let config = FunctionConfiguration {
            name: spec.name.clone(),
            arn: arn.clone(),
            runtime: Some(spec.runtime.clone()),
            handler: Some(spec.handler.clone()),
            timeout: Some(spec.timeout),
            memory_size: Some(spec.memory_size),
            role: spec.role.clone(),
            layers: spec.layers.clone(),
            environment: spec.environment.clone(),
        };
        state.functions.insert(
            spec.name.clone(),
            StoredFunction {
                config,
                code: Some(code.clone()),
                deleting: None,
            },
        );
        Ok(arn)
    }

    async fn update_function_code(&self, name: &str, code: &CodeLocation) -> PlatformResult<()> {
        let mut state = self.write();
        state.begin("UpdateFunctionCode", name)?;

        if !state.objects.contains_key(&code.key) {
            return Err(PlatformError::service(
                "UpdateFunctionCode",
                format!("code object s3://{}/{} does not exist", code.bucket, code.key),
            ));
        }
        state.live_function_mut(name)?.code = Some(code.clone());
        Ok(())
    }

    async fn update_function_configuration(&self, spec: &FunctionSpec) -> PlatformResult<()> {
        let mut state = self.write();
        state.begin("UpdateFunctionConfiguration", &spec.name)?;

        let config = &mut state.live_function_mut(&spec.name)?.config;
        config.runtime = Some(spec.runtime.clone());
        config.handler = Some(spec.handler.clone());
        config.timeout = Some(spec.timeout);
        config.memory_size = Some(spec.memory_size);
        config.role = spec.role.clone();
        config.layers = spec.layers.clone();
        config.environment = spec.environment.clone();
        Ok(())
    }

    async fn delete_function(&self, name: &str) -> PlatformResult<()> {
        let mut state = self.write();
        state.begin("DeleteFunction", name)?;

        if state.live_function(name).is_none() {
            return Err(PlatformError::not_found("function", name));
        }
        let attached = state
            .mappings
            .values()
            .any(|m| m.function_name == name && m.deleting.is_none());
        if attached {
            return Err(PlatformError::conflict(
                "DeleteFunction",
                format!("{name} still has event source mappings"),
            ));
        }

        state.permissions.retain(|(function, _), _| function != name);
        match self.deletion_delay() {
            Some(polls) => {
                if let Some(function) = state.functions.get_mut(name) {
                    function.deleting = Some(polls);
                }
            }
            None => {
                state.functions.remove(name);
            }
        }
        Ok(())
    }

    async fn add_permission(&self, grant: &InvokePermission) -> PlatformResult<()> {
        let mut state = self.write();
        state.begin("AddPermission", &grant.statement_id)?;

        if state.live_function(&grant.function_name).is_none() {
            return Err(PlatformError::not_found("function", &grant.function_name));
        }
        let key = (grant.function_name.clone(), grant.statement_id.clone());
        if state.permissions.contains_key(&key) {
            return Err(PlatformError::conflict(
                "AddPermission",
                format!("statement {} already exists", grant.statement_id),
            ));
        }
        state.permissions.insert(key, grant.clone());
        Ok(())
    }

    async fn list_event_source_mappings(
        &self,
        function_name: &str,
    ) -> PlatformResult<Vec<EventSourceMapping>> {
        let mut state = self.write();
        state.begin("ListEventSourceMappings", function_name)?;

        let mut listed = Vec::new();
        state.mappings.retain(|_, stored| {
            if stored.function_name != function_name {
                return true;
            }
            let visible = tick(&mut stored.deleting);
            if visible {
                let mut mapping = stored.mapping.clone();
                if stored.deleting.is_some() {
                    mapping.state = Some("Deleting".to_owned());
                }
                listed.push(mapping);
            }
            visible
        });
        Ok(listed)
    }

    async fn create_event_source_mapping(
        &self,
        function_name: &str,
        event_source_arn: &str,
        batch_size: u32,
    ) -> PlatformResult<EventSourceMapping> {
        let mut state = self.write();
        state.begin("CreateEventSourceMapping", function_name)?;

        let function_arn = state
            .live_function(function_name)
            .map(|f| f.config.arn.clone())
            .ok_or_else(|| PlatformError::not_found("function", function_name))?;
        if !state
            .queues
            .values()
            .any(|q| q.arn == event_source_arn && q.deleting.is_none())
        {
            return Err(PlatformError::service(
                "CreateEventSourceMapping",
                format!("event source {event_source_arn} does not exist"),
            ));
        }
        let duplicate = state.mappings.values().any(|m| {
            m.function_name == function_name
                && m.deleting.is_none()
                && m.mapping.event_source_arn.as_deref() == Some(event_source_arn)
        });
        if duplicate {
            return Err(PlatformError::conflict(
                "CreateEventSourceMapping",
                format!("{function_name} is already mapped to {event_source_arn}"),
            ));
        }

        let uuid = format!("mapping-{}", state.next_id());
        let mapping = EventSourceMapping {
            uuid: uuid.clone(),
            event_source_arn: Some(event_source_arn.to_owned()),
            function_arn: Some(function_arn),
            state: Some("Enabled".to_owned()),
        };
        state.mappings.insert(
            uuid,
            StoredMapping {
                mapping: mapping.clone(),
                function_name: function_name.to_owned(),
                batch_size,
                deleting: None,
            },
        );
        Ok(mapping)
    }

    async fn delete_event_source_mapping(&self, uuid: &str) -> PlatformResult<()> {
        let mut state = self.write();
        state.begin("DeleteEventSourceMapping", uuid)?;

        let Some(stored) = state.mappings.get_mut(uuid) else {
            return Err(PlatformError::not_found("event source mapping", uuid));
        };
        if stored.deleting.is_some() {
            return Err(PlatformError::conflict(
                "DeleteEventSourceMapping",
                format!("{uuid} is already being deleted"),
            ));
        }
        match self.deletion_delay() {
            Some(polls) => stored.deleting = Some(polls),
            None => {
                state.mappings.remove(uuid);
            }
        }
        Ok(())
    }

    async fn invoke(&self, name: &str, payload: Option<Vec<u8>>) -> PlatformResult<InvokeOutcome> {
        let mut state = self.write();
        state.begin("Invoke", name)?;

        if state.live_function(name).is_none() {
            return Err(PlatformError::not_found("function", name));
        }
        state.invocations.push((name.to_owned(), payload.clone()));
        Ok(InvokeOutcome {
            status_code: 200,
            function_error: None,
            payload: payload.unwrap_or_else(|| b"null".to_vec()),
        })
    }
}

#[async_trait]
impl RuleApi for MemoryPlatform {
    async fn list_rule_names_by_target(&self, target_arn: &str) -> PlatformResult<Vec<String>> {
        let mut state = self.write();
        state.begin("ListRuleNamesByTarget", target_arn)?;

        Ok(state
            .rules
            .iter()
            .filter(|(_, rule)| rule.targets.iter().any(|t| t.arn == target_arn))
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn describe_rule(&self, name: &str) -> PlatformResult<Option<RuleDescription>> {
        let mut state = self.write();
        state.begin("DescribeRule", name)?;

        Ok(state.rules.get(name).map(|rule| RuleDescription {
            name: name.to_owned(),
            arn: Some(rule.arn.clone()),
            schedule_expression: Some(rule.schedule_expression.clone()),
            state: Some("ENABLED".to_owned()),
        }))
    }

    async fn put_rule(&self, name: &str, schedule_expression: &str) -> PlatformResult<String> {
        let mut state = self.write();
        state.begin("PutRule", name)?;

        let arn = format!("arn:aws:events:{}:{ACCOUNT}:rule/{name}", self.region);
        let rule = state
            .rules
            .entry(name.to_owned())
            .or_insert_with(|| StoredRule {
                arn: arn.clone(),
                schedule_expression: schedule_expression.to_owned(),
                targets: Vec::new(),
            });
        rule.schedule_expression = schedule_expression.to_owned();
        Ok(rule.arn.clone())
    }

    async fn list_targets_by_rule(&self, rule: &str) -> PlatformResult<Vec<RuleTarget>> {
        let mut state = self.write();
        state.begin("ListTargetsByRule", rule)?;

        state
            .rules
            .get(rule)
            .map(|r| r.targets.clone())
            .ok_or_else(|| PlatformError::not_found("rule", rule))
    }

    async fn remove_targets(&self, rule: &str, ids: &[String]) -> PlatformResult<()> {
        let mut state = self.write();
        state.begin("RemoveTargets", rule)?;

        let stored = state
            .rules
            .get_mut(rule)
            .ok_or_else(|| PlatformError::not_found("rule", rule))?;
        stored.targets.retain(|t| !ids.contains(&t.id));
        Ok(())
    }

    async fn put_targets(&self, rule: &str, targets: &[RuleTarget]) -> PlatformResult<()> {
        let mut state = self.write();
        state.begin("PutTargets", rule)?;

        let stored = state
            .rules
            .get_mut(rule)
            .ok_or_else(|| PlatformError::not_found("rule", rule))?;
        for target in targets {
            stored.targets.retain(|t| t.id != target.id);
            stored.targets.push(target.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl QueueApi for MemoryPlatform {
    async fn get_queue_url(&self, name: &str) -> PlatformResult<Option<String>> {
        let mut state = self.write();
        state.begin("GetQueueUrl", name)?;

        let Some(queue) = state.queues.get_mut(name) else {
            return Ok(None);
        };
        if tick(&mut queue.deleting) {
            return Ok(Some(queue.url.clone()));
        }
        state.queues.remove(name);
        Ok(None)
    }

    async fn get_queue_arn(&self, url: &str) -> PlatformResult<String> {
        let mut state = self.write();
        state.begin("GetQueueAttributes", url)?;

        state
            .queues
            .values()
            .find(|q| q.url == url)
            .map(|q| q.arn.clone())
            .ok_or_else(|| PlatformError::not_found("queue", url))
    }

    async fn create_queue(
        &self,
        name: &str,
        attributes: QueueAttributes,
    ) -> PlatformResult<String> {
        let mut state = self.write();
        state.begin("CreateQueue", name)?;

        if attributes.fifo != name.ends_with(".fifo") {
            return Err(PlatformError::service(
                "CreateQueue",
                format!("FIFO queue names must end in .fifo: {name}"),
            ));
        }
        if let Some(existing) = state.queues.get(name) {
            if existing.deleting.is_none() && existing.attributes == attributes {
                return Ok(existing.url.clone());
            }
            return Err(PlatformError::conflict(
                "CreateQueue",
                format!("queue {name} already exists"),
            ));
        }
        if let Some(deleted_at) = state.queue_deleted_at.get(name) {
            if deleted_at.elapsed() < self.queue_cooldown {
                return Err(PlatformError::conflict(
                    "CreateQueue",
                    format!("queue {name} was deleted recently"),
                ));
            }
        }

        let generation = state.next_id();
        let queue = self.new_queue(name, attributes, generation);
        let url = queue.url.clone();
        state.queues.insert(name.to_owned(), queue);
        Ok(url)
    }

    async fn delete_queue(&self, url: &str) -> PlatformResult<()> {
        let mut state = self.write();
        state.begin("DeleteQueue", url)?;

        let Some(name) = state
            .queues
            .iter()
            .find(|(_, q)| q.url == url && q.deleting.is_none())
            .map(|(name, _)| name.clone())
        else {
            return Err(PlatformError::not_found("queue", url));
        };

        state.queue_deleted_at.insert(name.clone(), Instant::now());
        match self.deletion_delay() {
            Some(polls) => {
                if let Some(queue) = state.queues.get_mut(&name) {
                    queue.deleting = Some(polls);
                }
            }
            None => {
                state.queues.remove(&name);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryPlatform {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_object(&self, key: &str, body: Bytes) -> PlatformResult<()> {
        let mut state = self.write();
        state.begin("PutObject", key)?;
        state.objects.insert(key.to_owned(), body);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn spec(name: &str) -> FunctionSpec {
        FunctionSpec {
            name: name.to_owned(),
            runtime: "python3.12".to_owned(),
            handler: "lambda_function.lambda_handler".to_owned(),
            timeout: 3,
            memory_size: 128,
            role: None,
            layers: Vec::new(),
            environment: BTreeMap::new(),
        }
    }

    fn code(key: &str) -> CodeLocation {
        CodeLocation {
            bucket: "artifacts".to_owned(),
            key: key.to_owned(),
        }
    }

    #[tokio::test]
    async fn create_requires_uploaded_code() {
        let platform = MemoryPlatform::new("eu-west-1", "artifacts");
        let err = platform
            .create_function(&spec("mailer"), &code("mailer.zip"))
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Service { .. }));

        platform
            .put_object("mailer.zip", Bytes::from_static(b"PK"))
            .await
            .unwrap();
        let arn = platform
            .create_function(&spec("mailer"), &code("mailer.zip"))
            .await
            .unwrap();
        assert_eq!(
            arn,
            "arn:aws:lambda:eu-west-1:000000000000:function:mailer"
        );
    }

    #[tokio::test]
    async fn deleted_function_stays_visible_for_settle_polls() {
        let platform = MemoryPlatform::new("eu-west-1", "artifacts").with_settle_polls(2);
        platform.seed_function(FunctionConfiguration {
            name: "mailer".to_owned(),
            arn: MemoryPlatform::function_arn("eu-west-1", "mailer"),
            runtime: Some("python3.12".to_owned()),
            handler: None,
            timeout: None,
            memory_size: None,
            role: None,
            layers: Vec::new(),
            environment: BTreeMap::new(),
        });

        platform.delete_function("mailer").await.unwrap();
        assert!(platform.get_function("mailer").await.unwrap().is_some());
        assert!(platform.get_function("mailer").await.unwrap().is_some());
        assert!(platform.get_function("mailer").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_permission_conflicts() {
        let platform = MemoryPlatform::new("eu-west-1", "artifacts");
        platform
            .put_object("mailer.zip", Bytes::from_static(b"PK"))
            .await
            .unwrap();
        platform
            .create_function(&spec("mailer"), &code("mailer.zip"))
            .await
            .unwrap();

        let grant = InvokePermission {
            function_name: "mailer".to_owned(),
            statement_id: "mailer_hourly_at_15_invoke".to_owned(),
            principal: "events.amazonaws.com".to_owned(),
            source_arn: "arn:aws:events:eu-west-1:000000000000:rule/mailer_hourly_at_15"
                .to_owned(),
        };
        platform.add_permission(&grant).await.unwrap();
        let err = platform.add_permission(&grant).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test(start_paused = true)]
    async fn queue_name_cooldown() {
        let platform = MemoryPlatform::new("eu-west-1", "artifacts")
            .with_queue_cooldown(Duration::from_secs(60));
        let attributes = QueueAttributes {
            fifo: true,
            visibility_timeout_secs: 18,
        };
        let url = platform.seed_queue("results.fifo", attributes);

        platform.delete_queue(&url).await.unwrap();
        let err = platform
            .create_queue("results.fifo", attributes)
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        tokio::time::sleep(Duration::from_secs(60)).await;
        platform.create_queue("results.fifo", attributes).await.unwrap();
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let platform = MemoryPlatform::new("eu-west-1", "artifacts");
        platform.fail_next("GetFunction", PlatformError::service("GetFunction", "boom"));

        assert!(platform.get_function("mailer").await.is_err());
        assert!(platform.get_function("mailer").await.unwrap().is_none());
        assert_eq!(platform.calls().len(), 2);
    }
}
