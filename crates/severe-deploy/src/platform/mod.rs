//! Remote platform clients.
//!
//! Each remote service the engine talks to sits behind an async trait:
//! [`FunctionApi`] for the compute platform, [`RuleApi`] for scheduled
//! rules, [`QueueApi`] for message queues and [`BlobStore`] for artifact
//! storage. AWS-backed implementations live in [`aws`] and [`storage`]; an
//! in-memory implementation is provided for testing.

pub mod aws;
mod memory;
pub mod storage;

pub use memory::{MemoryPlatform, QueueSnapshot};

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

use crate::declaration::{Declaration, UploadEnv};
use crate::error::{DeployResult, PlatformResult};

/// Principal allowed to invoke a function from a schedule rule.
pub const RULE_PRINCIPAL: &str = "events.amazonaws.com";

/// Extract the region from an ARN (`arn:partition:service:region:...`).
#[must_use]
pub fn arn_region(arn: &str) -> Option<&str> {
    arn.split(':').nth(3).filter(|region| !region.is_empty())
}

/// Live configuration of a function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionConfiguration {
    /// Function name.
    pub name: String,
    /// Canonical ARN.
    pub arn: String,
    /// Runtime tag.
    pub runtime: Option<String>,
    /// Configured handler.
    pub handler: Option<String>,
    /// Timeout in seconds.
    pub timeout: Option<u32>,
    /// Memory in MB.
    pub memory_size: Option<u32>,
    /// Execution role.
    pub role: Option<String>,
    /// Attached layer ARNs.
    pub layers: Vec<String>,
    /// Execution environment.
    pub environment: BTreeMap<String, String>,
}

impl FunctionConfiguration {
    /// Region the function lives in, derived from its ARN.
    #[must_use]
    pub fn region(&self) -> Option<&str> {
        arn_region(&self.arn)
    }
}

/// Desired configuration of a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSpec {
    /// Function name.
    pub name: String,
    /// Runtime tag.
    pub runtime: String,
    /// Entry point.
    pub handler: String,
    /// Timeout in seconds.
    pub timeout: u32,
    /// Memory in MB.
    pub memory_size: u32,
    /// Execution role.
    pub role: Option<String>,
    /// Layer ARNs.
    pub layers: Vec<String>,
    /// Execution environment.
    pub environment: BTreeMap<String, String>,
}

impl FunctionSpec {
    /// Derive the platform configuration from a declaration.
    #[must_use]
    pub fn from_declaration(decl: &Declaration) -> Self {
        Self {
            name: decl.function_name.clone(),
            runtime: decl.runtime.as_str().to_owned(),
            handler: decl.handler().to_owned(),
            timeout: decl.timeout,
            memory_size: decl.memory_size,
            role: decl.role.clone(),
            layers: decl.layer.iter().cloned().collect(),
            environment: decl.exe_env.clone(),
        }
    }
}

/// Where uploaded function code lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLocation {
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
}

/// A grant allowing a principal to invoke a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokePermission {
    /// Function name.
    pub function_name: String,
    /// Statement id, unique per function.
    pub statement_id: String,
    /// Principal being granted access.
    pub principal: String,
    /// Resource the invocation must originate from.
    pub source_arn: String,
}

/// Binding between a queue and a function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventSourceMapping {
    /// Mapping identifier.
    pub uuid: String,
    /// Source queue ARN.
    pub event_source_arn: Option<String>,
    /// Target function ARN.
    pub function_arn: Option<String>,
    /// Platform state (`Enabled`, `Deleting`, ...).
    pub state: Option<String>,
}

/// One target of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleTarget {
    /// Target id, unique within the rule.
    pub id: String,
    /// Target ARN.
    pub arn: String,
}

/// Description of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleDescription {
    /// Rule name.
    pub name: String,
    /// Rule ARN.
    pub arn: Option<String>,
    /// Schedule expression.
    pub schedule_expression: Option<String>,
    /// Rule state.
    pub state: Option<String>,
}

/// Attributes for a newly created queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueAttributes {
    /// First-in-first-out delivery.
    pub fifo: bool,
    /// Visibility timeout in seconds.
    pub visibility_timeout_secs: u32,
}

/// Result of a synchronous invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeOutcome {
    /// HTTP status code of the invocation.
    pub status_code: i32,
    /// Error type reported by the function, if it failed.
    pub function_error: Option<String>,
    /// Response payload.
    pub payload: Vec<u8>,
}

/// Compute platform operations.
#[async_trait]
pub trait FunctionApi: Send + Sync {
    /// Get a function's configuration, or `None` if it does not exist.
    async fn get_function(&self, name: &str) -> PlatformResult<Option<FunctionConfiguration>>;

    /// Create a function from uploaded code. Returns the function ARN.
    async fn create_function(
        &self,
        spec: &FunctionSpec,
        code: &CodeLocation,
    ) -> PlatformResult<String>;

    /// Point a function at new code.
    async fn update_function_code(&self, name: &str, code: &CodeLocation) -> PlatformResult<()>;

    /// Replace a function's configuration.
    async fn update_function_configuration(&self, spec: &FunctionSpec) -> PlatformResult<()>;

    /// Delete a function.
    async fn delete_function(&self, name: &str) -> PlatformResult<()>;

    /// Grant invoke permission. Returns [`PlatformError::Conflict`] if the
    /// statement already exists.
    ///
    /// [`PlatformError::Conflict`]: crate::error::PlatformError::Conflict
    async fn add_permission(&self, grant: &InvokePermission) -> PlatformResult<()>;

    /// List the event-source mappings targeting a function.
    async fn list_event_source_mappings(
        &self,
        function_name: &str,
    ) -> PlatformResult<Vec<EventSourceMapping>>;

    /// Create an event-source mapping.
    async fn create_event_source_mapping(
        &self,
        function_name: &str,
        event_source_arn: &str,
        batch_size: u32,
    ) -> PlatformResult<EventSourceMapping>;

    /// Delete an event-source mapping.
    async fn delete_event_source_mapping(&self, uuid: &str) -> PlatformResult<()>;

    /// Invoke a function synchronously.
    async fn invoke(&self, name: &str, payload: Option<Vec<u8>>) -> PlatformResult<InvokeOutcome>;
}

/// Scheduled rule operations.
#[async_trait]
pub trait RuleApi: Send + Sync {
    /// Names of every rule with a target pointing at `target_arn`.
    async fn list_rule_names_by_target(&self, target_arn: &str) -> PlatformResult<Vec<String>>;

    /// Describe a rule, or `None` if it does not exist.
    async fn describe_rule(&self, name: &str) -> PlatformResult<Option<RuleDescription>>;

    /// Create or update a scheduled rule. Returns the rule ARN.
    async fn put_rule(&self, name: &str, schedule_expression: &str) -> PlatformResult<String>;

    /// List a rule's targets.
    async fn list_targets_by_rule(&self, rule: &str) -> PlatformResult<Vec<RuleTarget>>;

    /// Remove targets from a rule, leaving the rule in place.
    async fn remove_targets(&self, rule: &str, ids: &[String]) -> PlatformResult<()>;

    /// Add or replace targets on a rule.
    async fn put_targets(&self, rule: &str, targets: &[RuleTarget]) -> PlatformResult<()>;
}

/// Message queue operations.
#[async_trait]
pub trait QueueApi: Send + Sync {
    /// Resolve a queue name to its URL, or `None` if it does not exist.
    async fn get_queue_url(&self, name: &str) -> PlatformResult<Option<String>>;

    /// Get the ARN of a queue.
    async fn get_queue_arn(&self, url: &str) -> PlatformResult<String>;

    /// Create a queue. Returns its URL.
    async fn create_queue(&self, name: &str, attributes: QueueAttributes)
        -> PlatformResult<String>;

    /// Delete a queue.
    async fn delete_queue(&self, url: &str) -> PlatformResult<()>;
}

/// Artifact storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Bucket the store writes to.
    fn bucket(&self) -> &str;

    /// Write an object.
    async fn put_object(&self, key: &str, body: Bytes) -> PlatformResult<()>;
}

/// The set of clients used by one deployment run.
#[derive(Clone)]
pub struct PlatformClients {
    /// Compute platform.
    pub functions: Arc<dyn FunctionApi>,
    /// Scheduled rules.
    pub rules: Arc<dyn RuleApi>,
    /// Message queues.
    pub queues: Arc<dyn QueueApi>,
    /// Artifact storage.
    pub blobs: Arc<dyn BlobStore>,
}

impl PlatformClients {
    /// Connect to AWS with the credentials of a declaration.
    pub async fn connect(env: &UploadEnv) -> DeployResult<Self> {
        let sdk_config = aws::sdk_config(env).await;
        let blobs = storage::ObjectStoreBlobs::s3(env)?;

        Ok(Self {
            functions: Arc::new(aws::LambdaFunctions::new(&sdk_config)),
            rules: Arc::new(aws::EventBridgeRules::new(&sdk_config)),
            queues: Arc::new(aws::SqsQueues::new(&sdk_config)),
            blobs: Arc::new(blobs),
        })
    }

    /// Use one in-memory platform for every client.
    #[must_use]
    pub fn in_memory(platform: Arc<MemoryPlatform>) -> Self {
        Self {
            functions: platform.clone(),
            rules: platform.clone(),
            queues: platform.clone(),
            blobs: platform,
        }
    }
}

impl std::fmt::Debug for PlatformClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformClients")
            .field("bucket", &self.blobs.bucket())
            .finish_non_exhaustive()
    }
}
