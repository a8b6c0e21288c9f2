//! AWS SDK implementations of the platform traits.
//!
//! Every SDK failure is folded into [`PlatformError`]: "does not exist"
//! responses become `NotFound` (or `None` for lookups), "already exists"
//! and "in use" responses become `Conflict`, and everything else becomes
//! `Service` with the full error context rendered.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_credential_types::Credentials;
use aws_sdk_eventbridge::types::{RuleState, Target};
use aws_sdk_lambda::error::DisplayErrorContext;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{Environment, FunctionCode, Runtime};
use aws_sdk_sqs::types::QueueAttributeName;
use aws_types::region::Region;
use tracing::debug;

use crate::declaration::UploadEnv;
use crate::error::{PlatformError, PlatformResult};

use super::{
    CodeLocation, EventSourceMapping, FunctionApi, FunctionConfiguration, FunctionSpec,
    InvokeOutcome, InvokePermission, QueueApi, QueueAttributes, RuleApi, RuleDescription,
    RuleTarget,
};

/// Region every client is built in.
///
/// The function code must sit in a bucket in the function's own region, so
/// clients follow [`UploadEnv::artifact_region`] rather than `aws_region`.
fn client_region(env: &UploadEnv) -> Region {
    Region::new(env.artifact_region().to_owned())
}

/// Build an SDK configuration from declared static credentials.
pub async fn sdk_config(env: &UploadEnv) -> SdkConfig {
    let credentials = Credentials::new(
        env.access_key_id.clone(),
        env.secret_access_key.clone(),
        None,
        None,
        "severe",
    );

    aws_config::defaults(BehaviorVersion::latest())
        .credentials_provider(credentials)
        .region(client_region(env))
        .load()
        .await
}

fn service_error<E: std::error::Error>(operation: &'static str, err: &E) -> PlatformError {
    PlatformError::service(operation, DisplayErrorContext(err).to_string())
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

// ─────────────────────────────────────────────────────────────────────────────
// Lambda
// ─────────────────────────────────────────────────────────────────────────────

/// [`FunctionApi`] backed by AWS Lambda.
#[derive(Debug, Clone)]
pub struct LambdaFunctions {
    client: aws_sdk_lambda::Client,
}

impl LambdaFunctions {
    /// Create a client from an SDK configuration.
    #[must_use]
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_lambda::Client::new(config),
        }
    }
}

fn environment(spec: &FunctionSpec) -> Environment {
    let variables: HashMap<String, String> = spec
        .environment
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Environment::builder().set_variables(Some(variables)).build()
}

fn layers(spec: &FunctionSpec) -> Option<Vec<String>> {
    (!spec.layers.is_empty()).then(|| spec.layers.clone())
}

fn convert_configuration(
    config: &aws_sdk_lambda::types::FunctionConfiguration,
) -> FunctionConfiguration {
    FunctionConfiguration {
        name: config.function_name().unwrap_or_default().to_owned(),
        arn: config.function_arn().unwrap_or_default().to_owned(),
        runtime: config.runtime().map(|r| r.as_str().to_owned()),
        handler: config.handler().map(ToOwned::to_owned),
        timeout: config.timeout().and_then(|t| u32::try_from(t).ok()),
        memory_size: config.memory_size().and_then(|m| u32::try_from(m).ok()),
        role: config.role().map(ToOwned::to_owned),
        layers: config
            .layers()
            .iter()
            .filter_map(|layer| layer.arn().map(ToOwned::to_owned))
            .collect(),
        environment: config
            .environment()
            .and_then(|env| env.variables())
            .map(|vars| vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default(),
    }
}

#[async_trait]
impl FunctionApi for LambdaFunctions {
    async fn get_function(&self, name: &str) -> PlatformResult<Option<FunctionConfiguration>> {
        match self.client.get_function().function_name(name).send().await {
            Ok(output) => Ok(output.configuration().map(convert_configuration)),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception()) =>
            {
                Ok(None)
            }
            Err(err) => Err(service_error("GetFunction", &err)),
        }
    }

    async fn create_function(
        &self,
        spec: &FunctionSpec,
        code: &CodeLocation,
    ) -> PlatformResult<String> {
        let output = self
            .client
            .create_function()
            .function_name(&spec.name)
            .runtime(Runtime::from(spec.runtime.as_str()))
            .handler(&spec.handler)
            .timeout(to_i32(spec.timeout))
            .memory_size(to_i32(spec.memory_size))
            .set_role(spec.role.clone())
            .set_layers(layers(spec))
            .environment(environment(spec))
            .code(
                FunctionCode::builder()
                    .s3_bucket(&code.bucket)
                    .s3_key(&code.key)
                    .build(),
            )
            .send()
            .await
            .map_err(|err| match err.as_service_error() {
                Some(e) if e.is_resource_conflict_exception() => {
                    PlatformError::conflict("CreateFunction", e.to_string())
                }
                _ => service_error("CreateFunction", &err),
            })?;

        Ok(output.function_arn().unwrap_or_default().to_owned())
    }

    async fn update_function_code(&self, name: &str, code: &CodeLocation) -> PlatformResult<()> {
        self.client
            .update_function_code()
            .function_name(name)
            .s3_bucket(&code.bucket)
            .s3_key(&code.key)
            .send()
            .await
            .map_err(|err| service_error("UpdateFunctionCode", &err))?;
        Ok(())
    }

    async fn update_function_configuration(&self, spec: &FunctionSpec) -> PlatformResult<()> {
        self.client
            .update_function_configuration()
            .function_name(&spec.name)
            .runtime(Runtime::from(spec.runtime.as_str()))
            .handler(&spec.handler)
            .timeout(to_i32(spec.timeout))
            .memory_size(to_i32(spec.memory_size))
            .set_role(spec.role.clone())
            .set_layers(layers(spec))
            .environment(environment(spec))
            .send()
            .await
            .map_err(|err| service_error("UpdateFunctionConfiguration", &err))?;
        Ok(())
    }

    async fn delete_function(&self, name: &str) -> PlatformResult<()> {
        self.client
            .delete_function()
            .function_name(name)
            .send()
            .await
            .map_err(|err| match err.as_service_error() {
                Some(e) if e.is_resource_not_found_exception() => {
                    PlatformError::not_found("function", name)
                }
                Some(e) if e.is_resource_conflict_exception() => {
                    PlatformError::conflict("DeleteFunction", e.to_string())
                }
                _ => service_error("DeleteFunction", &err),
            })?;
        Ok(())
    }

    async fn add_permission(&self, grant: &InvokePermission) -> PlatformResult<()> {
        self.client
            .add_permission()
            .function_name(&grant.function_name)
            .statement_id(&grant.statement_id)
            .action("lambda:InvokeFunction")
            .principal(&grant.principal)
            .source_arn(&grant.source_arn)
            .send()
            .await
            .map_err(|err| match err.as_service_error() {
                Some(e) if e.is_resource_conflict_exception() => {
                    PlatformError::conflict("AddPermission", e.to_string())
                }
                _ => service_error("AddPermission", &err),
            })?;
        Ok(())
    }

    async fn list_event_source_mappings(
        &self,
        function_name: &str,
    ) -> PlatformResult<Vec<EventSourceMapping>> {
        let mut mappings = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let output = self
                .client
                .list_event_source_mappings()
                .function_name(function_name)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|err| service_error("ListEventSourceMappings", &err))?;

            mappings.extend(output.event_source_mappings().iter().map(|m| {
                EventSourceMapping {
                    uuid: m.uuid().unwrap_or_default().to_owned(),
                    event_source_arn: m.event_source_arn().map(ToOwned::to_owned),
                    function_arn: m.function_arn().map(ToOwned::to_owned),
                    state: m.state().map(ToOwned::to_owned),
                }
            }));

            match output.next_marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_owned()),
                _ => break,
            }
        }

        debug!(function = %function_name, count = mappings.len(), "listed event source mappings");
        Ok(mappings)
    }

    async fn create_event_source_mapping(
        &self,
        function_name: &str,
        event_source_arn: &str,
        batch_size: u32,
    ) -> PlatformResult<EventSourceMapping> {
        let output = self
            .client
            .create_event_source_mapping()
            .function_name(function_name)
            .event_source_arn(event_source_arn)
            .batch_size(to_i32(batch_size))
            .send()
            .await
            .map_err(|err| match err.as_service_error() {
                Some(e) if e.is_resource_conflict_exception() => {
                    PlatformError::conflict("CreateEventSourceMapping", e.to_string())
                }
                _ => service_error("CreateEventSourceMapping", &err),
            })?;

        Ok(EventSourceMapping {
            uuid: output.uuid().unwrap_or_default().to_owned(),
            event_source_arn: output.event_source_arn().map(ToOwned::to_owned),
            function_arn: output.function_arn().map(ToOwned::to_owned),
            state: output.state().map(ToOwned::to_owned),
        })
    }

    async fn delete_event_source_mapping(&self, uuid: &str) -> PlatformResult<()> {
        self.client
            .delete_event_source_mapping()
            .uuid(uuid)
            .send()
            .await
            .map_err(|err| match err.as_service_error() {
                Some(e) if e.is_resource_not_found_exception() => {
                    PlatformError::not_found("event source mapping", uuid)
                }
                Some(e) if e.is_resource_in_use_exception() => {
                    PlatformError::conflict("DeleteEventSourceMapping", e.to_string())
                }
                _ => service_error("DeleteEventSourceMapping", &err),
            })?;
        Ok(())
    }

    async fn invoke(&self, name: &str, payload: Option<Vec<u8>>) -> PlatformResult<InvokeOutcome> {
        let output = self
            .client
            .invoke()
            .function_name(name)
            .set_payload(payload.map(Blob::new))
            .send()
            .await
            .map_err(|err| match err.as_service_error() {
                Some(e) if e.is_resource_not_found_exception() => {
                    PlatformError::not_found("function", name)
                }
                _ => service_error("Invoke", &err),
            })?;

        Ok(InvokeOutcome {
            status_code: output.status_code(),
            function_error: output.function_error().map(ToOwned::to_owned),
            payload: output
                .payload()
                .map(|blob| blob.as_ref().to_vec())
                .unwrap_or_default(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EventBridge
// ─────────────────────────────────────────────────────────────────────────────

/// [`RuleApi`] backed by Amazon EventBridge.
#[derive(Debug, Clone)]
pub struct EventBridgeRules {
    client: aws_sdk_eventbridge::Client,
}

impl EventBridgeRules {
    /// Create a client from an SDK configuration.
    #[must_use]
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_eventbridge::Client::new(config),
        }
    }
}

#[async_trait]
impl RuleApi for EventBridgeRules {
    async fn list_rule_names_by_target(&self, target_arn: &str) -> PlatformResult<Vec<String>> {
        let mut names = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_rule_names_by_target()
                .target_arn(target_arn)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|err| service_error("ListRuleNamesByTarget", &err))?;

            names.extend(output.rule_names().iter().cloned());

            match output.next_token() {
                Some(next) if !next.is_empty() => next_token = Some(next.to_owned()),
                _ => break,
            }
        }

        Ok(names)
    }

    async fn describe_rule(&self, name: &str) -> PlatformResult<Option<RuleDescription>> {
        match self.client.describe_rule().name(name).send().await {
            Ok(output) => Ok(Some(RuleDescription {
                name: output.name().unwrap_or(name).to_owned(),
                arn: output.arn().map(ToOwned::to_owned),
                schedule_expression: output.schedule_expression().map(ToOwned::to_owned),
                state: output.state().map(|s| s.as_str().to_owned()),
            })),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception()) =>
            {
                Ok(None)
            }
            Err(err) => Err(service_error("DescribeRule", &err)),
        }
    }

    async fn put_rule(&self, name: &str, schedule_expression: &str) -> PlatformResult<String> {
        let output = self
            .client
            .put_rule()
            .name(name)
            .schedule_expression(schedule_expression)
            .state(RuleState::Enabled)
            .send()
            .await
            .map_err(|err| service_error("PutRule", &err))?;

        Ok(output.rule_arn().unwrap_or_default().to_owned())
    }

    async fn list_targets_by_rule(&self, rule: &str) -> PlatformResult<Vec<RuleTarget>> {
        let mut targets = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_targets_by_rule()
                .rule(rule)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|err| match err.as_service_error() {
                    Some(e) if e.is_resource_not_found_exception() => {
                        PlatformError::not_found("rule", rule)
                    }
                    _ => service_error("ListTargetsByRule", &err),
                })?;

            targets.extend(output.targets().iter().map(|t| RuleTarget {
                id: t.id().to_owned(),
                arn: t.arn().to_owned(),
            }));

            match output.next_token() {
                Some(next) if !next.is_empty() => next_token = Some(next.to_owned()),
                _ => break,
            }
        }

        Ok(targets)
    }

    async fn remove_targets(&self, rule: &str, ids: &[String]) -> PlatformResult<()> {
        let output = self
            .client
            .remove_targets()
            .rule(rule)
            .set_ids(Some(ids.to_vec()))
            .send()
            .await
            .map_err(|err| service_error("RemoveTargets", &err))?;

        if output.failed_entry_count() > 0 {
            return Err(PlatformError::service(
                "RemoveTargets",
                format!(
                    "{} target(s) could not be removed from {rule}",
                    output.failed_entry_count()
                ),
            ));
        }
        Ok(())
    }

    async fn put_targets(&self, rule: &str, targets: &[RuleTarget]) -> PlatformResult<()> {
        let targets = targets
            .iter()
            .map(|t| {
                Target::builder()
                    .id(&t.id)
                    .arn(&t.arn)
                    .build()
                    .map_err(|e| PlatformError::service("PutTargets", e.to_string()))
            })
            .collect::<PlatformResult<Vec<_>>>()?;

        let output = self
            .client
            .put_targets()
            .rule(rule)
            .set_targets(Some(targets))
            .send()
            .await
            .map_err(|err| service_error("PutTargets", &err))?;

        if output.failed_entry_count() > 0 {
            return Err(PlatformError::service(
                "PutTargets",
                format!(
                    "{} target(s) could not be attached to {rule}",
                    output.failed_entry_count()
                ),
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SQS
// ─────────────────────────────────────────────────────────────────────────────

/// [`QueueApi`] backed by Amazon SQS.
#[derive(Debug, Clone)]
pub struct SqsQueues {
    client: aws_sdk_sqs::Client,
}

impl SqsQueues {
    /// Create a client from an SDK configuration.
    #[must_use]
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_sqs::Client::new(config),
        }
    }
}

#[async_trait]
impl QueueApi for SqsQueues {
    async fn get_queue_url(&self, name: &str) -> PlatformResult<Option<String>> {
        match self.client.get_queue_url().queue_name(name).send().await {
            Ok(output) => Ok(output.queue_url().map(ToOwned::to_owned)),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_queue_does_not_exist()) =>
            {
                Ok(None)
            }
            Err(err) => Err(service_error("GetQueueUrl", &err)),
        }
    }

    async fn get_queue_arn(&self, url: &str) -> PlatformResult<String> {
        let output = self
            .client
            .get_queue_attributes()
            .queue_url(url)
            .attribute_names(QueueAttributeName::QueueArn)
            .send()
            .await
            .map_err(|err| service_error("GetQueueAttributes", &err))?;

        output
            .attributes()
            .and_then(|attrs| attrs.get(&QueueAttributeName::QueueArn))
            .cloned()
            .ok_or_else(|| {
                PlatformError::service("GetQueueAttributes", format!("no QueueArn for {url}"))
            })
    }

    async fn create_queue(
        &self,
        name: &str,
        attributes: QueueAttributes,
    ) -> PlatformResult<String> {
        let mut request = self
            .client
            .create_queue()
            .queue_name(name)
            .attributes(
                QueueAttributeName::VisibilityTimeout,
                attributes.visibility_timeout_secs.to_string(),
            );
        if attributes.fifo {
            request = request.attributes(QueueAttributeName::FifoQueue, "true");
        }

        let output = request.send().await.map_err(|err| match err.as_service_error() {
            Some(e) if e.is_queue_deleted_recently() || e.is_queue_name_exists() => {
                PlatformError::conflict("CreateQueue", e.to_string())
            }
            _ => service_error("CreateQueue", &err),
        })?;

        Ok(output.queue_url().unwrap_or_default().to_owned())
    }

    async fn delete_queue(&self, url: &str) -> PlatformResult<()> {
        self.client
            .delete_queue()
            .queue_url(url)
            .send()
            .await
            .map_err(|err| service_error("DeleteQueue", &err))?;
        Ok(())
    }
}
