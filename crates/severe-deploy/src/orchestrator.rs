//! Deployment orchestration.
//!
//! [`Deployer::deploy`] runs the phases of one deployment in a fixed
//! order:
//!
//! 1. validate the declaration (no remote calls before this passes)
//! 2. reset the destination queue
//! 3. check the live function and decide create, update or replace
//! 4. tear down event-source mappings, and the function when replacing
//! 5. build the artifact
//! 6. upload it
//! 7. create or update the function
//! 8. converge schedule rules
//! 9. wire the source queue
//!
//! Each phase is reported to the [`ProgressSink`] and any failure is
//! returned as [`DeployError::Phase`](crate::error::DeployError::Phase)
//! naming the function and phase. The run stops at the first failure and
//! nothing already done is rolled back.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};

use crate::artifact::{Artifact, ArtifactBuilder};
use crate::config::DeployConfig;
use crate::declaration::{Declaration, UploadEnv};
use crate::error::{DeployResult, PlatformError};
use crate::function::{FunctionAction, FunctionReconciler};
use crate::platform::{
    CodeLocation, EventSourceMapping, FunctionConfiguration, InvokeOutcome, PlatformClients,
    RuleDescription,
};
use crate::progress::{Phase, PhaseEvent, PhaseKind, ProgressSink, TracingProgress};
use crate::queue::{self, QueueProvisioner};
use crate::remote::require_arn;
use crate::toolchain::{ProcessToolchain, Toolchain};
use crate::trigger::{TriggerReconciler, TriggerRule};

/// Summary of a successful deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployReport {
    /// Function deployed.
    pub function_name: String,
    /// What was done to the function.
    pub action: FunctionAction,
    /// Live ARN after the deploy.
    pub function_arn: String,
    /// Object key of the uploaded artifact.
    pub artifact_key: String,
    /// Schedule rules now targeting the function.
    pub rules: Vec<TriggerRule>,
    /// URL of the recreated destination queue.
    pub destination_queue_url: Option<String>,
    /// Mapping created for the source queue.
    pub source_mapping: Option<EventSourceMapping>,
}

/// Live view of a deployed function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionInfo {
    /// Live configuration.
    pub configuration: FunctionConfiguration,
    /// Rules targeting the function.
    pub rules: Vec<RuleDescription>,
    /// Event-source mappings of the function.
    pub mappings: Vec<EventSourceMapping>,
}

/// Summary of a removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovalReport {
    /// Function removed.
    pub function_name: String,
    /// Rules the function was detached from.
    pub detached_rules: Vec<String>,
    /// Number of event-source mappings deleted.
    pub deleted_mappings: usize,
}

/// Runs deployments against one set of platform clients.
pub struct Deployer {
    clients: PlatformClients,
    builder: ArtifactBuilder,
    config: DeployConfig,
    progress: Arc<dyn ProgressSink>,
}

impl Deployer {
    /// Create a deployer.
    #[must_use]
    pub fn new(clients: PlatformClients, config: DeployConfig, toolchain: Arc<dyn Toolchain>) -> Self {
        let builder = ArtifactBuilder::new(config.build.clone(), toolchain);
        Self {
            clients,
            builder,
            config,
            progress: Arc::new(TracingProgress),
        }
    }

    /// Connect to AWS with a declaration's credentials and build with the
    /// configured external tools.
    pub async fn connect(upload_env: &UploadEnv, config: DeployConfig) -> DeployResult<Self> {
        let clients = PlatformClients::connect(upload_env).await?;
        let toolchain = Arc::new(ProcessToolchain::new(&config.build));
        Ok(Self::new(clients, config, toolchain))
    }

    /// Report phases to `progress` instead of `tracing`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// The clients this deployer talks to.
    #[must_use]
    pub const fn clients(&self) -> &PlatformClients {
        &self.clients
    }

    /// Deploy one declaration.
    #[instrument(skip_all, fields(function = %decl.function_name))]
    pub async fn deploy(&self, decl: &Declaration) -> DeployResult<DeployReport> {
        let name = decl.function_name.as_str();
        self.phase(name, Phase::Validate, async { decl.validate() })
            .await?;

        let functions = self.clients.functions.as_ref();
        let settle = &self.config.settle;
        let queues = QueueProvisioner::new(
            functions,
            self.clients.queues.as_ref(),
            settle,
            &self.config.queue,
        );
        let reconciler = FunctionReconciler::new(functions, settle);
        let triggers = TriggerReconciler::new(functions, self.clients.rules.as_ref());

        let destination_queue_url = match &decl.destination_queue_name {
            Some(queue) => Some(
                self.phase(
                    name,
                    Phase::DestinationQueue,
                    queues.prepare_destination(queue, decl.timeout),
                )
                .await?,
            ),
            None => None,
        };

        let plan = self
            .phase(name, Phase::FunctionCheck, reconciler.check(decl))
            .await?;
        self.phase(name, Phase::Teardown, reconciler.teardown(decl, &plan))
            .await?;

        let artifact = self
            .phase(name, Phase::Build, self.builder.build(decl))
            .await?;
        let code = self
            .phase(name, Phase::Upload, self.upload(&artifact))
            .await?;

        let function_arn = self
            .phase(
                name,
                Phase::FunctionApply,
                reconciler.apply(decl, plan.action, &code),
            )
            .await?;

        let rules = self
            .phase(
                name,
                Phase::Triggers,
                triggers.converge(name, &function_arn, &decl.schedule),
            )
            .await?;

        let source_mapping = match &decl.source_queue_name {
            Some(queue) => Some(
                self.phase(name, Phase::SourceQueue, queues.wire_source(name, queue))
                    .await?,
            ),
            None => None,
        };

        info!(action = %plan.action, arn = %function_arn, "deploy complete");
        Ok(DeployReport {
            function_name: name.to_owned(),
            action: plan.action,
            function_arn,
            artifact_key: artifact.key,
            rules,
            destination_queue_url,
            source_mapping,
        })
    }

    /// Describe a deployed function and the rules targeting it.
    #[instrument(skip(self))]
    pub async fn info(&self, function_name: &str) -> DeployResult<FunctionInfo> {
        let configuration = self
            .clients
            .functions
            .get_function(function_name)
            .await?
            .ok_or_else(|| PlatformError::not_found("function", function_name))?;

        let mut rules = Vec::new();
        for name in self
            .clients
            .rules
            .list_rule_names_by_target(&configuration.arn)
            .await?
        {
            if let Some(rule) = self.clients.rules.describe_rule(&name).await? {
                rules.push(rule);
            }
        }
        let mappings = self
            .clients
            .functions
            .list_event_source_mappings(function_name)
            .await?;

        Ok(FunctionInfo {
            configuration,
            rules,
            mappings,
        })
    }

    /// Remove a function: detach it from every rule, delete its mappings
    /// and delete it, waiting for each deletion to settle.
    #[instrument(skip(self))]
    pub async fn remove(&self, function_name: &str) -> DeployResult<RemovalReport> {
        let functions = self.clients.functions.as_ref();
        let arn = require_arn(functions, function_name).await?;

        let triggers = TriggerReconciler::new(functions, self.clients.rules.as_ref());
        let detached_rules = triggers.detach(&arn).await?;
        let deleted_mappings =
            queue::teardown_mappings(functions, function_name, &self.config.settle).await?;
        FunctionReconciler::new(functions, &self.config.settle)
            .delete(function_name)
            .await?;

        info!(rules = detached_rules.len(), mappings = deleted_mappings, "function removed");
        Ok(RemovalReport {
            function_name: function_name.to_owned(),
            detached_rules,
            deleted_mappings,
        })
    }

    /// Invoke a function synchronously.
    #[instrument(skip(self, payload))]
    pub async fn invoke(
        &self,
        function_name: &str,
        payload: Option<Vec<u8>>,
    ) -> DeployResult<InvokeOutcome> {
        let outcome = self
            .clients
            .functions
            .invoke(function_name, payload)
            .await?;
        info!(
            status = outcome.status_code,
            function_error = ?outcome.function_error,
            "function invoked"
        );
        Ok(outcome)
    }

    async fn upload(&self, artifact: &Artifact) -> DeployResult<CodeLocation> {
        let body = artifact.read().await?;
        let size = body.len();
        self.clients.blobs.put_object(&artifact.key, body).await?;

        let code = CodeLocation {
            bucket: self.clients.blobs.bucket().to_owned(),
            key: artifact.key.clone(),
        };
        info!(bucket = %code.bucket, key = %code.key, size, "artifact uploaded");
        Ok(code)
    }

    async fn phase<T>(
        &self,
        function: &str,
        phase: Phase,
        work: impl Future<Output = DeployResult<T>>,
    ) -> DeployResult<T> {
        self.emit(function, phase, PhaseKind::Start);
        match work.await {
            Ok(value) => {
                self.emit(function, phase, PhaseKind::End);
                Ok(value)
            }
            Err(err) => {
                self.emit(function, phase, PhaseKind::Error(err.to_string()));
                Err(err.in_phase(function, phase))
            }
        }
    }

    fn emit(&self, function: &str, phase: Phase, kind: PhaseKind) {
        self.progress.event(PhaseEvent {
            function: function.to_owned(),
            phase,
            kind,
        });
    }
}

impl std::fmt::Debug for Deployer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deployer")
            .field("clients", &self.clients)
            .field("builder", &self.builder)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
