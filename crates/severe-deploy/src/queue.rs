//! Queue provisioning.
//!
//! Destination queues are destroyed and recreated on every deploy, so a
//! deploy always leaves a fresh, empty queue behind. Source queues are
//! wired to the function through an event-source mapping, which is only
//! created once the function's final code and configuration are live.

use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::config::{QueueConfig, SettleConfig};
use crate::error::{DeployError, DeployResult, PlatformError};
use crate::platform::{EventSourceMapping, FunctionApi, QueueApi, QueueAttributes};
use crate::settle::{cool_down, wait_until};

/// Longest visibility timeout the platform accepts, in seconds.
pub const MAX_VISIBILITY_TIMEOUT: u32 = 43_200;

const FIFO_SUFFIX: &str = ".fifo";

/// Physical name of a destination queue: the declared name with a
/// `.fifo` suffix appended when absent.
#[must_use]
pub fn destination_queue_name(declared: &str) -> String {
    if declared.ends_with(FIFO_SUFFIX) {
        declared.to_owned()
    } else {
        format!("{declared}{FIFO_SUFFIX}")
    }
}

/// Visibility timeout for a queue consumed by a function with
/// `function_timeout` seconds, capped at [`MAX_VISIBILITY_TIMEOUT`].
#[must_use]
pub fn visibility_timeout(function_timeout: u32, multiplier: u32) -> u32 {
    function_timeout
        .saturating_mul(multiplier)
        .min(MAX_VISIBILITY_TIMEOUT)
}

/// Manages the queues a declaration refers to.
pub struct QueueProvisioner<'a> {
    functions: &'a dyn FunctionApi,
    queues: &'a dyn QueueApi,
    settle: &'a SettleConfig,
    config: &'a QueueConfig,
}

impl<'a> QueueProvisioner<'a> {
    /// Create a provisioner.
    #[must_use]
    pub fn new(
        functions: &'a dyn FunctionApi,
        queues: &'a dyn QueueApi,
        settle: &'a SettleConfig,
        config: &'a QueueConfig,
    ) -> Self {
        Self {
            functions,
            queues,
            settle,
            config,
        }
    }

    /// Recreate the destination queue from scratch. Returns the new URL.
    ///
    /// An existing queue of the same name is deleted first; creation waits
    /// until the deletion is visible and the name cooldown has passed. A
    /// queue still carrying the declared name without the `.fifo` suffix is
    /// deleted as well.
    #[instrument(skip(self))]
    pub async fn prepare_destination(&self, name: &str, function_timeout: u32) -> DeployResult<String> {
        let physical = destination_queue_name(name);

        if physical != name {
            self.delete_settled(name).await?;
        }
        if let Some(deleted_at) = self.delete_settled(&physical).await? {
            cool_down(deleted_at, self.settle.queue_cooldown()).await;
        }

        let attributes = QueueAttributes {
            fifo: true,
            visibility_timeout_secs: visibility_timeout(
                function_timeout,
                self.config.visibility_multiplier,
            ),
        };
        let url = self.queues.create_queue(&physical, attributes).await?;
        info!(
            queue = %physical,
            visibility_timeout = attributes.visibility_timeout_secs,
            "created destination queue"
        );
        Ok(url)
    }

    /// Delete the queue called `name` if it exists and wait until it is
    /// gone. Returns when the delete was issued.
    async fn delete_settled(&self, name: &str) -> DeployResult<Option<Instant>> {
        let Some(url) = self.queues.get_queue_url(name).await? else {
            return Ok(None);
        };
        match self.queues.delete_queue(&url).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err.into()),
        }
        let deleted_at = Instant::now();
        info!(queue = %name, "deleted existing destination queue");

        wait_until(&format!("deletion of queue {name}"), self.settle, || async {
            let url = self.queues.get_queue_url(name).await?;
            Ok::<_, DeployError>(url.is_none())
        })
        .await?;
        Ok(Some(deleted_at))
    }

    /// Map `queue_name` onto `function_name` as an event source.
    #[instrument(skip(self))]
    pub async fn wire_source(
        &self,
        function_name: &str,
        queue_name: &str,
    ) -> DeployResult<EventSourceMapping> {
        let url = self
            .queues
            .get_queue_url(queue_name)
            .await?
            .ok_or_else(|| PlatformError::not_found("queue", queue_name))?;
        let arn = self.queues.get_queue_arn(&url).await?;

        let mapping = self
            .functions
            .create_event_source_mapping(function_name, &arn, self.config.batch_size)
            .await?;
        info!(
            queue = %queue_name,
            uuid = %mapping.uuid,
            batch_size = self.config.batch_size,
            "wired source queue"
        );
        Ok(mapping)
    }
}

/// Delete every event-source mapping of a function and wait until the
/// platform reports none left. Returns how many were deleted.
pub async fn teardown_mappings(
    functions: &dyn FunctionApi,
    function_name: &str,
    settle: &SettleConfig,
) -> DeployResult<usize> {
    let mappings = functions.list_event_source_mappings(function_name).await?;
    let mut deleted = 0;

    for mapping in &mappings {
        if mapping.state.as_deref() == Some("Deleting") {
            continue;
        }
        match functions.delete_event_source_mapping(&mapping.uuid).await {
            Ok(()) => deleted += 1,
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err.into()),
        }
        debug!(uuid = %mapping.uuid, source = ?mapping.event_source_arn, "deleted event source mapping");
    }

    if !mappings.is_empty() {
        wait_until(
            &format!("event source mappings of {function_name} to detach"),
            settle,
            || async {
                let remaining = functions.list_event_source_mappings(function_name).await?;
                Ok::<_, DeployError>(remaining.is_empty())
            },
        )
        .await?;
        info!(function = %function_name, deleted, "event source mappings detached");
    }

    Ok(deleted)
}
