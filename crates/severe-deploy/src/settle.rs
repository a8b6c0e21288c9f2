//! Waiting for asynchronous deletions to propagate.
//!
//! The platform acknowledges deletions before they take effect. Rather
//! than sleeping for a fixed time, callers re-probe remote state every
//! [`SettleConfig::poll_interval`] until it reports the resource gone,
//! giving up with [`DeployError::Timeout`] after
//! [`SettleConfig::timeout`].

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, sleep_until, Instant};
use tracing::debug;

use crate::config::SettleConfig;
use crate::error::{DeployError, DeployResult};

/// Poll `probe` until it returns `true`.
///
/// The probe runs at least once. Probe errors abort the wait.
pub async fn wait_until<F, Fut>(what: &str, settle: &SettleConfig, mut probe: F) -> DeployResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DeployResult<bool>>,
{
    let limit = settle.timeout();
    let deadline = Instant::now() + limit;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if probe().await? {
            debug!(what, attempts, "settled");
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(DeployError::Timeout {
                what: what.to_owned(),
                limit,
            });
        }
        sleep(settle.poll_interval()).await;
    }
}

/// Sleep until `cooldown` has elapsed since `since`.
pub async fn cool_down(since: Instant, cooldown: Duration) {
    if cooldown.is_zero() {
        return;
    }
    debug!(remaining = ?cooldown.saturating_sub(since.elapsed()), "cooling down");
    sleep_until(since + cooldown).await;
}
