//! Configuration for severe-deploy.

use std::path::PathBuf;
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::{DeployError, DeployResult};

/// Top-level tool configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DeployConfig {
    /// Artifact build configuration.
    #[serde(default)]
    pub build: BuildConfig,

    /// Settling waits after asynchronous deletions.
    #[serde(default)]
    pub settle: SettleConfig,

    /// Queue provisioning configuration.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Path of the declaration file.
    #[serde(default = "default_declarations")]
    pub declarations: PathBuf,
}

fn default_declarations() -> PathBuf {
    PathBuf::from(".severe-extent.json")
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            build: BuildConfig::default(),
            settle: SettleConfig::default(),
            queue: QueueConfig::default(),
            declarations: default_declarations(),
        }
    }
}

impl DeployConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `severe.toml` in the current directory (if present)
    /// 3. Environment variables with `SEVERE_` prefix
    pub fn load() -> DeployResult<Self> {
        Self::from_file("severe.toml")
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> DeployResult<Self> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("SEVERE_").split("__"))
            .extract()
            .map_err(|e| DeployError::Config(e.to_string()))
    }
}

/// Artifact build configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    /// Directory under which per-function build directories are created.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Directory containing the declared source modules.
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,

    /// Python interpreter used to create virtual environments.
    #[serde(default = "default_python")]
    pub python: String,

    /// Node package installer.
    #[serde(default = "default_npm")]
    pub npm: String,

    /// Node package runner used to invoke the transpiler.
    #[serde(default = "default_npx")]
    pub npx: String,
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("src")
}

fn default_python() -> String {
    "python3".to_owned()
}

fn default_npm() -> String {
    "npm".to_owned()
}

fn default_npx() -> String {
    "npx".to_owned()
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            source_dir: default_source_dir(),
            python: default_python(),
            npm: default_npm(),
            npx: default_npx(),
        }
    }
}

/// Settling waits after asynchronous deletions.
#[derive(Debug, Clone, Deserialize)]
pub struct SettleConfig {
    /// Delay between state probes in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Give up waiting after this many seconds.
    #[serde(default = "default_settle_timeout_secs")]
    pub timeout_secs: u64,

    /// Minimum time between deleting a queue and recreating one with the same name.
    #[serde(default = "default_queue_cooldown_secs")]
    pub queue_cooldown_secs: u64,
}

const fn default_poll_interval_ms() -> u64 {
    2000
}

const fn default_settle_timeout_secs() -> u64 {
    120
}

const fn default_queue_cooldown_secs() -> u64 {
    60
}

impl SettleConfig {
    /// Delay between probes.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Overall timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Queue name cooldown.
    #[must_use]
    pub const fn queue_cooldown(&self) -> Duration {
        Duration::from_secs(self.queue_cooldown_secs)
    }
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: default_settle_timeout_secs(),
            queue_cooldown_secs: default_queue_cooldown_secs(),
        }
    }
}

/// Queue provisioning configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Visibility timeout as a multiple of the function timeout.
    #[serde(default = "default_visibility_multiplier")]
    pub visibility_multiplier: u32,

    /// Messages handed to one invocation by the event-source mapping.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

const fn default_visibility_multiplier() -> u32 {
    6
}

const fn default_batch_size() -> u32 {
    1
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            visibility_multiplier: default_visibility_multiplier(),
            batch_size: default_batch_size(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = DeployConfig::default();
        assert_eq!(config.build.source_dir, PathBuf::from("src"));
        assert_eq!(config.settle.timeout(), Duration::from_secs(120));
        assert_eq!(config.queue.visibility_multiplier, 6);
        assert_eq!(config.queue.batch_size, 1);
        assert_eq!(config.declarations, PathBuf::from(".severe-extent.json"));
    }

    #[test]
    fn config_from_toml() {
        let toml = r#"
            declarations = "deploy.json"

            [build]
            work_dir = "/var/tmp/severe"
            python = "python3.12"

            [settle]
            poll_interval_ms = 500
            queue_cooldown_secs = 0
        "#;

        let config: DeployConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.build.work_dir, PathBuf::from("/var/tmp/severe"));
        assert_eq!(config.build.python, "python3.12");
        assert_eq!(config.build.npm, "npm");
        assert_eq!(config.settle.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.settle.queue_cooldown(), Duration::ZERO);
        assert_eq!(config.declarations, PathBuf::from("deploy.json"));
    }
}
