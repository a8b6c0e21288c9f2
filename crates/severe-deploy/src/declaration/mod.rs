//! Validated description of one deployable function.
//!
//! A [`Declaration`] is only ever produced by resolving a
//! [`RawDeclaration`] against an environment, so holding one means every
//! required credential and execution variable has a non-empty value.

mod file;

pub use file::{DeclarationFile, EnvSource, ProcessEnv, RawDeclaration, RawSchedule};

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::{DeployError, DeployResult};

/// Default function timeout in seconds.
pub const DEFAULT_TIMEOUT: u32 = 3;

/// Default function memory in MB.
pub const DEFAULT_MEMORY_SIZE: u32 = 128;

/// Packaging strategy selected by the runtime tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeFamily {
    /// `node*` runtimes.
    Node,
    /// `python*` runtimes.
    Python,
}

/// Module a python artifact must contain for its entry point to load.
pub const PYTHON_ENTRY_MODULE: &str = "lambda_function";

impl RuntimeFamily {
    /// Entry point configured on the platform.
    #[must_use]
    pub const fn handler(&self) -> &'static str {
        match self {
            Self::Node => "lambda/handler.handler",
            Self::Python => "lambda_function.lambda_handler",
        }
    }
}

/// A platform runtime tag together with its packaging family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Runtime {
    tag: String,
    family: RuntimeFamily,
}

impl Runtime {
    /// Parse a runtime tag such as `nodejs18.x` or `python3.12`.
    pub fn parse(tag: &str) -> DeployResult<Self> {
        let family = if tag.contains("node") {
            RuntimeFamily::Node
        } else if tag.contains("python") {
            RuntimeFamily::Python
        } else {
            return Err(DeployError::UnsupportedRuntime(tag.to_owned()));
        };

        Ok(Self {
            tag: tag.to_owned(),
            family,
        })
    }

    /// The tag as declared.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.tag
    }

    /// The packaging family.
    #[must_use]
    pub const fn family(&self) -> RuntimeFamily {
        self.family
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag)
    }
}

/// How often a schedule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    /// Every hour at a fixed minute.
    Hourly,
    /// Every day at a fixed hour and minute.
    Daily,
}

impl Cadence {
    /// Parse a declared `how_often` value.
    pub fn parse(value: &str) -> DeployResult<Self> {
        match value {
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            other => Err(DeployError::InvalidSchedule(format!(
                "unknown how_often {other:?}, expected \"hourly\" or \"daily\""
            ))),
        }
    }
}

/// A validated schedule entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Schedule {
    /// Fires at `minute` past every hour.
    Hourly {
        /// Minute of the hour (0-59).
        minute: u8,
    },
    /// Fires once a day at `hour:minute` UTC.
    Daily {
        /// Hour of the day (0-23).
        hour: u8,
        /// Minute of the hour (0-59).
        minute: u8,
    },
}

impl Schedule {
    /// Build an hourly schedule.
    pub fn hourly(minute: u32) -> DeployResult<Self> {
        Ok(Self::Hourly {
            minute: check_range("at_minute", minute, 59)?,
        })
    }

    /// Build a daily schedule.
    pub fn daily(hour: u32, minute: u32) -> DeployResult<Self> {
        Ok(Self::Daily {
            hour: check_range("at_hour", hour, 23)?,
            minute: check_range("at_minute", minute, 59)?,
        })
    }

    /// The cadence of this schedule.
    #[must_use]
    pub const fn cadence(&self) -> Cadence {
        match self {
            Self::Hourly { .. } => Cadence::Hourly,
            Self::Daily { .. } => Cadence::Daily,
        }
    }
}

fn check_range(field: &str, value: u32, max: u32) -> DeployResult<u8> {
    if value > max {
        return Err(DeployError::InvalidSchedule(format!(
            "{field} must be between 0 and {max}, got {value}"
        )));
    }
    u8::try_from(value).map_err(|_| DeployError::InvalidSchedule(format!("{field} out of range")))
}

/// Credentials, region and bucket used to reach the platform.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadEnv {
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Default region, used when no bucket region is given.
    pub region: String,
    /// Bucket receiving the artifact.
    pub bucket: String,
    /// Bucket region when it differs from `region`. Platform clients and
    /// the function follow it too.
    pub bucket_region: Option<String>,
}

impl UploadEnv {
    /// Optional key naming the bucket region.
    pub const BUCKET_REGION_KEY: &'static str = "aws_s3_region";

    /// Required values paired with their keys.
    #[must_use]
    pub fn required_values(&self) -> [(&'static str, &str); 4] {
        [
            ("aws_access_key_id", self.access_key_id.as_str()),
            ("aws_secret_access_key", self.secret_access_key.as_str()),
            ("aws_region", self.region.as_str()),
            ("aws_s3_bucket", self.bucket.as_str()),
        ]
    }

    /// Region the artifact is uploaded to, and therefore the region the
    /// function must live in.
    #[must_use]
    pub fn artifact_region(&self) -> &str {
        self.bucket_region.as_deref().unwrap_or(&self.region)
    }
}

impl fmt::Debug for UploadEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadEnv")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("bucket_region", &self.bucket_region)
            .finish()
    }
}

/// Validated desired state of one function.
#[derive(Debug, Clone)]
pub struct Declaration {
    /// Unique function name; primary key for every remote lookup.
    pub function_name: String,
    /// Runtime tag and packaging family.
    pub runtime: Runtime,
    /// Source module names, first one is the entry module.
    pub src_files: Vec<String>,
    /// Files and directories copied verbatim into the artifact.
    pub statics: Vec<PathBuf>,
    /// Dependencies installed at build time.
    pub deps: Vec<String>,
    /// Declared handler. Informational only; see [`Declaration::handler`].
    pub declared_handler: Option<String>,
    /// Timeout in seconds.
    pub timeout: u32,
    /// Memory in MB.
    pub memory_size: u32,
    /// Execution role passed through to the platform.
    pub role: Option<String>,
    /// Layer passed through to the platform.
    pub layer: Option<String>,
    /// Schedule triggers.
    pub schedule: Vec<Schedule>,
    /// Queue wired as an event source.
    pub source_queue_name: Option<String>,
    /// Queue recreated fresh on every deploy.
    pub destination_queue_name: Option<String>,
    /// Platform credentials.
    pub upload_env: UploadEnv,
    /// Execution environment of the function.
    pub exe_env: BTreeMap<String, String>,
}

impl Declaration {
    /// Entry point configured on the platform.
    ///
    /// This is always the runtime's generated entry point, regardless of
    /// [`Declaration::declared_handler`].
    #[must_use]
    pub const fn handler(&self) -> &'static str {
        self.runtime.family().handler()
    }

    /// Entry module the platform loads but no declared source provides.
    ///
    /// Node artifacts carry a generated shim, so only python sources can
    /// leave the entry point without a module.
    #[must_use]
    pub fn missing_entry_module(&self) -> Option<&'static str> {
        match self.runtime.family() {
            RuntimeFamily::Node => None,
            RuntimeFamily::Python => (!self
                .src_files
                .iter()
                .any(|src| src == PYTHON_ENTRY_MODULE))
            .then_some(PYTHON_ENTRY_MODULE),
        }
    }

    /// Object key of the uploaded artifact.
    #[must_use]
    pub fn artifact_key(&self) -> String {
        format!("{}.zip", self.function_name)
    }

    /// Re-check every invariant. Called by the orchestrator before any
    /// remote call.
    pub fn validate(&self) -> DeployResult<()> {
        if self.function_name.trim().is_empty() {
            return Err(DeployError::InvalidDeclaration(
                "function_name must not be empty".to_owned(),
            ));
        }
        if self.src_files.is_empty() {
            return Err(DeployError::InvalidDeclaration(
                "src_files must not be empty".to_owned(),
            ));
        }
        if self.timeout == 0 || self.memory_size == 0 {
            return Err(DeployError::InvalidDeclaration(
                "timeout and memory_size must be positive".to_owned(),
            ));
        }
        for (key, value) in self.upload_env.required_values() {
            if value.is_empty() {
                return Err(DeployError::missing_env("upload_env", key));
            }
        }
        if let Some((key, _)) = self.exe_env.iter().find(|(_, v)| v.is_empty()) {
            return Err(DeployError::missing_env("exe_env", key.clone()));
        }
        Ok(())
    }
}
