//! The on-disk declaration file and environment resolution.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{DeployError, DeployResult};

use super::{
    Cadence, Declaration, Runtime, Schedule, UploadEnv, DEFAULT_MEMORY_SIZE, DEFAULT_TIMEOUT,
};

/// Source of environment values.
pub trait EnvSource {
    /// Look up a key.
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads values from the process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl EnvSource for BTreeMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// A schedule entry as written in the declaration file.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSchedule {
    /// `hourly` or `daily`.
    pub how_often: String,
    /// Minute of the hour.
    pub at_minute: u32,
    /// Hour of the day, required for `daily`.
    #[serde(default)]
    pub at_hour: Option<u32>,
}

impl RawSchedule {
    /// Validate this entry.
    pub fn validate(&self) -> DeployResult<Schedule> {
        match Cadence::parse(&self.how_often)? {
            Cadence::Hourly => Schedule::hourly(self.at_minute),
            Cadence::Daily => {
                let hour = self.at_hour.ok_or_else(|| {
                    DeployError::InvalidSchedule("daily schedule requires at_hour".to_owned())
                })?;
                Schedule::daily(hour, self.at_minute)
            }
        }
    }
}

/// One entry of the declaration file, before validation.
///
/// Every field is optional here so that a single malformed entry does not
/// prevent the rest of the file from loading.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawDeclaration {
    /// Function name.
    pub function_name: Option<String>,
    /// Runtime tag.
    pub runtime: Option<String>,
    /// Source module names.
    pub src_files: Vec<String>,
    /// Static files and directories.
    pub statics: Vec<PathBuf>,
    /// Dependency names.
    pub deps: Vec<String>,
    /// Declared handler (informational).
    pub handler: Option<String>,
    /// Timeout in seconds.
    pub timeout: Option<u32>,
    /// Memory in MB.
    pub memory_size: Option<u32>,
    /// Execution role.
    pub role: Option<String>,
    /// Layer.
    pub layer: Option<String>,
    /// Schedule triggers.
    pub schedule: Vec<RawSchedule>,
    /// Event source queue.
    pub source_queue_name: Option<String>,
    /// Queue recreated on every deploy.
    pub destination_queue_name: Option<String>,
    /// Names of the platform credential variables.
    pub upload_env: Option<Vec<String>>,
    /// Names of the execution environment variables.
    pub exe_env: Option<Vec<String>>,
}

fn non_empty(value: Option<&String>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

impl RawDeclaration {
    /// Whether every mandatory field is present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        non_empty(self.function_name.as_ref())
            && non_empty(self.runtime.as_ref())
            && !self.src_files.is_empty()
            && self.upload_env.as_ref().is_some_and(|keys| !keys.is_empty())
            && self.exe_env.is_some()
    }

    /// Validate this entry and resolve its environment keys.
    ///
    /// Fails on the first missing or empty key, before any client exists.
    pub fn resolve(&self, env: &dyn EnvSource) -> DeployResult<Declaration> {
        let function_name = self
            .function_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| DeployError::InvalidDeclaration("function_name is required".to_owned()))?;

        let runtime = self
            .runtime
            .as_deref()
            .ok_or_else(|| DeployError::InvalidDeclaration("runtime is required".to_owned()))
            .and_then(Runtime::parse)?;

        if self.src_files.is_empty() {
            return Err(DeployError::InvalidDeclaration(
                "src_files must not be empty".to_owned(),
            ));
        }

        let schedule = self
            .schedule
            .iter()
            .map(RawSchedule::validate)
            .collect::<DeployResult<Vec<_>>>()?;

        let upload_env = resolve_upload_env(self.upload_env.as_deref().unwrap_or_default(), env)?;

        let mut exe_env = BTreeMap::new();
        for key in self.exe_env.as_deref().unwrap_or_default() {
            let value = lookup(env, key).ok_or_else(|| DeployError::missing_env("exe_env", key))?;
            exe_env.insert(key.clone(), value);
        }

        let declaration = Declaration {
            function_name,
            runtime,
            src_files: self.src_files.clone(),
            statics: self.statics.clone(),
            deps: self.deps.clone(),
            declared_handler: self.handler.clone(),
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            memory_size: self.memory_size.unwrap_or(DEFAULT_MEMORY_SIZE),
            role: self.role.clone(),
            layer: self.layer.clone(),
            schedule,
            source_queue_name: self.source_queue_name.clone(),
            destination_queue_name: self.destination_queue_name.clone(),
            upload_env,
            exe_env,
        };

        if let Some(declared) = &declaration.declared_handler {
            if declared != declaration.handler() {
                warn!(
                    function = %declaration.function_name,
                    declared = %declared,
                    effective = declaration.handler(),
                    "declared handler is ignored in favour of the generated entry point"
                );
            }
        }

        if let Some(module) = declaration.missing_entry_module() {
            warn!(
                function = %declaration.function_name,
                module,
                handler = declaration.handler(),
                "no source file provides the entry module"
            );
        }

        declaration.validate()?;
        Ok(declaration)
    }
}

fn lookup(env: &dyn EnvSource, key: &str) -> Option<String> {
    env.var(key).filter(|value| !value.is_empty())
}

fn resolve_upload_env(keys: &[String], env: &dyn EnvSource) -> DeployResult<UploadEnv> {
    let mut values = HashMap::new();
    for key in keys {
        if let Some(value) = lookup(env, key) {
            values.insert(key.as_str(), value);
        }
    }

    let mut take = |key: &'static str| {
        values
            .remove(key)
            .ok_or_else(|| DeployError::missing_env("upload_env", key))
    };
    let access_key_id = take("aws_access_key_id")?;
    let secret_access_key = take("aws_secret_access_key")?;
    let region = take("aws_region")?;
    let bucket = take("aws_s3_bucket")?;

    Ok(UploadEnv {
        access_key_id,
        secret_access_key,
        region,
        bucket,
        bucket_region: values.remove(UploadEnv::BUCKET_REGION_KEY),
    })
}

/// A declaration file: labelled entries, one per function.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct DeclarationFile {
    entries: BTreeMap<String, RawDeclaration>,
}

impl DeclarationFile {
    /// Read and parse a declaration file.
    pub fn load(path: impl AsRef<Path>) -> DeployResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DeployError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let file = Self::parse(&content)?;
        debug!(path = %path.display(), entries = file.entries.len(), "loaded declaration file");
        Ok(file)
    }

    /// Parse declaration file contents.
    pub fn parse(content: &str) -> DeployResult<Self> {
        serde_json::from_str(content)
            .map_err(|e| DeployError::Config(format!("failed to parse declaration file: {e}")))
    }

    /// Split entry keys into complete and incomplete ones.
    #[must_use]
    pub fn partition(&self) -> (Vec<String>, Vec<String>) {
        let (valid, invalid): (Vec<_>, Vec<_>) = self
            .entries
            .iter()
            .partition(|(_, entry)| entry.is_complete());
        (
            valid.into_iter().map(|(key, _)| key.clone()).collect(),
            invalid.into_iter().map(|(key, _)| key.clone()).collect(),
        )
    }

    /// Get a raw entry by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&RawDeclaration> {
        self.entries.get(key)
    }

    /// Resolve the entry `key` into a validated declaration.
    pub fn resolve(&self, key: &str, env: &dyn EnvSource) -> DeployResult<Declaration> {
        let entry = self
            .get(key)
            .ok_or_else(|| DeployError::Config(format!("no declaration named {key}")))?;
        if !entry.is_complete() {
            return Err(DeployError::InvalidDeclaration(format!(
                "{key} is missing one of function_name, runtime, src_files, upload_env, exe_env"
            )));
        }
        entry.resolve(env)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const FILE: &str = r#"{
        "mailer": {
            "function_name": "mailer",
            "runtime": "nodejs18.x",
            "src_files": ["index"],
            "schedule": [{ "how_often": "daily", "at_hour": 3, "at_minute": 0 }],
            "upload_env": ["aws_access_key_id", "aws_secret_access_key", "aws_region", "aws_s3_bucket"],
            "exe_env": ["API_TOKEN"]
        },
        "broken": {
            "function_name": "broken",
            "src_files": []
        }
    }"#;

    fn env() -> HashMap<String, String> {
        [
            ("aws_access_key_id", "AKIA"),
            ("aws_secret_access_key", "secret"),
            ("aws_region", "us-east-1"),
            ("aws_s3_bucket", "artifacts"),
            ("API_TOKEN", "t0ken"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
    }

    #[test]
    fn partition_separates_incomplete_entries() {
        let file = DeclarationFile::parse(FILE).unwrap();
        let (valid, invalid) = file.partition();
        assert_eq!(valid, vec!["mailer"]);
        assert_eq!(invalid, vec!["broken"]);
    }

    #[test]
    fn resolve_fills_defaults() {
        let file = DeclarationFile::parse(FILE).unwrap();
        let decl = file.resolve("mailer", &env()).unwrap();

        assert_eq!(decl.timeout, DEFAULT_TIMEOUT);
        assert_eq!(decl.memory_size, DEFAULT_MEMORY_SIZE);
        assert_eq!(decl.schedule, vec![Schedule::Daily { hour: 3, minute: 0 }]);
        assert_eq!(decl.exe_env.get("API_TOKEN").map(String::as_str), Some("t0ken"));
        assert_eq!(decl.upload_env.bucket, "artifacts");
        assert_eq!(decl.handler(), "lambda/handler.handler");
    }

    #[test]
    fn python_entry_module_is_checked() {
        let file = DeclarationFile::parse(
            r#"{
                "worker": {
                    "function_name": "worker",
                    "runtime": "python3.12",
                    "src_files": ["handler"],
                    "upload_env": ["aws_access_key_id", "aws_secret_access_key", "aws_region", "aws_s3_bucket"],
                    "exe_env": []
                },
                "reporter": {
                    "function_name": "reporter",
                    "runtime": "python3.12",
                    "src_files": ["lambda_function", "helpers"],
                    "upload_env": ["aws_access_key_id", "aws_secret_access_key", "aws_region", "aws_s3_bucket"],
                    "exe_env": []
                }
            }"#,
        )
        .unwrap();

        let worker = file.resolve("worker", &env()).unwrap();
        assert_eq!(worker.missing_entry_module(), Some("lambda_function"));
        let reporter = file.resolve("reporter", &env()).unwrap();
        assert_eq!(reporter.missing_entry_module(), None);

        let mailer = file.resolve("mailer", &env()).unwrap();
        assert_eq!(mailer.missing_entry_module(), None);
    }

    #[test]
    fn missing_exe_env_key_fails() {
        let file = DeclarationFile::parse(FILE).unwrap();
        let mut env = env();
        env.remove("API_TOKEN");

        let err = file.resolve("mailer", &env).unwrap_err();
        assert!(matches!(
            err,
            DeployError::MissingEnv { scope: "exe_env", ref key } if key == "API_TOKEN"
        ));
    }

    #[test]
    fn empty_upload_env_value_fails() {
        let file = DeclarationFile::parse(FILE).unwrap();
        let mut env = env();
        env.insert("aws_s3_bucket".to_owned(), String::new());

        let err = file.resolve("mailer", &env).unwrap_err();
        assert!(matches!(
            err,
            DeployError::MissingEnv { scope: "upload_env", ref key } if key == "aws_s3_bucket"
        ));
    }

    #[test]
    fn daily_without_hour_is_invalid() {
        let raw = RawSchedule {
            how_often: "daily".to_owned(),
            at_minute: 5,
            at_hour: None,
        };
        assert!(matches!(raw.validate(), Err(DeployError::InvalidSchedule(_))));
    }

    #[test]
    fn incomplete_entry_is_not_resolved() {
        let file = DeclarationFile::parse(FILE).unwrap();
        assert!(file.resolve("broken", &env()).unwrap_err().is_configuration());
        assert!(file.resolve("absent", &env()).is_err());
    }
}
