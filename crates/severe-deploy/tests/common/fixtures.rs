//! Test fixtures for deployment integration tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use severe_deploy::platform::FunctionConfiguration;
use severe_deploy::{
    Declaration, DeployResult, MemoryPlatform, PhaseEvent, ProgressSink, Runtime, Schedule,
    Toolchain, UploadEnv,
};

pub const REGION: &str = "eu-west-1";
pub const BUCKET: &str = "artifacts";

/// Upload environment matching the in-memory platform.
pub fn upload_env() -> UploadEnv {
    UploadEnv {
        access_key_id: "AKIATEST".to_string(),
        secret_access_key: "secret".to_string(),
        region: REGION.to_string(),
        bucket: BUCKET.to_string(),
        bucket_region: None,
    }
}

/// Live configuration of a function deployed earlier.
pub fn live_function(name: &str, runtime: &str, region: &str) -> FunctionConfiguration {
    FunctionConfiguration {
        name: name.to_string(),
        arn: MemoryPlatform::function_arn(region, name),
        runtime: Some(runtime.to_string()),
        handler: Some("lambda/handler.handler".to_string()),
        timeout: Some(3),
        memory_size: Some(128),
        role: None,
        layers: Vec::new(),
        environment: BTreeMap::new(),
    }
}

/// Builder for creating test Declaration instances.
pub struct DeclarationBuilder {
    function_name: String,
    runtime: String,
    src_files: Vec<String>,
    statics: Vec<PathBuf>,
    deps: Vec<String>,
    timeout: u32,
    schedule: Vec<Schedule>,
    source_queue_name: Option<String>,
    destination_queue_name: Option<String>,
    upload_env: UploadEnv,
    exe_env: BTreeMap<String, String>,
}

impl DeclarationBuilder {
    /// Creates a node declaration with a single entry module named after the function.
    pub fn new(function_name: &str) -> Self {
        Self {
            function_name: function_name.to_string(),
            runtime: "nodejs18.x".to_string(),
            src_files: vec![function_name.to_string()],
            statics: Vec::new(),
            deps: Vec::new(),
            timeout: 3,
            schedule: Vec::new(),
            source_queue_name: None,
            destination_queue_name: None,
            upload_env: upload_env(),
            exe_env: BTreeMap::new(),
        }
    }

    pub fn runtime(mut self, runtime: &str) -> Self {
        self.runtime = runtime.to_string();
        self
    }

    pub fn src_files(mut self, files: &[&str]) -> Self {
        self.src_files = files.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_static(mut self, path: impl Into<PathBuf>) -> Self {
        self.statics.push(path.into());
        self
    }

    pub fn with_dep(mut self, dep: &str) -> Self {
        self.deps.push(dep.to_string());
        self
    }

    pub fn timeout(mut self, timeout: u32) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn hourly(mut self, minute: u32) -> Self {
        self.schedule.push(Schedule::hourly(minute).unwrap());
        self
    }

    pub fn daily(mut self, hour: u32, minute: u32) -> Self {
        self.schedule.push(Schedule::daily(hour, minute).unwrap());
        self
    }

    pub fn source_queue(mut self, name: &str) -> Self {
        self.source_queue_name = Some(name.to_string());
        self
    }

    pub fn destination_queue(mut self, name: &str) -> Self {
        self.destination_queue_name = Some(name.to_string());
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.exe_env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn upload_env(mut self, env: UploadEnv) -> Self {
        self.upload_env = env;
        self
    }

    pub fn build(self) -> Declaration {
        Declaration {
            function_name: self.function_name,
            runtime: Runtime::parse(&self.runtime).unwrap(),
            src_files: self.src_files,
            statics: self.statics,
            deps: self.deps,
            declared_handler: None,
            timeout: self.timeout,
            memory_size: 128,
            role: None,
            layer: None,
            schedule: self.schedule,
            source_queue_name: self.source_queue_name,
            destination_queue_name: self.destination_queue_name,
            upload_env: self.upload_env,
            exe_env: self.exe_env,
        }
    }
}

/// Toolchain that lays out what the real tools would produce, without
/// running them.
#[derive(Default)]
pub struct FakeToolchain {
    calls: Mutex<Vec<String>>,
}

impl FakeToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every tool invocation so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn site_packages(venv_dir: &Path) -> PathBuf {
    venv_dir.join("lib").join("python3.12").join("site-packages")
}

#[async_trait]
impl Toolchain for FakeToolchain {
    async fn node_install(&self, build_dir: &Path, package: &str) -> DeployResult<()> {
        self.record(format!("npm install {package}"));
        let dir = build_dir.join("node_modules").join(package);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join("index.js"), "module.exports = {};\n").await?;
        Ok(())
    }

    async fn node_transpile(&self, source: &Path, out_dir: &Path) -> DeployResult<()> {
        let file_name = source.file_name().unwrap();
        self.record(format!("babel {}", file_name.to_string_lossy()));
        let body = tokio::fs::read(source).await?;
        tokio::fs::write(out_dir.join(file_name), body).await?;
        Ok(())
    }

    async fn python_venv(&self, venv_dir: &Path) -> DeployResult<()> {
        self.record("venv".to_string());
        tokio::fs::create_dir_all(site_packages(venv_dir)).await?;
        Ok(())
    }

    async fn python_install(&self, venv_dir: &Path, package: &str) -> DeployResult<()> {
        self.record(format!("pip install {package}"));
        let dir = site_packages(venv_dir).join(package);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join("__init__.py"), "").await?;
        Ok(())
    }
}

/// Progress sink that keeps every event.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<PhaseEvent>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<PhaseEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn event(&self, event: PhaseEvent) {
        self.events.lock().unwrap().push(event);
    }
}
