//! Common test utilities for deployment integration tests.

#![allow(dead_code, clippy::unwrap_used)]

pub mod fixtures;

use std::path::PathBuf;
use std::sync::Arc;

use fixtures::{FakeToolchain, RecordingProgress, BUCKET, REGION};
use severe_deploy::{
    BuildConfig, DeployConfig, Deployer, MemoryPlatform, PlatformClients, QueueConfig,
    SettleConfig,
};
use tempfile::TempDir;

/// Deployer wired to an in-memory platform and a fake toolchain, building
/// inside a temporary directory.
pub struct TestDeployer {
    pub platform: Arc<MemoryPlatform>,
    pub toolchain: Arc<FakeToolchain>,
    pub progress: Arc<RecordingProgress>,
    pub deployer: Deployer,
    pub source_dir: PathBuf,
    pub work_dir: PathBuf,
    _dir: TempDir,
}

impl TestDeployer {
    /// Creates a deployer whose deletions settle immediately.
    pub fn new() -> Self {
        Self::with_platform(MemoryPlatform::new(REGION, BUCKET))
    }

    /// Creates a deployer whose deletions stay visible for a few probes.
    pub fn with_slow_deletions() -> Self {
        Self::with_platform(MemoryPlatform::new(REGION, BUCKET).with_settle_polls(2))
    }

    pub fn with_platform(platform: MemoryPlatform) -> Self {
        let dir = TempDir::new().unwrap();
        let source_dir = dir.path().join("src");
        let work_dir = dir.path().join("work");
        std::fs::create_dir_all(&source_dir).unwrap();

        let config = DeployConfig {
            build: BuildConfig {
                work_dir: work_dir.clone(),
                source_dir: source_dir.clone(),
                ..BuildConfig::default()
            },
            settle: fast_settle(),
            queue: QueueConfig::default(),
            ..DeployConfig::default()
        };

        let platform = Arc::new(platform);
        let toolchain = Arc::new(FakeToolchain::new());
        let progress = Arc::new(RecordingProgress::default());
        let deployer = Deployer::new(
            PlatformClients::in_memory(platform.clone()),
            config,
            toolchain.clone(),
        )
        .with_progress(progress.clone());

        Self {
            platform,
            toolchain,
            progress,
            deployer,
            source_dir,
            work_dir,
            _dir: dir,
        }
    }

    /// Writes a source module into the source directory.
    pub fn write_source(&self, file_name: &str, contents: &str) {
        std::fs::write(self.source_dir.join(file_name), contents).unwrap();
    }

    /// Creates a static file or directory tree next to the sources and
    /// returns its path.
    pub fn write_static(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.source_dir.parent().unwrap().join("static").join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }
}

impl Default for TestDeployer {
    fn default() -> Self {
        Self::new()
    }
}

/// Settling that polls quickly and skips the queue cooldown.
pub fn fast_settle() -> SettleConfig {
    SettleConfig {
        poll_interval_ms: 10,
        timeout_secs: 5,
        queue_cooldown_secs: 0,
    }
}
