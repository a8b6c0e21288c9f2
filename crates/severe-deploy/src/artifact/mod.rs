//! Artifact building.
//!
//! Turns a declaration's sources, statics and dependencies into a single
//! zip on local disk. Every build starts from scratch: the function's
//! previous build directory, virtual environment and zip are removed
//! before anything is written.

mod archive;
mod node;
mod python;
mod statics;

pub use archive::{append_entries, zip_directory};
pub use statics::copy_statics;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, instrument};

use crate::config::BuildConfig;
use crate::declaration::{Declaration, RuntimeFamily};
use crate::error::{DeployError, DeployResult};
use crate::toolchain::Toolchain;

/// A built archive and the key it is uploaded under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Archive on local disk.
    pub path: PathBuf,
    /// Object key (`{function_name}.zip`).
    pub key: String,
}

impl Artifact {
    /// Read the archive into memory for upload.
    pub async fn read(&self) -> DeployResult<Bytes> {
        Ok(Bytes::from(tokio::fs::read(&self.path).await?))
    }
}

/// Per-function scratch locations under the work directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPaths {
    /// `{work_dir}/{function_name}_build`
    pub build_dir: PathBuf,
    /// `{work_dir}/{function_name}_venv`
    pub venv_dir: PathBuf,
    /// `{work_dir}/{function_name}.zip`
    pub zip_path: PathBuf,
}

impl BuildPaths {
    /// Paths for `function_name` under `work_dir`.
    #[must_use]
    pub fn new(work_dir: &Path, function_name: &str) -> Self {
        Self {
            build_dir: work_dir.join(format!("{function_name}_build")),
            venv_dir: work_dir.join(format!("{function_name}_venv")),
            zip_path: work_dir.join(format!("{function_name}.zip")),
        }
    }

    /// Remove anything left over from a previous build.
    pub async fn purge(&self) -> DeployResult<()> {
        for dir in [&self.build_dir, &self.venv_dir] {
            if tokio::fs::try_exists(dir).await? {
                tokio::fs::remove_dir_all(dir).await?;
            }
        }
        if tokio::fs::try_exists(&self.zip_path).await? {
            tokio::fs::remove_file(&self.zip_path).await?;
        }
        Ok(())
    }
}

/// Builds deployable archives.
pub struct ArtifactBuilder {
    config: BuildConfig,
    toolchain: Arc<dyn Toolchain>,
}

impl ArtifactBuilder {
    /// Create a builder.
    #[must_use]
    pub fn new(config: BuildConfig, toolchain: Arc<dyn Toolchain>) -> Self {
        Self { config, toolchain }
    }

    /// Scratch locations used for `function_name`.
    #[must_use]
    pub fn paths(&self, function_name: &str) -> BuildPaths {
        BuildPaths::new(&self.config.work_dir, function_name)
    }

    /// Build the artifact for a declaration.
    #[instrument(skip_all, fields(function = %decl.function_name, runtime = %decl.runtime))]
    pub async fn build(&self, decl: &Declaration) -> DeployResult<Artifact> {
        let paths = self.paths(&decl.function_name);
        paths.purge().await?;
        tokio::fs::create_dir_all(&self.config.work_dir).await?;

        match decl.runtime.family() {
            RuntimeFamily::Node => {
                node::build(self.toolchain.as_ref(), &self.config, decl, &paths).await?;
            }
            RuntimeFamily::Python => {
                python::build(self.toolchain.as_ref(), &self.config, decl, &paths).await?;
            }
        }

        info!(path = %paths.zip_path.display(), "artifact built");
        Ok(Artifact {
            path: paths.zip_path,
            key: decl.artifact_key(),
        })
    }
}

impl std::fmt::Debug for ArtifactBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Run blocking filesystem work off the async runtime.
async fn blocking<T, F>(f: F) -> DeployResult<T>
where
    F: FnOnce() -> DeployResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DeployError::Io(e.into()))?
}

fn entry_module(decl: &Declaration) -> DeployResult<&str> {
    decl.src_files
        .first()
        .map(String::as_str)
        .ok_or_else(|| DeployError::InvalidDeclaration("src_files must not be empty".to_owned()))
}
