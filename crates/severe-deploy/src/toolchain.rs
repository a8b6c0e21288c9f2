//! External packaging tools.
//!
//! The artifact builder never installs packages or transpiles sources
//! itself. It drives a [`Toolchain`], which by default spawns the
//! configured `npm`, `npx` and `python` executables.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::BuildConfig;
use crate::error::{DeployError, DeployResult};

/// Module installer and source compiler for both runtime families.
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Install one node package into `build_dir`.
    async fn node_install(&self, build_dir: &Path, package: &str) -> DeployResult<()>;

    /// Transpile one source file into `out_dir`.
    async fn node_transpile(&self, source: &Path, out_dir: &Path) -> DeployResult<()>;

    /// Create a python virtual environment at `venv_dir`.
    async fn python_venv(&self, venv_dir: &Path) -> DeployResult<()>;

    /// Install one python package into the virtual environment at `venv_dir`.
    async fn python_install(&self, venv_dir: &Path, package: &str) -> DeployResult<()>;
}

/// [`Toolchain`] that spawns real processes.
#[derive(Debug, Clone)]
pub struct ProcessToolchain {
    npm: String,
    npx: String,
    python: String,
}

impl ProcessToolchain {
    /// Use the executables named in the build configuration.
    #[must_use]
    pub fn new(config: &BuildConfig) -> Self {
        Self {
            npm: config.npm.clone(),
            npx: config.npx.clone(),
            python: config.python.clone(),
        }
    }
}

#[async_trait]
impl Toolchain for ProcessToolchain {
    async fn node_install(&self, build_dir: &Path, package: &str) -> DeployResult<()> {
        let mut cmd = Command::new(&self.npm);
        cmd.args(["install", "--only=prod", "--no-package-lock", "--prefix", "./"])
            .arg(package)
            .current_dir(build_dir);
        run(cmd).await
    }

    async fn node_transpile(&self, source: &Path, out_dir: &Path) -> DeployResult<()> {
        let mut cmd = Command::new(&self.npx);
        cmd.arg("babel").arg(source).arg("--out-dir").arg(out_dir);
        run(cmd).await
    }

    async fn python_venv(&self, venv_dir: &Path) -> DeployResult<()> {
        let mut cmd = Command::new(&self.python);
        cmd.args(["-m", "venv"]).arg(venv_dir);
        run(cmd).await
    }

    async fn python_install(&self, venv_dir: &Path, package: &str) -> DeployResult<()> {
        let mut cmd = Command::new(venv_pip(venv_dir));
        cmd.arg("install").arg(package);
        run(cmd).await
    }
}

fn venv_pip(venv_dir: &Path) -> PathBuf {
    venv_dir.join("bin").join("pip")
}

fn render(cmd: &Command) -> String {
    let std_cmd = cmd.as_std();
    std::iter::once(std_cmd.get_program())
        .chain(std_cmd.get_args())
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run a command to completion, capturing its output.
async fn run(mut cmd: Command) -> DeployResult<()> {
    let command = render(&cmd);
    debug!(command = %command, "running toolchain command");

    let output = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| DeployError::Toolchain {
            command: command.clone(),
            exit_code: -1,
            stderr: format!("failed to spawn: {e}"),
        })?;

    if !output.status.success() {
        return Err(DeployError::Toolchain {
            command,
            exit_code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }
    Ok(())
}

/// Locate `lib/python*/site-packages` inside a virtual environment.
pub fn site_packages(venv_dir: &Path) -> DeployResult<PathBuf> {
    let lib = venv_dir.join("lib");
    for entry in std::fs::read_dir(&lib)? {
        let entry = entry?;
        let is_python = entry.file_name().to_string_lossy().starts_with("python");
        let candidate = entry.path().join("site-packages");
        if is_python && candidate.is_dir() {
            return Ok(candidate);
        }
    }
    Err(DeployError::Toolchain {
        command: format!("locate site-packages in {}", venv_dir.display()),
        exit_code: -1,
        stderr: "no lib/python*/site-packages directory".to_owned(),
    })
}
