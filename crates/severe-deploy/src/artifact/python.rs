//! Python packaging.
//!
//! Dependencies are installed into a virtual environment whose
//! `site-packages` tree becomes the base of the archive. Statics (copied
//! into the build directory) and the declared sources are then appended
//! at the archive root.

use tracing::{debug, info};

use crate::config::BuildConfig;
use crate::declaration::Declaration;
use crate::error::DeployResult;
use crate::toolchain::{site_packages, Toolchain};

use super::{archive, statics, BuildPaths};

pub(super) async fn build(
    toolchain: &dyn Toolchain,
    config: &BuildConfig,
    decl: &Declaration,
    paths: &BuildPaths,
) -> DeployResult<()> {
    toolchain.python_venv(&paths.venv_dir).await?;
    for dep in &decl.deps {
        debug!(package = %dep, "installing python package");
        toolchain.python_install(&paths.venv_dir, dep).await?;
    }

    tokio::fs::create_dir_all(&paths.build_dir).await?;
    let mut overlay = statics::copy_statics(&decl.statics, &paths.build_dir).await?;
    overlay.extend(
        decl.src_files
            .iter()
            .map(|src| config.source_dir.join(format!("{src}.py"))),
    );

    let base = site_packages(&paths.venv_dir)?;
    archive::zip_directory(&base, &paths.zip_path).await?;
    archive::append_entries(&paths.zip_path, overlay).await?;

    info!(
        deps = decl.deps.len(),
        sources = decl.src_files.len(),
        "python artifact assembled"
    );
    Ok(())
}
