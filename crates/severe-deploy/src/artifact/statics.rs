//! Static file copying.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{DeployError, DeployResult};

use super::blocking;

/// Copy each static file or directory into `dest` under its base name.
///
/// A directory that already exists at the destination is emptied first.
/// Returns the copied paths inside `dest`, in declaration order.
pub async fn copy_statics(statics: &[PathBuf], dest: &Path) -> DeployResult<Vec<PathBuf>> {
    let statics = statics.to_vec();
    let dest = dest.to_owned();
    blocking(move || {
        statics
            .iter()
            .map(|source| copy_one(source, &dest))
            .collect()
    })
    .await
}

fn copy_one(source: &Path, dest: &Path) -> DeployResult<PathBuf> {
    let name = source.file_name().ok_or_else(|| {
        DeployError::InvalidDeclaration(format!("static {} has no file name", source.display()))
    })?;
    let target = dest.join(name);

    if source.is_dir() {
        if target.exists() {
            std::fs::remove_dir_all(&target)?;
        }
        for entry in WalkDir::new(source).follow_links(true) {
            let entry = entry.map_err(std::io::Error::from)?;
            let relative = entry
                .path()
                .strip_prefix(source)
                .map_err(|e| DeployError::Archive(e.to_string()))?;
            let path = target.join(relative);
            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&path)?;
            } else {
                std::fs::copy(entry.path(), &path)?;
            }
        }
    } else if source.is_file() {
        std::fs::copy(source, &target)?;
    } else {
        return Err(DeployError::InvalidDeclaration(format!(
            "static {} does not exist",
            source.display()
        )));
    }

    debug!(source = %source.display(), target = %target.display(), "copied static");
    Ok(target)
}
