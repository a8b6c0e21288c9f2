//! Zip archive construction.
//!
//! Archives are written in two steps when the contents live under
//! different roots: [`zip_directory`] lays down a base tree, then
//! [`append_entries`] reopens the archive and adds more files and
//! directories at its root.

use std::fs::{File, OpenOptions};
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{DeployError, DeployResult};

use super::blocking;

fn options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// Archive the contents of `src` recursively into a new zip at `dest`.
///
/// Entries are named relative to `src`, so `src` itself is not part of
/// the archive.
pub async fn zip_directory(src: &Path, dest: &Path) -> DeployResult<()> {
    let src = src.to_owned();
    let dest = dest.to_owned();
    blocking(move || zip_directory_sync(&src, &dest)).await
}

/// Append files and directories to the root of an existing archive.
///
/// Each entry is stored under its base name; directories are added
/// recursively.
pub async fn append_entries(archive: &Path, entries: Vec<PathBuf>) -> DeployResult<()> {
    let archive = archive.to_owned();
    blocking(move || append_entries_sync(&archive, &entries)).await
}

fn zip_directory_sync(src: &Path, dest: &Path) -> DeployResult<()> {
    let mut writer = ZipWriter::new(File::create(dest)?);
    let count = write_tree(&mut writer, src, None)?;
    writer.finish()?;

    debug!(src = %src.display(), dest = %dest.display(), entries = count, "zipped directory");
    Ok(())
}

fn append_entries_sync(archive: &Path, entries: &[PathBuf]) -> DeployResult<()> {
    let file = OpenOptions::new().read(true).write(true).open(archive)?;
    let mut writer = ZipWriter::new_append(file)?;

    for entry in entries {
        let name = base_name(entry)?;
        if entry.is_dir() {
            writer.add_directory(name.as_str(), options())?;
            write_tree(&mut writer, entry, Some(&name))?;
        } else if entry.is_file() {
            writer.start_file(name.as_str(), options())?;
            std::io::copy(&mut File::open(entry)?, &mut writer)?;
        } else {
            return Err(DeployError::Archive(format!(
                "{} does not exist",
                entry.display()
            )));
        }
    }
    writer.finish()?;

    debug!(archive = %archive.display(), appended = entries.len(), "appended to archive");
    Ok(())
}

/// Write every file and directory below `root`, optionally under `prefix`.
fn write_tree<W: Write + Seek>(
    writer: &mut ZipWriter<W>,
    root: &Path,
    prefix: Option<&str>,
) -> DeployResult<usize> {
    let mut count = 0;

    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(std::io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| DeployError::Archive(e.to_string()))?;
        let name = entry_name(prefix, relative);

        if entry.file_type().is_dir() {
            writer.add_directory(name, options())?;
        } else {
            writer.start_file(name, options())?;
            std::io::copy(&mut File::open(entry.path())?, &mut *writer)?;
        }
        count += 1;
    }

    Ok(count)
}

fn entry_name(prefix: Option<&str>, relative: &Path) -> String {
    let relative = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    match prefix {
        Some(prefix) => format!("{prefix}/{relative}"),
        None => relative,
    }
}

fn base_name(path: &Path) -> DeployResult<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| DeployError::Archive(format!("{} has no file name", path.display())))
}
