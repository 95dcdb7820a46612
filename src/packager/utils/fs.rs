//! File system utilities for staging.
//!
//! Copies keep symlinks as symlinks, and removal helpers treat an already
//! absent path as success so teardown can run more than once.

use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::fs;

use crate::packager::error::{Error, ErrorExt, Result};

/// Makes a symbolic link to a directory.
#[cfg(unix)]
fn symlink_dir(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

/// Makes a symbolic link to a directory.
#[cfg(windows)]
fn symlink_dir(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(src, dst)
}

/// Makes a symbolic link to a file.
///
/// The target does not need to exist.
#[cfg(unix)]
pub fn symlink_file(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

/// Makes a symbolic link to a file.
///
/// The target does not need to exist.
#[cfg(windows)]
pub fn symlink_file(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

/// Copies a regular file, creating parent directories of `to`.
pub async fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if !from.is_file() {
        return Err(Error::MissingExpectedFile {
            path: from.to_path_buf(),
        });
    }
    if let Some(dest_dir) = to.parent() {
        fs::create_dir_all(dest_dir)
            .await
            .fs_context("creating directory", dest_dir)?;
    }
    fs::copy(from, to).await.fs_context("copying file", from)?;
    Ok(())
}

/// Recursively copies `from` into `to`, preserving symlinks.
///
/// Fails if `from` is not a directory.
pub async fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    copy_dir_excluding(from, to, &[]).await
}

/// Like [`copy_dir`], but never descends into `to` or any of `exclude`.
///
/// `from` may contain the destination, e.g. when packaging the current
/// directory with the default output location.
pub async fn copy_dir_excluding(from: &Path, to: &Path, exclude: &[&Path]) -> Result<()> {
    if !from.is_dir() {
        crate::bail!("{:?} is not a directory", from);
    }
    fs::create_dir_all(to)
        .await
        .fs_context("creating directory", to)?;

    let skipped = nested_paths(from, exclude.iter().copied().chain([to]))?;
    let walker = walkdir::WalkDir::new(from)
        .into_iter()
        .filter_entry(|entry| !is_skipped(from, entry.path(), &skipped));

    for entry in walker {
        let entry = entry?;
        let rel_path = entry.path().strip_prefix(from)?;
        let dest_path = to.join(rel_path);

        if entry.file_type().is_symlink() {
            let target = fs::read_link(entry.path())
                .await
                .fs_context("reading symlink", entry.path())?;
            let result = if entry.path().is_dir() {
                symlink_dir(&target, &dest_path)
            } else {
                symlink_file(&target, &dest_path)
            };
            result.fs_context("creating symlink", &dest_path)?;
        } else if entry.file_type().is_dir() {
            fs::create_dir_all(&dest_path)
                .await
                .fs_context("creating directory", &dest_path)?;
        } else {
            fs::copy(entry.path(), &dest_path)
                .await
                .fs_context("copying file", entry.path())?;
        }
    }

    Ok(())
}

/// Existing `paths` strictly inside `root`, relative to it.
///
/// Paths are compared after resolving symlinks and `.` components, so a
/// relative `root` still matches an absolute output directory.
pub fn nested_paths<'a>(
    root: &Path,
    paths: impl IntoIterator<Item = &'a Path>,
) -> Result<Vec<PathBuf>> {
    let base = std::fs::canonicalize(root).fs_context("resolving path", root)?;
    Ok(paths
        .into_iter()
        .filter_map(|path| std::fs::canonicalize(path).ok())
        .filter_map(|path| path.strip_prefix(&base).ok().map(Path::to_path_buf))
        .filter(|rel| !rel.as_os_str().is_empty())
        .collect())
}

/// Whether `path` (below `root`) is one of the `skipped` relative paths.
pub fn is_skipped(root: &Path, path: &Path, skipped: &[PathBuf]) -> bool {
    path.strip_prefix(root)
        .map(|rel| skipped.iter().any(|s| s == rel))
        .unwrap_or(false)
}

/// Removes a directory tree if it exists.
pub async fn remove_dir_all(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => {
            Err(e).fs_context("removing directory", path)
        }
        _ => Ok(()),
    }
}

/// Removes a file, symlink or directory without following links.
///
/// Succeeds when nothing exists at `path`.
pub fn remove_path(path: &Path) -> io::Result<()> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    let result = if metadata.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Whether anything, including a dangling symlink, exists at `path`.
pub fn path_exists(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}

/// Sets Unix permission bits. No-op elsewhere.
#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .fs_context("setting permissions", path)
}

/// Sets Unix permission bits. No-op elsewhere.
#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// Renames `from` to `to`, failing with [`Error::MissingExpectedFile`] when
/// `from` is absent.
pub async fn rename_required(from: &Path, to: &Path) -> Result<()> {
    if !path_exists(from) {
        return Err(Error::MissingExpectedFile {
            path: from.to_path_buf(),
        });
    }
    fs::rename(from, to).await.fs_context("renaming", from)
}

/// Size in bytes of `path`.
pub async fn file_size(path: &Path) -> Result<u64> {
    Ok(fs::metadata(path)
        .await
        .fs_context("reading metadata", path)?
        .len())
}

/// Single path matching `pattern`, or an error when there are none or several.
pub fn find_single(pattern: &str) -> Result<PathBuf> {
    let mut matches = glob::glob(pattern)?.filter_map(|p| p.ok());
    match (matches.next(), matches.next()) {
        (Some(path), None) => Ok(path),
        (None, _) => Err(Error::MissingExpectedFile {
            path: PathBuf::from(pattern),
        }),
        (Some(_), Some(_)) => crate::bail!("more than one file matches {}", pattern),
    }
}
