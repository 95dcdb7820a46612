//! Zip packages of the output tree.

use std::{
    fs::File,
    io,
    path::Path,
};
use walkdir::WalkDir;
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

use super::{
    artifact::BuildResult,
    error::{Error, ErrorExt, Result},
    plan::PackagePlan,
    request::PackageRequest,
    utils::fs,
};

/// Zips `source` into `<output_dir>/<name>-<version>[-<suffix>].zip`.
///
/// An existing archive with the same name is replaced.
pub async fn build_zip(
    source: &Path,
    plan: &PackagePlan,
    request: &PackageRequest,
    output_dir: &Path,
) -> Result<BuildResult> {
    let file_name = format!(
        "{}.{}",
        request.artifact_base_name(plan.name_suffix.as_deref())?,
        plan.package_type.extension()
    );
    let zip_path = output_dir.join(file_name);

    tokio::fs::create_dir_all(output_dir)
        .await
        .fs_context("creating output directory", output_dir)?;
    fs::remove_path(&zip_path).fs_context("removing previous archive", &zip_path)?;

    log::info!("Creating zip package {}", zip_path.display());
    let src = source.to_path_buf();
    let dest = zip_path.clone();
    tokio::task::spawn_blocking(move || write_zip(&src, &dest))
        .await
        .map_err(|e| Error::GenericError(format!("Zip creation task failed: {}", e)))??;

    BuildResult::for_artifact(plan.package_type, zip_path).await
}

fn write_zip(source: &Path, dest: &Path) -> Result<()> {
    if !source.is_dir() {
        crate::bail!("{} is not a directory", source.display());
    }
    let file = File::create(dest).fs_context("creating archive", dest)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    // The archive and its output directory may live inside the source tree.
    let skipped = fs::nested_paths(source, [Some(dest), dest.parent()].into_iter().flatten())?;
    let walker = WalkDir::new(source)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !fs::is_skipped(source, entry.path(), &skipped));

    for entry in walker {
        let entry = entry?;
        let rel_path = entry.path().strip_prefix(source)?;
        if rel_path.as_os_str().is_empty() {
            continue;
        }
        let name = rel_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path()).fs_context("reading symlink", entry.path())?;
            zip.add_symlink(name, target.to_string_lossy(), options)?;
        } else if file_type.is_dir() {
            zip.add_directory(name, options)?;
        } else {
            zip.start_file(name, options.unix_permissions(unix_mode(entry.path())?))?;
            let mut input = File::open(entry.path()).fs_context("opening file", entry.path())?;
            io::copy(&mut input, &mut zip).fs_context("compressing file", entry.path())?;
        }
    }

    zip.finish()?;
    Ok(())
}

#[cfg(unix)]
fn unix_mode(path: &Path) -> Result<u32> {
    use std::os::unix::fs::PermissionsExt;
    Ok(std::fs::metadata(path)
        .fs_context("reading metadata", path)?
        .permissions()
        .mode())
}

#[cfg(not(unix))]
fn unix_mode(_path: &Path) -> Result<u32> {
    Ok(0o644)
}
