//! Staging of the output tree before a packaging tool runs.
//!
//! The source tree is copied into a private staging root and every transient
//! artifact the packaging tools need (the executable link, maintainer
//! scripts, the compressed man page) is created next to it. All of it is
//! owned by a [`StagingArea`], which tears it down exactly once: through
//! [`StagingArea::unstage`] or, on early returns and unwinding, its `Drop`.

use flate2::{Compression, write::GzEncoder};
use std::{
    fs::File,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tempfile::TempPath;

use super::{
    error::{Error, ErrorExt, Result},
    plan::PackagePlan,
    platform::{OsFamily, PackageType, PlatformFacts},
    request::PackageRequest,
    settings::{PRODUCT_NAME, Settings},
    tools::{ToolInvocation, ToolRunner},
    utils::fs,
};

/// Files renamed when the package uses a custom name.
const RENAMED_FILES: &[&str] = &["", ".dll", ".deps.json", ".runtimeconfig.json", ".pdb"];

/// Links RedHat-family packages ship so the runtime finds OpenSSL 1.0.
const REDHAT_CRYPTO_LINKS: &[(&str, &str)] = &[
    ("libssl.so.1.0.0", "/lib64/libssl.so.10"),
    ("libcrypto.so.1.0.0", "/lib64/libcrypto.so.10"),
];

const DIR_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;
const EXECUTABLE_MODE: u32 = 0o755;

/// Maintainer scripts written to temporary files.
#[derive(Debug)]
struct StagedScripts {
    after_install: TempPath,
    after_remove: TempPath,
}

/// Works around fpm's osxpkg handling of the executable link.
///
/// When the link target exists on the build host, fpm tries to set the
/// link's timestamps through it and aborts with a `utime` error. The
/// existing install is moved aside so the link dangles while fpm runs, and
/// moved back afterwards.
#[derive(Debug)]
pub struct InstallLinkWorkaround {
    original: PathBuf,
    parked: PathBuf,
    restored: bool,
}

impl InstallLinkWorkaround {
    /// Moves `original` to `parked` if it exists.
    ///
    /// Returns `None` when there is nothing to move.
    pub fn engage(original: &Path, parked: &Path) -> Result<Option<Self>> {
        if !fs::path_exists(original) {
            return Ok(None);
        }
        log::warn!(
            "Moving {} to {} while fpm runs",
            original.display(),
            parked.display()
        );
        fs::remove_path(parked).fs_context("removing stale workaround", parked)?;
        std::fs::rename(original, parked).fs_context("moving install target aside", original)?;
        Ok(Some(Self {
            original: original.to_path_buf(),
            parked: parked.to_path_buf(),
            restored: false,
        }))
    }

    /// Moves the parked file back. Safe to call more than once.
    pub fn restore(&mut self) -> io::Result<()> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;
        if !fs::path_exists(&self.parked) {
            return Ok(());
        }
        log::warn!(
            "Restoring {} from {}",
            self.original.display(),
            self.parked.display()
        );
        std::fs::rename(&self.parked, &self.original)
    }
}

impl Drop for InstallLinkWorkaround {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            log::warn!("Failed to restore {}: {}", self.original.display(), e);
        }
    }
}

/// Everything staged for one package build.
#[derive(Debug)]
pub struct StagingArea {
    root: PathBuf,
    scratch: PathBuf,
    keep_root: bool,
    link_source: Option<PathBuf>,
    scripts: Option<StagedScripts>,
    man_page: Option<PathBuf>,
    workaround: Option<InstallLinkWorkaround>,
    released: bool,
}

impl StagingArea {
    fn new(root: PathBuf, scratch: PathBuf, keep_root: bool) -> Self {
        Self {
            root,
            scratch,
            keep_root,
            link_source: None,
            scripts: None,
            man_page: None,
            workaround: None,
            released: false,
        }
    }

    /// Staged copy of the output tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Temporary link to the installed executable.
    pub fn link_source(&self) -> Option<&Path> {
        self.link_source.as_deref()
    }

    /// Post-install script file.
    pub fn after_install_script(&self) -> Option<&Path> {
        self.scripts.as_ref().map(|s| s.after_install.as_ref())
    }

    /// Post-remove script file.
    pub fn after_remove_script(&self) -> Option<&Path> {
        self.scripts.as_ref().map(|s| s.after_remove.as_ref())
    }

    /// Gzipped man page.
    pub fn man_page(&self) -> Option<&Path> {
        self.man_page.as_deref()
    }

    /// Removes every staged artifact and restores moved files.
    ///
    /// Missing files are ignored. Other failures are logged and the first
    /// one is returned after all steps ran.
    pub fn unstage(mut self) -> Result<()> {
        self.release().map_err(Error::from)
    }

    /// Tears down after the package file was written.
    ///
    /// The package is already complete, so cleanup failures are only logged.
    pub fn finish(self, package_type: PackageType) {
        if let Err(e) = self.unstage() {
            log::warn!("Staging cleanup after {} build failed: {}", package_type, e);
        }
    }

    fn release(&mut self) -> io::Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        log::debug!("Tearing down staging at {}", self.root.display());

        let mut first_error = None;
        let mut record = |step: &str, result: io::Result<()>| {
            if let Err(e) = result {
                log::warn!("Staging cleanup ({}) failed: {}", step, e);
                first_error.get_or_insert(e);
            }
        };

        if let Some(link) = self.link_source.take() {
            record("executable link", fs::remove_path(&link));
        }
        if let Some(scripts) = self.scripts.take() {
            record("after-install script", close_temp(scripts.after_install));
            record("after-remove script", close_temp(scripts.after_remove));
        }
        self.man_page = None;
        record("scratch directory", fs::remove_path(&self.scratch));
        if self.keep_root {
            log::info!("Keeping staging root {}", self.root.display());
        } else {
            record("staging root", fs::remove_path(&self.root));
        }
        if let Some(mut workaround) = self.workaround.take() {
            record("install link workaround", workaround.restore());
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("Staging cleanup incomplete: {}", e);
        }
    }
}

fn close_temp(path: TempPath) -> io::Result<()> {
    match path.close() {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Prepares staging areas.
pub struct StagingManager<'a, R: ToolRunner> {
    settings: &'a Settings,
    facts: &'a PlatformFacts,
    runner: &'a R,
    man_converter: PathBuf,
}

impl<'a, R: ToolRunner> StagingManager<'a, R> {
    /// Manager using `ronn` from `PATH`.
    pub fn new(settings: &'a Settings, facts: &'a PlatformFacts, runner: &'a R) -> Self {
        Self {
            settings,
            facts,
            runner,
            man_converter: PathBuf::from("ronn"),
        }
    }

    /// Uses the man page converter found by the dependency precheck.
    pub fn with_man_converter(mut self, path: impl Into<PathBuf>) -> Self {
        self.man_converter = path.into();
        self
    }

    /// Copies `source` into a fresh staging root and nothing else.
    pub async fn stage_copy(&self, source: &Path) -> Result<StagingArea> {
        let root = self.settings.staging_root();
        log::info!("Staging {} into {}", source.display(), root.display());

        fs::remove_dir_all(&root).await?;
        let area = StagingArea::new(
            root,
            self.settings.scratch_directory(),
            self.settings.keep_staging(),
        );
        fs::copy_dir_excluding(
            source,
            area.root(),
            &[
                self.settings.work_directory(),
                self.settings.output_directory(),
            ],
        )
        .await?;
        Ok(area)
    }

    /// Stages `source` for an fpm build of `plan`.
    ///
    /// On error every artifact created so far is torn down before returning.
    pub async fn stage(
        &self,
        source: &Path,
        plan: &PackagePlan,
        request: &PackageRequest,
    ) -> Result<StagingArea> {
        let layout = plan.layout.as_ref().ok_or_else(|| {
            Error::InvalidRequest(format!("{} packages have no install layout", plan.package_type))
        })?;

        let mut area = self.stage_copy(source).await?;

        if !request.is_default_name() {
            rename_product_files(area.root(), &request.name).await?;
        }

        let link = self.settings.link_source_directory().join(&request.name);
        fs::remove_path(&link).fs_context("removing stale executable link", &link)?;
        fs::symlink_file(&layout.executable_path(&request.name), &link)
            .fs_context("creating executable link", &link)?;
        area.link_source = Some(link);

        if self.facts.is_redhat_family() {
            for (name, target) in REDHAT_CRYPTO_LINKS {
                let link = area.root().join(name);
                fs::symlink_file(Path::new(target), &link).fs_context("creating crypto link", &link)?;
            }
        }

        tokio::fs::create_dir_all(&area.scratch)
            .await
            .fs_context("creating scratch directory", &area.scratch)?;

        if let Some(scripts) = &plan.maintainer_scripts {
            area.scripts = Some(StagedScripts {
                after_install: write_temp_script(&area.scratch, "after-install", &scripts.after_install)?,
                after_remove: write_temp_script(&area.scratch, "after-remove", &scripts.after_remove)?,
            });
        }

        let man_page = self.convert_man_page(&area.scratch, &request.name).await?;
        area.man_page = Some(man_page);

        normalize_permissions(area.root(), &request.name)?;
        if let Some(man_page) = &area.man_page {
            fs::set_mode(man_page, FILE_MODE)?;
        }

        if self.facts.family() == OsFamily::MacOS {
            let parked = self
                .settings
                .work_directory()
                .join(format!("_fpm_symlink_hack_{}", request.name));
            area.workaround =
                InstallLinkWorkaround::engage(&layout.executable_path(&request.name), &parked)?;
        }

        Ok(area)
    }

    /// Produces `<scratch>/<name>.1.gz` from the ronn source.
    async fn convert_man_page(&self, scratch: &Path, name: &str) -> Result<PathBuf> {
        let source = self.settings.man_page_source();
        let ronn = scratch.join(format!("{}.1.ronn", name));
        let roff = scratch.join(format!("{}.1", name));
        let gz = scratch.join(format!("{}.1.gz", name));

        fs::copy_file(source, &ronn).await?;
        self.runner
            .run(
                ToolInvocation::new(&self.man_converter)
                    .arg("--roff")
                    .arg(ronn.to_string_lossy())
                    .current_dir(scratch),
            )
            .await?;
        if !roff.is_file() {
            return Err(Error::MissingExpectedFile { path: roff });
        }

        gzip(roff.clone(), gz.clone()).await?;
        tokio::fs::remove_file(&roff)
            .await
            .fs_context("removing uncompressed man page", &roff)?;
        Ok(gz)
    }
}

async fn rename_product_files(root: &Path, name: &str) -> Result<()> {
    for suffix in RENAMED_FILES {
        let from = root.join(format!("{}{}", PRODUCT_NAME, suffix));
        let to = root.join(format!("{}{}", name, suffix));
        log::debug!("Renaming {} to {}", from.display(), to.display());
        fs::rename_required(&from, &to).await?;
    }
    Ok(())
}

fn write_temp_script(dir: &Path, prefix: &str, content: &str) -> Result<TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".sh")
        .tempfile_in(dir)
        .fs_context("creating maintainer script", dir)?;
    file.write_all(content.as_bytes())
        .fs_context("writing maintainer script", file.path().to_path_buf())?;
    Ok(file.into_temp_path())
}

async fn gzip(src: PathBuf, dest: PathBuf) -> Result<()> {
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut input = File::open(&src).fs_context("opening man page", &src)?;
        let output = File::create(&dest).fs_context("creating compressed man page", &dest)?;
        let mut encoder = GzEncoder::new(output, Compression::new(9));
        io::copy(&mut input, &mut encoder).fs_context("compressing man page", &src)?;
        let mut finished = encoder.finish()?;
        finished.flush()?;
        Ok(())
    })
    .await
    .map_err(|e| Error::GenericError(format!("Man page compression task failed: {}", e)))?
}

/// Directories 755, files 644, the executable 755. Symlinks are skipped.
fn normalize_permissions(root: &Path, executable: &str) -> Result<()> {
    for entry in walkdir::WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            continue;
        }
        let mode = if file_type.is_dir() { DIR_MODE } else { FILE_MODE };
        fs::set_mode(entry.path(), mode)?;
    }
    let executable = root.join(executable);
    if executable.is_file() {
        fs::set_mode(&executable, EXECUTABLE_MODE)?;
    }
    Ok(())
}
