//! Configuration for packaging operations.
//!
//! Settings come from three layers, later layers winning:
//! 1. Built-in defaults (package metadata constants, conventional paths)
//! 2. An optional TOML settings file
//! 3. Explicit values set on [`SettingsBuilder`] (the CLI flags)
//!
//! # Settings File
//!
//! ```toml
//! keep_staging = false
//!
//! [package]
//! maintainer = "PowerShell Team <PowerShellTeam@hotmail.com>"
//! category = "shells"
//!
//! [paths]
//! assets = "assets"
//! man_page = "assets/powershell.1.ronn"
//!
//! [build]
//! configuration = "Release"
//! framework = "netcoreapp2.0"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::error::{Context, ErrorExt, Result};

/// Canonical product name; custom package names must start with it.
pub const PRODUCT_NAME: &str = "powershell";

/// Package metadata passed to the packaging tools.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PackageMetadata {
    /// Canonical product name and file prefix.
    pub product_name: String,

    /// Vendor directory under `/opt` or `/usr/local`.
    pub vendor_dir: String,

    /// Package maintainer (fpm `--maintainer`).
    pub maintainer: String,

    /// Vendor (fpm `--vendor`).
    pub vendor: String,

    /// Project homepage.
    pub url: String,

    /// License name.
    pub license: String,

    /// Package description.
    pub description: String,

    /// Package category/section.
    pub category: String,
}

impl Default for PackageMetadata {
    fn default() -> Self {
        Self {
            product_name: PRODUCT_NAME.to_string(),
            vendor_dir: "microsoft".to_string(),
            maintainer: "PowerShell Team <PowerShellTeam@hotmail.com>".to_string(),
            vendor: "Microsoft Corporation".to_string(),
            url: "https://microsoft.com/powershell".to_string(),
            license: "MIT License".to_string(),
            description: "PowerShell is an automation and configuration management platform.\n\
                          It consists of a cross-platform command-line shell and associated scripting language."
                .to_string(),
            category: "shells".to_string(),
        }
    }
}

/// Build configuration the packages expect the output tree to come from.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExpectedBuild {
    /// Runtime identifier; `None` means "the host default".
    pub runtime: Option<String>,

    /// Build configuration, e.g. `Release`.
    pub configuration: String,

    /// Target framework moniker.
    pub framework: String,
}

impl Default for ExpectedBuild {
    fn default() -> Self {
        Self {
            runtime: None,
            configuration: "Release".to_string(),
            framework: "netcoreapp2.0".to_string(),
        }
    }
}

/// Path overrides accepted in the settings file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct PathOverrides {
    output: Option<PathBuf>,
    work: Option<PathBuf>,
    link_source: Option<PathBuf>,
    assets: Option<PathBuf>,
    man_page: Option<PathBuf>,
    appimage_script: Option<PathBuf>,
    build_metadata: Option<PathBuf>,
}

/// On-disk settings file layout.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    package: Option<PackageMetadata>,
    paths: PathOverrides,
    build: Option<ExpectedBuild>,
    keep_staging: Option<bool>,
}

/// Resolved packaging settings.
#[derive(Debug, Clone)]
pub struct Settings {
    metadata: PackageMetadata,
    expected_build: ExpectedBuild,
    output_directory: PathBuf,
    work_directory: PathBuf,
    link_source_directory: PathBuf,
    assets_directory: PathBuf,
    man_page_source: PathBuf,
    appimage_script: PathBuf,
    build_metadata_path: Option<PathBuf>,
    keep_staging: bool,
}

impl Settings {
    /// Package metadata constants.
    pub fn metadata(&self) -> &PackageMetadata {
        &self.metadata
    }

    /// Expected build configuration.
    pub fn expected_build(&self) -> &ExpectedBuild {
        &self.expected_build
    }

    /// Directory artifacts are written to.
    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    /// Directory holding the staging root and scratch files.
    pub fn work_directory(&self) -> &Path {
        &self.work_directory
    }

    /// Staging root (copy of the output tree).
    pub fn staging_root(&self) -> PathBuf {
        self.work_directory.join("staging")
    }

    /// Scratch directory for man page conversion.
    pub fn scratch_directory(&self) -> PathBuf {
        self.work_directory.join("scratch")
    }

    /// Directory the well-known executable link is created in.
    pub fn link_source_directory(&self) -> &Path {
        &self.link_source_directory
    }

    /// Installer assets (wxs, appx manifest, logos).
    pub fn assets_directory(&self) -> &Path {
        &self.assets_directory
    }

    /// ronn source of the man page.
    pub fn man_page_source(&self) -> &Path {
        &self.man_page_source
    }

    /// Script producing the AppImage.
    pub fn appimage_script(&self) -> &Path {
        &self.appimage_script
    }

    /// Build metadata file; defaults to `psoptions.json` inside `source`.
    pub fn build_metadata_path(&self, source: &Path) -> PathBuf {
        self.build_metadata_path
            .clone()
            .unwrap_or_else(|| source.join("psoptions.json"))
    }

    /// Keep the staging root after the build for inspection.
    pub fn keep_staging(&self) -> bool {
        self.keep_staging
    }
}

/// Builder for [`Settings`].
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    file: SettingsFile,
    metadata: Option<PackageMetadata>,
    runtime: Option<String>,
    output_directory: Option<PathBuf>,
    work_directory: Option<PathBuf>,
    link_source_directory: Option<PathBuf>,
    assets_directory: Option<PathBuf>,
    man_page_source: Option<PathBuf>,
    appimage_script: Option<PathBuf>,
    build_metadata_path: Option<PathBuf>,
    keep_staging: Option<bool>,
}

impl SettingsBuilder {
    /// Creates a builder with only defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a TOML settings file as the middle layer.
    pub fn settings_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).fs_context("reading settings file", path)?;
        self.file = toml::from_str(&content)
            .map_err(super::Error::from)
            .with_context(|| format!("parsing settings file {}", path.display()))?;
        Ok(self)
    }

    /// Overrides package metadata.
    pub fn metadata(mut self, metadata: PackageMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Expected runtime identifier of the build output.
    pub fn runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = Some(runtime.into());
        self
    }

    /// Directory artifacts are written to.
    pub fn output_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_directory = Some(path.into());
        self
    }

    /// Directory holding staging state.
    pub fn work_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.work_directory = Some(path.into());
        self
    }

    /// Directory the temporary executable link is created in.
    pub fn link_source_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.link_source_directory = Some(path.into());
        self
    }

    /// Installer assets directory.
    pub fn assets_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.assets_directory = Some(path.into());
        self
    }

    /// ronn man page source.
    pub fn man_page_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.man_page_source = Some(path.into());
        self
    }

    /// AppImage build script.
    pub fn appimage_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.appimage_script = Some(path.into());
        self
    }

    /// Build metadata file.
    pub fn build_metadata_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.build_metadata_path = Some(path.into());
        self
    }

    /// Keep the staging root after packaging.
    pub fn keep_staging(mut self, keep: bool) -> Self {
        self.keep_staging = Some(keep);
        self
    }

    /// Resolves all layers into [`Settings`].
    pub fn build(self) -> Result<Settings> {
        let SettingsBuilder {
            file,
            metadata,
            runtime,
            output_directory,
            work_directory,
            link_source_directory,
            assets_directory,
            man_page_source,
            appimage_script,
            build_metadata_path,
            keep_staging,
        } = self;
        let paths = file.paths;

        let output_directory = match output_directory.or(paths.output) {
            Some(dir) => dir,
            None => std::env::current_dir().fs_context("reading current directory", ".")?,
        };
        let work_directory = work_directory
            .or(paths.work)
            .unwrap_or_else(|| output_directory.join(".pwsh-packaging"));
        let assets_directory = assets_directory
            .or(paths.assets)
            .unwrap_or_else(|| PathBuf::from("assets"));
        let man_page_source = man_page_source
            .or(paths.man_page)
            .unwrap_or_else(|| assets_directory.join(format!("{}.1.ronn", PRODUCT_NAME)));

        let mut expected_build = file.build.unwrap_or_default();
        if runtime.is_some() {
            expected_build.runtime = runtime;
        }

        Ok(Settings {
            metadata: metadata.or(file.package).unwrap_or_default(),
            expected_build,
            output_directory,
            work_directory,
            link_source_directory: link_source_directory
                .or(paths.link_source)
                .unwrap_or_else(std::env::temp_dir),
            assets_directory,
            man_page_source,
            appimage_script: appimage_script
                .or(paths.appimage_script)
                .unwrap_or_else(|| PathBuf::from("tools/appimage.sh")),
            build_metadata_path: build_metadata_path.or(paths.build_metadata),
            keep_staging: keep_staging.or(file.keep_staging).unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_conventions() {
        let settings = SettingsBuilder::new()
            .output_directory("/out")
            .build()
            .unwrap();

        assert_eq!(settings.metadata().product_name, "powershell");
        assert_eq!(settings.metadata().category, "shells");
        assert_eq!(settings.staging_root(), PathBuf::from("/out/.pwsh-packaging/staging"));
        assert_eq!(
            settings.man_page_source(),
            Path::new("assets/powershell.1.ronn")
        );
        assert_eq!(
            settings.build_metadata_path(Path::new("/src")),
            PathBuf::from("/src/psoptions.json")
        );
        assert_eq!(settings.expected_build().configuration, "Release");
        assert!(!settings.keep_staging());
    }

    #[test]
    fn file_layer_is_overridden_by_builder() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("packaging.toml");
        std::fs::write(
            &file,
            r#"
keep_staging = true

[package]
category = "utils"

[paths]
output = "/from-file"
assets = "/assets"

[build]
framework = "netcoreapp2.1"
runtime = "linux-x64"
"#,
        )
        .unwrap();

        let settings = SettingsBuilder::new()
            .settings_file(&file)
            .unwrap()
            .output_directory("/from-cli")
            .runtime("linux-arm")
            .build()
            .unwrap();

        assert_eq!(settings.output_directory(), Path::new("/from-cli"));
        assert_eq!(settings.assets_directory(), Path::new("/assets"));
        assert_eq!(settings.metadata().category, "utils");
        assert_eq!(settings.metadata().vendor, "Microsoft Corporation");
        assert_eq!(settings.expected_build().framework, "netcoreapp2.1");
        assert_eq!(settings.expected_build().runtime.as_deref(), Some("linux-arm"));
        assert!(settings.keep_staging());
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bad.toml");
        std::fs::write(&file, "keep_staging = \"yes\"").unwrap();

        let err = SettingsBuilder::new().settings_file(&file).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }
}
