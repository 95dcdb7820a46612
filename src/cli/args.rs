//! Command line argument parsing and validation.

use std::path::PathBuf;

use clap::Parser;

use crate::error::CliError;
use crate::packager::{PackageRequest, PackageType, SettingsBuilder, settings::PRODUCT_NAME};

/// Builds PowerShell installer packages from a compiled output tree
#[derive(Parser, Debug)]
#[command(
    name = "pwsh_packager",
    version,
    about = "Builds PowerShell installer packages from a compiled output tree",
    long_about = "Packages a PowerShell output tree as deb, rpm, osxpkg, msi, appx, zip or AppImage.

Without --type the default package for the current platform is built:
deb on Ubuntu, rpm on CentOS/Fedora/openSUSE, osxpkg on macOS, msi and appx on Windows.

Usage:
  pwsh_packager ./publish 6.0.0
  pwsh_packager ./publish 6.0.0-beta.9 --type zip --name-suffix linux-x64
  pwsh_packager ./publish 6.0.0 --name powershell-preview --type deb"
)]
pub struct Args {
    /// Compiled output tree to package
    #[arg(index = 1, value_name = "SOURCE")]
    pub source: PathBuf,

    /// Semantic version of the product
    #[arg(index = 2, value_name = "VERSION", env = "PWSH_PACKAGE_VERSION")]
    pub package_version: String,

    /// Package type to build (repeatable)
    #[arg(long = "type", short = 't', value_name = "TYPE")]
    pub types: Vec<PackageType>,

    /// Package name; must start with 'powershell'
    #[arg(long, default_value = PRODUCT_NAME)]
    pub name: String,

    /// Suffix for zip, msi and appx file names
    #[arg(long, value_name = "SUFFIX")]
    pub name_suffix: Option<String>,

    /// Legacy Windows runtime the output tree was built for (e.g. win7-x64)
    #[arg(long, value_name = "RUNTIME")]
    pub windows_runtime: Option<String>,

    /// Base package revision
    #[arg(long, default_value = "1")]
    pub iteration: String,

    /// Runtime identifier the output tree is expected to target
    #[arg(long, value_name = "RID", env = "PWSH_PACKAGE_RUNTIME")]
    pub runtime: Option<String>,

    /// Directory packages are written to
    #[arg(long, short = 'o', value_name = "DIR", env = "PWSH_PACKAGE_OUTPUT")]
    pub output: Option<PathBuf>,

    /// TOML settings file
    #[arg(long, value_name = "FILE", env = "PWSH_PACKAGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Keep the staging directory after packaging
    #[arg(long)]
    pub keep_staging: bool,

    /// Only print errors
    #[arg(long, short = 'q')]
    pub quiet: bool,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), CliError> {
        if self.name_suffix.is_some() && self.windows_runtime.is_some() {
            return Err(CliError::ConflictingArguments {
                arguments: vec!["--name-suffix".to_string(), "--windows-runtime".to_string()],
            });
        }
        if self.source.as_os_str().is_empty() {
            return Err(CliError::InvalidArguments {
                reason: "SOURCE must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Request for the first type; the orchestrator re-targets it per type.
    pub fn request(&self) -> PackageRequest {
        let first = self.types.first().copied().unwrap_or(PackageType::Zip);
        let mut request = PackageRequest::new(first, self.package_version.clone())
            .with_name(self.name.clone())
            .with_iteration(self.iteration.clone());
        if let Some(suffix) = &self.name_suffix {
            request = request.with_name_suffix(suffix.clone());
        }
        if let Some(runtime) = &self.windows_runtime {
            request = request.with_windows_runtime(runtime.clone());
        }
        request
    }

    /// Settings layers from the command line on top of the optional file.
    pub fn settings_builder(&self) -> crate::packager::Result<SettingsBuilder> {
        let mut builder = SettingsBuilder::new();
        if let Some(config) = &self.config {
            builder = builder.settings_file(config)?;
        }
        if let Some(runtime) = &self.runtime {
            builder = builder.runtime(runtime.clone());
        }
        if let Some(output) = &self.output {
            builder = builder.output_directory(output.clone());
        }
        if self.keep_staging {
            builder = builder.keep_staging(true);
        }
        Ok(builder)
    }
}
