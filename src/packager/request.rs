//! User intent for a single package build.

use semver::{BuildMetadata, Prerelease, Version};

use super::{
    error::{Error, Result},
    platform::PackageType,
    settings::PRODUCT_NAME,
};

/// One requested package.
///
/// Created from CLI input and checked with [`PackageRequest::validate`] before
/// any plan is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRequest {
    /// Package format to produce.
    pub package_type: PackageType,
    /// Package name; must start with `powershell`.
    pub name: String,
    /// Semantic version of the product.
    pub version: String,
    /// Suffix appended to zip/msi/appx file names.
    pub name_suffix: Option<String>,
    /// Legacy Windows runtime the output tree was built for (e.g. `win7-x64`).
    pub windows_downlevel_runtime: Option<String>,
    /// Base package revision.
    pub iteration: String,
}

impl PackageRequest {
    /// Request with the canonical name and iteration `1`.
    ///
    /// A leading `v` (as in git tags) is dropped so every artifact sees the
    /// same version string.
    pub fn new(package_type: PackageType, version: impl Into<String>) -> Self {
        let version = version.into();
        let version = match version.strip_prefix('v') {
            Some(stripped) => stripped.to_string(),
            None => version,
        };
        Self {
            package_type,
            name: PRODUCT_NAME.to_string(),
            version,
            name_suffix: None,
            windows_downlevel_runtime: None,
            iteration: "1".to_string(),
        }
    }

    /// Sets a custom package name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the file name suffix.
    pub fn with_name_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.name_suffix = Some(suffix.into());
        self
    }

    /// Sets the legacy Windows runtime.
    pub fn with_windows_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.windows_downlevel_runtime = Some(runtime.into());
        self
    }

    /// Sets the base iteration.
    pub fn with_iteration(mut self, iteration: impl Into<String>) -> Self {
        self.iteration = iteration.into();
        self
    }

    /// Same request for another package type.
    pub fn for_type(&self, package_type: PackageType) -> Self {
        Self {
            package_type,
            ..self.clone()
        }
    }

    /// Checks name, version and iteration.
    pub fn validate(&self) -> Result<()> {
        if !self.name.starts_with(PRODUCT_NAME) {
            return Err(Error::InvalidRequest(format!(
                "package name '{}' must start with '{}'",
                self.name, PRODUCT_NAME
            )));
        }
        if self.name.contains(['/', '\\']) {
            return Err(Error::InvalidRequest(format!(
                "package name '{}' must not contain path separators",
                self.name
            )));
        }
        if self.iteration.trim().is_empty() {
            return Err(Error::InvalidRequest("iteration must not be empty".to_string()));
        }
        self.semantic_version()?;
        Ok(())
    }

    /// Whether the name is exactly the canonical product name.
    pub fn is_default_name(&self) -> bool {
        self.name == PRODUCT_NAME
    }

    /// Parsed version.
    pub fn semantic_version(&self) -> Result<Version> {
        Version::parse(&self.version).map_err(|e| {
            Error::InvalidRequest(format!("version '{}' is not semantic: {}", self.version, e))
        })
    }

    /// Version with build metadata removed, used in artifact names.
    pub fn version_without_build_metadata(&self) -> Result<String> {
        let mut version = self.semantic_version()?;
        version.build = BuildMetadata::EMPTY;
        Ok(version.to_string())
    }

    /// `major.minor.patch.revision` form required by MSI and APPX.
    ///
    /// The revision is the trailing numeric pre-release identifier
    /// (`6.0.0-beta.5` becomes `6.0.0.5`), or 0.
    pub fn four_part_version(&self) -> Result<String> {
        let version = self.semantic_version()?;
        let revision = trailing_number(&version.pre).unwrap_or(0);
        Ok(format!(
            "{}.{}.{}.{}",
            version.major, version.minor, version.patch, revision
        ))
    }

    /// `<name>-<version>[-<suffix>]` without extension.
    pub fn artifact_base_name(&self, suffix: Option<&str>) -> Result<String> {
        let mut base = format!("{}-{}", self.name, self.version_without_build_metadata()?);
        if let Some(suffix) = suffix.filter(|s| !s.is_empty()) {
            base.push('-');
            base.push_str(suffix);
        }
        Ok(base)
    }
}

fn trailing_number(pre: &Prerelease) -> Option<u64> {
    pre.as_str().rsplit('.').next()?.parse().ok()
}
