//! Recorded build metadata and the pre-packaging build check.
//!
//! A compiled output tree cannot be inspected cheaply enough to tell how it
//! was built, so the build step records its options in `psoptions.json` and
//! packaging compares them with what the package format needs.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::error::{Context, Error, ErrorExt, Result};

/// Options of the last build, as recorded by the build step.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct BuildMetadata {
    /// .NET runtime identifier, e.g. `linux-x64`.
    #[serde(rename = "Runtime")]
    pub runtime: String,

    /// Build configuration, e.g. `Release`.
    #[serde(rename = "Configuration")]
    pub configuration: String,

    /// Target framework, e.g. `netcoreapp2.0`.
    #[serde(rename = "Framework")]
    pub framework: String,

    /// Whether assemblies were precompiled (crossgen).
    #[serde(rename = "CrossGen", alias = "Optimized", default)]
    pub optimized: bool,
}

/// Source of recorded build metadata.
pub trait BuildMetadataProbe {
    /// Returns the recorded metadata, or `None` when no build was recorded.
    fn probe(&self) -> Result<Option<BuildMetadata>>;
}

/// Reads metadata from a JSON file.
#[derive(Debug, Clone)]
pub struct JsonMetadataProbe {
    path: PathBuf,
}

impl JsonMetadataProbe {
    /// Probe reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File this probe reads.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BuildMetadataProbe for JsonMetadataProbe {
    fn probe(&self) -> Result<Option<BuildMetadata>> {
        if !self.path.exists() {
            log::debug!("No build metadata at {}", self.path.display());
            return Ok(None);
        }
        let content =
            std::fs::read_to_string(&self.path).fs_context("reading build metadata", &self.path)?;
        let metadata = serde_json::from_str(&content)
            .map_err(Error::from)
            .with_context(|| format!("parsing build metadata {}", self.path.display()))?;
        Ok(Some(metadata))
    }
}

/// Build configuration a package run requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildExpectation {
    /// Runtime identifier.
    pub runtime: String,
    /// Build configuration.
    pub configuration: String,
    /// Target framework.
    pub framework: String,
}

impl BuildExpectation {
    /// ARM builds are never precompiled.
    pub fn requires_optimized(&self) -> bool {
        !self.runtime.to_ascii_lowercase().contains("arm")
    }

    /// Build command that produces a matching output tree.
    pub fn remediation(&self) -> String {
        let crossgen = if self.requires_optimized() { " -CrossGen" } else { "" };
        format!(
            "Start-PSBuild -Clean{} -Runtime {} -Configuration {}",
            crossgen, self.runtime, self.configuration
        )
    }

    /// Fails with [`Error::BuildPrerequisiteMissing`] unless `recorded`
    /// matches on every field.
    pub fn verify(&self, recorded: Option<&BuildMetadata>) -> Result<()> {
        let Some(recorded) = recorded else {
            return Err(Error::BuildPrerequisiteMissing {
                reason: "no recorded build metadata".to_string(),
                remediation: self.remediation(),
            });
        };

        let mut mismatches = Vec::new();
        if recorded.runtime != self.runtime {
            mismatches.push(format!(
                "runtime is '{}', expected '{}'",
                recorded.runtime, self.runtime
            ));
        }
        if recorded.configuration != self.configuration {
            mismatches.push(format!(
                "configuration is '{}', expected '{}'",
                recorded.configuration, self.configuration
            ));
        }
        if recorded.framework != self.framework {
            mismatches.push(format!(
                "framework is '{}', expected '{}'",
                recorded.framework, self.framework
            ));
        }
        if self.requires_optimized() && !recorded.optimized {
            mismatches.push("assemblies were not precompiled".to_string());
        }

        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(Error::BuildPrerequisiteMissing {
                reason: mismatches.join("; "),
                remediation: self.remediation(),
            })
        }
    }
}
