//! Error types for the packaging command.
//!
//! Packaging failures carry their own detailed [`crate::packager::Error`];
//! this module wraps them together with CLI problems and attaches
//! actionable recovery suggestions.

use thiserror::Error;

use crate::packager::{self, PackageType};

/// Result type alias for command operations
pub type Result<T> = std::result::Result<T, AppError>;

/// Main error type of the binary
#[derive(Error, Debug)]
pub enum AppError {
    /// Packaging errors
    #[error("{0}")]
    Packaging(#[from] packager::Error),

    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// One or more package types failed
    #[error("{} package type(s) failed: {}", .failed.len(), join_types(.failed))]
    PackagesFailed {
        /// Types that failed
        failed: Vec<PackageType>,
    },
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Conflicting arguments
    #[error("Conflicting arguments: {arguments:?}")]
    ConflictingArguments {
        /// Arguments that conflict
        arguments: Vec<String>,
    },
}

fn join_types(types: &[PackageType]) -> String {
    types
        .iter()
        .map(PackageType::short_name)
        .collect::<Vec<_>>()
        .join(", ")
}

impl AppError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            AppError::Packaging(error) => packaging_suggestions(error.root_cause()),
            AppError::Cli(CliError::ConflictingArguments { arguments }) => vec![format!(
                "Pass only one of: {}",
                arguments.join(", ")
            )],
            AppError::PackagesFailed { .. } => {
                vec!["Review the per-package errors above; other packages were still built".to_string()]
            }
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }
}

/// Suggestions for a packaging failure.
pub fn packaging_suggestions(error: &packager::Error) -> Vec<String> {
    use packager::Error;

    match error {
        Error::BuildPrerequisiteMissing { remediation, .. } => vec![
            format!("Rebuild the output tree: {}", remediation),
            "Pass --runtime if the output was built for another runtime".to_string(),
        ],
        Error::DependencyMissing { tool, remediation } => vec![
            format!("Install {}: {}", tool, remediation),
            format!("Make sure {} is on PATH", tool),
        ],
        Error::PlatformMismatch { required, .. } => vec![
            format!("Run on {} or choose another --type", required),
            "Omit --type to build the default package for this platform".to_string(),
        ],
        Error::UnsupportedPlatform { .. } => {
            vec!["Pass --type zip to build a platform-neutral archive".to_string()]
        }
        Error::MissingExpectedFile { path } => vec![format!(
            "Check that {} exists in the output tree or assets directory",
            path.display()
        )],
        Error::ToolInvocationError { tool, .. } => vec![
            format!("Inspect the {} output above", tool),
            "Re-run with RUST_LOG=debug to see the full command line".to_string(),
        ],
        Error::UnparseableToolOutput { .. } => {
            vec!["Check that the installed fpm version reports created packages".to_string()]
        }
        Error::InvalidRequest(_) => {
            vec!["Package names must start with 'powershell' and versions must be semantic".to_string()]
        }
        _ => vec!["Check the error message above for specific details".to_string()],
    }
}
