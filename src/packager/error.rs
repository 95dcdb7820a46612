//! Error types for packaging operations.
//!
//! Every fatal condition of a packaging run maps to one variant here, so the
//! CLI can print an actionable message and callers can match on the cause.
//!
//! # Features
//!
//! - **Context trait**: Add context to errors similar to anyhow
//! - **ErrorExt trait**: Filesystem operations with automatic path context
//! - **bail! macro**: Early return with formatted error messages

use std::{
    fmt::Display,
    io,
    path::{self, PathBuf},
};
use thiserror::Error as DeriveError;

use super::platform::PackageType;

/// Errors returned by the packager.
#[derive(Debug, DeriveError)]
#[non_exhaustive]
pub enum Error {
    /// Error with context. Created by the [`Context`] trait.
    #[error("{0}: {1}")]
    Context(String, Box<Self>),

    /// File system error with path context.
    ///
    /// Created by the [`ErrorExt`] trait's `fs_context` method.
    #[error("{context} {path}: {error}")]
    Fs {
        /// Context describing the operation (e.g., "copying staging tree")
        context: &'static str,
        /// Path that was being accessed
        path: PathBuf,
        /// The underlying I/O error
        error: io::Error,
    },

    /// The compiled output does not match the configuration the package needs.
    ///
    /// Fatal for the whole run; the operator has to rebuild.
    #[error("build output is not suitable for packaging: {reason}. Please rebuild with: {remediation}")]
    BuildPrerequisiteMissing {
        /// Which recorded value did not match
        reason: String,
        /// Build command that produces a suitable output
        remediation: String,
    },

    /// No package type can be built on this platform.
    #[error("building packages for {platform} is unsupported")]
    UnsupportedPlatform {
        /// Human-readable description of the host platform
        platform: String,
    },

    /// An explicit package type was requested on the wrong platform family.
    #[error("must be on {required} to build '{package_type}' packages")]
    PlatformMismatch {
        /// The requested package type
        package_type: PackageType,
        /// Platform the package type requires
        required: &'static str,
    },

    /// A required external tool could not be found.
    #[error("package dependency '{tool}' not found. Install it with: {remediation}")]
    DependencyMissing {
        /// Tool name
        tool: String,
        /// Command that installs the tool
        remediation: String,
    },

    /// A file the staging step renames or reads is absent.
    #[error("expected file is missing: {path}")]
    MissingExpectedFile {
        /// Path that should have existed
        path: PathBuf,
    },

    /// An external tool exited with a non-zero status.
    #[error("{tool} failed with exit code {code:?}:\n{output}")]
    ToolInvocationError {
        /// Tool that failed
        tool: String,
        /// Exit code, if the process was not killed by a signal
        code: Option<i32>,
        /// Captured stdout and stderr
        output: String,
    },

    /// The packaging tool succeeded but its output did not name an artifact.
    #[error("could not find the created package path in tool output: {line:?}")]
    UnparseableToolOutput {
        /// The output line that was inspected
        line: String,
    },

    /// The package request is malformed.
    #[error("invalid package request: {0}")]
    InvalidRequest(String),

    /// Child process could not be spawned at all.
    #[error("failed to run command {command}: {error}")]
    CommandFailed {
        /// Command that failed to execute
        command: String,
        /// The underlying error
        error: io::Error,
    },

    /// Generic I/O error.
    #[error("{0}")]
    IoError(#[from] io::Error),

    /// Error walking directory.
    #[error("{0}")]
    WalkdirError(#[from] walkdir::Error),

    /// Path prefix stripping error.
    #[error("{0}")]
    StripError(#[from] path::StripPrefixError),

    /// ZIP archive creation error.
    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    /// Handlebars template rendering error.
    #[error("{0}")]
    HandleBarsError(#[from] handlebars::RenderError),

    /// Handlebars template parsing error.
    #[error("{0}")]
    Template(#[from] handlebars::TemplateError),

    /// JSON deserialization error (build metadata).
    #[error("{0}")]
    JsonError(#[from] serde_json::error::Error),

    /// TOML deserialization error (settings file).
    #[error("{0}")]
    TomlError(#[from] toml::de::Error),

    /// Invalid glob pattern.
    #[error("{0}")]
    GlobPattern(#[from] glob::PatternError),

    /// Invalid regular expression.
    #[error("{0}")]
    RegexError(#[from] regex::Error),

    /// Generic error with custom message.
    #[error("{0}")]
    GenericError(String),
}

impl Error {
    /// Strips [`Error::Context`] wrappers and returns the underlying cause.
    pub fn root_cause(&self) -> &Self {
        match self {
            Error::Context(_, inner) => inner.root_cause(),
            other => other,
        }
    }
}

/// Convenient type alias for Result.
pub type Result<T> = std::result::Result<T, Error>;

/// Trait for adding context to errors.
///
/// Similar to `anyhow::Context` but integrated with the packager's Error type.
/// Works with both `Result<T, E>` and `Option<T>`.
pub trait Context<T> {
    /// Add context to an error.
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static;

    /// Add context to an error using a closure (lazy evaluation).
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T> Context<T> for Result<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.map_err(|e| Error::Context(context.to_string(), Box::new(e)))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| Error::Context(f().to_string(), Box::new(e)))
    }
}

impl<T> Context<T> for Option<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.ok_or_else(|| Error::GenericError(context.to_string()))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| Error::GenericError(f().to_string()))
    }
}

/// Extension trait for filesystem operations with automatic path context.
pub trait ErrorExt<T> {
    /// Add filesystem context to an I/O error.
    ///
    /// The `context` should be a present-tense verb phrase describing the operation,
    /// e.g., "reading file", "creating directory", "copying binary".
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|error| Error::Fs {
            context,
            path: path.into(),
            error,
        })
    }
}

/// Macro for early return with error.
///
/// Converts the message into a [`Error::GenericError`] and returns immediately.
#[macro_export]
macro_rules! bail {
    ($msg:literal $(,)?) => {
        return Err($crate::packager::error::Error::GenericError($msg.into()))
    };
    ($err:expr $(,)?) => {
        return Err($crate::packager::error::Error::GenericError($err.to_string()))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::packager::error::Error::GenericError(format!($fmt, $($arg)*)))
    };
}
