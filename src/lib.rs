//! # pwsh_packager
//!
//! Builds PowerShell installer packages from a compiled output tree.
//!
//! The library half lives in [`packager`]: platform detection, plan
//! resolution, staging and the per-format builders. [`cli`] wraps it in a
//! command line tool.
//!
//! ## Usage
//!
//! ```bash
//! pwsh_packager ./publish 6.0.0                   # default package for this platform
//! pwsh_packager ./publish 6.0.0 --type zip        # platform-neutral archive
//! pwsh_packager ./publish 6.0.0 --type deb --name powershell-preview
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod cli;
pub mod error;
pub mod packager;

pub use cli::Args;
pub use error::{AppError, CliError, Result};
pub use packager::{BuildOutcome, BuildResult, PackageOrchestrator, PackageRequest, PackageType};
