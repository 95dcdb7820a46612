//! Installer packaging for PowerShell build output.
//!
//! This module turns a compiled output tree into distributable packages:
//! Debian and RPM packages and macOS pkgs through fpm, MSI and APPX
//! installers through the Windows SDK tools, zip archives and AppImages.
//!
//! # Flow
//!
//! ```text
//! PackageRequest ─▶ validate ─▶ PlanResolver (pure) ─▶ StagingManager
//!                                                   ─▶ builder (fpm, WiX, …)
//!                                                   ─▶ StagingArea teardown
//!                                                   ─▶ BuildResult
//! ```
//!
//! # Supported Formats
//!
//! | Platform | Formats | Tools |
//! |----------|---------|-------|
//! | Ubuntu | .deb, AppImage (14.04) | fpm, ronn, bash |
//! | CentOS, Fedora, openSUSE | .rpm | fpm, ronn |
//! | macOS | .pkg | fpm, ronn |
//! | Windows | .msi, .appx | WiX v3, makeappx |
//! | Any | .zip | built in |
//!
//! # Example
//!
//! ```no_run
//! use pwsh_packager::packager::{
//!     JsonMetadataProbe, PackageOrchestrator, PackageRequest, PackageType, PlatformFacts,
//!     ProcessRunner, SettingsBuilder,
//! };
//!
//! # async fn example() -> pwsh_packager::packager::Result<()> {
//! let settings = SettingsBuilder::new().output_directory("out").build()?;
//! let probe = JsonMetadataProbe::new(settings.build_metadata_path("publish".as_ref()));
//! let mut orchestrator =
//!     PackageOrchestrator::new(settings, PlatformFacts::detect()?, ProcessRunner::new(), probe);
//!
//! let request = PackageRequest::new(PackageType::Deb, "6.0.0");
//! for outcome in orchestrator.run("publish".as_ref(), &request, &[]).await? {
//!     println!("{:?}", outcome);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod archive;
pub mod artifact;
pub mod error;
pub mod metadata;
pub mod orchestrator;
pub mod plan;
pub mod platform;
pub mod request;
pub mod scripts;
pub mod settings;
pub mod staging;
pub mod tools;
mod utils;

pub use artifact::BuildResult;
pub use error::{Error, Result};
pub use metadata::{BuildExpectation, BuildMetadata, BuildMetadataProbe, JsonMetadataProbe};
pub use orchestrator::{BuildOutcome, PackageOrchestrator, Phase};
pub use plan::{InstallLayout, PackagePlan, PlanResolver};
pub use platform::{DistroKind, OsFamily, PackageType, PlatformFacts};
pub use request::PackageRequest;
pub use settings::{ExpectedBuild, PackageMetadata, Settings, SettingsBuilder};
pub use staging::{InstallLinkWorkaround, StagingArea, StagingManager};
pub use tools::{ProcessRunner, ToolInvocation, ToolOutput, ToolRunner};
