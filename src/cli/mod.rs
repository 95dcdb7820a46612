//! Command line interface for pwsh_packager.
//!
//! Parses arguments, builds [`Settings`](crate::packager::Settings) from the
//! optional settings file and flags, runs one packaging session and reports
//! every outcome.

mod args;
mod output;

pub use args::Args;
pub use output::OutputManager;

use crate::error::{AppError, Result};
use crate::packager::{JsonMetadataProbe, PackageOrchestrator, PlatformFacts, ProcessRunner};

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    execute(args).await
}

/// Runs a packaging session for already parsed arguments.
///
/// Returns exit code 0 when no package type failed. Per-type failures are
/// printed and turned into [`AppError::PackagesFailed`].
pub async fn execute(args: Args) -> Result<i32> {
    args.validate()?;
    let output = OutputManager::new(args.quiet);

    let settings = args.settings_builder()?.build()?;
    let facts = PlatformFacts::detect()?;
    output.info(&format!("Packaging {} on {}", args.source.display(), facts.description()));

    let probe = JsonMetadataProbe::new(settings.build_metadata_path(&args.source));
    let mut orchestrator = PackageOrchestrator::new(settings, facts, ProcessRunner::new(), probe);
    let outcomes = orchestrator
        .run(&args.source, &args.request(), &args.types)
        .await?;

    output.outcomes(&outcomes);

    let failed: Vec<_> = outcomes
        .iter()
        .filter(|outcome| outcome.is_failure())
        .map(|outcome| outcome.package_type())
        .collect();
    if !failed.is_empty() {
        return Err(AppError::PackagesFailed { failed });
    }
    Ok(0)
}
