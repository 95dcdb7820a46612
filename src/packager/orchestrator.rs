//! Package orchestration.
//!
//! [`PackageOrchestrator`] runs one packaging session:
//! 1. Verifies the output tree came from a suitable build
//! 2. Determines which package types to create
//! 3. Resolves a plan per type and delegates to the matching builder
//! 4. Collects one [`BuildOutcome`] per type
//!
//! The build check is global and aborts the session. Everything after it is
//! per type: a failing package is recorded and the next type is attempted.

use std::path::Path;

use super::{
    archive,
    artifact::BuildResult,
    error::{Error, Result},
    metadata::{BuildExpectation, BuildMetadataProbe},
    plan::{PackagePlan, PlanResolver},
    platform::{OsFamily, PackageType, PlatformFacts, appimage, unix, windows},
    request::PackageRequest,
    settings::Settings,
    staging::StagingManager,
    tools::ToolRunner,
};

/// The only Ubuntu release the AppImage script supports.
const APPIMAGE_UBUNTU_RELEASE: &str = "14.04";

/// Progress of a packaging session.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    /// Nothing checked yet.
    Idle,
    /// Recorded build metadata matched the expectation.
    BuildVerified,
    /// Package types are known.
    TypeResolved,
    /// Every type was attempted.
    Built,
    /// Outcomes were handed back.
    Finalized,
}

/// Result of one requested package type.
#[derive(Debug)]
pub enum BuildOutcome {
    /// The package was created.
    Built(BuildResult),
    /// The type does not apply here; not an error.
    Skipped {
        /// Skipped package type.
        package_type: PackageType,
        /// Why it was skipped.
        reason: String,
    },
    /// Building the package failed.
    Failed {
        /// Failed package type.
        package_type: PackageType,
        /// The cause.
        error: Error,
    },
}

impl BuildOutcome {
    /// Package type this outcome belongs to.
    pub fn package_type(&self) -> PackageType {
        match self {
            BuildOutcome::Built(result) => result.package_type,
            BuildOutcome::Skipped { package_type, .. }
            | BuildOutcome::Failed { package_type, .. } => *package_type,
        }
    }

    /// Whether the type failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, BuildOutcome::Failed { .. })
    }
}

/// Package types built when none are requested.
pub fn infer_types(facts: &PlatformFacts) -> Result<Vec<PackageType>> {
    if facts.is_ubuntu() {
        Ok(vec![PackageType::Deb])
    } else if facts.is_redhat_family() {
        Ok(vec![PackageType::Rpm])
    } else {
        match facts.family() {
            OsFamily::MacOS => Ok(vec![PackageType::OsxPkg]),
            OsFamily::Windows => Ok(vec![PackageType::Msi, PackageType::Appx]),
            OsFamily::Linux => Err(Error::UnsupportedPlatform {
                platform: facts.description(),
            }),
        }
    }
}

/// Drives a packaging session.
pub struct PackageOrchestrator<R: ToolRunner, P: BuildMetadataProbe> {
    settings: Settings,
    facts: PlatformFacts,
    runner: R,
    probe: P,
    phase: Phase,
}

impl<R: ToolRunner, P: BuildMetadataProbe> PackageOrchestrator<R, P> {
    /// Creates an idle orchestrator.
    pub fn new(settings: Settings, facts: PlatformFacts, runner: R, probe: P) -> Self {
        Self {
            settings,
            facts,
            runner,
            probe,
            phase: Phase::Idle,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Settings of this session.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Platform of this session.
    pub fn facts(&self) -> &PlatformFacts {
        &self.facts
    }

    /// Build configuration `request` needs.
    pub fn expectation(&self, request: &PackageRequest) -> BuildExpectation {
        let expected = self.settings.expected_build();
        let runtime = request
            .windows_downlevel_runtime
            .clone()
            .or_else(|| expected.runtime.clone())
            .unwrap_or_else(|| self.facts.default_runtime());
        BuildExpectation {
            runtime,
            configuration: expected.configuration.clone(),
            framework: expected.framework.clone(),
        }
    }

    /// Compares recorded build metadata with [`Self::expectation`].
    pub fn verify_build(&mut self, request: &PackageRequest) -> Result<()> {
        self.phase = Phase::Idle;
        let recorded = self.probe.probe()?;
        self.expectation(request).verify(recorded.as_ref())?;
        self.phase = Phase::BuildVerified;
        log::debug!("Phase: {:?}", self.phase);
        Ok(())
    }

    /// Requested types, or the platform default when none are given.
    pub fn resolve_types(&mut self, requested: &[PackageType]) -> Result<Vec<PackageType>> {
        let types = if requested.is_empty() {
            let inferred = infer_types(&self.facts)?;
            log::info!(
                "No package type requested; building {} for {}",
                inferred
                    .iter()
                    .map(PackageType::short_name)
                    .collect::<Vec<_>>()
                    .join(", "),
                self.facts.description()
            );
            inferred
        } else {
            requested.to_vec()
        };
        self.phase = Phase::TypeResolved;
        log::debug!("Phase: {:?}", self.phase);
        Ok(types)
    }

    /// Packages `source` as every type in `types` (or the platform default).
    ///
    /// Fails only for session-wide problems: an invalid request, an
    /// unsuitable build, or a platform without a default type. Per-type
    /// failures are returned as [`BuildOutcome::Failed`].
    pub async fn run(
        &mut self,
        source: &Path,
        request: &PackageRequest,
        types: &[PackageType],
    ) -> Result<Vec<BuildOutcome>> {
        request.validate()?;
        self.verify_build(request)?;
        let types = self.resolve_types(types)?;

        let mut outcomes = Vec::with_capacity(types.len());
        for package_type in types {
            let request = request.for_type(package_type);
            let outcome = match self.build_one(source, &request).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    log::error!("Failed to create {} package: {}", package_type, error);
                    BuildOutcome::Failed {
                        package_type,
                        error,
                    }
                }
            };
            outcomes.push(outcome);
        }
        self.phase = Phase::Built;
        log::debug!("Phase: {:?}", self.phase);

        self.phase = Phase::Finalized;
        Ok(outcomes)
    }

    async fn build_one(&self, source: &Path, request: &PackageRequest) -> Result<BuildOutcome> {
        let package_type = request.package_type;
        if package_type == PackageType::AppImage
            && self.facts.ubuntu_release() != Some(APPIMAGE_UBUNTU_RELEASE)
        {
            let reason = format!("AppImage can only be built on Ubuntu {}", APPIMAGE_UBUNTU_RELEASE);
            log::warn!("Skipping AppImage: {}", reason);
            return Ok(BuildOutcome::Skipped {
                package_type,
                reason,
            });
        }

        let plan = PlanResolver::new(self.settings.metadata()).resolve(request, &self.facts)?;
        let result = match package_type {
            PackageType::Deb | PackageType::Rpm | PackageType::OsxPkg => {
                self.build_with_fpm(source, &plan, request).await?
            }
            PackageType::Zip => {
                archive::build_zip(source, &plan, request, self.settings.output_directory()).await?
            }
            PackageType::Msi => {
                windows::WindowsInstallerBuilder::new(&self.settings, &self.facts, &self.runner)
                    .build_msi(source, &plan, request)
                    .await?
            }
            PackageType::Appx => {
                windows::WindowsInstallerBuilder::new(&self.settings, &self.facts, &self.runner)
                    .build_appx(source, &plan, request)
                    .await?
            }
            PackageType::AppImage => {
                appimage::build_appimage(&self.runner, &self.settings, request).await?
            }
        };
        Ok(BuildOutcome::Built(result))
    }

    async fn build_with_fpm(
        &self,
        source: &Path,
        plan: &PackagePlan,
        request: &PackageRequest,
    ) -> Result<BuildResult> {
        let tools = unix::precheck(&self.runner)?;
        let area = StagingManager::new(&self.settings, &self.facts, &self.runner)
            .with_man_converter(&tools.ronn)
            .stage(source, plan, request)
            .await?;

        let result = unix::PackageBuilder::new(&self.settings, &self.facts, &self.runner)
            .with_fpm(&tools.fpm)
            .build(plan, &area)
            .await;

        area.finish(plan.package_type);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packager::{
        metadata::BuildMetadata,
        settings::SettingsBuilder,
        tools::{
            ToolOutput,
            testing::{FakeRunner, fake_ronn},
        },
        utils::fs,
    };

    struct StaticProbe(Option<BuildMetadata>);

    impl BuildMetadataProbe for StaticProbe {
        fn probe(&self) -> Result<Option<BuildMetadata>> {
            Ok(self.0.clone())
        }
    }

    fn built(runtime: &str) -> StaticProbe {
        StaticProbe(Some(BuildMetadata {
            runtime: runtime.to_string(),
            configuration: "Release".to_string(),
            framework: "netcoreapp2.0".to_string(),
            optimized: true,
        }))
    }

    struct Fixture {
        dir: tempfile::TempDir,
        source: std::path::PathBuf,
        settings: Settings,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("publish");
        std::fs::create_dir_all(&source).unwrap();
        for suffix in ["", ".dll", ".deps.json", ".runtimeconfig.json", ".pdb"] {
            std::fs::write(source.join(format!("powershell{}", suffix)), "x").unwrap();
        }
        let assets = dir.path().join("assets");
        std::fs::create_dir_all(&assets).unwrap();
        std::fs::write(assets.join("powershell.1.ronn"), "powershell(1)").unwrap();
        let links = dir.path().join("links");
        std::fs::create_dir_all(&links).unwrap();

        let settings = SettingsBuilder::new()
            .output_directory(dir.path().join("out"))
            .assets_directory(&assets)
            .link_source_directory(&links)
            .build()
            .unwrap();
        Fixture {
            dir,
            source,
            settings,
        }
    }

    fn fpm_runner() -> FakeRunner {
        FakeRunner::new(|invocation| match invocation.tool_name().as_str() {
            "ronn" => fake_ronn(invocation),
            "fpm" => {
                let name = &invocation.args[3];
                let package = format!("{}_6.0.0-1_amd64.deb", name);
                let dir = invocation.current_dir.clone().unwrap();
                std::fs::write(dir.join(&package), "deb")?;
                Ok(ToolOutput::from_stdout(format!(
                    "{{:timestamp=>\"now\", :message=>\"Created package\", :path=>\"{}\"}}",
                    package
                )))
            }
            other => panic!("unexpected tool {other}"),
        })
    }

    #[tokio::test]
    async fn ubuntu_session_builds_deb_by_default() {
        let fx = fixture();
        let facts = PlatformFacts::linux("ubuntu", "16.04");
        let mut orchestrator =
            PackageOrchestrator::new(fx.settings.clone(), facts, fpm_runner(), built("linux-x64"));
        assert_eq!(orchestrator.phase(), Phase::Idle);

        let request = PackageRequest::new(PackageType::Deb, "6.0.0");
        let outcomes = orchestrator.run(&fx.source, &request, &[]).await.unwrap();

        assert_eq!(orchestrator.phase(), Phase::Finalized);
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            BuildOutcome::Built(result) => {
                assert_eq!(result.package_type, PackageType::Deb);
                assert_eq!(
                    result.artifact_path,
                    fx.dir.path().join("out/powershell_6.0.0-1_amd64.deb")
                );
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!fs::path_exists(&fx.settings.link_source_directory().join("powershell")));
        assert!(!fx.settings.staging_root().exists());
    }

    #[tokio::test]
    async fn failed_fpm_run_leaves_no_staging_behind() {
        let fx = fixture();
        let facts = PlatformFacts::linux("fedora", "25");
        let runner = FakeRunner::new(|invocation| match invocation.tool_name().as_str() {
            "ronn" => fake_ronn(invocation),
            "fpm" => Err(Error::ToolInvocationError {
                tool: "fpm".to_string(),
                code: Some(1),
                output: "Process failed: rpmbuild failed".to_string(),
            }),
            other => panic!("unexpected tool {other}"),
        });
        let mut orchestrator =
            PackageOrchestrator::new(fx.settings.clone(), facts, runner, built("linux-x64"));

        let request = PackageRequest::new(PackageType::Rpm, "6.0.0");
        let outcomes = orchestrator
            .run(&fx.source, &request, &[PackageType::Rpm])
            .await
            .unwrap();

        assert!(matches!(
            &outcomes[0],
            BuildOutcome::Failed {
                package_type: PackageType::Rpm,
                error: Error::ToolInvocationError { .. },
            }
        ));
        let fpm_calls = orchestrator.runner.calls_to("fpm");
        assert_eq!(fpm_calls.len(), 1);
        let staged_script = |flag: &str| {
            let args = &fpm_calls[0].args;
            let at = args.iter().position(|a| a == flag).unwrap();
            std::path::PathBuf::from(&args[at + 1])
        };
        assert!(!staged_script("--after-install").exists());
        assert!(!staged_script("--after-remove").exists());
        assert!(!fs::path_exists(&fx.settings.link_source_directory().join("powershell")));
        assert!(!fx.settings.staging_root().exists());
        assert!(!fx.settings.scratch_directory().exists());
        assert!(fx.source.join("powershell.dll").is_file());
    }

    #[tokio::test]
    async fn build_mismatch_aborts_before_any_tool_runs() {
        let fx = fixture();
        let facts = PlatformFacts::linux("ubuntu", "16.04");
        let mut orchestrator =
            PackageOrchestrator::new(fx.settings.clone(), facts, fpm_runner(), built("osx-x64"));

        let request = PackageRequest::new(PackageType::Deb, "6.0.0");
        let err = orchestrator
            .run(&fx.source, &request, &[PackageType::Deb])
            .await
            .unwrap_err();

        match err {
            Error::BuildPrerequisiteMissing { remediation, .. } => {
                assert!(remediation.contains("-Runtime linux-x64"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(orchestrator.phase(), Phase::Idle);
        assert!(orchestrator.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn per_type_failures_do_not_stop_other_types() {
        let fx = fixture();
        let facts = PlatformFacts::linux("ubuntu", "16.04");
        let mut orchestrator =
            PackageOrchestrator::new(fx.settings.clone(), facts, fpm_runner(), built("linux-x64"));

        let request = PackageRequest::new(PackageType::Deb, "6.0.0");
        let outcomes = orchestrator
            .run(
                &fx.source,
                &request,
                &[PackageType::Rpm, PackageType::AppImage, PackageType::Zip],
            )
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(matches!(
            &outcomes[0],
            BuildOutcome::Failed { package_type: PackageType::Rpm, error: Error::PlatformMismatch { .. } }
        ));
        assert!(matches!(
            &outcomes[1],
            BuildOutcome::Skipped { package_type: PackageType::AppImage, .. }
        ));
        assert!(matches!(&outcomes[2], BuildOutcome::Built(r) if r.package_type == PackageType::Zip));
        assert!(outcomes.iter().any(BuildOutcome::is_failure));
    }

    #[tokio::test]
    async fn missing_fpm_fails_only_that_type() {
        let fx = fixture();
        let facts = PlatformFacts::linux("fedora", "24");
        let runner = FakeRunner::new(|_| Ok(ToolOutput::default())).missing("fpm");
        let mut orchestrator =
            PackageOrchestrator::new(fx.settings.clone(), facts, runner, built("linux-x64"));

        let request = PackageRequest::new(PackageType::Rpm, "6.0.0");
        let outcomes = orchestrator.run(&fx.source, &request, &[]).await.unwrap();

        assert!(matches!(
            &outcomes[0],
            BuildOutcome::Failed { error: Error::DependencyMissing { tool, .. }, .. } if tool == "fpm"
        ));
    }

    #[test]
    fn inference_table() {
        assert_eq!(
            infer_types(&PlatformFacts::linux("ubuntu", "14.04")).unwrap(),
            [PackageType::Deb]
        );
        assert_eq!(
            infer_types(&PlatformFacts::linux("opensuse", "42.1")).unwrap(),
            [PackageType::Rpm]
        );
        assert_eq!(infer_types(&PlatformFacts::macos()).unwrap(), [PackageType::OsxPkg]);
        assert_eq!(
            infer_types(&PlatformFacts::windows()).unwrap(),
            [PackageType::Msi, PackageType::Appx]
        );
        let err = infer_types(&PlatformFacts::linux("alpine", "3.6")).unwrap_err();
        assert!(matches!(err, Error::UnsupportedPlatform { ref platform } if platform.contains("alpine")));
    }

    #[test]
    fn downlevel_runtime_drives_expectation() {
        let fx = fixture();
        let orchestrator = PackageOrchestrator::new(
            fx.settings.clone(),
            PlatformFacts::windows(),
            FakeRunner::new(|_| Ok(ToolOutput::default())),
            built("win81-x64"),
        );
        let request = PackageRequest::new(PackageType::Msi, "6.0.0").with_windows_runtime("win81-x64");
        assert_eq!(orchestrator.expectation(&request).runtime, "win81-x64");

        let plain = PackageRequest::new(PackageType::Msi, "6.0.0");
        assert_eq!(orchestrator.expectation(&plain).runtime, "win7-x64");
    }
}
