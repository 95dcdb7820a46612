use std::path::{Path, PathBuf};
use std::sync::Mutex;

use pwsh_packager::packager::{
    BuildOutcome, Error, JsonMetadataProbe, PackageMetadata, PackageOrchestrator, PackageRequest,
    PackageType, Phase, PlanResolver, PlatformFacts, SettingsBuilder, ToolInvocation, ToolOutput,
    ToolRunner,
};

/// Records invocations and fails every one of them.
#[derive(Default)]
struct RecordingRunner {
    calls: Mutex<Vec<String>>,
}

impl ToolRunner for RecordingRunner {
    async fn run(&self, invocation: ToolInvocation) -> pwsh_packager::packager::Result<ToolOutput> {
        self.calls.lock().unwrap().push(invocation.command_line());
        Err(Error::GenericError("no tools in tests".to_string()))
    }

    fn locate(&self, _tool: &str) -> Option<PathBuf> {
        None
    }
}

fn write_output_tree(root: &Path, runtime: &str) {
    std::fs::create_dir_all(root.join("Modules")).unwrap();
    std::fs::write(root.join("pwsh"), "#!/bin/sh\n").unwrap();
    std::fs::write(root.join("Modules/module.psd1"), "@{}").unwrap();
    std::fs::write(
        root.join("psoptions.json"),
        format!(
            r#"{{"Runtime":"{}","Configuration":"Release","Framework":"netcoreapp2.0","CrossGen":true}}"#,
            runtime
        ),
    )
    .unwrap();
}

#[test]
fn ubuntu_deb_plan() {
    let metadata = PackageMetadata::default();
    let facts = PlatformFacts::linux("ubuntu", "16.04");
    let request = PackageRequest::new(PackageType::Deb, "6.0.0");

    let plan = PlanResolver::new(&metadata).resolve(&request, &facts).unwrap();

    assert_eq!(
        plan.destination_path(),
        Some(Path::new("/opt/microsoft/powershell/6.0.0"))
    );
    assert_eq!(plan.iteration, "1ubuntu1.16.04.1");
    assert!(plan.dependencies.iter().any(|d| d == "libicu55"));
    assert!(!plan.dependencies.iter().any(|d| d == "libicu52"));
}

#[test]
fn fedora_rpm_dist_tag() {
    let metadata = PackageMetadata::default();
    let facts = PlatformFacts::linux("fedora", "24");
    let request = PackageRequest::new(PackageType::Rpm, "6.0.0");

    let plan = PlanResolver::new(&metadata).resolve(&request, &facts).unwrap();

    assert_eq!(plan.dist_tag.as_deref(), Some("fedora.24"));
}

#[test]
fn downlevel_msi_suffix() {
    let metadata = PackageMetadata::default();
    let request =
        PackageRequest::new(PackageType::Msi, "6.0.0").with_windows_runtime("win7-x64");

    let plan = PlanResolver::new(&metadata)
        .resolve(&request, &PlatformFacts::windows())
        .unwrap();

    assert_eq!(plan.name_suffix.as_deref(), Some("win7-win2008r2-x64"));
    assert!(plan.layout.is_none());
}

#[test]
fn deb_on_macos_is_a_mismatch() {
    let metadata = PackageMetadata::default();
    let request = PackageRequest::new(PackageType::Deb, "6.0.0");

    let err = PlanResolver::new(&metadata)
        .resolve(&request, &PlatformFacts::macos())
        .unwrap_err();

    match err {
        Error::PlatformMismatch { required, .. } => assert_eq!(required, "Ubuntu"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn session_continues_after_a_failed_type() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("publish");
    let facts = PlatformFacts::macos();
    write_output_tree(&source, &facts.default_runtime());

    let settings = SettingsBuilder::new()
        .output_directory(dir.path().join("out"))
        .work_directory(dir.path().join("work"))
        .build()
        .unwrap();
    let probe = JsonMetadataProbe::new(settings.build_metadata_path(&source));
    let runner = RecordingRunner::default();
    let mut orchestrator = PackageOrchestrator::new(settings, facts, runner, probe);

    let request = PackageRequest::new(PackageType::Deb, "6.0.0-beta.9+sha.1234");
    let outcomes = orchestrator
        .run(&source, &request, &[PackageType::Deb, PackageType::Zip])
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 2);
    assert!(matches!(
        &outcomes[0],
        BuildOutcome::Failed { package_type: PackageType::Deb, error: Error::PlatformMismatch { .. } }
    ));
    match &outcomes[1] {
        BuildOutcome::Built(result) => {
            assert_eq!(
                result.artifact_path,
                dir.path().join("out/powershell-6.0.0-beta.9.zip")
            );
            assert!(result.size > 0);
            assert_eq!(result.checksum.len(), 64);
        }
        other => panic!("zip was not built: {other:?}"),
    }
    assert_eq!(orchestrator.phase(), Phase::Finalized);
}

#[tokio::test]
async fn mismatched_build_aborts_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("publish");
    write_output_tree(&source, "linux-arm");

    let settings = SettingsBuilder::new()
        .output_directory(dir.path().join("out"))
        .work_directory(dir.path().join("work"))
        .build()
        .unwrap();
    let probe = JsonMetadataProbe::new(settings.build_metadata_path(&source));
    let mut orchestrator =
        PackageOrchestrator::new(settings, PlatformFacts::macos(), RecordingRunner::default(), probe);

    let request = PackageRequest::new(PackageType::Zip, "6.0.0");
    let err = orchestrator
        .run(&source, &request, &[PackageType::Zip])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::BuildPrerequisiteMissing { .. }));
    assert_eq!(orchestrator.phase(), Phase::Idle);
    assert!(!dir.path().join("out").exists());
}
