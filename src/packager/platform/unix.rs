//! Debian, RPM and macOS packages through fpm.
//!
//! fpm takes a staged directory plus path mappings and writes the package
//! into its working directory, so this module only assembles the command
//! line and interprets the result.

use std::path::{Path, PathBuf};

use crate::packager::{
    artifact::BuildResult,
    error::{Context, ErrorExt, Result},
    plan::PackagePlan,
    platform::{PackageType, PlatformFacts},
    settings::{PackageMetadata, Settings},
    staging::StagingArea,
    tools::{self, ToolInvocation, ToolRunner},
};

/// Install location of the compressed man page.
const MAN_PAGE_DIR: &str = "/usr/local/share/man/man1";

const FPM_REMEDIATION: &str = "sudo gem install fpm -v 1.8.1";
const RONN_REMEDIATION: &str = "sudo gem install ronn";

/// Located fpm toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnixTools {
    /// fpm executable.
    pub fpm: PathBuf,
    /// ronn executable.
    pub ronn: PathBuf,
}

/// Finds fpm and ronn or fails with [`Error::DependencyMissing`](crate::packager::Error::DependencyMissing).
pub fn precheck<R: ToolRunner>(runner: &R) -> Result<UnixTools> {
    Ok(UnixTools {
        fpm: tools::precheck(runner, "fpm", FPM_REMEDIATION)?,
        ronn: tools::precheck(runner, "ronn", RONN_REMEDIATION)?,
    })
}

/// fpm command line for `plan`, in the order fpm expects.
pub fn fpm_arguments(
    plan: &PackagePlan,
    metadata: &PackageMetadata,
    area: &StagingArea,
) -> Result<Vec<String>> {
    let layout = plan
        .layout
        .as_ref()
        .with_context(|| format!("{} plan has no install layout", plan.package_type))?;
    let man_page = area.man_page().context("staging area has no man page")?;
    let link_source = area
        .link_source()
        .context("staging area has no executable link")?;

    let mut args: Vec<String> = vec![
        "--force".into(),
        "--verbose".into(),
        "--name".into(),
        plan.name.clone(),
        "--version".into(),
        plan.version.clone(),
        "--iteration".into(),
        plan.iteration.clone(),
        "--maintainer".into(),
        metadata.maintainer.clone(),
        "--vendor".into(),
        metadata.vendor.clone(),
        "--url".into(),
        metadata.url.clone(),
        "--license".into(),
        metadata.license.clone(),
        "--description".into(),
        metadata.description.clone(),
        "--category".into(),
        metadata.category.clone(),
        "-t".into(),
        plan.package_type.short_name().into(),
        "-s".into(),
        "dir".into(),
    ];

    for dependency in &plan.dependencies {
        args.push("--depends".into());
        args.push(dependency.clone());
    }

    if let (Some(install), Some(remove)) = (area.after_install_script(), area.after_remove_script())
    {
        args.push("--after-install".into());
        args.push(install.display().to_string());
        args.push("--after-remove".into());
        args.push(remove.display().to_string());
    }

    if let Some(dist_tag) = &plan.dist_tag {
        args.push("--rpm-dist".into());
        args.push(dist_tag.clone());
        args.push("--rpm-os".into());
        args.push("linux".into());
    }

    args.push(format!(
        "{}/={}/",
        area.root().display(),
        layout.destination_path.display()
    ));
    args.push(format!(
        "{}={}/{}.1.gz",
        man_page.display(),
        MAN_PAGE_DIR,
        plan.name
    ));
    args.push(format!(
        "{}={}",
        link_source.display(),
        layout.link_dir.display()
    ));

    Ok(args)
}

/// Builds deb, rpm and osxpkg packages.
pub struct PackageBuilder<'a, R: ToolRunner> {
    settings: &'a Settings,
    facts: &'a PlatformFacts,
    runner: &'a R,
    fpm: PathBuf,
}

impl<'a, R: ToolRunner> PackageBuilder<'a, R> {
    /// Builder using `fpm` from `PATH`.
    pub fn new(settings: &'a Settings, facts: &'a PlatformFacts, runner: &'a R) -> Self {
        Self {
            settings,
            facts,
            runner,
            fpm: PathBuf::from("fpm"),
        }
    }

    /// Uses the fpm found by [`precheck`].
    pub fn with_fpm(mut self, path: impl Into<PathBuf>) -> Self {
        self.fpm = path.into();
        self
    }

    /// Runs fpm over the staged tree and returns the created package.
    pub async fn build(&self, plan: &PackagePlan, area: &StagingArea) -> Result<BuildResult> {
        let output_dir = self.settings.output_directory();
        tokio::fs::create_dir_all(output_dir)
            .await
            .fs_context("creating output directory", output_dir)?;

        let args = fpm_arguments(plan, self.settings.metadata(), area)?;
        log::info!("Creating {} package with fpm", plan.package_type);
        let output = self
            .runner
            .run(
                ToolInvocation::new(&self.fpm)
                    .args(args)
                    .current_dir(output_dir),
            )
            .await?;

        let mut artifact = tools::parse_artifact_path(&output)?;
        if artifact.is_relative() {
            artifact = output_dir.join(artifact);
        }

        if plan.package_type == PackageType::OsxPkg {
            let runtime = self
                .settings
                .expected_build()
                .runtime
                .clone()
                .unwrap_or_else(|| self.facts.default_runtime());
            artifact = append_runtime(&artifact, &runtime).await?;
        }

        BuildResult::for_artifact(plan.package_type, artifact).await
    }
}

/// Renames `<stem>.<ext>` to `<stem>-<runtime>.<ext>`.
async fn append_runtime(artifact: &Path, runtime: &str) -> Result<PathBuf> {
    let renamed = runtime_file_name(artifact, runtime)?;
    log::debug!("Renaming {} to {}", artifact.display(), renamed.display());
    tokio::fs::rename(artifact, &renamed)
        .await
        .fs_context("renaming package", artifact)?;
    Ok(renamed)
}

fn runtime_file_name(artifact: &Path, runtime: &str) -> Result<PathBuf> {
    let stem = artifact
        .file_stem()
        .with_context(|| format!("package path {} has no file name", artifact.display()))?
        .to_string_lossy();
    let name = match artifact.extension() {
        Some(ext) => format!("{}-{}.{}", stem, runtime, ext.to_string_lossy()),
        None => format!("{}-{}", stem, runtime),
    };
    Ok(artifact.with_file_name(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packager::{
        error::Error,
        plan::PlanResolver,
        request::PackageRequest,
        settings::SettingsBuilder,
        staging::StagingManager,
        tools::{
            ToolOutput,
            testing::{FakeRunner, fake_ronn},
        },
    };

    struct Fixture {
        dir: tempfile::TempDir,
        source: PathBuf,
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
            .runtime("osx-x64")
            .build()
            .unwrap();
        Fixture {
            dir,
            source,
            settings,
        }
    }

    /// Answers ronn and fpm; fpm "creates" `package` in its working directory.
    fn fpm_runner(package: &'static str) -> FakeRunner {
        FakeRunner::new(move |invocation| match invocation.tool_name().as_str() {
            "ronn" => fake_ronn(invocation),
            "fpm" => {
                let dir = invocation.current_dir.clone().unwrap();
                std::fs::write(dir.join(package), "package")?;
                Ok(ToolOutput::from_stdout(format!(
                    "Created package {{:path=>\"{}\"}}\n",
                    package
                )))
            }
            other => panic!("unexpected tool {other}"),
        })
    }

    async fn staged(
        fx: &Fixture,
        facts: &PlatformFacts,
        runner: &FakeRunner,
        request: &PackageRequest,
    ) -> (PackagePlan, StagingArea) {
        let plan = PlanResolver::new(fx.settings.metadata())
            .resolve(request, facts)
            .unwrap();
        let area = StagingManager::new(&fx.settings, facts, runner)
            .stage(&fx.source, &plan, request)
            .await
            .unwrap();
        (plan, area)
    }

    #[tokio::test]
    async fn fpm_arguments_follow_fixed_order() {
        let fx = fixture();
        let facts = PlatformFacts::linux("centos", "7");
        let runner = fpm_runner("unused.rpm");
        let request = PackageRequest::new(PackageType::Rpm, "6.0.0");
        let (plan, area) = staged(&fx, &facts, &runner, &request).await;

        let args = fpm_arguments(&plan, fx.settings.metadata(), &area).unwrap();

        assert_eq!(
            &args[..6],
            &["--force", "--verbose", "--name", "powershell", "--version", "6.0.0"]
        );
        let position = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[position("-t") + 1], "rpm");
        assert!(position("-s") < position("--depends"));
        assert!(position("--depends") < position("--after-install"));
        assert!(position("--after-remove") < position("--rpm-dist"));
        assert_eq!(args[position("--rpm-dist") + 1], "el7.centos");
        assert_eq!(args[position("--rpm-os") + 1], "linux");

        let depends: Vec<&str> = args
            .windows(2)
            .filter(|w| w[0] == "--depends")
            .map(|w| w[1].as_str())
            .collect();
        assert_eq!(depends, plan.dependencies);

        let mappings = &args[args.len() - 3..];
        assert_eq!(
            mappings[0],
            format!("{}/=/opt/microsoft/powershell/6.0.0/", area.root().display())
        );
        assert!(mappings[1].ends_with("powershell.1.gz=/usr/local/share/man/man1/powershell.1.gz"));
        assert!(mappings[2].ends_with("links/powershell=/usr/bin"));
    }

    #[tokio::test]
    async fn macos_arguments_have_no_scripts_or_dist() {
        let fx = fixture();
        let facts = PlatformFacts::macos();
        let runner = fpm_runner("unused.pkg");
        let request = PackageRequest::new(PackageType::OsxPkg, "6.0.0").with_name("powershell-preview");
        let (plan, area) = staged(&fx, &facts, &runner, &request).await;

        let args = fpm_arguments(&plan, fx.settings.metadata(), &area).unwrap();
        assert!(!args.iter().any(|a| a == "--after-install" || a == "--rpm-dist" || a == "--depends"));
        assert!(args.contains(&"osxpkg".to_string()));
        assert!(args.last().unwrap().ends_with("=/usr/local/bin"));
    }

    #[tokio::test]
    async fn deb_build_reports_artifact_in_output_dir() {
        let fx = fixture();
        let facts = PlatformFacts::linux("ubuntu", "16.04");
        let runner = fpm_runner("powershell_6.0.0-1.ubuntu.16.04_amd64.deb");
        let request = PackageRequest::new(PackageType::Deb, "6.0.0");
        let (plan, area) = staged(&fx, &facts, &runner, &request).await;

        let result = PackageBuilder::new(&fx.settings, &facts, &runner)
            .with_fpm("/usr/local/bin/fpm")
            .build(&plan, &area)
            .await
            .unwrap();
        area.unstage().unwrap();

        assert_eq!(
            result.artifact_path,
            fx.dir.path().join("out/powershell_6.0.0-1.ubuntu.16.04_amd64.deb")
        );
        assert_eq!(result.package_type, PackageType::Deb);
        assert_eq!(result.size, "package".len() as u64);

        let fpm_calls = runner.calls_to("fpm");
        assert_eq!(fpm_calls.len(), 1);
        assert_eq!(fpm_calls[0].program, PathBuf::from("/usr/local/bin/fpm"));
    }

    #[tokio::test]
    async fn macos_package_gets_runtime_suffix() {
        let fx = fixture();
        let facts = PlatformFacts::macos();
        let runner = fpm_runner("powershell-6.0.0.pkg");
        let request = PackageRequest::new(PackageType::OsxPkg, "6.0.0");
        let (plan, area) = staged(&fx, &facts, &runner, &request).await;

        let result = PackageBuilder::new(&fx.settings, &facts, &runner)
            .build(&plan, &area)
            .await
            .unwrap();

        assert_eq!(
            result.artifact_path,
            fx.dir.path().join("out/powershell-6.0.0-osx-x64.pkg")
        );
        assert!(!fx.dir.path().join("out/powershell-6.0.0.pkg").exists());
    }

    #[tokio::test]
    async fn unrecognized_fpm_output_fails() {
        let fx = fixture();
        let facts = PlatformFacts::linux("ubuntu", "16.04");
        let runner = FakeRunner::new(|invocation| match invocation.tool_name().as_str() {
            "ronn" => fake_ronn(invocation),
            _ => Ok(ToolOutput::from_stdout("Done.\n")),
        });
        let request = PackageRequest::new(PackageType::Deb, "6.0.0");
        let (plan, area) = staged(&fx, &facts, &runner, &request).await;

        let err = PackageBuilder::new(&fx.settings, &facts, &runner)
            .build(&plan, &area)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnparseableToolOutput { ref line } if line == "Done."));
    }

    #[test]
    fn precheck_names_missing_tool() {
        let runner = FakeRunner::new(|_| Ok(ToolOutput::default())).missing("ronn");
        match precheck(&runner).unwrap_err() {
            Error::DependencyMissing { tool, remediation } => {
                assert_eq!(tool, "ronn");
                assert!(remediation.contains("gem install ronn"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn runtime_is_inserted_before_extension() {
        assert_eq!(
            runtime_file_name(Path::new("/out/powershell-6.0.0.pkg"), "osx-x64").unwrap(),
            PathBuf::from("/out/powershell-6.0.0-osx-x64.pkg")
        );
    }
}
