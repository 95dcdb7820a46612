//! AppImage through the project's build script.
//!
//! The script downloads its own tooling and writes a single
//! `PowerShell-<arch>.AppImage` into its working directory; the version is
//! inserted into the file name afterwards.

use std::path::{Path, PathBuf};

use crate::packager::{
    artifact::BuildResult,
    error::{Context, Error, ErrorExt, Result},
    platform::PackageType,
    request::PackageRequest,
    settings::Settings,
    tools::{self, ToolInvocation, ToolRunner},
    utils::fs,
};

/// File name pattern the script produces.
const APPIMAGE_PATTERN: &str = "PowerShell-*.AppImage";

/// Runs the AppImage script for `request`.
pub async fn build_appimage<R: ToolRunner>(
    runner: &R,
    settings: &Settings,
    request: &PackageRequest,
) -> Result<BuildResult> {
    let bash = tools::precheck(runner, "bash", "install bash")?;
    let script = settings.appimage_script();
    if !script.is_file() {
        return Err(Error::MissingExpectedFile {
            path: script.to_path_buf(),
        });
    }

    let output_dir = settings.output_directory();
    tokio::fs::create_dir_all(output_dir)
        .await
        .fs_context("creating output directory", output_dir)?;

    log::info!("Running AppImage script {}", script.display());
    runner
        .run(
            ToolInvocation::new(bash)
                .arg("-iex")
                .arg(script.display().to_string())
                .current_dir(output_dir),
        )
        .await?;

    let pattern = output_dir.join(APPIMAGE_PATTERN);
    let produced = fs::find_single(&pattern.to_string_lossy())?;
    let versioned = versioned_name(&produced, &request.version_without_build_metadata()?)?;
    tokio::fs::rename(&produced, &versioned)
        .await
        .fs_context("renaming AppImage", &produced)?;

    BuildResult::for_artifact(PackageType::AppImage, versioned).await
}

/// Inserts `-<version>` after the first dash of the file name.
fn versioned_name(path: &Path, version: &str) -> Result<PathBuf> {
    let name = path
        .file_name()
        .with_context(|| format!("{} has no file name", path.display()))?
        .to_string_lossy();
    let (head, tail) = name
        .split_once('-')
        .with_context(|| format!("{} has no dash to insert the version at", name))?;
    Ok(path.with_file_name(format!("{}-{}-{}", head, version, tail)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packager::{
        settings::SettingsBuilder,
        tools::{ToolOutput, testing::FakeRunner},
    };

    #[test]
    fn version_goes_after_first_dash() {
        assert_eq!(
            versioned_name(Path::new("/out/PowerShell-x86_64.AppImage"), "6.0.0-beta.9").unwrap(),
            PathBuf::from("/out/PowerShell-6.0.0-beta.9-x86_64.AppImage")
        );
    }

    #[tokio::test]
    async fn renames_script_output() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("appimage.sh");
        std::fs::write(&script, "#!/bin/bash\n").unwrap();
        let settings = SettingsBuilder::new()
            .output_directory(dir.path().join("out"))
            .appimage_script(&script)
            .build()
            .unwrap();
        let runner = FakeRunner::new(|invocation| {
            let dir = invocation.current_dir.clone().unwrap();
            std::fs::write(dir.join("PowerShell-x86_64.AppImage"), "elf")?;
            Ok(ToolOutput::default())
        });
        let request = PackageRequest::new(PackageType::AppImage, "6.0.0+build.1");

        let result = build_appimage(&runner, &settings, &request).await.unwrap();

        assert_eq!(
            result.artifact_path,
            dir.path().join("out/PowerShell-6.0.0-x86_64.AppImage")
        );
        assert_eq!(runner.calls()[0].args[0], "-iex");
    }

    #[tokio::test]
    async fn missing_output_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("appimage.sh");
        std::fs::write(&script, "#!/bin/bash\n").unwrap();
        let settings = SettingsBuilder::new()
            .output_directory(dir.path().join("out"))
            .appimage_script(&script)
            .build()
            .unwrap();
        let runner = FakeRunner::new(|_| Ok(ToolOutput::default()));
        let request = PackageRequest::new(PackageType::AppImage, "6.0.0");

        let err = build_appimage(&runner, &settings, &request).await.unwrap_err();
        assert!(matches!(err, Error::MissingExpectedFile { .. }));
    }
}
