//! MSI and APPX installers.
//!
//! Both formats are produced by Windows SDK tools working on a staged copy of
//! the output tree. The MSI goes through the WiX v3 toolchain (heat harvests
//! the tree, candle compiles, light links); the APPX is packed by makeappx
//! after the manifest template and logos are placed into the staged copy.

use std::path::{Path, PathBuf};

use crate::packager::{
    artifact::BuildResult,
    error::{Error, ErrorExt, Result},
    plan::PackagePlan,
    platform::PlatformFacts,
    request::PackageRequest,
    settings::Settings,
    staging::{StagingArea, StagingManager},
    tools::{ToolInvocation, ToolRunner},
    utils::fs,
};

const WIX_REMEDIATION: &str = "install the WiX Toolset v3 from https://wixtoolset.org";
const MAKEAPPX_REMEDIATION: &str = "install the Windows 10 SDK";

/// WiX source describing the product, relative to the assets directory.
const PRODUCT_WXS: &str = "Product.wxs";
/// License shown by the MSI UI.
const LICENSE_RTF: &str = "license.rtf";
/// APPX manifest template.
const APPX_MANIFEST: &str = "AppxManifest.xml";
/// Logos the APPX manifest references, copied into `assets/`.
const APPX_LOGOS: &[&str] = &[
    "Square150x150Logo.png",
    "Square44x44Logo.png",
    "Square44x44Logo.targetsize-48.png",
    "Square44x44Logo.targetsize-48_altform-unplated.png",
    "StoreLogo.png",
];

/// Target architecture of the runtime, as WiX and the manifest spell it.
pub fn target_architecture(runtime: &str) -> &'static str {
    if runtime.to_ascii_lowercase().ends_with("-x86") {
        "x86"
    } else {
        "x64"
    }
}

/// Finds `tool` in `PATH`, then in `fallback_dir`.
fn locate<R: ToolRunner>(
    runner: &R,
    tool: &str,
    fallback_dir: Option<PathBuf>,
    remediation: &str,
) -> Result<PathBuf> {
    if let Some(path) = runner.locate(tool) {
        return Ok(path);
    }
    let fallback = fallback_dir
        .map(|dir| dir.join(format!("{}.exe", tool)))
        .filter(|path| path.is_file());
    match fallback {
        Some(path) => {
            log::info!("Using {} from {}", tool, path.display());
            Ok(path)
        }
        None => Err(Error::DependencyMissing {
            tool: tool.to_string(),
            remediation: remediation.to_string(),
        }),
    }
}

fn wix_bin_dir() -> Option<PathBuf> {
    std::env::var_os("WIX").map(|dir| PathBuf::from(dir).join("bin"))
}

fn windows_sdk_bin_dir() -> Option<PathBuf> {
    std::env::var_os("ProgramFiles(x86)")
        .map(|dir| PathBuf::from(dir).join("Windows Kits").join("10").join("bin").join("x64"))
}

/// Located WiX toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WixTools {
    /// Harvester.
    pub heat: PathBuf,
    /// Compiler.
    pub candle: PathBuf,
    /// Linker.
    pub light: PathBuf,
}

/// Finds heat, candle and light.
pub fn precheck_wix<R: ToolRunner>(runner: &R) -> Result<WixTools> {
    Ok(WixTools {
        heat: locate(runner, "heat", wix_bin_dir(), WIX_REMEDIATION)?,
        candle: locate(runner, "candle", wix_bin_dir(), WIX_REMEDIATION)?,
        light: locate(runner, "light", wix_bin_dir(), WIX_REMEDIATION)?,
    })
}

/// Finds makeappx.
pub fn precheck_makeappx<R: ToolRunner>(runner: &R) -> Result<PathBuf> {
    locate(runner, "makeappx", windows_sdk_bin_dir(), MAKEAPPX_REMEDIATION)
}

/// Builds MSI and APPX packages.
pub struct WindowsInstallerBuilder<'a, R: ToolRunner> {
    settings: &'a Settings,
    facts: &'a PlatformFacts,
    runner: &'a R,
}

impl<'a, R: ToolRunner> WindowsInstallerBuilder<'a, R> {
    /// Creates a builder.
    pub fn new(settings: &'a Settings, facts: &'a PlatformFacts, runner: &'a R) -> Self {
        Self {
            settings,
            facts,
            runner,
        }
    }

    /// Runtime the output tree was built for.
    fn runtime(&self, request: &PackageRequest) -> String {
        request
            .windows_downlevel_runtime
            .clone()
            .or_else(|| self.settings.expected_build().runtime.clone())
            .unwrap_or_else(|| self.facts.default_runtime())
    }

    fn artifact_path(&self, plan: &PackagePlan, request: &PackageRequest) -> Result<PathBuf> {
        let base = request.artifact_base_name(plan.name_suffix.as_deref())?;
        Ok(self
            .settings
            .output_directory()
            .join(format!("{}.{}", base, plan.package_type.extension())))
    }

    async fn prepare(&self, source: &Path, artifact: &Path) -> Result<StagingArea> {
        let output_dir = self.settings.output_directory();
        tokio::fs::create_dir_all(output_dir)
            .await
            .fs_context("creating output directory", output_dir)?;
        fs::remove_path(artifact).fs_context("removing previous package", artifact)?;

        let area = StagingManager::new(self.settings, self.facts, self.runner)
            .stage_copy(source)
            .await?;
        let scratch = self.settings.scratch_directory();
        tokio::fs::create_dir_all(&scratch)
            .await
            .fs_context("creating scratch directory", &scratch)?;
        Ok(area)
    }

    /// Builds `<name>-<version>[-<suffix>].msi` from `source`.
    pub async fn build_msi(
        &self,
        source: &Path,
        plan: &PackagePlan,
        request: &PackageRequest,
    ) -> Result<BuildResult> {
        let tools = precheck_wix(self.runner)?;
        let assets = self.settings.assets_directory();
        let product_wxs = assets.join(PRODUCT_WXS);
        let license = assets.join(LICENSE_RTF);
        for required in [&product_wxs, &license] {
            if !required.is_file() {
                return Err(Error::MissingExpectedFile {
                    path: required.clone(),
                });
            }
        }

        let msi = self.artifact_path(plan, request)?;
        let area = self.prepare(source, &msi).await?;
        let scratch = self.settings.scratch_directory();

        let runtime = self.runtime(request);
        let arch = target_architecture(&runtime);
        let semantic_version = request.version_without_build_metadata()?;
        let version_with_name = format!("{}_{}", request.name, semantic_version);
        let program_files = if arch == "x86" {
            "ProgramFilesFolder"
        } else {
            "ProgramFiles64Folder"
        };
        let env: Vec<(&str, String)> = vec![
            ("ProductName", request.name.clone()),
            ("ProductGuid", uuid::Uuid::new_v4().to_string()),
            ("ProductVersion", request.four_part_version()?),
            ("ProductSemanticVersion", semantic_version.clone()),
            ("ProductVersionWithName", version_with_name.clone()),
            ("ProductTargetArchitecture", arch.to_string()),
            ("ProductProgFilesDir", program_files.to_string()),
            ("ProductSourcePath", area.root().display().to_string()),
        ];
        let with_env = |invocation: ToolInvocation| {
            env.iter()
                .fold(invocation.current_dir(&scratch), |inv, (k, v)| inv.env(*k, v.clone()))
        };

        let fragment = scratch.join("files.wxs");
        let product_obj = scratch.join("Product.wixobj");
        let fragment_obj = scratch.join("files.wixobj");

        log::info!("Harvesting {} for {}", area.root().display(), msi.display());
        self.runner
            .run(with_env(
                ToolInvocation::new(&tools.heat)
                    .arg("dir")
                    .arg(area.root().display().to_string())
                    .args(["-dr", version_with_name.as_str(), "-cg", version_with_name.as_str()])
                    .args(["-gg", "-sfrag", "-srd", "-scom", "-sreg"])
                    .arg("-out")
                    .arg(fragment.display().to_string())
                    .args(["-var", "env.ProductSourcePath", "-v"]),
            ))
            .await?;

        self.runner
            .run(with_env(
                ToolInvocation::new(&tools.candle)
                    .arg(product_wxs.display().to_string())
                    .arg(fragment.display().to_string())
                    .arg("-out")
                    .arg(format!("{}{}", scratch.display(), std::path::MAIN_SEPARATOR))
                    .args(["-ext", "WixUIExtension", "-arch", arch, "-v"]),
            ))
            .await?;

        self.runner
            .run(with_env(
                ToolInvocation::new(&tools.light)
                    .arg("-out")
                    .arg(msi.display().to_string())
                    .arg(product_obj.display().to_string())
                    .arg(fragment_obj.display().to_string())
                    .args(["-ext", "WixUIExtension"])
                    .arg(format!("-dWixUILicenseRtf={}", license.display()))
                    .arg("-v"),
            ))
            .await?;

        area.finish(plan.package_type);
        fs::remove_path(&msi.with_extension("wixpdb"))
            .fs_context("removing debug database", msi.with_extension("wixpdb"))?;

        if !msi.is_file() {
            return Err(Error::MissingExpectedFile { path: msi });
        }
        BuildResult::for_artifact(plan.package_type, msi).await
    }

    /// Builds `<name>-<version>[-<suffix>].appx` from `source`.
    pub async fn build_appx(
        &self,
        source: &Path,
        plan: &PackagePlan,
        request: &PackageRequest,
    ) -> Result<BuildResult> {
        let makeappx = precheck_makeappx(self.runner)?;
        let assets = self.settings.assets_directory();
        let template_path = assets.join(APPX_MANIFEST);
        let template = tokio::fs::read_to_string(&template_path)
            .await
            .fs_context("reading manifest template", &template_path)?;

        let appx = self.artifact_path(plan, request)?;
        let area = self.prepare(source, &appx).await?;

        let manifest = render_manifest(
            &template,
            &request.four_part_version()?,
            target_architecture(&self.runtime(request)),
            &request.name,
        );
        let manifest_path = area.root().join(APPX_MANIFEST);
        tokio::fs::write(&manifest_path, manifest)
            .await
            .fs_context("writing manifest", &manifest_path)?;

        for logo in APPX_LOGOS {
            fs::copy_file(&assets.join(logo), &area.root().join("assets").join(logo)).await?;
        }

        log::info!("Packing {}", appx.display());
        self.runner
            .run(
                ToolInvocation::new(&makeappx)
                    .args(["pack", "/o", "/v", "/h", "SHA256", "/d"])
                    .arg(area.root().display().to_string())
                    .arg("/p")
                    .arg(appx.display().to_string()),
            )
            .await?;
        area.finish(plan.package_type);

        if !appx.is_file() {
            return Err(Error::MissingExpectedFile { path: appx });
        }
        BuildResult::for_artifact(plan.package_type, appx).await
    }
}

/// Fills the `$VERSION$`, `$ARCH$` and `$NAME$` placeholders.
pub fn render_manifest(template: &str, version: &str, arch: &str, name: &str) -> String {
    template
        .replace("$VERSION$", version)
        .replace("$ARCH$", arch)
        .replace("$NAME$", name)
}
