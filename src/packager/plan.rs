//! Package plan resolution.
//!
//! Turns a [`PackageRequest`] and the host [`PlatformFacts`] into a
//! [`PackagePlan`]: install layout, dependency list, revision strings and
//! maintainer scripts. Resolution is pure; every platform difference lives in
//! the tables below so supporting another distro release means adding a row.

use std::path::{Path, PathBuf};

use super::{
    error::{Error, Result},
    platform::{DistroKind, OsFamily, PackageType, PlatformFacts},
    request::PackageRequest,
    scripts::{self, MaintainerScripts, ScriptFlavor},
    settings::PackageMetadata,
};

/// Install root and link directory for one OS family.
struct FamilyPaths {
    family: OsFamily,
    install_root: &'static str,
    link_dir: &'static str,
}

const FAMILY_PATHS: &[FamilyPaths] = &[
    FamilyPaths {
        family: OsFamily::Linux,
        install_root: "/opt",
        link_dir: "/usr/bin",
    },
    FamilyPaths {
        family: OsFamily::MacOS,
        install_root: "/usr/local",
        link_dir: "/usr/local/bin",
    },
];

/// Platform a package type can be built on.
struct TypeGate {
    package_type: PackageType,
    required: &'static str,
    allowed: fn(&PlatformFacts) -> bool,
}

const TYPE_GATES: &[TypeGate] = &[
    TypeGate {
        package_type: PackageType::Deb,
        required: "Ubuntu",
        allowed: PlatformFacts::is_ubuntu,
    },
    TypeGate {
        package_type: PackageType::AppImage,
        required: "Ubuntu",
        allowed: PlatformFacts::is_ubuntu,
    },
    TypeGate {
        package_type: PackageType::Rpm,
        required: "RedHat family (CentOS, Fedora, openSUSE)",
        allowed: PlatformFacts::is_redhat_family,
    },
    TypeGate {
        package_type: PackageType::OsxPkg,
        required: "macOS",
        allowed: |facts| facts.family() == OsFamily::MacOS,
    },
    TypeGate {
        package_type: PackageType::Msi,
        required: "Windows",
        allowed: |facts| facts.family() == OsFamily::Windows,
    },
    TypeGate {
        package_type: PackageType::Appx,
        required: "Windows",
        allowed: |facts| facts.family() == OsFamily::Windows,
    },
];

const UBUNTU_BASE_DEPENDENCIES: &[&str] = &[
    "libc6",
    "libcurl3",
    "libgcc1",
    "libgssapi-krb5-2",
    "liblttng-ust0",
    "libstdc++6",
    "libunwind8",
    "libuuid1",
    "zlib1g",
];

const REDHAT_BASE_DEPENDENCIES: &[&str] = &[
    "glibc",
    "libcurl",
    "libgcc",
    "libicu",
    "openssl",
    "libstdc++",
    "ncurses-base",
    "libunwind",
    "uuid",
    "zlib",
];

/// Release-specific additions on top of the distro base set.
struct DistroProfile {
    distro: DistroKind,
    /// `None` matches every release of the distro.
    release: Option<&'static str>,
    extra_dependencies: &'static [&'static str],
    iteration_qualifier: Option<&'static str>,
}

const DISTRO_PROFILES: &[DistroProfile] = &[
    DistroProfile {
        distro: DistroKind::Ubuntu,
        release: Some("14.04"),
        extra_dependencies: &["libssl1.0.0", "libicu52"],
        iteration_qualifier: Some("ubuntu1.14.04.1"),
    },
    DistroProfile {
        distro: DistroKind::Ubuntu,
        release: Some("16.04"),
        extra_dependencies: &["libssl1.0.0", "libicu55"],
        iteration_qualifier: Some("ubuntu1.16.04.1"),
    },
    DistroProfile {
        distro: DistroKind::Ubuntu,
        release: Some("17.04"),
        extra_dependencies: &["libssl1.0.0", "libicu57"],
        iteration_qualifier: Some("ubuntu1.17.04.1"),
    },
    DistroProfile {
        distro: DistroKind::CentOs,
        release: None,
        extra_dependencies: &["krb5-libs", "lttng-ust"],
        iteration_qualifier: None,
    },
    DistroProfile {
        distro: DistroKind::Fedora,
        release: None,
        extra_dependencies: &["krb5-libs", "lttng-ust"],
        iteration_qualifier: None,
    },
    DistroProfile {
        distro: DistroKind::OpenSuse,
        release: None,
        extra_dependencies: &["libopenssl1_0_0"],
        iteration_qualifier: None,
    },
];

/// Legacy Windows runtimes and the server release each one also targets.
const DOWNLEVEL_RUNTIMES: &[(&str, &str)] = &[
    ("win7-x64", "win7-win2008r2-x64"),
    ("win81-x64", "win81-win2012r2-x64"),
    ("win10-x64", "win10-win2016-x64"),
];

/// Where the package installs and where the executable link goes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstallLayout {
    /// Install directory of the product files.
    pub destination_path: PathBuf,
    /// Directory receiving the executable symlink.
    pub link_dir: PathBuf,
}

impl InstallLayout {
    /// Installed executable.
    pub fn executable_path(&self, name: &str) -> PathBuf {
        self.destination_path.join(name)
    }

    /// Installed link to the executable.
    pub fn link_path(&self, name: &str) -> PathBuf {
        self.link_dir.join(name)
    }
}

/// Everything a builder needs to know, decided up front.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackagePlan {
    /// Package format.
    pub package_type: PackageType,
    /// Package name.
    pub name: String,
    /// Product version.
    pub version: String,
    /// Install layout; only for fpm-built packages.
    pub layout: Option<InstallLayout>,
    /// Package dependencies in declaration order.
    pub dependencies: Vec<String>,
    /// Package revision (fpm `--iteration`).
    pub iteration: String,
    /// RPM dist tag.
    pub dist_tag: Option<String>,
    /// Rendered post-install/post-remove scripts.
    pub maintainer_scripts: Option<MaintainerScripts>,
    /// Suffix for zip/msi/appx file names.
    pub name_suffix: Option<String>,
}

impl PackagePlan {
    /// Install directory, when the package has one.
    pub fn destination_path(&self) -> Option<&Path> {
        self.layout.as_ref().map(|l| l.destination_path.as_path())
    }

    /// Link directory, when the package has one.
    pub fn link_dir(&self) -> Option<&Path> {
        self.layout.as_ref().map(|l| l.link_dir.as_path())
    }
}

/// Resolves plans against fixed package metadata.
#[derive(Debug, Clone, Copy)]
pub struct PlanResolver<'a> {
    metadata: &'a PackageMetadata,
}

impl<'a> PlanResolver<'a> {
    /// Resolver for the given metadata.
    pub fn new(metadata: &'a PackageMetadata) -> Self {
        Self { metadata }
    }

    /// Derives the plan for `request` on `facts`.
    ///
    /// Fails with [`Error::PlatformMismatch`] when the package type cannot be
    /// built on this platform family.
    pub fn resolve(&self, request: &PackageRequest, facts: &PlatformFacts) -> Result<PackagePlan> {
        check_platform(request.package_type, facts)?;

        let mut plan = PackagePlan {
            package_type: request.package_type,
            name: request.name.clone(),
            version: request.version.clone(),
            layout: None,
            dependencies: Vec::new(),
            iteration: request.iteration.clone(),
            dist_tag: None,
            maintainer_scripts: None,
            name_suffix: None,
        };

        match request.package_type {
            PackageType::Deb | PackageType::Rpm | PackageType::OsxPkg => {
                let layout = self.layout(request, facts)?;
                let profile = distro_profile(facts);

                plan.dependencies = dependencies(facts, profile);
                if let Some(qualifier) = profile.and_then(|p| p.iteration_qualifier) {
                    plan.iteration.push_str(qualifier);
                }
                if request.package_type == PackageType::Rpm {
                    plan.dist_tag = dist_tag(facts);
                }
                plan.maintainer_scripts = match script_flavor(facts) {
                    Some(flavor) => {
                        let shell_path = layout.link_path(&request.name);
                        Some(scripts::render(flavor, &shell_path.to_string_lossy())?)
                    }
                    None => None,
                };
                plan.layout = Some(layout);
            }
            PackageType::Msi | PackageType::Appx | PackageType::Zip => {
                plan.name_suffix = match &request.windows_downlevel_runtime {
                    Some(runtime) => Some(windows_name_suffix(runtime)),
                    None => request.name_suffix.clone(),
                };
            }
            PackageType::AppImage => {}
        }

        log::debug!("Resolved {} plan: {:?}", request.package_type, plan);
        Ok(plan)
    }

    fn layout(&self, request: &PackageRequest, facts: &PlatformFacts) -> Result<InstallLayout> {
        let paths = FAMILY_PATHS
            .iter()
            .find(|p| p.family == facts.family())
            .ok_or_else(|| Error::UnsupportedPlatform {
                platform: facts.description(),
            })?;

        let suffix = side_by_side_suffix(&request.name, &self.metadata.product_name);
        let suffix = if suffix.is_empty() {
            log::warn!(
                "Side-by-side suffix not given; building the primary {} package under version {}",
                self.metadata.product_name,
                request.version
            );
            request.version.clone()
        } else {
            suffix
        };

        Ok(InstallLayout {
            destination_path: Path::new(paths.install_root)
                .join(&self.metadata.vendor_dir)
                .join(&self.metadata.product_name)
                .join(suffix),
            link_dir: PathBuf::from(paths.link_dir),
        })
    }
}

/// Fails when `package_type` cannot be built on `facts`.
pub fn check_platform(package_type: PackageType, facts: &PlatformFacts) -> Result<()> {
    match TYPE_GATES.iter().find(|g| g.package_type == package_type) {
        Some(gate) if !(gate.allowed)(facts) => Err(Error::PlatformMismatch {
            package_type,
            required: gate.required,
        }),
        _ => Ok(()),
    }
}

/// Name with the canonical product prefix (and a following dash) removed.
///
/// Returns an empty string for the canonical name itself; names without the
/// prefix come back unchanged.
pub fn side_by_side_suffix(name: &str, product_name: &str) -> String {
    match name.strip_prefix(product_name) {
        Some(rest) => rest.trim_start_matches('-').to_string(),
        None => name.to_string(),
    }
}

/// File name suffix for a legacy Windows runtime.
pub fn windows_name_suffix(runtime: &str) -> String {
    DOWNLEVEL_RUNTIMES
        .iter()
        .find(|(rid, _)| rid.eq_ignore_ascii_case(runtime))
        .map(|(_, suffix)| suffix.to_string())
        .unwrap_or_else(|| runtime.to_string())
}

fn distro_profile(facts: &PlatformFacts) -> Option<&'static DistroProfile> {
    let distro = facts.distro();
    let profile = DISTRO_PROFILES.iter().find(|p| {
        p.distro == distro && p.release.is_none_or(|r| facts.distro_version() == Some(r))
    });
    if profile.is_none() && facts.is_ubuntu() {
        log::warn!(
            "No dependency profile for Ubuntu {}; using the base dependency set",
            facts.distro_version().unwrap_or("(unknown)")
        );
    }
    profile
}

fn dependencies(facts: &PlatformFacts, profile: Option<&DistroProfile>) -> Vec<String> {
    let base: &[&str] = match facts.distro() {
        DistroKind::Ubuntu => UBUNTU_BASE_DEPENDENCIES,
        d if d.is_redhat_family() => REDHAT_BASE_DEPENDENCIES,
        _ => &[],
    };
    base.iter()
        .chain(profile.map_or(&[][..], |p| p.extra_dependencies))
        .map(|d| d.to_string())
        .collect()
}

fn dist_tag(facts: &PlatformFacts) -> Option<String> {
    let version = facts.distro_version().unwrap_or_default();
    match facts.distro() {
        DistroKind::CentOs => Some("el7.centos".to_string()),
        DistroKind::Fedora => Some(format!("fedora.{}", version)),
        DistroKind::OpenSuse => Some(format!("suse.{}", version)),
        _ => None,
    }
}

fn script_flavor(facts: &PlatformFacts) -> Option<ScriptFlavor> {
    if facts.is_ubuntu() {
        Some(ScriptFlavor::Ubuntu)
    } else if facts.is_redhat_family() {
        Some(ScriptFlavor::RedHat)
    } else {
        None
    }
}
