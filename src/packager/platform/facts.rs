//! Snapshot of the host operating system.

use std::{collections::HashMap, fmt, path::Path};

use crate::packager::error::{ErrorExt, Result};

const OS_RELEASE: &str = "/etc/os-release";

/// Operating system family.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum OsFamily {
    /// Any Linux distribution
    Linux,
    /// macOS
    MacOS,
    /// Windows
    Windows,
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OsFamily::Linux => "Linux",
            OsFamily::MacOS => "macOS",
            OsFamily::Windows => "Windows",
        };
        f.write_str(name)
    }
}

/// Linux distributions the packaging tables know about.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum DistroKind {
    /// Ubuntu (deb)
    Ubuntu,
    /// CentOS (rpm)
    CentOs,
    /// Fedora (rpm)
    Fedora,
    /// openSUSE (rpm)
    OpenSuse,
    /// Anything else, including non-Linux hosts
    Other,
}

impl DistroKind {
    fn from_id(id: &str) -> Self {
        let id = id.to_ascii_lowercase();
        if id.contains("ubuntu") {
            DistroKind::Ubuntu
        } else if id.contains("centos") {
            DistroKind::CentOs
        } else if id.contains("fedora") {
            DistroKind::Fedora
        } else if id.contains("opensuse") {
            DistroKind::OpenSuse
        } else {
            DistroKind::Other
        }
    }

    /// CentOS, Fedora and openSUSE share the rpm packaging path.
    pub fn is_redhat_family(&self) -> bool {
        matches!(
            self,
            DistroKind::CentOs | DistroKind::Fedora | DistroKind::OpenSuse
        )
    }
}

/// Read-only facts about the platform the packages are built on.
///
/// Captured once by [`PlatformFacts::detect`] and then passed by reference to
/// every component that makes a platform decision.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlatformFacts {
    family: OsFamily,
    distro_id: Option<String>,
    distro_version: Option<String>,
    pretty_name: Option<String>,
    arch: String,
}

impl PlatformFacts {
    /// Detects the current host.
    ///
    /// On Linux this reads `/etc/os-release`; a missing file yields facts with
    /// no distro, which later fails type inference with `UnsupportedPlatform`.
    pub fn detect() -> Result<Self> {
        let arch = std::env::consts::ARCH.to_string();
        if cfg!(target_os = "macos") {
            return Ok(Self::macos().with_arch(arch));
        }
        if cfg!(windows) {
            return Ok(Self::windows().with_arch(arch));
        }

        let os_release = Path::new(OS_RELEASE);
        if !os_release.exists() {
            log::warn!("{} not found; distribution is unknown", OS_RELEASE);
            return Ok(Self::from_os_release("", &arch));
        }
        let content = std::fs::read_to_string(os_release).fs_context("reading", os_release)?;
        Ok(Self::from_os_release(&content, &arch))
    }

    /// Builds Linux facts from the contents of an `os-release` file.
    pub fn from_os_release(content: &str, arch: &str) -> Self {
        let fields = parse_os_release(content);
        Self {
            family: OsFamily::Linux,
            distro_id: fields.get("ID").cloned(),
            distro_version: fields.get("VERSION_ID").cloned(),
            pretty_name: fields.get("PRETTY_NAME").cloned(),
            arch: arch.to_string(),
        }
    }

    /// Linux facts with an explicit distro id and version.
    pub fn linux(distro_id: &str, distro_version: &str) -> Self {
        Self {
            family: OsFamily::Linux,
            distro_id: Some(distro_id.to_string()),
            distro_version: Some(distro_version.to_string()),
            pretty_name: None,
            arch: "x86_64".to_string(),
        }
    }

    /// macOS facts.
    pub fn macos() -> Self {
        Self {
            family: OsFamily::MacOS,
            distro_id: None,
            distro_version: None,
            pretty_name: None,
            arch: "x86_64".to_string(),
        }
    }

    /// Windows facts.
    pub fn windows() -> Self {
        Self {
            family: OsFamily::Windows,
            distro_id: None,
            distro_version: None,
            pretty_name: None,
            arch: "x86_64".to_string(),
        }
    }

    /// Replaces the CPU architecture (Rust `std::env::consts::ARCH` naming).
    pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = arch.into();
        self
    }

    /// Operating system family.
    pub fn family(&self) -> OsFamily {
        self.family
    }

    /// `ID` from os-release.
    pub fn distro_id(&self) -> Option<&str> {
        self.distro_id.as_deref()
    }

    /// `VERSION_ID` from os-release.
    pub fn distro_version(&self) -> Option<&str> {
        self.distro_version.as_deref()
    }

    /// CPU architecture.
    pub fn arch(&self) -> &str {
        &self.arch
    }

    /// Known distribution, or [`DistroKind::Other`].
    pub fn distro(&self) -> DistroKind {
        match (self.family, self.distro_id.as_deref()) {
            (OsFamily::Linux, Some(id)) => DistroKind::from_id(id),
            _ => DistroKind::Other,
        }
    }

    /// CentOS, Fedora or openSUSE.
    pub fn is_redhat_family(&self) -> bool {
        self.distro().is_redhat_family()
    }

    /// Ubuntu of any release.
    pub fn is_ubuntu(&self) -> bool {
        self.distro() == DistroKind::Ubuntu
    }

    /// Ubuntu release (e.g. `16.04`), only on Ubuntu.
    pub fn ubuntu_release(&self) -> Option<&str> {
        if self.is_ubuntu() {
            self.distro_version()
        } else {
            None
        }
    }

    /// Human-readable name used in error messages.
    pub fn description(&self) -> String {
        if let Some(pretty) = &self.pretty_name {
            return pretty.clone();
        }
        match (&self.distro_id, &self.distro_version) {
            (Some(id), Some(version)) => format!("{} {}", id, version),
            (Some(id), None) => id.clone(),
            _ => self.family.to_string(),
        }
    }

    /// .NET runtime identifier a default build on this host produces.
    pub fn default_runtime(&self) -> String {
        let arch = match self.arch.as_str() {
            "x86_64" => "x64",
            "x86" => "x86",
            "aarch64" => "arm64",
            "arm" => "arm",
            other => other,
        };
        match self.family {
            OsFamily::Linux => format!("linux-{}", arch),
            OsFamily::MacOS => format!("osx-{}", arch),
            OsFamily::Windows => format!("win7-{}", arch),
        }
    }
}

fn parse_os_release(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            (key.trim().to_string(), value.to_string())
        })
        .collect()
}
