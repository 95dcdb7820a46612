//! Platform-specific packaging implementations.
//!
//! The host platform is never inspected implicitly: every builder receives a
//! [`PlatformFacts`] value captured once at startup, which keeps the
//! platform decisions testable from any host.
//!
//! # Supported Package Types
//!
//! | Platform | Package Types | Module |
//! |----------|--------------|---------|
//! | Ubuntu | .deb, AppImage | [`unix`], [`appimage`] |
//! | RedHat family | .rpm | [`unix`] |
//! | macOS | .pkg | [`unix`] |
//! | Windows | .msi, .appx | [`windows`] |
//! | Any | .zip | [`crate::packager::archive`] |

pub mod appimage;
pub mod facts;
pub mod unix;
pub mod windows;

pub use facts::{DistroKind, OsFamily, PlatformFacts};

use std::{fmt, str::FromStr};

/// Supported package types.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PackageType {
    /// Debian package (.deb) for Ubuntu.
    Deb,

    /// RPM package (.rpm) for CentOS, Fedora and openSUSE.
    Rpm,

    /// macOS flat installer package (.pkg).
    OsxPkg,

    /// Windows Installer package (.msi).
    Msi,

    /// Windows app package (.appx).
    Appx,

    /// Plain zip archive of the output tree.
    Zip,

    /// Linux AppImage.
    AppImage,
}

impl PackageType {
    /// Returns the short name for this package type.
    ///
    /// This is the lowercase identifier used on the command line and in fpm's
    /// `-t` argument.
    pub fn short_name(&self) -> &'static str {
        match self {
            PackageType::Deb => "deb",
            PackageType::Rpm => "rpm",
            PackageType::OsxPkg => "osxpkg",
            PackageType::Msi => "msi",
            PackageType::Appx => "appx",
            PackageType::Zip => "zip",
            PackageType::AppImage => "appimage",
        }
    }

    /// File extension of the produced artifact.
    pub fn extension(&self) -> &'static str {
        match self {
            PackageType::Deb => "deb",
            PackageType::Rpm => "rpm",
            PackageType::OsxPkg => "pkg",
            PackageType::Msi => "msi",
            PackageType::Appx => "appx",
            PackageType::Zip => "zip",
            PackageType::AppImage => "AppImage",
        }
    }

    /// All package types, in the order they are listed in help output.
    pub fn all() -> [PackageType; 7] {
        [
            PackageType::Deb,
            PackageType::Rpm,
            PackageType::OsxPkg,
            PackageType::Msi,
            PackageType::Appx,
            PackageType::Zip,
            PackageType::AppImage,
        ]
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

impl FromStr for PackageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        PackageType::all()
            .into_iter()
            .find(|t| t.short_name() == lower)
            .ok_or_else(|| {
                let valid: Vec<_> = PackageType::all().iter().map(|t| t.short_name()).collect();
                format!("unknown package type '{}'; expected one of: {}", s, valid.join(", "))
            })
    }
}
