//! Built artifacts and their integrity metadata.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

use super::{
    error::{ErrorExt, Result},
    platform::PackageType,
    utils::fs,
};

/// A created package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    /// Final path of the package file.
    pub artifact_path: PathBuf,

    /// Format of the package.
    pub package_type: PackageType,

    /// Size in bytes.
    pub size: u64,

    /// Hex-encoded SHA-256 of the file, for publishing next to the download.
    pub checksum: String,
}

impl BuildResult {
    /// Reads size and checksum of `artifact_path`.
    pub async fn for_artifact(package_type: PackageType, artifact_path: PathBuf) -> Result<Self> {
        let size = fs::file_size(&artifact_path).await?;
        let checksum = calculate_sha256(&artifact_path).await?;
        log::info!(
            "Created {} package {} ({} bytes)",
            package_type,
            artifact_path.display(),
            size
        );
        Ok(Self {
            artifact_path,
            package_type,
            size,
            checksum,
        })
    }
}

/// SHA-256 of a file, read in 8KB chunks.
pub async fn calculate_sha256(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .fs_context("opening file for hashing", path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = file
            .read(&mut buffer)
            .await
            .fs_context("reading file for hash calculation", path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
