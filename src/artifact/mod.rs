//! Artifacts produced by finished jobs and local package checks.

mod candidates;
mod filename;
mod resolver;

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::DeployError;
use crate::runtime::Runtime;

pub use candidates::package_candidates;
pub use filename::sanitize_filename;
pub use resolver::{ArtifactResolver, DatabaseScript, DatabaseScriptEntry};

/// Smallest file accepted as a deployable package.
pub const MIN_PACKAGE_SIZE: u64 = 1024;

const ZIP_MAGIC: &[u8] = b"PK";

/// One guess at a package's location. Accepted only when the body looks
/// like a zip archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactCandidate {
    pub url: String,
}

/// A file written to disk from a remote URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactDescriptor {
    pub local_path: PathBuf,
    pub source_url: String,
    pub size_bytes: u64,
}

pub fn has_zip_magic(data: &[u8]) -> bool {
    data.len() >= 4 && data.starts_with(ZIP_MAGIC)
}

pub fn is_zip_content_type(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| {
            let ct = ct.to_ascii_lowercase();
            ct.contains("application/zip") || ct.contains("application/x-zip")
        })
        .unwrap_or(false)
}

/// Check that `path` is a plausible package archive and return its bytes.
#[tracing::instrument(skip(runtime))]
pub fn validate_package<R: Runtime + ?Sized>(runtime: &R, path: &Path) -> Result<Vec<u8>, DeployError> {
    if !runtime.exists(path) {
        return Err(DeployError::Validation(format!(
            "Package not found: {}",
            path.display()
        )));
    }

    let size = runtime.file_size(path)?;
    let data = runtime.read(path)?;
    if size < MIN_PACKAGE_SIZE || !has_zip_magic(&data) {
        let head = &data[..data.len().min(4)];
        return Err(DeployError::Validation(format!(
            "{} is not a valid package archive (size={}B, magic={:02x?})",
            path.display(),
            size,
            head
        )));
    }
    Ok(data)
}

/// Read an optional companion file (customization, admin settings, plugins).
pub fn read_companion<R: Runtime + ?Sized>(
    runtime: &R,
    what: &str,
    path: &Path,
) -> Result<Vec<u8>, DeployError> {
    if !runtime.exists(path) {
        return Err(DeployError::Validation(format!(
            "{} not found: {}",
            what,
            path.display()
        )));
    }
    Ok(runtime.read(path)?)
}
