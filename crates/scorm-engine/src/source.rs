//! Where manifest bytes come from.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::Config;
use crate::error::{Result, ScormError};

/// Name of the manifest file at the root of every package.
pub const MANIFEST_FILE_NAME: &str = "imsmanifest.xml";

/// Supplies the manifest of a package by reference.
pub trait PackageSource {
    /// Returns the raw `imsmanifest.xml` bytes of a package.
    ///
    /// # Errors
    ///
    /// Returns an error if the package cannot be found or read.
    fn get_manifest_bytes(&self, package_ref: &str) -> Result<Vec<u8>>;
}

/// Reads extracted packages from a directory tree.
///
/// A reference is resolved against the root. It may name a package
/// directory containing `imsmanifest.xml` or the manifest file itself.
#[derive(Debug, Clone)]
pub struct DirectoryPackageSource {
    root: PathBuf,
    max_bytes: u64,
}

impl DirectoryPackageSource {
    /// Creates a source rooted at `root` with a manifest size limit.
    pub fn new(root: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }

    /// Creates a source using the configured size limit.
    pub fn from_config(root: impl Into<PathBuf>, config: &Config) -> Self {
        Self::new(root, config.max_manifest_bytes)
    }

    /// Path of the manifest a reference resolves to.
    #[must_use]
    pub fn manifest_path(&self, package_ref: &str) -> PathBuf {
        let target = self.root.join(package_ref);
        if target.is_dir() {
            target.join(MANIFEST_FILE_NAME)
        } else {
            target
        }
    }
}

impl PackageSource for DirectoryPackageSource {
    fn get_manifest_bytes(&self, package_ref: &str) -> Result<Vec<u8>> {
        let path = self.manifest_path(package_ref);
        let metadata = match std::fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Err(ScormError::manifest_not_found(path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ScormError::manifest_not_found(path));
            }
            Err(e) => return Err(e.into()),
        };
        if metadata.len() > self.max_bytes {
            return Err(ScormError::manifest_too_large(path, metadata.len(), self.max_bytes));
        }

        debug!(path = %path.display(), bytes = metadata.len(), "Reading manifest");
        Ok(std::fs::read(&path)?)
    }
}

/// Package identifier derived from a package path: its directory name.
#[must_use]
pub fn package_id_for(path: &Path) -> Option<String> {
    let dir = if path.file_name().is_some_and(|name| name == MANIFEST_FILE_NAME) {
        path.parent()?
    } else {
        path
    };
    dir.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
}
