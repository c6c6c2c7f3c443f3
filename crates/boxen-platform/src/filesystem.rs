//! File System Abstraction
//!
//! Path helpers for locating model files and the images they reference.

use std::path::{Path, PathBuf};

use crate::{PlatformError, PlatformResult};

/// File system rooted at an asset directory
#[derive(Debug, Clone)]
pub struct FileSystem {
    /// Base directory for engine-provided assets (fallback textures etc.)
    asset_root: PathBuf,
}

impl FileSystem {
    /// Create a file system rooted at `./assets`
    pub fn new() -> Self {
        Self::with_root("assets")
    }

    /// Create a file system with a custom asset root
    pub fn with_root(asset_root: impl Into<PathBuf>) -> Self {
        Self {
            asset_root: asset_root.into(),
        }
    }

    /// Get the asset root
    pub fn asset_root(&self) -> &Path {
        &self.asset_root
    }

    /// Resolve a path relative to the asset root
    pub fn asset_path(&self, path: impl AsRef<Path>) -> PathBuf {
        self.asset_root.join(path)
    }

    /// Check if a regular file exists at `path`
    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        path.as_ref().is_file()
    }

    /// Read a file's contents
    pub fn read(&self, path: impl AsRef<Path>) -> PlatformResult<Vec<u8>> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(PlatformError::NotFound(path.to_path_buf()));
        }
        Ok(std::fs::read(path)?)
    }

    /// Read a file as a string
    pub fn read_string(&self, path: impl AsRef<Path>) -> PlatformResult<String> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(PlatformError::NotFound(path.to_path_buf()));
        }
        Ok(std::fs::read_to_string(path)?)
    }

    /// Directory containing `path`, or `.` for bare file names
    pub fn directory_of(&self, path: impl AsRef<Path>) -> PathBuf {
        match path.as_ref().parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Locate a file referenced from inside a model.
    ///
    /// Candidates are tried in order: the reference itself when absolute, the
    /// reference joined onto `directory`, and finally only its file name
    /// inside `directory`. The working directory is never consulted.
    /// Windows-style separators in the reference are normalized first.
    pub fn resolve_reference(&self, directory: &Path, reference: &str) -> Option<PathBuf> {
        let normalized = normalize_separators(reference);
        let as_given = PathBuf::from(&normalized);

        if as_given.is_absolute() && as_given.is_file() {
            return Some(as_given);
        }

        let joined = directory.join(&as_given);
        if joined.is_file() {
            return Some(joined);
        }

        if let Some(file_name) = as_given.file_name() {
            let flat = directory.join(file_name);
            if flat.is_file() {
                return Some(flat);
            }
        }

        log::debug!(
            "Could not resolve '{}' against {}",
            reference,
            directory.display()
        );
        None
    }
}

impl Default for FileSystem {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_separators(reference: &str) -> String {
    if std::path::MAIN_SEPARATOR == '\\' {
        reference.to_string()
    } else {
        reference.replace('\\', "/")
    }
}
