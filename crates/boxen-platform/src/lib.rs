//! # Boxen Platform
//!
//! Thin platform layer for the Boxen asset pipeline.
//!
//! - **FileSystem**: existence checks, model-directory lookup, and the
//!   reference resolution rules used when a model file names its textures

pub mod filesystem;

pub use filesystem::FileSystem;

use std::path::PathBuf;

use thiserror::Error;

/// Platform-specific errors
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("File I/O error: {0}")]
    FileIO(#[from] std::io::Error),
}

/// Result type for platform operations
pub type PlatformResult<T> = Result<T, PlatformError>;
