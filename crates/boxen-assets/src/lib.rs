//! # Boxen Assets
//!
//! Turns model files into GPU-ready meshes.
//!
//! ## Features
//! - Importer adapter producing a neutral scene (nodes, meshes, materials)
//! - glTF 2.0 importer (`.gltf` and `.glb`)
//! - Post-processing steps selected by `ImportFlags`
//! - `Model` with per-model texture deduplication, fallback textures,
//!   aggregate bounds, statistics, and distance-based LOD selection

pub mod config;
pub mod import;
pub mod model;
pub mod texture_cache;

pub use config::AssetConfig;
pub use import::{
    GltfImporter, ImportFlags, ImportedMaterial, ImportedMesh, ImportedNode, ImportedScene,
    SceneImporter, TextureReference,
};
pub use model::{LodLevel, Model};
pub use texture_cache::TextureCache;

use std::path::PathBuf;

use boxen_platform::PlatformError;
use boxen_renderer::RendererError;
use thiserror::Error;

/// Scene import failures
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Model file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to parse '{}': {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Incomplete scene in '{}': {reason}", .path.display())]
    IncompleteScene { path: PathBuf, reason: String },

    #[error("No meshes found in '{}'", .0.display())]
    NoMeshes(PathBuf),

    #[error("Scene failed validation: {0}")]
    Validation(String),

    #[error("Unsupported model format: {0}")]
    Unsupported(String),
}

/// Asset errors
#[derive(Error, Debug)]
pub enum AssetError {
    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Renderer(#[from] RendererError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type for asset operations
pub type AssetResult<T> = Result<T, AssetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_error_messages() {
        let err = AssetError::from(ImportError::NoMeshes(PathBuf::from("empty.gltf")));
        assert_eq!(err.to_string(), "No meshes found in 'empty.gltf'");

        let err = ImportError::Parse {
            path: PathBuf::from("bad.gltf"),
            message: "unexpected token".to_string(),
        };
        assert!(err.to_string().contains("unexpected token"));
    }
}
