//! # Boxen Renderer
//!
//! CPU-side meshes and textures kept in sync with GPU resources.
//!
//! ## Features
//! - Packed 56-byte `Vertex` record with a derived attribute layout
//! - `Mesh` with bounds, in-place transforms, and a GPU buffer mirror that
//!   is re-synchronized after every mutation
//! - `Texture` loading with per-category flip, fallback, and uniform tables
//! - `GpuBackend` boundary with a recording headless backend and a wgpu
//!   backend (feature `wgpu-backend`)
//! - `ShaderContext` uniform boundary used by `Mesh::draw`

pub mod backend;
pub mod material;
pub mod mesh;
pub mod shader;
pub mod texture;
pub mod vertex;

pub use backend::{
    BufferId, GpuBackend, HeadlessBackend, PixelFormat, SharedBackend, TextureId, VertexArrayId,
};
pub use material::Material;
pub use mesh::{GpuMirror, Mesh};
pub use shader::{ShaderContext, UniformTable, UniformValue};
pub use texture::{Texture, TextureKind, TextureRef, TextureSource};
pub use vertex::{Vertex, VertexAttribute, VertexFormat, VertexLayout};

#[cfg(feature = "wgpu-backend")]
pub use backend::WgpuBackend;

use std::path::PathBuf;

use thiserror::Error;

/// GPU backend errors
#[derive(Error, Debug)]
pub enum GpuError {
    #[error("GPU resource creation failed: {0}")]
    ResourceCreation(String),

    #[error("Unknown GPU resource: {0}")]
    ResourceNotFound(String),

    #[error("Out of GPU memory")]
    OutOfMemory,
}

/// Mesh geometry errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MeshError {
    #[error("Index {index} at position {position} is out of range for {vertex_count} vertices")]
    IndexOutOfRange {
        index: u32,
        position: usize,
        vertex_count: usize,
    },
}

/// Texture loading errors
#[derive(Error, Debug)]
pub enum TextureError {
    #[error("Texture file does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read texture '{source_name}': {source}")]
    Io {
        source_name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode texture '{source_name}': {source}")]
    Decode {
        source_name: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Invalid texture dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Pixel buffer holds {actual} bytes, expected {expected}")]
    PixelDataSize { expected: usize, actual: usize },
}

/// Renderer errors
#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error(transparent)]
    Texture(#[from] TextureError),
}

/// Result type for backend operations
pub type GpuResult<T> = Result<T, GpuError>;

/// Result type for renderer operations
pub type RendererResult<T> = Result<T, RendererError>;
