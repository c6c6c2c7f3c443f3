//! GPU Backend Boundary
//!
//! Everything meshes and textures need from a graphics API: buffers that
//! can be re-uploaded wholesale, a vertex-array object binding a vertex
//! buffer (and optional index buffer) to the `Vertex` layout, 2D textures
//! with explicit mip uploads, numbered texture units, and triangle-list
//! draws. Handles are opaque non-zero ids so that an absent resource is
//! always expressed as `Option::None`.

mod headless;
#[cfg(feature = "wgpu-backend")]
mod wgpu_backend;

pub use headless::{DrawCall, DrawKind, HeadlessBackend, TextureInfo};
#[cfg(feature = "wgpu-backend")]
pub use wgpu_backend::{DrawCommand, WgpuBackend};

use std::num::NonZeroU64;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::GpuResult;
use crate::vertex::VertexLayout;

macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(NonZeroU64);

        impl $name {
            /// Raw handle value
            pub fn raw(self) -> u64 {
                self.0.get()
            }
        }
    };
}

gpu_handle!(
    /// Handle to a GPU buffer
    BufferId
);
gpu_handle!(
    /// Handle to a vertex-array object (vertex layout + bound buffers)
    VertexArrayId
);
gpu_handle!(
    /// Handle to a GPU texture
    TextureId
);

/// Monotonic handle source shared by the backends
#[derive(Debug)]
pub(crate) struct HandleAllocator {
    next: AtomicU64,
}

impl HandleAllocator {
    pub(crate) fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    fn next(&self) -> NonZeroU64 {
        let raw = self.next.fetch_add(1, Ordering::Relaxed);
        NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN)
    }

    pub(crate) fn buffer(&self) -> BufferId {
        BufferId(self.next())
    }

    pub(crate) fn vertex_array(&self) -> VertexArrayId {
        VertexArrayId(self.next())
    }

    pub(crate) fn texture(&self) -> TextureId {
        TextureId(self.next())
    }
}

/// Buffer role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Interleaved vertex data
    Vertex,
    /// 32-bit triangle indices
    Index,
}

/// Buffer creation parameters
#[derive(Debug, Clone, Copy)]
pub struct BufferDescriptor<'a> {
    /// Debug label
    pub label: Option<&'a str>,
    /// Buffer role
    pub kind: BufferKind,
}

impl<'a> BufferDescriptor<'a> {
    /// Describe a vertex buffer
    pub fn vertex(label: Option<&'a str>) -> Self {
        Self {
            label,
            kind: BufferKind::Vertex,
        }
    }

    /// Describe an index buffer
    pub fn index(label: Option<&'a str>) -> Self {
        Self {
            label,
            kind: BufferKind::Index,
        }
    }
}

/// Texel layout of uploaded pixel data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Single 8-bit channel
    R8,
    /// Three 8-bit channels
    Rgb8,
    /// Four 8-bit channels
    Rgba8,
}

impl PixelFormat {
    /// Number of channels
    pub fn channels(self) -> u8 {
        match self {
            Self::R8 => 1,
            Self::Rgb8 => 3,
            Self::Rgba8 => 4,
        }
    }

    /// Bytes for a `width` x `height` image in this format
    pub fn byte_size(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.channels() as usize
    }
}

/// Texture sampling filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Texture coordinate wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapMode {
    Repeat,
    ClampToEdge,
}

/// Texture creation parameters
#[derive(Debug, Clone, Copy)]
pub struct TextureDescriptor<'a> {
    /// Debug label
    pub label: Option<&'a str>,
    /// Width of mip level 0
    pub width: u32,
    /// Height of mip level 0
    pub height: u32,
    /// Pixel layout of uploads
    pub format: PixelFormat,
    /// Number of mip levels to allocate
    pub mip_levels: u32,
    /// Minification/magnification filter
    pub filter: FilterMode,
    /// Coordinate wrapping on both axes
    pub wrap: WrapMode,
}

/// Shared handle to a backend
pub type SharedBackend = Arc<dyn GpuBackend>;

/// Graphics API boundary used by meshes and textures.
///
/// Destroying an unknown handle is ignored. Writes to unknown handles fail.
pub trait GpuBackend: Send + Sync {
    /// Backend name
    fn name(&self) -> &'static str;

    /// Allocate a buffer initialized with `contents`
    fn create_buffer(&self, desc: &BufferDescriptor<'_>, contents: &[u8]) -> GpuResult<BufferId>;

    /// Replace the whole contents of a buffer, growing it if needed
    fn write_buffer(&self, buffer: BufferId, contents: &[u8]) -> GpuResult<()>;

    /// Release a buffer
    fn destroy_buffer(&self, buffer: BufferId);

    /// Bind a vertex buffer and optional index buffer to a vertex layout
    fn create_vertex_array(
        &self,
        vertex_buffer: BufferId,
        index_buffer: Option<BufferId>,
        layout: &VertexLayout,
    ) -> GpuResult<VertexArrayId>;

    /// Release a vertex-array object (buffers are left alone)
    fn destroy_vertex_array(&self, vertex_array: VertexArrayId);

    /// Allocate a texture with storage for all mip levels
    fn create_texture(&self, desc: &TextureDescriptor<'_>) -> GpuResult<TextureId>;

    /// Upload one mip level
    fn write_texture(
        &self,
        texture: TextureId,
        mip_level: u32,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> GpuResult<()>;

    /// Release a texture
    fn destroy_texture(&self, texture: TextureId);

    /// Bind a texture to a numbered unit, or clear the unit with `None`
    fn bind_texture(&self, unit: u32, texture: Option<TextureId>);

    /// Indexed triangle-list draw over the first `index_count` indices
    fn draw_indexed(&self, vertex_array: VertexArrayId, index_count: u32);

    /// Non-indexed triangle-list draw over the first `vertex_count` vertices
    fn draw(&self, vertex_array: VertexArrayId, vertex_count: u32);
}
