//! Vertex Record
//!
//! The interleaved vertex layout shared by CPU-side meshes and GPU vertex
//! buffers. Attribute offsets are derived from the struct itself and pinned
//! by compile-time assertions; reordering or adding a field changes the GPU
//! contract and must be reflected in every shader that consumes it.

use std::mem::{offset_of, size_of};

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use static_assertions::const_assert_eq;

/// One geometric sample of a mesh
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub position: Vec3,
    /// Surface normal
    pub normal: Vec3,
    /// Texture coordinate (UV channel 0)
    pub tex_coords: Vec2,
    /// Tangent-space U direction
    pub tangent: Vec3,
    /// Tangent-space V direction
    pub bitangent: Vec3,
}

const_assert_eq!(size_of::<Vertex>(), 56);
const_assert_eq!(offset_of!(Vertex, position), 0);
const_assert_eq!(offset_of!(Vertex, normal), 12);
const_assert_eq!(offset_of!(Vertex, tex_coords), 24);
const_assert_eq!(offset_of!(Vertex, tangent), 32);
const_assert_eq!(offset_of!(Vertex, bitangent), 44);

impl Vertex {
    /// Normal used when the source provides none
    pub const DEFAULT_NORMAL: Vec3 = Vec3::Y;
    /// Tangent used when the source provides none
    pub const DEFAULT_TANGENT: Vec3 = Vec3::X;
    /// Bitangent used when the source provides none
    pub const DEFAULT_BITANGENT: Vec3 = Vec3::Z;

    /// Attribute table, one entry per field in declaration order
    pub const ATTRIBUTES: [VertexAttribute; 5] = [
        VertexAttribute {
            location: 0,
            format: VertexFormat::Float32x3,
            offset: offset_of!(Vertex, position) as u64,
        },
        VertexAttribute {
            location: 1,
            format: VertexFormat::Float32x3,
            offset: offset_of!(Vertex, normal) as u64,
        },
        VertexAttribute {
            location: 2,
            format: VertexFormat::Float32x2,
            offset: offset_of!(Vertex, tex_coords) as u64,
        },
        VertexAttribute {
            location: 3,
            format: VertexFormat::Float32x3,
            offset: offset_of!(Vertex, tangent) as u64,
        },
        VertexAttribute {
            location: 4,
            format: VertexFormat::Float32x3,
            offset: offset_of!(Vertex, bitangent) as u64,
        },
    ];

    /// Buffer layout for interleaved `Vertex` arrays
    pub const LAYOUT: VertexLayout = VertexLayout {
        stride: size_of::<Vertex>() as u64,
        attributes: &Self::ATTRIBUTES,
    };

    /// Create a vertex with the default tangent basis
    pub fn new(position: Vec3, normal: Vec3, tex_coords: Vec2) -> Self {
        Self {
            position,
            normal,
            tex_coords,
            tangent: Self::DEFAULT_TANGENT,
            bitangent: Self::DEFAULT_BITANGENT,
        }
    }

    /// Create a vertex at `position` with every other attribute defaulted
    pub fn from_position(position: Vec3) -> Self {
        Self::new(position, Self::DEFAULT_NORMAL, Vec2::ZERO)
    }
}

impl Default for Vertex {
    fn default() -> Self {
        Self::from_position(Vec3::ZERO)
    }
}

/// Component format of a vertex attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    /// Two 32-bit floats
    Float32x2,
    /// Three 32-bit floats
    Float32x3,
}

impl VertexFormat {
    /// Size in bytes
    pub const fn size(self) -> u64 {
        match self {
            Self::Float32x2 => 8,
            Self::Float32x3 => 12,
        }
    }
}

/// A single attribute binding within a vertex buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    /// Shader input location
    pub location: u32,
    /// Component format
    pub format: VertexFormat,
    /// Byte offset inside one vertex
    pub offset: u64,
}

/// Layout descriptor binding vertex fields to shader locations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexLayout {
    /// Distance in bytes between consecutive vertices
    pub stride: u64,
    /// Attribute bindings
    pub attributes: &'static [VertexAttribute],
}
