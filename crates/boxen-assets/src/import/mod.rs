//! Importer Adapter
//!
//! Format importers translate a file into an `ImportedScene`: a node tree
//! whose nodes reference meshes by index, meshes with per-vertex attribute
//! arrays and per-face index lists, and materials listing texture
//! references per category. Post-processing selected by `ImportFlags` then
//! runs on that neutral form, independent of the source format.

mod gltf;
pub mod postprocess;

pub use self::gltf::GltfImporter;

use std::path::Path;

use bitflags::bitflags;
use boxen_renderer::TextureKind;
use glam::{Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::ImportError;

bitflags! {
    /// Post-processing applied to an imported scene
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ImportFlags: u32 {
        /// Split polygons with more than three corners into triangles
        const TRIANGULATE = 1 << 0;
        /// Generate smooth normals for meshes without them
        const GEN_NORMALS = 1 << 1;
        /// Generate tangents and bitangents from UVs
        const CALC_TANGENT_SPACE = 1 << 2;
        /// Weld vertices with identical attributes
        const JOIN_IDENTICAL_VERTICES = 1 << 3;
        /// Reorder vertices by first use
        const IMPROVE_CACHE_LOCALITY = 1 << 4;
        /// Drop point and line primitives
        const SORT_BY_PTYPE = 1 << 5;
        /// Merge meshes sharing a node and a material
        const OPTIMIZE_MESHES = 1 << 6;
        /// Reject structurally broken scenes
        const VALIDATE_DATA_STRUCTURE = 1 << 7;
        /// Mirror texture coordinates vertically
        const FLIP_UVS = 1 << 8;
        /// Bake node transforms into vertices and flatten the hierarchy
        const PRE_TRANSFORM_VERTICES = 1 << 9;
    }
}

impl ImportFlags {
    /// Flags used when a model is loaded without explicit options
    pub const DEFAULT: Self = Self::TRIANGULATE
        .union(Self::GEN_NORMALS)
        .union(Self::CALC_TANGENT_SPACE)
        .union(Self::JOIN_IDENTICAL_VERTICES)
        .union(Self::IMPROVE_CACHE_LOCALITY)
        .union(Self::SORT_BY_PTYPE)
        .union(Self::OPTIMIZE_MESHES)
        .union(Self::VALIDATE_DATA_STRUCTURE);
}

impl Default for ImportFlags {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A polygon as a list of vertex indices
pub type Face = SmallVec<[u32; 4]>;

/// Where a material finds one of its images
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureReference {
    /// Path as written in the model, resolved against the model directory
    File(String),
    /// Encoded image bytes stored inside the model file
    Embedded { key: String, bytes: Vec<u8> },
}

/// Material as described by the source file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedMaterial {
    pub name: String,
    /// Declared texture slots, in declaration order
    pub textures: Vec<(TextureKind, TextureReference)>,
    pub ambient: Option<Vec3>,
    pub diffuse: Option<Vec3>,
    pub specular: Option<Vec3>,
    pub shininess: Option<f32>,
}

impl ImportedMaterial {
    /// Texture references declared for `kind`
    pub fn textures_of(&self, kind: TextureKind) -> impl Iterator<Item = &TextureReference> {
        self.textures
            .iter()
            .filter(move |(k, _)| *k == kind)
            .map(|(_, reference)| reference)
    }

    /// Number of slots declared for `kind`
    pub fn texture_count(&self, kind: TextureKind) -> usize {
        self.textures_of(kind).count()
    }
}

/// One mesh in source form
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedMesh {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    /// First UV channel
    pub tex_coords: Option<Vec<Vec2>>,
    pub tangents: Option<Vec<Vec3>>,
    pub bitangents: Option<Vec<Vec3>>,
    pub faces: Vec<Face>,
    /// Index into `ImportedScene::materials`
    pub material: Option<usize>,
}

impl ImportedMesh {
    /// Number of source vertices
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }
}

/// Scene graph node
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedNode {
    pub name: String,
    /// Indices into `ImportedScene::meshes`
    pub mesh_indices: Vec<usize>,
    /// Indices into `ImportedScene::nodes`
    pub children: Vec<usize>,
    /// Transform relative to the parent
    pub transform: Mat4,
}

impl Default for ImportedNode {
    fn default() -> Self {
        Self {
            name: String::new(),
            mesh_indices: Vec::new(),
            children: Vec::new(),
            transform: Mat4::IDENTITY,
        }
    }
}

/// Format-neutral result of an import
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedScene {
    pub nodes: Vec<ImportedNode>,
    pub root: Option<usize>,
    pub meshes: Vec<ImportedMesh>,
    pub materials: Vec<ImportedMaterial>,
    /// Set when the file holds no geometry at all
    pub incomplete: bool,
}

/// A model file format
pub trait SceneImporter {
    /// Importer name for diagnostics
    fn name(&self) -> &'static str;

    /// Check if this importer handles `path`, by extension
    fn can_import(&self, path: &Path) -> bool;

    /// Parse `path` into a scene. `flags` lets importers adjust how they
    /// read the source; post-processing itself runs afterwards.
    fn import(&self, path: &Path, flags: ImportFlags) -> Result<ImportedScene, ImportError>;
}

/// Pick the built-in importer for `path`
pub fn importer_for(path: &Path) -> Result<Box<dyn SceneImporter>, ImportError> {
    let importers: [Box<dyn SceneImporter>; 1] = [Box::new(GltfImporter::new())];
    importers
        .into_iter()
        .find(|importer| importer.can_import(path))
        .ok_or_else(|| {
            ImportError::Unsupported(
                path.extension()
                    .map(|ext| ext.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string()),
            )
        })
}

/// Case-insensitive extension check
pub(crate) fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_flags() {
        let flags = ImportFlags::default();
        assert!(flags.contains(ImportFlags::TRIANGULATE | ImportFlags::GEN_NORMALS));
        assert!(flags.contains(ImportFlags::VALIDATE_DATA_STRUCTURE));
        assert!(!flags.contains(ImportFlags::PRE_TRANSFORM_VERTICES));
        assert_eq!(flags.iter().count(), 8);
    }

    #[test]
    fn test_textures_of() {
        let material = ImportedMaterial {
            textures: vec![
                (TextureKind::Diffuse, TextureReference::File("a.png".into())),
                (TextureKind::Normal, TextureReference::File("n.png".into())),
                (TextureKind::Diffuse, TextureReference::File("b.png".into())),
            ],
            ..Default::default()
        };
        let diffuse: Vec<_> = material.textures_of(TextureKind::Diffuse).collect();
        assert_eq!(diffuse.len(), 2);
        assert_eq!(diffuse[1], &TextureReference::File("b.png".into()));
        assert_eq!(material.texture_count(TextureKind::Height), 0);
    }

    #[test]
    fn test_importer_selection() {
        assert!(importer_for(Path::new("models/box.GLTF")).is_ok());
        assert!(importer_for(Path::new("models/box.glb")).is_ok());
        assert!(matches!(
            importer_for(Path::new("models/box.fbx")),
            Err(ImportError::Unsupported(ext)) if ext == "fbx"
        ));
    }
}
