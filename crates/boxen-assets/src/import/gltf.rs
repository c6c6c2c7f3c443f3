//! glTF 2.0 importer
//!
//! Reads `.gltf` (with external or data-URI buffers) and binary `.glb`
//! files. Each primitive becomes one imported mesh; node meshes map to the
//! list of their primitives.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use boxen_platform::FileSystem;
use boxen_renderer::TextureKind;
use glam::{Mat4, Vec2, Vec3};
use gltf::image::Source;
use gltf::mesh::Mode;
use smallvec::smallvec;

use super::{
    Face, ImportFlags, ImportedMaterial, ImportedMesh, ImportedNode, ImportedScene, SceneImporter,
    TextureReference, has_extension,
};
use crate::ImportError;

/// Importer for glTF 2.0 documents
#[derive(Debug, Clone, Default)]
pub struct GltfImporter {
    fs: FileSystem,
}

impl GltfImporter {
    /// Create a glTF importer
    pub fn new() -> Self {
        Self::default()
    }
}

impl SceneImporter for GltfImporter {
    fn name(&self) -> &'static str {
        "glTF"
    }

    fn can_import(&self, path: &Path) -> bool {
        has_extension(path, &["gltf", "glb"])
    }

    fn import(&self, path: &Path, _flags: ImportFlags) -> Result<ImportedScene, ImportError> {
        let parse_error = |message: String| ImportError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let bytes = self.fs.read(path).map_err(|err| match err {
            boxen_platform::PlatformError::NotFound(p) => ImportError::NotFound(p),
            other => parse_error(other.to_string()),
        })?;
        let gltf = gltf::Gltf::from_slice(&bytes).map_err(|err| parse_error(err.to_string()))?;

        let directory = self.fs.directory_of(path);
        let gltf::Gltf { document, blob } = gltf;
        let buffers: Vec<Vec<u8>> = gltf::import_buffers(&document, Some(&directory), blob)
            .map_err(|err| parse_error(err.to_string()))?
            .into_iter()
            .map(|data| data.0)
            .collect();

        let mut scene = ImportedScene::default();
        let images = read_images(&document, &buffers, path);
        scene.materials = document
            .materials()
            .map(|material| read_material(&material, &images))
            .collect();
        // Primitives without a material use the glTF default material
        let default_material = scene.materials.len();
        let mut uses_default_material = false;

        let mut primitive_ranges = Vec::with_capacity(document.meshes().len());
        for mesh in document.meshes() {
            let start = scene.meshes.len();
            for (i, primitive) in mesh.primitives().enumerate() {
                let mut imported = read_primitive(&primitive, &buffers);
                imported.name = match mesh.name() {
                    Some(name) if mesh.primitives().len() > 1 => format!("{name}.{i}"),
                    Some(name) => name.to_string(),
                    None => format!("mesh{}.{i}", mesh.index()),
                };
                imported.material = Some(primitive.material().index().unwrap_or_else(|| {
                    uses_default_material = true;
                    default_material
                }));
                scene.meshes.push(imported);
            }
            primitive_ranges.push(start..scene.meshes.len());
        }
        if uses_default_material {
            scene.materials.push(ImportedMaterial {
                name: "default".to_string(),
                ..Default::default()
            });
        }

        scene.nodes = document
            .nodes()
            .map(|node| ImportedNode {
                name: node.name().unwrap_or_default().to_string(),
                mesh_indices: node
                    .mesh()
                    .and_then(|mesh| primitive_ranges.get(mesh.index()).cloned())
                    .map(|range| range.collect())
                    .unwrap_or_default(),
                children: node.children().map(|child| child.index()).collect(),
                transform: Mat4::from_cols_array_2d(&node.transform().matrix()),
            })
            .collect();

        let roots = root_nodes(&document);
        scene.root = match roots.as_slice() {
            [] => None,
            [single] => Some(*single),
            _ => {
                scene.nodes.push(ImportedNode {
                    name: "root".to_string(),
                    children: roots,
                    ..Default::default()
                });
                Some(scene.nodes.len() - 1)
            }
        };
        scene.incomplete = scene.meshes.is_empty();

        log::debug!(
            "Imported glTF '{}': {} nodes, {} meshes, {} materials",
            path.display(),
            scene.nodes.len(),
            scene.meshes.len(),
            scene.materials.len()
        );
        Ok(scene)
    }
}

/// Roots of the default scene, the first scene, or every parentless node
fn root_nodes(document: &gltf::Document) -> Vec<usize> {
    if let Some(scene) = document.default_scene().or_else(|| document.scenes().next()) {
        return scene.nodes().map(|node| node.index()).collect();
    }

    let mut has_parent = vec![false; document.nodes().len()];
    for node in document.nodes() {
        for child in node.children() {
            has_parent[child.index()] = true;
        }
    }
    has_parent
        .iter()
        .enumerate()
        .filter(|(_, parented)| !**parented)
        .map(|(index, _)| index)
        .collect()
}

/// Resolve every image to a file reference or embedded bytes
fn read_images(
    document: &gltf::Document,
    buffers: &[Vec<u8>],
    path: &Path,
) -> Vec<Option<TextureReference>> {
    document
        .images()
        .map(|image| {
            let key = format!("{}#image{}", path.display(), image.index());
            match image.source() {
                Source::Uri { uri, .. } => match uri.strip_prefix("data:") {
                    Some(data) => {
                        let encoded = data.split_once(";base64,").map(|(_, payload)| payload);
                        match encoded.map(|payload| BASE64.decode(payload)) {
                            Some(Ok(bytes)) => Some(TextureReference::Embedded { key, bytes }),
                            _ => {
                                log::warn!("Unreadable data URI for image {}", image.index());
                                None
                            }
                        }
                    }
                    None => Some(TextureReference::File(uri.to_string())),
                },
                Source::View { view, .. } => {
                    let range = view.offset()..view.offset() + view.length();
                    match buffers.get(view.buffer().index()).and_then(|b| b.get(range)) {
                        Some(bytes) => Some(TextureReference::Embedded {
                            key,
                            bytes: bytes.to_vec(),
                        }),
                        None => {
                            log::warn!("Buffer view for image {} is out of bounds", image.index());
                            None
                        }
                    }
                }
            }
        })
        .collect()
}

fn read_material(
    material: &gltf::Material,
    images: &[Option<TextureReference>],
) -> ImportedMaterial {
    let pbr = material.pbr_metallic_roughness();
    let image_ref = |texture: gltf::Texture| images.get(texture.source().index()).cloned().flatten();

    let slots = [
        (TextureKind::Diffuse, pbr.base_color_texture().map(|info| info.texture())),
        (TextureKind::Specular, pbr.metallic_roughness_texture().map(|info| info.texture())),
        (TextureKind::Normal, material.normal_texture().map(|info| info.texture())),
        (TextureKind::Ambient, material.occlusion_texture().map(|info| info.texture())),
    ];
    let textures = slots
        .into_iter()
        .filter_map(|(kind, texture)| texture.and_then(image_ref).map(|reference| (kind, reference)))
        .collect();

    let [r, g, b, _] = pbr.base_color_factor();
    let roughness = pbr.roughness_factor().clamp(0.0, 1.0);
    ImportedMaterial {
        name: material.name().unwrap_or_default().to_string(),
        textures,
        ambient: None,
        diffuse: Some(Vec3::new(r, g, b)),
        specular: Some(Vec3::splat(pbr.metallic_factor())),
        // Map roughness onto a Phong exponent
        shininess: Some(2.0 + (1.0 - roughness) * 126.0),
    }
}

fn read_primitive(primitive: &gltf::Primitive, buffers: &[Vec<u8>]) -> ImportedMesh {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));

    let positions: Vec<Vec3> = reader
        .read_positions()
        .map(|iter| iter.map(Vec3::from).collect())
        .unwrap_or_default();
    let normals = reader
        .read_normals()
        .map(|iter| iter.map(Vec3::from).collect::<Vec<_>>());
    let tex_coords = reader
        .read_tex_coords(0)
        .map(|coords| coords.into_f32().map(Vec2::from).collect::<Vec<_>>());

    // Tangent w carries the bitangent handedness
    let (tangents, bitangents) = match (reader.read_tangents(), &normals) {
        (Some(iter), Some(normals)) => {
            let (tangents, bitangents): (Vec<Vec3>, Vec<Vec3>) = iter
                .zip(normals)
                .map(|([x, y, z, w], normal)| {
                    let tangent = Vec3::new(x, y, z);
                    (tangent, normal.cross(tangent) * w)
                })
                .unzip();
            (Some(tangents), Some(bitangents))
        }
        _ => (None, None),
    };

    let indices: Vec<u32> = reader
        .read_indices()
        .map(|indices| indices.into_u32().collect())
        .unwrap_or_else(|| (0..positions.len() as u32).collect());

    ImportedMesh {
        name: String::new(),
        faces: faces_for_mode(primitive.mode(), &indices),
        positions,
        normals,
        tex_coords,
        tangents,
        bitangents,
        material: None,
    }
}

/// Split an index stream into faces according to the primitive topology
fn faces_for_mode(mode: Mode, indices: &[u32]) -> Vec<Face> {
    match mode {
        Mode::Triangles => indices
            .chunks_exact(3)
            .map(|tri| smallvec![tri[0], tri[1], tri[2]])
            .collect(),
        Mode::TriangleStrip => indices
            .windows(3)
            .enumerate()
            .map(|(i, w)| {
                if i % 2 == 0 {
                    smallvec![w[0], w[1], w[2]]
                } else {
                    smallvec![w[1], w[0], w[2]]
                }
            })
            .collect(),
        // A fan is one convex polygon; triangulation splits it again
        Mode::TriangleFan if indices.len() >= 3 => vec![Face::from_slice(indices)],
        Mode::TriangleFan => Vec::new(),
        Mode::Points => indices.iter().map(|&i| smallvec![i]).collect(),
        Mode::Lines => indices
            .chunks_exact(2)
            .map(|line| smallvec![line[0], line[1]])
            .collect(),
        Mode::LineStrip => indices.windows(2).map(|w| smallvec![w[0], w[1]]).collect(),
        Mode::LineLoop => {
            let mut faces: Vec<Face> = indices.windows(2).map(|w| smallvec![w[0], w[1]]).collect();
            if let [first, .., last] = indices {
                if indices.len() > 2 {
                    faces.push(smallvec![*last, *first]);
                }
            }
            faces
        }
    }
}
