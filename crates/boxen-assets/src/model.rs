//! Models
//!
//! A model is an ordered list of meshes loaded from one file, the textures
//! those meshes reference, aggregate bounds and statistics, and optional
//! lower-detail models selected by viewing distance.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use boxen_core::Bounds;
use boxen_platform::FileSystem;
use boxen_renderer::{
    Material, Mesh, RendererResult, ShaderContext, SharedBackend, Texture, TextureKind,
    TextureRef, Vertex,
};
use glam::{Mat4, Vec2, Vec3};

use crate::config::AssetConfig;
use crate::import::{
    ImportFlags, ImportedMaterial, ImportedMesh, ImportedScene, SceneImporter, TextureReference,
    importer_for, postprocess,
};
use crate::texture_cache::TextureCache;
use crate::{AssetError, AssetResult, ImportError};

/// Lower-detail stand-in used from `switch_distance` onwards
#[derive(Debug, Clone)]
pub struct LodLevel {
    pub model: Arc<Model>,
    pub switch_distance: f32,
}

/// Meshes loaded from one model file
pub struct Model {
    gpu: SharedBackend,
    config: AssetConfig,
    fs: FileSystem,
    meshes: Vec<Mesh>,
    bounds: Bounds,
    file_path: Option<PathBuf>,
    directory: PathBuf,
    lod_levels: Vec<LodLevel>,
    total_vertices: usize,
    total_triangles: usize,
    textures: TextureCache,
}

impl Model {
    /// Create an empty model with default settings
    pub fn new(gpu: SharedBackend) -> Self {
        Self::with_config(gpu, AssetConfig::default())
    }

    /// Create an empty model
    pub fn with_config(gpu: SharedBackend, config: AssetConfig) -> Self {
        let fs = FileSystem::with_root(config.fallback_dir.clone());
        Self {
            gpu,
            config,
            fs,
            meshes: Vec::new(),
            bounds: Bounds::ZERO,
            file_path: None,
            directory: PathBuf::new(),
            lod_levels: Vec::new(),
            total_vertices: 0,
            total_triangles: 0,
            textures: TextureCache::new(),
        }
    }

    /// Load a model file with default settings
    pub fn from_file(gpu: SharedBackend, path: impl AsRef<Path>) -> AssetResult<Self> {
        let mut model = Self::new(gpu);
        model.load_from_file(path)?;
        Ok(model)
    }

    /// Load a model file with the configured import flags
    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> AssetResult<()> {
        self.load_from_file_with(path, self.config.import_flags)
    }

    /// Load a model file, picking the importer by extension.
    ///
    /// On failure the model is left empty with zeroed statistics.
    pub fn load_from_file_with(
        &mut self,
        path: impl AsRef<Path>,
        flags: ImportFlags,
    ) -> AssetResult<()> {
        let path = path.as_ref();
        if !self.fs.exists(path) {
            return self.fail(path, ImportError::NotFound(path.to_path_buf()).into());
        }
        match importer_for(path) {
            Ok(importer) => self.load_with_importer(path, importer.as_ref(), flags),
            Err(err) => self.fail(path, err.into()),
        }
    }

    /// Load a model file through a specific importer
    pub fn load_with_importer(
        &mut self,
        path: impl AsRef<Path>,
        importer: &dyn SceneImporter,
        flags: ImportFlags,
    ) -> AssetResult<()> {
        let path = path.as_ref();
        self.meshes.clear();
        self.reset_statistics();
        self.file_path = Some(path.to_path_buf());
        self.directory = self.fs.directory_of(path);

        let meshes = match self.try_load(path, importer, flags) {
            Ok(meshes) => meshes,
            Err(err) => return self.fail(path, err),
        };

        self.meshes = meshes;
        self.update_statistics();
        self.calculate_model_bounds();
        log::info!(
            "Loaded model '{}' via {}: {} meshes, {} vertices, {} triangles, {} KiB, bounds {} .. {}, radius {:.3}",
            path.display(),
            importer.name(),
            self.meshes.len(),
            self.total_vertices,
            self.total_triangles,
            self.total_memory_usage() / 1024,
            self.bounds.min,
            self.bounds.max,
            self.bounds.radius
        );
        Ok(())
    }

    fn fail(&mut self, path: &Path, err: AssetError) -> AssetResult<()> {
        log::error!("Failed to load model '{}': {}", path.display(), err);
        self.meshes.clear();
        self.reset_statistics();
        Err(err)
    }

    fn try_load(
        &mut self,
        path: &Path,
        importer: &dyn SceneImporter,
        flags: ImportFlags,
    ) -> AssetResult<Vec<Mesh>> {
        if !self.fs.exists(path) {
            return Err(ImportError::NotFound(path.to_path_buf()).into());
        }
        let mut scene = importer.import(path, flags)?;
        postprocess::apply(&mut scene, flags)?;

        let incomplete = |reason: &str| ImportError::IncompleteScene {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        if scene.incomplete {
            return Err(incomplete("scene holds no geometry").into());
        }
        let Some(root) = scene.root else {
            return Err(incomplete("scene has no root node").into());
        };

        // Depth-first, children in declaration order
        let mut meshes = Vec::new();
        let mut visited = vec![false; scene.nodes.len()];
        let mut stack = vec![root];
        while let Some(index) = stack.pop() {
            let Some(node) = scene.nodes.get(index) else {
                log::warn!("Skipping missing node {index}");
                continue;
            };
            if std::mem::replace(&mut visited[index], true) {
                continue;
            }
            for &m in &node.mesh_indices {
                let Some(imported) = scene.meshes.get(m) else {
                    log::warn!("Node {index} references missing mesh {m}");
                    continue;
                };
                match self.process_mesh(imported, &scene) {
                    Ok(mesh) => meshes.push(mesh),
                    Err(err) => log::warn!("Skipping mesh '{}': {}", imported.name, err),
                }
            }
            stack.extend(node.children.iter().rev());
        }

        if meshes.is_empty() {
            return Err(ImportError::NoMeshes(path.to_path_buf()).into());
        }
        Ok(meshes)
    }

    fn process_mesh(
        &mut self,
        imported: &ImportedMesh,
        scene: &ImportedScene,
    ) -> RendererResult<Mesh> {
        let vertices: Vec<Vertex> = imported
            .positions
            .iter()
            .enumerate()
            .map(|(i, &position)| Vertex {
                position,
                normal: attribute(&imported.normals, i, Vertex::DEFAULT_NORMAL),
                tex_coords: attribute(&imported.tex_coords, i, Vec2::ZERO),
                tangent: attribute(&imported.tangents, i, Vertex::DEFAULT_TANGENT),
                bitangent: attribute(&imported.bitangents, i, Vertex::DEFAULT_BITANGENT),
            })
            .collect();
        let indices: Vec<u32> = imported.faces.iter().flatten().copied().collect();

        let fallback_material = ImportedMaterial::default();
        let material = imported
            .material
            .and_then(|m| scene.materials.get(m))
            .unwrap_or(&fallback_material);

        let mut textures = Vec::new();
        for kind in TextureKind::MATERIAL_ORDER {
            textures.extend(self.load_material_textures(material, kind));
        }
        if material.texture_count(TextureKind::Ambient) > 0 {
            textures.extend(self.load_material_textures(material, TextureKind::Ambient));
        }

        let texture_refs = textures.iter().map(TextureRef::new).collect();
        let mut mesh = Mesh::with_textures(self.gpu.clone(), vertices, indices, texture_refs)?;
        mesh.set_name(imported.name.clone());
        mesh.set_material(surface_material(material));
        Ok(mesh)
    }

    /// Textures for one category. Each declared slot is resolved, served
    /// from the cache, loaded, or replaced by the category fallback asset;
    /// a category left with nothing gets a procedural texture.
    fn load_material_textures(
        &mut self,
        material: &ImportedMaterial,
        kind: TextureKind,
    ) -> Vec<Arc<Texture>> {
        let mut loaded = Vec::new();
        let mut failed = false;
        for reference in material.textures_of(kind) {
            match self.load_texture(reference, kind) {
                Some(texture) => loaded.push(texture),
                None => failed = true,
            }
        }

        // One fallback per category, however many references failed
        if failed {
            loaded.extend(self.fallback_texture(kind));
        }
        if loaded.is_empty() {
            loaded.extend(self.procedural_texture(kind));
        }
        loaded
    }

    fn load_texture(&mut self, reference: &TextureReference, kind: TextureKind) -> Option<Arc<Texture>> {
        let generate_mipmaps = self.config.generate_mipmaps;
        match reference {
            TextureReference::File(name) => {
                let Some(path) = self.fs.resolve_reference(&self.directory, name) else {
                    log::error!(
                        "{kind} texture '{name}' referenced from {} was not found",
                        self.directory.display()
                    );
                    return None;
                };
                if let Some(cached) = self.cached_texture(&path, kind) {
                    return Some(cached);
                }
                let mut texture = Texture::new(self.gpu.clone());
                match texture.load_from_file_with(&path, kind, generate_mipmaps) {
                    Ok(()) => {
                        log::debug!("Loaded {kind} texture {}", path.display());
                        Some(self.textures.insert(path, texture))
                    }
                    Err(err) => {
                        log::error!("{err}");
                        None
                    }
                }
            }
            TextureReference::Embedded { key, bytes } => {
                if let Some(cached) = self.cached_texture(Path::new(key), kind) {
                    return Some(cached);
                }
                let mut texture = Texture::new(self.gpu.clone());
                match texture.load_from_memory(bytes, key.clone(), kind, generate_mipmaps) {
                    Ok(()) => {
                        log::debug!("Loaded embedded {kind} texture {key}");
                        Some(self.textures.insert(key, texture))
                    }
                    Err(err) => {
                        log::error!("{err}");
                        None
                    }
                }
            }
        }
    }

    /// Cache lookup by resolved path.
    ///
    /// A hit keeps the category it was first loaded as, so an image shared by
    /// two categories binds under the first one's uniform prefix.
    fn cached_texture(&self, key: &Path, kind: TextureKind) -> Option<Arc<Texture>> {
        let cached = self.textures.get(key)?;
        if cached.kind() != kind {
            log::warn!(
                "{} is cached as a {} texture; reusing it for {kind}",
                key.display(),
                cached.kind()
            );
        }
        Some(cached)
    }

    /// Engine-provided image for `kind`, if present under the fallback root
    fn fallback_texture(&mut self, kind: TextureKind) -> Option<Arc<Texture>> {
        let path = self.fs.asset_path(kind.fallback_asset());
        if let Some(cached) = self.textures.get(&path) {
            return Some(cached);
        }
        if !self.fs.exists(&path) {
            log::warn!("No fallback {kind} texture at {}", path.display());
            return None;
        }
        let mut texture = Texture::new(self.gpu.clone());
        match texture.load_from_file_with(&path, kind, self.config.generate_mipmaps) {
            Ok(()) => {
                log::debug!("Using fallback {kind} texture {}", path.display());
                Some(self.textures.insert(path, texture))
            }
            Err(err) => {
                log::error!("Failed to load fallback texture: {err}");
                None
            }
        }
    }

    /// Flat-colored stand-in for `kind`, shared by every mesh of the model
    fn procedural_texture(&mut self, kind: TextureKind) -> Option<Arc<Texture>> {
        let key = TextureCache::procedural_key(kind);
        if let Some(cached) = self.textures.get(&key) {
            return Some(cached);
        }
        let size = self.config.procedural_size.max(1);
        match Texture::procedural(self.gpu.clone(), kind, size) {
            Ok(texture) => Some(self.textures.insert(key, texture)),
            Err(err) => {
                log::error!("Failed to create procedural {kind} texture: {err}");
                None
            }
        }
    }

    /// Append a mesh and refresh statistics and bounds
    pub fn add_mesh(&mut self, mesh: Mesh) {
        self.total_vertices += mesh.vertex_count();
        self.total_triangles += mesh.triangle_count();
        self.meshes.push(mesh);
        self.calculate_model_bounds();
    }

    /// Register a lower-detail model used from `switch_distance` onwards.
    ///
    /// Models without meshes are rejected. Levels stay sorted by distance.
    pub fn add_lod_level(&mut self, model: impl Into<Arc<Model>>, switch_distance: f32) -> bool {
        let model = model.into();
        if !model.is_valid() {
            log::warn!("Rejected LOD level at distance {switch_distance}: model has no meshes");
            return false;
        }
        self.lod_levels.push(LodLevel {
            model,
            switch_distance,
        });
        self.lod_levels
            .sort_by(|a, b| a.switch_distance.total_cmp(&b.switch_distance));
        true
    }

    pub fn lod_levels(&self) -> &[LodLevel] {
        &self.lod_levels
    }

    /// Model to draw at `distance`: the farthest level whose switch distance
    /// has been reached, or this model
    pub fn select_lod(&self, distance: f32) -> &Model {
        self.lod_levels
            .iter()
            .rev()
            .find(|level| level.switch_distance <= distance)
            .map_or(self, |level| level.model.as_ref())
    }

    /// Recompute the aggregate bounds from the non-empty meshes
    pub fn calculate_model_bounds(&mut self) {
        self.bounds = Bounds::from_extents(
            self.meshes
                .iter()
                .filter(|mesh| !mesh.is_empty())
                .map(Mesh::extents),
        );
    }

    /// Bytes of CPU vertex and index data across all meshes
    pub fn total_memory_usage(&self) -> usize {
        self.meshes.iter().map(Mesh::memory_usage).sum()
    }

    /// Drop meshes and LOD levels; cached textures are kept
    pub fn clear(&mut self) {
        self.meshes.clear();
        self.lod_levels.clear();
        self.reset_statistics();
    }

    /// Check if the model has at least one mesh
    pub fn is_valid(&self) -> bool {
        !self.meshes.is_empty()
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn mesh(&self, index: usize) -> Option<&Mesh> {
        self.meshes.get(index)
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Mutate one mesh, then refresh statistics and bounds
    pub fn update_mesh<R>(&mut self, index: usize, f: impl FnOnce(&mut Mesh) -> R) -> Option<R> {
        let result = f(self.meshes.get_mut(index)?);
        self.update_statistics();
        self.calculate_model_bounds();
        Some(result)
    }

    /// Transform every mesh in place
    pub fn transform(&mut self, matrix: Mat4) {
        for mesh in &mut self.meshes {
            mesh.transform(matrix);
        }
        self.calculate_model_bounds();
    }

    /// Draw every mesh in order
    pub fn draw(&self, shader: &dyn ShaderContext) {
        for mesh in &self.meshes {
            mesh.draw(shader);
        }
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Aggregate minimum and maximum corners
    pub fn extents(&self) -> (Vec3, Vec3) {
        (self.bounds.min, self.bounds.max)
    }

    pub fn center(&self) -> Vec3 {
        self.bounds.center
    }

    pub fn bounding_sphere_radius(&self) -> f32 {
        self.bounds.radius
    }

    pub fn total_vertices(&self) -> usize {
        self.total_vertices
    }

    pub fn total_triangles(&self) -> usize {
        self.total_triangles
    }

    /// Path of the last file loaded
    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Directory texture references are resolved against
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn texture_cache(&self) -> &TextureCache {
        &self.textures
    }

    pub fn config(&self) -> &AssetConfig {
        &self.config
    }

    fn update_statistics(&mut self) {
        self.total_vertices = self.meshes.iter().map(Mesh::vertex_count).sum();
        self.total_triangles = self.meshes.iter().map(Mesh::triangle_count).sum();
    }

    fn reset_statistics(&mut self) {
        self.total_vertices = 0;
        self.total_triangles = 0;
        self.bounds = Bounds::ZERO;
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("file_path", &self.file_path)
            .field("meshes", &self.meshes.len())
            .field("total_vertices", &self.total_vertices)
            .field("total_triangles", &self.total_triangles)
            .field("bounds", &self.bounds)
            .field("lod_levels", &self.lod_levels.len())
            .field("textures", &self.textures.len())
            .finish_non_exhaustive()
    }
}

fn attribute<T: Copy>(values: &Option<Vec<T>>, index: usize, default: T) -> T {
    values
        .as_ref()
        .and_then(|values| values.get(index))
        .copied()
        .unwrap_or(default)
}

fn surface_material(material: &ImportedMaterial) -> Material {
    let defaults = Material::default();
    Material::new(
        material.ambient.unwrap_or(defaults.ambient),
        material.diffuse.unwrap_or(defaults.diffuse),
        material.specular.unwrap_or(defaults.specular),
        material.shininess.unwrap_or(defaults.shininess),
    )
    .with_name(material.name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::ImportedNode;
    use boxen_renderer::{HeadlessBackend, UniformTable};
    use smallvec::smallvec;

    fn headless() -> (Arc<HeadlessBackend>, SharedBackend) {
        let backend = Arc::new(HeadlessBackend::new());
        let shared: SharedBackend = backend.clone();
        (backend, shared)
    }

    fn triangle_mesh(gpu: SharedBackend, offset: Vec3) -> Mesh {
        let vertices = [Vec3::ZERO, Vec3::X, Vec3::Y]
            .map(|p| Vertex::from_position(p + offset))
            .to_vec();
        Mesh::new(gpu, vertices, vec![0, 1, 2]).unwrap()
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("boxen_model_tests").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Serves a fixed scene regardless of the path
    struct FixedImporter(ImportedScene);

    impl SceneImporter for FixedImporter {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn can_import(&self, _path: &Path) -> bool {
            true
        }

        fn import(&self, _path: &Path, _flags: ImportFlags) -> Result<ImportedScene, ImportError> {
            Ok(self.0.clone())
        }
    }

    fn triangle_scene(material: ImportedMaterial) -> ImportedScene {
        ImportedScene {
            nodes: vec![ImportedNode {
                mesh_indices: vec![0],
                ..Default::default()
            }],
            root: Some(0),
            meshes: vec![ImportedMesh {
                name: "tri".to_string(),
                positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
                faces: vec![smallvec![0, 1, 2]],
                material: Some(0),
                ..Default::default()
            }],
            materials: vec![material],
            incomplete: false,
        }
    }

    fn model_file(name: &str) -> PathBuf {
        let path = scratch_dir(name).join("scene.fixed");
        std::fs::write(&path, b"fixed").unwrap();
        path
    }

    #[test]
    fn test_new_model_is_empty() {
        let (_, gpu) = headless();
        let model = Model::new(gpu);
        assert!(!model.is_valid());
        assert_eq!(model.mesh_count(), 0);
        assert_eq!(*model.bounds(), Bounds::ZERO);
    }

    #[test]
    fn test_add_mesh_updates_statistics_and_bounds() {
        let (_, gpu) = headless();
        let mut model = Model::new(gpu.clone());
        model.add_mesh(triangle_mesh(gpu.clone(), Vec3::ZERO));
        model.add_mesh(triangle_mesh(gpu, Vec3::new(2.0, 0.0, 0.0)));

        assert!(model.is_valid());
        assert_eq!(model.total_vertices(), 6);
        assert_eq!(model.total_triangles(), 2);
        assert_eq!(model.extents(), (Vec3::ZERO, Vec3::new(3.0, 1.0, 0.0)));
        assert_eq!(model.center(), Vec3::new(1.5, 0.5, 0.0));
        let expected = Vec3::new(1.5, 0.5, 0.0).length();
        assert!((model.bounding_sphere_radius() - expected).abs() < 1e-5);
    }

    #[test]
    fn test_lod_levels_sorted() {
        let (_, gpu) = headless();
        let mut model = Model::new(gpu.clone());
        for distance in [50.0, 10.0, 30.0] {
            let mut lod = Model::new(gpu.clone());
            lod.add_mesh(triangle_mesh(gpu.clone(), Vec3::ZERO));
            assert!(model.add_lod_level(lod, distance));
        }
        let distances: Vec<f32> = model.lod_levels().iter().map(|l| l.switch_distance).collect();
        assert_eq!(distances, vec![10.0, 30.0, 50.0]);
    }

    #[test]
    fn test_invalid_lod_rejected() {
        let (_, gpu) = headless();
        let mut model = Model::new(gpu.clone());
        assert!(!model.add_lod_level(Model::new(gpu), 10.0));
        assert!(model.lod_levels().is_empty());
    }

    #[test]
    fn test_select_lod() {
        let (_, gpu) = headless();
        let mut model = Model::new(gpu.clone());
        model.add_mesh(triangle_mesh(gpu.clone(), Vec3::ZERO));

        let mut far = Model::new(gpu.clone());
        far.add_mesh(triangle_mesh(gpu.clone(), Vec3::ZERO));
        far.add_mesh(triangle_mesh(gpu, Vec3::ONE));
        model.add_lod_level(far, 20.0);

        assert_eq!(model.select_lod(5.0).mesh_count(), 1);
        assert_eq!(model.select_lod(20.0).mesh_count(), 2);
        assert_eq!(model.select_lod(500.0).mesh_count(), 2);
    }

    #[test]
    fn test_clear_keeps_texture_cache() {
        let (_, gpu) = headless();
        let mut model = Model::new(gpu.clone());
        let path = model_file("clear");
        model
            .load_with_importer(
                &path,
                &FixedImporter(triangle_scene(Default::default())),
                ImportFlags::empty(),
            )
            .unwrap();
        let cached = model.texture_cache().len();
        assert!(cached > 0);

        model.clear();
        assert!(!model.is_valid());
        assert_eq!(model.total_vertices(), 0);
        assert_eq!(model.texture_cache().len(), cached);
    }

    #[test]
    fn test_missing_file_leaves_model_empty() {
        let (_, gpu) = headless();
        let mut model = Model::new(gpu.clone());
        model.add_mesh(triangle_mesh(gpu, Vec3::ZERO));

        let err = model.load_from_file("no/such/model.gltf").unwrap_err();
        assert!(matches!(err, AssetError::Import(ImportError::NotFound(_))));
        assert!(!model.is_valid());
        assert_eq!(model.total_vertices(), 0);
        assert_eq!(model.total_triangles(), 0);
    }

    #[test]
    fn test_unsupported_format() {
        let (_, gpu) = headless();
        let mut model = Model::new(gpu);
        let err = model.load_from_file(model_file("unsupported")).unwrap_err();
        assert!(matches!(err, AssetError::Import(ImportError::Unsupported(_))));
    }

    #[test]
    fn test_undeclared_categories_get_procedural_textures() {
        let (backend, gpu) = headless();
        let mut model = Model::new(gpu);
        let path = model_file("procedural");
        model
            .load_with_importer(
                &path,
                &FixedImporter(triangle_scene(Default::default())),
                ImportFlags::empty(),
            )
            .unwrap();

        let mesh = model.mesh(0).unwrap();
        let textures: Vec<_> = mesh.textures().iter().filter_map(TextureRef::upgrade).collect();
        assert_eq!(textures.len(), TextureKind::MATERIAL_ORDER.len());
        for (texture, kind) in textures.iter().zip(TextureKind::MATERIAL_ORDER) {
            assert_eq!(texture.kind(), kind);
            let info = backend.texture_info(texture.id().unwrap()).unwrap();
            assert_eq!(&info.base_level[..3], &kind.fallback_color());
        }
    }

    #[test]
    fn test_missing_texture_falls_back_to_procedural() {
        let (_, gpu) = headless();
        let config = AssetConfig {
            fallback_dir: scratch_dir("no_fallbacks"),
            ..AssetConfig::default()
        };
        let mut model = Model::with_config(gpu, config);
        let material = ImportedMaterial {
            textures: vec![(TextureKind::Diffuse, TextureReference::File("missing.png".into()))],
            ..Default::default()
        };
        let path = model_file("missing_texture");
        model
            .load_with_importer(
                &path,
                &FixedImporter(triangle_scene(material)),
                ImportFlags::empty(),
            )
            .unwrap();

        let diffuse: Vec<_> = model
            .mesh(0)
            .unwrap()
            .textures()
            .iter()
            .filter_map(TextureRef::upgrade)
            .filter(|t| t.kind() == TextureKind::Diffuse)
            .collect();
        assert_eq!(diffuse.len(), 1);
        assert!(model.texture_cache().contains(TextureCache::procedural_key(TextureKind::Diffuse)));
    }

    #[test]
    fn test_fallback_asset_used_when_reference_fails() {
        let (_, gpu) = headless();
        let root = scratch_dir("fallback_root");
        let fallback = root.join(TextureKind::Normal.fallback_asset());
        std::fs::create_dir_all(fallback.parent().unwrap()).unwrap();
        image::RgbImage::from_pixel(2, 2, image::Rgb([10, 20, 30])).save(&fallback).unwrap();

        let config = AssetConfig {
            fallback_dir: root,
            ..AssetConfig::default()
        };
        let mut model = Model::with_config(gpu, config);
        let material = ImportedMaterial {
            textures: vec![(TextureKind::Normal, TextureReference::File("gone.png".into()))],
            ..Default::default()
        };
        let path = model_file("fallback_asset");
        model
            .load_with_importer(
                &path,
                &FixedImporter(triangle_scene(material)),
                ImportFlags::empty(),
            )
            .unwrap();

        assert!(model.texture_cache().contains(&fallback));
        assert!(!model.texture_cache().contains(TextureCache::procedural_key(TextureKind::Normal)));
    }

    #[test]
    fn test_failed_references_share_one_fallback() {
        let (_, gpu) = headless();
        let root = scratch_dir("single_fallback_root");
        let fallback = root.join(TextureKind::Diffuse.fallback_asset());
        std::fs::create_dir_all(fallback.parent().unwrap()).unwrap();
        image::RgbImage::from_pixel(2, 2, image::Rgb([90, 90, 90])).save(&fallback).unwrap();

        let config = AssetConfig {
            fallback_dir: root,
            ..AssetConfig::default()
        };
        let mut model = Model::with_config(gpu, config);
        let material = ImportedMaterial {
            textures: vec![
                (TextureKind::Diffuse, TextureReference::File("lost_a.png".into())),
                (TextureKind::Diffuse, TextureReference::File("lost_b.png".into())),
                (TextureKind::Diffuse, TextureReference::File("lost_c.png".into())),
            ],
            ..Default::default()
        };
        let path = model_file("single_fallback");
        model
            .load_with_importer(
                &path,
                &FixedImporter(triangle_scene(material)),
                ImportFlags::empty(),
            )
            .unwrap();

        let diffuse = model
            .mesh(0)
            .unwrap()
            .textures()
            .iter()
            .filter_map(TextureRef::upgrade)
            .filter(|t| t.kind() == TextureKind::Diffuse)
            .count();
        assert_eq!(diffuse, 1);
        assert!(model.texture_cache().contains(&fallback));
    }

    #[test]
    fn test_image_shared_by_two_categories_is_cached_once() {
        let (_, gpu) = headless();
        let dir = scratch_dir("shared_image");
        image::RgbImage::from_pixel(2, 2, image::Rgb([0, 128, 255]))
            .save(dir.join("orm.png"))
            .unwrap();
        let path = dir.join("scene.fixed");
        std::fs::write(&path, b"fixed").unwrap();

        let mut model = Model::new(gpu);
        let material = ImportedMaterial {
            textures: vec![
                (TextureKind::Specular, TextureReference::File("orm.png".into())),
                (TextureKind::Ambient, TextureReference::File("orm.png".into())),
            ],
            ..Default::default()
        };
        model
            .load_with_importer(
                &path,
                &FixedImporter(triangle_scene(material)),
                ImportFlags::empty(),
            )
            .unwrap();

        let shared = model.texture_cache().get(dir.join("orm.png")).unwrap();
        assert_eq!(shared.kind(), TextureKind::Specular);
        let uses = model
            .mesh(0)
            .unwrap()
            .textures()
            .iter()
            .filter_map(TextureRef::upgrade)
            .filter(|t| Arc::ptr_eq(t, &shared))
            .count();
        assert_eq!(uses, 2);
    }

    #[test]
    fn test_zero_procedural_size_still_yields_textures() {
        let (backend, gpu) = headless();
        let config = AssetConfig {
            procedural_size: 0,
            ..AssetConfig::default()
        };
        let mut model = Model::with_config(gpu, config);
        let path = model_file("zero_procedural");
        model
            .load_with_importer(
                &path,
                &FixedImporter(triangle_scene(Default::default())),
                ImportFlags::empty(),
            )
            .unwrap();

        let textures: Vec<_> = model
            .mesh(0)
            .unwrap()
            .textures()
            .iter()
            .filter_map(TextureRef::upgrade)
            .collect();
        assert_eq!(textures.len(), TextureKind::MATERIAL_ORDER.len());
        for texture in &textures {
            let info = backend.texture_info(texture.id().unwrap()).unwrap();
            assert_eq!((info.width, info.height), (1, 1));
        }
    }

    #[test]
    fn test_empty_scene_is_incomplete() {
        let (_, gpu) = headless();
        let mut model = Model::new(gpu);
        let scene = ImportedScene {
            incomplete: true,
            ..Default::default()
        };
        let path = model_file("incomplete");
        let err = model
            .load_with_importer(&path, &FixedImporter(scene), ImportFlags::empty())
            .unwrap_err();
        assert!(matches!(err, AssetError::Import(ImportError::IncompleteScene { .. })));
    }

    #[test]
    fn test_bad_meshes_skipped() {
        let (_, gpu) = headless();
        let mut model = Model::new(gpu);
        let mut scene = triangle_scene(Default::default());
        let mut broken = scene.meshes[0].clone();
        broken.faces = vec![smallvec![0, 1, 7]];
        scene.meshes.push(broken);
        scene.nodes[0].mesh_indices.push(1);

        let path = model_file("skip_bad");
        model
            .load_with_importer(&path, &FixedImporter(scene.clone()), ImportFlags::empty())
            .unwrap();
        assert_eq!(model.mesh_count(), 1);

        // Only broken meshes left
        scene.nodes[0].mesh_indices = vec![1];
        let err = model
            .load_with_importer(&path, &FixedImporter(scene.clone()), ImportFlags::empty())
            .unwrap_err();
        assert!(matches!(err, AssetError::Import(ImportError::NoMeshes(_))));

        let err = model
            .load_with_importer(&path, &FixedImporter(scene), ImportFlags::VALIDATE_DATA_STRUCTURE)
            .unwrap_err();
        assert!(matches!(err, AssetError::Import(ImportError::Validation(_))));
        assert!(!model.is_valid());
    }

    #[test]
    fn test_traversal_visits_children_in_order() {
        let (_, gpu) = headless();
        let mut model = Model::new(gpu);
        let mut scene = triangle_scene(Default::default());
        for name in ["a", "b"] {
            let mut mesh = scene.meshes[0].clone();
            mesh.name = name.to_string();
            scene.meshes.push(mesh);
        }
        scene.nodes = vec![
            ImportedNode {
                mesh_indices: vec![0],
                children: vec![1, 2],
                ..Default::default()
            },
            ImportedNode {
                mesh_indices: vec![1],
                ..Default::default()
            },
            ImportedNode {
                mesh_indices: vec![2],
                ..Default::default()
            },
        ];

        let path = model_file("traversal");
        model
            .load_with_importer(&path, &FixedImporter(scene), ImportFlags::empty())
            .unwrap();
        let names: Vec<&str> = model.meshes().iter().map(Mesh::name).collect();
        assert_eq!(names, vec!["tri", "a", "b"]);
    }

    #[test]
    fn test_update_mesh_refreshes_bounds() {
        let (_, gpu) = headless();
        let mut model = Model::new(gpu.clone());
        model.add_mesh(triangle_mesh(gpu, Vec3::ZERO));

        let updated = model.update_mesh(0, |mesh| mesh.transform(Mat4::from_scale(Vec3::splat(4.0))));
        assert!(updated.is_some());
        assert_eq!(model.extents().1, Vec3::new(4.0, 4.0, 0.0));
        assert!(model.update_mesh(3, |_| ()).is_none());
    }

    #[test]
    fn test_draw_all_meshes() {
        let (backend, gpu) = headless();
        let mut model = Model::new(gpu.clone());
        model.add_mesh(triangle_mesh(gpu.clone(), Vec3::ZERO));
        model.add_mesh(triangle_mesh(gpu, Vec3::ONE));

        model.draw(&UniformTable::new());
        assert_eq!(backend.draw_count(), 2);
    }

    #[test]
    fn test_memory_usage() {
        let (_, gpu) = headless();
        let mut model = Model::new(gpu.clone());
        model.add_mesh(triangle_mesh(gpu, Vec3::ZERO));
        assert_eq!(
            model.total_memory_usage(),
            3 * std::mem::size_of::<Vertex>() + 3 * std::mem::size_of::<u32>()
        );
    }
}
