//! Mesh and Geometry
//!
//! A mesh owns its vertices and indices on the CPU and mirrors them into a
//! vertex buffer, an optional index buffer, and a vertex-array object on the
//! GPU. Every mutation ends in one synchronization step, so after any public
//! setter returns the mirror holds exactly the CPU data (or is absent when
//! the mesh has no vertices or allocation failed).

use std::fmt;

use boxen_core::{Bounds, normal_matrix};
use glam::{Mat4, Vec3};

use crate::backend::{BufferDescriptor, BufferId, GpuBackend, SharedBackend, VertexArrayId};
use crate::material::Material;
use crate::shader::ShaderContext;
use crate::texture::{TextureKind, TextureRef};
use crate::vertex::Vertex;
use crate::{GpuResult, MeshError, RendererResult};

/// GPU resources mirroring a mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuMirror {
    pub vertex_buffer: BufferId,
    /// Present only while the mesh has indices
    pub index_buffer: Option<BufferId>,
    pub vertex_array: VertexArrayId,
}

impl GpuMirror {
    fn create(gpu: &dyn GpuBackend, label: Option<&str>, vertices: &[u8], indices: &[u8]) -> GpuResult<Self> {
        let vertex_buffer = gpu.create_buffer(&BufferDescriptor::vertex(label), vertices)?;

        let index_buffer = if indices.is_empty() {
            None
        } else {
            match gpu.create_buffer(&BufferDescriptor::index(label), indices) {
                Ok(buffer) => Some(buffer),
                Err(err) => {
                    gpu.destroy_buffer(vertex_buffer);
                    return Err(err);
                }
            }
        };

        match gpu.create_vertex_array(vertex_buffer, index_buffer, &Vertex::LAYOUT) {
            Ok(vertex_array) => Ok(Self {
                vertex_buffer,
                index_buffer,
                vertex_array,
            }),
            Err(err) => {
                if let Some(index_buffer) = index_buffer {
                    gpu.destroy_buffer(index_buffer);
                }
                gpu.destroy_buffer(vertex_buffer);
                Err(err)
            }
        }
    }

    /// Re-upload everything, adding or dropping the index buffer as needed.
    ///
    /// Only resources recorded in `self` are live on return, even on error.
    fn update(&mut self, gpu: &dyn GpuBackend, label: Option<&str>, vertices: &[u8], indices: &[u8]) -> GpuResult<()> {
        gpu.write_buffer(self.vertex_buffer, vertices)?;

        match (self.index_buffer, indices.is_empty()) {
            (Some(index_buffer), false) => gpu.write_buffer(index_buffer, indices)?,
            (None, false) => {
                let index_buffer = gpu.create_buffer(&BufferDescriptor::index(label), indices)?;
                let vertex_array = match gpu.create_vertex_array(
                    self.vertex_buffer,
                    Some(index_buffer),
                    &Vertex::LAYOUT,
                ) {
                    Ok(vertex_array) => vertex_array,
                    Err(err) => {
                        gpu.destroy_buffer(index_buffer);
                        return Err(err);
                    }
                };
                gpu.destroy_vertex_array(self.vertex_array);
                self.vertex_array = vertex_array;
                self.index_buffer = Some(index_buffer);
            }
            (Some(index_buffer), true) => {
                let vertex_array =
                    gpu.create_vertex_array(self.vertex_buffer, None, &Vertex::LAYOUT)?;
                gpu.destroy_vertex_array(self.vertex_array);
                gpu.destroy_buffer(index_buffer);
                self.vertex_array = vertex_array;
                self.index_buffer = None;
            }
            (None, true) => {}
        }
        Ok(())
    }

    fn release(self, gpu: &dyn GpuBackend) {
        gpu.destroy_vertex_array(self.vertex_array);
        if let Some(index_buffer) = self.index_buffer {
            gpu.destroy_buffer(index_buffer);
        }
        gpu.destroy_buffer(self.vertex_buffer);
    }
}

/// Renderable geometry with CPU data, bounds, texture references and a GPU mirror
pub struct Mesh {
    gpu: SharedBackend,
    name: String,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    textures: Vec<TextureRef>,
    material: Material,
    bounds: Bounds,
    mirror: Option<GpuMirror>,
}

impl Mesh {
    /// Create a mesh without geometry or GPU resources
    pub fn empty(gpu: SharedBackend) -> Self {
        Self {
            gpu,
            name: String::new(),
            vertices: Vec::new(),
            indices: Vec::new(),
            textures: Vec::new(),
            material: Material::default(),
            bounds: Bounds::ZERO,
            mirror: None,
        }
    }

    /// Create a mesh from vertices and indices.
    ///
    /// Accepts owned vectors (moved in) or slices (copied). Fails if any
    /// index is out of range for the vertex list.
    pub fn new(
        gpu: SharedBackend,
        vertices: impl Into<Vec<Vertex>>,
        indices: impl Into<Vec<u32>>,
    ) -> RendererResult<Self> {
        Self::with_textures(gpu, vertices, indices, Vec::new())
    }

    /// Create a mesh that references textures owned elsewhere
    pub fn with_textures(
        gpu: SharedBackend,
        vertices: impl Into<Vec<Vertex>>,
        indices: impl Into<Vec<u32>>,
        textures: Vec<TextureRef>,
    ) -> RendererResult<Self> {
        let vertices = vertices.into();
        let indices = indices.into();
        validate_indices(&indices, vertices.len())?;

        let mut mesh = Self::empty(gpu);
        mesh.vertices = vertices;
        mesh.indices = indices;
        mesh.textures = textures;
        mesh.calculate_bounds();
        mesh.sync_gpu();
        Ok(mesh)
    }

    /// Set the mesh name, used as the GPU debug label
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the vertex data, recompute bounds and re-upload
    pub fn set_vertices(&mut self, vertices: impl Into<Vec<Vertex>>) -> RendererResult<()> {
        let vertices = vertices.into();
        validate_indices(&self.indices, vertices.len())?;
        self.vertices = vertices;
        self.calculate_bounds();
        self.sync_gpu();
        Ok(())
    }

    /// Replace the index data and re-upload
    pub fn set_indices(&mut self, indices: impl Into<Vec<u32>>) -> RendererResult<()> {
        let indices = indices.into();
        validate_indices(&indices, self.vertices.len())?;
        self.indices = indices;
        self.sync_gpu();
        Ok(())
    }

    /// Replace vertices and indices together
    pub fn set_geometry(
        &mut self,
        vertices: impl Into<Vec<Vertex>>,
        indices: impl Into<Vec<u32>>,
    ) -> RendererResult<()> {
        let vertices = vertices.into();
        let indices = indices.into();
        validate_indices(&indices, vertices.len())?;
        self.vertices = vertices;
        self.indices = indices;
        self.calculate_bounds();
        self.sync_gpu();
        Ok(())
    }

    /// Append a texture reference
    pub fn add_texture(&mut self, texture: TextureRef) {
        self.textures.push(texture);
    }

    /// Replace all texture references
    pub fn set_textures(&mut self, textures: Vec<TextureRef>) {
        self.textures = textures;
    }

    pub fn clear_textures(&mut self) {
        self.textures.clear();
    }

    pub fn textures(&self) -> &[TextureRef] {
        &self.textures
    }

    /// Set the scalars used when no texture is bound
    pub fn set_material(&mut self, material: Material) {
        self.material = material;
    }

    pub fn material(&self) -> &Material {
        &self.material
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Bounding box, center and sphere
    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Minimum and maximum corners
    pub fn extents(&self) -> (Vec3, Vec3) {
        (self.bounds.min, self.bounds.max)
    }

    pub fn center(&self) -> Vec3 {
        self.bounds.center
    }

    pub fn bounding_sphere_radius(&self) -> f32 {
        self.bounds.radius
    }

    /// Check if the mesh has no vertices
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Check if GPU resources are allocated
    pub fn has_gpu_mirror(&self) -> bool {
        self.mirror.is_some()
    }

    /// Current GPU resources
    pub fn gpu_mirror(&self) -> Option<GpuMirror> {
        self.mirror
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Triangles drawn: from indices when present, otherwise from vertices
    pub fn triangle_count(&self) -> usize {
        if self.indices.is_empty() {
            self.vertices.len() / 3
        } else {
            self.indices.len() / 3
        }
    }

    /// CPU bytes held by vertices and indices
    pub fn memory_usage(&self) -> usize {
        std::mem::size_of_val(self.vertices.as_slice()) + std::mem::size_of_val(self.indices.as_slice())
    }

    /// Recompute bounds from the vertex positions
    pub fn calculate_bounds(&mut self) {
        self.bounds = Bounds::from_points(self.vertices.iter().map(|v| v.position));
    }

    /// Transform the mesh in place.
    ///
    /// Positions use `matrix` directly; normals, tangents and bitangents use
    /// its normal matrix and are renormalized.
    pub fn transform(&mut self, matrix: Mat4) {
        if self.vertices.is_empty() {
            return;
        }

        let normal_matrix = normal_matrix(matrix);
        for vertex in &mut self.vertices {
            vertex.position = matrix.transform_point3(vertex.position);
            vertex.normal = (normal_matrix * vertex.normal).normalize_or_zero();
            vertex.tangent = (normal_matrix * vertex.tangent).normalize_or_zero();
            vertex.bitangent = (normal_matrix * vertex.bitangent).normalize_or_zero();
        }

        self.calculate_bounds();
        self.sync_gpu();
    }

    /// Bind textures and issue the draw call.
    ///
    /// The n-th live texture of a category binds to `{prefix}{n}` on the next
    /// free unit; categories the shader does not declare are skipped. Material
    /// scalars are written only when no texture was bound. Units used here are
    /// released after the draw.
    pub fn draw(&self, shader: &dyn ShaderContext) {
        let Some(mirror) = self.mirror else {
            return;
        };
        if self.vertices.is_empty() {
            return;
        }

        let mut counters = [0u32; TextureKind::ALL.len()];
        let mut unit = 0u32;
        for texture in self.textures.iter().filter_map(TextureRef::upgrade) {
            if !texture.is_valid() {
                continue;
            }
            let kind = texture.kind().binding_kind();
            counters[kind as usize] += 1;
            let uniform = format!("{}{}", kind.uniform_prefix(), counters[kind as usize]);
            if !shader.has_uniform(&uniform) {
                continue;
            }
            texture.bind(unit);
            shader.set_int(&uniform, unit as i32);
            unit += 1;
        }

        if unit == 0 {
            self.material.apply(shader);
        }

        if self.indices.is_empty() {
            self.gpu.draw(mirror.vertex_array, self.vertices.len() as u32);
        } else {
            self.gpu.draw_indexed(mirror.vertex_array, self.indices.len() as u32);
        }

        for used in 0..unit {
            self.gpu.bind_texture(used, None);
        }
    }

    fn sync_gpu(&mut self) {
        if self.vertices.is_empty() {
            self.release_gpu();
            return;
        }
        if let Err(err) = self.try_sync_gpu() {
            log::error!(
                "Failed to synchronize GPU buffers for mesh '{}': {}",
                self.name,
                err
            );
            self.release_gpu();
        }
    }

    fn try_sync_gpu(&mut self) -> GpuResult<()> {
        let label = (!self.name.is_empty()).then_some(self.name.as_str());
        let vertices: &[u8] = bytemuck::cast_slice(&self.vertices);
        let indices: &[u8] = bytemuck::cast_slice(&self.indices);

        match &mut self.mirror {
            Some(mirror) => mirror.update(self.gpu.as_ref(), label, vertices, indices),
            None => {
                self.mirror = Some(GpuMirror::create(self.gpu.as_ref(), label, vertices, indices)?);
                Ok(())
            }
        }
    }

    fn release_gpu(&mut self) {
        if let Some(mirror) = self.mirror.take() {
            mirror.release(self.gpu.as_ref());
        }
    }
}

impl Clone for Mesh {
    fn clone(&self) -> Self {
        let mut mesh = Self {
            gpu: self.gpu.clone(),
            name: self.name.clone(),
            vertices: self.vertices.clone(),
            indices: self.indices.clone(),
            textures: self.textures.clone(),
            material: self.material.clone(),
            bounds: self.bounds,
            mirror: None,
        };
        mesh.sync_gpu();
        mesh
    }
}

impl Drop for Mesh {
    fn drop(&mut self) {
        self.release_gpu();
    }
}

impl fmt::Debug for Mesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mesh")
            .field("name", &self.name)
            .field("vertices", &self.vertices.len())
            .field("indices", &self.indices.len())
            .field("textures", &self.textures.len())
            .field("bounds", &self.bounds)
            .field("mirror", &self.mirror)
            .finish_non_exhaustive()
    }
}

fn validate_indices(indices: &[u32], vertex_count: usize) -> Result<(), MeshError> {
    match indices
        .iter()
        .position(|&index| index as usize >= vertex_count)
    {
        Some(position) => Err(MeshError::IndexOutOfRange {
            index: indices[position],
            position,
            vertex_count,
        }),
        None => Ok(()),
    }
}
