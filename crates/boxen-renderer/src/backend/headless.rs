//! Headless backend
//!
//! Keeps every resource in host memory and records binds and draws instead
//! of executing them. Used by tests, tools, and batch processing where no
//! GPU is available.

use ahash::AHashMap;
use parking_lot::Mutex;

use super::{
    BufferDescriptor, BufferId, BufferKind, GpuBackend, HandleAllocator, PixelFormat,
    TextureDescriptor, TextureId, VertexArrayId,
};
use crate::vertex::VertexLayout;
use crate::{GpuError, GpuResult};

/// How a recorded draw addressed its vertices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawKind {
    Indexed,
    Arrays,
}

/// One recorded draw call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawCall {
    /// Vertex-array object drawn
    pub vertex_array: VertexArrayId,
    /// Indexed or non-indexed
    pub kind: DrawKind,
    /// Index or vertex count
    pub count: u32,
    /// Texture units bound at the time of the draw, sorted by unit
    pub textures: Vec<(u32, TextureId)>,
}

/// Snapshot of a headless texture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureInfo {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub mip_levels: u32,
    /// Mip levels that received pixel data
    pub levels_written: Vec<u32>,
    /// Last upload to mip level 0
    pub base_level: Vec<u8>,
}

#[derive(Debug)]
struct BufferRecord {
    kind: BufferKind,
    data: Vec<u8>,
}

#[derive(Debug)]
struct VertexArrayRecord {
    vertex_buffer: BufferId,
    index_buffer: Option<BufferId>,
    stride: u64,
}

#[derive(Debug, Default)]
struct HeadlessState {
    buffers: AHashMap<BufferId, BufferRecord>,
    vertex_arrays: AHashMap<VertexArrayId, VertexArrayRecord>,
    textures: AHashMap<TextureId, TextureInfo>,
    units: AHashMap<u32, TextureId>,
    draws: Vec<DrawCall>,
    fail_allocations: bool,
}

/// Backend that records instead of rendering
#[derive(Debug)]
pub struct HeadlessBackend {
    handles: HandleAllocator,
    state: Mutex<HeadlessState>,
}

impl HeadlessBackend {
    /// Create an empty headless backend
    pub fn new() -> Self {
        Self {
            handles: HandleAllocator::new(),
            state: Mutex::new(HeadlessState::default()),
        }
    }

    /// Make every subsequent allocation fail with `OutOfMemory`
    pub fn set_fail_allocations(&self, fail: bool) {
        self.state.lock().fail_allocations = fail;
    }

    /// Number of live buffers
    pub fn buffer_count(&self) -> usize {
        self.state.lock().buffers.len()
    }

    /// Number of live vertex-array objects
    pub fn vertex_array_count(&self) -> usize {
        self.state.lock().vertex_arrays.len()
    }

    /// Number of live textures
    pub fn texture_count(&self) -> usize {
        self.state.lock().textures.len()
    }

    /// Copy of a buffer's contents
    pub fn buffer_data(&self, buffer: BufferId) -> Option<Vec<u8>> {
        self.state.lock().buffers.get(&buffer).map(|b| b.data.clone())
    }

    /// Buffers bound by a vertex-array object
    pub fn vertex_array_buffers(
        &self,
        vertex_array: VertexArrayId,
    ) -> Option<(BufferId, Option<BufferId>)> {
        self.state
            .lock()
            .vertex_arrays
            .get(&vertex_array)
            .map(|va| (va.vertex_buffer, va.index_buffer))
    }

    /// Snapshot of a texture
    pub fn texture_info(&self, texture: TextureId) -> Option<TextureInfo> {
        self.state.lock().textures.get(&texture).cloned()
    }

    /// Texture currently bound to `unit`
    pub fn bound_texture(&self, unit: u32) -> Option<TextureId> {
        self.state.lock().units.get(&unit).copied()
    }

    /// Number of draws recorded since the last `take_draws`
    pub fn draw_count(&self) -> usize {
        self.state.lock().draws.len()
    }

    /// Drain the recorded draws
    pub fn take_draws(&self) -> Vec<DrawCall> {
        std::mem::take(&mut self.state.lock().draws)
    }

    fn record_draw(&self, vertex_array: VertexArrayId, kind: DrawKind, count: u32) {
        let mut state = self.state.lock();
        let Some(record) = state.vertex_arrays.get(&vertex_array) else {
            log::warn!("HeadlessBackend: draw with unknown vertex array {:?}", vertex_array);
            return;
        };

        let available = match kind {
            DrawKind::Indexed => record
                .index_buffer
                .and_then(|ib| state.buffers.get(&ib))
                .map(|b| b.data.len() / size_of::<u32>()),
            DrawKind::Arrays => state
                .buffers
                .get(&record.vertex_buffer)
                .map(|b| b.data.len() / record.stride.max(1) as usize),
        };
        if available.is_none_or(|available| (count as usize) > available) {
            log::warn!(
                "HeadlessBackend: {:?} draw of {} exceeds bound data ({:?})",
                kind,
                count,
                available
            );
            return;
        }

        let mut textures: Vec<(u32, TextureId)> = state.units.iter().map(|(u, t)| (*u, *t)).collect();
        textures.sort_unstable();
        state.draws.push(DrawCall {
            vertex_array,
            kind,
            count,
            textures,
        });
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuBackend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "Headless Backend"
    }

    fn create_buffer(&self, desc: &BufferDescriptor<'_>, contents: &[u8]) -> GpuResult<BufferId> {
        let mut state = self.state.lock();
        if state.fail_allocations {
            return Err(GpuError::OutOfMemory);
        }
        let id = self.handles.buffer();
        log::trace!(
            "HeadlessBackend: creating {:?} buffer {:?} (size: {})",
            desc.kind,
            desc.label,
            contents.len()
        );
        state.buffers.insert(
            id,
            BufferRecord {
                kind: desc.kind,
                data: contents.to_vec(),
            },
        );
        Ok(id)
    }

    fn write_buffer(&self, buffer: BufferId, contents: &[u8]) -> GpuResult<()> {
        let mut state = self.state.lock();
        let record = state
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| GpuError::ResourceNotFound(format!("buffer {}", buffer.raw())))?;
        log::trace!(
            "HeadlessBackend: writing {:?} buffer {} ({} bytes)",
            record.kind,
            buffer.raw(),
            contents.len()
        );
        record.data.clear();
        record.data.extend_from_slice(contents);
        Ok(())
    }

    fn destroy_buffer(&self, buffer: BufferId) {
        self.state.lock().buffers.remove(&buffer);
    }

    fn create_vertex_array(
        &self,
        vertex_buffer: BufferId,
        index_buffer: Option<BufferId>,
        layout: &VertexLayout,
    ) -> GpuResult<VertexArrayId> {
        let mut state = self.state.lock();
        if state.fail_allocations {
            return Err(GpuError::OutOfMemory);
        }
        for buffer in std::iter::once(vertex_buffer).chain(index_buffer) {
            if !state.buffers.contains_key(&buffer) {
                return Err(GpuError::ResourceNotFound(format!("buffer {}", buffer.raw())));
            }
        }
        let id = self.handles.vertex_array();
        state.vertex_arrays.insert(
            id,
            VertexArrayRecord {
                vertex_buffer,
                index_buffer,
                stride: layout.stride,
            },
        );
        Ok(id)
    }

    fn destroy_vertex_array(&self, vertex_array: VertexArrayId) {
        self.state.lock().vertex_arrays.remove(&vertex_array);
    }

    fn create_texture(&self, desc: &TextureDescriptor<'_>) -> GpuResult<TextureId> {
        let mut state = self.state.lock();
        if state.fail_allocations {
            return Err(GpuError::OutOfMemory);
        }
        if desc.width == 0 || desc.height == 0 || desc.mip_levels == 0 {
            return Err(GpuError::ResourceCreation(format!(
                "texture {:?} has zero extent ({}x{}, {} mips)",
                desc.label, desc.width, desc.height, desc.mip_levels
            )));
        }
        let id = self.handles.texture();
        log::trace!(
            "HeadlessBackend: creating texture {:?} ({}x{}, {:?}, {} mips)",
            desc.label,
            desc.width,
            desc.height,
            desc.format,
            desc.mip_levels
        );
        state.textures.insert(
            id,
            TextureInfo {
                label: desc.label.map(str::to_string),
                width: desc.width,
                height: desc.height,
                format: desc.format,
                mip_levels: desc.mip_levels,
                levels_written: Vec::new(),
                base_level: Vec::new(),
            },
        );
        Ok(id)
    }

    fn write_texture(
        &self,
        texture: TextureId,
        mip_level: u32,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> GpuResult<()> {
        let mut state = self.state.lock();
        let info = state
            .textures
            .get_mut(&texture)
            .ok_or_else(|| GpuError::ResourceNotFound(format!("texture {}", texture.raw())))?;

        if mip_level >= info.mip_levels {
            return Err(GpuError::ResourceCreation(format!(
                "mip level {} out of range for {} levels",
                mip_level, info.mip_levels
            )));
        }
        let expected_width = (info.width >> mip_level).max(1);
        let expected_height = (info.height >> mip_level).max(1);
        if (width, height) != (expected_width, expected_height)
            || pixels.len() != info.format.byte_size(width, height)
        {
            return Err(GpuError::ResourceCreation(format!(
                "mip {} upload of {}x{} ({} bytes) does not match {}x{} {:?}",
                mip_level,
                width,
                height,
                pixels.len(),
                expected_width,
                expected_height,
                info.format
            )));
        }

        if mip_level == 0 {
            info.base_level = pixels.to_vec();
        }
        if !info.levels_written.contains(&mip_level) {
            info.levels_written.push(mip_level);
        }
        Ok(())
    }

    fn destroy_texture(&self, texture: TextureId) {
        let mut state = self.state.lock();
        state.textures.remove(&texture);
        state.units.retain(|_, bound| *bound != texture);
    }

    fn bind_texture(&self, unit: u32, texture: Option<TextureId>) {
        let mut state = self.state.lock();
        match texture {
            Some(texture) => {
                state.units.insert(unit, texture);
            }
            None => {
                state.units.remove(&unit);
            }
        }
    }

    fn draw_indexed(&self, vertex_array: VertexArrayId, index_count: u32) {
        self.record_draw(vertex_array, DrawKind::Indexed, index_count);
    }

    fn draw(&self, vertex_array: VertexArrayId, vertex_count: u32) {
        self.record_draw(vertex_array, DrawKind::Arrays, vertex_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vertex::Vertex;
    use crate::backend::{FilterMode, WrapMode};

    fn texture_desc(width: u32, height: u32, mip_levels: u32) -> TextureDescriptor<'static> {
        TextureDescriptor {
            label: Some("test"),
            width,
            height,
            format: PixelFormat::Rgb8,
            mip_levels,
            filter: FilterMode::Linear,
            wrap: WrapMode::Repeat,
        }
    }

    #[test]
    fn test_buffer_lifecycle() {
        let backend = HeadlessBackend::new();
        let buffer = backend
            .create_buffer(&BufferDescriptor::vertex(None), &[1, 2, 3, 4])
            .unwrap();
        assert_eq!(backend.buffer_count(), 1);

        backend.write_buffer(buffer, &[9; 8]).unwrap();
        assert_eq!(backend.buffer_data(buffer).unwrap(), vec![9; 8]);

        backend.destroy_buffer(buffer);
        assert_eq!(backend.buffer_count(), 0);
        assert!(backend.write_buffer(buffer, &[0]).is_err());
    }

    #[test]
    fn test_failed_allocation() {
        let backend = HeadlessBackend::new();
        backend.set_fail_allocations(true);
        let result = backend.create_buffer(&BufferDescriptor::index(None), &[0; 4]);
        assert!(matches!(result, Err(GpuError::OutOfMemory)));
        assert_eq!(backend.buffer_count(), 0);
    }

    #[test]
    fn test_draw_recording() {
        let backend = HeadlessBackend::new();
        let vertices = [Vertex::default(); 3];
        let vb = backend
            .create_buffer(&BufferDescriptor::vertex(None), bytemuck::cast_slice(&vertices))
            .unwrap();
        let ib = backend
            .create_buffer(&BufferDescriptor::index(None), bytemuck::cast_slice(&[0u32, 1, 2]))
            .unwrap();
        let va = backend.create_vertex_array(vb, Some(ib), &Vertex::LAYOUT).unwrap();

        backend.draw_indexed(va, 3);
        backend.draw(va, 3);
        // Out of range draws are dropped
        backend.draw_indexed(va, 6);

        let draws = backend.take_draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].kind, DrawKind::Indexed);
        assert_eq!(draws[1].kind, DrawKind::Arrays);
        assert_eq!(backend.draw_count(), 0);
    }

    #[test]
    fn test_texture_mip_validation() {
        let backend = HeadlessBackend::new();
        let texture = backend.create_texture(&texture_desc(4, 2, 3)).unwrap();

        backend.write_texture(texture, 0, 4, 2, &[0; 24]).unwrap();
        backend.write_texture(texture, 1, 2, 1, &[0; 6]).unwrap();
        backend.write_texture(texture, 2, 1, 1, &[0; 3]).unwrap();
        assert!(backend.write_texture(texture, 3, 1, 1, &[0; 3]).is_err());
        assert!(backend.write_texture(texture, 0, 4, 2, &[0; 5]).is_err());

        let info = backend.texture_info(texture).unwrap();
        assert_eq!(info.levels_written, vec![0, 1, 2]);
    }

    #[test]
    fn test_destroy_texture_unbinds() {
        let backend = HeadlessBackend::new();
        let texture = backend.create_texture(&texture_desc(1, 1, 1)).unwrap();
        backend.bind_texture(2, Some(texture));
        assert_eq!(backend.bound_texture(2), Some(texture));

        backend.destroy_texture(texture);
        assert_eq!(backend.bound_texture(2), None);
        assert_eq!(backend.texture_count(), 0);
    }
}
