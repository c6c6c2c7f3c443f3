//! wgpu backend
//!
//! Maps the backend boundary onto a caller-provided wgpu device and queue.
//! Uploads go through the queue immediately. Binds and draws are queued as
//! `DrawCommand`s and encoded into a render pass by `encode_draws`, since
//! wgpu has no implicit current context to draw into.

use std::collections::BTreeMap;

use ahash::AHashMap;
use parking_lot::Mutex;
use wgpu::util::DeviceExt;

use super::{
    BufferDescriptor, BufferId, BufferKind, FilterMode, GpuBackend, HandleAllocator, PixelFormat,
    TextureDescriptor, TextureId, VertexArrayId, WrapMode,
};
use crate::vertex::{Vertex, VertexFormat, VertexLayout};
use crate::{GpuError, GpuResult};

const fn wgpu_format(format: VertexFormat) -> wgpu::VertexFormat {
    match format {
        VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
        VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
    }
}

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 5] = {
    let mut out = [wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32,
        offset: 0,
        shader_location: 0,
    }; 5];
    let mut i = 0;
    while i < out.len() {
        let attribute = Vertex::ATTRIBUTES[i];
        out[i] = wgpu::VertexAttribute {
            format: wgpu_format(attribute.format),
            offset: attribute.offset,
            shader_location: attribute.location,
        };
        i += 1;
    }
    out
};

/// A queued draw waiting for a render pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawCommand {
    pub vertex_array: VertexArrayId,
    /// `Some(count)` for indexed draws
    pub index_count: Option<u32>,
    pub vertex_count: u32,
    /// Texture units bound when the draw was issued
    pub textures: Vec<(u32, TextureId)>,
}

struct GpuBuffer {
    buffer: wgpu::Buffer,
    kind: BufferKind,
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    format: PixelFormat,
}

#[derive(Default)]
struct WgpuState {
    buffers: AHashMap<BufferId, GpuBuffer>,
    vertex_arrays: AHashMap<VertexArrayId, (BufferId, Option<BufferId>)>,
    textures: AHashMap<TextureId, GpuTexture>,
    units: BTreeMap<u32, TextureId>,
    pending: Vec<DrawCommand>,
}

/// Backend driving a wgpu device
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    handles: HandleAllocator,
    state: Mutex<WgpuState>,
}

impl WgpuBackend {
    /// Wrap an existing device and queue
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            handles: HandleAllocator::new(),
            state: Mutex::new(WgpuState::default()),
        }
    }

    /// Underlying device
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Underlying queue
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Vertex buffer layout matching `Vertex`, for pipeline creation
    pub fn vertex_buffer_layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: Vertex::LAYOUT.stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &VERTEX_ATTRIBUTES,
        }
    }

    /// Number of draws waiting for `encode_draws`
    pub fn pending_draws(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Encode and drain queued draws into `pass`.
    ///
    /// `bind_textures` receives the texture units bound for each draw and is
    /// responsible for setting the matching bind group.
    pub fn encode_draws<F>(&self, pass: &mut wgpu::RenderPass<'_>, mut bind_textures: F)
    where
        F: FnMut(&mut wgpu::RenderPass<'_>, &[(u32, &wgpu::TextureView, &wgpu::Sampler)]),
    {
        let mut state = self.state.lock();
        let pending = std::mem::take(&mut state.pending);

        for command in &pending {
            let Some(&(vertex_buffer, index_buffer)) = state.vertex_arrays.get(&command.vertex_array)
            else {
                log::warn!("WgpuBackend: dropping draw for released vertex array");
                continue;
            };
            let Some(vertex_buffer) = state.buffers.get(&vertex_buffer) else {
                continue;
            };

            let bound: Vec<_> = command
                .textures
                .iter()
                .filter_map(|(unit, id)| {
                    state
                        .textures
                        .get(id)
                        .map(|t| (*unit, &t.view, &t.sampler))
                })
                .collect();
            bind_textures(pass, &bound);

            pass.set_vertex_buffer(0, vertex_buffer.buffer.slice(..));
            match (command.index_count, index_buffer.and_then(|ib| state.buffers.get(&ib))) {
                (Some(count), Some(index_buffer)) => {
                    pass.set_index_buffer(index_buffer.buffer.slice(..), wgpu::IndexFormat::Uint32);
                    pass.draw_indexed(0..count, 0, 0..1);
                }
                (None, _) => pass.draw(0..command.vertex_count, 0..1),
                (Some(_), None) => {
                    log::warn!("WgpuBackend: indexed draw without an index buffer");
                }
            }
        }
    }

    fn queue_draw(&self, vertex_array: VertexArrayId, index_count: Option<u32>, vertex_count: u32) {
        let mut state = self.state.lock();
        let textures = state.units.iter().map(|(u, t)| (*u, *t)).collect();
        state.pending.push(DrawCommand {
            vertex_array,
            index_count,
            vertex_count,
            textures,
        });
    }

    fn buffer_usage(kind: BufferKind) -> wgpu::BufferUsages {
        let role = match kind {
            BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
            BufferKind::Index => wgpu::BufferUsages::INDEX,
        };
        role | wgpu::BufferUsages::COPY_DST
    }
}

fn texture_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::R8 => wgpu::TextureFormat::R8Unorm,
        // wgpu has no 3-channel 8-bit format; RGB data is expanded on upload
        PixelFormat::Rgb8 | PixelFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
    }
}

fn filter_mode(filter: FilterMode) -> wgpu::FilterMode {
    match filter {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

fn address_mode(wrap: WrapMode) -> wgpu::AddressMode {
    match wrap {
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
        WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
    }
}

fn expand_rgb(pixels: &[u8]) -> Vec<u8> {
    pixels
        .chunks_exact(3)
        .flat_map(|rgb| [rgb[0], rgb[1], rgb[2], u8::MAX])
        .collect()
}

impl GpuBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu Backend"
    }

    fn create_buffer(&self, desc: &BufferDescriptor<'_>, contents: &[u8]) -> GpuResult<BufferId> {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: desc.label,
                contents,
                usage: Self::buffer_usage(desc.kind),
            });
        let id = self.handles.buffer();
        log::trace!(
            "WgpuBackend: creating {:?} buffer {:?} (size: {})",
            desc.kind,
            desc.label,
            contents.len()
        );
        self.state.lock().buffers.insert(
            id,
            GpuBuffer {
                buffer,
                kind: desc.kind,
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

        if contents.len() as u64 > record.buffer.size() {
            record.buffer = self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: None,
                    contents,
                    usage: Self::buffer_usage(record.kind),
                });
        } else if !contents.is_empty() {
            self.queue.write_buffer(&record.buffer, 0, contents);
        }
        Ok(())
    }

    fn destroy_buffer(&self, buffer: BufferId) {
        if let Some(record) = self.state.lock().buffers.remove(&buffer) {
            record.buffer.destroy();
        }
    }

    fn create_vertex_array(
        &self,
        vertex_buffer: BufferId,
        index_buffer: Option<BufferId>,
        layout: &VertexLayout,
    ) -> GpuResult<VertexArrayId> {
        if *layout != Vertex::LAYOUT {
            return Err(GpuError::ResourceCreation(
                "only the Vertex layout is supported".to_string(),
            ));
        }
        let mut state = self.state.lock();
        for buffer in std::iter::once(vertex_buffer).chain(index_buffer) {
            if !state.buffers.contains_key(&buffer) {
                return Err(GpuError::ResourceNotFound(format!("buffer {}", buffer.raw())));
            }
        }
        let id = self.handles.vertex_array();
        state.vertex_arrays.insert(id, (vertex_buffer, index_buffer));
        Ok(id)
    }

    fn destroy_vertex_array(&self, vertex_array: VertexArrayId) {
        self.state.lock().vertex_arrays.remove(&vertex_array);
    }

    fn create_texture(&self, desc: &TextureDescriptor<'_>) -> GpuResult<TextureId> {
        if desc.width == 0 || desc.height == 0 || desc.mip_levels == 0 {
            return Err(GpuError::ResourceCreation(format!(
                "texture {:?} has zero extent",
                desc.label
            )));
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label,
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: desc.mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(desc.format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let filter = filter_mode(desc.filter);
        let address = address_mode(desc.wrap);
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: desc.label,
            address_mode_u: address,
            address_mode_v: address,
            address_mode_w: address,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: if desc.mip_levels > 1 {
                wgpu::FilterMode::Linear
            } else {
                wgpu::FilterMode::Nearest
            },
            ..Default::default()
        });

        let id = self.handles.texture();
        log::trace!(
            "WgpuBackend: creating texture {:?} ({}x{}, {} mips)",
            desc.label,
            desc.width,
            desc.height,
            desc.mip_levels
        );
        self.state.lock().textures.insert(
            id,
            GpuTexture {
                texture,
                view,
                sampler,
                format: desc.format,
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
        let state = self.state.lock();
        let record = state
            .textures
            .get(&texture)
            .ok_or_else(|| GpuError::ResourceNotFound(format!("texture {}", texture.raw())))?;

        if pixels.len() != record.format.byte_size(width, height) {
            return Err(GpuError::ResourceCreation(format!(
                "texture upload of {} bytes does not match {}x{} {:?}",
                pixels.len(),
                width,
                height,
                record.format
            )));
        }

        let expanded;
        let (data, bytes_per_texel) = match record.format {
            PixelFormat::Rgb8 => {
                expanded = expand_rgb(pixels);
                (expanded.as_slice(), 4)
            }
            format => (pixels, u32::from(format.channels())),
        };

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &record.texture,
                mip_level,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * bytes_per_texel),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn destroy_texture(&self, texture: TextureId) {
        let mut state = self.state.lock();
        if let Some(record) = state.textures.remove(&texture) {
            record.texture.destroy();
        }
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
        self.queue_draw(vertex_array, Some(index_count), 0);
    }

    fn draw(&self, vertex_array: VertexArrayId, vertex_count: u32) {
        self.queue_draw(vertex_array, None, vertex_count);
    }
}
