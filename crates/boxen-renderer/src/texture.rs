//! Textures
//!
//! GPU image resources tagged with a usage category. Each category carries
//! a fixed row of metadata: the shader uniform prefix it binds to, the flat
//! color used when no image is available, the engine fallback asset, and
//! whether decoded images are flipped vertically.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use image::DynamicImage;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::backend::{FilterMode, PixelFormat, SharedBackend, TextureDescriptor, TextureId, WrapMode};
use crate::{RendererResult, TextureError};

/// Texture usage category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureKind {
    Diffuse = 0,
    Specular = 1,
    Normal = 2,
    Height = 3,
    Ambient = 4,
}

struct KindInfo {
    name: &'static str,
    uniform_prefix: &'static str,
    fallback_color: [u8; 3],
    fallback_asset: &'static str,
    flip_vertically: bool,
}

const KIND_TABLE: [KindInfo; 5] = [
    KindInfo {
        name: "diffuse",
        uniform_prefix: "texture_diffuse",
        fallback_color: [128, 128, 128],
        fallback_asset: "textures/default_diffuse.png",
        flip_vertically: true,
    },
    KindInfo {
        name: "specular",
        uniform_prefix: "texture_specular",
        fallback_color: [64, 64, 64],
        fallback_asset: "textures/default_specular.png",
        flip_vertically: false,
    },
    KindInfo {
        name: "normal",
        uniform_prefix: "texture_normal",
        fallback_color: [128, 128, 255],
        fallback_asset: "textures/default_normal.png",
        flip_vertically: false,
    },
    KindInfo {
        name: "height",
        uniform_prefix: "texture_height",
        fallback_color: [255, 0, 255],
        fallback_asset: "textures/default_height.png",
        flip_vertically: false,
    },
    // Ambient maps share the diffuse slots
    KindInfo {
        name: "ambient",
        uniform_prefix: "texture_diffuse",
        fallback_color: [255, 0, 255],
        fallback_asset: "textures/default_ambient.png",
        flip_vertically: false,
    },
];

impl TextureKind {
    /// Every category
    pub const ALL: [TextureKind; 5] = [
        Self::Diffuse,
        Self::Specular,
        Self::Normal,
        Self::Height,
        Self::Ambient,
    ];

    /// Categories resolved for every imported material, in binding order
    pub const MATERIAL_ORDER: [TextureKind; 4] =
        [Self::Diffuse, Self::Specular, Self::Normal, Self::Height];

    fn info(self) -> &'static KindInfo {
        &KIND_TABLE[self as usize]
    }

    /// Lowercase category name
    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Uniform name prefix; the n-th texture of a category binds to `{prefix}{n}`
    pub fn uniform_prefix(self) -> &'static str {
        self.info().uniform_prefix
    }

    /// Flat color for procedural stand-ins
    pub fn fallback_color(self) -> [u8; 3] {
        self.info().fallback_color
    }

    /// Engine-provided fallback image, relative to the asset root
    pub fn fallback_asset(self) -> &'static str {
        self.info().fallback_asset
    }

    /// Whether decoded images are flipped vertically before upload
    pub fn flips_vertically(self) -> bool {
        self.info().flip_vertically
    }

    /// Category whose uniform slots this category binds to
    pub fn binding_kind(self) -> TextureKind {
        match self {
            Self::Ambient => Self::Diffuse,
            other => other,
        }
    }
}

impl fmt::Display for TextureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a texture's pixels came from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TextureSource {
    /// Not loaded
    None,
    /// Decoded from a file
    File(PathBuf),
    /// Decoded from an in-memory image, keyed by its owner
    Embedded(String),
    /// Raw RGB pixels supplied by the caller
    Procedural,
    /// Allocated without initial data
    Placeholder,
}

/// One GPU image plus its category and dimensions
pub struct Texture {
    gpu: SharedBackend,
    id: Option<TextureId>,
    kind: TextureKind,
    source: TextureSource,
    width: u32,
    height: u32,
    channels: u8,
}

impl Texture {
    /// Create an unloaded texture
    pub fn new(gpu: SharedBackend) -> Self {
        Self {
            gpu,
            id: None,
            kind: TextureKind::Diffuse,
            source: TextureSource::None,
            width: 0,
            height: 0,
            channels: 0,
        }
    }

    /// Load a texture from an image file with a full mip chain
    pub fn from_file(
        gpu: SharedBackend,
        path: impl AsRef<Path>,
        kind: TextureKind,
    ) -> RendererResult<Self> {
        let mut texture = Self::new(gpu);
        texture.load_from_file(path, kind)?;
        Ok(texture)
    }

    /// Create a flat-colored stand-in of `size` x `size` pixels
    pub fn procedural(gpu: SharedBackend, kind: TextureKind, size: u32) -> RendererResult<Self> {
        let pixels = kind.fallback_color().repeat(size as usize * size as usize);
        let mut texture = Self::new(gpu);
        texture.load_from_data(&pixels, size, size, kind)?;
        Ok(texture)
    }

    /// Load from an image file with a full mip chain
    pub fn load_from_file(&mut self, path: impl AsRef<Path>, kind: TextureKind) -> RendererResult<()> {
        self.load_from_file_with(path, kind, true)
    }

    /// Load from an image file, optionally generating mip levels.
    ///
    /// A missing file is reported before the current image is touched.
    pub fn load_from_file_with(
        &mut self,
        path: impl AsRef<Path>,
        kind: TextureKind,
        generate_mipmaps: bool,
    ) -> RendererResult<()> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(TextureError::NotFound(path.to_path_buf()).into());
        }

        self.destroy();
        let source_name = path.display().to_string();
        let image = image::ImageReader::open(path)
            .map_err(|source| TextureError::Io {
                source_name: source_name.clone(),
                source,
            })?
            .with_guessed_format()
            .map_err(|source| TextureError::Io {
                source_name: source_name.clone(),
                source,
            })?
            .decode()
            .map_err(|source| TextureError::Decode {
                source_name: source_name.clone(),
                source,
            })?;

        self.upload_image(
            image,
            &source_name,
            kind,
            TextureSource::File(path.to_path_buf()),
            generate_mipmaps,
        )
    }

    /// Load from encoded image bytes (PNG, JPEG, ...) embedded in a model
    pub fn load_from_memory(
        &mut self,
        bytes: &[u8],
        key: impl Into<String>,
        kind: TextureKind,
        generate_mipmaps: bool,
    ) -> RendererResult<()> {
        let key = key.into();
        self.destroy();
        let image = image::load_from_memory(bytes).map_err(|source| TextureError::Decode {
            source_name: key.clone(),
            source,
        })?;
        self.upload_image(
            image,
            &key,
            kind,
            TextureSource::Embedded(key.clone()),
            generate_mipmaps,
        )
    }

    /// Upload raw RGB pixels with linear filtering and no mip chain
    pub fn load_from_data(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        kind: TextureKind,
    ) -> RendererResult<()> {
        if width == 0 || height == 0 {
            return Err(TextureError::InvalidDimensions { width, height }.into());
        }
        let expected = PixelFormat::Rgb8.byte_size(width, height);
        if pixels.len() != expected {
            return Err(TextureError::PixelDataSize {
                expected,
                actual: pixels.len(),
            }
            .into());
        }

        self.destroy();
        let id = self.gpu.create_texture(&TextureDescriptor {
            label: Some(kind.name()),
            width,
            height,
            format: PixelFormat::Rgb8,
            mip_levels: 1,
            filter: FilterMode::Linear,
            wrap: WrapMode::Repeat,
        })?;
        if let Err(err) = self.gpu.write_texture(id, 0, width, height, pixels) {
            self.gpu.destroy_texture(id);
            return Err(err.into());
        }

        self.set_loaded(id, kind, TextureSource::Procedural, width, height, 3);
        Ok(())
    }

    /// Allocate an empty RGB image with no initial data
    pub fn create(&mut self, width: u32, height: u32, kind: TextureKind) -> RendererResult<()> {
        if width == 0 || height == 0 {
            return Err(TextureError::InvalidDimensions { width, height }.into());
        }
        self.destroy();
        let id = self.gpu.create_texture(&TextureDescriptor {
            label: Some(kind.name()),
            width,
            height,
            format: PixelFormat::Rgb8,
            mip_levels: 1,
            filter: FilterMode::Linear,
            wrap: WrapMode::Repeat,
        })?;
        self.set_loaded(id, kind, TextureSource::Placeholder, width, height, 3);
        Ok(())
    }

    /// Bind to a texture unit
    pub fn bind(&self, unit: u32) {
        if let Some(id) = self.id {
            self.gpu.bind_texture(unit, Some(id));
        }
    }

    /// Clear a texture unit
    pub fn unbind(&self, unit: u32) {
        if self.id.is_some() {
            self.gpu.bind_texture(unit, None);
        }
    }

    /// Release the GPU image
    pub fn destroy(&mut self) {
        if let Some(id) = self.id.take() {
            self.gpu.destroy_texture(id);
        }
        self.source = TextureSource::None;
        self.width = 0;
        self.height = 0;
        self.channels = 0;
    }

    /// GPU handle
    pub fn id(&self) -> Option<TextureId> {
        self.id
    }

    /// Check if the texture holds a GPU image
    pub fn is_valid(&self) -> bool {
        self.id.is_some()
    }

    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    pub fn source(&self) -> &TextureSource {
        &self.source
    }

    /// Source file path, for file-backed textures
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            TextureSource::File(path) => Some(path),
            _ => None,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Channel count of the uploaded data
    pub fn channels(&self) -> u8 {
        self.channels
    }

    fn set_loaded(
        &mut self,
        id: TextureId,
        kind: TextureKind,
        source: TextureSource,
        width: u32,
        height: u32,
        channels: u8,
    ) {
        self.id = Some(id);
        self.kind = kind;
        self.source = source;
        self.width = width;
        self.height = height;
        self.channels = channels;
    }

    fn upload_image(
        &mut self,
        image: DynamicImage,
        label: &str,
        kind: TextureKind,
        source: TextureSource,
        generate_mipmaps: bool,
    ) -> RendererResult<()> {
        let image = if kind.flips_vertically() {
            image.flipv()
        } else {
            image
        };
        let (image, format) = normalize_channels(image);
        let (width, height) = (image.width(), image.height());
        let mip_levels = if generate_mipmaps {
            mip_level_count(width, height)
        } else {
            1
        };

        let id = self.gpu.create_texture(&TextureDescriptor {
            label: Some(label),
            width,
            height,
            format,
            mip_levels,
            filter: FilterMode::Linear,
            wrap: WrapMode::Repeat,
        })?;

        if let Err(err) = upload_mip_chain(&self.gpu, id, image, mip_levels) {
            self.gpu.destroy_texture(id);
            return Err(err.into());
        }

        log::debug!(
            "Loaded {} texture '{}' ({}x{}, {} channels, {} mips)",
            kind,
            label,
            width,
            height,
            format.channels(),
            mip_levels
        );
        self.set_loaded(id, kind, source, width, height, format.channels());
        Ok(())
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .finish_non_exhaustive()
    }
}

/// Non-owning reference from a mesh to a texture owned elsewhere
#[derive(Debug, Clone)]
pub struct TextureRef(Weak<Texture>);

impl TextureRef {
    /// Reference a shared texture
    pub fn new(texture: &Arc<Texture>) -> Self {
        Self(Arc::downgrade(texture))
    }

    /// The texture, if its owner still holds it
    pub fn upgrade(&self) -> Option<Arc<Texture>> {
        self.0.upgrade()
    }

    /// Check if the texture is still alive
    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    /// Check if this references `texture`
    pub fn points_to(&self, texture: &Arc<Texture>) -> bool {
        std::ptr::eq(self.0.as_ptr(), Arc::as_ptr(texture))
    }
}

impl From<&Arc<Texture>> for TextureRef {
    fn from(texture: &Arc<Texture>) -> Self {
        Self::new(texture)
    }
}

/// Number of levels in a full mip chain down to 1x1
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Reduce to one of the uploadable layouts: 1, 3 or 4 8-bit channels
fn normalize_channels(image: DynamicImage) -> (DynamicImage, PixelFormat) {
    match image {
        DynamicImage::ImageLuma8(_) => (image, PixelFormat::R8),
        DynamicImage::ImageRgb8(_) => (image, PixelFormat::Rgb8),
        DynamicImage::ImageRgba8(_) => (image, PixelFormat::Rgba8),
        other => (
            DynamicImage::ImageRgba8(other.to_rgba8()),
            PixelFormat::Rgba8,
        ),
    }
}

fn upload_mip_chain(
    gpu: &SharedBackend,
    id: TextureId,
    base: DynamicImage,
    mip_levels: u32,
) -> crate::GpuResult<()> {
    gpu.write_texture(id, 0, base.width(), base.height(), base.as_bytes())?;

    let mut previous = base;
    for level in 1..mip_levels {
        let width = (previous.width() / 2).max(1);
        let height = (previous.height() / 2).max(1);
        let next = previous.resize_exact(width, height, FilterType::Triangle);
        gpu.write_texture(id, level, width, height, next.as_bytes())?;
        previous = next;
    }
    Ok(())
}
