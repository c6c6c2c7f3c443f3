//! Texture Cache
//!
//! Per-model deduplication table keyed by resolved path. The cache owns the
//! textures; meshes only hold weak references into it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use boxen_renderer::{Texture, TextureKind};
use indexmap::IndexMap;

/// Resolved path to loaded texture, in load order
#[derive(Debug, Default)]
pub struct TextureCache {
    entries: IndexMap<PathBuf, Arc<Texture>>,
}

impl TextureCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Key used for the procedural stand-in of `kind`
    pub fn procedural_key(kind: TextureKind) -> PathBuf {
        PathBuf::from(format!("procedural/{}", kind.name()))
    }

    /// Look up a texture by its resolved path
    pub fn get(&self, key: impl AsRef<Path>) -> Option<Arc<Texture>> {
        self.entries.get(key.as_ref()).cloned()
    }

    /// Check if a key is cached
    pub fn contains(&self, key: impl AsRef<Path>) -> bool {
        self.entries.contains_key(key.as_ref())
    }

    /// Store a texture under `key` and return the shared handle.
    ///
    /// An existing entry for the same key is kept and returned instead.
    pub fn insert(&mut self, key: impl Into<PathBuf>, texture: Texture) -> Arc<Texture> {
        self.entries
            .entry(key.into())
            .or_insert_with(|| Arc::new(texture))
            .clone()
    }

    /// Number of cached textures
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every cached texture
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Cached entries in load order
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &Arc<Texture>)> {
        self.entries.iter().map(|(key, texture)| (key.as_path(), texture))
    }
}
