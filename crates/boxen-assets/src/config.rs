//! Asset Configuration
//!
//! Settings for model loading, loadable from JSON.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::AssetResult;
use crate::import::ImportFlags;

/// Model loading settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Root directory for the per-category fallback textures
    pub fallback_dir: PathBuf,
    /// Post-processing applied when no flags are given explicitly
    pub import_flags: ImportFlags,
    /// Edge length of procedural stand-in textures
    pub procedural_size: u32,
    /// Upload a full mip chain for decoded images
    pub generate_mipmaps: bool,
}

impl AssetConfig {
    /// Load settings from a JSON file; missing fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> AssetResult<Self> {
        let fs = boxen_platform::FileSystem::new();
        let text = fs.read_string(path)?;
        Self::from_json(&text)
    }

    /// Parse settings from a JSON string
    pub fn from_json(text: &str) -> AssetResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            fallback_dir: PathBuf::from("assets"),
            import_flags: ImportFlags::default(),
            procedural_size: 4,
            generate_mipmaps: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AssetConfig::default();
        assert_eq!(config.fallback_dir, PathBuf::from("assets"));
        assert_eq!(config.procedural_size, 4);
        assert!(config.import_flags.contains(ImportFlags::TRIANGULATE));
        assert!(!config.import_flags.contains(ImportFlags::FLIP_UVS));
    }

    #[test]
    fn test_partial_json() {
        let config = AssetConfig::from_json(r#"{ "procedural_size": 8 }"#).unwrap();
        assert_eq!(config.procedural_size, 8);
        assert!(config.generate_mipmaps);
        assert_eq!(config.import_flags, ImportFlags::default());
    }

    #[test]
    fn test_flags_roundtrip_through_json() {
        let config = AssetConfig {
            import_flags: ImportFlags::TRIANGULATE | ImportFlags::FLIP_UVS,
            ..AssetConfig::default()
        };
        let text = serde_json::to_string(&config).unwrap();
        let parsed = AssetConfig::from_json(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_invalid_json() {
        assert!(AssetConfig::from_json("{ not json").is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = AssetConfig::from_json_file("no/such/config.json").unwrap_err();
        assert!(matches!(err, crate::AssetError::Platform(_)));
    }
}
