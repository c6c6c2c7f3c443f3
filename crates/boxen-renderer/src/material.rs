//! Material Scalars
//!
//! Phong-style colors used when a mesh is drawn without any bound texture.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::shader::ShaderContext;

/// Untextured surface parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Source material name
    pub name: String,
    /// Ambient color
    pub ambient: Vec3,
    /// Diffuse color
    pub diffuse: Vec3,
    /// Specular color
    pub specular: Vec3,
    /// Specular exponent
    pub shininess: f32,
}

impl Material {
    pub const AMBIENT_UNIFORM: &'static str = "material.ambient";
    pub const DIFFUSE_UNIFORM: &'static str = "material.diffuse";
    pub const SPECULAR_UNIFORM: &'static str = "material.specular";
    pub const SHININESS_UNIFORM: &'static str = "material.shininess";

    /// Create a material from its colors
    pub fn new(ambient: Vec3, diffuse: Vec3, specular: Vec3, shininess: f32) -> Self {
        Self {
            name: String::new(),
            ambient,
            diffuse,
            specular,
            shininess,
        }
    }

    /// Set the name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Write every scalar the shader declares
    pub fn apply(&self, shader: &dyn ShaderContext) {
        let colors = [
            (Self::AMBIENT_UNIFORM, self.ambient),
            (Self::DIFFUSE_UNIFORM, self.diffuse),
            (Self::SPECULAR_UNIFORM, self.specular),
        ];
        for (uniform, color) in colors {
            if shader.has_uniform(uniform) {
                shader.set_vec3(uniform, color);
            }
        }
        if shader.has_uniform(Self::SHININESS_UNIFORM) {
            shader.set_float(Self::SHININESS_UNIFORM, self.shininess);
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::new(Vec3::splat(0.1), Vec3::splat(0.8), Vec3::splat(0.5), 32.0)
    }
}
