//! Shader Uniform Boundary
//!
//! Meshes never own shaders. They talk to whatever program is active through
//! `ShaderContext`, which must answer whether a uniform exists before it is
//! set. Setting an undeclared uniform is harmless.

use glam::Vec3;
use indexmap::IndexMap;
use parking_lot::Mutex;

/// Uniform access on the active shader program
pub trait ShaderContext {
    /// Check whether the program declares `name`
    fn has_uniform(&self, name: &str) -> bool;

    /// Set an integer (or sampler unit) uniform
    fn set_int(&self, name: &str, value: i32);

    /// Set a float uniform
    fn set_float(&self, name: &str, value: f32);

    /// Set a vec3 uniform
    fn set_vec3(&self, name: &str, value: Vec3);
}

/// A value stored in a `UniformTable`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec3(Vec3),
}

/// CPU-side uniform store for a program with a known set of declarations.
///
/// Backs tests and headless tools, and lets a wgpu renderer collect values
/// before packing them into its own uniform buffer.
#[derive(Debug, Default)]
pub struct UniformTable {
    uniforms: Mutex<IndexMap<String, Option<UniformValue>>>,
}

impl UniformTable {
    /// Create a table with no declared uniforms
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table declaring `names`
    pub fn with_uniforms<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let table = Self::new();
        for name in names {
            table.declare(name);
        }
        table
    }

    /// Declare a uniform
    pub fn declare(&self, name: impl Into<String>) {
        self.uniforms.lock().entry(name.into()).or_insert(None);
    }

    /// Current value of a uniform
    pub fn get(&self, name: &str) -> Option<UniformValue> {
        self.uniforms.lock().get(name).copied().flatten()
    }

    /// Every uniform that has been set, in declaration order
    pub fn values(&self) -> Vec<(String, UniformValue)> {
        self.uniforms
            .lock()
            .iter()
            .filter_map(|(name, value)| value.map(|v| (name.clone(), v)))
            .collect()
    }

    /// Forget all set values, keeping declarations
    pub fn reset(&self) {
        for value in self.uniforms.lock().values_mut() {
            *value = None;
        }
    }

    fn set(&self, name: &str, value: UniformValue) {
        match self.uniforms.lock().get_mut(name) {
            Some(slot) => *slot = Some(value),
            None => log::trace!("Ignoring undeclared uniform '{}'", name),
        }
    }
}

impl ShaderContext for UniformTable {
    fn has_uniform(&self, name: &str) -> bool {
        self.uniforms.lock().contains_key(name)
    }

    fn set_int(&self, name: &str, value: i32) {
        self.set(name, UniformValue::Int(value));
    }

    fn set_float(&self, name: &str, value: f32) {
        self.set(name, UniformValue::Float(value));
    }

    fn set_vec3(&self, name: &str, value: Vec3) {
        self.set(name, UniformValue::Vec3(value));
    }
}
