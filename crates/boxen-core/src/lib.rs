//! # Boxen Core
//!
//! Foundational types shared by the Boxen asset pipeline crates.
//!
//! - **Math**: glam re-exports, axis-aligned boxes, and the bounds/sphere
//!   metadata that meshes and models derive from their geometry

pub mod math;

pub use math::{Aabb, Bounds, normal_matrix};
