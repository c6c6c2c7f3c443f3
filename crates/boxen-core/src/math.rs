//! Math utilities
//!
//! Re-exports from glam plus the bounding volumes used for culling and
//! spatial queries on meshes and models.

pub use glam::{Mat3, Mat4, Quat, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// An inverted box that any point expands
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Create an AABB from min and max corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the half-extents of the AABB
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Get the full size of the AABB
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Check if the AABB is empty
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Check if a point is inside the AABB
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Expand the AABB to include a point
    pub fn expand_to_include(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Merge with another AABB
    pub fn merge(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// The eight corners of the box
    pub fn corners(&self) -> [Vec3; 8] {
        [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ]
    }

    /// Transform the AABB by a matrix, re-deriving min/max from its corners
    pub fn transform(&self, matrix: Mat4) -> Aabb {
        let mut result = Aabb::EMPTY;
        for corner in self.corners() {
            result.expand_to_include(matrix.transform_point3(corner));
        }
        result
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Axis-aligned bounds plus a conservative bounding sphere.
///
/// The sphere is centered on the box midpoint, so it is never smaller than
/// the set it encloses but is not a minimal fit. The all-zero value stands
/// for "no geometry"; callers must check emptiness on the owner before
/// treating it as a tiny object at the origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
    /// Midpoint of `min` and `max`
    pub center: Vec3,
    /// Sphere radius around `center`
    pub radius: f32,
}

impl Bounds {
    /// Bounds of an empty set
    pub const ZERO: Self = Self {
        min: Vec3::ZERO,
        max: Vec3::ZERO,
        center: Vec3::ZERO,
        radius: 0.0,
    };

    /// Tight bounds over a set of points.
    ///
    /// The radius is the largest distance from the box center to any point.
    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = Vec3>,
        I::IntoIter: Clone,
    {
        let points = points.into_iter();

        let mut aabb = Aabb::EMPTY;
        for point in points.clone() {
            aabb.expand_to_include(point);
        }
        if aabb.is_empty() {
            return Self::ZERO;
        }

        let center = aabb.center();
        let max_dist_sq = points
            .map(|point| point.distance_squared(center))
            .fold(0.0_f32, f32::max);

        Self {
            min: aabb.min,
            max: aabb.max,
            center,
            radius: max_dist_sq.sqrt(),
        }
    }

    /// Bounds enclosing a set of boxes given by their min/max corners.
    ///
    /// The radius only considers each box's min and max corners, which is
    /// the aggregate rule used for models.
    pub fn from_extents<I>(extents: I) -> Self
    where
        I: IntoIterator<Item = (Vec3, Vec3)>,
        I::IntoIter: Clone,
    {
        let extents = extents.into_iter();

        let mut aabb = Aabb::EMPTY;
        for (min, max) in extents.clone() {
            aabb.expand_to_include(min);
            aabb.expand_to_include(max);
        }
        if aabb.is_empty() {
            return Self::ZERO;
        }

        let center = aabb.center();
        let max_dist_sq = extents
            .flat_map(|(min, max)| [min, max])
            .map(|corner| corner.distance_squared(center))
            .fold(0.0_f32, f32::max);

        Self {
            min: aabb.min,
            max: aabb.max,
            center,
            radius: max_dist_sq.sqrt(),
        }
    }

    /// The box part of the bounds
    pub fn aabb(&self) -> Aabb {
        Aabb::new(self.min, self.max)
    }

    /// Check if a point lies inside the bounding sphere
    pub fn sphere_contains(&self, point: Vec3) -> bool {
        point.distance_squared(self.center) <= self.radius * self.radius
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::ZERO
    }
}

/// Matrix for transforming direction vectors that must stay perpendicular to
/// surfaces (normals, tangents, bitangents) under `matrix`.
///
/// This is the inverse-transpose of the upper 3x3. Singular matrices fall
/// back to the plain linear part. Singularity is judged relative to the
/// column lengths, so uniformly tiny or huge scales still invert.
pub fn normal_matrix(matrix: Mat4) -> Mat3 {
    let linear = Mat3::from_mat4(matrix);
    let scale = linear.x_axis.length() * linear.y_axis.length() * linear.z_axis.length();
    if linear.determinant().abs() <= f32::EPSILON * scale {
        return linear;
    }
    let inverse = linear.inverse();
    if inverse.is_finite() {
        inverse.transpose()
    } else {
        linear
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        a.abs_diff_eq(b, 1e-5)
    }

    #[test]
    fn test_aabb_creation() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert_eq!(aabb.center(), Vec3::splat(0.5));
        assert_eq!(aabb.size(), Vec3::ONE);
        assert!(Aabb::EMPTY.is_empty());
    }

    #[test]
    fn test_aabb_contains_point() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert!(aabb.contains_point(Vec3::splat(0.5)));
        assert!(aabb.contains_point(Vec3::ONE));
        assert!(!aabb.contains_point(Vec3::splat(2.0)));
    }

    #[test]
    fn test_aabb_transform_translation() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let moved = aabb.transform(Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)));
        assert!(approx(moved.min, Vec3::new(1.0, 2.0, 3.0)));
        assert!(approx(moved.max, Vec3::new(2.0, 3.0, 4.0)));
    }

    #[test]
    fn test_bounds_from_points() {
        let points = [
            Vec3::new(-1.0, 0.0, 2.0),
            Vec3::new(3.0, -2.0, 0.0),
            Vec3::new(1.0, 4.0, 1.0),
        ];
        let bounds = Bounds::from_points(points);

        assert_eq!(bounds.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(bounds.max, Vec3::new(3.0, 4.0, 2.0));
        assert_eq!(bounds.center, Vec3::new(1.0, 1.0, 1.0));

        let expected = points
            .iter()
            .map(|p| p.distance(bounds.center))
            .fold(0.0_f32, f32::max);
        assert!((bounds.radius - expected).abs() < 1e-5);
        for point in points {
            assert!(bounds.aabb().contains_point(point));
            assert!(bounds.sphere_contains(point));
        }
    }

    #[test]
    fn test_bounds_from_no_points_is_zero() {
        let bounds = Bounds::from_points(std::iter::empty());
        assert_eq!(bounds, Bounds::ZERO);
    }

    #[test]
    fn test_bounds_single_point() {
        let bounds = Bounds::from_points([Vec3::new(2.0, 2.0, 2.0)]);
        assert_eq!(bounds.min, bounds.max);
        assert_eq!(bounds.center, Vec3::splat(2.0));
        assert_eq!(bounds.radius, 0.0);
    }

    #[test]
    fn test_bounds_from_extents_uses_corners() {
        let bounds = Bounds::from_extents([
            (Vec3::ZERO, Vec3::ONE),
            (Vec3::splat(2.0), Vec3::splat(3.0)),
        ]);
        assert_eq!(bounds.min, Vec3::ZERO);
        assert_eq!(bounds.max, Vec3::splat(3.0));
        assert_eq!(bounds.center, Vec3::splat(1.5));
        assert!((bounds.radius - Vec3::splat(1.5).length()).abs() < 1e-5);
    }

    #[test]
    fn test_bounds_from_no_extents_is_zero() {
        assert_eq!(Bounds::from_extents(std::iter::empty()), Bounds::ZERO);
    }

    #[test]
    fn test_normal_matrix_non_uniform_scale() {
        let matrix = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let normal = normal_matrix(matrix) * Vec3::new(1.0, 1.0, 0.0).normalize();
        // Scaling x by 2 tilts the surface normal toward y.
        let normal = normal.normalize();
        assert!(normal.y > normal.x);
    }

    #[test]
    fn test_normal_matrix_small_non_uniform_scale() {
        let matrix = Mat4::from_scale(Vec3::new(0.002, 0.001, 0.001));
        let normal = (normal_matrix(matrix) * Vec3::new(1.0, 1.0, 0.0)).normalize();
        let expected = Vec3::new(1.0, 2.0, 0.0).normalize();
        assert!(approx(normal, expected), "got {normal}, expected {expected}");
    }

    #[test]
    fn test_normal_matrix_large_scale_inverts() {
        let matrix = Mat4::from_scale(Vec3::new(4000.0, 1000.0, 1000.0));
        let normal = (normal_matrix(matrix) * Vec3::new(1.0, 1.0, 0.0)).normalize();
        assert!(approx(normal, Vec3::new(1.0, 4.0, 0.0).normalize()));
    }

    #[test]
    fn test_normal_matrix_singular_falls_back() {
        let matrix = Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0));
        let n = normal_matrix(matrix);
        assert!(n.is_finite());
    }
}
