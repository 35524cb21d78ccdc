//! Data-Oriented Axis-Aligned Bounding Box
//!
//! Pure functions over hair bounds - no methods, just data transformations.

use cgmath::{Point3, Vector3};

/// Axis-Aligned Bounding Box - pure data structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

/// Create new AABB from min/max points
pub fn create_aabb(min: Point3<f32>, max: Point3<f32>) -> AABB {
    AABB { min, max }
}

/// Create AABB from center point and half extents
pub fn aabb_from_center_half_extents(center: Point3<f32>, half_extents: Vector3<f32>) -> AABB {
    AABB {
        min: center - half_extents,
        max: center + half_extents,
    }
}

/// Empty AABB that any union will replace
pub fn aabb_empty() -> AABB {
    AABB {
        min: Point3::new(f32::MAX, f32::MAX, f32::MAX),
        max: Point3::new(f32::MIN, f32::MIN, f32::MIN),
    }
}

/// True when min <= max on every axis
pub fn aabb_is_valid(aabb: &AABB) -> bool {
    aabb.min.x <= aabb.max.x && aabb.min.y <= aabb.max.y && aabb.min.z <= aabb.max.z
}

/// Get center point of AABB
pub fn aabb_center(aabb: &AABB) -> Point3<f32> {
    Point3::new(
        (aabb.min.x + aabb.max.x) * 0.5,
        (aabb.min.y + aabb.max.y) * 0.5,
        (aabb.min.z + aabb.max.z) * 0.5,
    )
}

/// Get half extents of AABB
pub fn aabb_half_extents(aabb: &AABB) -> Vector3<f32> {
    Vector3::new(
        (aabb.max.x - aabb.min.x) * 0.5,
        (aabb.max.y - aabb.min.y) * 0.5,
        (aabb.max.z - aabb.min.z) * 0.5,
    )
}

/// Full size along each axis
pub fn aabb_size(aabb: &AABB) -> Vector3<f32> {
    aabb.max - aabb.min
}

/// Test if two AABBs intersect
pub fn aabb_intersects(aabb1: &AABB, aabb2: &AABB) -> bool {
    aabb1.min.x <= aabb2.max.x && aabb1.max.x >= aabb2.min.x &&
    aabb1.min.y <= aabb2.max.y && aabb1.max.y >= aabb2.min.y &&
    aabb1.min.z <= aabb2.max.z && aabb1.max.z >= aabb2.min.z
}

/// Test if AABB contains a point
pub fn aabb_contains_point(aabb: &AABB, point: Point3<f32>) -> bool {
    point.x >= aabb.min.x && point.x <= aabb.max.x &&
    point.y >= aabb.min.y && point.y <= aabb.max.y &&
    point.z >= aabb.min.z && point.z <= aabb.max.z
}

/// Test if `outer` fully contains `inner`
pub fn aabb_contains_aabb(outer: &AABB, inner: &AABB) -> bool {
    aabb_contains_point(outer, inner.min) && aabb_contains_point(outer, inner.max)
}

/// Smallest AABB enclosing both inputs
pub fn aabb_union(a: &AABB, b: &AABB) -> AABB {
    AABB {
        min: Point3::new(a.min.x.min(b.min.x), a.min.y.min(b.min.y), a.min.z.min(b.min.z)),
        max: Point3::new(a.max.x.max(b.max.x), a.max.y.max(b.max.y), a.max.z.max(b.max.z)),
    }
}

/// Scale an AABB about its center
pub fn aabb_scaled(aabb: &AABB, scale: f32) -> AABB {
    aabb_from_center_half_extents(aabb_center(aabb), aabb_half_extents(aabb) * scale)
}

/// The eight corners, used for screen projection
pub fn aabb_corners(aabb: &AABB) -> [Point3<f32>; 8] {
    let (lo, hi) = (aabb.min, aabb.max);
    [
        Point3::new(lo.x, lo.y, lo.z),
        Point3::new(hi.x, lo.y, lo.z),
        Point3::new(lo.x, hi.y, lo.z),
        Point3::new(hi.x, hi.y, lo.z),
        Point3::new(lo.x, lo.y, hi.z),
        Point3::new(hi.x, lo.y, hi.z),
        Point3::new(lo.x, hi.y, hi.z),
        Point3::new(hi.x, hi.y, hi.z),
    ]
}
