//! Box and sphere bounds carried by every hair mesh batch
//!
//! Macro groups merge on sphere overlap but keep both the box (for voxel page
//! sizing and screen projection) and the sphere (for merging and lights).

use super::aabb::{aabb_center, aabb_half_extents, aabb_union, create_aabb, AABB};
use cgmath::{InnerSpace, MetricSpace, Point3, Vector3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxSphereBounds {
    pub origin: Point3<f32>,
    pub box_extent: Vector3<f32>,
    pub sphere_radius: f32,
}

pub fn bounds_from_aabb(aabb: &AABB) -> BoxSphereBounds {
    let box_extent = aabb_half_extents(aabb);
    BoxSphereBounds {
        origin: aabb_center(aabb),
        box_extent,
        sphere_radius: box_extent.magnitude(),
    }
}

pub fn bounds_from_sphere(origin: Point3<f32>, radius: f32) -> BoxSphereBounds {
    BoxSphereBounds {
        origin,
        box_extent: Vector3::new(radius, radius, radius),
        sphere_radius: radius,
    }
}

pub fn bounds_aabb(bounds: &BoxSphereBounds) -> AABB {
    create_aabb(bounds.origin - bounds.box_extent, bounds.origin + bounds.box_extent)
}

/// Closed sphere overlap test; touching spheres intersect
pub fn spheres_intersect(a: &BoxSphereBounds, b: &BoxSphereBounds) -> bool {
    let radius_sum = a.sphere_radius + b.sphere_radius;
    a.origin.distance2(b.origin) <= radius_sum * radius_sum
}

/// Union of two bounds: box union, sphere tightened to the box
pub fn bounds_union(a: &BoxSphereBounds, b: &BoxSphereBounds) -> BoxSphereBounds {
    let aabb = aabb_union(&bounds_aabb(a), &bounds_aabb(b));
    let origin = aabb_center(&aabb);
    let box_extent = aabb_half_extents(&aabb);

    let sphere_a = origin.distance(a.origin) + a.sphere_radius;
    let sphere_b = origin.distance(b.origin) + b.sphere_radius;

    BoxSphereBounds {
        origin,
        box_extent,
        sphere_radius: box_extent.magnitude().min(sphere_a.max(sphere_b)),
    }
}
