//! Bounds math shared by every hair strands stage

pub mod aabb;
pub mod frustum;
pub mod sphere_bounds;

pub use aabb::{
    aabb_center, aabb_contains_aabb, aabb_corners, aabb_empty, aabb_from_center_half_extents,
    aabb_half_extents, aabb_intersects, aabb_is_valid, aabb_scaled, aabb_size, aabb_union,
    create_aabb, AABB,
};
pub use frustum::{aabb_in_frustum, extract_frustum_planes, frustum_planes_to_gpu, FrustumPlanes};
pub use sphere_bounds::{
    bounds_aabb, bounds_from_aabb, bounds_from_sphere, bounds_union, spheres_intersect,
    BoxSphereBounds,
};
