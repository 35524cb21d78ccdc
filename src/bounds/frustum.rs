//! View frustum planes for CPU-side culling of hair clusters

use super::aabb::{aabb_center, aabb_half_extents, AABB};
use cgmath::{Matrix4, Vector4};

/// Six planes: left, right, top, bottom, near, far. Inside is `dot >= 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrustumPlanes {
    pub planes: [Vector4<f32>; 6],
}

/// Extract frustum planes from a view-projection matrix (Gribb-Hartmann)
///
/// The near plane uses the -1..1 depth convention of `cgmath::perspective`,
/// which stays conservative for 0..1 projections.
pub fn extract_frustum_planes(vp: &Matrix4<f32>) -> FrustumPlanes {
    let m = vp;

    FrustumPlanes {
        planes: [
            // Left plane
            normalize_plane(Vector4::new(m.x.w + m.x.x, m.y.w + m.y.x, m.z.w + m.z.x, m.w.w + m.w.x)),
            // Right plane
            normalize_plane(Vector4::new(m.x.w - m.x.x, m.y.w - m.y.x, m.z.w - m.z.x, m.w.w - m.w.x)),
            // Top plane
            normalize_plane(Vector4::new(m.x.w - m.x.y, m.y.w - m.y.y, m.z.w - m.z.y, m.w.w - m.w.y)),
            // Bottom plane
            normalize_plane(Vector4::new(m.x.w + m.x.y, m.y.w + m.y.y, m.z.w + m.z.y, m.w.w + m.w.y)),
            // Near plane
            normalize_plane(Vector4::new(m.x.w + m.x.z, m.y.w + m.y.z, m.z.w + m.z.z, m.w.w + m.w.z)),
            // Far plane
            normalize_plane(Vector4::new(m.x.w - m.x.z, m.y.w - m.y.z, m.z.w - m.z.z, m.w.w - m.w.z)),
        ],
    }
}

fn normalize_plane(plane: Vector4<f32>) -> Vector4<f32> {
    let length = (plane.x * plane.x + plane.y * plane.y + plane.z * plane.z).sqrt();
    if length > 0.0 {
        plane / length
    } else {
        plane
    }
}

/// Conservative box test: false only when the box is fully outside one plane
pub fn aabb_in_frustum(frustum: &FrustumPlanes, aabb: &AABB) -> bool {
    let center = aabb_center(aabb);
    let extent = aabb_half_extents(aabb);

    frustum.planes.iter().all(|plane| {
        let distance = plane.x * center.x + plane.y * center.y + plane.z * center.z + plane.w;
        let radius =
            extent.x * plane.x.abs() + extent.y * plane.y.abs() + extent.z * plane.z.abs();
        distance + radius >= 0.0
    })
}

/// Planes as plain arrays for GPU upload
pub fn frustum_planes_to_gpu(frustum: &FrustumPlanes) -> [[f32; 4]; 6] {
    let mut out = [[0.0; 4]; 6];
    for (dst, plane) in out.iter_mut().zip(frustum.planes.iter()) {
        *dst = (*plane).into();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::aabb::create_aabb;
    use cgmath::{perspective, Deg, Point3, Vector3};

    fn test_frustum() -> FrustumPlanes {
        let view = Matrix4::look_at_rh(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, -1.0),
            Vector3::unit_y(),
        );
        let proj = perspective(Deg(90.0), 1.0, 0.1, 100.0);
        extract_frustum_planes(&(proj * view))
    }

    #[test]
    fn test_box_in_front_is_visible() {
        let frustum = test_frustum();
        let aabb = create_aabb(Point3::new(-1.0, -1.0, -11.0), Point3::new(1.0, 1.0, -9.0));
        assert!(aabb_in_frustum(&frustum, &aabb));
    }

    #[test]
    fn test_box_behind_is_culled() {
        let frustum = test_frustum();
        let aabb = create_aabb(Point3::new(-1.0, -1.0, 9.0), Point3::new(1.0, 1.0, 11.0));
        assert!(!aabb_in_frustum(&frustum, &aabb));
    }

    #[test]
    fn test_box_beyond_far_is_culled() {
        let frustum = test_frustum();
        let aabb = create_aabb(Point3::new(-1.0, -1.0, -300.0), Point3::new(1.0, 1.0, -200.0));
        assert!(!aabb_in_frustum(&frustum, &aabb));
    }
}
