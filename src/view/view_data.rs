//! View data structures - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in view_operations.rs

use crate::bounds::FrustumPlanes;
use crate::graph::TextureHandle;
use cgmath::{Matrix4, Point3};

/// Integer pixel rectangle, `max` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenRect {
    pub min: [i32; 2],
    pub max: [i32; 2],
}

/// Everything the hair stages need to know about one view
#[derive(Debug, Clone)]
pub struct ViewInfo {
    /// Stable key of the view across frames (adaptive voxel state, history)
    pub view_key: u64,

    /// Pixel rectangle rendered by this view
    pub view_rect: ScreenRect,

    pub view_matrix: Matrix4<f32>,
    pub projection_matrix: Matrix4<f32>,
    pub view_projection_matrix: Matrix4<f32>,
    pub frustum: FrustumPlanes,

    /// Camera position in world space
    pub view_origin: Point3<f32>,

    /// Vertical field of view (radians)
    pub fov_radians: f32,

    /// Hierarchical Z buffer from the previous frame, when the host built one
    pub hzb: Option<TextureHandle>,

    /// Scene depth of the opaque pass, used for voxel opaque injection
    pub scene_depth: Option<TextureHandle>,

    /// Frozen cameras keep culling results stable for debugging
    pub is_camera_frozen: bool,

    /// Shadow-only views skip visibility and material stages
    pub is_shadow_view: bool,

    pub frame_index: u32,
}

/// Capabilities queried once from the device at renderer construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformCaps {
    pub supports_atomic_u64: bool,
    /// Empty-page patching is skipped on this platform
    pub is_amd_pc: bool,
    pub max_texture_dimension_2d: u32,
    pub max_texture_dimension_3d: u32,
}

/// View uniform buffer data for GPU
/// Must match shader layout exactly
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ViewUniform {
    /// View-projection matrix (4x4, column-major)
    pub view_projection_matrix: [[f32; 4]; 4],

    /// Frustum planes: left, right, top, bottom, near, far
    pub frustum_planes: [[f32; 4]; 6],

    /// Camera position (vec3 + padding)
    pub view_origin: [f32; 4],

    /// View rect min (xy) and size (zw) in pixels
    pub view_rect: [i32; 4],

    /// 1 / tan(fov / 2), used for screen-size LOD selection
    pub projection_scale: f32,

    pub frame_index: u32,

    /// 1 when HZB occlusion is enabled for this view
    pub use_hzb: u32,

    pub _padding: u32,
}

static_assertions::const_assert_eq!(std::mem::size_of::<ViewUniform>() % 16, 0);
