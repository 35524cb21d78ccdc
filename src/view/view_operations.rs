//! View Operations - Pure DOP Functions
//!
//! All functions are pure: take data, return results, no side effects.

use super::view_data::{PlatformCaps, ScreenRect, ViewInfo, ViewUniform};
use crate::bounds::{aabb_corners, extract_frustum_planes, frustum_planes_to_gpu, AABB};
use crate::constants::gpu_limits::DEFAULT_MAX_TEXTURE_DIMENSION_2D;
use cgmath::{Matrix4, Point3, Vector4};

const AMD_VENDOR_ID: u32 = 0x1002;

/// Create view info from camera matrices
pub fn create_view_info(
    view_key: u64,
    view_rect: ScreenRect,
    view_matrix: Matrix4<f32>,
    projection_matrix: Matrix4<f32>,
    view_origin: Point3<f32>,
    fov_radians: f32,
    frame_index: u32,
) -> ViewInfo {
    let view_projection_matrix = projection_matrix * view_matrix;
    ViewInfo {
        view_key,
        view_rect,
        view_matrix,
        projection_matrix,
        view_projection_matrix,
        frustum: extract_frustum_planes(&view_projection_matrix),
        view_origin,
        fov_radians,
        hzb: None,
        scene_depth: None,
        is_camera_frozen: false,
        is_shadow_view: false,
        frame_index,
    }
}

pub fn screen_rect_size(rect: &ScreenRect) -> [u32; 2] {
    [
        (rect.max[0] - rect.min[0]).max(0) as u32,
        (rect.max[1] - rect.min[1]).max(0) as u32,
    ]
}

pub fn screen_rect_is_empty(rect: &ScreenRect) -> bool {
    let size = screen_rect_size(rect);
    size[0] == 0 || size[1] == 0
}

/// Union ignoring empty rects
pub fn screen_rect_union(a: &ScreenRect, b: &ScreenRect) -> ScreenRect {
    if screen_rect_is_empty(a) {
        return *b;
    }
    if screen_rect_is_empty(b) {
        return *a;
    }
    ScreenRect {
        min: [a.min[0].min(b.min[0]), a.min[1].min(b.min[1])],
        max: [a.max[0].max(b.max[0]), a.max[1].max(b.max[1])],
    }
}

/// Pixel rect covered by a world-space box, clamped to the view rect
///
/// Fully behind the camera gives an empty rect; straddling the camera plane
/// gives the whole view rect.
pub fn project_aabb_to_screen_rect(aabb: &AABB, view: &ViewInfo) -> ScreenRect {
    let rect = view.view_rect;
    let size = screen_rect_size(&rect);
    if size[0] == 0 || size[1] == 0 {
        return ScreenRect::default();
    }

    let mut ndc_min = [f32::MAX, f32::MAX];
    let mut ndc_max = [f32::MIN, f32::MIN];
    let mut behind_count = 0;

    for corner in aabb_corners(aabb) {
        let clip = view.view_projection_matrix * Vector4::new(corner.x, corner.y, corner.z, 1.0);
        if clip.w <= f32::EPSILON {
            behind_count += 1;
            continue;
        }
        let ndc = [clip.x / clip.w, clip.y / clip.w];
        for axis in 0..2 {
            ndc_min[axis] = ndc_min[axis].min(ndc[axis]);
            ndc_max[axis] = ndc_max[axis].max(ndc[axis]);
        }
    }

    if behind_count == 8 {
        return ScreenRect::default();
    }
    if behind_count > 0 {
        return rect;
    }

    // NDC y points up, pixel y points down
    let to_pixel_x = |ndc: f32| rect.min[0] as f32 + (ndc * 0.5 + 0.5) * size[0] as f32;
    let to_pixel_y = |ndc: f32| rect.min[1] as f32 + (0.5 - ndc * 0.5) * size[1] as f32;

    let min_x = (to_pixel_x(ndc_min[0]).floor() as i32).clamp(rect.min[0], rect.max[0]);
    let max_x = (to_pixel_x(ndc_max[0]).ceil() as i32).clamp(rect.min[0], rect.max[0]);
    let min_y = (to_pixel_y(ndc_max[1]).floor() as i32).clamp(rect.min[1], rect.max[1]);
    let max_y = (to_pixel_y(ndc_min[1]).ceil() as i32).clamp(rect.min[1], rect.max[1]);

    let projected = ScreenRect {
        min: [min_x, min_y],
        max: [max_x, max_y],
    };
    if screen_rect_is_empty(&projected) {
        ScreenRect::default()
    } else {
        projected
    }
}

/// Whether the cluster culling pass may test against the HZB
pub fn view_uses_hzb(view: &ViewInfo, hzb_enabled: bool) -> bool {
    hzb_enabled && view.hzb.is_some() && !view.is_camera_frozen
}

/// Build the GPU view block
pub fn create_view_uniform(view: &ViewInfo, use_hzb: bool) -> ViewUniform {
    let size = screen_rect_size(&view.view_rect);
    let half_fov_tan = (view.fov_radians * 0.5).tan();
    ViewUniform {
        view_projection_matrix: view.view_projection_matrix.into(),
        frustum_planes: frustum_planes_to_gpu(&view.frustum),
        view_origin: [view.view_origin.x, view.view_origin.y, view.view_origin.z, 1.0],
        view_rect: [view.view_rect.min[0], view.view_rect.min[1], size[0] as i32, size[1] as i32],
        projection_scale: if half_fov_tan > 0.0 { 1.0 / half_fov_tan } else { 1.0 },
        frame_index: view.frame_index,
        use_hzb: use_hzb as u32,
        _padding: 0,
    }
}

/// Query capabilities once from the adapter the host device was created on
pub fn detect_platform_caps(
    adapter_info: &wgpu::AdapterInfo,
    limits: &wgpu::Limits,
    supports_atomic_u64: bool,
) -> PlatformCaps {
    let is_pc = !cfg!(target_arch = "wasm32")
        && !matches!(adapter_info.device_type, wgpu::DeviceType::Cpu);
    let caps = PlatformCaps {
        supports_atomic_u64,
        is_amd_pc: is_pc && adapter_info.vendor == AMD_VENDOR_ID,
        max_texture_dimension_2d: limits.max_texture_dimension_2d,
        max_texture_dimension_3d: limits.max_texture_dimension_3d,
    };
    log::info!(
        "[view_operations::detect_platform_caps] {} ({:?}): atomic_u64={}, amd_pc={}, max_2d={}",
        adapter_info.name,
        adapter_info.backend,
        caps.supports_atomic_u64,
        caps.is_amd_pc,
        caps.max_texture_dimension_2d
    );
    caps
}

impl Default for PlatformCaps {
    fn default() -> Self {
        Self {
            supports_atomic_u64: false,
            is_amd_pc: false,
            max_texture_dimension_2d: DEFAULT_MAX_TEXTURE_DIMENSION_2D,
            max_texture_dimension_3d: 2048,
        }
    }
}
