//! Deep Shadow Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in deep_shadow_operations.rs

use crate::bounds::BoxSphereBounds;
use crate::constants::deep_shadow::MAX_ATLAS_SLOT_COUNT;
use crate::graph::{BufferHandle, TextureHandle};
use crate::voxel::VoxelCommonParameters;
use bytemuck::{Pod, Zeroable};
use cgmath::{Matrix4, Point3, Vector3};

/// Shape of a light as far as hair shadowing cares
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    /// `direction` is the direction light travels
    Directional { direction: Vector3<f32> },
    Point { position: Point3<f32>, range: f32 },
    Spot {
        position: Point3<f32>,
        direction: Vector3<f32>,
        range: f32,
        outer_cone_angle: f32,
    },
    Rect {
        position: Point3<f32>,
        direction: Vector3<f32>,
        range: f32,
    },
}

/// A visible light of the view
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightData {
    pub light_id: u32,
    pub kind: LightKind,
}

/// One (macro group, light) pair that owns an atlas slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeepShadowData {
    pub macro_group_id: u32,
    pub light_id: u32,
    pub atlas_slot_index: u32,
    /// x, y, width, height in atlas texels
    pub atlas_rect: [u32; 4],
    pub world_to_light_transform: Matrix4<f32>,
    pub layer_distribution: f32,
    pub bounds: BoxSphereBounds,
    pub is_directional: bool,
    pub light_direction: Vector3<f32>,
    pub light_position: Point3<f32>,
}

/// Slots handed out for one view
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeepShadowAllocation {
    pub datas: Vec<DeepShadowData>,
    /// Affecting pairs left without a slot
    pub dropped_pair_count: u32,
}

/// Placement of the slots inside the atlas
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtlasLayout {
    pub slot_resolution: u32,
    pub slot_count: [u32; 2],
    pub atlas_resolution: [u32; 2],
    pub rects: Vec<[u32; 4]>,
}

/// Deep opacity maps of one view
///
/// `Default` means no hair casts a deep shadow this frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeepShadowResources {
    pub datas: Vec<DeepShadowData>,
    pub atlas_resolution: [u32; 2],
    pub slot_resolution: u32,
    pub dropped_pair_count: u32,
    /// Closest hair depth per texel
    pub front_depth_atlas: Option<TextureHandle>,
    /// Opacity accumulated in four depth layers behind the front depth
    pub layers_atlas: Option<TextureHandle>,
    /// One world-to-clip matrix per slot
    pub world_to_light_buffer: Option<BufferHandle>,
}

/// How hair transmittance is evaluated for one light
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmittancePath {
    /// First slot of the light in the atlas
    DeepShadow { slot: u32 },
    Voxel,
    None,
}

/// Per-node transmittance written for one light
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmittanceMask {
    pub light_id: u32,
    pub path: TransmittancePath,
    /// One packed transmittance value per compacted node
    pub mask: BufferHandle,
}

/// Per-slot record uploaded with the allocation pass
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct DeepShadowSlotGpu {
    pub world_to_clip: [[f32; 4]; 4],
    pub light_direction: [f32; 4],
    /// w is 1 for directional lights
    pub light_position: [f32; 4],
    pub atlas_rect: [u32; 4],
    pub macro_group_id: u32,
    pub slot_index: u32,
    pub _padding: [u32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct DeepShadowAllocateParams {
    pub slots: [DeepShadowSlotGpu; MAX_ATLAS_SLOT_COUNT],
    pub slot_count: u32,
    pub slot_resolution: u32,
    /// 1 refits each transform to the GPU macro group bounds
    pub gpu_driven: u32,
    pub _padding: u32,
}

/// Front depth and opacity layer rasterization of one slot
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct DeepShadowRasterParams {
    pub world_to_clip: [[f32; 4]; 4],
    pub atlas_rect: [u32; 4],
    pub slot_index: u32,
    pub macro_group_id: u32,
    pub layer_distribution: f32,
    pub depth_bias_scale: f32,
    pub density_scale: f32,
    pub gpu_driven: u32,
    pub _padding: [u32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct TransmittanceParams {
    pub voxel: VoxelCommonParameters,
    pub light_direction: [f32; 4],
    /// w is 1 for directional lights
    pub light_position: [f32; 4],
    pub atlas_resolution: [u32; 2],
    pub max_node_count: u32,
    /// 0 deep shadow, 1 voxel
    pub path: u32,
    pub light_id: u32,
    /// Bit `i` set when atlas slot `i` belongs to this light
    pub slot_mask: u32,
    pub kernel_type: u32,
    pub kernel_aperture: f32,
    pub voxel_mip_traversal: u32,
    pub deep_shadow_depth_bias_scale: f32,
    pub deep_shadow_density_scale: f32,
    pub layer_distribution: f32,
}

static_assertions::const_assert!(MAX_ATLAS_SLOT_COUNT <= 32);
static_assertions::const_assert_eq!(std::mem::size_of::<DeepShadowSlotGpu>(), 128);
static_assertions::const_assert_eq!(std::mem::size_of::<DeepShadowAllocateParams>() % 16, 0);
static_assertions::const_assert_eq!(std::mem::size_of::<DeepShadowRasterParams>(), 112);
static_assertions::const_assert_eq!(std::mem::size_of::<TransmittanceParams>() % 16, 0);
