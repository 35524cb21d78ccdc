//! Voxel Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in voxel_operations.rs

use crate::bounds::AABB;
use crate::graph::{BufferHandle, TextureHandle};
use crate::view::ViewUniform;
use bytemuck::{Pod, Zeroable};
use cgmath::{Matrix4, Vector3};

/// Lighting feature that samples the voxel density
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageContext {
    Ao,
    Shadow,
    Transmittance,
    Environment,
    Raytracing,
}

/// Where the page index allocation reads a macro group's bounds from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundsSource {
    /// Scaled CPU bounds of the macro group
    Cpu(AABB),
    /// `offset` is in u32 elements of the macro group AABB buffer
    Gpu { buffer: BufferHandle, offset: u32 },
}

/// Page index block of one macro group
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageIndexAllocation {
    pub macro_group_id: u32,
    /// Snapped to whole pages; page (0, 0, 0) starts at `world_aabb.min`
    pub world_aabb: AABB,
    pub page_index_resolution: [u32; 3],
    pub count: u32,
    /// First entry of this macro group in the page index buffer
    pub offset: u32,
}

/// Orthographic voxelization setup of one macro group
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelRasterSetup {
    pub viewport_resolution: [u32; 2],
    /// Projection axis, towards the rasterized face
    pub direction: Vector3<f32>,
    pub up: Vector3<f32>,
    /// Box extent reordered to (width, height, depth) of the projection
    pub projection_size: Vector3<f32>,
    pub world_to_clip: Matrix4<f32>,
}

/// Per-view voxel size feedback carried across frames
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AdaptiveVoxelState {
    /// Voxel size used by the last allocation, `None` before the first one
    pub voxel_world_size: Option<f32>,
    /// Pages requested by the GPU in an earlier frame, once read back
    pub requested_page_count: Option<u32>,
    /// Last readback value that was consumed
    pub allocated_page_count: u32,
}

/// Voxel parameters shared by every voxel kernel and the lighting passes
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct VoxelCommonParameters {
    pub page_count_resolution: [u32; 3],
    pub page_count: u32,
    pub page_texture_resolution: [u32; 3],
    pub page_resolution: u32,

    pub voxel_world_size: f32,
    pub jitter_mode: u32,
    pub indirect_dispatch_group_size: u32,
    pub node_desc_count: u32,

    pub page_index_count: u32,
    pub density_scale: f32,
    pub density_scale_ao: f32,
    pub density_scale_shadow: f32,

    pub density_scale_transmittance: f32,
    pub density_scale_environment: f32,
    pub density_scale_raytracing: f32,
    pub depth_bias_scale_shadow: f32,

    pub depth_bias_scale_transmittance: f32,
    pub depth_bias_scale_environment: f32,
    pub stepping_scale_shadow: f32,
    pub stepping_scale_transmittance: f32,

    pub stepping_scale_environment: f32,
    pub stepping_scale_raytracing: f32,
    pub raytracing_shadow_occlusion_threshold: f32,
    pub raytracing_sky_occlusion_threshold: f32,
}

/// Virtual voxel structure of one view
///
/// `Default` is the invalid state: no page texture, nothing to sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VirtualVoxelResources {
    pub parameters: VoxelCommonParameters,
    pub allocations: Vec<PageIndexAllocation>,

    /// Physical page per page index, `INVALID_PAGE_INDEX` when unallocated
    pub page_index_buffer: Option<BufferHandle>,
    /// Two u32 per page index: voxel occupancy bits
    pub page_index_occupancy_buffer: Option<BufferHandle>,
    /// Packed page coordinate per page index
    pub page_index_coord_buffer: Option<BufferHandle>,
    /// Page index per physical page
    pub page_to_page_index_buffer: Option<BufferHandle>,
    /// Resolution (xyz) and offset (w) per macro group
    pub page_index_resolution_and_offset_buffer: Option<BufferHandle>,
    pub page_index_allocation_indirect_args: Option<BufferHandle>,
    pub node_desc_buffer: Option<BufferHandle>,
    /// One dispatch over the pages of each macro group
    pub indirect_args_buffer: Option<BufferHandle>,
    /// Allocated pages (0) and total pages (1)
    pub page_index_global_counter: Option<BufferHandle>,
    /// Pages requested this frame, copied back for adaptive sizing
    pub total_requested_page_allocation: Option<BufferHandle>,
    pub voxelization_view_info_buffer: Option<BufferHandle>,
    /// 3D R32Uint page atlas with the full mip chain of one page
    pub page_texture: Option<TextureHandle>,
}

/// Result of the CPU reference page allocation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageAllocation {
    /// Physical page per page index
    pub page_index: Vec<u32>,
    /// Page index per physical page, `INVALID_PAGE_INDEX` when unused
    pub page_to_page_index: Vec<u32>,
    /// Valid page indices, including the ones that did not get a page
    pub requested_count: u32,
    pub allocated_count: u32,
}

/// Page index allocation, mark-valid and page allocation kernels
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct VoxelAllocationParams {
    pub common: VoxelCommonParameters,
    pub cpu_min_aabb: [f32; 4],
    pub cpu_max_aabb: [f32; 4],
    /// xyz resolution, w count
    pub cpu_page_index_resolution: [u32; 4],
    pub macro_group_id: u32,
    pub macro_group_count: u32,
    pub page_world_size: f32,
    pub total_page_index_count: u32,
    pub cpu_page_index_offset: u32,
    pub max_cluster_count: u32,
    pub max_scatter_count: u32,
    /// 0 reads `cpu_*`, 1 reads the GPU macro group AABB buffer
    pub gpu_driven: u32,
}

/// Mesh and compute voxelization
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct VoxelRasterParams {
    pub common: VoxelCommonParameters,
    pub world_to_clip: [[f32; 4]; 4],
    pub voxel_min_aabb: [f32; 4],
    pub voxel_max_aabb: [f32; 4],
    /// Virtual voxel resolution (xyz), macro group id (w)
    pub voxel_resolution: [u32; 4],
    pub viewport_resolution: [u32; 2],
    pub max_raster_count: u32,
    pub frame_id_mod8: u32,
    pub dispatch_count_x: u32,
    pub radius_at_depth1: f32,
    pub gpu_driven: u32,
    pub _padding: u32,
}

/// Page clear, mip generation and empty-page patching
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct VoxelPageParams {
    pub common: VoxelCommonParameters,
    pub source_mip: u32,
    pub target_mip: u32,
    /// Mips written by one generation pass
    pub mip_count: u32,
    pub dispatch_group_size: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct VoxelInjectOpaqueParams {
    pub view: ViewUniform,
    pub common: VoxelCommonParameters,
    pub macro_group_id: u32,
    pub voxel_bias_count: u32,
    pub voxel_mark_count: u32,
    pub _padding: u32,
}

static_assertions::const_assert_eq!(std::mem::size_of::<VoxelCommonParameters>(), 112);
static_assertions::const_assert_eq!(std::mem::size_of::<VoxelAllocationParams>() % 16, 0);
static_assertions::const_assert_eq!(std::mem::size_of::<VoxelRasterParams>() % 16, 0);
static_assertions::const_assert_eq!(std::mem::size_of::<VoxelPageParams>() % 16, 0);
static_assertions::const_assert_eq!(std::mem::size_of::<VoxelInjectOpaqueParams>() % 16, 0);
