//! Virtual voxel density of hair
//!
//! Every macro group gets a block of page indices; only pages touched by
//! clusters receive a physical page from a fixed pool. Lighting features
//! march the resulting density with their own scales.

pub mod adaptive_voxel;
pub mod voxel_data;
pub mod voxel_kernels;
pub mod voxel_operations;

pub use adaptive_voxel::update_adaptive_voxel_size;
pub use voxel_data::{
    AdaptiveVoxelState, BoundsSource, PageAllocation, PageIndexAllocation, UsageContext,
    VirtualVoxelResources, VoxelAllocationParams, VoxelCommonParameters, VoxelInjectOpaqueParams,
    VoxelPageParams, VoxelRasterParams, VoxelRasterSetup,
};
pub use voxel_kernels::{allocate_pages, mark_valid_pages, page_coord_from_linear};
pub use voxel_operations::{
    add_voxelization_passes, allocate_virtual_voxel_resources, compute_page_index_allocation,
    compute_voxel_common_parameters, compute_voxel_raster_setup, layout_page_index_allocations,
    page_index_bounds_source, page_texture_mip_count, page_world_size, plan_mip_passes,
    virtual_voxel_resources_valid, voxel_density_scale, voxel_depth_bias_scale,
    voxel_stepping_scale,
};
