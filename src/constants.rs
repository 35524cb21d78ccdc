//! Global constants for Hearth Strands
//!
//! Values that are shared between the CPU orchestration and the GPU kernels.
//! Changing any of these requires the matching shader constant to change too.

/// GPU hardware limits
pub mod gpu_limits {
    /// Maximum number of workgroups per dispatch dimension
    pub const MAX_DISPATCH_GROUPS_PER_DIMENSION: u32 = 65535;

    /// Fallback 2D texture dimension when no device limit is known
    pub const DEFAULT_MAX_TEXTURE_DIMENSION_2D: u32 = 8192;

    /// Size of one indirect dispatch argument block (3 x u32)
    pub const DISPATCH_INDIRECT_ARGS_SIZE: u64 = 12;

    /// Size of one indirect draw argument block (4 x u32)
    pub const DRAW_INDIRECT_ARGS_SIZE: u64 = 16;
}

/// Cluster culling constants
pub mod cluster {
    /// Threads per group for per-cluster work
    pub const CULLING_GROUP_SIZE: u32 = 64;

    /// Elements reduced per group by one prefix-sum level
    pub const PREFIX_SUM_BLOCK_SIZE: u32 = 512;

    /// Number of prefix-sum levels used for the compaction offsets
    pub const PREFIX_SUM_LEVEL_COUNT: usize = 3;

    /// Each control point expands to a camera-facing quad (two triangles)
    pub const VERTICES_PER_CONTROL_POINT: u32 = 6;

    /// Hair groups bound per macro-group AABB update dispatch
    pub const AABB_UPDATE_GROUP_PER_PASS: usize = 8;

    /// Number of u32 values stored per macro-group AABB (min xyz, max xyz)
    pub const AABB_U32_PER_MACRO_GROUP: u32 = 6;

    /// Number of u32 values stored per cluster AABB (min xyz, max xyz)
    pub const AABB_U32_PER_CLUSTER: u32 = 6;
}

/// Visibility constants
pub mod visibility {
    /// Threads per group for node-based compute passes
    pub const NODE_GROUP_SIZE: u32 = 64;

    /// Per-pixel passes run in square tiles of this size
    pub const PIXEL_TILE_SIZE: u32 = 8;

    /// Legal MSAA sample counts
    pub const MSAA_SAMPLE_COUNTS: [u32; 4] = [1, 2, 4, 8];

    /// Legal per-pixel linked list node counts
    pub const PPLL_NODE_COUNTS: [u32; 4] = [0, 8, 16, 32];

    /// Legal compute raster layer counts
    pub const COMPUTE_RASTER_LAYER_COUNTS: [u32; 3] = [1, 2, 4];

    /// Marker for an empty PPLL head or next pointer
    pub const PPLL_END_OF_LIST: u32 = u32::MAX;

    /// Marker for a pixel without any hair primitive
    pub const INVALID_PRIMITIVE_ID: u32 = u32::MAX;
}

/// Voxelization constants
pub mod voxel {
    /// Threads per group for page index allocation
    pub const ALLOCATION_GROUP_SIZE: u32 = 32;

    /// Threads per group of the indirect page clear and raster dispatches
    pub const INDIRECT_DISPATCH_GROUP_SIZE: u32 = 64;

    /// Clusters processed per group when marking valid page indices
    pub const MARK_VALID_GROUP_SIZE: u32 = 32;

    /// Compute raster dispatch width along X
    pub const RASTER_DISPATCH_COUNT_X: u32 = 64;

    /// Compute raster group size
    pub const RASTER_GROUP_SIZE: u32 = 32;

    /// Viewport used by GPU-driven voxel rasterization
    pub const GPU_DRIVEN_RASTER_RESOLUTION: u32 = 4096;

    /// Page index blocks never exceed this many pages along one axis
    pub const MAX_PAGE_INDEX_RESOLUTION_PER_AXIS: u32 = 1024;

    /// Marker stored in the page index buffer for unallocated pages
    pub const INVALID_PAGE_INDEX: u32 = u32::MAX;

    pub const MIN_VOXEL_WORLD_SIZE: f32 = 0.01;
    pub const MAX_VOXEL_WORLD_SIZE: f32 = 10.0;
    pub const MIN_PAGE_RESOLUTION: u32 = 2;
    pub const MAX_PAGE_RESOLUTION: u32 = 256;
    pub const MIN_AABB_SCALE: f32 = 0.01;
    pub const MAX_AABB_SCALE: f32 = 10.0;
    pub const MIN_STEPPING_SCALE: f32 = 1.0;
    pub const MAX_STEPPING_SCALE: f32 = 10.0;
    pub const MAX_JITTER_MODE: u32 = 2;
    pub const MAX_RASTER_COUNT: u32 = 256;
}

/// Deep shadow constants
pub mod deep_shadow {
    /// Fixed number of atlas slots per view
    pub const MAX_ATLAS_SLOT_COUNT: usize = 32;

    /// Opacity layers accumulated per deep shadow slot
    pub const OPACITY_LAYER_COUNT: u32 = 4;

    /// Smallest slot resolution the atlas may shrink to
    pub const MIN_SLOT_RESOLUTION: u32 = 64;
}
