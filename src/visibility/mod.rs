//! Hair visibility buffer
//!
//! Captures hair fragments (MSAA, per-pixel linked lists or compute raster),
//! compacts them into a bounded node array and resolves material/velocity.

pub mod material_resolve;
pub mod visibility_data;
pub mod visibility_kernels;
pub mod visibility_operations;

pub use material_resolve::{
    add_material_resolve_passes, should_write_velocity, MaterialResolveOutputs,
    MaterialResolveParams,
};
pub use visibility_data::{
    CategorizationTexel, CompactNodeData, CompactedVisibility, CpuPpll, PpllNode, VisibilityData,
    VisibilityParams, VisibilityRenderMode, VisibilitySample,
};
pub use visibility_kernels::{
    categorize_pixel, compact_visibility, create_ppll, merge_material_samples, merge_msaa_samples,
    ppll_append, ppll_collect,
};
pub use visibility_operations::{
    add_visibility_passes, max_node_count, max_sample_per_pixel, mean_sample_per_pixel,
    select_render_mode,
};
