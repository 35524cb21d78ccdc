//! Hair macro groups
//!
//! Spatially coherent sets of hair primitives sharing one voxel allocation
//! and one deep shadow slot per light.

pub mod macro_group_data;
pub mod macro_group_operations;

pub use macro_group_data::{
    HairGeometry, HairMeshBatch, MacroGroupAabbBatch, MacroGroupAabbParams, MacroGroupData,
    MacroGroupDatas, PrimitiveGroup, PrimitiveInfo,
};
pub use macro_group_operations::{
    add_macro_group_aabb_passes, build_macro_groups, culled_strands_outputs, geometry_group, plan_macro_group_aabb_batches,
};
