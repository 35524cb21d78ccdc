//! Deep opacity maps and per-light hair transmittance
//!
//! Each (macro group, light) pair gets an atlas slot while slots last; the
//! rest of the lights ray march the voxel density instead.

pub mod deep_shadow_data;
pub mod deep_shadow_operations;
pub mod transmittance;

pub use deep_shadow_data::{
    AtlasLayout, DeepShadowAllocateParams, DeepShadowAllocation, DeepShadowData,
    DeepShadowRasterParams, DeepShadowResources, DeepShadowSlotGpu, LightData, LightKind,
    TransmittanceMask, TransmittanceParams, TransmittancePath,
};
pub use deep_shadow_operations::{
    add_deep_shadow_passes, allocate_deep_shadow_slots, atlas_layout,
    compute_world_to_light_transform, light_affects_bounds,
};
pub use transmittance::{add_transmittance_passes, select_transmittance_path};
