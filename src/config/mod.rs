//! Hair strands configuration
//!
//! Replaces process-wide console variables with an explicit snapshot.

pub mod config_data;
pub mod config_operations;
pub mod console_variables;

pub use config_data::{
    ConfigError, CullingConfig, DeepShadowConfig, DeepShadowKernel, StrandsConfig,
    TransmittanceConfig, VisibilityConfig, VoxelConfig,
};
pub use config_operations::{
    deep_shadow_kernel_from_index, deep_shadow_kernel_index, load_config_from_path,
    load_config_from_str, round_voxel_world_size, sanitize_config, snap_down, snap_mips_per_pass,
    snap_page_resolution, validate_config,
};
pub use console_variables::{apply_console_variable, CONSOLE_VARIABLES};
