//! Hair Strands Configuration Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in config_operations.rs
//!
//! One immutable snapshot is assembled per frame and passed down the call
//! chain; no stage reads global state.

use serde::Deserialize;

/// Root configuration of the hair strands pipeline
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct StrandsConfig {
    pub culling: CullingConfig,
    pub visibility: VisibilityConfig,
    pub voxel: VoxelConfig,
    pub deep_shadow: DeepShadowConfig,
    pub transmittance: TransmittanceConfig,
}

/// Cluster culling and LOD selection
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CullingConfig {
    pub enabled: bool,
    /// Occlusion test against the previous frame HZB
    pub hzb_enabled: bool,
    /// LOD forced on every cluster, negative for screen-size selection
    pub force_lod: i32,
    /// Added to the screen-size LOD before clamping
    pub lod_bias: f32,
    /// Cull clusters in shadow views too
    pub cull_shadow_views: bool,
}

/// Visibility buffer and sample compaction
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VisibilityConfig {
    pub ppll_enabled: bool,
    pub compute_raster_enabled: bool,

    pub msaa_sample_count: u32,
    pub msaa_mean_sample_count: u32,

    pub ppll_max_node_per_pixel: u32,
    pub ppll_mean_node_per_pixel: u32,

    pub compute_raster_sample_count: u32,
    pub compute_raster_mean_sample_count: u32,

    pub material_compaction_enabled: bool,
    /// Depth distance (cm) under which two samples may merge
    pub material_compaction_depth_threshold: f32,
    /// Tangent angle (degrees) under which two samples may merge
    pub material_compaction_tangent_threshold_degrees: f32,

    /// Minimum pixel coverage before hair writes velocity; 0 always writes
    pub write_velocity_coverage_threshold: f32,
}

/// Virtual voxel structure
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VoxelConfig {
    pub enabled: bool,
    pub voxel_world_size: f32,
    pub page_resolution: u32,
    pub page_count_per_dim: u32,
    pub aabb_scale: f32,

    /// Page index sizing from the GPU macro-group AABBs instead of CPU bounds
    pub gpu_driven: bool,
    pub gpu_driven_max_page_index_resolution: u32,
    pub compute_raster: bool,
    pub max_raster_count: u32,

    /// Negative per-context values fall back to `density_scale`
    pub density_scale: f32,
    pub density_scale_ao: f32,
    pub density_scale_shadow: f32,
    pub density_scale_transmittance: f32,
    pub density_scale_environment: f32,
    pub density_scale_raytracing: f32,

    pub depth_bias_scale_shadow: f32,
    pub depth_bias_scale_transmittance: f32,
    pub depth_bias_scale_environment: f32,

    /// Negative per-context values fall back to `stepping_scale`
    pub stepping_scale: f32,
    pub stepping_scale_shadow: f32,
    pub stepping_scale_transmittance: f32,
    pub stepping_scale_environment: f32,
    pub stepping_scale_raytracing: f32,

    pub inject_opaque_depth: bool,
    pub inject_opaque_bias_count: i32,
    pub inject_opaque_mark_count: i32,

    pub jitter_mode: u32,
    /// Mip levels produced per generation pass, 1 or 2
    pub mips_per_pass: u32,
    pub invalidate_empty_page_index: bool,

    pub adaptive_enabled: bool,
    pub adaptive_correction_speed: f32,
    pub adaptive_correction_threshold: f32,

    pub raytracing_shadow_occlusion_threshold: f32,
    pub raytracing_sky_occlusion_threshold: f32,
}

/// Deep opacity maps
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DeepShadowConfig {
    pub enabled: bool,
    /// Resolution of one atlas slot
    pub slot_resolution: u32,
    /// Light transforms computed on GPU from macro-group AABBs
    pub gpu_driven: bool,
    pub depth_bias_scale: f32,
    pub density_scale: f32,
    /// 0 spreads opacity layers linearly, 1 packs them toward the front
    pub layer_distribution: f32,
}

/// Per-light transmittance evaluation
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TransmittanceConfig {
    /// Use voxels for every light and skip deep shadow allocation
    pub force_voxel_transmittance_and_shadow: bool,
    pub deep_shadow_kernel: DeepShadowKernel,
    pub deep_shadow_kernel_aperture: f32,
    pub voxel_mip_traversal: bool,
}

/// Filtering kernel used when sampling deep shadow maps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeepShadowKernel {
    Linear,
    Pcf2x2,
    Pcf6x4,
    PcssStochastic,
    Pcss,
}

/// Errors raised while loading or overriding configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("{field} = {value} is out of range ({reason})")]
    OutOfRange {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unknown console variable: {0}")]
    UnknownVariable(String),
}

impl Default for CullingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hzb_enabled: true,
            force_lod: -1,
            lod_bias: 0.0,
            cull_shadow_views: true,
        }
    }
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            ppll_enabled: false,
            compute_raster_enabled: false,
            msaa_sample_count: 4,
            msaa_mean_sample_count: 2,
            ppll_max_node_per_pixel: 16,
            ppll_mean_node_per_pixel: 8,
            compute_raster_sample_count: 4,
            compute_raster_mean_sample_count: 2,
            material_compaction_enabled: true,
            material_compaction_depth_threshold: 1.0,
            material_compaction_tangent_threshold_degrees: 10.0,
            write_velocity_coverage_threshold: 0.0,
        }
    }
}

impl Default for VoxelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            voxel_world_size: 0.3,
            page_resolution: 32,
            page_count_per_dim: 14,
            aabb_scale: 1.0,
            gpu_driven: true,
            gpu_driven_max_page_index_resolution: 32,
            compute_raster: true,
            max_raster_count: 32,
            density_scale: 2.0,
            density_scale_ao: -1.0,
            density_scale_shadow: -1.0,
            density_scale_transmittance: -1.0,
            density_scale_environment: -1.0,
            density_scale_raytracing: -1.0,
            depth_bias_scale_shadow: 2.0,
            depth_bias_scale_transmittance: 3.0,
            depth_bias_scale_environment: 1.8,
            stepping_scale: 1.15,
            stepping_scale_shadow: -1.0,
            stepping_scale_transmittance: -1.0,
            stepping_scale_environment: -1.0,
            stepping_scale_raytracing: -1.0,
            inject_opaque_depth: true,
            inject_opaque_bias_count: 3,
            inject_opaque_mark_count: 6,
            jitter_mode: 1,
            mips_per_pass: 1,
            invalidate_empty_page_index: true,
            adaptive_enabled: true,
            adaptive_correction_speed: 0.1,
            adaptive_correction_threshold: 0.9,
            raytracing_shadow_occlusion_threshold: 1.0,
            raytracing_sky_occlusion_threshold: 1.0,
        }
    }
}

impl Default for DeepShadowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            slot_resolution: 2048,
            gpu_driven: true,
            depth_bias_scale: 0.05,
            density_scale: 2.0,
            layer_distribution: 0.0,
        }
    }
}

impl Default for TransmittanceConfig {
    fn default() -> Self {
        Self {
            force_voxel_transmittance_and_shadow: false,
            deep_shadow_kernel: DeepShadowKernel::Pcf6x4,
            deep_shadow_kernel_aperture: 1.0,
            voxel_mip_traversal: true,
        }
    }
}

impl Default for DeepShadowKernel {
    fn default() -> Self {
        DeepShadowKernel::Pcf6x4
    }
}
