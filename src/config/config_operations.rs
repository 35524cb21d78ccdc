//! Hair Strands Configuration Operations - Pure DOP Functions
//!
//! Loading, validation and snapping of configuration values to the legal
//! ranges the GPU kernels accept.

use super::config_data::{ConfigError, DeepShadowKernel, StrandsConfig};
use crate::constants::visibility::{
    COMPUTE_RASTER_LAYER_COUNTS, MSAA_SAMPLE_COUNTS, PPLL_NODE_COUNTS,
};
use crate::constants::voxel::*;
use crate::error::{StrandsError, StrandsResult};
use anyhow::Result;
use std::path::Path;

/// Parse a TOML configuration; missing sections and fields keep their defaults
pub fn load_config_from_str(source: &str) -> std::result::Result<StrandsConfig, ConfigError> {
    toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Read and parse a TOML configuration file
pub fn load_config_from_path(path: &Path) -> StrandsResult<StrandsConfig> {
    let source = std::fs::read_to_string(path).map_err(|e| StrandsError::IoError {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;
    let config = load_config_from_str(&source)?;
    log::info!(
        "[config_operations::load_config_from_path] Loaded hair strands config from {}",
        path.display()
    );
    Ok(config)
}

/// Validate configuration parameters
///
/// Values that only need clamping are accepted here and fixed by
/// `sanitize_config`; this rejects values no clamp can repair.
pub fn validate_config(config: &StrandsConfig) -> Result<()> {
    let voxel = &config.voxel;

    let floats = [
        ("voxel.voxel_world_size", voxel.voxel_world_size),
        ("voxel.aabb_scale", voxel.aabb_scale),
        ("voxel.density_scale", voxel.density_scale),
        ("voxel.stepping_scale", voxel.stepping_scale),
        ("voxel.adaptive_correction_speed", voxel.adaptive_correction_speed),
        ("voxel.adaptive_correction_threshold", voxel.adaptive_correction_threshold),
        ("culling.lod_bias", config.culling.lod_bias),
        (
            "visibility.material_compaction_depth_threshold",
            config.visibility.material_compaction_depth_threshold,
        ),
        (
            "visibility.write_velocity_coverage_threshold",
            config.visibility.write_velocity_coverage_threshold,
        ),
        ("deep_shadow.layer_distribution", config.deep_shadow.layer_distribution),
    ];
    for (field, value) in floats {
        if !value.is_finite() {
            return Err(anyhow::anyhow!("StrandsConfig: {} must be finite, got {}", field, value));
        }
    }

    if voxel.page_count_per_dim == 0 {
        return Err(anyhow::anyhow!("StrandsConfig: voxel.page_count_per_dim cannot be 0"));
    }

    let page_texture_resolution =
        voxel.page_count_per_dim as u64 * snap_page_resolution(voxel.page_resolution) as u64;
    if page_texture_resolution > 2048 {
        return Err(anyhow::anyhow!(
            "StrandsConfig: page texture resolution {} exceeds maximum 3D texture size of 2048",
            page_texture_resolution
        ));
    }

    if voxel.adaptive_correction_threshold <= 0.0 {
        return Err(anyhow::anyhow!(
            "StrandsConfig: voxel.adaptive_correction_threshold must be positive"
        ));
    }

    if config.deep_shadow.slot_resolution == 0 {
        return Err(anyhow::anyhow!("StrandsConfig: deep_shadow.slot_resolution cannot be 0"));
    }

    if !(0.0..=1.0).contains(&config.visibility.write_velocity_coverage_threshold) {
        return Err(anyhow::anyhow!(
            "StrandsConfig: visibility.write_velocity_coverage_threshold {} outside [0, 1]",
            config.visibility.write_velocity_coverage_threshold
        ));
    }

    log::info!("[StrandsConfig] Configuration validated successfully");
    Ok(())
}

/// Clamp every value into the range the kernels accept
pub fn sanitize_config(config: &StrandsConfig) -> StrandsConfig {
    let mut out = config.clone();
    let voxel = &mut out.voxel;

    voxel.voxel_world_size = round_voxel_world_size(voxel.voxel_world_size);
    voxel.page_resolution = snap_page_resolution(voxel.page_resolution);
    voxel.aabb_scale = voxel.aabb_scale.clamp(MIN_AABB_SCALE, MAX_AABB_SCALE);
    voxel.max_raster_count = voxel.max_raster_count.clamp(1, MAX_RASTER_COUNT);
    voxel.jitter_mode = voxel.jitter_mode.min(MAX_JITTER_MODE);
    voxel.mips_per_pass = snap_mips_per_pass(voxel.mips_per_pass);
    voxel.inject_opaque_bias_count = voxel.inject_opaque_bias_count.max(0);
    voxel.inject_opaque_mark_count = voxel.inject_opaque_mark_count.max(0);
    voxel.gpu_driven_max_page_index_resolution = voxel.gpu_driven_max_page_index_resolution.max(1);
    voxel.adaptive_correction_speed = voxel.adaptive_correction_speed.clamp(0.0, 1.0);

    let visibility = &mut out.visibility;
    visibility.msaa_sample_count = snap_down(visibility.msaa_sample_count, &MSAA_SAMPLE_COUNTS);
    visibility.ppll_max_node_per_pixel =
        snap_down(visibility.ppll_max_node_per_pixel, &PPLL_NODE_COUNTS);
    visibility.compute_raster_sample_count =
        snap_down(visibility.compute_raster_sample_count, &COMPUTE_RASTER_LAYER_COUNTS);
    visibility.material_compaction_depth_threshold =
        visibility.material_compaction_depth_threshold.max(0.0);
    visibility.material_compaction_tangent_threshold_degrees = visibility
        .material_compaction_tangent_threshold_degrees
        .clamp(0.0, 180.0);

    out.deep_shadow.layer_distribution = out.deep_shadow.layer_distribution.clamp(0.0, 1.0);
    out.transmittance.deep_shadow_kernel_aperture =
        out.transmittance.deep_shadow_kernel_aperture.max(0.0);

    if out != *config {
        log::warn!("[config_operations::sanitize_config] Some hair strands settings were clamped to legal ranges");
    }
    out
}

/// Clamp to [0.01, 10] and round to the nearest 0.01
pub fn round_voxel_world_size(size: f32) -> f32 {
    let clamped = size.clamp(MIN_VOXEL_WORLD_SIZE, MAX_VOXEL_WORLD_SIZE);
    ((clamped * 100.0).round() / 100.0).max(MIN_VOXEL_WORLD_SIZE)
}

/// Clamp to [2, 256] and round up to a power of two
pub fn snap_page_resolution(resolution: u32) -> u32 {
    resolution
        .clamp(MIN_PAGE_RESOLUTION, MAX_PAGE_RESOLUTION)
        .next_power_of_two()
}

pub fn snap_mips_per_pass(mips_per_pass: u32) -> u32 {
    if mips_per_pass >= 2 {
        2
    } else {
        1
    }
}

/// Largest legal value not above `value`, or the smallest legal value
pub fn snap_down(value: u32, legal: &[u32]) -> u32 {
    legal
        .iter()
        .copied()
        .filter(|&v| v <= value)
        .max()
        .or_else(|| legal.iter().copied().min())
        .unwrap_or(0)
}

pub fn deep_shadow_kernel_from_index(index: i64) -> DeepShadowKernel {
    match index {
        i64::MIN..=0 => DeepShadowKernel::Linear,
        1 => DeepShadowKernel::Pcf2x2,
        2 => DeepShadowKernel::Pcf6x4,
        3 => DeepShadowKernel::PcssStochastic,
        _ => DeepShadowKernel::Pcss,
    }
}

pub fn deep_shadow_kernel_index(kernel: DeepShadowKernel) -> u32 {
    match kernel {
        DeepShadowKernel::Linear => 0,
        DeepShadowKernel::Pcf2x2 => 1,
        DeepShadowKernel::Pcf6x4 => 2,
        DeepShadowKernel::PcssStochastic => 3,
        DeepShadowKernel::Pcss => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = StrandsConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(sanitize_config(&config), config);
    }

    #[test]
    fn test_round_voxel_world_size() {
        assert!((round_voxel_world_size(0.3) - 0.3).abs() < 1e-6);
        assert!((round_voxel_world_size(0.154) - 0.15).abs() < 1e-6);
        assert!((round_voxel_world_size(0.0) - 0.01).abs() < 1e-6);
        assert!((round_voxel_world_size(50.0) - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_snap_page_resolution() {
        assert_eq!(snap_page_resolution(32), 32);
        assert_eq!(snap_page_resolution(33), 64);
        assert_eq!(snap_page_resolution(0), 2);
        assert_eq!(snap_page_resolution(1000), 256);
    }

    #[test]
    fn test_snap_down_to_enumerated_sets() {
        assert_eq!(snap_down(3, &MSAA_SAMPLE_COUNTS), 2);
        assert_eq!(snap_down(0, &MSAA_SAMPLE_COUNTS), 1);
        assert_eq!(snap_down(100, &MSAA_SAMPLE_COUNTS), 8);
        assert_eq!(snap_down(12, &PPLL_NODE_COUNTS), 8);
        assert_eq!(snap_down(3, &COMPUTE_RASTER_LAYER_COUNTS), 2);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = load_config_from_str(
            r#"
            [voxel]
            voxel_world_size = 0.15
            page_count_per_dim = 8

            [visibility]
            ppll_enabled = true
            "#,
        )
        .unwrap();

        assert_eq!(config.voxel.voxel_world_size, 0.15);
        assert_eq!(config.voxel.page_count_per_dim, 8);
        assert_eq!(config.voxel.page_resolution, 32);
        assert!(config.visibility.ppll_enabled);
        assert!(config.culling.enabled);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let result = load_config_from_str("[voxel]\nvoxel_world_size = \"big\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[deep_shadow]\nslot_resolution = 1024").unwrap();

        let config = load_config_from_path(file.path()).unwrap();
        assert_eq!(config.deep_shadow.slot_resolution, 1024);
    }

    #[test]
    fn test_validation_rejects_oversized_page_texture() {
        let mut config = StrandsConfig::default();
        config.voxel.page_count_per_dim = 100;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_sanitize_clamps() {
        let mut config = StrandsConfig::default();
        config.voxel.aabb_scale = 100.0;
        config.voxel.max_raster_count = 0;
        config.voxel.inject_opaque_mark_count = -4;
        config.voxel.mips_per_pass = 7;
        let out = sanitize_config(&config);
        assert_eq!(out.voxel.aabb_scale, MAX_AABB_SCALE);
        assert_eq!(out.voxel.max_raster_count, 1);
        assert_eq!(out.voxel.inject_opaque_mark_count, 0);
        assert_eq!(out.voxel.mips_per_pass, 2);
    }
}
