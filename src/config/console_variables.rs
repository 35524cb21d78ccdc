//! `r.HairStrands.*` console variable surface
//!
//! Hosts that expose a console map each command onto the configuration
//! snapshot of the next frame through `apply_console_variable`.

use super::config_data::{ConfigError, StrandsConfig};
use super::config_operations::deep_shadow_kernel_from_index;

/// Every supported console variable with its help text
pub const CONSOLE_VARIABLES: &[(&str, &str)] = &[
    ("r.HairStrands.Cull", "Enable hair cluster culling (0/1)"),
    ("r.HairStrands.Cull.UseHzb", "Occlusion-test clusters against the HZB (0/1)"),
    ("r.HairStrands.Cull.ForceLOD", "Force a cluster LOD, -1 selects by screen size"),
    ("r.HairStrands.Cull.LODBias", "Bias added to the screen-size cluster LOD"),
    ("r.HairStrands.Cull.ShadowViews", "Cull clusters in shadow views (0/1)"),
    ("r.HairStrands.Visibility.PPLL", "Use per-pixel linked lists for visibility (0/1)"),
    ("r.HairStrands.Visibility.ComputeRaster", "Use compute rasterization for visibility (0/1)"),
    ("r.HairStrands.Visibility.MSAA.SamplePerPixel", "MSAA samples per pixel (1, 2, 4, 8)"),
    ("r.HairStrands.Visibility.MSAA.MeanSamplePerPixel", "Mean compacted MSAA samples per pixel"),
    ("r.HairStrands.Visibility.PPLL.SamplePerPixel", "Max PPLL nodes per pixel (0, 8, 16, 32)"),
    ("r.HairStrands.Visibility.PPLL.MeanNodeCountPerPixel", "Mean PPLL nodes per pixel"),
    ("r.HairStrands.Visibility.ComputeRaster.SamplePerPixel", "Compute raster layers (1, 2, 4)"),
    ("r.HairStrands.Visibility.ComputeRaster.MeanSamplePerPixel", "Mean compute raster samples per pixel"),
    ("r.HairStrands.Visibility.WriteVelocityCoverageThreshold", "Coverage needed to write velocity, 0 always writes"),
    ("r.HairStrands.MaterialCompaction", "Merge similar samples before material evaluation (0/1)"),
    ("r.HairStrands.MaterialCompaction.DepthThreshold", "Max depth difference (cm) of merged samples"),
    ("r.HairStrands.MaterialCompaction.TangentThreshold", "Max tangent angle (degrees) of merged samples"),
    ("r.HairStrands.Voxelization", "Enable hair voxelization (0/1)"),
    ("r.HairStrands.Voxelization.Virtual.VoxelWorldSize", "World size of a voxel (cm)"),
    ("r.HairStrands.Voxelization.Virtual.VoxelPageResolution", "Voxels per page side"),
    ("r.HairStrands.Voxelization.Virtual.VoxelPageCountPerDim", "Pages per page texture side"),
    ("r.HairStrands.Voxelization.AABBScale", "Scale applied to macro-group bounds before page sizing"),
    ("r.HairStrands.Voxelization.GPUDriven", "Size page indices from GPU bounds (0/1)"),
    ("r.HairStrands.Voxelization.GPUDriven.MaxPageIndexResolution", "Page index resolution reserved per macro group"),
    ("r.HairStrands.Voxelization.Virtual.ComputeRaster", "Voxelize with compute rasterization (0/1)"),
    ("r.HairStrands.Voxelization.Virtual.ComputeRasterMaxVoxelCount", "Max voxels rasterized per segment"),
    ("r.HairStrands.Voxelization.DensityScale", "Global voxel density scale"),
    ("r.HairStrands.Voxelization.DensityScale.AO", "AO density scale, negative uses global"),
    ("r.HairStrands.Voxelization.DensityScale.Shadow", "Shadow density scale, negative uses global"),
    ("r.HairStrands.Voxelization.DensityScale.Transmittance", "Transmittance density scale, negative uses global"),
    ("r.HairStrands.Voxelization.DensityScale.Environment", "Environment density scale, negative uses global"),
    ("r.HairStrands.Voxelization.DensityScale.Raytracing", "Raytracing density scale, negative uses global"),
    ("r.HairStrands.Voxelization.DepthBiasScale.Shadow", "Shadow depth bias scale"),
    ("r.HairStrands.Voxelization.DepthBiasScale.Transmittance", "Transmittance depth bias scale"),
    ("r.HairStrands.Voxelization.DepthBiasScale.Environment", "Environment depth bias scale"),
    ("r.HairStrands.Voxelization.SteppingScale", "Global voxel traversal stepping scale"),
    ("r.HairStrands.Voxelization.SteppingScale.Shadow", "Shadow stepping scale, negative uses global"),
    ("r.HairStrands.Voxelization.SteppingScale.Transmittance", "Transmittance stepping scale, negative uses global"),
    ("r.HairStrands.Voxelization.SteppingScale.Environment", "Environment stepping scale, negative uses global"),
    ("r.HairStrands.Voxelization.SteppingScale.Raytracing", "Raytracing stepping scale, negative uses global"),
    ("r.HairStrands.Voxelization.InjectOpaqueDepth", "Inject opaque scene depth into voxels (0/1)"),
    ("r.HairStrands.Voxelization.InjectOpaque.BiasCount", "Voxels skipped in front of opaque depth"),
    ("r.HairStrands.Voxelization.InjectOpaque.MarkCount", "Voxels marked behind opaque depth"),
    ("r.HairStrands.Voxelization.Virtual.Jitter", "Voxel jitter mode (0, 1, 2)"),
    ("r.HairStrands.Voxelization.Virtual.MipPerPass", "Mip levels generated per pass (1 or 2)"),
    ("r.HairStrands.Voxelization.Virtual.InvalidateEmptyPageIndex", "Invalidate pages left empty after voxelization (0/1)"),
    ("r.HairStrands.Voxelization.Virtual.Adaptive", "Adapt voxel size to the page budget (0/1)"),
    ("r.HairStrands.Voxelization.Virtual.Adaptive.CorrectionSpeed", "Adaptive voxel size correction speed"),
    ("r.HairStrands.Voxelization.Virtual.Adaptive.CorrectionThreshold", "Page budget fraction targeted when shrinking"),
    ("r.HairStrands.Voxelization.Raytracing.ShadowOcclusionThreshold", "Voxel shadow occlusion threshold for raytracing"),
    ("r.HairStrands.Voxelization.Raytracing.SkyOcclusionThreshold", "Voxel sky occlusion threshold for raytracing"),
    ("r.HairStrands.DeepShadow", "Enable deep shadow maps (0/1)"),
    ("r.HairStrands.DeepShadow.Resolution", "Deep shadow atlas slot resolution"),
    ("r.HairStrands.DeepShadow.GPUDriven", "Compute light transforms on GPU (0/1)"),
    ("r.HairStrands.DeepShadow.DepthBiasScale", "Deep shadow depth bias scale"),
    ("r.HairStrands.DeepShadow.DensityScale", "Deep shadow density scale"),
    ("r.HairStrands.DeepShadow.LayerDistribution", "Opacity layer distribution in [0, 1]"),
    ("r.HairStrands.DeepShadow.KernelType", "Deep shadow filter kernel (0-4)"),
    ("r.HairStrands.DeepShadow.KernelAperture", "Deep shadow filter aperture"),
    ("r.HairStrands.Voxelization.ForceTransmittanceAndShadow", "Use voxels for every light (0/1)"),
    ("r.HairStrands.Voxelization.Virtual.UseMipTraversal", "Traverse voxel mips for transmittance (0/1)"),
];

/// Parse `value` and write it into the field named by `name`
pub fn apply_console_variable(
    config: &mut StrandsConfig,
    name: &str,
    value: &str,
) -> Result<(), ConfigError> {
    let value = value.trim();
    let c = config;
    match name {
        "r.HairStrands.Cull" => c.culling.enabled = parse_bool(name, value)?,
        "r.HairStrands.Cull.UseHzb" => c.culling.hzb_enabled = parse_bool(name, value)?,
        "r.HairStrands.Cull.ForceLOD" => c.culling.force_lod = parse_i32(name, value)?,
        "r.HairStrands.Cull.LODBias" => c.culling.lod_bias = parse_f32(name, value)?,
        "r.HairStrands.Cull.ShadowViews" => c.culling.cull_shadow_views = parse_bool(name, value)?,

        "r.HairStrands.Visibility.PPLL" => c.visibility.ppll_enabled = parse_bool(name, value)?,
        "r.HairStrands.Visibility.ComputeRaster" => {
            c.visibility.compute_raster_enabled = parse_bool(name, value)?
        }
        "r.HairStrands.Visibility.MSAA.SamplePerPixel" => {
            c.visibility.msaa_sample_count = parse_u32(name, value)?
        }
        "r.HairStrands.Visibility.MSAA.MeanSamplePerPixel" => {
            c.visibility.msaa_mean_sample_count = parse_u32(name, value)?
        }
        "r.HairStrands.Visibility.PPLL.SamplePerPixel" => {
            c.visibility.ppll_max_node_per_pixel = parse_u32(name, value)?
        }
        "r.HairStrands.Visibility.PPLL.MeanNodeCountPerPixel" => {
            c.visibility.ppll_mean_node_per_pixel = parse_u32(name, value)?
        }
        "r.HairStrands.Visibility.ComputeRaster.SamplePerPixel" => {
            c.visibility.compute_raster_sample_count = parse_u32(name, value)?
        }
        "r.HairStrands.Visibility.ComputeRaster.MeanSamplePerPixel" => {
            c.visibility.compute_raster_mean_sample_count = parse_u32(name, value)?
        }
        "r.HairStrands.Visibility.WriteVelocityCoverageThreshold" => {
            c.visibility.write_velocity_coverage_threshold = parse_f32(name, value)?
        }
        "r.HairStrands.MaterialCompaction" => {
            c.visibility.material_compaction_enabled = parse_bool(name, value)?
        }
        "r.HairStrands.MaterialCompaction.DepthThreshold" => {
            c.visibility.material_compaction_depth_threshold = parse_f32(name, value)?
        }
        "r.HairStrands.MaterialCompaction.TangentThreshold" => {
            c.visibility.material_compaction_tangent_threshold_degrees = parse_f32(name, value)?
        }

        "r.HairStrands.Voxelization" => c.voxel.enabled = parse_bool(name, value)?,
        "r.HairStrands.Voxelization.Virtual.VoxelWorldSize" => {
            c.voxel.voxel_world_size = parse_f32(name, value)?
        }
        "r.HairStrands.Voxelization.Virtual.VoxelPageResolution" => {
            c.voxel.page_resolution = parse_u32(name, value)?
        }
        "r.HairStrands.Voxelization.Virtual.VoxelPageCountPerDim" => {
            c.voxel.page_count_per_dim = parse_u32(name, value)?
        }
        "r.HairStrands.Voxelization.AABBScale" => c.voxel.aabb_scale = parse_f32(name, value)?,
        "r.HairStrands.Voxelization.GPUDriven" => c.voxel.gpu_driven = parse_bool(name, value)?,
        "r.HairStrands.Voxelization.GPUDriven.MaxPageIndexResolution" => {
            c.voxel.gpu_driven_max_page_index_resolution = parse_u32(name, value)?
        }
        "r.HairStrands.Voxelization.Virtual.ComputeRaster" => {
            c.voxel.compute_raster = parse_bool(name, value)?
        }
        "r.HairStrands.Voxelization.Virtual.ComputeRasterMaxVoxelCount" => {
            c.voxel.max_raster_count = parse_u32(name, value)?
        }
        "r.HairStrands.Voxelization.DensityScale" => c.voxel.density_scale = parse_f32(name, value)?,
        "r.HairStrands.Voxelization.DensityScale.AO" => {
            c.voxel.density_scale_ao = parse_f32(name, value)?
        }
        "r.HairStrands.Voxelization.DensityScale.Shadow" => {
            c.voxel.density_scale_shadow = parse_f32(name, value)?
        }
        "r.HairStrands.Voxelization.DensityScale.Transmittance" => {
            c.voxel.density_scale_transmittance = parse_f32(name, value)?
        }
        "r.HairStrands.Voxelization.DensityScale.Environment" => {
            c.voxel.density_scale_environment = parse_f32(name, value)?
        }
        "r.HairStrands.Voxelization.DensityScale.Raytracing" => {
            c.voxel.density_scale_raytracing = parse_f32(name, value)?
        }
        "r.HairStrands.Voxelization.DepthBiasScale.Shadow" => {
            c.voxel.depth_bias_scale_shadow = parse_f32(name, value)?
        }
        "r.HairStrands.Voxelization.DepthBiasScale.Transmittance" => {
            c.voxel.depth_bias_scale_transmittance = parse_f32(name, value)?
        }
        "r.HairStrands.Voxelization.DepthBiasScale.Environment" => {
            c.voxel.depth_bias_scale_environment = parse_f32(name, value)?
        }
        "r.HairStrands.Voxelization.SteppingScale" => {
            c.voxel.stepping_scale = parse_f32(name, value)?
        }
        "r.HairStrands.Voxelization.SteppingScale.Shadow" => {
            c.voxel.stepping_scale_shadow = parse_f32(name, value)?
        }
        "r.HairStrands.Voxelization.SteppingScale.Transmittance" => {
            c.voxel.stepping_scale_transmittance = parse_f32(name, value)?
        }
        "r.HairStrands.Voxelization.SteppingScale.Environment" => {
            c.voxel.stepping_scale_environment = parse_f32(name, value)?
        }
        "r.HairStrands.Voxelization.SteppingScale.Raytracing" => {
            c.voxel.stepping_scale_raytracing = parse_f32(name, value)?
        }
        "r.HairStrands.Voxelization.InjectOpaqueDepth" => {
            c.voxel.inject_opaque_depth = parse_bool(name, value)?
        }
        "r.HairStrands.Voxelization.InjectOpaque.BiasCount" => {
            c.voxel.inject_opaque_bias_count = parse_i32(name, value)?
        }
        "r.HairStrands.Voxelization.InjectOpaque.MarkCount" => {
            c.voxel.inject_opaque_mark_count = parse_i32(name, value)?
        }
        "r.HairStrands.Voxelization.Virtual.Jitter" => c.voxel.jitter_mode = parse_u32(name, value)?,
        "r.HairStrands.Voxelization.Virtual.MipPerPass" => {
            c.voxel.mips_per_pass = parse_u32(name, value)?
        }
        "r.HairStrands.Voxelization.Virtual.InvalidateEmptyPageIndex" => {
            c.voxel.invalidate_empty_page_index = parse_bool(name, value)?
        }
        "r.HairStrands.Voxelization.Virtual.Adaptive" => {
            c.voxel.adaptive_enabled = parse_bool(name, value)?
        }
        "r.HairStrands.Voxelization.Virtual.Adaptive.CorrectionSpeed" => {
            c.voxel.adaptive_correction_speed = parse_f32(name, value)?
        }
        "r.HairStrands.Voxelization.Virtual.Adaptive.CorrectionThreshold" => {
            c.voxel.adaptive_correction_threshold = parse_f32(name, value)?
        }
        "r.HairStrands.Voxelization.Raytracing.ShadowOcclusionThreshold" => {
            c.voxel.raytracing_shadow_occlusion_threshold = parse_f32(name, value)?
        }
        "r.HairStrands.Voxelization.Raytracing.SkyOcclusionThreshold" => {
            c.voxel.raytracing_sky_occlusion_threshold = parse_f32(name, value)?
        }

        "r.HairStrands.DeepShadow" => c.deep_shadow.enabled = parse_bool(name, value)?,
        "r.HairStrands.DeepShadow.Resolution" => {
            c.deep_shadow.slot_resolution = parse_u32(name, value)?
        }
        "r.HairStrands.DeepShadow.GPUDriven" => c.deep_shadow.gpu_driven = parse_bool(name, value)?,
        "r.HairStrands.DeepShadow.DepthBiasScale" => {
            c.deep_shadow.depth_bias_scale = parse_f32(name, value)?
        }
        "r.HairStrands.DeepShadow.DensityScale" => {
            c.deep_shadow.density_scale = parse_f32(name, value)?
        }
        "r.HairStrands.DeepShadow.LayerDistribution" => {
            c.deep_shadow.layer_distribution = parse_f32(name, value)?
        }
        "r.HairStrands.DeepShadow.KernelType" => {
            c.transmittance.deep_shadow_kernel =
                deep_shadow_kernel_from_index(parse_i32(name, value)? as i64)
        }
        "r.HairStrands.DeepShadow.KernelAperture" => {
            c.transmittance.deep_shadow_kernel_aperture = parse_f32(name, value)?
        }
        "r.HairStrands.Voxelization.ForceTransmittanceAndShadow" => {
            c.transmittance.force_voxel_transmittance_and_shadow = parse_bool(name, value)?
        }
        "r.HairStrands.Voxelization.Virtual.UseMipTraversal" => {
            c.transmittance.voxel_mip_traversal = parse_bool(name, value)?
        }

        _ => return Err(ConfigError::UnknownVariable(name.to_string())),
    }

    log::debug!("[console_variables::apply] {} = {}", name, value);
    Ok(())
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" => Ok(true),
        "0" | "false" | "off" => Ok(false),
        _ => Err(out_of_range(name, value, "expected 0 or 1")),
    }
}

fn parse_i32(name: &str, value: &str) -> Result<i32, ConfigError> {
    value
        .parse::<i32>()
        .map_err(|_| out_of_range(name, value, "expected an integer"))
}

fn parse_u32(name: &str, value: &str) -> Result<u32, ConfigError> {
    // Negative console input clamps to zero, as the sanitizer would
    parse_i32(name, value).map(|v| v.max(0) as u32)
}

fn parse_f32(name: &str, value: &str) -> Result<f32, ConfigError> {
    match value.parse::<f32>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(out_of_range(name, value, "expected a finite number")),
    }
}

fn out_of_range(name: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::OutOfRange {
        field: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::config_data::DeepShadowKernel;

    #[test]
    fn test_every_listed_variable_applies() {
        for (name, _) in CONSOLE_VARIABLES {
            let mut config = StrandsConfig::default();
            assert!(
                apply_console_variable(&mut config, name, "1").is_ok(),
                "{} was listed but not handled",
                name
            );
        }
    }

    #[test]
    fn test_apply_values() {
        let mut config = StrandsConfig::default();
        apply_console_variable(&mut config, "r.HairStrands.Voxelization.AABBScale", "1.5").unwrap();
        apply_console_variable(&mut config, "r.HairStrands.Visibility.PPLL", "1").unwrap();
        apply_console_variable(&mut config, "r.HairStrands.DeepShadow.KernelType", "4").unwrap();
        apply_console_variable(&mut config, "r.HairStrands.Cull.ForceLOD", "-1").unwrap();

        assert_eq!(config.voxel.aabb_scale, 1.5);
        assert!(config.visibility.ppll_enabled);
        assert_eq!(config.transmittance.deep_shadow_kernel, DeepShadowKernel::Pcss);
        assert_eq!(config.culling.force_lod, -1);
    }

    #[test]
    fn test_unknown_and_malformed() {
        let mut config = StrandsConfig::default();
        assert!(matches!(
            apply_console_variable(&mut config, "r.HairStrands.DoesNotExist", "1"),
            Err(ConfigError::UnknownVariable(_))
        ));
        assert!(matches!(
            apply_console_variable(&mut config, "r.HairStrands.Voxelization", "maybe"),
            Err(ConfigError::OutOfRange { .. })
        ));
        assert!(matches!(
            apply_console_variable(&mut config, "r.HairStrands.Voxelization.DensityScale", "nan"),
            Err(ConfigError::OutOfRange { .. })
        ));
    }
}
