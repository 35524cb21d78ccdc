//! Hair transmittance per light
//!
//! Each light picks deep shadow sampling when it owns an atlas slot, voxel
//! ray marching otherwise, and contributes no hair shadow when neither
//! exists.

use super::deep_shadow_data::*;
use crate::config::{deep_shadow_kernel_index, StrandsConfig, TransmittanceConfig};
use crate::error::StrandsResult;
use crate::graph::*;
use crate::visibility::VisibilityData;
use crate::voxel::{virtual_voxel_resources_valid, VirtualVoxelResources};

/// Transmittance path of `light_id` for this frame
pub fn select_transmittance_path(
    light_id: u32,
    deep_shadows: &DeepShadowResources,
    voxel_valid: bool,
    config: &TransmittanceConfig,
) -> TransmittancePath {
    let slot = deep_shadows
        .datas
        .iter()
        .find(|data| data.light_id == light_id)
        .map(|data| data.atlas_slot_index);

    match slot {
        Some(slot) if !config.force_voxel_transmittance_and_shadow && deep_shadows.layers_atlas.is_some() => {
            TransmittancePath::DeepShadow { slot }
        }
        _ if voxel_valid => TransmittancePath::Voxel,
        _ => TransmittancePath::None,
    }
}

fn slot_mask(light_id: u32, deep_shadows: &DeepShadowResources) -> u32 {
    deep_shadows
        .datas
        .iter()
        .filter(|data| data.light_id == light_id)
        .fold(0u32, |mask, data| mask | (1u32 << data.atlas_slot_index))
}

/// Record one transmittance dispatch per light that has a path
///
/// The dispatch covers the compacted visibility nodes through the node
/// indirect args; lights without a path get no mask.
pub fn add_transmittance_passes(
    graph: &mut FrameGraph,
    config: &StrandsConfig,
    visibility: &VisibilityData,
    voxels: &VirtualVoxelResources,
    deep_shadows: &DeepShadowResources,
    lights: &[LightData],
) -> StrandsResult<Vec<TransmittanceMask>> {
    let (Some(node_data), Some(node_coord), Some(args)) =
        (visibility.node_data, visibility.node_coord, visibility.node_indirect_args)
    else {
        return Ok(Vec::new());
    };

    let voxel_valid = virtual_voxel_resources_valid(voxels);
    let transmittance = &config.transmittance;
    let mut masks = Vec::new();

    begin_scope(graph, "HairStrandsTransmittance");

    for light in lights {
        let path = select_transmittance_path(light.light_id, deep_shadows, voxel_valid, transmittance);
        let (kernel, path_index, resource_bindings) = match path {
            TransmittancePath::None => {
                log::debug!(
                    "[transmittance::add_transmittance_passes] light {} has no hair shadow",
                    light.light_id
                );
                continue;
            }
            TransmittancePath::DeepShadow { .. } => {
                let (Some(front_depth), Some(layers), Some(transforms)) = (
                    deep_shadows.front_depth_atlas,
                    deep_shadows.layers_atlas,
                    deep_shadows.world_to_light_buffer,
                ) else {
                    continue;
                };
                (
                    KernelId::TransmittanceDeepShadow,
                    0,
                    vec![texture_srv(front_depth), texture_srv(layers), buffer_srv(transforms)],
                )
            }
            TransmittancePath::Voxel => {
                let (Some(page_texture), Some(page_index), Some(node_desc)) =
                    (voxels.page_texture, voxels.page_index_buffer, voxels.node_desc_buffer)
                else {
                    continue;
                };
                (
                    KernelId::TransmittanceVoxel,
                    1,
                    vec![texture_srv(page_texture), buffer_srv(page_index), buffer_srv(node_desc)],
                )
            }
        };

        let (light_direction, light_position) = light_vectors(light);
        let params = TransmittanceParams {
            voxel: voxels.parameters,
            light_direction,
            light_position,
            atlas_resolution: deep_shadows.atlas_resolution,
            max_node_count: visibility.max_node_count,
            path: path_index,
            light_id: light.light_id,
            slot_mask: slot_mask(light.light_id, deep_shadows),
            kernel_type: deep_shadow_kernel_index(transmittance.deep_shadow_kernel),
            kernel_aperture: transmittance.deep_shadow_kernel_aperture.max(0.0),
            voxel_mip_traversal: transmittance.voxel_mip_traversal as u32,
            deep_shadow_depth_bias_scale: config.deep_shadow.depth_bias_scale.max(0.0),
            deep_shadow_density_scale: config.deep_shadow.density_scale.max(0.0),
            layer_distribution: config.deep_shadow.layer_distribution.clamp(0.0, 1.0),
        };

        let mask = create_structured_buffer(graph, "Hair.TransmittanceNodeData", 4, visibility.max_node_count.max(1));
        let mut bindings = vec![buffer_srv(node_data), buffer_srv(node_coord)];
        bindings.extend(resource_bindings);
        bindings.push(buffer_uav(mask));

        add_compute_pass(
            graph,
            "HairStrandsTransmittanceMask",
            kernel,
            &params,
            bindings,
            Dispatch::Indirect { args, offset: 0 },
        )?;
        extract_buffer(graph, mask)?;

        masks.push(TransmittanceMask {
            light_id: light.light_id,
            path,
            mask,
        });
    }

    end_scope(graph);

    log::debug!(
        "[transmittance::add_transmittance_passes] {} of {} lights shadowed by hair",
        masks.len(),
        lights.len()
    );

    Ok(masks)
}

fn light_vectors(light: &LightData) -> ([f32; 4], [f32; 4]) {
    match light.kind {
        LightKind::Directional { direction } => ([direction.x, direction.y, direction.z, 0.0], [0.0, 0.0, 0.0, 1.0]),
        LightKind::Point { position, range } => ([0.0, 0.0, 0.0, range], [position.x, position.y, position.z, 0.0]),
        LightKind::Spot {
            position,
            direction,
            range,
            ..
        }
        | LightKind::Rect {
            position,
            direction,
            range,
        } => (
            [direction.x, direction.y, direction.z, range],
            [position.x, position.y, position.z, 0.0],
        ),
    }
}
