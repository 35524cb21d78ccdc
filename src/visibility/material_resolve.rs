//! Material and velocity resolve
//!
//! Runs after compaction: material evaluation over the used nodes only
//! (indirect dispatch from the node counter) and the hair velocity write.

use super::visibility_data::VisibilityData;
use crate::config::VisibilityConfig;
use crate::constants::visibility::PIXEL_TILE_SIZE;
use crate::dispatch::group_count_tiles;
use crate::error::StrandsResult;
use crate::graph::*;
use crate::view::{create_view_uniform, ViewInfo, ViewUniform};
use bytemuck::{Pod, Zeroable};

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MaterialResolveParams {
    pub view: ViewUniform,
    pub resolution: [u32; 2],
    pub max_node_count: u32,
    /// Pixels below this coverage keep the opaque velocity; 0 always writes
    pub velocity_coverage_threshold: f32,
}

static_assertions::const_assert_eq!(std::mem::size_of::<MaterialResolveParams>() % 16, 0);

/// Outputs of the resolve, consumed by lighting and TAA
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialResolveOutputs {
    /// One packed material record per compacted node
    pub node_material: BufferHandle,
    pub velocity: TextureHandle,
}

/// Whether a pixel with `coverage` writes hair motion vectors
pub fn should_write_velocity(coverage: f32, threshold: f32) -> bool {
    threshold <= 0.0 || coverage >= threshold
}

/// Record material evaluation and velocity output
///
/// Returns `None` when the visibility stage was skipped.
pub fn add_material_resolve_passes(
    graph: &mut FrameGraph,
    config: &VisibilityConfig,
    view: &ViewInfo,
    visibility: &VisibilityData,
) -> StrandsResult<Option<MaterialResolveOutputs>> {
    let (Some(node_data), Some(node_coord), Some(args), Some(velocity), Some(categorization)) = (
        visibility.node_data,
        visibility.node_coord,
        visibility.node_indirect_args,
        visibility.velocity_texture,
        visibility.categorization_texture,
    ) else {
        return Ok(None);
    };

    begin_scope(graph, "HairStrandsMaterialResolve");

    let params = MaterialResolveParams {
        view: create_view_uniform(view, false),
        resolution: visibility.resolution,
        max_node_count: visibility.max_node_count,
        velocity_coverage_threshold: config.write_velocity_coverage_threshold.max(0.0),
    };

    let node_material = create_structured_buffer(
        graph,
        "Hair.CompactNodeMaterial",
        16,
        visibility.max_node_count.max(1),
    );

    add_compute_pass(
        graph,
        "HairStrandsMaterialPass",
        KernelId::MaterialResolve,
        &params,
        vec![
            buffer_srv(node_data),
            buffer_srv(node_coord),
            buffer_uav(node_material),
        ],
        Dispatch::Indirect { args, offset: 0 },
    )?;

    add_compute_pass(
        graph,
        "HairStrandsVelocityPass",
        KernelId::VelocityResolve,
        &params,
        vec![
            texture_srv(categorization),
            buffer_srv(node_data),
            texture_uav(velocity),
        ],
        Dispatch::Direct(group_count_tiles(
            "HairStrandsVelocityPass",
            visibility.resolution,
            PIXEL_TILE_SIZE,
        )?),
    )?;

    extract_buffer(graph, node_material)?;
    extract_texture(graph, velocity)?;
    end_scope(graph);

    Ok(Some(MaterialResolveOutputs {
        node_material,
        velocity,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::view_operations::tests::test_view;

    #[test]
    fn test_velocity_threshold() {
        assert!(should_write_velocity(0.0, 0.0));
        assert!(should_write_velocity(0.01, 0.0));
        assert!(!should_write_velocity(0.2, 0.5));
        assert!(should_write_velocity(0.5, 0.5));
    }

    #[test]
    fn test_skipped_visibility_records_nothing() {
        let mut graph = create_frame_graph("test");
        let outputs = add_material_resolve_passes(
            &mut graph,
            &VisibilityConfig::default(),
            &test_view(),
            &VisibilityData::default(),
        )
        .unwrap();
        assert!(outputs.is_none());
        assert!(graph.passes.is_empty());
    }

    #[test]
    fn test_material_pass_is_indirect() {
        let mut graph = create_frame_graph("test");
        let resolution = [64, 32];
        let storage = wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING;
        let visibility = VisibilityData {
            resolution,
            max_node_count: 64 * 32 * 2,
            node_data: Some(create_structured_buffer(&mut graph, "NodeData", 16, 4096)),
            node_coord: Some(create_structured_buffer(&mut graph, "NodeCoord", 4, 4096)),
            node_indirect_args: Some(create_dispatch_args_buffer(&mut graph, "Args", 1)),
            velocity_texture: Some(create_texture_2d(
                &mut graph,
                "Velocity",
                resolution,
                wgpu::TextureFormat::Rg16Float,
                storage,
            )),
            categorization_texture: Some(create_texture_2d(
                &mut graph,
                "Categorization",
                resolution,
                wgpu::TextureFormat::Rgba32Uint,
                storage,
            )),
            ..Default::default()
        };

        let outputs = add_material_resolve_passes(
            &mut graph,
            &VisibilityConfig::default(),
            &test_view(),
            &visibility,
        )
        .unwrap()
        .unwrap();

        let material = passes_named(&graph, "HairStrandsMaterialPass");
        assert!(matches!(
            material[0].kind,
            PassKind::Compute {
                dispatch: Dispatch::Indirect { .. },
                ..
            }
        ));
        let velocity = passes_named(&graph, "HairStrandsVelocityPass");
        assert!(matches!(
            velocity[0].kind,
            PassKind::Compute {
                dispatch: Dispatch::Direct([8, 4, 1]),
                ..
            }
        ));
        assert!(graph.buffers[outputs.node_material.0 as usize].extracted);
    }
}
