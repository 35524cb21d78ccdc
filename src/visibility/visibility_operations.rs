//! Visibility Operations - Pure DOP Functions
//!
//! Mode selection, sample budgets and the pass recording of the visibility
//! buffer: fragment capture, per-pixel compaction, node indirect args.

use super::visibility_data::*;
use crate::cluster::{ClusterCullingOutputs, ClusterData};
use crate::config::{snap_down, VisibilityConfig};
use crate::constants::visibility::*;
use crate::dispatch::group_count_tiles;
use crate::error::StrandsResult;
use crate::graph::*;
use crate::macro_group::{culled_strands_outputs, MacroGroupDatas};
use crate::view::{create_view_uniform, screen_rect_is_empty, screen_rect_size, PlatformCaps, ViewInfo};

/// Pick the fragment capture mode once from configuration and device support
pub fn select_render_mode(config: &VisibilityConfig, caps: &PlatformCaps) -> VisibilityRenderMode {
    if config.ppll_enabled && snap_down(config.ppll_max_node_per_pixel, &PPLL_NODE_COUNTS) > 0 {
        VisibilityRenderMode::Ppll
    } else if config.compute_raster_enabled && caps.supports_atomic_u64 {
        VisibilityRenderMode::ComputeRaster
    } else {
        VisibilityRenderMode::Msaa
    }
}

fn legal_sample_counts(mode: VisibilityRenderMode) -> &'static [u32] {
    match mode {
        VisibilityRenderMode::Msaa => &MSAA_SAMPLE_COUNTS,
        VisibilityRenderMode::Ppll => &PPLL_NODE_COUNTS,
        VisibilityRenderMode::ComputeRaster => &COMPUTE_RASTER_LAYER_COUNTS,
    }
}

/// Worst-case samples per pixel, snapped to the mode's legal set
pub fn max_sample_per_pixel(config: &VisibilityConfig, mode: VisibilityRenderMode) -> u32 {
    let requested = match mode {
        VisibilityRenderMode::Msaa => config.msaa_sample_count,
        VisibilityRenderMode::Ppll => config.ppll_max_node_per_pixel,
        VisibilityRenderMode::ComputeRaster => config.compute_raster_sample_count,
    };
    snap_down(requested, legal_sample_counts(mode))
}

/// Average samples per pixel used for node budgets, never above the max
pub fn mean_sample_per_pixel(config: &VisibilityConfig, mode: VisibilityRenderMode) -> u32 {
    let requested = match mode {
        VisibilityRenderMode::Msaa => config.msaa_mean_sample_count,
        VisibilityRenderMode::Ppll => config.ppll_mean_node_per_pixel,
        VisibilityRenderMode::ComputeRaster => config.compute_raster_mean_sample_count,
    };
    let max = max_sample_per_pixel(config, mode);
    snap_down(requested.min(max), legal_sample_counts(mode))
}

/// Compacted node budget of a view, saturating at `u32::MAX`
pub fn max_node_count(resolution: [u32; 2], mean_sample_count: u32) -> u32 {
    let count = resolution[0] as u64 * resolution[1] as u64 * mean_sample_count as u64;
    count.min(u32::MAX as u64) as u32
}

fn render_mode_index(mode: VisibilityRenderMode) -> u32 {
    match mode {
        VisibilityRenderMode::Msaa => 0,
        VisibilityRenderMode::Ppll => 1,
        VisibilityRenderMode::ComputeRaster => 2,
    }
}

/// Strands draws of every macro group, tagged with the macro group id
fn visibility_draw_list(
    macro_groups: &MacroGroupDatas,
    cluster_data: &ClusterData,
) -> Vec<(u32, ClusterCullingOutputs)> {
    macro_groups
        .datas
        .iter()
        .flat_map(|data| {
            culled_strands_outputs(data, cluster_data)
                .into_iter()
                .map(move |outputs| (data.macro_group_id, outputs))
        })
        .collect()
}

/// Record the visibility stage of a view
///
/// `mode` comes from `select_render_mode` at renderer construction. Returns
/// the empty `VisibilityData` when nothing is on screen.
pub fn add_visibility_passes(
    graph: &mut FrameGraph,
    config: &VisibilityConfig,
    mode: VisibilityRenderMode,
    view: &ViewInfo,
    macro_groups: &MacroGroupDatas,
    cluster_data: &ClusterData,
) -> StrandsResult<VisibilityData> {
    if macro_groups.datas.is_empty() || screen_rect_is_empty(&macro_groups.union_screen_rect) {
        log::debug!("[visibility_operations::add_visibility_passes] Empty hair rect, skipping");
        return Ok(VisibilityData::default());
    }

    let _span = tracing::debug_span!("HairStrandsVisibility").entered();
    begin_scope(graph, "HairStrandsVisibility");

    let resolution = screen_rect_size(&view.view_rect);
    let max_sample_count = max_sample_per_pixel(config, mode);
    let mean_sample_count = mean_sample_per_pixel(config, mode);
    // A zero PPLL mean budgets the worst case
    let budget_sample_count = if mean_sample_count == 0 {
        max_sample_count.max(1)
    } else {
        mean_sample_count
    };
    let node_budget = max_node_count(resolution, budget_sample_count);

    let mut params = VisibilityParams {
        view: create_view_uniform(view, false),
        resolution,
        max_sample_count,
        mean_sample_count,
        max_node_count: node_budget,
        material_compaction: config.material_compaction_enabled as u32,
        depth_threshold: config.material_compaction_depth_threshold,
        tangent_cos_threshold: config
            .material_compaction_tangent_threshold_degrees
            .to_radians()
            .cos(),
        macro_group_id: 0,
        render_mode: render_mode_index(mode),
        clear_value: 0,
        _padding: 0,
    };

    let storage = wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING;
    let node_index = create_texture_2d(
        graph,
        "Hair.CompactNodeIndex",
        resolution,
        wgpu::TextureFormat::R32Uint,
        storage,
    );
    let categorization_texture = create_texture_2d(
        graph,
        "Hair.CategorizationTexture",
        resolution,
        wgpu::TextureFormat::Rgba32Uint,
        storage,
    );
    let velocity_texture = create_texture_2d(
        graph,
        "Hair.VelocityTexture",
        resolution,
        wgpu::TextureFormat::Rg16Float,
        storage,
    );
    let node_data = create_structured_buffer(
        graph,
        "Hair.CompactNodeData",
        std::mem::size_of::<CompactNodeData>() as u32,
        node_budget.max(1),
    );
    let node_coord = create_structured_buffer(graph, "Hair.CompactNodeCoord", 4, node_budget.max(1));
    let node_counter = create_structured_buffer(graph, "Hair.CompactNodeCounter", 4, 1);
    let node_indirect_args = create_dispatch_args_buffer(graph, "Hair.CompactNodeIndirectArgs", 1);

    add_clear_buffer_pass(graph, "HairStrandsVisibilityClearCounter", node_counter, 0)?;

    let draws = visibility_draw_list(macro_groups, cluster_data);
    let compaction_inputs = match mode {
        VisibilityRenderMode::Msaa => {
            add_msaa_capture_passes(graph, &mut params, resolution, max_sample_count, &draws)?
        }
        VisibilityRenderMode::Ppll => {
            add_ppll_capture_passes(graph, &mut params, resolution, config, &draws)?
        }
        VisibilityRenderMode::ComputeRaster => {
            add_compute_raster_capture_passes(graph, &mut params, resolution, max_sample_count, &draws)?
        }
    };

    let (compaction_name, compaction_kernel) = match mode {
        VisibilityRenderMode::Msaa => ("HairStrandsVisibilityCompaction(MSAA)", KernelId::VisibilityMsaaCompaction),
        VisibilityRenderMode::Ppll => ("HairStrandsVisibilityCompaction(PPLL)", KernelId::VisibilityPpllCompaction),
        VisibilityRenderMode::ComputeRaster => (
            "HairStrandsVisibilityCompaction(ComputeRaster)",
            KernelId::VisibilityComputeRasterCompaction,
        ),
    };

    let mut bindings = compaction_inputs;
    bindings.extend([
        texture_uav(node_index),
        texture_uav(categorization_texture),
        buffer_uav(node_data),
        buffer_uav(node_coord),
        buffer_uav(node_counter),
    ]);
    params.clear_value = 0;
    add_compute_pass(
        graph,
        compaction_name,
        compaction_kernel,
        &params,
        bindings,
        Dispatch::Direct(group_count_tiles(compaction_name, resolution, PIXEL_TILE_SIZE)?),
    )?;

    add_compute_pass(
        graph,
        "HairStrandsVisibilityPrepareNodeArgs",
        KernelId::VisibilityPrepareNodeArgs,
        &params,
        vec![buffer_srv(node_counter), buffer_uav(node_indirect_args)],
        Dispatch::Direct([1, 1, 1]),
    )?;

    for buffer in [node_data, node_coord, node_counter, node_indirect_args] {
        extract_buffer(graph, buffer)?;
    }
    for texture in [node_index, categorization_texture] {
        extract_texture(graph, texture)?;
    }

    end_scope(graph);
    log::debug!(
        "[visibility_operations::add_visibility_passes] {:?} {}x{}, samples {}/{}, {} nodes, {} draws",
        mode,
        resolution[0],
        resolution[1],
        mean_sample_count,
        max_sample_count,
        node_budget,
        draws.len()
    );

    Ok(VisibilityData {
        render_mode: mode,
        resolution,
        max_sample_count,
        mean_sample_count,
        max_node_count: node_budget,
        categorization_texture: Some(categorization_texture),
        node_index: Some(node_index),
        node_data: Some(node_data),
        node_coord: Some(node_coord),
        node_counter: Some(node_counter),
        node_indirect_args: Some(node_indirect_args),
        velocity_texture: Some(velocity_texture),
    })
}

fn hair_viewport(resolution: [u32; 2]) -> [u32; 4] {
    [0, 0, resolution[0], resolution[1]]
}

/// MSAA id + depth targets, one raster pass per hair group
fn add_msaa_capture_passes(
    graph: &mut FrameGraph,
    params: &mut VisibilityParams,
    resolution: [u32; 2],
    sample_count: u32,
    draws: &[(u32, ClusterCullingOutputs)],
) -> StrandsResult<Vec<Binding>> {
    let msaa_texture = |graph: &mut FrameGraph, label: &str, format| {
        create_texture(
            graph,
            TextureDesc {
                label: label.to_string(),
                size: wgpu::Extent3d {
                    width: resolution[0].max(1),
                    height: resolution[1].max(1),
                    depth_or_array_layers: 1,
                },
                dimension: wgpu::TextureDimension::D2,
                format,
                mip_level_count: 1,
                sample_count,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            },
        )
    };
    let id_texture = msaa_texture(graph, "Hair.VisibilityIDTexture", wgpu::TextureFormat::R32Uint);
    let depth_texture = msaa_texture(graph, "Hair.VisibilityDepthTexture", wgpu::TextureFormat::Depth32Float);

    for (index, (macro_group_id, outputs)) in draws.iter().enumerate() {
        let first = index == 0;
        params.macro_group_id = *macro_group_id;
        add_raster_pass(
            graph,
            "HairStrandsVisibilityMSAA",
            KernelId::VisibilityMsaaRaster,
            &*params,
            vec![
                buffer_srv(outputs.culled_vertex_id),
                buffer_srv(outputs.culled_vertex_radius_scale),
            ],
            RasterTargets {
                viewport: hair_viewport(resolution),
                color: vec![ColorAttachment {
                    texture: id_texture,
                    clear: first.then_some([INVALID_PRIMITIVE_ID as f64, 0.0, 0.0, 0.0]),
                }],
                depth: Some(DepthAttachment {
                    texture: depth_texture,
                    clear_depth: first.then_some(1.0),
                }),
            },
            vec![Draw::Indirect {
                args: outputs.draw_indirect,
                offset: 0,
            }],
        )?;
    }

    Ok(vec![texture_srv(id_texture), texture_srv(depth_texture)])
}

/// Linked-list heads cleared to end-of-list, then appended by the raster
fn add_ppll_capture_passes(
    graph: &mut FrameGraph,
    params: &mut VisibilityParams,
    resolution: [u32; 2],
    config: &VisibilityConfig,
    draws: &[(u32, ClusterCullingOutputs)],
) -> StrandsResult<Vec<Binding>> {
    let mean = mean_sample_per_pixel(config, VisibilityRenderMode::Ppll).max(1);
    let ppll_budget = max_node_count(resolution, mean);

    let heads = create_texture_2d(
        graph,
        "Hair.PPLLNodeIndex",
        resolution,
        wgpu::TextureFormat::R32Uint,
        wgpu::TextureUsages::STORAGE_BINDING,
    );
    let nodes = create_structured_buffer(
        graph,
        "Hair.PPLLNodeData",
        std::mem::size_of::<PpllNode>() as u32,
        ppll_budget.max(1),
    );
    let counter = create_structured_buffer(graph, "Hair.PPLLCounter", 4, 1);

    add_clear_buffer_pass(graph, "HairStrandsVisibilityPPLLClearCounter", counter, 0)?;
    params.clear_value = PPLL_END_OF_LIST;
    add_compute_pass(
        graph,
        "HairStrandsVisibilityPPLLClearHeads",
        KernelId::VisibilityClearTexture,
        &*params,
        vec![texture_uav(heads)],
        Dispatch::Direct(group_count_tiles("HairStrandsVisibilityPPLLClearHeads", resolution, PIXEL_TILE_SIZE)?),
    )?;

    params.max_node_count = ppll_budget;
    for (macro_group_id, outputs) in draws {
        params.macro_group_id = *macro_group_id;
        add_raster_pass(
            graph,
            "HairStrandsVisibilityPPLL",
            KernelId::VisibilityPpllRaster,
            &*params,
            vec![
                buffer_srv(outputs.culled_vertex_id),
                buffer_srv(outputs.culled_vertex_radius_scale),
                texture_uav(heads),
                buffer_uav(nodes),
                buffer_uav(counter),
            ],
            RasterTargets {
                viewport: hair_viewport(resolution),
                color: Vec::new(),
                depth: None,
            },
            vec![Draw::Indirect {
                args: outputs.draw_indirect,
                offset: 0,
            }],
        )?;
    }
    params.max_node_count = max_node_count(resolution, params.mean_sample_count);

    Ok(vec![texture_srv(heads), buffer_srv(nodes), buffer_srv(counter)])
}

/// Layered visibility textures written with 64-bit atomic min
fn add_compute_raster_capture_passes(
    graph: &mut FrameGraph,
    params: &mut VisibilityParams,
    resolution: [u32; 2],
    layer_count: u32,
    draws: &[(u32, ClusterCullingOutputs)],
) -> StrandsResult<Vec<Binding>> {
    let layers: Vec<TextureHandle> = (0..layer_count.max(1))
        .map(|layer| {
            create_texture_2d(
                graph,
                &format!("Hair.VisibilityTexture{}", layer),
                resolution,
                wgpu::TextureFormat::Rg32Uint,
                wgpu::TextureUsages::STORAGE_BINDING,
            )
        })
        .collect();

    params.clear_value = u32::MAX;
    add_compute_pass(
        graph,
        "HairStrandsVisibilityComputeRasterClear",
        KernelId::VisibilityClearTexture,
        &*params,
        layers.iter().copied().map(texture_uav).collect(),
        Dispatch::Direct(group_count_tiles(
            "HairStrandsVisibilityComputeRasterClear",
            resolution,
            PIXEL_TILE_SIZE,
        )?),
    )?;

    for (macro_group_id, outputs) in draws {
        params.macro_group_id = *macro_group_id;
        let mut bindings = vec![
            buffer_srv(outputs.culled_vertex_id),
            buffer_srv(outputs.culled_vertex_radius_scale),
        ];
        bindings.extend(layers.iter().copied().map(texture_uav));
        add_compute_pass(
            graph,
            "HairStrandsVisibilityComputeRaster",
            KernelId::VisibilityComputeRaster,
            &*params,
            bindings,
            Dispatch::Indirect {
                args: outputs.draw_indirect_raster_compute,
                offset: 0,
            },
        )?;
    }

    Ok(layers.into_iter().map(texture_srv).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::bounds_from_sphere;
    use crate::cluster::cluster_operations::tests::{test_instance, test_public_data};
    use crate::cluster::{add_cluster_culling_passes, add_instance_to_cluster_data, CullingParams};
    use crate::config::CullingConfig;
    use crate::macro_group::{build_macro_groups, HairGeometry, HairMeshBatch};
    use crate::view::view_operations::tests::test_view;
    use cgmath::Point3;

    fn caps(atomic64: bool) -> PlatformCaps {
        PlatformCaps {
            supports_atomic_u64: atomic64,
            ..Default::default()
        }
    }

    fn scene(center_z: f32) -> (FrameGraph, MacroGroupDatas, ClusterData) {
        let view = test_view();
        let mut cluster_data = ClusterData::default();
        let mut batches = Vec::new();
        for resource_id in 1..=2 {
            let public = test_public_data(resource_id, 0, 256, 4);
            add_instance_to_cluster_data(test_instance(public.clone()), &mut cluster_data).unwrap();
            batches.push(HairMeshBatch {
                primitive_id: resource_id as u32,
                bounds: bounds_from_sphere(Point3::new(0.0, 0.0, center_z), 50.0),
                material_id: 0,
                geometry: HairGeometry::Strands(public),
            });
        }
        let mut graph = create_frame_graph("test");
        add_cluster_culling_passes(
            &mut graph,
            &CullingConfig::default(),
            &view,
            &CullingParams::default(),
            &mut cluster_data,
        )
        .unwrap();
        let macro_groups = build_macro_groups(&view, &batches);
        (graph, macro_groups, cluster_data)
    }

    #[test]
    fn test_mode_selection() {
        let mut config = VisibilityConfig::default();
        assert_eq!(select_render_mode(&config, &caps(true)), VisibilityRenderMode::Msaa);

        config.compute_raster_enabled = true;
        assert_eq!(select_render_mode(&config, &caps(true)), VisibilityRenderMode::ComputeRaster);
        assert_eq!(select_render_mode(&config, &caps(false)), VisibilityRenderMode::Msaa);

        config.ppll_enabled = true;
        assert_eq!(select_render_mode(&config, &caps(false)), VisibilityRenderMode::Ppll);

        config.ppll_max_node_per_pixel = 0;
        assert_eq!(select_render_mode(&config, &caps(true)), VisibilityRenderMode::ComputeRaster);
    }

    #[test]
    fn test_mean_never_above_max() {
        let modes = [
            VisibilityRenderMode::Msaa,
            VisibilityRenderMode::Ppll,
            VisibilityRenderMode::ComputeRaster,
        ];
        for max in 0..40 {
            for mean in 0..40 {
                let config = VisibilityConfig {
                    msaa_sample_count: max,
                    msaa_mean_sample_count: mean,
                    ppll_max_node_per_pixel: max,
                    ppll_mean_node_per_pixel: mean,
                    compute_raster_sample_count: max,
                    compute_raster_mean_sample_count: mean,
                    ..Default::default()
                };
                for mode in modes {
                    let max_samples = max_sample_per_pixel(&config, mode);
                    let mean_samples = mean_sample_per_pixel(&config, mode);
                    assert!(mean_samples <= max_samples, "{:?} {} {}", mode, max, mean);
                    assert!(legal_sample_counts(mode).contains(&max_samples));
                    assert!(legal_sample_counts(mode).contains(&mean_samples));
                }
            }
        }
    }

    #[test]
    fn test_max_node_count() {
        assert_eq!(max_node_count([1920, 1080], 2), 1920 * 1080 * 2);
        assert_eq!(max_node_count([100_000, 100_000], 8), u32::MAX);
    }

    #[test]
    fn test_empty_rect_skips_stage() {
        let (mut graph, macro_groups, cluster_data) = scene(500.0);
        let before = graph.passes.len();
        let data = add_visibility_passes(
            &mut graph,
            &VisibilityConfig::default(),
            VisibilityRenderMode::Msaa,
            &test_view(),
            &macro_groups,
            &cluster_data,
        )
        .unwrap();
        assert_eq!(data, VisibilityData::default());
        assert_eq!(graph.passes.len(), before);
    }

    #[test]
    fn test_msaa_passes() {
        let (mut graph, macro_groups, cluster_data) = scene(-500.0);
        let data = add_visibility_passes(
            &mut graph,
            &VisibilityConfig::default(),
            VisibilityRenderMode::Msaa,
            &test_view(),
            &macro_groups,
            &cluster_data,
        )
        .unwrap();

        assert_eq!(data.render_mode, VisibilityRenderMode::Msaa);
        assert_eq!(data.max_sample_count, 4);
        assert_eq!(data.mean_sample_count, 2);
        assert_eq!(data.max_node_count, 1920 * 1080 * 2);
        assert_eq!(passes_named(&graph, "HairStrandsVisibilityMSAA").len(), 2);
        assert_eq!(passes_named(&graph, "HairStrandsVisibilityCompaction(MSAA)").len(), 1);
        assert_eq!(passes_named(&graph, "HairStrandsVisibilityPrepareNodeArgs").len(), 1);
        let args = data.node_indirect_args.unwrap();
        assert!(graph.buffers[args.0 as usize].extracted);
    }

    #[test]
    fn test_ppll_zero_mean_budgets_max_nodes() {
        let (mut graph, macro_groups, cluster_data) = scene(-500.0);
        let config = VisibilityConfig {
            ppll_enabled: true,
            ppll_mean_node_per_pixel: 4,
            ..Default::default()
        };
        let data =
            add_visibility_passes(&mut graph, &config, VisibilityRenderMode::Ppll, &test_view(), &macro_groups, &cluster_data)
                .unwrap();
        assert_eq!(data.mean_sample_count, 0);
        assert!(PPLL_NODE_COUNTS.contains(&data.mean_sample_count));
        assert_eq!(data.max_sample_count, 16);
        assert_eq!(data.max_node_count, 1920 * 1080 * 16);
    }

    #[test]
    fn test_ppll_and_compute_raster_passes() {
        let (mut graph, macro_groups, cluster_data) = scene(-500.0);
        let config = VisibilityConfig {
            ppll_enabled: true,
            ..Default::default()
        };
        let data =
            add_visibility_passes(&mut graph, &config, VisibilityRenderMode::Ppll, &test_view(), &macro_groups, &cluster_data)
                .unwrap();
        assert_eq!(data.render_mode, VisibilityRenderMode::Ppll);
        assert_eq!(data.mean_sample_count, 8);
        assert_eq!(passes_named(&graph, "HairStrandsVisibilityPPLLClearHeads").len(), 1);
        assert_eq!(passes_named(&graph, "HairStrandsVisibilityPPLL").len(), 4);

        let (mut graph, macro_groups, cluster_data) = scene(-500.0);
        let config = VisibilityConfig {
            compute_raster_enabled: true,
            ..Default::default()
        };
        let data =
            add_visibility_passes(&mut graph, &config, VisibilityRenderMode::ComputeRaster, &test_view(), &macro_groups, &cluster_data)
                .unwrap();
        assert_eq!(data.render_mode, VisibilityRenderMode::ComputeRaster);
        let raster = passes_named(&graph, "HairStrandsVisibilityComputeRaster");
        // clear + one dispatch per hair group
        assert_eq!(raster.len(), 3);
        assert!(matches!(
            raster[1].kind,
            PassKind::Compute {
                dispatch: Dispatch::Indirect { .. },
                ..
            }
        ));
    }
}
