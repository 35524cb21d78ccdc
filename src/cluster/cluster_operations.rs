//! Cluster Culling Operations - Pure DOP Functions
//!
//! Registers hair group instances for the frame and records the per-group
//! AABB update, culling, prefix-sum and compaction passes.

use super::cluster_data::*;
use crate::config::CullingConfig;
use crate::constants::cluster::*;
use crate::constants::gpu_limits::{DISPATCH_INDIRECT_ARGS_SIZE, DRAW_INDIRECT_ARGS_SIZE};
use crate::dispatch::{div_round_up, group_count_1d, group_count_2d};
use crate::error::{OptionExt, StrandsError, StrandsResult};
use crate::graph::*;
use crate::view::{create_view_uniform, view_uses_hzb, ViewInfo};
use std::sync::Arc;

/// Create the shared per-group data for a freshly streamed hair group
pub fn create_hair_group_public_data(
    key: HairGroupKey,
    control_point_count: u32,
    cluster_count: u32,
    lod_count: u32,
    buffers: HairGroupBuffers,
) -> HairGroupPublicData {
    HairGroupPublicData {
        key,
        control_point_count,
        cluster_count,
        lod_count,
        buffers,
        culled_vertex_id_count: control_point_count,
        culled_vertex_radius_scale_count: control_point_count,
        cluster_aabb_count: cluster_count.saturating_mul(AABB_U32_PER_CLUSTER),
        frame_state: parking_lot::Mutex::new(HairGroupFrameState {
            cluster_data_index: None,
            culling_result_available: false,
            lod_index: -1.0,
            lod_bias: 0.0,
            visible: true,
        }),
    }
}

/// Register one hair group for this frame, returning its cluster data index
pub fn add_instance_to_cluster_data(
    instance: HairGroupInstance,
    cluster_data: &mut ClusterData,
) -> StrandsResult<usize> {
    let public = Arc::clone(&instance.public_data);

    check_element_count(
        "CulledVertexIdBuffer",
        public.control_point_count,
        public.culled_vertex_id_count,
    )?;
    check_element_count(
        "CulledVertexRadiusScaleBuffer",
        public.control_point_count,
        public.culled_vertex_radius_scale_count,
    )?;
    check_element_count(
        "ClusterAABBBuffer",
        cluster_aabb_u32_count(public.cluster_count)?,
        public.cluster_aabb_count,
    )?;

    let mut state = public.frame_state.lock();
    let index = cluster_data.groups.len();
    cluster_data.groups.push(ClusterGroupData {
        instance,
        cluster_count: public.cluster_count,
        vertex_count: public.control_point_count,
        lod_index: state.lod_index,
        lod_bias: state.lod_bias,
        visible: state.visible,
        cull_state: None,
        outputs: None,
    });
    state.cluster_data_index = Some(index);
    state.culling_result_available = false;

    log::trace!(
        "[cluster_operations::add_instance_to_cluster_data] {:?} -> index {}",
        public.key,
        index
    );
    Ok(index)
}

fn check_element_count(resource: &str, expected: u32, found: u32) -> StrandsResult<()> {
    if expected != found {
        return Err(StrandsError::BufferSizeMismatch {
            resource: resource.to_string(),
            expected: expected as u64,
            found: found as u64,
        });
    }
    Ok(())
}

fn cluster_aabb_u32_count(cluster_count: u32) -> StrandsResult<u32> {
    cluster_count
        .checked_mul(AABB_U32_PER_CLUSTER)
        .ok_or_strands(|| StrandsError::BufferSizeMismatch {
            resource: "ClusterAABBBuffer".to_string(),
            expected: cluster_count as u64 * AABB_U32_PER_CLUSTER as u64,
            found: u32::MAX as u64,
        })
}

/// Forget last frame's registration of every group
pub fn end_cluster_frame(cluster_data: &ClusterData) {
    for group in &cluster_data.groups {
        let mut state = group.instance.public_data.frame_state.lock();
        state.cluster_data_index = None;
    }
}

/// Decide whether a group is culled or drawn in full
pub fn select_cull_state(
    config: &CullingConfig,
    group: &ClusterGroupData,
    params: &CullingParams,
) -> ClusterCullState {
    let forced_lod_zero = group.lod_index == 0.0 || config.force_lod == 0;
    let shadow_skip = params.is_shadow_view && !config.cull_shadow_views;

    if !config.enabled || params.skip_culling || forced_lod_zero || shadow_skip || !group.visible {
        ClusterCullState::Reset
    } else {
        ClusterCullState::Cull
    }
}

/// Import the persistent buffers of a group into the graph
pub fn import_cluster_group_buffers(
    graph: &mut FrameGraph,
    group: &ClusterGroupData,
) -> ClusterCullingOutputs {
    let public = &group.instance.public_data;
    let buffers = public.buffers;
    let storage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST;
    let indirect = storage | wgpu::BufferUsages::INDIRECT;

    let mut import = |id: ExternalBufferId, label: &str, element_size: u32, count: u32, usage| {
        import_buffer(
            graph,
            id,
            BufferDesc {
                label: label.to_string(),
                element_size,
                element_count: count,
                usage,
            },
        )
    };

    ClusterCullingOutputs {
        draw_indirect: import(
            buffers.draw_indirect,
            "Hair.DrawIndirectBuffer",
            DRAW_INDIRECT_ARGS_SIZE as u32,
            1,
            indirect,
        ),
        draw_indirect_raster_compute: import(
            buffers.draw_indirect_raster_compute,
            "Hair.DrawIndirectRasterComputeBuffer",
            DISPATCH_INDIRECT_ARGS_SIZE as u32,
            1,
            indirect,
        ),
        culled_vertex_id: import(
            buffers.culled_vertex_id,
            "Hair.CulledVertexIdBuffer",
            4,
            public.culled_vertex_id_count,
            storage,
        ),
        culled_vertex_radius_scale: import(
            buffers.culled_vertex_radius_scale,
            "Hair.CulledVertexRadiusScaleBuffer",
            4,
            public.culled_vertex_radius_scale_count,
            storage,
        ),
        cluster_aabb: import(
            buffers.cluster_aabb,
            "Hair.ClusterAABBBuffer",
            4,
            public.cluster_aabb_count,
            storage,
        ),
        group_aabb: import(
            buffers.group_aabb,
            "Hair.GroupAABBBuffer",
            4,
            AABB_U32_PER_MACRO_GROUP,
            storage,
        ),
    }
}

/// Import the read-only cluster description buffers of a group
pub fn import_cluster_inputs(graph: &mut FrameGraph, group: &ClusterGroupData) -> ClusterInputBuffers {
    let resources = group.instance.cluster_resources;
    let usage = wgpu::BufferUsages::STORAGE;
    let mut import = |id: ExternalBufferId, label: &str, element_size: u32, count: u32| {
        import_buffer(
            graph,
            id,
            BufferDesc {
                label: label.to_string(),
                element_size,
                element_count: count,
                usage,
            },
        )
    };

    ClusterInputBuffers {
        cluster_info: import(
            resources.cluster_info,
            "Hair.ClusterInfoBuffer",
            std::mem::size_of::<ClusterInfo>() as u32,
            group.cluster_count,
        ),
        cluster_lod_info: import(
            resources.cluster_lod_info,
            "Hair.ClusterLODInfoBuffer",
            std::mem::size_of::<ClusterLodInfo>() as u32,
            resources.cluster_lod_info_count,
        ),
        cluster_vertex_id: import(
            resources.cluster_vertex_id,
            "Hair.ClusterVertexIdBuffer",
            4,
            resources.cluster_vertex_id_count,
        ),
        position: import(resources.position, "Hair.PositionBuffer", 16, group.vertex_count),
    }
}

/// Record the cluster AABB update followed by the group AABB reduction
pub fn add_cluster_aabb_passes(
    graph: &mut FrameGraph,
    group: &ClusterGroupData,
    inputs: &ClusterInputBuffers,
    outputs: &ClusterCullingOutputs,
) -> StrandsResult<()> {
    if group.cluster_count == 0 {
        return Ok(());
    }

    let aabb_elements = buffer_desc(graph, outputs.cluster_aabb)?.element_count;
    check_element_count(
        "ClusterAABBBuffer",
        cluster_aabb_u32_count(group.cluster_count)?,
        aabb_elements,
    )?;

    let groups = group_count_2d("HairStrandsClusterAABB", group.cluster_count, CULLING_GROUP_SIZE)?;
    let mut params = ClusterAabbParams {
        local_to_world: group.instance.local_to_world.into(),
        cluster_count: group.cluster_count,
        vertex_count: group.vertex_count,
        dispatch_count_x: groups[0],
        mode: 0,
    };

    add_compute_pass(
        graph,
        "HairStrandsClusterAABB(UpdateClusterAABB)",
        KernelId::ClusterAabbUpdate,
        &params,
        vec![
            buffer_srv(inputs.position),
            buffer_srv(inputs.cluster_info),
            buffer_srv(inputs.cluster_lod_info),
            buffer_srv(inputs.cluster_vertex_id),
            buffer_uav(outputs.cluster_aabb),
        ],
        Dispatch::Direct(groups),
    )?;

    params.mode = 1;
    add_compute_pass(
        graph,
        "HairStrandsClusterAABB(UpdateGroupAABB)",
        KernelId::ClusterAabbUpdate,
        &params,
        vec![buffer_srv(outputs.cluster_aabb), buffer_uav(outputs.group_aabb)],
        Dispatch::Direct([1, 1, 1]),
    )
}

/// Record culling for every registered group of the view
pub fn add_cluster_culling_passes(
    graph: &mut FrameGraph,
    config: &CullingConfig,
    view: &ViewInfo,
    params: &CullingParams,
    cluster_data: &mut ClusterData,
) -> StrandsResult<()> {
    if cluster_data.groups.is_empty() {
        return Ok(());
    }

    let _span = tracing::debug_span!("HairStrandsClusterCulling").entered();
    begin_scope(graph, "HairStrandsClusterCulling");

    let use_hzb = view_uses_hzb(view, config.hzb_enabled);
    let mut culled = 0usize;

    for group in cluster_data.groups.iter_mut() {
        let outputs = import_cluster_group_buffers(graph, group);
        let inputs = import_cluster_inputs(graph, group);

        add_cluster_aabb_passes(graph, group, &inputs, &outputs)?;

        let state = select_cull_state(config, group, params);
        let culling_params = ClusterCullingParams {
            view: create_view_uniform(view, use_hzb),
            local_to_world: group.instance.local_to_world.into(),
            cluster_count: group.cluster_count,
            vertex_count: if group.visible { group.vertex_count } else { 0 },
            lod_index: group.lod_index,
            lod_bias: group.lod_bias + config.lod_bias,
            force_lod: config.force_lod,
            lod_count: group.instance.public_data.lod_count,
            prefix_sum_level: 0,
            is_shadow_view: params.is_shadow_view as u32,
        };

        match state {
            ClusterCullState::Reset => {
                add_compute_pass(
                    graph,
                    "HairStrandsClusterCullingPrepareReset",
                    KernelId::ClusterCullingPrepareReset,
                    &culling_params,
                    vec![
                        buffer_uav(outputs.draw_indirect),
                        buffer_uav(outputs.draw_indirect_raster_compute),
                    ],
                    Dispatch::Direct([1, 1, 1]),
                )?;
                group.instance.public_data.frame_state.lock().culling_result_available = false;
            }
            ClusterCullState::Cull => {
                let hzb = if use_hzb { view.hzb } else { None };
                add_cull_and_compact_passes(graph, group, &outputs, &inputs, culling_params, hzb)?;
                group.instance.public_data.frame_state.lock().culling_result_available = true;
                culled += 1;
            }
        }

        group.cull_state = Some(state);
        group.outputs = Some(outputs);
    }

    end_scope(graph);
    log::debug!(
        "[cluster_operations::add_cluster_culling_passes] {} groups, {} culled, hzb={}",
        cluster_data.groups.len(),
        culled,
        use_hzb
    );
    Ok(())
}

fn add_cull_and_compact_passes(
    graph: &mut FrameGraph,
    group: &ClusterGroupData,
    outputs: &ClusterCullingOutputs,
    inputs: &ClusterInputBuffers,
    mut params: ClusterCullingParams,
    hzb: Option<TextureHandle>,
) -> StrandsResult<()> {
    let cluster_count = group.cluster_count;

    let cull_groups = group_count_1d("HairStrandsClusterCulling", cluster_count, CULLING_GROUP_SIZE)?;
    let level0_count = cluster_count;
    let level1_count = div_round_up(level0_count, PREFIX_SUM_BLOCK_SIZE);
    let level2_count = div_round_up(level1_count, PREFIX_SUM_BLOCK_SIZE);
    let level0_groups =
        group_count_1d("HairStrandsClusterPrefixSum(L0)", level0_count, PREFIX_SUM_BLOCK_SIZE)?;
    let level1_groups =
        group_count_1d("HairStrandsClusterPrefixSum(L1)", level1_count, PREFIX_SUM_BLOCK_SIZE)?;
    let level2_groups =
        group_count_1d("HairStrandsClusterPrefixSum(L2)", level2_count, PREFIX_SUM_BLOCK_SIZE)?;

    let cluster_vertex_count =
        create_structured_buffer(graph, "Hair.ClusterVertexCount", 4, cluster_count.max(1));
    let cluster_lod =
        create_structured_buffer(graph, "Hair.ClusterSelectedLOD", 4, cluster_count.max(1));
    let visible_counter = create_structured_buffer(graph, "Hair.VisibleClusterCounter", 4, 1);
    let visible_cluster_id =
        create_structured_buffer(graph, "Hair.VisibleClusterId", 4, cluster_count.max(1));
    let level_offsets = [
        create_structured_buffer(graph, "Hair.ClusterPrefixSumL0", 4, level0_count.max(1)),
        create_structured_buffer(graph, "Hair.ClusterPrefixSumL1", 4, level1_count.max(1)),
        create_structured_buffer(graph, "Hair.ClusterPrefixSumL2", 4, level2_count.max(1)),
    ];
    let compaction_args = create_dispatch_args_buffer(graph, "Hair.ClusterCompactionArgs", 1);

    add_clear_buffer_pass(graph, "HairStrandsClusterCullingClearCounter", visible_counter, 0)?;

    let mut cull_bindings = vec![
        buffer_srv(inputs.cluster_info),
        buffer_srv(inputs.cluster_lod_info),
        buffer_srv(outputs.cluster_aabb),
        buffer_uav(cluster_vertex_count),
        buffer_uav(cluster_lod),
        buffer_uav(visible_cluster_id),
        buffer_uav(visible_counter),
    ];
    if let Some(hzb) = hzb {
        cull_bindings.push(texture_srv(hzb));
    }
    add_compute_pass(
        graph,
        "HairStrandsClusterCulling",
        KernelId::ClusterCulling,
        &params,
        cull_bindings,
        Dispatch::Direct(cull_groups),
    )?;

    add_compute_pass(
        graph,
        "HairStrandsClusterCullingPrepareIndirectArgs",
        KernelId::ClusterCullingPrepareIndirectArgs,
        &params,
        vec![buffer_srv(visible_counter), buffer_uav(compaction_args)],
        Dispatch::Direct([1, 1, 1]),
    )?;

    let levels = [
        (KernelId::ClusterPrefixSumLevel0, "HairStrandsClusterPrefixSum(L0)", level0_groups, cluster_vertex_count),
        (KernelId::ClusterPrefixSumLevel1, "HairStrandsClusterPrefixSum(L1)", level1_groups, level_offsets[0]),
        (KernelId::ClusterPrefixSumLevel2, "HairStrandsClusterPrefixSum(L2)", level2_groups, level_offsets[1]),
    ];
    for (level, (kernel, name, groups, input)) in levels.into_iter().enumerate() {
        params.prefix_sum_level = level as u32;
        add_compute_pass(
            graph,
            name,
            kernel,
            &params,
            vec![buffer_srv(input), buffer_uav(level_offsets[level])],
            Dispatch::Direct(groups),
        )?;
    }

    add_compute_pass(
        graph,
        "HairStrandsClusterCullingCompactVertexIds",
        KernelId::ClusterCompactVertexIds,
        &params,
        vec![
            buffer_srv(visible_cluster_id),
            buffer_srv(visible_counter),
            buffer_srv(cluster_lod),
            buffer_srv(inputs.cluster_info),
            buffer_srv(inputs.cluster_lod_info),
            buffer_srv(inputs.cluster_vertex_id),
            buffer_srv(level_offsets[0]),
            buffer_srv(level_offsets[1]),
            buffer_srv(level_offsets[2]),
            buffer_uav(outputs.culled_vertex_id),
            buffer_uav(outputs.culled_vertex_radius_scale),
        ],
        Dispatch::Indirect {
            args: compaction_args,
            offset: 0,
        },
    )?;

    add_compute_pass(
        graph,
        "HairStrandsClusterCullingUpdateDrawArgs",
        KernelId::ClusterUpdateDrawArgs,
        &params,
        vec![
            buffer_srv(level_offsets[0]),
            buffer_srv(level_offsets[1]),
            buffer_srv(level_offsets[2]),
            buffer_srv(cluster_vertex_count),
            buffer_uav(outputs.draw_indirect),
            buffer_uav(outputs.draw_indirect_raster_compute),
        ],
        Dispatch::Direct([1, 1, 1]),
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::view::view_operations::tests::test_view;
    use cgmath::{Matrix4, SquareMatrix};

    pub(crate) fn test_public_data(
        resource_id: u64,
        group_index: u32,
        control_point_count: u32,
        cluster_count: u32,
    ) -> Arc<HairGroupPublicData> {
        let base = resource_id * 100 + group_index as u64 * 10;
        Arc::new(create_hair_group_public_data(
            HairGroupKey {
                resource_id,
                group_index,
            },
            control_point_count,
            cluster_count,
            2,
            HairGroupBuffers {
                draw_indirect: ExternalBufferId(base),
                draw_indirect_raster_compute: ExternalBufferId(base + 1),
                cluster_aabb: ExternalBufferId(base + 2),
                group_aabb: ExternalBufferId(base + 3),
                culled_vertex_id: ExternalBufferId(base + 4),
                culled_vertex_radius_scale: ExternalBufferId(base + 5),
            },
        ))
    }

    pub(crate) fn test_instance(public_data: Arc<HairGroupPublicData>) -> HairGroupInstance {
        let base = public_data.buffers.draw_indirect.0 + 6;
        HairGroupInstance {
            cluster_resources: HairClusterResources {
                cluster_info: ExternalBufferId(base),
                cluster_lod_info: ExternalBufferId(base + 1),
                cluster_vertex_id: ExternalBufferId(base + 2),
                position: ExternalBufferId(base + 3),
                cluster_lod_info_count: public_data.cluster_count * 2,
                cluster_vertex_id_count: public_data.control_point_count * 2,
            },
            public_data,
            local_to_world: Matrix4::identity(),
            lod_screen_sizes: vec![0.5, 0.1],
        }
    }

    #[test]
    fn test_register_sets_cluster_data_index() {
        let mut cluster_data = ClusterData::default();
        let a = test_public_data(1, 0, 1000, 10);
        let b = test_public_data(1, 1, 500, 5);
        assert_eq!(add_instance_to_cluster_data(test_instance(a.clone()), &mut cluster_data).unwrap(), 0);
        assert_eq!(add_instance_to_cluster_data(test_instance(b.clone()), &mut cluster_data).unwrap(), 1);
        assert_eq!(a.frame_state.lock().cluster_data_index, Some(0));
        assert_eq!(b.frame_state.lock().cluster_data_index, Some(1));

        end_cluster_frame(&cluster_data);
        assert_eq!(a.frame_state.lock().cluster_data_index, None);
    }

    #[test]
    fn test_register_rejects_overflowing_cluster_count() {
        let mut cluster_data = ClusterData::default();
        let public = test_public_data(3, 0, 100, u32::MAX / 4);
        let result = add_instance_to_cluster_data(test_instance(public), &mut cluster_data);
        assert!(matches!(
            result,
            Err(StrandsError::BufferSizeMismatch { ref resource, .. }) if resource == "ClusterAABBBuffer"
        ));
        assert!(cluster_data.groups.is_empty());
    }

    #[test]
    fn test_register_rejects_mismatched_culled_buffer() {
        let mut public = create_hair_group_public_data(
            HairGroupKey {
                resource_id: 9,
                group_index: 0,
            },
            100,
            4,
            1,
            test_public_data(9, 0, 100, 4).buffers,
        );
        public.culled_vertex_id_count = 99;
        let result = add_instance_to_cluster_data(test_instance(Arc::new(public)), &mut ClusterData::default());
        assert!(matches!(result, Err(StrandsError::BufferSizeMismatch { .. })));
    }

    #[test]
    fn test_select_cull_state() {
        let mut cluster_data = ClusterData::default();
        add_instance_to_cluster_data(test_instance(test_public_data(1, 0, 100, 2)), &mut cluster_data).unwrap();
        let group = &mut cluster_data.groups[0];
        let config = CullingConfig::default();
        let params = CullingParams::default();

        assert_eq!(select_cull_state(&config, group, &params), ClusterCullState::Cull);

        let skip = CullingParams {
            skip_culling: true,
            ..Default::default()
        };
        assert_eq!(select_cull_state(&config, group, &skip), ClusterCullState::Reset);

        let disabled = CullingConfig {
            enabled: false,
            ..Default::default()
        };
        assert_eq!(select_cull_state(&disabled, group, &params), ClusterCullState::Reset);

        group.lod_index = 0.0;
        assert_eq!(select_cull_state(&config, group, &params), ClusterCullState::Reset);
    }

    #[test]
    fn test_culling_passes_for_cull_and_reset() {
        let mut cluster_data = ClusterData::default();
        add_instance_to_cluster_data(test_instance(test_public_data(1, 0, 1000, 20)), &mut cluster_data).unwrap();
        add_instance_to_cluster_data(test_instance(test_public_data(2, 0, 1000, 20)), &mut cluster_data).unwrap();
        cluster_data.groups[1].lod_index = 0.0;

        let mut graph = create_frame_graph("test");
        let view = test_view();
        add_cluster_culling_passes(
            &mut graph,
            &CullingConfig::default(),
            &view,
            &CullingParams::default(),
            &mut cluster_data,
        )
        .unwrap();

        assert_eq!(cluster_data.groups[0].cull_state, Some(ClusterCullState::Cull));
        assert_eq!(cluster_data.groups[1].cull_state, Some(ClusterCullState::Reset));
        assert_eq!(passes_named(&graph, "HairStrandsClusterCulling").len(), 6);
        assert_eq!(passes_named(&graph, "HairStrandsClusterCullingPrepareReset").len(), 1);
        assert_eq!(passes_named(&graph, "HairStrandsClusterPrefixSum").len(), 3);
        assert_eq!(passes_named(&graph, "HairStrandsClusterAABB").len(), 4);
        assert!(cluster_data.groups.iter().all(|g| g.outputs.is_some()));
        assert!(cluster_data.groups[0]
            .instance
            .public_data
            .frame_state
            .lock()
            .culling_result_available);
    }

    #[test]
    fn test_cluster_count_over_dispatch_limit_fails() {
        let huge = 65535 * 512 + 1;
        let mut cluster_data = ClusterData::default();
        add_instance_to_cluster_data(test_instance(test_public_data(1, 0, huge, huge)), &mut cluster_data).unwrap();

        let mut graph = create_frame_graph("test");
        let result = add_cluster_culling_passes(
            &mut graph,
            &CullingConfig::default(),
            &test_view(),
            &CullingParams::default(),
            &mut cluster_data,
        );
        assert!(matches!(result, Err(StrandsError::DispatchLimitExceeded { .. })));
    }
}
