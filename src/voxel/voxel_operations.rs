//! Voxel Operations - Pure DOP Functions
//!
//! Virtual voxel structure of a view: page index sizing per macro group, the
//! physical page pool, and the passes that allocate, voxelize, inject opaque
//! depth and build the per-page mip chain.

use super::adaptive_voxel::update_adaptive_voxel_size;
use super::voxel_data::*;
use crate::bounds::{aabb_center, aabb_scaled, aabb_size, bounds_aabb, create_aabb, AABB};
use crate::cluster::{ClusterCullingOutputs, ClusterData};
use crate::config::{round_voxel_world_size, snap_mips_per_pass, snap_page_resolution, VoxelConfig};
use crate::constants::cluster::AABB_U32_PER_MACRO_GROUP;
use crate::constants::gpu_limits::DISPATCH_INDIRECT_ARGS_SIZE;
use crate::constants::voxel::*;
use crate::dispatch::group_count_1d;
use crate::error::{StrandsError, StrandsResult};
use crate::graph::*;
use crate::macro_group::{HairGeometry, MacroGroupData, MacroGroupDatas};
use crate::view::{create_view_uniform, PlatformCaps, ViewInfo};
use cgmath::{Matrix4, Point3, Vector3};

/// Scatter entries reserved per cluster for GPU-driven page marking
const SCATTER_ENTRIES_PER_CLUSTER: u32 = 8;

/// Size of one packed voxelization view info (24 floats)
const VOXELIZATION_VIEW_INFO_SIZE: u32 = 96;

/// Density scale of a lighting feature; negative overrides fall back to the
/// global scale
pub fn voxel_density_scale(config: &VoxelConfig, context: UsageContext) -> f32 {
    let global = config.density_scale.max(0.0);
    let override_scale = match context {
        UsageContext::Ao => config.density_scale_ao,
        UsageContext::Shadow => config.density_scale_shadow,
        UsageContext::Transmittance => config.density_scale_transmittance,
        UsageContext::Environment => config.density_scale_environment,
        UsageContext::Raytracing => config.density_scale_raytracing,
    };
    if override_scale >= 0.0 {
        override_scale
    } else {
        global
    }
}

/// Ray origin offset, in voxels, toward the light
///
/// AO marches like environment lighting; raytracing like shadows.
pub fn voxel_depth_bias_scale(config: &VoxelConfig, context: UsageContext) -> f32 {
    let bias = match context {
        UsageContext::Shadow | UsageContext::Raytracing => config.depth_bias_scale_shadow,
        UsageContext::Transmittance => config.depth_bias_scale_transmittance,
        UsageContext::Environment | UsageContext::Ao => config.depth_bias_scale_environment,
    };
    bias.max(0.0)
}

/// Ray marching step multiplier in [1, 10]
pub fn voxel_stepping_scale(config: &VoxelConfig, context: UsageContext) -> f32 {
    let override_scale = match context {
        UsageContext::Shadow => config.stepping_scale_shadow,
        UsageContext::Transmittance => config.stepping_scale_transmittance,
        UsageContext::Environment | UsageContext::Ao => config.stepping_scale_environment,
        UsageContext::Raytracing => config.stepping_scale_raytracing,
    };
    let scale = if override_scale >= 0.0 {
        override_scale
    } else {
        config.stepping_scale
    };
    scale.clamp(MIN_STEPPING_SCALE, MAX_STEPPING_SCALE)
}

/// World size covered by one page
pub fn page_world_size(voxel_world_size: f32, page_resolution: u32) -> f32 {
    voxel_world_size * page_resolution as f32
}

/// Mips of one page: `log2(page_resolution) + 1`
pub fn page_texture_mip_count(page_resolution: u32) -> u32 {
    page_resolution.max(1).trailing_zeros() + 1
}

fn pages_covering(extent: f32, page_world_size: f32) -> Option<u32> {
    let ideal = (extent as f64 / page_world_size as f64).ceil().max(1.0);
    if !(ideal <= MAX_PAGE_INDEX_RESOLUTION_PER_AXIS as f64) {
        return None;
    }
    let mut pages = ideal as u32;
    // Guard against ceil landing one page short after rounding
    while pages < MAX_PAGE_INDEX_RESOLUTION_PER_AXIS && (pages as f32) * page_world_size < extent {
        pages += 1;
    }
    Some(pages)
}

/// Page index block covering `bounds` scaled about its center
///
/// The block starts at the scaled minimum and grows outward to whole pages,
/// at least one per axis, so it never clips the scaled bounds. Axes wider
/// than `MAX_PAGE_INDEX_RESOLUTION_PER_AXIS` pages are clamped and clip.
pub fn compute_page_index_allocation(bounds: &AABB, aabb_scale: f32, page_world_size: f32) -> PageIndexAllocation {
    let scaled = aabb_scaled(bounds, aabb_scale.clamp(MIN_AABB_SCALE, MAX_AABB_SCALE));
    let size = aabb_size(&scaled);

    let covering = [
        pages_covering(size.x, page_world_size),
        pages_covering(size.y, page_world_size),
        pages_covering(size.z, page_world_size),
    ];
    if covering.iter().any(Option::is_none) {
        log::warn!(
            "[voxel_operations::compute_page_index_allocation] bounds {:?} need more than {} pages per axis at page size {}, clamping",
            size,
            MAX_PAGE_INDEX_RESOLUTION_PER_AXIS,
            page_world_size
        );
    }
    let resolution = covering.map(|pages| pages.unwrap_or(MAX_PAGE_INDEX_RESOLUTION_PER_AXIS));
    let snapped_size = Vector3::new(
        resolution[0] as f32 * page_world_size,
        resolution[1] as f32 * page_world_size,
        resolution[2] as f32 * page_world_size,
    );
    let count = resolution
        .iter()
        .fold(1u64, |count, &pages| count.saturating_mul(pages as u64))
        .min(u32::MAX as u64) as u32;

    PageIndexAllocation {
        macro_group_id: 0,
        world_aabb: create_aabb(scaled.min, scaled.min + snapped_size),
        page_index_resolution: resolution,
        count,
        offset: 0,
    }
}

/// Page index blocks of every macro group, laid out back to back
///
/// Returns the blocks and the page index count to allocate. GPU-driven
/// allocation may size blocks from GPU bounds, so its total is at least
/// `max_page_index_resolution^3`.
pub fn layout_page_index_allocations(
    macro_groups: &MacroGroupDatas,
    config: &VoxelConfig,
    page_world_size: f32,
) -> (Vec<PageIndexAllocation>, u32) {
    let mut offset = 0u32;
    let allocations = macro_groups
        .datas
        .iter()
        .map(|data| {
            let allocation = PageIndexAllocation {
                macro_group_id: data.macro_group_id,
                offset,
                ..compute_page_index_allocation(&bounds_aabb(&data.bounds), config.aabb_scale, page_world_size)
            };
            offset = offset.saturating_add(allocation.count);
            allocation
        })
        .collect();

    let total = if config.gpu_driven {
        offset.max(config.gpu_driven_max_page_index_resolution.saturating_pow(3))
    } else {
        offset
    };
    (allocations, total)
}

/// Where the page index allocation kernel reads the bounds of a block
pub fn page_index_bounds_source(
    config: &VoxelConfig,
    macro_groups: &MacroGroupDatas,
    allocation: &PageIndexAllocation,
) -> BoundsSource {
    match macro_groups.aabb_buffer {
        Some(buffer) if config.gpu_driven => BoundsSource::Gpu {
            buffer,
            offset: allocation.macro_group_id * AABB_U32_PER_MACRO_GROUP,
        },
        _ => BoundsSource::Cpu(allocation.world_aabb),
    }
}

/// Shared voxel parameters for this frame
pub fn compute_voxel_common_parameters(
    config: &VoxelConfig,
    voxel_world_size: f32,
    node_desc_count: u32,
    page_index_count: u32,
) -> VoxelCommonParameters {
    let page_count_per_dim = config.page_count_per_dim.max(1);
    let page_resolution = snap_page_resolution(config.page_resolution);
    let page_count = (page_count_per_dim as u64).pow(3).min(u32::MAX as u64) as u32;
    let texture_resolution = page_count_per_dim * page_resolution;

    VoxelCommonParameters {
        page_count_resolution: [page_count_per_dim; 3],
        page_count,
        page_texture_resolution: [texture_resolution; 3],
        page_resolution,
        voxel_world_size: round_voxel_world_size(voxel_world_size),
        jitter_mode: config.jitter_mode.min(MAX_JITTER_MODE),
        indirect_dispatch_group_size: INDIRECT_DISPATCH_GROUP_SIZE,
        node_desc_count,
        page_index_count,
        density_scale: config.density_scale.max(0.0),
        density_scale_ao: voxel_density_scale(config, UsageContext::Ao),
        density_scale_shadow: voxel_density_scale(config, UsageContext::Shadow),
        density_scale_transmittance: voxel_density_scale(config, UsageContext::Transmittance),
        density_scale_environment: voxel_density_scale(config, UsageContext::Environment),
        density_scale_raytracing: voxel_density_scale(config, UsageContext::Raytracing),
        depth_bias_scale_shadow: voxel_depth_bias_scale(config, UsageContext::Shadow),
        depth_bias_scale_transmittance: voxel_depth_bias_scale(config, UsageContext::Transmittance),
        depth_bias_scale_environment: voxel_depth_bias_scale(config, UsageContext::Environment),
        stepping_scale_shadow: voxel_stepping_scale(config, UsageContext::Shadow),
        stepping_scale_transmittance: voxel_stepping_scale(config, UsageContext::Transmittance),
        stepping_scale_environment: voxel_stepping_scale(config, UsageContext::Environment),
        stepping_scale_raytracing: voxel_stepping_scale(config, UsageContext::Raytracing),
        raytracing_shadow_occlusion_threshold: config.raytracing_shadow_occlusion_threshold.max(0.0),
        raytracing_sky_occlusion_threshold: config.raytracing_sky_occlusion_threshold.max(0.0),
    }
}

/// True once the page texture of the view exists
pub fn virtual_voxel_resources_valid(resources: &VirtualVoxelResources) -> bool {
    resources.page_texture.is_some() && resources.page_index_buffer.is_some()
}

/// Orthographic projection along the axis whose face has the most voxels
pub fn compute_voxel_raster_setup(
    allocation: &PageIndexAllocation,
    page_resolution: u32,
    gpu_driven: bool,
) -> VoxelRasterSetup {
    let [x, y, z] = allocation.page_index_resolution.map(|r| r * page_resolution);
    let area_xy = x as u64 * y as u64;
    let area_xz = x as u64 * z as u64;
    let area_yz = y as u64 * z as u64;

    let size = aabb_size(&allocation.world_aabb);
    let (resolution, direction, up, projection_size) = if area_xy >= area_xz && area_xy >= area_yz {
        ([x, y], Vector3::new(0.0, 0.0, 1.0), Vector3::unit_y(), size)
    } else if area_xz >= area_xy && area_xz >= area_yz {
        (
            [x, z],
            Vector3::new(0.0, -1.0, 0.0),
            Vector3::unit_z(),
            Vector3::new(size.x, size.z, size.y),
        )
    } else {
        (
            [y, z],
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::unit_z(),
            Vector3::new(size.y, size.z, size.x),
        )
    };

    let viewport_resolution = if gpu_driven {
        [GPU_DRIVEN_RASTER_RESOLUTION; 2]
    } else {
        resolution
    };

    let center = aabb_center(&allocation.world_aabb);
    let eye: Point3<f32> = center - direction * (projection_size.z * 0.5);
    let look_at = Matrix4::look_at_rh(eye, center, up);
    let ortho = cgmath::ortho(
        -0.5 * projection_size.x,
        0.5 * projection_size.x,
        -0.5 * projection_size.y,
        0.5 * projection_size.y,
        0.0,
        projection_size.z.max(f32::EPSILON),
    );

    VoxelRasterSetup {
        viewport_resolution,
        direction,
        up,
        projection_size,
        world_to_clip: ortho * look_at,
    }
}

/// Strands primitives of a macro group with this frame's culling outputs
fn voxelized_strands(data: &MacroGroupData, cluster_data: &ClusterData) -> Vec<(u32, ClusterCullingOutputs)> {
    data.primitives
        .iter()
        .filter_map(|primitive| match &primitive.geometry {
            HairGeometry::Strands(public_data) => {
                let index = public_data.frame_state.lock().cluster_data_index?;
                let group = cluster_data.groups.get(index)?;
                group.outputs.map(|outputs| (group.cluster_count, outputs))
            }
            _ => None,
        })
        .collect()
}

fn point4(point: Point3<f32>) -> [f32; 4] {
    [point.x, point.y, point.z, 0.0]
}

fn allocation_params(
    common: &VoxelCommonParameters,
    allocation: &PageIndexAllocation,
    macro_group_count: u32,
    total_page_index_count: u32,
    gpu_driven: bool,
) -> VoxelAllocationParams {
    let [rx, ry, rz] = allocation.page_index_resolution;
    VoxelAllocationParams {
        common: *common,
        cpu_min_aabb: point4(allocation.world_aabb.min),
        cpu_max_aabb: point4(allocation.world_aabb.max),
        cpu_page_index_resolution: [rx, ry, rz, allocation.count],
        macro_group_id: allocation.macro_group_id,
        macro_group_count,
        page_world_size: page_world_size(common.voxel_world_size, common.page_resolution),
        total_page_index_count,
        cpu_page_index_offset: allocation.offset,
        max_cluster_count: 0,
        max_scatter_count: 0,
        gpu_driven: gpu_driven as u32,
    }
}

/// Size the page pool, allocate the page index structure and record the
/// page allocation passes
///
/// Returns invalid resources when voxelization is off or the view has no
/// macro group.
pub fn allocate_virtual_voxel_resources(
    graph: &mut FrameGraph,
    config: &VoxelConfig,
    view: &ViewInfo,
    macro_groups: &MacroGroupDatas,
    cluster_data: &ClusterData,
    adaptive: &mut AdaptiveVoxelState,
) -> StrandsResult<VirtualVoxelResources> {
    if !config.enabled || macro_groups.datas.is_empty() {
        return Ok(VirtualVoxelResources::default());
    }

    let _span = tracing::debug_span!("HairStrandsAllocateVoxelPages").entered();

    let page_count_per_dim = config.page_count_per_dim.max(1);
    let page_count = (page_count_per_dim as u64).pow(3).min(u32::MAX as u64) as u32;
    let voxel_world_size = update_adaptive_voxel_size(adaptive, config, page_count);

    let page_resolution = snap_page_resolution(config.page_resolution);
    let pws = page_world_size(voxel_world_size, page_resolution);
    let (allocations, total_page_index_count) = layout_page_index_allocations(macro_groups, config, pws);
    if total_page_index_count == 0 {
        return Err(StrandsError::Internal {
            message: "virtual voxel layout produced no page index".to_string(),
        });
    }

    let macro_group_count = macro_groups.datas.len() as u32;
    let common = compute_voxel_common_parameters(config, voxel_world_size, macro_group_count, total_page_index_count);

    begin_scope(graph, "HairStrandsAllocateVoxelPages");

    let page_index_buffer = create_structured_buffer(graph, "Hair.PageIndexBuffer", 4, total_page_index_count);
    let page_index_occupancy_buffer =
        create_structured_buffer(graph, "Hair.PageIndexOccupancyBuffer", 8, total_page_index_count);
    let page_index_coord_buffer = create_structured_buffer(graph, "Hair.PageIndexCoordBuffer", 4, total_page_index_count);
    let page_index_global_counter = create_structured_buffer(graph, "Hair.PageIndexGlobalCounter", 4, 2);
    let node_desc_buffer = create_structured_buffer(graph, "Hair.VirtualVoxelNodeDescBuffer", 32, macro_group_count);
    let indirect_args_buffer =
        create_dispatch_args_buffer(graph, "Hair.VirtualVoxelIndirectArgsBuffer", macro_group_count);
    let page_to_page_index_buffer = create_structured_buffer(graph, "Hair.PageToPageIndexBuffer", 4, page_count);
    let voxelization_view_info_buffer = create_structured_buffer(
        graph,
        "Hair.VoxelizationViewInfo",
        VOXELIZATION_VIEW_INFO_SIZE,
        macro_group_count,
    );
    let page_index_resolution_and_offset_buffer =
        create_structured_buffer(graph, "Hair.PageIndexResolutionAndOffsetBuffer", 16, macro_group_count);
    let page_index_allocation_indirect_args =
        create_dispatch_args_buffer(graph, "Hair.PageIndexAllocationIndirectBufferArgs", macro_group_count);
    let total_requested_page_allocation =
        create_structured_buffer(graph, "Hair.TotalRequestedPageAllocationBuffer", 4, 1);

    add_clear_buffer_pass(graph, "HairStrandsClearTotalRequestedPages", total_requested_page_allocation, 0)?;
    add_clear_buffer_pass(graph, "HairStrandsClearPageIndex", page_index_buffer, 0)?;
    add_clear_buffer_pass(graph, "HairStrandsClearPageIndexOccupancy", page_index_occupancy_buffer, 0)?;
    add_clear_buffer_pass(graph, "HairStrandsClearPageIndexGlobalCounter", page_index_global_counter, 0)?;

    // One dispatch sizes every block from the bounds it can see
    let mut bindings = Vec::new();
    let first_source = page_index_bounds_source(config, macro_groups, &allocations[0]);
    if let BoundsSource::Gpu { buffer, .. } = first_source {
        bindings.push(buffer_srv(buffer));
    }
    bindings.extend([
        buffer_uav(page_index_resolution_and_offset_buffer),
        buffer_uav(voxelization_view_info_buffer),
        buffer_uav(page_index_allocation_indirect_args),
    ]);
    let gpu_bounds = matches!(first_source, BoundsSource::Gpu { .. });
    add_compute_pass(
        graph,
        "HairStrandsAllocatePageIndex",
        KernelId::VoxelAllocatePageIndex,
        &allocation_params(&common, &allocations[0], macro_group_count, total_page_index_count, gpu_bounds),
        bindings,
        Dispatch::Direct([1, 1, 1]),
    )?;

    let strands: Vec<Vec<(u32, ClusterCullingOutputs)>> = macro_groups
        .datas
        .iter()
        .map(|data| voxelized_strands(data, cluster_data))
        .collect();
    let total_cluster_count: u32 = strands
        .iter()
        .flatten()
        .map(|(cluster_count, _)| *cluster_count)
        .fold(0u32, u32::saturating_add);
    let max_scatter_count = total_cluster_count
        .saturating_mul(SCATTER_ENTRIES_PER_CLUSTER)
        .max(1);

    let scatter = if gpu_bounds {
        let counter = create_structured_buffer(graph, "Hair.PageScatterCounter", 4, 1);
        let entries = create_structured_buffer(graph, "Hair.PageScatterBuffer", 8, max_scatter_count);
        let args = create_dispatch_args_buffer(graph, "Hair.PageScatterIndirectArgs", 1);
        Some((counter, entries, args))
    } else {
        None
    };

    for (allocation, group_strands) in allocations.iter().zip(&strands) {
        let mut params =
            allocation_params(&common, allocation, macro_group_count, total_page_index_count, gpu_bounds);
        let source = page_index_bounds_source(config, macro_groups, allocation);

        match scatter {
            Some((counter, entries, args)) => {
                add_clear_buffer_pass(graph, "HairStrandsClearPageScatterCounter", counter, 0)?;
                params.max_scatter_count = max_scatter_count;
                for (cluster_count, outputs) in group_strands {
                    params.max_cluster_count = *cluster_count;
                    let mut bindings = vec![
                        buffer_srv(outputs.cluster_aabb),
                        buffer_srv(page_index_resolution_and_offset_buffer),
                        buffer_uav(counter),
                        buffer_uav(entries),
                        buffer_uav(page_index_buffer),
                    ];
                    if let BoundsSource::Gpu { buffer, .. } = source {
                        bindings.push(buffer_srv(buffer));
                    }
                    add_compute_pass(
                        graph,
                        "HairStrandsMarkValidPageIndex_Prepare",
                        KernelId::VoxelMarkValidPrepare,
                        &params,
                        bindings,
                        Dispatch::Direct(group_count_1d(
                            "HairStrandsMarkValidPageIndex_Prepare",
                            *cluster_count,
                            MARK_VALID_GROUP_SIZE,
                        )?),
                    )?;
                }
                add_compute_pass(
                    graph,
                    "HairStrandsMarkValidPageIndex_IndirectArgs",
                    KernelId::VoxelMarkValidIndirectArgs,
                    &params,
                    vec![buffer_srv(counter), buffer_uav(args)],
                    Dispatch::Direct([1, 1, 1]),
                )?;
                add_compute_pass(
                    graph,
                    "HairStrandsMarkValidPageIndex_Scatter",
                    KernelId::VoxelMarkValidScatter,
                    &params,
                    vec![
                        buffer_srv(page_index_resolution_and_offset_buffer),
                        buffer_srv(counter),
                        buffer_srv(entries),
                        buffer_uav(page_index_buffer),
                    ],
                    Dispatch::Indirect { args, offset: 0 },
                )?;
            }
            None => {
                // Without scatter the prepare kernel writes the page index
                // buffer directly
                for (cluster_count, outputs) in group_strands {
                    params.max_cluster_count = *cluster_count;
                    add_compute_pass(
                        graph,
                        "HairStrandsMarkValidPageIndex",
                        KernelId::VoxelMarkValidPrepare,
                        &params,
                        vec![buffer_srv(outputs.cluster_aabb), buffer_uav(page_index_buffer)],
                        Dispatch::Direct(group_count_1d(
                            "HairStrandsMarkValidPageIndex",
                            *cluster_count,
                            MARK_VALID_GROUP_SIZE,
                        )?),
                    )?;
                }
            }
        }

        // Node desc reads the global counter before this group's pages are
        // allocated, so it must come first
        add_compute_pass(
            graph,
            "HairStrandsAddNodeDesc",
            KernelId::VoxelAddNodeDesc,
            &params,
            vec![
                buffer_srv(page_index_resolution_and_offset_buffer),
                buffer_uav(node_desc_buffer),
            ],
            Dispatch::Direct([1, 1, 1]),
        )?;

        let allocate_dispatch = if gpu_bounds {
            Dispatch::Indirect {
                args: page_index_allocation_indirect_args,
                offset: DISPATCH_INDIRECT_ARGS_SIZE * allocation.macro_group_id as u64,
            }
        } else {
            Dispatch::Direct(group_count_1d(
                "HairStrandsAllocateVoxelPage",
                allocation.count,
                ALLOCATION_GROUP_SIZE,
            )?)
        };
        add_compute_pass(
            graph,
            "HairStrandsAllocateVoxelPage",
            KernelId::VoxelAllocatePages,
            &params,
            vec![
                buffer_srv(page_index_resolution_and_offset_buffer),
                buffer_uav(page_index_global_counter),
                buffer_uav(page_index_buffer),
                buffer_uav(page_to_page_index_buffer),
                buffer_uav(page_index_coord_buffer),
            ],
            allocate_dispatch,
        )?;

        add_compute_pass(
            graph,
            "HairStrandsBuildVoxelIndirectArgs",
            KernelId::VoxelBuildIndirectArgs,
            &params,
            vec![
                buffer_uav(page_index_global_counter),
                buffer_uav(indirect_args_buffer),
                buffer_uav(total_requested_page_allocation),
            ],
            Dispatch::Direct([1, 1, 1]),
        )?;
    }

    let texture_resolution = common.page_texture_resolution;
    let page_texture = create_texture(
        graph,
        TextureDesc {
            label: "Hair.VoxelPageTexture".to_string(),
            size: wgpu::Extent3d {
                width: texture_resolution[0],
                height: texture_resolution[1],
                depth_or_array_layers: texture_resolution[2],
            },
            dimension: wgpu::TextureDimension::D3,
            format: wgpu::TextureFormat::R32Uint,
            mip_level_count: page_texture_mip_count(common.page_resolution),
            sample_count: 1,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
        },
    );

    for buffer in [
        page_index_buffer,
        page_index_occupancy_buffer,
        page_index_coord_buffer,
        node_desc_buffer,
        total_requested_page_allocation,
    ] {
        extract_buffer(graph, buffer)?;
    }
    extract_texture(graph, page_texture)?;
    end_scope(graph);

    log::debug!(
        "[voxel_operations::allocate_virtual_voxel_resources] view {}: voxel {:.2}, {} page indices, {} pages, {} macro groups",
        view.view_key,
        common.voxel_world_size,
        total_page_index_count,
        page_count,
        macro_group_count
    );

    Ok(VirtualVoxelResources {
        parameters: common,
        allocations,
        page_index_buffer: Some(page_index_buffer),
        page_index_occupancy_buffer: Some(page_index_occupancy_buffer),
        page_index_coord_buffer: Some(page_index_coord_buffer),
        page_to_page_index_buffer: Some(page_to_page_index_buffer),
        page_index_resolution_and_offset_buffer: Some(page_index_resolution_and_offset_buffer),
        page_index_allocation_indirect_args: Some(page_index_allocation_indirect_args),
        node_desc_buffer: Some(node_desc_buffer),
        indirect_args_buffer: Some(indirect_args_buffer),
        page_index_global_counter: Some(page_index_global_counter),
        total_requested_page_allocation: Some(total_requested_page_allocation),
        voxelization_view_info_buffer: Some(voxelization_view_info_buffer),
        page_texture: Some(page_texture),
    })
}

/// Handles the voxelization passes need, all present on valid resources
struct VoxelPassResources {
    page_texture: TextureHandle,
    page_index_buffer: BufferHandle,
    page_index_occupancy_buffer: BufferHandle,
    page_to_page_index_buffer: BufferHandle,
    node_desc_buffer: BufferHandle,
    indirect_args_buffer: BufferHandle,
    page_index_global_counter: BufferHandle,
    voxelization_view_info_buffer: BufferHandle,
}

fn voxel_pass_resources(resources: &VirtualVoxelResources) -> Option<VoxelPassResources> {
    Some(VoxelPassResources {
        page_texture: resources.page_texture?,
        page_index_buffer: resources.page_index_buffer?,
        page_index_occupancy_buffer: resources.page_index_occupancy_buffer?,
        page_to_page_index_buffer: resources.page_to_page_index_buffer?,
        node_desc_buffer: resources.node_desc_buffer?,
        indirect_args_buffer: resources.indirect_args_buffer?,
        page_index_global_counter: resources.page_index_global_counter?,
        voxelization_view_info_buffer: resources.voxelization_view_info_buffer?,
    })
}

/// Record page clear, voxelization, opaque injection and mip generation
pub fn add_voxelization_passes(
    graph: &mut FrameGraph,
    config: &VoxelConfig,
    caps: &PlatformCaps,
    view: &ViewInfo,
    macro_groups: &MacroGroupDatas,
    cluster_data: &ClusterData,
    resources: &VirtualVoxelResources,
) -> StrandsResult<()> {
    let Some(handles) = voxel_pass_resources(resources) else {
        return Ok(());
    };

    let _span = tracing::debug_span!("HairStrandsVoxelization").entered();
    begin_scope(graph, "HairStrandsVoxelization");

    let clear_args = add_page_clear_passes(graph, resources, &handles)?;

    let gpu_driven = config.gpu_driven;
    let use_compute_raster = gpu_driven && config.compute_raster;
    for (data, allocation) in macro_groups.datas.iter().zip(&resources.allocations) {
        let setup = compute_voxel_raster_setup(allocation, resources.parameters.page_resolution, gpu_driven);
        let strands = voxelized_strands(data, cluster_data);
        if strands.len() < data.primitives.len() {
            log::debug!(
                "[voxel_operations::add_voxelization_passes] macro group {}: {} primitives without strands culling output are not voxelized",
                data.macro_group_id,
                data.primitives.len() - strands.len()
            );
        }

        let [rx, ry, rz] = allocation.page_index_resolution.map(|r| r * resources.parameters.page_resolution);
        let params = VoxelRasterParams {
            common: resources.parameters,
            world_to_clip: setup.world_to_clip.into(),
            voxel_min_aabb: point4(allocation.world_aabb.min),
            voxel_max_aabb: point4(allocation.world_aabb.max),
            voxel_resolution: [rx, ry, rz, allocation.macro_group_id],
            viewport_resolution: setup.viewport_resolution,
            max_raster_count: config.max_raster_count.clamp(1, MAX_RASTER_COUNT),
            frame_id_mod8: view.frame_index % 8,
            dispatch_count_x: RASTER_DISPATCH_COUNT_X,
            radius_at_depth1: resources.parameters.voxel_world_size * 0.5,
            gpu_driven: gpu_driven as u32,
            _padding: 0,
        };

        if use_compute_raster {
            for (_, outputs) in &strands {
                add_compute_pass(
                    graph,
                    "HairStrandsVoxelComputeRaster",
                    KernelId::VoxelComputeRaster,
                    &params,
                    vec![
                        buffer_srv(outputs.culled_vertex_id),
                        buffer_srv(outputs.culled_vertex_radius_scale),
                        buffer_srv(handles.voxelization_view_info_buffer),
                        texture_mip_uav(handles.page_texture, 0),
                    ],
                    Dispatch::Indirect {
                        args: outputs.draw_indirect_raster_compute,
                        offset: 0,
                    },
                )?;
            }
        } else if !strands.is_empty() {
            let draws = strands
                .iter()
                .map(|(_, outputs)| Draw::Indirect {
                    args: outputs.draw_indirect,
                    offset: 0,
                })
                .collect();
            let mut bindings = vec![
                buffer_srv(handles.voxelization_view_info_buffer),
                texture_mip_uav(handles.page_texture, 0),
            ];
            bindings.extend(strands.iter().flat_map(|(_, outputs)| {
                [
                    buffer_srv(outputs.culled_vertex_id),
                    buffer_srv(outputs.culled_vertex_radius_scale),
                ]
            }));
            add_raster_pass(
                graph,
                "HairStrandsVoxelize",
                KernelId::VoxelRaster,
                &params,
                bindings,
                RasterTargets {
                    viewport: [0, 0, setup.viewport_resolution[0], setup.viewport_resolution[1]],
                    color: Vec::new(),
                    depth: None,
                },
                draws,
            )?;
        }
    }

    if config.inject_opaque_depth {
        add_inject_opaque_passes(graph, config, view, macro_groups, resources, &handles)?;
    }

    add_mip_passes(graph, config, caps, resources, &handles, clear_args)?;

    end_scope(graph);
    Ok(())
}

/// Indirect clear of the pages allocated this frame
fn add_page_clear_passes(
    graph: &mut FrameGraph,
    resources: &VirtualVoxelResources,
    handles: &VoxelPassResources,
) -> StrandsResult<BufferHandle> {
    let clear_args = create_dispatch_args_buffer(graph, "Hair.VirtualVoxelClearIndirectArgsBuffer", 1);
    let params = VoxelPageParams {
        common: resources.parameters,
        source_mip: 0,
        target_mip: 0,
        mip_count: 1,
        dispatch_group_size: INDIRECT_DISPATCH_GROUP_SIZE,
    };

    add_compute_pass(
        graph,
        "HairStrandsVoxelGenIndBufferClearCS",
        KernelId::VoxelPageClearIndirectArgs,
        &params,
        vec![buffer_srv(handles.page_index_global_counter), buffer_uav(clear_args)],
        Dispatch::Direct([1, 1, 1]),
    )?;
    add_compute_pass(
        graph,
        "HairStrandsVoxelIndPageClearCS",
        KernelId::VoxelPageClear,
        &params,
        vec![texture_mip_uav(handles.page_texture, 0)],
        Dispatch::Indirect {
            args: clear_args,
            offset: 0,
        },
    )?;
    Ok(clear_args)
}

/// Mark opaque scene depth as occluding voxels, one dispatch per macro group
/// over its allocated pages
fn add_inject_opaque_passes(
    graph: &mut FrameGraph,
    config: &VoxelConfig,
    view: &ViewInfo,
    macro_groups: &MacroGroupDatas,
    resources: &VirtualVoxelResources,
    handles: &VoxelPassResources,
) -> StrandsResult<()> {
    let Some(scene_depth) = view.scene_depth else {
        log::debug!("[voxel_operations::add_inject_opaque_passes] No scene depth, skipping opaque injection");
        return Ok(());
    };

    for data in &macro_groups.datas {
        let params = VoxelInjectOpaqueParams {
            view: create_view_uniform(view, false),
            common: resources.parameters,
            macro_group_id: data.macro_group_id,
            voxel_bias_count: config.inject_opaque_bias_count.max(0) as u32,
            voxel_mark_count: config.inject_opaque_mark_count.max(0) as u32,
            _padding: 0,
        };
        add_compute_pass(
            graph,
            "HairStrandsInjectOpaqueDepthInVoxel",
            KernelId::VoxelInjectOpaque,
            &params,
            vec![
                texture_srv(scene_depth),
                buffer_srv(handles.node_desc_buffer),
                buffer_srv(handles.page_index_buffer),
                texture_mip_uav(handles.page_texture, 0),
            ],
            Dispatch::Indirect {
                args: handles.indirect_args_buffer,
                offset: DISPATCH_INDIRECT_ARGS_SIZE * data.macro_group_id as u64,
            },
        )?;
    }
    Ok(())
}

/// Mip ranges `(source, targets)` covering mips 1..mip_count
pub fn plan_mip_passes(mip_count: u32, mips_per_pass: u32) -> Vec<(u32, std::ops::RangeInclusive<u32>)> {
    let step = snap_mips_per_pass(mips_per_pass);
    let last = mip_count.saturating_sub(1);
    (0..last)
        .step_by(step as usize)
        .map(|source| (source, source + 1..=(source + step).min(last)))
        .collect()
}

fn add_mip_passes(
    graph: &mut FrameGraph,
    config: &VoxelConfig,
    caps: &PlatformCaps,
    resources: &VirtualVoxelResources,
    handles: &VoxelPassResources,
    clear_args: BufferHandle,
) -> StrandsResult<()> {
    let mip_count = page_texture_mip_count(resources.parameters.page_resolution);
    let plan = plan_mip_passes(mip_count, config.mips_per_pass);

    begin_scope(graph, "HairStrandsDensityMipGen");

    let mut last_args = None;
    for (source, targets) in plan {
        let params = VoxelPageParams {
            common: resources.parameters,
            source_mip: source,
            target_mip: *targets.start(),
            mip_count: targets.end() - targets.start() + 1,
            dispatch_group_size: INDIRECT_DISPATCH_GROUP_SIZE,
        };

        let args = create_dispatch_args_buffer(graph, "Hair.VirtualVoxelMipIndirectArgsBuffer", 1);
        add_compute_pass(
            graph,
            "HairStrandsBuildVoxelMipIndirectArgs",
            KernelId::VoxelMipIndirectArgs,
            &params,
            vec![buffer_srv(clear_args), buffer_uav(args)],
            Dispatch::Direct([1, 1, 1]),
        )?;

        let mut bindings = vec![texture_mip_srv(handles.page_texture, source)];
        bindings.extend(targets.map(|mip| texture_mip_uav(handles.page_texture, mip)));
        add_compute_pass(
            graph,
            "HairStrandsComputeVoxelMip",
            KernelId::VoxelGenerateMips,
            &params,
            bindings,
            Dispatch::Indirect { args, offset: 0 },
        )?;
        last_args = Some(args);
    }

    let patch_empty_pages = config.invalidate_empty_page_index && !caps.is_amd_pc;
    if let (true, Some(args)) = (patch_empty_pages, last_args) {
        let last_mip = mip_count - 1;
        let params = VoxelPageParams {
            common: resources.parameters,
            source_mip: last_mip,
            target_mip: last_mip,
            mip_count: 1,
            dispatch_group_size: INDIRECT_DISPATCH_GROUP_SIZE,
        };
        add_compute_pass(
            graph,
            "HairStrandsPatchPageIndexWithMip",
            KernelId::VoxelPatchEmptyPages,
            &params,
            vec![
                buffer_srv(handles.page_index_global_counter),
                texture_mip_srv(handles.page_texture, last_mip),
                buffer_srv(handles.page_to_page_index_buffer),
                buffer_uav(handles.page_index_buffer),
                buffer_uav(handles.page_index_occupancy_buffer),
            ],
            Dispatch::Indirect { args, offset: 0 },
        )?;
    }

    end_scope(graph);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::{bounds_from_sphere, create_aabb};
    use crate::cluster::cluster_operations::tests::{test_instance, test_public_data};
    use crate::cluster::{add_cluster_culling_passes, add_instance_to_cluster_data, CullingParams};
    use crate::config::CullingConfig;
    use crate::macro_group::{add_macro_group_aabb_passes, build_macro_groups, HairMeshBatch};
    use crate::view::view_operations::tests::test_view;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn scene(centers: &[[f32; 3]]) -> (FrameGraph, MacroGroupDatas, ClusterData) {
        let view = test_view();
        let mut cluster_data = ClusterData::default();
        let mut batches = Vec::new();
        for (index, center) in centers.iter().enumerate() {
            let public = test_public_data(index as u64 + 1, 0, 256, 4);
            add_instance_to_cluster_data(test_instance(public.clone()), &mut cluster_data).unwrap();
            batches.push(HairMeshBatch {
                primitive_id: index as u32,
                bounds: bounds_from_sphere(Point3::new(center[0], center[1], center[2]), 50.0),
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
        let mut macro_groups = build_macro_groups(&view, &batches);
        add_macro_group_aabb_passes(&mut graph, &mut macro_groups, &cluster_data).unwrap();
        (graph, macro_groups, cluster_data)
    }

    #[test]
    fn test_page_size_example() {
        let pws = page_world_size(0.15, 32);
        assert!((pws - 4.8).abs() < 1e-5);

        let bounds = bounds_aabb(&bounds_from_sphere(Point3::new(0.0, 0.0, -500.0), 50.0));
        let allocation = compute_page_index_allocation(&bounds, 1.0, pws);
        assert_eq!(allocation.page_index_resolution, [21, 21, 21]);
        assert_eq!(allocation.count, 21 * 21 * 21);
    }

    #[test]
    fn test_page_sizing_never_clips() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..500 {
            let min = Point3::new(
                rng.gen_range(-1000.0..1000.0),
                rng.gen_range(-1000.0..1000.0),
                rng.gen_range(-1000.0..1000.0),
            );
            let size = Vector3::new(
                rng.gen_range(0.0..300.0),
                rng.gen_range(0.0..300.0),
                rng.gen_range(0.0..300.0),
            );
            let bounds = create_aabb(min, min + size);
            let scale = rng.gen_range(0.01..3.0);
            let pws = rng.gen_range(0.02..40.0);

            let allocation = compute_page_index_allocation(&bounds, scale, pws);
            let scaled = aabb_scaled(&bounds, scale);
            assert_eq!(allocation.world_aabb.min, scaled.min);
            for (axis, &pages) in allocation.page_index_resolution.iter().enumerate() {
                assert!(pages >= 1);
                assert!(pages as f32 * pws >= aabb_size(&scaled)[axis]);
            }
        }
    }

    #[test]
    fn test_degenerate_bounds_get_one_page() {
        let point = Point3::new(5.0, 5.0, 5.0);
        let allocation = compute_page_index_allocation(&create_aabb(point, point), 1.0, 4.8);
        assert_eq!(allocation.page_index_resolution, [1, 1, 1]);
        assert_eq!(allocation.count, 1);
    }

    #[test]
    fn test_huge_bounds_clamp_page_resolution() {
        let bounds = create_aabb(Point3::new(0.0, 0.0, 0.0), Point3::new(8000.0, 8000.0, 8000.0));
        let allocation = compute_page_index_allocation(&bounds, 1.0, 4.8);
        let max = MAX_PAGE_INDEX_RESOLUTION_PER_AXIS;
        assert_eq!(allocation.page_index_resolution, [max, max, max]);
        assert_eq!(allocation.count, max * max * max);

        // Non-finite extents clamp instead of wrapping
        let infinite = create_aabb(Point3::new(0.0, 0.0, 0.0), Point3::new(f32::MAX, 1.0, 1.0));
        let allocation = compute_page_index_allocation(&infinite, 10.0, 4.8);
        assert_eq!(allocation.page_index_resolution[0], max);
        assert_eq!(allocation.page_index_resolution[1], 3);
    }

    #[test]
    fn test_layout_offsets_and_gpu_driven_total() {
        let (_, macro_groups, _) = scene(&[[0.0, 0.0, -500.0], [1000.0, 0.0, -500.0]]);
        let config = VoxelConfig {
            gpu_driven: false,
            ..Default::default()
        };
        let (allocations, total) = layout_page_index_allocations(&macro_groups, &config, 4.8);
        assert_eq!(allocations.len(), 2);
        assert_eq!(allocations[0].offset, 0);
        assert_eq!(allocations[1].offset, allocations[0].count);
        assert_eq!(total, allocations[0].count + allocations[1].count);
        assert_eq!(allocations[1].macro_group_id, 1);

        let gpu = VoxelConfig {
            gpu_driven: true,
            gpu_driven_max_page_index_resolution: 32,
            ..Default::default()
        };
        let (_, gpu_total) = layout_page_index_allocations(&macro_groups, &gpu, 4.8);
        assert_eq!(gpu_total, total.max(32 * 32 * 32));
    }

    #[test]
    fn test_usage_context_scales() {
        let mut config = VoxelConfig::default();
        assert_eq!(voxel_density_scale(&config, UsageContext::Shadow), 2.0);
        config.density_scale_shadow = 0.5;
        assert_eq!(voxel_density_scale(&config, UsageContext::Shadow), 0.5);
        assert_eq!(voxel_density_scale(&config, UsageContext::Ao), 2.0);

        assert_eq!(voxel_depth_bias_scale(&config, UsageContext::Ao), 1.8);
        assert_eq!(voxel_depth_bias_scale(&config, UsageContext::Raytracing), 2.0);

        assert_eq!(voxel_stepping_scale(&config, UsageContext::Transmittance), 1.15);
        config.stepping_scale_transmittance = 0.2;
        assert_eq!(voxel_stepping_scale(&config, UsageContext::Transmittance), 1.0);
        config.stepping_scale_raytracing = 50.0;
        assert_eq!(voxel_stepping_scale(&config, UsageContext::Raytracing), 10.0);
    }

    #[test]
    fn test_common_parameters() {
        let config = VoxelConfig {
            page_resolution: 30,
            page_count_per_dim: 14,
            jitter_mode: 7,
            ..Default::default()
        };
        let common = compute_voxel_common_parameters(&config, 0.304, 3, 1000);
        assert_eq!(common.page_resolution, 32);
        assert_eq!(common.page_count, 14 * 14 * 14);
        assert_eq!(common.page_texture_resolution, [448; 3]);
        assert_eq!(common.voxel_world_size, 0.3);
        assert_eq!(common.jitter_mode, 2);
        assert_eq!(common.node_desc_count, 3);
        assert_eq!(common.indirect_dispatch_group_size, 64);
        assert_eq!(page_texture_mip_count(common.page_resolution), 6);
    }

    #[test]
    fn test_dominant_axis() {
        let allocation = |resolution: [u32; 3]| PageIndexAllocation {
            macro_group_id: 0,
            world_aabb: create_aabb(
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(resolution[0] as f32, resolution[1] as f32, resolution[2] as f32),
            ),
            page_index_resolution: resolution,
            count: resolution.iter().product(),
            offset: 0,
        };

        // XY face has 8 pages, YZ only 4
        let setup = compute_voxel_raster_setup(&allocation([2, 4, 1]), 8, false);
        assert_eq!(setup.viewport_resolution, [16, 32]);
        assert_eq!(setup.direction, Vector3::new(0.0, 0.0, 1.0));

        let setup = compute_voxel_raster_setup(&allocation([4, 1, 2]), 8, false);
        assert_eq!(setup.viewport_resolution, [32, 16]);
        assert_eq!(setup.direction, Vector3::new(0.0, -1.0, 0.0));

        let setup = compute_voxel_raster_setup(&allocation([1, 2, 4]), 8, false);
        assert_eq!(setup.viewport_resolution, [16, 32]);
        assert_eq!(setup.direction, Vector3::new(1.0, 0.0, 0.0));

        let setup = compute_voxel_raster_setup(&allocation([1, 2, 4]), 8, true);
        assert_eq!(setup.viewport_resolution, [GPU_DRIVEN_RASTER_RESOLUTION; 2]);
    }

    #[test]
    fn test_mip_plan() {
        assert_eq!(plan_mip_passes(6, 1).len(), 5);
        let two = plan_mip_passes(6, 2);
        assert_eq!(two.len(), 3);
        assert_eq!(two[0], (0, 1..=2));
        assert_eq!(two[2], (4, 5..=5));
        assert!(plan_mip_passes(1, 1).is_empty());
    }

    #[test]
    fn test_disabled_or_empty_gives_invalid_resources() {
        let mut graph = create_frame_graph("test");
        let mut adaptive = AdaptiveVoxelState::default();
        let resources = allocate_virtual_voxel_resources(
            &mut graph,
            &VoxelConfig::default(),
            &test_view(),
            &MacroGroupDatas::default(),
            &ClusterData::default(),
            &mut adaptive,
        )
        .unwrap();
        assert!(!virtual_voxel_resources_valid(&resources));
        assert!(graph.passes.is_empty());

        let (mut graph, macro_groups, cluster_data) = scene(&[[0.0, 0.0, -500.0]]);
        let before = graph.passes.len();
        let config = VoxelConfig {
            enabled: false,
            ..Default::default()
        };
        let resources =
            allocate_virtual_voxel_resources(&mut graph, &config, &test_view(), &macro_groups, &cluster_data, &mut adaptive)
                .unwrap();
        assert_eq!(resources, VirtualVoxelResources::default());
        add_voxelization_passes(
            &mut graph,
            &config,
            &PlatformCaps::default(),
            &test_view(),
            &macro_groups,
            &cluster_data,
            &resources,
        )
        .unwrap();
        assert_eq!(graph.passes.len(), before);
    }

    #[test]
    fn test_gpu_driven_allocation_passes() {
        let (mut graph, macro_groups, cluster_data) = scene(&[[0.0, 0.0, -500.0], [1000.0, 0.0, -500.0]]);
        let mut adaptive = AdaptiveVoxelState::default();
        let config = VoxelConfig::default();
        let resources =
            allocate_virtual_voxel_resources(&mut graph, &config, &test_view(), &macro_groups, &cluster_data, &mut adaptive)
                .unwrap();

        assert!(virtual_voxel_resources_valid(&resources));
        assert_eq!(passes_named(&graph, "HairStrandsAllocatePageIndex").len(), 1);
        assert_eq!(passes_named(&graph, "HairStrandsMarkValidPageIndex_Prepare").len(), 2);
        assert_eq!(passes_named(&graph, "HairStrandsMarkValidPageIndex_Scatter").len(), 2);

        let allocate = passes_named(&graph, "HairStrandsAllocateVoxelPage");
        assert_eq!(allocate.len(), 2);
        assert!(matches!(
            allocate[1].kind,
            PassKind::Compute {
                dispatch: Dispatch::Indirect { offset: 12, .. },
                ..
            }
        ));

        let texture = texture_desc(&graph, resources.page_texture.unwrap()).unwrap();
        assert_eq!(texture.dimension, wgpu::TextureDimension::D3);
        assert_eq!(texture.mip_level_count, 6);
        assert_eq!(texture.size.width, 14 * 32);
        assert_eq!(adaptive.voxel_world_size, Some(0.3));
    }

    #[test]
    fn test_voxelization_passes() {
        let (mut graph, macro_groups, cluster_data) = scene(&[[0.0, 0.0, -500.0], [1000.0, 0.0, -500.0]]);
        let mut adaptive = AdaptiveVoxelState::default();
        let config = VoxelConfig::default();
        let view = test_view();
        let resources =
            allocate_virtual_voxel_resources(&mut graph, &config, &view, &macro_groups, &cluster_data, &mut adaptive)
                .unwrap();
        add_voxelization_passes(
            &mut graph,
            &config,
            &PlatformCaps::default(),
            &view,
            &macro_groups,
            &cluster_data,
            &resources,
        )
        .unwrap();

        assert_eq!(passes_named(&graph, "HairStrandsVoxelIndPageClearCS").len(), 1);
        assert_eq!(passes_named(&graph, "HairStrandsVoxelComputeRaster").len(), 2);
        assert!(passes_named(&graph, "HairStrandsVoxelize").is_empty());
        // No scene depth on the test view
        assert!(passes_named(&graph, "HairStrandsInjectOpaqueDepthInVoxel").is_empty());
        assert_eq!(passes_named(&graph, "HairStrandsComputeVoxelMip").len(), 5);
        assert_eq!(passes_named(&graph, "HairStrandsPatchPageIndexWithMip").len(), 1);
    }

    #[test]
    fn test_raster_path_and_amd_patch_skip() {
        let (mut graph, macro_groups, cluster_data) = scene(&[[0.0, 0.0, -500.0]]);
        let mut adaptive = AdaptiveVoxelState::default();
        let config = VoxelConfig {
            gpu_driven: false,
            mips_per_pass: 2,
            ..Default::default()
        };
        let mut view = test_view();
        view.scene_depth = Some(create_texture_2d(
            &mut graph,
            "SceneDepth",
            [1920, 1080],
            wgpu::TextureFormat::R32Float,
            wgpu::TextureUsages::TEXTURE_BINDING,
        ));
        let caps = PlatformCaps {
            is_amd_pc: true,
            ..Default::default()
        };

        let resources =
            allocate_virtual_voxel_resources(&mut graph, &config, &view, &macro_groups, &cluster_data, &mut adaptive)
                .unwrap();
        add_voxelization_passes(&mut graph, &config, &caps, &view, &macro_groups, &cluster_data, &resources)
            .unwrap();

        assert_eq!(passes_named(&graph, "HairStrandsMarkValidPageIndex").len(), 1);
        assert_eq!(passes_named(&graph, "HairStrandsVoxelize").len(), 1);
        assert!(passes_named(&graph, "HairStrandsVoxelComputeRaster").is_empty());
        assert_eq!(passes_named(&graph, "HairStrandsInjectOpaqueDepthInVoxel").len(), 1);
        assert_eq!(passes_named(&graph, "HairStrandsComputeVoxelMip").len(), 3);
        assert!(passes_named(&graph, "HairStrandsPatchPageIndexWithMip").is_empty());
    }
}
