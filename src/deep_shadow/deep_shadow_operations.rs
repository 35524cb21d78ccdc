//! Deep Shadow Operations - Pure DOP Functions
//!
//! Atlas slot allocation per (macro group, light) pair, light transforms and
//! the front depth / opacity layer rasterization.

use super::deep_shadow_data::*;
use crate::bounds::BoxSphereBounds;
use crate::cluster::ClusterData;
use crate::config::DeepShadowConfig;
use crate::constants::deep_shadow::{MAX_ATLAS_SLOT_COUNT, MIN_SLOT_RESOLUTION};
use crate::constants::gpu_limits::DEFAULT_MAX_TEXTURE_DIMENSION_2D;
use crate::error::StrandsResult;
use crate::graph::*;
use crate::macro_group::{culled_strands_outputs, MacroGroupDatas};
use crate::view::{PlatformCaps, ViewInfo};
use cgmath::{InnerSpace, Matrix4, MetricSpace, Point3, Rad, Vector3};

fn light_direction(kind: &LightKind) -> Vector3<f32> {
    match kind {
        LightKind::Directional { direction }
        | LightKind::Spot { direction, .. }
        | LightKind::Rect { direction, .. } => safe_normalize(*direction),
        LightKind::Point { .. } => Vector3::new(0.0, 0.0, -1.0),
    }
}

fn light_position(kind: &LightKind) -> Option<(Point3<f32>, f32)> {
    match kind {
        LightKind::Directional { .. } => None,
        LightKind::Point { position, range }
        | LightKind::Spot { position, range, .. }
        | LightKind::Rect { position, range, .. } => Some((*position, *range)),
    }
}

fn safe_normalize(v: Vector3<f32>) -> Vector3<f32> {
    if v.magnitude2() > f32::EPSILON {
        v.normalize()
    } else {
        Vector3::new(0.0, 0.0, -1.0)
    }
}

fn up_vector(direction: Vector3<f32>) -> Vector3<f32> {
    if direction.z.abs() > 0.99 {
        Vector3::unit_y()
    } else {
        Vector3::unit_z()
    }
}

/// Whether the light can shadow anything inside `bounds`
pub fn light_affects_bounds(light: &LightData, bounds: &BoxSphereBounds) -> bool {
    let Some((position, range)) = light_position(&light.kind) else {
        return true;
    };
    let distance = position.distance(bounds.origin);
    if distance > range.max(0.0) + bounds.sphere_radius {
        return false;
    }

    match light.kind {
        LightKind::Spot {
            direction,
            outer_cone_angle,
            ..
        } if distance > bounds.sphere_radius => {
            let to_bounds = (bounds.origin - position) / distance;
            let bounds_half_angle = (bounds.sphere_radius / distance).clamp(0.0, 1.0).asin();
            let angle = safe_normalize(direction).dot(to_bounds).clamp(-1.0, 1.0).acos();
            angle - bounds_half_angle <= outer_cone_angle
        }
        _ => true,
    }
}

/// World to clip transform of a slot fitted to the macro group sphere
///
/// Directional lights use an orthographic projection, local lights a
/// perspective one from the light position.
pub fn compute_world_to_light_transform(light: &LightData, bounds: &BoxSphereBounds) -> Matrix4<f32> {
    let center = bounds.origin;
    let radius = bounds.sphere_radius.max(f32::EPSILON);

    match light_position(&light.kind) {
        None => {
            let direction = light_direction(&light.kind);
            let eye = center - direction * (2.0 * radius);
            let view = Matrix4::look_at_rh(eye, center, up_vector(direction));
            cgmath::ortho(-radius, radius, -radius, radius, radius, 3.0 * radius) * view
        }
        Some((position, _)) => {
            let to_center = center - position;
            let distance = to_center.magnitude();
            let direction = if distance > f32::EPSILON {
                to_center / distance
            } else {
                light_direction(&light.kind)
            };
            let half_angle = if distance > radius {
                (radius / distance).asin()
            } else {
                std::f32::consts::FRAC_PI_4
            };
            let near = (distance - radius).max(radius * 0.01);
            let far = (distance + radius).max(near * 2.0);
            let view = Matrix4::look_at_rh(position, position + direction, up_vector(direction));
            cgmath::perspective(Rad(2.0 * half_angle), 1.0, near, far) * view
        }
    }
}

/// Hand out atlas slots to (macro group, light) pairs
///
/// Macro groups in the outer loop, lights in the inner one. Slots go to
/// the first affecting pairs in that order; the rest are dropped and fall
/// back to voxel transmittance.
pub fn allocate_deep_shadow_slots(
    config: &DeepShadowConfig,
    macro_groups: &MacroGroupDatas,
    lights: &[LightData],
) -> DeepShadowAllocation {
    if !config.enabled {
        return DeepShadowAllocation::default();
    }

    let mut allocation = DeepShadowAllocation::default();
    for data in &macro_groups.datas {
        for light in lights.iter().filter(|light| light_affects_bounds(light, &data.bounds)) {
            if allocation.datas.len() >= MAX_ATLAS_SLOT_COUNT {
                allocation.dropped_pair_count += 1;
                continue;
            }

            let position = light_position(&light.kind);
            allocation.datas.push(DeepShadowData {
                macro_group_id: data.macro_group_id,
                light_id: light.light_id,
                atlas_slot_index: allocation.datas.len() as u32,
                atlas_rect: [0; 4],
                world_to_light_transform: compute_world_to_light_transform(light, &data.bounds),
                layer_distribution: config.layer_distribution.clamp(0.0, 1.0),
                bounds: data.bounds,
                is_directional: position.is_none(),
                light_direction: light_direction(&light.kind),
                light_position: position.map_or(data.bounds.origin, |(p, _)| p),
            });
        }
    }

    if allocation.dropped_pair_count > 0 {
        log::debug!(
            "[deep_shadow_operations::allocate_deep_shadow_slots] {} pairs over the {} atlas slots use voxel transmittance",
            allocation.dropped_pair_count,
            MAX_ATLAS_SLOT_COUNT
        );
    }

    allocation
}

/// Square-ish slot grid inside one atlas texture
///
/// The slot resolution is halved until the atlas fits the device limit, but
/// never below `MIN_SLOT_RESOLUTION`.
pub fn atlas_layout(slot_count: u32, slot_resolution: u32, max_texture_dimension: u32) -> AtlasLayout {
    if slot_count == 0 {
        return AtlasLayout::default();
    }

    let columns = (slot_count as f32).sqrt().ceil() as u32;
    let rows = slot_count.div_ceil(columns);
    let max_dimension = if max_texture_dimension == 0 {
        DEFAULT_MAX_TEXTURE_DIMENSION_2D
    } else {
        max_texture_dimension
    };

    let requested = slot_resolution.max(MIN_SLOT_RESOLUTION);
    let mut resolution = requested;
    while resolution > MIN_SLOT_RESOLUTION && columns.max(rows) * resolution > max_dimension {
        resolution = (resolution / 2).max(MIN_SLOT_RESOLUTION);
    }
    if resolution != requested {
        log::warn!(
            "[deep_shadow_operations::atlas_layout] {} slots: slot resolution {} clamped to {} (max texture {})",
            slot_count,
            requested,
            resolution,
            max_dimension
        );
    }

    let rects = (0..slot_count)
        .map(|index| {
            [
                (index % columns) * resolution,
                (index / columns) * resolution,
                resolution,
                resolution,
            ]
        })
        .collect();

    AtlasLayout {
        slot_resolution: resolution,
        slot_count: [columns, rows],
        atlas_resolution: [columns * resolution, rows * resolution],
        rects,
    }
}

fn slot_gpu(data: &DeepShadowData) -> DeepShadowSlotGpu {
    let d = data.light_direction;
    let p = data.light_position;
    DeepShadowSlotGpu {
        world_to_clip: data.world_to_light_transform.into(),
        light_direction: [d.x, d.y, d.z, 0.0],
        light_position: [p.x, p.y, p.z, data.is_directional as u32 as f32],
        atlas_rect: data.atlas_rect,
        macro_group_id: data.macro_group_id,
        slot_index: data.atlas_slot_index,
        _padding: [0; 2],
    }
}

/// Place the slots, declare the atlases and record the deep shadow passes
pub fn add_deep_shadow_passes(
    graph: &mut FrameGraph,
    config: &DeepShadowConfig,
    caps: &PlatformCaps,
    view: &ViewInfo,
    macro_groups: &MacroGroupDatas,
    cluster_data: &ClusterData,
    allocation: DeepShadowAllocation,
) -> StrandsResult<DeepShadowResources> {
    let DeepShadowAllocation {
        mut datas,
        dropped_pair_count,
    } = allocation;
    if datas.is_empty() {
        return Ok(DeepShadowResources {
            dropped_pair_count,
            ..Default::default()
        });
    }

    let _span = tracing::debug_span!("HairStrandsDeepShadow").entered();

    let layout = atlas_layout(datas.len() as u32, config.slot_resolution, caps.max_texture_dimension_2d);
    for (data, rect) in datas.iter_mut().zip(&layout.rects) {
        data.atlas_rect = *rect;
    }

    begin_scope(graph, "HairStrandsDeepShadow");

    let usage = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
    let front_depth_atlas = create_texture_2d(
        graph,
        "Hair.ShadowDepthTexture",
        layout.atlas_resolution,
        wgpu::TextureFormat::Depth32Float,
        usage,
    );
    let layers_atlas = create_texture_2d(
        graph,
        "Hair.ShadowLayerTexture",
        layout.atlas_resolution,
        wgpu::TextureFormat::Rgba16Float,
        usage,
    );
    let world_to_light_buffer = create_structured_buffer(graph, "Hair.DeepShadowWorldToLightTransforms", 64, datas.len() as u32);

    let gpu_driven = config.gpu_driven && macro_groups.aabb_buffer.is_some();
    let mut slots = [DeepShadowSlotGpu::default(); MAX_ATLAS_SLOT_COUNT];
    for (slot, data) in slots.iter_mut().zip(&datas) {
        *slot = slot_gpu(data);
    }
    let allocate_params = DeepShadowAllocateParams {
        slots,
        slot_count: datas.len() as u32,
        slot_resolution: layout.slot_resolution,
        gpu_driven: gpu_driven as u32,
        _padding: 0,
    };
    let mut bindings = vec![buffer_uav(world_to_light_buffer)];
    if let (true, Some(aabb_buffer)) = (gpu_driven, macro_groups.aabb_buffer) {
        bindings.push(buffer_srv(aabb_buffer));
    }
    add_compute_pass(
        graph,
        "HairStrandsDeepShadowAllocate",
        KernelId::DeepShadowAllocate,
        &allocate_params,
        bindings,
        Dispatch::Direct([1, 1, 1]),
    )?;

    for (index, data) in datas.iter().enumerate() {
        let Some(macro_group) = macro_groups
            .datas
            .iter()
            .find(|group| group.macro_group_id == data.macro_group_id)
        else {
            continue;
        };
        let outputs = culled_strands_outputs(macro_group, cluster_data);
        if outputs.is_empty() {
            continue;
        }

        let params = DeepShadowRasterParams {
            world_to_clip: data.world_to_light_transform.into(),
            atlas_rect: data.atlas_rect,
            slot_index: data.atlas_slot_index,
            macro_group_id: data.macro_group_id,
            layer_distribution: data.layer_distribution,
            depth_bias_scale: config.depth_bias_scale.max(0.0),
            density_scale: config.density_scale.max(0.0),
            gpu_driven: gpu_driven as u32,
            _padding: [0; 2],
        };
        let draws: Vec<Draw> = outputs
            .iter()
            .map(|o| Draw::Indirect {
                args: o.draw_indirect,
                offset: 0,
            })
            .collect();
        let vertex_bindings: Vec<Binding> = outputs
            .iter()
            .flat_map(|o| [buffer_srv(o.culled_vertex_id), buffer_srv(o.culled_vertex_radius_scale)])
            .collect();

        // The first slot clears the whole atlas
        let first = index == 0;
        let mut bindings = vec![buffer_srv(world_to_light_buffer)];
        bindings.extend(vertex_bindings.iter().copied());
        add_raster_pass(
            graph,
            "HairStrandsDeepShadowFrontDepth",
            KernelId::DeepShadowFrontDepth,
            &params,
            bindings,
            RasterTargets {
                viewport: data.atlas_rect,
                color: Vec::new(),
                depth: Some(DepthAttachment {
                    texture: front_depth_atlas,
                    clear_depth: first.then_some(1.0),
                }),
            },
            draws.clone(),
        )?;

        let mut bindings = vec![buffer_srv(world_to_light_buffer), texture_srv(front_depth_atlas)];
        bindings.extend(vertex_bindings);
        add_raster_pass(
            graph,
            "HairStrandsDeepShadowLayers",
            KernelId::DeepShadowOpacityLayers,
            &params,
            bindings,
            RasterTargets {
                viewport: data.atlas_rect,
                color: vec![ColorAttachment {
                    texture: layers_atlas,
                    clear: first.then_some([0.0; 4]),
                }],
                depth: None,
            },
            draws,
        )?;
    }

    extract_texture(graph, front_depth_atlas)?;
    extract_texture(graph, layers_atlas)?;
    end_scope(graph);

    log::debug!(
        "[deep_shadow_operations::add_deep_shadow_passes] view {}: {} slots, atlas {}x{}",
        view.view_key,
        datas.len(),
        layout.atlas_resolution[0],
        layout.atlas_resolution[1]
    );

    Ok(DeepShadowResources {
        datas,
        atlas_resolution: layout.atlas_resolution,
        slot_resolution: layout.slot_resolution,
        dropped_pair_count,
        front_depth_atlas: Some(front_depth_atlas),
        layers_atlas: Some(layers_atlas),
        world_to_light_buffer: Some(world_to_light_buffer),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::bounds_from_sphere;
    use crate::cluster::cluster_operations::tests::{test_instance, test_public_data};
    use crate::cluster::{add_cluster_culling_passes, add_instance_to_cluster_data, CullingParams};
    use crate::config::CullingConfig;
    use crate::macro_group::{add_macro_group_aabb_passes, build_macro_groups, HairGeometry, HairMeshBatch};
    use crate::view::view_operations::tests::test_view;
    use cgmath::Vector4;
    use rustc_hash::FxHashSet;

    fn sun(light_id: u32) -> LightData {
        LightData {
            light_id,
            kind: LightKind::Directional {
                direction: Vector3::new(0.0, -1.0, -1.0),
            },
        }
    }

    fn groups(centers: &[[f32; 3]]) -> MacroGroupDatas {
        let batches: Vec<HairMeshBatch> = centers
            .iter()
            .enumerate()
            .map(|(index, c)| HairMeshBatch {
                primitive_id: index as u32,
                bounds: bounds_from_sphere(Point3::new(c[0], c[1], c[2]), 50.0),
                material_id: 0,
                geometry: HairGeometry::Cards {
                    resource_id: index as u64,
                    group_index: 0,
                },
            })
            .collect();
        build_macro_groups(&test_view(), &batches)
    }

    #[test]
    fn test_single_group_single_light() {
        let macro_groups = groups(&[[0.0, 0.0, -500.0]]);
        let allocation = allocate_deep_shadow_slots(&DeepShadowConfig::default(), &macro_groups, &[sun(7)]);
        assert_eq!(allocation.datas.len(), 1);
        assert_eq!(allocation.datas[0].atlas_slot_index, 0);
        assert_eq!(allocation.datas[0].light_id, 7);
        assert_eq!(allocation.dropped_pair_count, 0);
    }

    #[test]
    fn test_exhausted_atlas_keeps_first_pairs() {
        let centers: Vec<[f32; 3]> = (0..10).map(|i| [i as f32 * 1000.0, 0.0, -500.0]).collect();
        let macro_groups = groups(&centers);
        let lights: Vec<LightData> = (0..4).map(sun).collect();

        let allocation = allocate_deep_shadow_slots(&DeepShadowConfig::default(), &macro_groups, &lights);
        assert_eq!(allocation.datas.len(), 32);
        assert_eq!(allocation.dropped_pair_count, 8);

        let slots: FxHashSet<u32> = allocation.datas.iter().map(|d| d.atlas_slot_index).collect();
        assert_eq!(slots.len(), 32);
        assert!(slots.iter().all(|&slot| (slot as usize) < MAX_ATLAS_SLOT_COUNT));

        // Macro group 7, light 3 is pair 31; group 8 gets nothing
        let last = allocation.datas.last().unwrap();
        assert_eq!((last.macro_group_id, last.light_id), (7, 3));
        assert!(allocation.datas.iter().all(|d| d.macro_group_id < 8));
    }

    #[test]
    fn test_local_light_range() {
        let bounds = bounds_from_sphere(Point3::new(0.0, 0.0, -500.0), 50.0);
        let near = LightData {
            light_id: 1,
            kind: LightKind::Point {
                position: Point3::new(0.0, 0.0, -300.0),
                range: 200.0,
            },
        };
        let far = LightData {
            light_id: 2,
            kind: LightKind::Point {
                position: Point3::new(0.0, 0.0, 0.0),
                range: 200.0,
            },
        };
        assert!(light_affects_bounds(&near, &bounds));
        assert!(!light_affects_bounds(&far, &bounds));

        let spot_away = LightData {
            light_id: 3,
            kind: LightKind::Spot {
                position: Point3::new(0.0, 0.0, -300.0),
                direction: Vector3::new(0.0, 0.0, 1.0),
                range: 1000.0,
                outer_cone_angle: 30f32.to_radians(),
            },
        };
        assert!(!light_affects_bounds(&spot_away, &bounds));
    }

    #[test]
    fn test_light_transform_contains_bounds() {
        let bounds = bounds_from_sphere(Point3::new(10.0, 20.0, -500.0), 50.0);
        let lights = [
            sun(0),
            LightData {
                light_id: 1,
                kind: LightKind::Point {
                    position: Point3::new(0.0, 200.0, -500.0),
                    range: 1000.0,
                },
            },
        ];
        for light in &lights {
            let transform = compute_world_to_light_transform(light, &bounds);
            let clip = transform * Vector4::new(bounds.origin.x, bounds.origin.y, bounds.origin.z, 1.0);
            let ndc = clip.truncate() / clip.w;
            assert!(ndc.x.abs() < 1e-3 && ndc.y.abs() < 1e-3);
            assert!(ndc.z > -1.0 && ndc.z < 1.0);
        }
    }

    #[test]
    fn test_atlas_layout() {
        let layout = atlas_layout(5, 2048, 8192);
        assert_eq!(layout.slot_count, [3, 2]);
        assert_eq!(layout.slot_resolution, 2048);
        assert_eq!(layout.atlas_resolution, [6144, 4096]);
        assert_eq!(layout.rects[4], [2048, 2048, 2048, 2048]);

        let clamped = atlas_layout(32, 2048, 8192);
        assert_eq!(clamped.slot_count, [6, 6]);
        assert_eq!(clamped.slot_resolution, 1024);
        assert!(clamped.atlas_resolution[0] <= 8192);

        assert_eq!(atlas_layout(0, 2048, 8192), AtlasLayout::default());
    }

    #[test]
    fn test_atlas_layout_stops_at_min_resolution() {
        // 100 halves to 50, which is below the minimum
        let layout = atlas_layout(32, 100, 300);
        assert_eq!(layout.slot_resolution, MIN_SLOT_RESOLUTION);
        assert!(layout.rects.iter().all(|rect| rect[2] >= MIN_SLOT_RESOLUTION));
    }

    #[test]
    fn test_deep_shadow_passes() {
        let view = test_view();
        let public = test_public_data(1, 0, 256, 4);
        let mut cluster_data = ClusterData::default();
        add_instance_to_cluster_data(test_instance(public.clone()), &mut cluster_data).unwrap();
        let batches = [HairMeshBatch {
            primitive_id: 0,
            bounds: bounds_from_sphere(Point3::new(0.0, 0.0, -500.0), 50.0),
            material_id: 0,
            geometry: HairGeometry::Strands(public),
        }];

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

        let config = DeepShadowConfig::default();
        let allocation = allocate_deep_shadow_slots(&config, &macro_groups, &[sun(0), sun(1)]);
        let resources = add_deep_shadow_passes(
            &mut graph,
            &config,
            &PlatformCaps::default(),
            &view,
            &macro_groups,
            &cluster_data,
            allocation,
        )
        .unwrap();

        assert_eq!(resources.datas.len(), 2);
        assert_eq!(resources.datas[1].atlas_rect, [2048, 0, 2048, 2048]);
        assert_eq!(passes_named(&graph, "HairStrandsDeepShadowAllocate").len(), 1);
        assert_eq!(passes_named(&graph, "HairStrandsDeepShadowFrontDepth").len(), 2);
        assert_eq!(passes_named(&graph, "HairStrandsDeepShadowLayers").len(), 2);

        let params: DeepShadowAllocateParams =
            pass_params(passes_named(&graph, "HairStrandsDeepShadowAllocate")[0]).unwrap();
        assert_eq!(params.slot_count, 2);
        assert_eq!(params.gpu_driven, 1);
    }

    #[test]
    fn test_disabled_allocates_nothing() {
        let macro_groups = groups(&[[0.0, 0.0, -500.0]]);
        let config = DeepShadowConfig {
            enabled: false,
            ..Default::default()
        };
        assert_eq!(
            allocate_deep_shadow_slots(&config, &macro_groups, &[sun(0)]),
            DeepShadowAllocation::default()
        );
    }
}
