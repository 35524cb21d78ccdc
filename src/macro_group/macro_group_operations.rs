//! Macro Group Operations - Pure DOP Functions
//!
//! Groups the hair batches of a view into spatially coherent macro groups
//! and records the GPU pass that reduces their hair group AABBs.

use super::macro_group_data::*;
use crate::bounds::{bounds_aabb, bounds_union, spheres_intersect};
use crate::cluster::{ClusterCullingOutputs, ClusterData};
use crate::constants::cluster::{AABB_UPDATE_GROUP_PER_PASS, AABB_U32_PER_MACRO_GROUP};
use crate::error::StrandsResult;
use crate::graph::*;
use crate::view::{project_aabb_to_screen_rect, screen_rect_union, ScreenRect, ViewInfo};
use rustc_hash::FxHashSet;

/// Resource id and group index of a batch, whatever its geometry
pub fn geometry_group(geometry: &HairGeometry) -> PrimitiveGroup {
    match geometry {
        HairGeometry::Strands(public_data) => PrimitiveGroup {
            resource_id: public_data.key.resource_id,
            group_index: public_data.key.group_index,
        },
        HairGeometry::Cards {
            resource_id,
            group_index,
        }
        | HairGeometry::Meshes {
            resource_id,
            group_index,
        } => PrimitiveGroup {
            resource_id: *resource_id,
            group_index: *group_index,
        },
    }
}

/// Build the macro groups of a view
///
/// Each batch joins the first existing macro group whose sphere it touches,
/// otherwise it opens a new one. Groups are never re-merged afterwards, so
/// the partition depends on batch order.
pub fn build_macro_groups(view: &ViewInfo, batches: &[HairMeshBatch]) -> MacroGroupDatas {
    let mut datas: Vec<MacroGroupData> = Vec::new();
    let mut seen_groups: Vec<FxHashSet<PrimitiveGroup>> = Vec::new();

    for batch in batches {
        let group = geometry_group(&batch.geometry);
        let primitive = PrimitiveInfo {
            primitive_id: batch.primitive_id,
            material_id: batch.material_id,
            resource_id: group.resource_id,
            group_index: group.group_index,
            geometry: batch.geometry.clone(),
        };

        let existing = datas
            .iter()
            .position(|data| spheres_intersect(&data.bounds, &batch.bounds));

        let index = match existing {
            Some(index) => {
                let data = &mut datas[index];
                data.bounds = bounds_union(&data.bounds, &batch.bounds);
                index
            }
            None => {
                datas.push(MacroGroupData {
                    macro_group_id: datas.len() as u32,
                    bounds: batch.bounds,
                    screen_rect: ScreenRect::default(),
                    primitives: Vec::new(),
                    primitive_groups: Vec::new(),
                });
                seen_groups.push(FxHashSet::default());
                datas.len() - 1
            }
        };

        datas[index].primitives.push(primitive);
        if seen_groups[index].insert(group) {
            datas[index].primitive_groups.push(group);
        }
    }

    let mut union_screen_rect = ScreenRect::default();
    for data in datas.iter_mut() {
        data.screen_rect = project_aabb_to_screen_rect(&bounds_aabb(&data.bounds), view);
        union_screen_rect = screen_rect_union(&union_screen_rect, &data.screen_rect);
    }

    log::debug!(
        "[macro_group_operations::build_macro_groups] {} batches -> {} macro groups",
        batches.len(),
        datas.len()
    );

    MacroGroupDatas {
        datas,
        union_screen_rect,
        aabb_buffer: None,
    }
}

/// Split hair group AABB buffers into fixed-width dispatch batches
///
/// The short last batch repeats its first entry in the unused slots; the
/// valid mask tells the kernel to ignore them.
pub fn plan_macro_group_aabb_batches(group_aabbs: &[BufferHandle]) -> Vec<MacroGroupAabbBatch> {
    group_aabbs
        .chunks(AABB_UPDATE_GROUP_PER_PASS)
        .map(|chunk| {
            let mut slots = [chunk[0]; AABB_UPDATE_GROUP_PER_PASS];
            slots[..chunk.len()].copy_from_slice(chunk);
            MacroGroupAabbBatch {
                slots,
                valid_mask: (1u32 << chunk.len()) - 1,
            }
        })
        .collect()
}

/// Culling outputs of the strands primitives of a macro group registered
/// this frame
pub fn culled_strands_outputs(
    data: &MacroGroupData,
    cluster_data: &ClusterData,
) -> Vec<ClusterCullingOutputs> {
    data.primitives
        .iter()
        .filter_map(|primitive| match &primitive.geometry {
            HairGeometry::Strands(public_data) => {
                let index = public_data.frame_state.lock().cluster_data_index?;
                cluster_data.groups.get(index).and_then(|group| group.outputs)
            }
            _ => None,
        })
        .collect()
}

/// Record the macro group AABB reduction into `MacroGroupAABBBuffer`
pub fn add_macro_group_aabb_passes(
    graph: &mut FrameGraph,
    macro_groups: &mut MacroGroupDatas,
    cluster_data: &ClusterData,
) -> StrandsResult<()> {
    if macro_groups.datas.is_empty() {
        return Ok(());
    }

    let buffer = create_structured_buffer(
        graph,
        "Hair.MacroGroupAABBBuffer",
        4,
        AABB_U32_PER_MACRO_GROUP * macro_groups.datas.len() as u32,
    );
    begin_scope(graph, "HairStrandsMacroGroupAABB");
    // Groups without strands keep a zeroed box
    add_clear_buffer_pass(graph, "HairStrandsMacroGroupAABBClear", buffer, 0)?;

    for data in &macro_groups.datas {
        let aabbs: Vec<BufferHandle> = culled_strands_outputs(data, cluster_data)
            .iter()
            .map(|outputs| outputs.group_aabb)
            .collect();
        for (batch_index, batch) in plan_macro_group_aabb_batches(&aabbs).iter().enumerate() {
            let params = MacroGroupAabbParams {
                macro_group_id: data.macro_group_id,
                macro_group_valid: batch.valid_mask,
                clear_buffer: (batch_index == 0) as u32,
                _padding: 0,
            };
            let mut bindings: Vec<Binding> = batch.slots.iter().copied().map(buffer_srv).collect();
            bindings.push(buffer_uav(buffer));

            add_compute_pass(
                graph,
                "HairStrandsMacroGroupAABBUpdate",
                KernelId::MacroGroupAabbUpdate,
                &params,
                bindings,
                Dispatch::Direct([1, 1, 1]),
            )?;
        }
    }

    end_scope(graph);
    macro_groups.aabb_buffer = Some(buffer);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::bounds_from_sphere;
    use crate::cluster::cluster_operations::tests::{test_instance, test_public_data};
    use crate::cluster::{add_cluster_culling_passes, add_instance_to_cluster_data, CullingParams};
    use crate::config::CullingConfig;
    use crate::view::view_operations::tests::test_view;
    use cgmath::Point3;

    fn cards(primitive_id: u32, center: [f32; 3], radius: f32, resource_id: u64) -> HairMeshBatch {
        HairMeshBatch {
            primitive_id,
            bounds: bounds_from_sphere(Point3::new(center[0], center[1], center[2]), radius),
            material_id: 0,
            geometry: HairGeometry::Cards {
                resource_id,
                group_index: 0,
            },
        }
    }

    #[test]
    fn test_zero_batches_give_zero_groups() {
        let groups = build_macro_groups(&test_view(), &[]);
        assert!(groups.datas.is_empty());
        assert_eq!(groups.union_screen_rect, ScreenRect::default());
    }

    #[test]
    fn test_overlapping_batches_merge() {
        let batches = vec![
            cards(0, [0.0, 0.0, -500.0], 50.0, 1),
            cards(1, [60.0, 0.0, -500.0], 50.0, 2),
            cards(2, [1000.0, 0.0, -500.0], 50.0, 3),
        ];
        let groups = build_macro_groups(&test_view(), &batches);
        assert_eq!(groups.datas.len(), 2);
        assert_eq!(groups.datas[0].primitives.len(), 2);
        assert_eq!(groups.datas[1].macro_group_id, 1);
        assert!(groups.datas[0].bounds.box_extent.x >= 80.0);
    }

    #[test]
    fn test_first_intersecting_group_wins() {
        // The third batch touches both groups; it joins the first one and
        // the two groups stay separate.
        let batches = vec![
            cards(0, [0.0, 0.0, -500.0], 10.0, 1),
            cards(1, [100.0, 0.0, -500.0], 10.0, 2),
            cards(2, [50.0, 0.0, -500.0], 45.0, 3),
        ];
        let groups = build_macro_groups(&test_view(), &batches);
        assert_eq!(groups.datas.len(), 2);
        assert_eq!(groups.datas[0].primitives.len(), 2);
        assert_eq!(groups.datas[0].primitives[1].primitive_id, 2);
        assert_eq!(groups.datas[1].primitives.len(), 1);
    }

    #[test]
    fn test_primitive_groups_deduplicated() {
        let batches = vec![
            cards(0, [0.0, 0.0, -500.0], 50.0, 7),
            cards(1, [1.0, 0.0, -500.0], 50.0, 7),
        ];
        let groups = build_macro_groups(&test_view(), &batches);
        assert_eq!(groups.datas[0].primitives.len(), 2);
        assert_eq!(groups.datas[0].primitive_groups.len(), 1);
    }

    #[test]
    fn test_screen_rect_of_visible_group() {
        let groups = build_macro_groups(&test_view(), &[cards(0, [0.0, 0.0, -500.0], 50.0, 1)]);
        assert!(!crate::view::screen_rect_is_empty(&groups.union_screen_rect));

        let behind = build_macro_groups(&test_view(), &[cards(0, [0.0, 0.0, 500.0], 50.0, 1)]);
        assert!(crate::view::screen_rect_is_empty(&behind.union_screen_rect));
    }

    #[test]
    fn test_short_batch_filled_with_first_entry() {
        let handles: Vec<BufferHandle> = (0..11).map(BufferHandle).collect();
        let batches = plan_macro_group_aabb_batches(&handles);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].valid_mask, 0xFF);
        assert_eq!(batches[1].valid_mask, 0b111);
        assert_eq!(&batches[1].slots[..3], &[BufferHandle(8), BufferHandle(9), BufferHandle(10)]);
        assert!(batches[1].slots[3..].iter().all(|&slot| slot == BufferHandle(8)));
        assert!(plan_macro_group_aabb_batches(&[]).is_empty());
    }

    #[test]
    fn test_aabb_passes_bind_culled_groups() {
        let view = test_view();
        let mut cluster_data = ClusterData::default();
        let mut batches = Vec::new();
        for resource_id in 1..=9 {
            let public = test_public_data(resource_id, 0, 64, 2);
            add_instance_to_cluster_data(test_instance(public.clone()), &mut cluster_data).unwrap();
            batches.push(HairMeshBatch {
                primitive_id: resource_id as u32,
                bounds: bounds_from_sphere(Point3::new(0.0, 0.0, -500.0), 50.0),
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

        let mut groups = build_macro_groups(&view, &batches);
        assert_eq!(groups.datas.len(), 1);
        add_macro_group_aabb_passes(&mut graph, &mut groups, &cluster_data).unwrap();

        let passes = passes_named(&graph, "HairStrandsMacroGroupAABBUpdate");
        assert_eq!(passes.len(), 2);
        let first: MacroGroupAabbParams = pass_params(passes[0]).unwrap();
        let second: MacroGroupAabbParams = pass_params(passes[1]).unwrap();
        assert_eq!(first.clear_buffer, 1);
        assert_eq!(second.clear_buffer, 0);
        assert_eq!(second.macro_group_valid, 1);
        assert_eq!(passes[0].bindings.len(), AABB_UPDATE_GROUP_PER_PASS + 1);
        assert!(groups.aabb_buffer.is_some());
    }

    #[test]
    fn test_cards_only_group_gets_cleared_aabb() {
        let mut graph = create_frame_graph("test");
        let mut groups = build_macro_groups(&test_view(), &[cards(0, [0.0, 0.0, -500.0], 50.0, 7)]);
        assert_eq!(groups.datas.len(), 1);
        add_macro_group_aabb_passes(&mut graph, &mut groups, &ClusterData::default()).unwrap();

        assert!(passes_named(&graph, "HairStrandsMacroGroupAABBUpdate").is_empty());
        let clears = passes_named(&graph, "HairStrandsMacroGroupAABBClear");
        assert_eq!(clears.len(), 1);
        let buffer = groups.aabb_buffer.unwrap();
        assert!(matches!(
            clears[0].kind,
            PassKind::ClearBuffer { buffer: cleared, value: 0 } if cleared == buffer
        ));
    }
}
