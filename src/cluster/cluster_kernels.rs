//! CPU reference of the cluster culling kernels
//!
//! Same algorithm as the GPU passes recorded by `cluster_operations`: LOD
//! selection, frustum/occlusion test, three-level block prefix sum and
//! compaction into the culled vertex buffers.

use super::cluster_data::*;
use crate::bounds::{aabb_center, aabb_half_extents, aabb_in_frustum, AABB};
use crate::constants::cluster::{
    PREFIX_SUM_BLOCK_SIZE, PREFIX_SUM_LEVEL_COUNT, VERTICES_PER_CONTROL_POINT,
};
use crate::dispatch::DrawIndirectArgs;
use crate::error::{StrandsError, StrandsResult};
use cgmath::{InnerSpace, MetricSpace};
use rayon::prelude::*;

/// Approximate screen height fraction covered by a box
pub fn cluster_screen_size(aabb: &AABB, view_origin: cgmath::Point3<f32>, projection_scale: f32) -> f32 {
    let radius = aabb_half_extents(aabb).magnitude();
    let distance = aabb_center(aabb).distance(view_origin);
    if distance <= radius {
        return f32::MAX;
    }
    radius / distance * projection_scale
}

/// Pick the LOD of one cluster
///
/// Thresholds are ordered largest first; the first threshold the screen size
/// reaches wins, then the bias shifts toward coarser LODs.
pub fn select_cluster_lod(
    screen_size: f32,
    lod_screen_sizes: &[f32],
    lod_bias: f32,
    forced_lod: Option<u32>,
) -> u32 {
    let last = lod_screen_sizes.len().saturating_sub(1) as u32;
    if let Some(forced) = forced_lod {
        return forced.min(last);
    }

    let base = lod_screen_sizes
        .iter()
        .position(|&threshold| screen_size >= threshold)
        .unwrap_or(last as usize) as f32;

    (base + lod_bias).floor().clamp(0.0, last as f32) as u32
}

/// Cull every cluster and select its LOD
pub fn cull_clusters(clusters: &[CpuCluster], inputs: &CpuCullingInputs<'_>) -> Vec<ClusterSelection> {
    clusters
        .par_iter()
        .map(|cluster| {
            let in_frustum = aabb_in_frustum(inputs.frustum, &cluster.world_aabb);
            let occluded = inputs
                .occluded
                .map_or(false, |occluded| occluded(&cluster.world_aabb));

            let screen_size =
                cluster_screen_size(&cluster.world_aabb, inputs.view_origin, inputs.projection_scale);
            let lod = select_cluster_lod(
                screen_size,
                inputs.lod_screen_sizes,
                inputs.lod_bias,
                inputs.forced_lod,
            )
            .min(cluster.lods.len().saturating_sub(1) as u32);

            let vertex_count = if in_frustum && !occluded {
                cluster.lods.get(lod as usize).map_or(0, |info| info.vertex_count)
            } else {
                0
            };
            ClusterSelection { lod, vertex_count }
        })
        .collect()
}

/// Exclusive scan inside fixed-size blocks, plus the sum of each block
fn scan_blocks(values: &[u32]) -> (Vec<u32>, Vec<u32>) {
    let block = PREFIX_SUM_BLOCK_SIZE as usize;
    let mut local = Vec::with_capacity(values.len());
    let mut sums = Vec::with_capacity(values.len() / block + 1);

    for chunk in values.chunks(block) {
        let mut running = 0u32;
        for &value in chunk {
            local.push(running);
            running += value;
        }
        sums.push(running);
    }
    (local, sums)
}

/// Exclusive prefix sum with the three-level block scheme of the GPU passes
///
/// Fails when the input needs more than three levels.
pub fn block_prefix_sum(values: &[u32]) -> StrandsResult<BlockPrefixSum> {
    let block = PREFIX_SUM_BLOCK_SIZE as usize;
    let capacity = block.pow(PREFIX_SUM_LEVEL_COUNT as u32);
    if values.len() > capacity {
        return Err(StrandsError::BufferSizeMismatch {
            resource: "ClusterPrefixSum".to_string(),
            expected: capacity as u64,
            found: values.len() as u64,
        });
    }

    let (level0, sums0) = scan_blocks(values);
    let (level1, sums1) = scan_blocks(&sums0);
    let (level2, sums2) = scan_blocks(&sums1);

    let offsets = level0
        .iter()
        .enumerate()
        .map(|(i, &local)| {
            let block0 = i / block;
            let block1 = block0 / block;
            local + level1[block0] + level2[block1]
        })
        .collect();

    Ok(BlockPrefixSum {
        offsets,
        total: sums2.iter().sum(),
    })
}

/// Copy the selected LOD vertex ids of every visible cluster into one
/// contiguous range
pub fn compact_culled_vertices(
    clusters: &[CpuCluster],
    selections: &[ClusterSelection],
    prefix: &BlockPrefixSum,
    cluster_vertex_ids: &[u32],
) -> StrandsResult<CulledVertices> {
    let total = prefix.total as usize;
    let mut vertex_ids = vec![0u32; total];
    let mut radius_scales = vec![0.0f32; total];
    let mut visible_cluster_count = 0;

    for (index, (cluster, selection)) in clusters.iter().zip(selections).enumerate() {
        if selection.vertex_count == 0 {
            continue;
        }
        let info = cluster
            .lods
            .get(selection.lod as usize)
            .ok_or_else(|| StrandsError::MissingResource {
                resource: format!("ClusterLODInfo[{}][{}]", index, selection.lod),
            })?;

        let start = info.vertex_offset as usize;
        let count = selection.vertex_count as usize;
        let source = cluster_vertex_ids
            .get(start..start + count)
            .ok_or_else(|| StrandsError::BufferSizeMismatch {
                resource: "ClusterVertexIdBuffer".to_string(),
                expected: (start + count) as u64,
                found: cluster_vertex_ids.len() as u64,
            })?;

        let offset = prefix.offsets[index] as usize;
        vertex_ids[offset..offset + count].copy_from_slice(source);
        radius_scales[offset..offset + count].fill(info.radius_scale);
        visible_cluster_count += 1;
    }

    Ok(CulledVertices {
        vertex_ids,
        radius_scales,
        visible_cluster_count,
    })
}

/// Full culling chain: cull, scan, compact
pub fn cull_and_compact(
    clusters: &[CpuCluster],
    inputs: &CpuCullingInputs<'_>,
    cluster_vertex_ids: &[u32],
) -> StrandsResult<CulledVertices> {
    let selections = cull_clusters(clusters, inputs);
    let counts: Vec<u32> = selections.iter().map(|s| s.vertex_count).collect();
    let prefix = block_prefix_sum(&counts)?;
    compact_culled_vertices(clusters, &selections, &prefix, cluster_vertex_ids)
}

/// Draw args covering every control point of a group
pub fn reset_draw_args(control_point_count: u32) -> DrawIndirectArgs {
    culled_draw_args(control_point_count)
}

/// Draw args covering the compacted control points
pub fn culled_draw_args(culled_vertex_count: u32) -> DrawIndirectArgs {
    DrawIndirectArgs {
        vertex_count: culled_vertex_count * VERTICES_PER_CONTROL_POINT,
        instance_count: 1,
        first_vertex: 0,
        first_instance: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::{create_aabb, extract_frustum_planes};
    use cgmath::{perspective, Deg, Matrix4, Point3, Vector3};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn test_frustum() -> crate::bounds::FrustumPlanes {
        let view = Matrix4::look_at_rh(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, -1.0),
            Vector3::unit_y(),
        );
        extract_frustum_planes(&(perspective(Deg(90.0), 1.0, 0.1, 1000.0) * view))
    }

    fn lod(vertex_offset: u32, vertex_count: u32, radius_scale: f32) -> ClusterLodInfo {
        ClusterLodInfo {
            vertex_offset,
            vertex_count,
            radius_scale,
            _padding: 0,
        }
    }

    #[test]
    fn test_select_lod_thresholds_and_bias() {
        let thresholds = [0.5, 0.1, 0.0];
        assert_eq!(select_cluster_lod(0.8, &thresholds, 0.0, None), 0);
        assert_eq!(select_cluster_lod(0.2, &thresholds, 0.0, None), 1);
        assert_eq!(select_cluster_lod(0.05, &thresholds, 0.0, None), 2);
        assert_eq!(select_cluster_lod(0.8, &thresholds, 1.0, None), 1);
        assert_eq!(select_cluster_lod(0.8, &thresholds, 10.0, None), 2);
        assert_eq!(select_cluster_lod(0.05, &thresholds, -5.0, None), 0);
        assert_eq!(select_cluster_lod(0.05, &thresholds, 0.0, Some(0)), 0);
        assert_eq!(select_cluster_lod(0.05, &thresholds, 0.0, Some(9)), 2);
    }

    #[test]
    fn test_prefix_sum_matches_sequential_scan() {
        let mut rng = StdRng::seed_from_u64(7);
        let values: Vec<u32> = (0..1500).map(|_| rng.gen_range(0..40)).collect();

        let result = block_prefix_sum(&values).unwrap();

        let mut running = 0;
        for (i, &value) in values.iter().enumerate() {
            assert_eq!(result.offsets[i], running, "offset {}", i);
            running += value;
        }
        assert_eq!(result.total, running);
    }

    #[test]
    fn test_prefix_sum_crosses_second_level() {
        let values = vec![1u32; 512 * 512 + 3];
        let result = block_prefix_sum(&values).unwrap();
        assert_eq!(result.offsets[512 * 512 + 2], 512 * 512 + 2);
        assert_eq!(result.total, 512 * 512 + 3);
    }

    #[test]
    fn test_cull_and_compact() {
        let frustum = test_frustum();
        let clusters = vec![
            CpuCluster {
                world_aabb: create_aabb(Point3::new(-1.0, -1.0, -11.0), Point3::new(1.0, 1.0, -9.0)),
                lods: vec![lod(0, 4, 1.0), lod(4, 2, 2.0)],
            },
            // Behind the camera
            CpuCluster {
                world_aabb: create_aabb(Point3::new(-1.0, -1.0, 9.0), Point3::new(1.0, 1.0, 11.0)),
                lods: vec![lod(6, 3, 1.0), lod(9, 1, 3.0)],
            },
            CpuCluster {
                world_aabb: create_aabb(Point3::new(2.0, -1.0, -11.0), Point3::new(4.0, 1.0, -9.0)),
                lods: vec![lod(10, 3, 1.0), lod(13, 1, 3.0)],
            },
        ];
        let vertex_ids: Vec<u32> = (100..114).collect();
        let inputs = CpuCullingInputs {
            frustum: &frustum,
            view_origin: Point3::new(0.0, 0.0, 0.0),
            projection_scale: 1.0,
            lod_screen_sizes: &[0.01, 0.0],
            lod_bias: 0.0,
            forced_lod: None,
            occluded: None,
        };

        let culled = cull_and_compact(&clusters, &inputs, &vertex_ids).unwrap();
        assert_eq!(culled.visible_cluster_count, 2);
        assert_eq!(culled.vertex_ids, vec![100, 101, 102, 103, 110, 111, 112]);
        assert!(culled.radius_scales.iter().all(|&s| s == 1.0));

        let coarse = CpuCullingInputs {
            forced_lod: Some(1),
            ..inputs
        };
        let culled = cull_and_compact(&clusters, &coarse, &vertex_ids).unwrap();
        assert_eq!(culled.vertex_ids, vec![104, 105, 113]);
        assert_eq!(culled.radius_scales, vec![2.0, 2.0, 3.0]);
    }

    #[test]
    fn test_occluded_clusters_removed() {
        let frustum = test_frustum();
        let clusters = vec![CpuCluster {
            world_aabb: create_aabb(Point3::new(-1.0, -1.0, -11.0), Point3::new(1.0, 1.0, -9.0)),
            lods: vec![lod(0, 2, 1.0)],
        }];
        let hide_all = |_: &AABB| true;
        let inputs = CpuCullingInputs {
            frustum: &frustum,
            view_origin: Point3::new(0.0, 0.0, 0.0),
            projection_scale: 1.0,
            lod_screen_sizes: &[0.0],
            lod_bias: 0.0,
            forced_lod: None,
            occluded: Some(&hide_all),
        };
        let culled = cull_and_compact(&clusters, &inputs, &[7, 8]).unwrap();
        assert!(culled.vertex_ids.is_empty());
        assert_eq!(culled.visible_cluster_count, 0);
    }

    #[test]
    fn test_draw_args() {
        assert_eq!(reset_draw_args(1000).vertex_count, 6000);
        assert_eq!(culled_draw_args(0).vertex_count, 0);
        assert_eq!(culled_draw_args(5).instance_count, 1);
    }
}
