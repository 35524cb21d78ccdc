//! CPU reference of the visibility kernels
//!
//! MSAA duplicate merge, linked-list append and walk, material sample merge,
//! per-pixel categorization and compaction into a bounded node array.

use super::visibility_data::*;
use crate::arena::AtomicArena;
use crate::constants::visibility::PPLL_END_OF_LIST;
use cgmath::InnerSpace;
use rayon::prelude::*;
use std::cmp::Ordering;

fn by_depth(a: &VisibilitySample, b: &VisibilitySample) -> Ordering {
    a.depth.partial_cmp(&b.depth).unwrap_or(Ordering::Equal)
}

/// Merge the MSAA sub-samples of one pixel by primitive id
///
/// Each sub-sample adds `1 / sample_count` coverage to its primitive; the
/// closest depth of a primitive is kept. Output is sorted front to back.
pub fn merge_msaa_samples(subsamples: &[Option<VisibilitySample>]) -> Vec<VisibilitySample> {
    let weight = 1.0 / subsamples.len().max(1) as f32;
    let mut merged: Vec<VisibilitySample> = Vec::new();

    for sample in subsamples.iter().flatten() {
        match merged.iter_mut().find(|m| m.primitive_id == sample.primitive_id) {
            Some(existing) => {
                existing.coverage += weight;
                if sample.depth < existing.depth {
                    existing.depth = sample.depth;
                }
            }
            None => merged.push(VisibilitySample {
                coverage: weight,
                ..*sample
            }),
        }
    }

    merged.sort_by(by_depth);
    merged
}

/// Empty linked lists for a view with room for `node_budget` nodes
pub fn create_ppll(resolution: [u32; 2], node_budget: u32) -> CpuPpll {
    CpuPpll {
        resolution,
        heads: vec![PPLL_END_OF_LIST; resolution[0] as usize * resolution[1] as usize],
        nodes: Vec::with_capacity(node_budget as usize),
        dropped_count: 0,
    }
}

/// Append fragments to the per-pixel lists
///
/// Node slots come from the arena in submission order; once it runs dry the
/// remaining fragments are dropped and counted.
pub fn ppll_append(ppll: &mut CpuPpll, arena: &AtomicArena, fragments: &[(u32, VisibilitySample)]) {
    for &(pixel, sample) in fragments {
        let Some(head) = ppll.heads.get_mut(pixel as usize) else {
            ppll.dropped_count += 1;
            continue;
        };
        match arena.allocate() {
            Some(index) => {
                debug_assert_eq!(index as usize, ppll.nodes.len());
                ppll.nodes.push((sample, *head));
                *head = index;
            }
            None => ppll.dropped_count += 1,
        }
    }
}

/// Walk one pixel's list and return its samples front to back
pub fn ppll_collect(ppll: &CpuPpll, pixel: u32) -> Vec<VisibilitySample> {
    let mut samples = Vec::new();
    let mut next = ppll.heads.get(pixel as usize).copied().unwrap_or(PPLL_END_OF_LIST);
    while next != PPLL_END_OF_LIST {
        let Some(&(sample, following)) = ppll.nodes.get(next as usize) else {
            break;
        };
        samples.push(sample);
        next = following;
    }
    samples.sort_by(by_depth);
    samples
}

/// Merge samples closer than `depth_threshold` whose tangents are within the
/// angle given by `tangent_cos_threshold`
///
/// Coverage adds up (clamped to 1) and the closer depth is kept.
pub fn merge_material_samples(
    samples: &[VisibilitySample],
    depth_threshold: f32,
    tangent_cos_threshold: f32,
) -> Vec<VisibilitySample> {
    let mut merged: Vec<VisibilitySample> = Vec::with_capacity(samples.len());

    for sample in samples {
        let target = merged.iter_mut().find(|m| {
            (m.depth - sample.depth).abs() < depth_threshold
                && m.tangent.dot(sample.tangent) > tangent_cos_threshold
        });
        match target {
            Some(existing) => {
                existing.coverage = (existing.coverage + sample.coverage).min(1.0);
                if sample.depth < existing.depth {
                    existing.depth = sample.depth;
                    existing.primitive_id = sample.primitive_id;
                }
            }
            None => merged.push(*sample),
        }
    }

    merged.sort_by(by_depth);
    merged
}

/// Summary texel of one pixel
pub fn categorize_pixel(samples: &[VisibilitySample]) -> CategorizationTexel {
    let coverage = samples.iter().map(|s| s.coverage).sum::<f32>().min(1.0);
    let closest_index = samples
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| by_depth(a, b))
        .map_or(0, |(index, _)| index as u32);

    CategorizationTexel {
        sample_count: samples.len() as u32,
        coverage,
        closest_index,
        _padding: 0,
    }
}

/// Compact every pixel's samples into one bounded node array
///
/// Pixels reserve their node range from a shared arena in parallel, so the
/// order of ranges is unspecified but every range is disjoint. A pixel whose
/// range does not fit keeps zero nodes and its samples are counted as dropped.
pub fn compact_visibility(pixels: &[Vec<VisibilitySample>], max_node_count: u32) -> CompactedVisibility {
    let arena = AtomicArena::new(max_node_count);

    let ranges: Vec<Option<std::ops::Range<u32>>> = pixels
        .par_iter()
        .map(|samples| arena.allocate_range(samples.len() as u32))
        .collect();

    let mut nodes = vec![
        VisibilitySample {
            depth: 0.0,
            primitive_id: 0,
            macro_group_id: 0,
            tangent: cgmath::Vector3::new(0.0, 0.0, 0.0),
            coverage: 0.0,
        };
        arena.allocated_count() as usize
    ];
    let mut node_index = Vec::with_capacity(pixels.len());
    let mut categorization = Vec::with_capacity(pixels.len());
    let mut dropped_count = 0;

    for (samples, range) in pixels.iter().zip(ranges) {
        match range {
            Some(range) => {
                let start = range.start as usize;
                nodes[start..start + samples.len()].copy_from_slice(samples);
                node_index.push((range.start, samples.len() as u32));
                categorization.push(categorize_pixel(samples));
            }
            None => {
                dropped_count += samples.len() as u32;
                node_index.push((0, 0));
                categorization.push(CategorizationTexel::default());
            }
        }
    }

    CompactedVisibility {
        node_index,
        nodes,
        categorization,
        dropped_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Vector3;

    fn sample(primitive_id: u32, depth: f32) -> VisibilitySample {
        VisibilitySample {
            depth,
            primitive_id,
            macro_group_id: 0,
            tangent: Vector3::unit_x(),
            coverage: 1.0,
        }
    }

    #[test]
    fn test_msaa_merge_by_primitive() {
        let subsamples = [
            Some(sample(3, 5.0)),
            Some(sample(1, 2.0)),
            Some(sample(3, 4.0)),
            None,
        ];
        let merged = merge_msaa_samples(&subsamples);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].primitive_id, 1);
        assert_eq!(merged[0].coverage, 0.25);
        assert_eq!(merged[1].primitive_id, 3);
        assert_eq!(merged[1].coverage, 0.5);
        assert_eq!(merged[1].depth, 4.0);
    }

    #[test]
    fn test_ppll_append_respects_budget() {
        let mut ppll = create_ppll([2, 2], 3);
        let arena = AtomicArena::new(3);
        let fragments = vec![
            (0, sample(1, 3.0)),
            (0, sample(2, 1.0)),
            (3, sample(3, 2.0)),
            (0, sample(4, 0.5)),
        ];
        ppll_append(&mut ppll, &arena, &fragments);

        assert_eq!(ppll.nodes.len(), 3);
        assert_eq!(ppll.dropped_count, 1);
        assert!(arena.overflowed());

        let pixel0 = ppll_collect(&ppll, 0);
        assert_eq!(pixel0.iter().map(|s| s.primitive_id).collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(ppll_collect(&ppll, 3).len(), 1);
        assert!(ppll_collect(&ppll, 1).is_empty());
    }

    #[test]
    fn test_material_merge_thresholds() {
        let cos_10 = 10.0f32.to_radians().cos();
        let mut parallel = sample(2, 10.5);
        parallel.coverage = 0.3;
        let mut crossing = sample(3, 10.2);
        crossing.tangent = Vector3::unit_y();
        let far = sample(4, 20.0);

        let mut first = sample(1, 10.0);
        first.coverage = 0.4;
        let merged = merge_material_samples(&[first, parallel, crossing, far], 1.0, cos_10);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].primitive_id, 1);
        assert!((merged[0].coverage - 0.7).abs() < 1e-6);
        assert_eq!(merged[1].primitive_id, 3);
        assert_eq!(merged[2].primitive_id, 4);
    }

    #[test]
    fn test_categorize_pixel() {
        let samples = [sample(1, 4.0), sample(2, 1.0), sample(3, 2.0)];
        let texel = categorize_pixel(&samples);
        assert_eq!(texel.sample_count, 3);
        assert_eq!(texel.coverage, 1.0);
        assert_eq!(texel.closest_index, 1);
        assert_eq!(categorize_pixel(&[]), CategorizationTexel::default());
    }

    #[test]
    fn test_compaction_ranges_disjoint_and_bounded() {
        let pixels: Vec<Vec<VisibilitySample>> = (0..64)
            .map(|i| (0..(i % 4)).map(|j| sample(i * 10 + j, j as f32)).collect())
            .collect();
        let total: u32 = pixels.iter().map(|p| p.len() as u32).sum();

        let full = compact_visibility(&pixels, total);
        assert_eq!(full.nodes.len() as u32, total);
        assert_eq!(full.dropped_count, 0);
        let mut covered = vec![false; total as usize];
        for (pixel, &(offset, count)) in full.node_index.iter().enumerate() {
            for k in offset..offset + count {
                assert!(!covered[k as usize]);
                covered[k as usize] = true;
            }
            if count > 0 {
                assert_eq!(full.nodes[offset as usize].primitive_id, pixel as u32 * 10);
            }
        }
        assert!(covered.iter().all(|&c| c));

        let limited = compact_visibility(&pixels, 20);
        let handed_out: u32 = limited.node_index.iter().map(|&(_, count)| count).sum();
        assert_eq!(limited.nodes.len() as u32, handed_out);
        assert!(limited.nodes.len() <= 20);
        assert!(limited.dropped_count > 0);
    }
}
