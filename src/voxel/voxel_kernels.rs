//! CPU reference of the page allocation kernels
//!
//! Marks the page indices touched by cluster bounds and binds physical pages
//! to them from a fixed pool, the way the GPU does with one atomic counter.

use super::voxel_data::{PageAllocation, PageIndexAllocation};
use crate::arena::AtomicArena;
use crate::bounds::{aabb_intersects, AABB};
use crate::constants::voxel::INVALID_PAGE_INDEX;
use rayon::prelude::*;

/// 3D coordinate of a linear index inside a `resolution` grid, x fastest
pub fn page_coord_from_linear(linear: u32, resolution: [u32; 3]) -> [u32; 3] {
    let [x, y, _] = resolution.map(|r| r.max(1));
    [linear % x, (linear / x) % y, linear / (x * y)]
}

fn page_range(min: f32, max: f32, origin: f32, page_world_size: f32, resolution: u32) -> (u32, u32) {
    let last = resolution.saturating_sub(1) as f32;
    let lo = ((min - origin) / page_world_size).floor().clamp(0.0, last) as u32;
    let hi = ((max - origin) / page_world_size).floor().clamp(0.0, last) as u32;
    (lo, hi)
}

/// Valid flag per page index of one macro group
///
/// A page index is valid when at least one cluster box overlaps it.
pub fn mark_valid_pages(allocation: &PageIndexAllocation, page_world_size: f32, cluster_aabbs: &[AABB]) -> Vec<bool> {
    let [rx, ry, rz] = allocation.page_index_resolution;
    let mut valid = vec![false; allocation.count as usize];
    let origin = allocation.world_aabb.min;

    for aabb in cluster_aabbs.iter().filter(|aabb| aabb_intersects(aabb, &allocation.world_aabb)) {
        let (x0, x1) = page_range(aabb.min.x, aabb.max.x, origin.x, page_world_size, rx);
        let (y0, y1) = page_range(aabb.min.y, aabb.max.y, origin.y, page_world_size, ry);
        let (z0, z1) = page_range(aabb.min.z, aabb.max.z, origin.z, page_world_size, rz);
        for z in z0..=z1 {
            for y in y0..=y1 {
                for x in x0..=x1 {
                    valid[(x + y * rx + z * rx * ry) as usize] = true;
                }
            }
        }
    }

    valid
}

/// Bind physical pages to the valid page indices
///
/// Runs in parallel; which index gets which page is unspecified, but pages
/// are unique and never more than `page_count` are handed out.
pub fn allocate_pages(valid: &[bool], page_count: u32) -> PageAllocation {
    let arena = AtomicArena::new(page_count);

    let page_index: Vec<u32> = valid
        .par_iter()
        .map(|&is_valid| {
            if is_valid {
                arena.allocate().unwrap_or(INVALID_PAGE_INDEX)
            } else {
                INVALID_PAGE_INDEX
            }
        })
        .collect();

    let mut page_to_page_index = vec![INVALID_PAGE_INDEX; page_count as usize];
    for (index, &page) in page_index.iter().enumerate() {
        if page != INVALID_PAGE_INDEX {
            page_to_page_index[page as usize] = index as u32;
        }
    }

    if arena.overflowed() {
        log::debug!(
            "[voxel_kernels::allocate_pages] {} pages requested, {} available",
            arena.requested_count(),
            page_count
        );
    }

    PageAllocation {
        page_index,
        page_to_page_index,
        requested_count: arena.requested_count(),
        allocated_count: arena.allocated_count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::create_aabb;
    use cgmath::Point3;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use rustc_hash::FxHashSet;

    fn allocation(resolution: [u32; 3], page_world_size: f32) -> PageIndexAllocation {
        let size = resolution.map(|r| r as f32 * page_world_size);
        PageIndexAllocation {
            macro_group_id: 0,
            world_aabb: create_aabb(Point3::new(0.0, 0.0, 0.0), Point3::new(size[0], size[1], size[2])),
            page_index_resolution: resolution,
            count: resolution.iter().product(),
            offset: 0,
        }
    }

    #[test]
    fn test_page_coord_from_linear() {
        assert_eq!(page_coord_from_linear(0, [4, 3, 2]), [0, 0, 0]);
        assert_eq!(page_coord_from_linear(5, [4, 3, 2]), [1, 1, 0]);
        assert_eq!(page_coord_from_linear(23, [4, 3, 2]), [3, 2, 1]);
    }

    #[test]
    fn test_mark_valid_pages() {
        let alloc = allocation([4, 4, 4], 1.0);
        let clusters = [
            create_aabb(Point3::new(0.2, 0.2, 0.2), Point3::new(0.8, 0.8, 0.8)),
            create_aabb(Point3::new(2.5, 0.5, 0.5), Point3::new(3.5, 0.6, 0.6)),
            create_aabb(Point3::new(50.0, 50.0, 50.0), Point3::new(51.0, 51.0, 51.0)),
        ];
        let valid = mark_valid_pages(&alloc, 1.0, &clusters);
        let marked: Vec<usize> = valid.iter().enumerate().filter(|(_, v)| **v).map(|(i, _)| i).collect();
        assert_eq!(marked, vec![0, 2, 3]);
    }

    #[test]
    fn test_allocated_pages_never_exceed_pool() {
        let mut rng = StdRng::seed_from_u64(11);
        for page_count in [0u32, 1, 17, 64, 512] {
            let valid: Vec<bool> = (0..300).map(|_| rng.gen_bool(0.6)).collect();
            let result = allocate_pages(&valid, page_count);

            let bound: Vec<u32> = result
                .page_index
                .iter()
                .copied()
                .filter(|&p| p != INVALID_PAGE_INDEX)
                .collect();
            let unique: FxHashSet<u32> = bound.iter().copied().collect();

            assert!(bound.len() as u32 <= page_count);
            assert_eq!(unique.len(), bound.len());
            assert!(bound.iter().all(|&p| p < page_count));
            assert_eq!(result.requested_count, valid.iter().filter(|v| **v).count() as u32);
            assert_eq!(result.allocated_count, bound.len() as u32);

            for (page, &index) in result.page_to_page_index.iter().enumerate() {
                if index != INVALID_PAGE_INDEX {
                    assert_eq!(result.page_index[index as usize], page as u32);
                }
            }
        }
    }
}
