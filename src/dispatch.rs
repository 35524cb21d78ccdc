//! Dispatch sizing and indirect argument layouts
//!
//! Every direct dispatch recorded by the crate goes through these helpers so
//! the per-dimension group limit is checked before anything reaches the GPU.

use crate::constants::gpu_limits::MAX_DISPATCH_GROUPS_PER_DIMENSION;
use crate::error::{StrandsError, StrandsResult};
use bytemuck::{Pod, Zeroable};

/// Arguments consumed by an indirect compute dispatch
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DispatchIndirectArgs {
    pub group_count_x: u32,
    pub group_count_y: u32,
    pub group_count_z: u32,
}

/// Arguments consumed by an indirect non-indexed draw
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndirectArgs {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

static_assertions::const_assert_eq!(std::mem::size_of::<DispatchIndirectArgs>(), 12);
static_assertions::const_assert_eq!(std::mem::size_of::<DrawIndirectArgs>(), 16);

/// Ceil division used for every group count
pub fn div_round_up(value: u32, divisor: u32) -> u32 {
    if divisor == 0 {
        return 0;
    }
    ((value as u64 + divisor as u64 - 1) / divisor as u64) as u32
}

/// Group count along one dimension, failing above the hardware limit
pub fn group_count_1d(pass: &str, item_count: u32, group_size: u32) -> StrandsResult<[u32; 3]> {
    if group_size == 0 {
        return Err(StrandsError::InvalidGroupSize {
            pass: pass.to_string(),
        });
    }

    let groups = div_round_up(item_count, group_size);
    check_dimension(pass, groups as u64)?;
    Ok([groups, 1, 1])
}

/// Group count wrapped into a 2D grid once X would exceed the limit
///
/// Kernels dispatched this way linearize `group_id.y * group_count.x + group_id.x`
/// and early-out past `item_count`.
pub fn group_count_2d(pass: &str, item_count: u32, group_size: u32) -> StrandsResult<[u32; 3]> {
    if group_size == 0 {
        return Err(StrandsError::InvalidGroupSize {
            pass: pass.to_string(),
        });
    }

    let groups = div_round_up(item_count, group_size);
    if groups <= MAX_DISPATCH_GROUPS_PER_DIMENSION {
        return Ok([groups, 1, 1]);
    }

    let x = MAX_DISPATCH_GROUPS_PER_DIMENSION;
    let y = div_round_up(groups, x);
    check_dimension(pass, y as u64)?;
    Ok([x, y, 1])
}

/// Group count of a per-pixel pass tiled in `tile x tile` groups
pub fn group_count_tiles(pass: &str, resolution: [u32; 2], tile: u32) -> StrandsResult<[u32; 3]> {
    if tile == 0 {
        return Err(StrandsError::InvalidGroupSize {
            pass: pass.to_string(),
        });
    }
    let groups = [div_round_up(resolution[0], tile), div_round_up(resolution[1], tile), 1];
    validate_group_count(pass, groups)?;
    Ok(groups)
}

/// Validate an explicit group count triple
pub fn validate_group_count(pass: &str, groups: [u32; 3]) -> StrandsResult<()> {
    for count in groups {
        check_dimension(pass, count as u64)?;
    }
    Ok(())
}

fn check_dimension(pass: &str, group_count: u64) -> StrandsResult<()> {
    if group_count > MAX_DISPATCH_GROUPS_PER_DIMENSION as u64 {
        log::error!(
            "[dispatch::check_dimension] {} requested {} groups, limit is {}",
            pass,
            group_count,
            MAX_DISPATCH_GROUPS_PER_DIMENSION
        );
        return Err(StrandsError::DispatchLimitExceeded {
            pass: pass.to_string(),
            group_count,
            limit: MAX_DISPATCH_GROUPS_PER_DIMENSION,
        });
    }
    Ok(())
}

/// Indirect dispatch args covering `item_count` items, as the GPU args kernels write them
pub fn dispatch_args_for_items(item_count: u32, group_size: u32) -> DispatchIndirectArgs {
    let groups = div_round_up(item_count, group_size);
    if groups <= MAX_DISPATCH_GROUPS_PER_DIMENSION {
        DispatchIndirectArgs {
            group_count_x: groups,
            group_count_y: 1,
            group_count_z: 1,
        }
    } else {
        DispatchIndirectArgs {
            group_count_x: MAX_DISPATCH_GROUPS_PER_DIMENSION,
            group_count_y: div_round_up(groups, MAX_DISPATCH_GROUPS_PER_DIMENSION),
            group_count_z: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_count_boundary() {
        let at_limit = 65535u32 * 512;
        assert_eq!(
            group_count_1d("test", at_limit, 512).unwrap(),
            [65535, 1, 1]
        );

        let over_limit = at_limit + 1;
        let err = group_count_1d("test", over_limit, 512).unwrap_err();
        assert!(matches!(
            err,
            StrandsError::DispatchLimitExceeded {
                group_count: 65536,
                ..
            }
        ));
    }

    #[test]
    fn test_group_count_zero_items() {
        assert_eq!(group_count_1d("test", 0, 64).unwrap(), [0, 1, 1]);
        assert!(group_count_1d("test", 10, 0).is_err());
    }

    #[test]
    fn test_group_count_2d_wraps() {
        let items = 65535u32 * 64 + 1;
        let groups = group_count_2d("test", items, 64).unwrap();
        assert_eq!(groups, [65535, 2, 1]);
        assert!(groups[0] as u64 * groups[1] as u64 * 64 >= items as u64);
    }

    #[test]
    fn test_group_count_tiles() {
        assert_eq!(group_count_tiles("test", [1920, 1080], 8).unwrap(), [240, 135, 1]);
        assert!(group_count_tiles("test", [1920, 1080], 0).is_err());
    }

    #[test]
    fn test_dispatch_args_never_exceed_limit() {
        for items in [0u32, 1, 63, 64, 65, 65535 * 64, 65535 * 64 + 1, u32::MAX] {
            let args = dispatch_args_for_items(items, 64);
            assert!(args.group_count_x <= MAX_DISPATCH_GROUPS_PER_DIMENSION);
            assert!(args.group_count_y <= MAX_DISPATCH_GROUPS_PER_DIMENSION);
            let covered =
                args.group_count_x as u64 * args.group_count_y as u64 * 64;
            assert!(covered >= items as u64);
        }
    }
}
