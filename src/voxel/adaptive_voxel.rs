//! Adaptive voxel size
//!
//! The GPU reports how many pages it requested; the next allocation grows
//! the voxel size when the pool overflowed and eases it back toward the
//! configured size once there is room again. The readback lags a frame or
//! more, so the previous size is kept until a value arrives.

use super::voxel_data::AdaptiveVoxelState;
use crate::config::{round_voxel_world_size, VoxelConfig};

/// Pick this frame's voxel world size and update the per-view state
pub fn update_adaptive_voxel_size(state: &mut AdaptiveVoxelState, config: &VoxelConfig, page_count: u32) -> f32 {
    let configured = round_voxel_world_size(config.voxel_world_size);

    if !config.adaptive_enabled || page_count == 0 {
        *state = AdaptiveVoxelState {
            voxel_world_size: Some(configured),
            ..Default::default()
        };
        return configured;
    }

    let Some(previous) = state.voxel_world_size else {
        state.voxel_world_size = Some(configured);
        state.requested_page_count = None;
        return configured;
    };
    let previous = round_voxel_world_size(previous);

    let size = match state.requested_page_count.take() {
        Some(requested) => {
            state.allocated_page_count = requested;
            corrected_voxel_size(config, configured, previous, requested, page_count)
        }
        None => previous,
    };

    let size = round_voxel_world_size(size);
    if size != previous {
        log::debug!(
            "[adaptive_voxel::update_adaptive_voxel_size] {:.2} -> {:.2} ({} pages requested, {} available)",
            previous,
            size,
            state.allocated_page_count,
            page_count
        );
    }
    state.voxel_world_size = Some(size);
    size
}

fn corrected_voxel_size(
    config: &VoxelConfig,
    configured: f32,
    previous: f32,
    requested: u32,
    page_count: u32,
) -> f32 {
    let threshold = config.adaptive_correction_threshold.clamp(f32::EPSILON, 1.0);
    let speed = config.adaptive_correction_speed.clamp(0.0, 1.0);

    // Pages fill a volume, so the linear correction is the cubic root
    let linear_ratio = (requested as f32 / page_count as f32).cbrt();
    let linear_ratio_with_margin = (requested as f32 / (page_count as f32 * threshold)).cbrt();

    if requested > page_count {
        previous * linear_ratio
    } else if requested < page_count && previous > configured {
        let target = previous * linear_ratio_with_margin;
        configured.max(previous + (target - previous) * speed)
    } else {
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feedback(state: &mut AdaptiveVoxelState, requested: u32) {
        state.requested_page_count = Some(requested);
    }

    #[test]
    fn test_first_frame_uses_configured_size() {
        let config = VoxelConfig {
            voxel_world_size: 0.3,
            ..Default::default()
        };
        let mut state = AdaptiveVoxelState::default();
        assert_eq!(update_adaptive_voxel_size(&mut state, &config, 2744), 0.3);
        assert_eq!(state.voxel_world_size, Some(0.3));
    }

    #[test]
    fn test_overflow_grows_by_cubic_root() {
        let config = VoxelConfig::default();
        let mut state = AdaptiveVoxelState::default();
        update_adaptive_voxel_size(&mut state, &config, 1000);

        feedback(&mut state, 8000);
        let size = update_adaptive_voxel_size(&mut state, &config, 1000);
        assert!((size - 0.6).abs() < 1e-4);
        assert_eq!(state.allocated_page_count, 8000);

        // No new readback: keep the last prediction
        assert_eq!(update_adaptive_voxel_size(&mut state, &config, 1000), size);
    }

    #[test]
    fn test_shrink_eases_back_to_configured() {
        let config = VoxelConfig {
            adaptive_correction_speed: 0.5,
            adaptive_correction_threshold: 0.9,
            ..Default::default()
        };
        let mut state = AdaptiveVoxelState {
            voxel_world_size: Some(1.0),
            ..Default::default()
        };

        let mut previous = 1.0;
        for _ in 0..64 {
            feedback(&mut state, 10);
            let size = update_adaptive_voxel_size(&mut state, &config, 1000);
            assert!(size <= previous);
            assert!(size >= 0.3);
            previous = size;
        }
        assert_eq!(previous, 0.3);
    }

    #[test]
    fn test_size_stays_in_range() {
        let config = VoxelConfig::default();
        let mut state = AdaptiveVoxelState {
            voxel_world_size: Some(9.0),
            ..Default::default()
        };
        feedback(&mut state, u32::MAX);
        assert_eq!(update_adaptive_voxel_size(&mut state, &config, 1), 10.0);
    }

    #[test]
    fn test_disabled_resets_state() {
        let config = VoxelConfig {
            adaptive_enabled: false,
            ..Default::default()
        };
        let mut state = AdaptiveVoxelState {
            voxel_world_size: Some(2.0),
            requested_page_count: Some(5),
            allocated_page_count: 5,
        };
        assert_eq!(update_adaptive_voxel_size(&mut state, &config, 1000), 0.3);
        assert_eq!(state.requested_page_count, None);
    }
}
