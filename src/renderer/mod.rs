//! Hair strands renderer
//!
//! Owns the frame-invariant setup (configuration, capability choices, the
//! bookmark handler) and records the hair passes of each view.

pub mod renderer_data;
pub mod renderer_operations;

pub use renderer_data::{HairStrandsRenderer, HairStrandsViewData, VoxelFeedback};
