//! Hearth Strands - GPU hair strands pipeline orchestration
//!
//! Data-Oriented Programming (DOP) layout:
//! - `*_data` modules hold plain data
//! - `*_operations` modules hold the pure functions that transform it
//! - `*_kernels` modules hold CPU references of the GPU kernels
//!
//! Every stage records passes into a `graph::FrameGraph`; the host executes
//! the graph with its own device through `graph::execute_frame_graph`.

// Constants module
pub mod constants;

pub mod error;

// Shared primitives
pub mod arena;
pub mod bounds;
pub mod dispatch;
pub mod graph;
pub mod view;

pub mod config;

// Pipeline stages
pub mod cluster;
pub mod deep_shadow;
pub mod macro_group;
pub mod visibility;
pub mod voxel;

// Orchestration
pub mod bookmark;
pub mod renderer;

pub use bookmark::{BookmarkHandler, BookmarkParameters, BookmarkRegistry, HairStrandsBookmark};
pub use config::{load_config_from_path, load_config_from_str, StrandsConfig};
pub use deep_shadow::{LightData, LightKind, TransmittancePath};
pub use error::{ErrorContext, OptionExt, StrandsError, StrandsResult};
pub use graph::{create_frame_graph, execute_frame_graph, FrameGraph};
pub use macro_group::{HairGeometry, HairMeshBatch};
pub use renderer::{HairStrandsRenderer, HairStrandsViewData, VoxelFeedback};
pub use view::{create_view_info, detect_platform_caps, PlatformCaps, ViewInfo};

// Re-export wgpu for hosts that execute the frame graph
pub use wgpu;
