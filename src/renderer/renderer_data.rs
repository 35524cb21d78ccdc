//! Renderer Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in renderer_operations.rs

use crate::bookmark::BookmarkRegistry;
use crate::cluster::ClusterData;
use crate::config::StrandsConfig;
use crate::deep_shadow::{DeepShadowResources, TransmittanceMask};
use crate::macro_group::MacroGroupDatas;
use crate::view::PlatformCaps;
use crate::visibility::{MaterialResolveOutputs, VisibilityData, VisibilityRenderMode};
use crate::voxel::{AdaptiveVoxelState, VirtualVoxelResources};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Requested page count read back by the host for one view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoxelFeedback {
    pub view_key: u64,
    pub requested_page_count: u32,
}

/// Everything the hair pipeline produced for one view this frame
///
/// `Default` is the "no hair" result of a view without hair batches.
#[derive(Debug, Clone, Default)]
pub struct HairStrandsViewData {
    pub view_key: u64,
    pub macro_groups: MacroGroupDatas,
    pub cluster_data: ClusterData,
    pub visibility: VisibilityData,
    pub material: Option<MaterialResolveOutputs>,
    pub voxels: VirtualVoxelResources,
    pub deep_shadows: DeepShadowResources,
    pub transmittance: Vec<TransmittanceMask>,
}

/// Hair strands pipeline of one renderer
///
/// The configuration is fixed at construction; per-view state only covers
/// adaptive voxel sizing.
pub struct HairStrandsRenderer {
    pub config: StrandsConfig,
    pub caps: PlatformCaps,
    /// Chosen once from the capability query
    pub render_mode: VisibilityRenderMode,
    pub bookmarks: BookmarkRegistry,
    pub adaptive_voxels: Mutex<FxHashMap<u64, AdaptiveVoxelState>>,
    pub feedback_sender: flume::Sender<VoxelFeedback>,
    pub feedback_receiver: flume::Receiver<VoxelFeedback>,
}
