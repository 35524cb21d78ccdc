//! Cluster Culling Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in cluster_operations.rs

use crate::bounds::{FrustumPlanes, AABB};
use crate::graph::{BufferHandle, ExternalBufferId};
use crate::view::ViewUniform;
use bytemuck::{Pod, Zeroable};
use cgmath::{Matrix4, Point3};
use parking_lot::Mutex;
use std::sync::Arc;

/// Identifies one hair group of one groom asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HairGroupKey {
    pub resource_id: u64,
    pub group_index: u32,
}

/// Persistent GPU buffers of one hair group, owned by the primitive proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HairGroupBuffers {
    /// One `DrawIndirectArgs` for the raster path
    pub draw_indirect: ExternalBufferId,
    /// One `DispatchIndirectArgs` for compute rasterization
    pub draw_indirect_raster_compute: ExternalBufferId,
    /// 6 u32 per cluster
    pub cluster_aabb: ExternalBufferId,
    /// 6 u32 for the whole group
    pub group_aabb: ExternalBufferId,
    /// One u32 per control point
    pub culled_vertex_id: ExternalBufferId,
    /// One f32 per control point
    pub culled_vertex_radius_scale: ExternalBufferId,
}

/// Mutable per-frame state of a hair group
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HairGroupFrameState {
    /// Index into this frame's `ClusterData::groups`, if registered
    pub cluster_data_index: Option<usize>,
    /// True once the culled vertex buffers hold this frame's result
    pub culling_result_available: bool,
    /// LOD selected by the host for the whole group, negative for automatic
    pub lod_index: f32,
    pub lod_bias: f32,
    pub visible: bool,
}

/// Per-group data shared between the proxy and the renderer
#[derive(Debug)]
pub struct HairGroupPublicData {
    pub key: HairGroupKey,
    pub control_point_count: u32,
    pub cluster_count: u32,
    pub lod_count: u32,
    pub buffers: HairGroupBuffers,
    /// Element counts of the culled buffers, checked at registration
    pub culled_vertex_id_count: u32,
    pub culled_vertex_radius_scale_count: u32,
    pub cluster_aabb_count: u32,
    pub frame_state: Mutex<HairGroupFrameState>,
}

/// Read-only cluster description buffers of a hair group instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HairClusterResources {
    /// One `ClusterInfo` per cluster
    pub cluster_info: ExternalBufferId,
    /// `ClusterLodInfo` entries referenced by `ClusterInfo`
    pub cluster_lod_info: ExternalBufferId,
    /// Control point ids sorted by cluster and LOD
    pub cluster_vertex_id: ExternalBufferId,
    /// Deformed control point positions
    pub position: ExternalBufferId,
    pub cluster_lod_info_count: u32,
    pub cluster_vertex_id_count: u32,
}

/// What the gather bookmark hands to the culling engine per group
#[derive(Debug, Clone)]
pub struct HairGroupInstance {
    pub public_data: Arc<HairGroupPublicData>,
    pub cluster_resources: HairClusterResources,
    pub local_to_world: Matrix4<f32>,
    /// Screen-size thresholds per LOD, largest first
    pub lod_screen_sizes: Vec<f32>,
}

/// Culling outputs declared in this frame's graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterCullingOutputs {
    pub draw_indirect: BufferHandle,
    pub draw_indirect_raster_compute: BufferHandle,
    pub culled_vertex_id: BufferHandle,
    pub culled_vertex_radius_scale: BufferHandle,
    pub cluster_aabb: BufferHandle,
    pub group_aabb: BufferHandle,
}

/// Cluster description buffers imported into this frame's graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterInputBuffers {
    pub cluster_info: BufferHandle,
    pub cluster_lod_info: BufferHandle,
    pub cluster_vertex_id: BufferHandle,
    pub position: BufferHandle,
}

/// Per-frame view of one registered hair group
#[derive(Debug, Clone)]
pub struct ClusterGroupData {
    pub instance: HairGroupInstance,
    pub cluster_count: u32,
    pub vertex_count: u32,
    pub lod_index: f32,
    pub lod_bias: f32,
    pub visible: bool,
    pub cull_state: Option<ClusterCullState>,
    pub outputs: Option<ClusterCullingOutputs>,
}

/// All hair groups gathered for the current view
#[derive(Debug, Clone, Default)]
pub struct ClusterData {
    pub groups: Vec<ClusterGroupData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CullingParams {
    pub is_shadow_view: bool,
    pub skip_culling: bool,
}

/// What the culling passes do for one group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterCullState {
    /// Draw args cover the full control point range
    Reset,
    /// Frustum/HZB/LOD culling and compaction
    Cull,
}

/// One LOD of one cluster in the cluster LOD info buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ClusterLodInfo {
    pub vertex_offset: u32,
    pub vertex_count: u32,
    pub radius_scale: f32,
    pub _padding: u32,
}

/// One cluster in the cluster info buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct ClusterInfo {
    pub lod_info_offset: u32,
    pub lod_count: u32,
    pub _padding: [u32; 2],
}

/// CPU description of one cluster for the reference culling kernels
#[derive(Debug, Clone, PartialEq)]
pub struct CpuCluster {
    pub world_aabb: AABB,
    pub lods: Vec<ClusterLodInfo>,
}

/// Per-cluster outcome of the CPU reference culling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClusterSelection {
    pub lod: u32,
    /// Zero when the cluster is culled
    pub vertex_count: u32,
}

/// View inputs of the CPU reference culling
#[derive(Clone, Copy)]
pub struct CpuCullingInputs<'a> {
    pub frustum: &'a FrustumPlanes,
    pub view_origin: Point3<f32>,
    /// 1 / tan(fov / 2)
    pub projection_scale: f32,
    /// Screen-size thresholds per LOD, largest first
    pub lod_screen_sizes: &'a [f32],
    pub lod_bias: f32,
    pub forced_lod: Option<u32>,
    /// HZB stand-in; returns true when the box is hidden
    pub occluded: Option<&'a (dyn Fn(&AABB) -> bool + Sync)>,
}

/// Result of the CPU reference culling and compaction
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CulledVertices {
    pub vertex_ids: Vec<u32>,
    pub radius_scales: Vec<f32>,
    pub visible_cluster_count: u32,
}

/// Exclusive scan computed with the three-level block scheme
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockPrefixSum {
    pub offsets: Vec<u32>,
    pub total: u32,
}

/// Parameters of the per-group culling kernels
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ClusterCullingParams {
    pub view: ViewUniform,
    pub local_to_world: [[f32; 4]; 4],
    pub cluster_count: u32,
    pub vertex_count: u32,
    pub lod_index: f32,
    pub lod_bias: f32,
    pub force_lod: i32,
    pub lod_count: u32,
    pub prefix_sum_level: u32,
    pub is_shadow_view: u32,
}

/// Parameters of the cluster/group AABB update kernel
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ClusterAabbParams {
    pub local_to_world: [[f32; 4]; 4],
    pub cluster_count: u32,
    pub vertex_count: u32,
    pub dispatch_count_x: u32,
    /// 0 updates cluster AABBs, 1 reduces them into the group AABB
    pub mode: u32,
}

static_assertions::const_assert_eq!(std::mem::size_of::<ClusterLodInfo>(), 16);
static_assertions::const_assert_eq!(std::mem::size_of::<ClusterInfo>(), 16);
static_assertions::const_assert_eq!(std::mem::size_of::<ClusterCullingParams>() % 16, 0);
