//! Hair cluster culling
//!
//! Per-group LOD selection, frustum/HZB culling and compaction of the
//! surviving control points into the culled vertex buffers.

pub mod cluster_data;
pub mod cluster_kernels;
pub mod cluster_operations;

pub use cluster_data::{
    BlockPrefixSum, ClusterAabbParams, ClusterCullState, ClusterCullingOutputs, ClusterCullingParams, ClusterData,
    ClusterGroupData, ClusterInfo, ClusterInputBuffers, ClusterLodInfo, ClusterSelection,
    CpuCluster, CpuCullingInputs, CulledVertices, CullingParams, HairClusterResources,
    HairGroupBuffers, HairGroupFrameState, HairGroupInstance, HairGroupKey, HairGroupPublicData,
};
pub use cluster_kernels::{
    block_prefix_sum, compact_culled_vertices, cull_and_compact, cull_clusters, culled_draw_args,
    reset_draw_args, select_cluster_lod,
};
pub use cluster_operations::{
    add_cluster_aabb_passes, add_cluster_culling_passes, add_instance_to_cluster_data,
    create_hair_group_public_data, end_cluster_frame, import_cluster_group_buffers,
    import_cluster_inputs, select_cull_state,
};
