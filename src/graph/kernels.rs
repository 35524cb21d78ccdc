//! Kernel identities
//!
//! Every compute or raster pass names the pipeline it runs with a `KernelId`.
//! The host owns shader sources and pipeline creation and resolves these ids
//! through `PipelineLibrary`.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KernelId {
    // Macro groups
    MacroGroupAabbUpdate,

    // Cluster culling
    ClusterCullingPrepareReset,
    ClusterAabbUpdate,
    ClusterCulling,
    ClusterCullingPrepareIndirectArgs,
    ClusterPrefixSumLevel0,
    ClusterPrefixSumLevel1,
    ClusterPrefixSumLevel2,
    ClusterCompactVertexIds,
    ClusterUpdateDrawArgs,

    // Visibility
    VisibilityClearTexture,
    VisibilityMsaaRaster,
    VisibilityPpllRaster,
    VisibilityComputeRaster,
    VisibilityMsaaCompaction,
    VisibilityPpllCompaction,
    VisibilityComputeRasterCompaction,
    VisibilityPrepareNodeArgs,
    MaterialResolve,
    VelocityResolve,

    // Voxelization
    VoxelAllocatePageIndex,
    VoxelMarkValidPrepare,
    VoxelMarkValidIndirectArgs,
    VoxelMarkValidScatter,
    VoxelAddNodeDesc,
    VoxelAllocatePages,
    VoxelBuildIndirectArgs,
    VoxelPageClearIndirectArgs,
    VoxelPageClear,
    VoxelRaster,
    VoxelComputeRaster,
    VoxelComputeRasterIndirectArgs,
    VoxelInjectOpaque,
    VoxelMipIndirectArgs,
    VoxelGenerateMips,
    VoxelPatchEmptyPages,

    // Deep shadows and transmittance
    DeepShadowAllocate,
    DeepShadowFrontDepth,
    DeepShadowOpacityLayers,
    TransmittanceDeepShadow,
    TransmittanceVoxel,
}

/// Stable name used for pipeline lookup and debug labels
pub fn kernel_name(kernel: KernelId) -> &'static str {
    match kernel {
        KernelId::MacroGroupAabbUpdate => "HairMacroGroupAABBCS",
        KernelId::ClusterCullingPrepareReset => "HairClusterCullingPrepareResetCS",
        KernelId::ClusterAabbUpdate => "HairClusterAABBCS",
        KernelId::ClusterCulling => "HairClusterCullingCS",
        KernelId::ClusterCullingPrepareIndirectArgs => "HairClusterCullingPrepareArgsCS",
        KernelId::ClusterPrefixSumLevel0 => "HairClusterPrefixSumL0CS",
        KernelId::ClusterPrefixSumLevel1 => "HairClusterPrefixSumL1CS",
        KernelId::ClusterPrefixSumLevel2 => "HairClusterPrefixSumL2CS",
        KernelId::ClusterCompactVertexIds => "HairClusterCompactVertexIdsCS",
        KernelId::ClusterUpdateDrawArgs => "HairClusterUpdateDrawArgsCS",
        KernelId::VisibilityClearTexture => "HairVisibilityClearCS",
        KernelId::VisibilityMsaaRaster => "HairVisibilityMSAA",
        KernelId::VisibilityPpllRaster => "HairVisibilityPPLL",
        KernelId::VisibilityComputeRaster => "HairVisibilityComputeRasterCS",
        KernelId::VisibilityMsaaCompaction => "HairVisibilityCompactionMSAACS",
        KernelId::VisibilityPpllCompaction => "HairVisibilityCompactionPPLLCS",
        KernelId::VisibilityComputeRasterCompaction => "HairVisibilityCompactionComputeRasterCS",
        KernelId::VisibilityPrepareNodeArgs => "HairVisibilityPrepareArgsCS",
        KernelId::MaterialResolve => "HairMaterialCS",
        KernelId::VelocityResolve => "HairVelocityCS",
        KernelId::VoxelAllocatePageIndex => "HairVoxelAllocatePageIndexCS",
        KernelId::VoxelMarkValidPrepare => "HairVoxelMarkValidPrepareCS",
        KernelId::VoxelMarkValidIndirectArgs => "HairVoxelMarkValidArgsCS",
        KernelId::VoxelMarkValidScatter => "HairVoxelMarkValidScatterCS",
        KernelId::VoxelAddNodeDesc => "HairVoxelAddNodeDescCS",
        KernelId::VoxelAllocatePages => "HairVoxelAllocatePageCS",
        KernelId::VoxelBuildIndirectArgs => "HairVoxelBuildIndirectArgsCS",
        KernelId::VoxelPageClearIndirectArgs => "HairVoxelPageClearArgsCS",
        KernelId::VoxelPageClear => "HairVoxelPageClearCS",
        KernelId::VoxelRaster => "HairVoxelRaster",
        KernelId::VoxelComputeRaster => "HairVoxelComputeRasterCS",
        KernelId::VoxelComputeRasterIndirectArgs => "HairVoxelComputeRasterArgsCS",
        KernelId::VoxelInjectOpaque => "HairVoxelInjectOpaqueCS",
        KernelId::VoxelMipIndirectArgs => "HairVoxelMipArgsCS",
        KernelId::VoxelGenerateMips => "HairVoxelGenerateMipCS",
        KernelId::VoxelPatchEmptyPages => "HairVoxelPatchPageIndexCS",
        KernelId::DeepShadowAllocate => "HairDeepShadowAllocateCS",
        KernelId::DeepShadowFrontDepth => "HairDeepShadowFrontDepth",
        KernelId::DeepShadowOpacityLayers => "HairDeepShadowLayers",
        KernelId::TransmittanceDeepShadow => "HairTransmittanceDeepShadowCS",
        KernelId::TransmittanceVoxel => "HairTransmittanceVoxelCS",
    }
}
