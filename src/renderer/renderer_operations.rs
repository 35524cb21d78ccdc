//! Renderer Operations - Pure DOP Functions
//!
//! Orders the hair stages of a view: bookmarks, culling, macro groups,
//! voxelization, deep shadows, visibility and transmittance.

use super::renderer_data::*;
use crate::bookmark::{BookmarkHandler, BookmarkParameters, BookmarkRegistry, HairStrandsBookmark};
use crate::cluster::{
    add_cluster_culling_passes, add_instance_to_cluster_data, end_cluster_frame, ClusterData, CullingParams,
    HairGroupInstance,
};
use crate::config::{sanitize_config, validate_config, StrandsConfig};
use crate::deep_shadow::{
    add_deep_shadow_passes, add_transmittance_passes, allocate_deep_shadow_slots, DeepShadowAllocation, LightData,
};
use crate::error::{StrandsError, StrandsResult};
use crate::graph::{begin_scope, end_scope, FrameGraph};
use crate::macro_group::{add_macro_group_aabb_passes, build_macro_groups, HairMeshBatch};
use crate::view::{PlatformCaps, ViewInfo};
use crate::visibility::{add_material_resolve_passes, add_visibility_passes, select_render_mode, VisibilityData};
use crate::voxel::{add_voxelization_passes, allocate_virtual_voxel_resources};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

impl HairStrandsRenderer {
    /// Validate the configuration and settle the platform-dependent choices
    pub fn new(
        config: StrandsConfig,
        caps: PlatformCaps,
        bookmark: Option<Arc<dyn BookmarkHandler>>,
    ) -> StrandsResult<Self> {
        validate_config(&config).map_err(|e| StrandsError::InvalidConfig {
            field: "StrandsConfig".to_string(),
            value: String::new(),
            reason: e.to_string(),
        })?;
        let config = sanitize_config(&config);

        let bookmarks = BookmarkRegistry::new();
        if let Some(handler) = bookmark {
            bookmarks.register(handler)?;
        }

        let render_mode = select_render_mode(&config.visibility, &caps);
        log::info!(
            "[HairStrandsRenderer::new] Visibility mode {:?} (atomic u64: {}, amd: {})",
            render_mode,
            caps.supports_atomic_u64,
            caps.is_amd_pc
        );

        let (feedback_sender, feedback_receiver) = flume::unbounded();
        Ok(Self {
            config,
            caps,
            render_mode,
            bookmarks,
            adaptive_voxels: Mutex::new(FxHashMap::default()),
            feedback_sender,
            feedback_receiver,
        })
    }

    /// Queue the requested page count the host read back for a view
    ///
    /// Safe to call from a readback callback; the value is consumed by the
    /// next `render_view` of that view.
    pub fn apply_voxel_feedback(&self, view_key: u64, requested_page_count: u32) {
        let feedback = VoxelFeedback {
            view_key,
            requested_page_count,
        };
        if self.feedback_sender.send(feedback).is_err() {
            log::warn!("[HairStrandsRenderer::apply_voxel_feedback] Feedback channel closed");
        }
    }

    /// Sender half for hosts that read back on another thread
    pub fn voxel_feedback_sender(&self) -> flume::Sender<VoxelFeedback> {
        self.feedback_sender.clone()
    }

    /// Forget the adaptive voxel state of a view that went away
    pub fn remove_view(&self, view_key: u64) {
        self.adaptive_voxels.lock().remove(&view_key);
    }

    /// Record every hair pass of one view
    pub fn render_view(
        &self,
        graph: &mut FrameGraph,
        view: &ViewInfo,
        batches: &[HairMeshBatch],
        instances: Vec<HairGroupInstance>,
        lights: &[LightData],
    ) -> StrandsResult<HairStrandsViewData> {
        drain_voxel_feedback(self);

        if batches.is_empty() {
            log::trace!("[HairStrandsRenderer::render_view] View {} has no hair", view.view_key);
            return Ok(HairStrandsViewData {
                view_key: view.view_key,
                ..Default::default()
            });
        }

        let _span = tracing::debug_span!("HairStrands").entered();
        begin_scope(graph, "HairStrands");

        let mut cluster_data = ClusterData::default();
        let result = record_view(self, graph, view, batches, instances, lights, &mut cluster_data);

        // Registration only lasts one view, even when recording failed
        end_cluster_frame(&cluster_data);
        end_scope(graph);

        let mut view_data = result?;
        view_data.cluster_data = cluster_data;
        Ok(view_data)
    }
}

fn drain_voxel_feedback(renderer: &HairStrandsRenderer) {
    let mut states = renderer.adaptive_voxels.lock();
    for feedback in renderer.feedback_receiver.try_iter() {
        states.entry(feedback.view_key).or_default().requested_page_count = Some(feedback.requested_page_count);
    }
}

fn run_bookmark(
    renderer: &HairStrandsRenderer,
    bookmark: HairStrandsBookmark,
    graph: &mut FrameGraph,
    view: &ViewInfo,
    cluster_data: &mut ClusterData,
) {
    let mut parameters = BookmarkParameters {
        graph,
        view,
        cluster_data,
    };
    renderer.bookmarks.run(bookmark, &mut parameters);
}

fn record_view(
    renderer: &HairStrandsRenderer,
    graph: &mut FrameGraph,
    view: &ViewInfo,
    batches: &[HairMeshBatch],
    instances: Vec<HairGroupInstance>,
    lights: &[LightData],
    cluster_data: &mut ClusterData,
) -> StrandsResult<HairStrandsViewData> {
    let config = &renderer.config;

    for bookmark in [
        HairStrandsBookmark::ProcessTasks,
        HairStrandsBookmark::ProcessLodSelection,
        HairStrandsBookmark::ProcessGuideInterpolation,
    ] {
        run_bookmark(renderer, bookmark, graph, view, cluster_data);
    }

    for instance in instances {
        add_instance_to_cluster_data(instance, cluster_data)?;
    }
    run_bookmark(renderer, HairStrandsBookmark::ProcessGatherCluster, graph, view, cluster_data);

    let culling_params = CullingParams {
        is_shadow_view: view.is_shadow_view,
        skip_culling: false,
    };
    add_cluster_culling_passes(graph, &config.culling, view, &culling_params, cluster_data)?;
    run_bookmark(renderer, HairStrandsBookmark::ProcessStrandsInterpolation, graph, view, cluster_data);

    let mut macro_groups = build_macro_groups(view, batches);
    add_macro_group_aabb_passes(graph, &mut macro_groups, cluster_data)?;

    let voxels = {
        let mut states = renderer.adaptive_voxels.lock();
        let adaptive = states.entry(view.view_key).or_default();
        allocate_virtual_voxel_resources(graph, &config.voxel, view, &macro_groups, cluster_data, adaptive)?
    };
    add_voxelization_passes(graph, &config.voxel, &renderer.caps, view, &macro_groups, cluster_data, &voxels)?;

    let allocation = if config.transmittance.force_voxel_transmittance_and_shadow {
        DeepShadowAllocation::default()
    } else {
        allocate_deep_shadow_slots(&config.deep_shadow, &macro_groups, lights)
    };
    let deep_shadows = add_deep_shadow_passes(
        graph,
        &config.deep_shadow,
        &renderer.caps,
        view,
        &macro_groups,
        cluster_data,
        allocation,
    )?;

    // Shadow views only feed voxels and deep shadows
    let (visibility, material, transmittance) = if view.is_shadow_view {
        (VisibilityData::default(), None, Vec::new())
    } else {
        let visibility =
            add_visibility_passes(graph, &config.visibility, renderer.render_mode, view, &macro_groups, cluster_data)?;
        let material = add_material_resolve_passes(graph, &config.visibility, view, &visibility)?;
        let transmittance = add_transmittance_passes(graph, config, &visibility, &voxels, &deep_shadows, lights)?;
        (visibility, material, transmittance)
    };

    log::debug!(
        "[renderer_operations::record_view] view {}: {} batches, {} groups, {} macro groups, {} deep shadow slots, {} shadowed lights",
        view.view_key,
        batches.len(),
        cluster_data.groups.len(),
        macro_groups.datas.len(),
        deep_shadows.datas.len(),
        transmittance.len()
    );

    Ok(HairStrandsViewData {
        view_key: view.view_key,
        macro_groups,
        cluster_data: ClusterData::default(),
        visibility,
        material,
        voxels,
        deep_shadows,
        transmittance,
    })
}
