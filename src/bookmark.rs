//! Hair strands bookmarks
//!
//! The hair simulation/interpolation system hooks into fixed points of the
//! frame through one handler injected at renderer construction. Only one
//! handler may ever be registered.

use crate::cluster::ClusterData;
use crate::graph::FrameGraph;
use crate::view::ViewInfo;
use parking_lot::RwLock;
use std::sync::Arc;

/// Fixed points of the frame where the handler is invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HairStrandsBookmark {
    ProcessTasks,
    ProcessLodSelection,
    ProcessGuideInterpolation,
    ProcessGatherCluster,
    ProcessStrandsInterpolation,
}

/// Everything a handler may read or extend at a bookmark
pub struct BookmarkParameters<'a> {
    pub graph: &'a mut FrameGraph,
    pub view: &'a ViewInfo,
    /// Filled at `ProcessGatherCluster` with `add_instance_to_cluster_data`
    pub cluster_data: &'a mut ClusterData,
}

pub trait BookmarkHandler: Send + Sync {
    fn on_bookmark(&self, bookmark: HairStrandsBookmark, parameters: &mut BookmarkParameters<'_>);
}

#[derive(Debug, thiserror::Error)]
pub enum BookmarkError {
    #[error("A hair strands bookmark handler is already registered")]
    AlreadyRegistered,
}

/// Holds the single bookmark handler
#[derive(Default)]
pub struct BookmarkRegistry {
    handler: RwLock<Option<Arc<dyn BookmarkHandler>>>,
}

impl BookmarkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler; a second registration is a setup error
    pub fn register(&self, handler: Arc<dyn BookmarkHandler>) -> Result<(), BookmarkError> {
        let mut slot = self.handler.write();
        if slot.is_some() {
            log::error!("[BookmarkRegistry::register] Rejected second bookmark handler");
            return Err(BookmarkError::AlreadyRegistered);
        }
        *slot = Some(handler);
        log::info!("[BookmarkRegistry::register] Hair strands bookmark handler registered");
        Ok(())
    }

    pub fn is_registered(&self) -> bool {
        self.handler.read().is_some()
    }

    /// Invoke the handler, if any
    pub fn run(&self, bookmark: HairStrandsBookmark, parameters: &mut BookmarkParameters<'_>) {
        let handler = self.handler.read().clone();
        if let Some(handler) = handler {
            log::trace!("[BookmarkRegistry::run] {:?}", bookmark);
            handler.on_bookmark(bookmark, parameters);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::create_frame_graph;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<HairStrandsBookmark>>,
    }

    impl BookmarkHandler for RecordingHandler {
        fn on_bookmark(&self, bookmark: HairStrandsBookmark, _parameters: &mut BookmarkParameters<'_>) {
            self.seen.lock().push(bookmark);
        }
    }

    #[test]
    fn test_single_registrant() {
        let registry = BookmarkRegistry::new();
        assert!(!registry.is_registered());
        registry.register(Arc::new(RecordingHandler::default())).unwrap();
        assert!(matches!(
            registry.register(Arc::new(RecordingHandler::default())),
            Err(BookmarkError::AlreadyRegistered)
        ));
    }

    #[test]
    fn test_run_reaches_handler() {
        let registry = BookmarkRegistry::new();
        let handler = Arc::new(RecordingHandler::default());
        registry.register(handler.clone()).unwrap();

        let mut graph = create_frame_graph("test");
        let view = crate::view::view_operations::tests::test_view();
        let mut cluster_data = ClusterData::default();
        let mut parameters = BookmarkParameters {
            graph: &mut graph,
            view: &view,
            cluster_data: &mut cluster_data,
        };
        registry.run(HairStrandsBookmark::ProcessGatherCluster, &mut parameters);

        assert_eq!(*handler.seen.lock(), vec![HairStrandsBookmark::ProcessGatherCluster]);
    }
}
