//! Frame graph substrate
//!
//! Hair stages record resources and passes here; nothing is allocated or
//! encoded until the host executes the graph through `wgpu_backend`.

pub mod graph_data;
pub mod graph_operations;
pub mod kernels;
pub mod wgpu_backend;

pub use graph_data::{
    Access, Binding, BufferDesc, BufferHandle, ColorAttachment, DepthAttachment, Dispatch, Draw,
    ExternalBufferId, ExternalTextureId, FrameGraph, PassDesc, PassKind, RasterTargets,
    ResourceRef, TextureDesc, TextureHandle,
};
pub use graph_operations::*;
pub use kernels::{kernel_name, KernelId};
pub use wgpu_backend::{
    execute_frame_graph, read_buffer_u32, register_external_buffer, register_external_texture,
    ExtractedResources, PipelineLibrary, ResourceRegistry,
};
