//! Frame Graph Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in graph_operations.rs
//!
//! A frame graph is the per-view, per-frame list of resources and passes the
//! hair stages declare. Nothing touches the GPU while recording; the wgpu
//! backend allocates and encodes everything in declaration order.

use super::kernels::KernelId;

/// Transient or imported buffer inside one frame graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u32);

/// Transient or imported texture inside one frame graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u32);

/// Persistent buffer owned by the host (per hair group resources)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExternalBufferId(pub u64);

/// Persistent texture owned by the host (scene depth, HZB)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExternalTextureId(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub struct BufferDesc {
    pub label: String,
    pub element_size: u32,
    pub element_count: u32,
    pub usage: wgpu::BufferUsages,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub label: String,
    pub size: wgpu::Extent3d,
    pub dimension: wgpu::TextureDimension,
    pub format: wgpu::TextureFormat,
    pub mip_level_count: u32,
    pub sample_count: u32,
    pub usage: wgpu::TextureUsages,
}

#[derive(Debug, Clone)]
pub struct BufferEntry {
    pub desc: BufferDesc,
    pub external: Option<ExternalBufferId>,
    pub extracted: bool,
}

#[derive(Debug, Clone)]
pub struct TextureEntry {
    pub desc: TextureDesc,
    pub external: Option<ExternalTextureId>,
    pub extracted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceRef {
    Buffer(BufferHandle),
    /// `mip` selects a single level, `None` binds the full chain
    Texture { handle: TextureHandle, mip: Option<u32> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    ReadWrite,
}

/// Shader binding; slot is the position in the pass binding list plus one
/// (slot 0 is the pass parameter block)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub resource: ResourceRef,
    pub access: Access,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Direct([u32; 3]),
    /// Group counts read from `args` at byte `offset` when the pass executes
    Indirect { args: BufferHandle, offset: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Draw {
    Direct { vertex_count: u32, instance_count: u32 },
    Indirect { args: BufferHandle, offset: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAttachment {
    pub texture: TextureHandle,
    pub clear: Option<[f64; 4]>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthAttachment {
    pub texture: TextureHandle,
    pub clear_depth: Option<f32>,
}

/// Render targets and viewport of a raster pass
///
/// A pass without attachments rasterizes into storage bindings only.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterTargets {
    pub viewport: [u32; 4],
    pub color: Vec<ColorAttachment>,
    pub depth: Option<DepthAttachment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PassKind {
    Compute {
        kernel: KernelId,
        dispatch: Dispatch,
    },
    Raster {
        kernel: KernelId,
        targets: RasterTargets,
        draws: Vec<Draw>,
    },
    ClearBuffer {
        buffer: BufferHandle,
        value: u32,
    },
    CopyBuffer {
        src: BufferHandle,
        dst: BufferHandle,
        size: u64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PassDesc {
    pub name: String,
    /// Event scope active when the pass was declared
    pub scope: String,
    pub kind: PassKind,
    /// Raw bytes of the pass parameter block
    pub params: Vec<u8>,
    pub bindings: Vec<Binding>,
}

/// Per-view, per-frame pass list
#[derive(Debug, Clone, Default)]
pub struct FrameGraph {
    pub label: String,
    pub buffers: Vec<BufferEntry>,
    pub textures: Vec<TextureEntry>,
    pub passes: Vec<PassDesc>,
    pub scope_stack: Vec<String>,
}
