//! Visibility Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in visibility_operations.rs

use crate::graph::{BufferHandle, TextureHandle};
use crate::view::ViewUniform;
use bytemuck::{Pod, Zeroable};
use cgmath::Vector3;

/// How hair fragments are captured before compaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VisibilityRenderMode {
    /// Depth + primitive id MSAA targets, always supported
    #[default]
    Msaa,
    /// Per-pixel linked list of fragments
    Ppll,
    /// Software raster into layered 64-bit atomic textures
    ComputeRaster,
}

/// Output of the visibility stage for one view
///
/// `Default` is the empty state: every later stage reads it as "no hair".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisibilityData {
    pub render_mode: VisibilityRenderMode,
    pub resolution: [u32; 2],
    pub max_sample_count: u32,
    pub mean_sample_count: u32,
    /// Upper bound of compacted nodes: width * height * mean samples
    pub max_node_count: u32,

    /// Per pixel: sample count, coverage, closest sample
    pub categorization_texture: Option<TextureHandle>,
    /// Per pixel: offset and count into the compacted node array
    pub node_index: Option<TextureHandle>,
    pub node_data: Option<BufferHandle>,
    pub node_coord: Option<BufferHandle>,
    pub node_counter: Option<BufferHandle>,
    /// Dispatch args over the used nodes, derived on GPU from the counter
    pub node_indirect_args: Option<BufferHandle>,
    pub velocity_texture: Option<TextureHandle>,
}

/// One compacted visibility sample
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CompactNodeData {
    pub depth: f32,
    /// Primitive id (low 24 bits) and macro group id (high 8 bits)
    pub primitive_macro_group_id: u32,
    /// Octahedral tangent (24 bits) and coverage (8 bits)
    pub tangent_coverage: u32,
    /// Packed base color / roughness / specular
    pub material: u32,
}

/// Per-pixel summary written next to the compacted nodes
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct CategorizationTexel {
    pub sample_count: u32,
    /// Summed coverage, clamped to 1
    pub coverage: f32,
    /// Index of the closest sample inside the pixel's node range
    pub closest_index: u32,
    pub _padding: u32,
}

/// One per-pixel linked list node
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PpllNode {
    pub depth: f32,
    pub primitive_macro_group_id: u32,
    pub tangent_coverage: u32,
    pub next: u32,
}

/// Parameters shared by the visibility raster and compaction kernels
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct VisibilityParams {
    pub view: ViewUniform,
    pub resolution: [u32; 2],
    pub max_sample_count: u32,
    pub mean_sample_count: u32,
    pub max_node_count: u32,
    pub material_compaction: u32,
    pub depth_threshold: f32,
    pub tangent_cos_threshold: f32,
    pub macro_group_id: u32,
    pub render_mode: u32,
    pub clear_value: u32,
    pub _padding: u32,
}

static_assertions::const_assert_eq!(std::mem::size_of::<CompactNodeData>(), 16);
static_assertions::const_assert_eq!(std::mem::size_of::<PpllNode>(), 16);
static_assertions::const_assert_eq!(std::mem::size_of::<CategorizationTexel>(), 16);
static_assertions::const_assert_eq!(std::mem::size_of::<VisibilityParams>() % 16, 0);

/// One hair fragment as seen by the CPU reference kernels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilitySample {
    /// View depth, smaller is closer
    pub depth: f32,
    pub primitive_id: u32,
    pub macro_group_id: u32,
    /// Unit strand tangent
    pub tangent: Vector3<f32>,
    /// Fraction of the pixel covered, 0..1
    pub coverage: f32,
}

/// Per-pixel linked lists built by the CPU reference append
#[derive(Debug, Clone, PartialEq)]
pub struct CpuPpll {
    pub resolution: [u32; 2],
    /// Head node per pixel, `PPLL_END_OF_LIST` when empty
    pub heads: Vec<u32>,
    pub nodes: Vec<(VisibilitySample, u32)>,
    /// Appends refused once the node budget ran out
    pub dropped_count: u32,
}

/// Compacted samples of a whole view, CPU reference layout
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompactedVisibility {
    /// Per pixel offset and count into `nodes`
    pub node_index: Vec<(u32, u32)>,
    pub nodes: Vec<VisibilitySample>,
    pub categorization: Vec<CategorizationTexel>,
    /// Samples dropped because the node budget ran out
    pub dropped_count: u32,
}
