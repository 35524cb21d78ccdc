//! Macro Group Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in macro_group_operations.rs

use crate::bounds::BoxSphereBounds;
use crate::cluster::HairGroupPublicData;
use crate::constants::cluster::AABB_UPDATE_GROUP_PER_PASS;
use crate::graph::BufferHandle;
use crate::view::ScreenRect;
use bytemuck::{Pod, Zeroable};
use std::sync::Arc;

/// What kind of hair geometry a mesh batch draws
#[derive(Debug, Clone)]
pub enum HairGeometry {
    /// Strands carry the per-group culling resources
    Strands(Arc<HairGroupPublicData>),
    Cards { resource_id: u64, group_index: u32 },
    Meshes { resource_id: u64, group_index: u32 },
}

/// One visible hair mesh batch of a view
#[derive(Debug, Clone)]
pub struct HairMeshBatch {
    pub primitive_id: u32,
    pub bounds: BoxSphereBounds,
    pub material_id: u32,
    pub geometry: HairGeometry,
}

#[derive(Debug, Clone)]
pub struct PrimitiveInfo {
    pub primitive_id: u32,
    pub material_id: u32,
    pub resource_id: u64,
    pub group_index: u32,
    pub geometry: HairGeometry,
}

/// A (resource, group) pair voxelized once per macro group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimitiveGroup {
    pub resource_id: u64,
    pub group_index: u32,
}

#[derive(Debug, Clone)]
pub struct MacroGroupData {
    /// Index of the macro group within its view
    pub macro_group_id: u32,
    pub bounds: BoxSphereBounds,
    pub screen_rect: ScreenRect,
    pub primitives: Vec<PrimitiveInfo>,
    pub primitive_groups: Vec<PrimitiveGroup>,
}

/// All macro groups of one view for the current frame
#[derive(Debug, Clone, Default)]
pub struct MacroGroupDatas {
    pub datas: Vec<MacroGroupData>,
    /// Union of every macro group screen rect
    pub union_screen_rect: ScreenRect,
    /// 6 u32 per macro group, filled by the GPU AABB update
    pub aabb_buffer: Option<BufferHandle>,
}

/// Hair groups bound by one macro group AABB update dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacroGroupAabbBatch {
    pub slots: [BufferHandle; AABB_UPDATE_GROUP_PER_PASS],
    /// Bit `i` set when slot `i` holds a real entry
    pub valid_mask: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct MacroGroupAabbParams {
    pub macro_group_id: u32,
    pub macro_group_valid: u32,
    /// 1 on the first batch of a macro group
    pub clear_buffer: u32,
    pub _padding: u32,
}

static_assertions::const_assert_eq!(std::mem::size_of::<MacroGroupAabbParams>(), 16);
