//! Frame Graph Operations - Pure DOP Functions
//!
//! Recording functions validate every pass as it is declared so contract
//! violations surface at the call site that caused them.

use super::graph_data::*;
use super::kernels::{kernel_name, KernelId};
use crate::constants::gpu_limits::{DISPATCH_INDIRECT_ARGS_SIZE, DRAW_INDIRECT_ARGS_SIZE};
use crate::dispatch::validate_group_count;
use crate::error::{StrandsError, StrandsResult};
use bytemuck::Pod;

/// Create an empty frame graph
pub fn create_frame_graph(label: &str) -> FrameGraph {
    FrameGraph {
        label: label.to_string(),
        ..Default::default()
    }
}

pub fn buffer_byte_size(desc: &BufferDesc) -> u64 {
    desc.element_size as u64 * desc.element_count as u64
}

/// Declare a transient buffer
pub fn create_buffer(graph: &mut FrameGraph, desc: BufferDesc) -> BufferHandle {
    let handle = BufferHandle(graph.buffers.len() as u32);
    graph.buffers.push(BufferEntry {
        desc,
        external: None,
        extracted: false,
    });
    handle
}

/// Declare a transient structured storage buffer
pub fn create_structured_buffer(
    graph: &mut FrameGraph,
    label: &str,
    element_size: u32,
    element_count: u32,
) -> BufferHandle {
    create_buffer(
        graph,
        BufferDesc {
            label: label.to_string(),
            element_size,
            element_count,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
        },
    )
}

/// Declare a buffer holding `count` indirect dispatch argument blocks
pub fn create_dispatch_args_buffer(graph: &mut FrameGraph, label: &str, count: u32) -> BufferHandle {
    create_buffer(
        graph,
        BufferDesc {
            label: label.to_string(),
            element_size: DISPATCH_INDIRECT_ARGS_SIZE as u32,
            element_count: count,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::INDIRECT
                | wgpu::BufferUsages::COPY_DST,
        },
    )
}

/// Declare a buffer holding `count` indirect draw argument blocks
pub fn create_draw_args_buffer(graph: &mut FrameGraph, label: &str, count: u32) -> BufferHandle {
    create_buffer(
        graph,
        BufferDesc {
            label: label.to_string(),
            element_size: DRAW_INDIRECT_ARGS_SIZE as u32,
            element_count: count,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::INDIRECT
                | wgpu::BufferUsages::COPY_DST,
        },
    )
}

/// Declare a transient texture
pub fn create_texture(graph: &mut FrameGraph, desc: TextureDesc) -> TextureHandle {
    let handle = TextureHandle(graph.textures.len() as u32);
    graph.textures.push(TextureEntry {
        desc,
        external: None,
        extracted: false,
    });
    handle
}

/// Declare a 2D texture with one mip and one sample
pub fn create_texture_2d(
    graph: &mut FrameGraph,
    label: &str,
    extent: [u32; 2],
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
) -> TextureHandle {
    create_texture(
        graph,
        TextureDesc {
            label: label.to_string(),
            size: wgpu::Extent3d {
                width: extent[0].max(1),
                height: extent[1].max(1),
                depth_or_array_layers: 1,
            },
            dimension: wgpu::TextureDimension::D2,
            format,
            mip_level_count: 1,
            sample_count: 1,
            usage,
        },
    )
}

/// Bring a host-owned buffer into the graph
pub fn import_buffer(graph: &mut FrameGraph, id: ExternalBufferId, desc: BufferDesc) -> BufferHandle {
    let handle = BufferHandle(graph.buffers.len() as u32);
    graph.buffers.push(BufferEntry {
        desc,
        external: Some(id),
        extracted: false,
    });
    handle
}

/// Bring a host-owned texture into the graph
pub fn import_texture(
    graph: &mut FrameGraph,
    id: ExternalTextureId,
    desc: TextureDesc,
) -> TextureHandle {
    let handle = TextureHandle(graph.textures.len() as u32);
    graph.textures.push(TextureEntry {
        desc,
        external: Some(id),
        extracted: false,
    });
    handle
}

/// Keep a transient buffer alive past the end of the frame
pub fn extract_buffer(graph: &mut FrameGraph, handle: BufferHandle) -> StrandsResult<()> {
    let entry = graph
        .buffers
        .get_mut(handle.0 as usize)
        .ok_or(StrandsError::InvalidHandle {
            kind: "buffer",
            index: handle.0,
        })?;
    entry.extracted = true;
    Ok(())
}

/// Keep a transient texture alive past the end of the frame
pub fn extract_texture(graph: &mut FrameGraph, handle: TextureHandle) -> StrandsResult<()> {
    let entry = graph
        .textures
        .get_mut(handle.0 as usize)
        .ok_or(StrandsError::InvalidHandle {
            kind: "texture",
            index: handle.0,
        })?;
    entry.extracted = true;
    Ok(())
}

pub fn buffer_desc(graph: &FrameGraph, handle: BufferHandle) -> StrandsResult<&BufferDesc> {
    graph
        .buffers
        .get(handle.0 as usize)
        .map(|entry| &entry.desc)
        .ok_or(StrandsError::InvalidHandle {
            kind: "buffer",
            index: handle.0,
        })
}

pub fn texture_desc(graph: &FrameGraph, handle: TextureHandle) -> StrandsResult<&TextureDesc> {
    graph
        .textures
        .get(handle.0 as usize)
        .map(|entry| &entry.desc)
        .ok_or(StrandsError::InvalidHandle {
            kind: "texture",
            index: handle.0,
        })
}

pub fn buffer_srv(handle: BufferHandle) -> Binding {
    Binding {
        resource: ResourceRef::Buffer(handle),
        access: Access::Read,
    }
}

pub fn buffer_uav(handle: BufferHandle) -> Binding {
    Binding {
        resource: ResourceRef::Buffer(handle),
        access: Access::ReadWrite,
    }
}

pub fn texture_srv(handle: TextureHandle) -> Binding {
    Binding {
        resource: ResourceRef::Texture { handle, mip: None },
        access: Access::Read,
    }
}

pub fn texture_uav(handle: TextureHandle) -> Binding {
    Binding {
        resource: ResourceRef::Texture { handle, mip: None },
        access: Access::ReadWrite,
    }
}

pub fn texture_mip_srv(handle: TextureHandle, mip: u32) -> Binding {
    Binding {
        resource: ResourceRef::Texture {
            handle,
            mip: Some(mip),
        },
        access: Access::Read,
    }
}

pub fn texture_mip_uav(handle: TextureHandle, mip: u32) -> Binding {
    Binding {
        resource: ResourceRef::Texture {
            handle,
            mip: Some(mip),
        },
        access: Access::ReadWrite,
    }
}

/// Open a named event scope; passes record the innermost scope path
pub fn begin_scope(graph: &mut FrameGraph, name: &str) {
    graph.scope_stack.push(name.to_string());
}

pub fn end_scope(graph: &mut FrameGraph) {
    graph.scope_stack.pop();
}

fn current_scope(graph: &FrameGraph) -> String {
    graph.scope_stack.join("/")
}

/// Record a compute pass
pub fn add_compute_pass<P: Pod>(
    graph: &mut FrameGraph,
    name: &str,
    kernel: KernelId,
    params: &P,
    bindings: Vec<Binding>,
    dispatch: Dispatch,
) -> StrandsResult<()> {
    match dispatch {
        Dispatch::Direct(groups) => validate_group_count(name, groups)?,
        Dispatch::Indirect { args, offset } => {
            validate_indirect_args(graph, name, args, offset, DISPATCH_INDIRECT_ARGS_SIZE)?
        }
    }
    validate_bindings(graph, &bindings)?;

    log::debug!(
        "[graph_operations::add_compute_pass] {} ({}) {:?}",
        name,
        kernel_name(kernel),
        dispatch
    );

    let scope = current_scope(graph);
    graph.passes.push(PassDesc {
        name: name.to_string(),
        scope,
        kind: PassKind::Compute { kernel, dispatch },
        params: bytemuck::bytes_of(params).to_vec(),
        bindings,
    });
    Ok(())
}

/// Record a raster pass
pub fn add_raster_pass<P: Pod>(
    graph: &mut FrameGraph,
    name: &str,
    kernel: KernelId,
    params: &P,
    bindings: Vec<Binding>,
    targets: RasterTargets,
    draws: Vec<Draw>,
) -> StrandsResult<()> {
    for draw in &draws {
        if let Draw::Indirect { args, offset } = *draw {
            validate_indirect_args(graph, name, args, offset, DRAW_INDIRECT_ARGS_SIZE)?;
        }
    }
    for attachment in &targets.color {
        texture_desc(graph, attachment.texture)?;
    }
    if let Some(depth) = &targets.depth {
        texture_desc(graph, depth.texture)?;
    }
    validate_bindings(graph, &bindings)?;

    log::debug!(
        "[graph_operations::add_raster_pass] {} ({}) {} draws, viewport {:?}",
        name,
        kernel_name(kernel),
        draws.len(),
        targets.viewport
    );

    let scope = current_scope(graph);
    graph.passes.push(PassDesc {
        name: name.to_string(),
        scope,
        kind: PassKind::Raster {
            kernel,
            targets,
            draws,
        },
        params: bytemuck::bytes_of(params).to_vec(),
        bindings,
    });
    Ok(())
}

/// Fill a buffer with a repeated u32 value
pub fn add_clear_buffer_pass(
    graph: &mut FrameGraph,
    name: &str,
    buffer: BufferHandle,
    value: u32,
) -> StrandsResult<()> {
    buffer_desc(graph, buffer)?;
    let scope = current_scope(graph);
    graph.passes.push(PassDesc {
        name: name.to_string(),
        scope,
        kind: PassKind::ClearBuffer { buffer, value },
        params: Vec::new(),
        bindings: vec![buffer_uav(buffer)],
    });
    Ok(())
}

/// Copy the first `size` bytes of `src` into `dst`
pub fn add_copy_buffer_pass(
    graph: &mut FrameGraph,
    name: &str,
    src: BufferHandle,
    dst: BufferHandle,
    size: u64,
) -> StrandsResult<()> {
    let src_size = buffer_byte_size(buffer_desc(graph, src)?);
    let dst_size = buffer_byte_size(buffer_desc(graph, dst)?);
    if size > src_size || size > dst_size {
        return Err(StrandsError::BufferSizeMismatch {
            resource: name.to_string(),
            expected: size,
            found: src_size.min(dst_size),
        });
    }
    let scope = current_scope(graph);
    graph.passes.push(PassDesc {
        name: name.to_string(),
        scope,
        kind: PassKind::CopyBuffer { src, dst, size },
        params: Vec::new(),
        bindings: vec![buffer_srv(src), buffer_uav(dst)],
    });
    Ok(())
}

fn validate_indirect_args(
    graph: &FrameGraph,
    pass: &str,
    args: BufferHandle,
    offset: u64,
    block_size: u64,
) -> StrandsResult<()> {
    let desc = buffer_desc(graph, args)?;
    if !desc.usage.contains(wgpu::BufferUsages::INDIRECT) {
        return Err(StrandsError::GpuOperationFailed {
            operation: pass.to_string(),
            error: format!("{} is not an indirect argument buffer", desc.label),
        });
    }
    let size = buffer_byte_size(desc);
    if offset % 4 != 0 || offset + block_size > size {
        return Err(StrandsError::BufferSizeMismatch {
            resource: desc.label.clone(),
            expected: offset + block_size,
            found: size,
        });
    }
    Ok(())
}

fn validate_bindings(graph: &FrameGraph, bindings: &[Binding]) -> StrandsResult<()> {
    for binding in bindings {
        match binding.resource {
            ResourceRef::Buffer(handle) => {
                buffer_desc(graph, handle)?;
            }
            ResourceRef::Texture { handle, mip } => {
                let desc = texture_desc(graph, handle)?;
                if let Some(mip) = mip {
                    if mip >= desc.mip_level_count {
                        return Err(StrandsError::InvalidHandle {
                            kind: "texture mip",
                            index: mip,
                        });
                    }
                }
            }
        }
    }
    Ok(())
}

/// Passes whose name starts with `prefix`
pub fn passes_named<'a>(graph: &'a FrameGraph, prefix: &str) -> Vec<&'a PassDesc> {
    graph
        .passes
        .iter()
        .filter(|pass| pass.name.starts_with(prefix))
        .collect()
}

/// Kernel of a compute or raster pass
pub fn pass_kernel(pass: &PassDesc) -> Option<KernelId> {
    match &pass.kind {
        PassKind::Compute { kernel, .. } | PassKind::Raster { kernel, .. } => Some(*kernel),
        _ => None,
    }
}

/// Read the pass parameter block back as a typed value
pub fn pass_params<P: Pod>(pass: &PassDesc) -> Option<P> {
    bytemuck::try_pod_read_unaligned(&pass.params).ok()
}
