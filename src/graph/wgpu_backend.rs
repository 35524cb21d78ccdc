//! wgpu execution of recorded frame graphs
//!
//! Resources are realized up front, passes are encoded in declaration order
//! into one command encoder, and validation errors raised while encoding are
//! captured with error scopes instead of reaching the uncaptured handler.

use super::graph_data::*;
use super::graph_operations::buffer_byte_size;
use super::kernels::{kernel_name, KernelId};
use crate::error::{OptionExt, StrandsError, StrandsResult};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use wgpu::util::DeviceExt;

/// Host-side pipeline cache keyed by kernel
///
/// Compute pipelines expose their parameter block at binding 0 and the pass
/// bindings from binding 1 onward, all in bind group 0. Raster passes without
/// attachments render into an `R8Unorm` target the pipeline must declare.
pub trait PipelineLibrary {
    fn compute_pipeline(&self, kernel: KernelId) -> Option<&wgpu::ComputePipeline>;
    fn render_pipeline(&self, kernel: KernelId) -> Option<&wgpu::RenderPipeline>;
}

/// Host-owned resources a graph may import
#[derive(Default)]
pub struct ResourceRegistry {
    pub buffers: FxHashMap<ExternalBufferId, Arc<wgpu::Buffer>>,
    pub textures: FxHashMap<ExternalTextureId, Arc<wgpu::Texture>>,
}

/// Resources marked for extraction, alive after the frame
#[derive(Default)]
pub struct ExtractedResources {
    pub buffers: FxHashMap<BufferHandle, Arc<wgpu::Buffer>>,
    pub textures: FxHashMap<TextureHandle, Arc<wgpu::Texture>>,
}

struct RealizedResources {
    buffers: Vec<Arc<wgpu::Buffer>>,
    textures: Vec<Arc<wgpu::Texture>>,
}

pub fn register_external_buffer(
    registry: &mut ResourceRegistry,
    id: ExternalBufferId,
    buffer: Arc<wgpu::Buffer>,
) {
    registry.buffers.insert(id, buffer);
}

pub fn register_external_texture(
    registry: &mut ResourceRegistry,
    id: ExternalTextureId,
    texture: Arc<wgpu::Texture>,
) {
    registry.textures.insert(id, texture);
}

/// Allocate, encode and submit a recorded frame graph
pub fn execute_frame_graph(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    graph: &FrameGraph,
    pipelines: &dyn PipelineLibrary,
    registry: &ResourceRegistry,
) -> StrandsResult<ExtractedResources> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);

    let result = encode_and_submit(device, queue, graph, pipelines, registry);

    let out_of_memory = pollster::block_on(device.pop_error_scope());
    let validation = pollster::block_on(device.pop_error_scope());
    if let Some(error) = out_of_memory.or(validation) {
        log::error!(
            "[wgpu_backend::execute_frame_graph] GPU error while executing {}: {}",
            graph.label,
            error
        );
        return Err(StrandsError::GpuOperationFailed {
            operation: graph.label.clone(),
            error: error.to_string(),
        });
    }

    let realized = result?;
    let mut extracted = ExtractedResources::default();
    for (index, entry) in graph.buffers.iter().enumerate() {
        if entry.extracted {
            extracted
                .buffers
                .insert(BufferHandle(index as u32), realized.buffers[index].clone());
        }
    }
    for (index, entry) in graph.textures.iter().enumerate() {
        if entry.extracted {
            extracted
                .textures
                .insert(TextureHandle(index as u32), realized.textures[index].clone());
        }
    }

    log::debug!(
        "[wgpu_backend::execute_frame_graph] {}: {} passes, {} buffers, {} textures, {} extracted",
        graph.label,
        graph.passes.len(),
        graph.buffers.len(),
        graph.textures.len(),
        extracted.buffers.len() + extracted.textures.len()
    );
    Ok(extracted)
}

fn encode_and_submit(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    graph: &FrameGraph,
    pipelines: &dyn PipelineLibrary,
    registry: &ResourceRegistry,
) -> StrandsResult<RealizedResources> {
    let realized = realize_resources(device, graph, registry)?;

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some(&graph.label),
    });
    for pass in &graph.passes {
        encode_pass(device, &mut encoder, graph, &realized, pipelines, pass)?;
    }
    queue.submit(std::iter::once(encoder.finish()));

    Ok(realized)
}

fn realize_resources(
    device: &wgpu::Device,
    graph: &FrameGraph,
    registry: &ResourceRegistry,
) -> StrandsResult<RealizedResources> {
    let mut buffers = Vec::with_capacity(graph.buffers.len());
    for entry in &graph.buffers {
        let buffer = match entry.external {
            Some(id) => registry
                .buffers
                .get(&id)
                .cloned()
                .ok_or_else(|| StrandsError::MissingResource {
                    resource: entry.desc.label.clone(),
                })?,
            None => Arc::new(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&entry.desc.label),
                size: aligned_size(buffer_byte_size(&entry.desc)),
                usage: entry.desc.usage | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })),
        };
        buffers.push(buffer);
    }

    let mut textures = Vec::with_capacity(graph.textures.len());
    for entry in &graph.textures {
        let texture = match entry.external {
            Some(id) => registry
                .textures
                .get(&id)
                .cloned()
                .ok_or_else(|| StrandsError::MissingResource {
                    resource: entry.desc.label.clone(),
                })?,
            None => Arc::new(device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&entry.desc.label),
                size: entry.desc.size,
                mip_level_count: entry.desc.mip_level_count,
                sample_count: entry.desc.sample_count,
                dimension: entry.desc.dimension,
                format: entry.desc.format,
                usage: entry.desc.usage,
                view_formats: &[],
            })),
        };
        textures.push(texture);
    }

    Ok(RealizedResources { buffers, textures })
}

fn aligned_size(size: u64) -> u64 {
    let align = wgpu::COPY_BUFFER_ALIGNMENT;
    (size.max(align) + align - 1) / align * align
}

fn encode_pass(
    device: &wgpu::Device,
    encoder: &mut wgpu::CommandEncoder,
    graph: &FrameGraph,
    realized: &RealizedResources,
    pipelines: &dyn PipelineLibrary,
    pass: &PassDesc,
) -> StrandsResult<()> {
    match &pass.kind {
        PassKind::Compute { kernel, dispatch } => {
            let pipeline = pipelines
                .compute_pipeline(*kernel)
                .ok_or_strands(|| StrandsError::PipelineNotFound {
                    kernel: kernel_name(*kernel).to_string(),
                })?;
            let layout = pipeline.get_bind_group_layout(0);
            let params = create_params_buffer(device, pass);
            let views = create_binding_views(realized, pass);
            let bind_group =
                create_pass_bind_group(device, &layout, realized, pass, params.as_ref(), &views);

            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(&pass.name),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            match *dispatch {
                Dispatch::Direct([x, y, z]) => {
                    if x > 0 && y > 0 && z > 0 {
                        compute_pass.dispatch_workgroups(x, y, z);
                    }
                }
                Dispatch::Indirect { args, offset } => {
                    compute_pass
                        .dispatch_workgroups_indirect(&realized.buffers[args.0 as usize], offset);
                }
            }
        }
        PassKind::Raster {
            kernel,
            targets,
            draws,
        } => {
            let pipeline = pipelines
                .render_pipeline(*kernel)
                .ok_or_strands(|| StrandsError::PipelineNotFound {
                    kernel: kernel_name(*kernel).to_string(),
                })?;
            let layout = pipeline.get_bind_group_layout(0);
            let params = create_params_buffer(device, pass);
            let views = create_binding_views(realized, pass);
            let bind_group =
                create_pass_bind_group(device, &layout, realized, pass, params.as_ref(), &views);

            let placeholder = if targets.color.is_empty() && targets.depth.is_none() {
                Some(create_placeholder_target(device, targets.viewport))
            } else {
                None
            };
            let color_views: Vec<wgpu::TextureView> = match &placeholder {
                Some(texture) => vec![texture.create_view(&wgpu::TextureViewDescriptor::default())],
                None => targets
                    .color
                    .iter()
                    .map(|attachment| {
                        realized.textures[attachment.texture.0 as usize]
                            .create_view(&wgpu::TextureViewDescriptor::default())
                    })
                    .collect(),
            };
            let depth_view = targets.depth.as_ref().map(|depth| {
                realized.textures[depth.texture.0 as usize]
                    .create_view(&wgpu::TextureViewDescriptor::default())
            });

            let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = color_views
                .iter()
                .enumerate()
                .map(|(index, view)| {
                    let clear = targets.color.get(index).and_then(|a| a.clear);
                    Some(wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: match clear {
                                Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                                None if placeholder.is_some() => {
                                    wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT)
                                }
                                None => wgpu::LoadOp::Load,
                            },
                            store: wgpu::StoreOp::Store,
                        },
                    })
                })
                .collect();

            let depth_attachment = match (&targets.depth, &depth_view) {
                (Some(depth), Some(view)) => Some(wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: match depth.clear_depth {
                            Some(value) => wgpu::LoadOp::Clear(value),
                            None => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                _ => None,
            };

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&pass.name),
                color_attachments: &color_attachments,
                depth_stencil_attachment: depth_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            let [x, y, w, h] = targets.viewport;
            render_pass.set_viewport(x as f32, y as f32, w.max(1) as f32, h.max(1) as f32, 0.0, 1.0);
            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            for draw in draws {
                match *draw {
                    Draw::Direct {
                        vertex_count,
                        instance_count,
                    } => render_pass.draw(0..vertex_count, 0..instance_count),
                    Draw::Indirect { args, offset } => {
                        render_pass.draw_indirect(&realized.buffers[args.0 as usize], offset)
                    }
                }
            }
        }
        PassKind::ClearBuffer { buffer, value } => {
            let size = aligned_size(buffer_byte_size(&graph.buffers[buffer.0 as usize].desc));
            let fill = vec![*value; (size / 4) as usize];
            let staging = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&pass.name),
                contents: bytemuck::cast_slice(&fill),
                usage: wgpu::BufferUsages::COPY_SRC,
            });
            encoder.copy_buffer_to_buffer(&staging, 0, &realized.buffers[buffer.0 as usize], 0, size);
        }
        PassKind::CopyBuffer { src, dst, size } => {
            if *size > 0 {
                encoder.copy_buffer_to_buffer(
                    &realized.buffers[src.0 as usize],
                    0,
                    &realized.buffers[dst.0 as usize],
                    0,
                    *size / wgpu::COPY_BUFFER_ALIGNMENT * wgpu::COPY_BUFFER_ALIGNMENT,
                );
            }
        }
    }
    Ok(())
}

fn create_params_buffer(device: &wgpu::Device, pass: &PassDesc) -> Option<wgpu::Buffer> {
    if pass.params.is_empty() {
        return None;
    }
    // Uniform blocks are sized in 16 byte rows
    let mut contents = pass.params.clone();
    contents.resize((contents.len() + 15) / 16 * 16, 0);
    Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(&pass.name),
        contents: &contents,
        usage: wgpu::BufferUsages::UNIFORM,
    }))
}

fn create_binding_views(realized: &RealizedResources, pass: &PassDesc) -> Vec<Option<wgpu::TextureView>> {
    pass.bindings
        .iter()
        .map(|binding| match binding.resource {
            ResourceRef::Buffer(_) => None,
            ResourceRef::Texture { handle, mip } => {
                let texture = &realized.textures[handle.0 as usize];
                Some(texture.create_view(&wgpu::TextureViewDescriptor {
                    base_mip_level: mip.unwrap_or(0),
                    mip_level_count: mip.map(|_| 1),
                    ..Default::default()
                }))
            }
        })
        .collect()
}

fn create_pass_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    realized: &RealizedResources,
    pass: &PassDesc,
    params: Option<&wgpu::Buffer>,
    views: &[Option<wgpu::TextureView>],
) -> wgpu::BindGroup {
    let mut entries = Vec::with_capacity(pass.bindings.len() + 1);
    if let Some(params) = params {
        entries.push(wgpu::BindGroupEntry {
            binding: 0,
            resource: params.as_entire_binding(),
        });
    }
    for (index, binding) in pass.bindings.iter().enumerate() {
        let resource = match (binding.resource, &views[index]) {
            (ResourceRef::Texture { .. }, Some(view)) => wgpu::BindingResource::TextureView(view),
            (ResourceRef::Buffer(handle), _) => {
                realized.buffers[handle.0 as usize].as_entire_binding()
            }
            (ResourceRef::Texture { .. }, None) => continue,
        };
        entries.push(wgpu::BindGroupEntry {
            binding: index as u32 + 1,
            resource,
        });
    }

    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(&pass.name),
        layout,
        entries: &entries,
    })
}

fn create_placeholder_target(device: &wgpu::Device, viewport: [u32; 4]) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Hair Strands Placeholder Target"),
        size: wgpu::Extent3d {
            width: (viewport[0] + viewport[2]).max(1),
            height: (viewport[1] + viewport[3]).max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::R8Unorm,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    })
}

/// Copy a buffer back to the CPU and block until it is mapped
///
/// Only used for once-per-frame telemetry such as the voxel page feedback;
/// never on the recording path.
pub fn read_buffer_u32(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    buffer: &wgpu::Buffer,
    count: u32,
) -> StrandsResult<Vec<u32>> {
    let size = aligned_size(count as u64 * 4);
    let readback = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Hair Strands Readback"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Hair Strands Readback"),
    });
    encoder.copy_buffer_to_buffer(buffer, 0, &readback, 0, size);
    queue.submit(Some(encoder.finish()));

    let buffer_slice = readback.slice(..);
    let (sender, receiver) = flume::bounded(1);
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });

    device.poll(wgpu::Maintain::Wait);
    pollster::block_on(receiver.recv_async())
        .map_err(|_| StrandsError::BufferMapping {
            operation: "readback recv_async".to_string(),
        })?
        .map_err(|_| StrandsError::BufferMapping {
            operation: "readback map_async".to_string(),
        })?;

    let data = buffer_slice.get_mapped_range();
    let values = bytemuck::cast_slice::<u8, u32>(&data)[..count as usize].to_vec();
    drop(data);
    readback.unmap();

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_size() {
        assert_eq!(aligned_size(0), 4);
        assert_eq!(aligned_size(5), 8);
        assert_eq!(aligned_size(12), 12);
    }
}
