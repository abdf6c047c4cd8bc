//! wgpu implementation of the hardware-abstraction contract.
//!
//! Pass compatibility is captured by [`WgpuPassFormat`]: color format,
//! optional depth format and sample count, compared by value. The update
//! batch stages its writes CPU-side and applies them in
//! [`WgpuUpdateBatch::commit`], which the caller runs right before
//! submitting the frame's command buffer; nothing is uploaded behind the
//! caller's back.
//!
//! wgpu reports allocation failure through device error callbacks instead
//! of creation return values, so the fallible `create_*` signatures never
//! fail here; the contract keeps them fallible for device layers that do.

use crate::{
    rhi::{BufferUsage, CommandRecorder, FilterMode, PipelineSpec, RenderTargetInfo, ResourceError, ResourceUpdates, Rhi},
    snapshot::{AtlasImage, VERTEX_STRIDE},
};

/// Value-compared pass compatibility descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WgpuPassFormat {
    pub color_format: wgpu::TextureFormat,
    pub depth_format: Option<wgpu::TextureFormat>,
    pub sample_count: u32,
}

/// Device backend over a wgpu device/queue pair.
///
/// The shader module and bind-group/pipeline layouts are created once;
/// pipelines are instantiated per pass format by the cache.
#[derive(Clone)]
pub struct WgpuRhi {
    device: wgpu::Device,
    queue: wgpu::Queue,
    shader: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
}

impl WgpuRhi {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("imgui shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("imgui.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("imgui bind group layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("imgui pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        WgpuRhi {
            device,
            queue,
            shader,
            bind_group_layout,
            pipeline_layout,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Convenience for describing the pass a surface or offscreen target
    /// renders through.
    pub fn target_info(
        pixel_size: [u32; 2],
        color_format: wgpu::TextureFormat,
        depth_format: Option<wgpu::TextureFormat>,
        sample_count: u32,
    ) -> RenderTargetInfo<WgpuRhi> {
        RenderTargetInfo {
            pixel_size,
            format: WgpuPassFormat {
                color_format,
                depth_format,
                sample_count,
            },
        }
    }
}

/// CPU-staged uploads, applied on [`commit`](WgpuUpdateBatch::commit).
#[derive(Default)]
pub struct WgpuUpdateBatch {
    buffer_writes: Vec<(wgpu::Buffer, u64, Vec<u8>)>,
    texture_writes: Vec<(wgpu::Texture, AtlasImage)>,
}

impl WgpuUpdateBatch {
    pub fn is_empty(&self) -> bool {
        self.buffer_writes.is_empty() && self.texture_writes.is_empty()
    }

    /// Applies the staged writes. Call before submitting the command buffer
    /// recording this frame's draws; the queue delivers the copies ahead of
    /// the next submission.
    pub fn commit(self, queue: &wgpu::Queue) {
        for (buffer, offset, bytes) in &self.buffer_writes {
            if !bytes.is_empty() {
                queue.write_buffer(buffer, *offset, bytes);
            }
        }
        for (texture, image) in &self.texture_writes {
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &image.data,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * image.width),
                    rows_per_image: Some(image.height),
                },
                wgpu::Extent3d {
                    width: image.width,
                    height: image.height,
                    depth_or_array_layers: 1,
                },
            );
        }
    }
}

impl ResourceUpdates<WgpuRhi> for WgpuUpdateBatch {
    fn update_buffer(&mut self, buffer: &wgpu::Buffer, offset: u64, bytes: &[u8]) {
        self.buffer_writes.push((buffer.clone(), offset, bytes.to_vec()));
    }

    fn upload_texture(&mut self, texture: &wgpu::Texture, image: &AtlasImage) {
        self.texture_writes.push((texture.clone(), image.clone()));
    }
}

impl Rhi for WgpuRhi {
    type Buffer = wgpu::Buffer;
    type Texture = wgpu::Texture;
    type Sampler = wgpu::Sampler;
    type ShaderResources = wgpu::BindGroup;
    type Pipeline = wgpu::RenderPipeline;
    type PassFormat = WgpuPassFormat;
    type UpdateBatch = WgpuUpdateBatch;

    fn new_update_batch(&self) -> WgpuUpdateBatch {
        WgpuUpdateBatch::default()
    }

    fn create_buffer(
        &self,
        usage: BufferUsage,
        size: u64,
        label: &str,
    ) -> Result<wgpu::Buffer, ResourceError> {
        let usage = match usage {
            BufferUsage::Vertex => wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            BufferUsage::Index => wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            BufferUsage::Uniform => wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        };
        Ok(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        }))
    }

    fn create_texture(&self, size: [u32; 2], label: &str) -> Result<wgpu::Texture, ResourceError> {
        Ok(self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size[0],
                height: size[1],
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        }))
    }

    fn create_sampler(&self, filter: FilterMode) -> Result<wgpu::Sampler, ResourceError> {
        let mode = match filter {
            FilterMode::Linear => wgpu::FilterMode::Linear,
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
        };
        Ok(self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("imgui sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: mode,
            min_filter: mode,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        }))
    }

    fn create_shader_resources(
        &self,
        uniforms: &wgpu::Buffer,
        texture: &wgpu::Texture,
        sampler: &wgpu::Sampler,
    ) -> Result<wgpu::BindGroup, ResourceError> {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("imgui bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        }))
    }

    fn create_pipeline(
        &self,
        spec: PipelineSpec,
        format: &WgpuPassFormat,
    ) -> Result<wgpu::RenderPipeline, ResourceError> {
        const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
            wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2, 2 => Unorm8x4];

        let depth_stencil = format.depth_format.map(|depth| wgpu::DepthStencilState {
            format: depth,
            depth_write_enabled: false,
            depth_compare: if spec.depth_test {
                wgpu::CompareFunction::LessEqual
            } else {
                wgpu::CompareFunction::Always
            },
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        Ok(self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("imgui pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &self.shader,
                    entry_point: Some("vs_main"),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: VERTEX_STRIDE as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &VERTEX_ATTRIBUTES,
                    }],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &self.shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: format.color_format,
                        blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil,
                multisample: wgpu::MultisampleState {
                    count: format.sample_count,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview_mask: None,
                cache: None,
            }))
    }

    fn destroy_texture(&self, texture: wgpu::Texture) {
        texture.destroy();
    }
}

impl CommandRecorder<WgpuRhi> for wgpu::RenderPass<'_> {
    fn set_viewport(&mut self, width: f32, height: f32) {
        wgpu::RenderPass::set_viewport(self, 0.0, 0.0, width, height, 0.0, 1.0);
    }

    fn set_scissor(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.set_scissor_rect(x, y, width, height);
    }

    fn set_pipeline(&mut self, pipeline: &wgpu::RenderPipeline) {
        wgpu::RenderPass::set_pipeline(self, pipeline);
    }

    fn set_shader_resources(&mut self, resources: &wgpu::BindGroup) {
        self.set_bind_group(0, resources, &[]);
    }

    fn set_vertex_input(&mut self, buffer: &wgpu::Buffer, offset: u64) {
        self.set_vertex_buffer(0, buffer.slice(offset..));
    }

    fn set_index_input(&mut self, buffer: &wgpu::Buffer, offset: u64) {
        self.set_index_buffer(buffer.slice(offset..), wgpu::IndexFormat::Uint32);
    }

    fn draw_indexed(&mut self, elem_count: u32) {
        wgpu::RenderPass::draw_indexed(self, 0..elem_count, 0, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_format_identity_is_by_value() {
        let a = WgpuPassFormat {
            color_format: wgpu::TextureFormat::Bgra8Unorm,
            depth_format: Some(wgpu::TextureFormat::Depth24PlusStencil8),
            sample_count: 1,
        };
        assert_eq!(a, a.clone());
        let b = WgpuPassFormat {
            color_format: wgpu::TextureFormat::Rgba8Unorm,
            ..a.clone()
        };
        assert_ne!(a, b);
    }
}
