//! # sprig-wgpu
//!
//! WGPU backend for sprig.
//!
//! Draws submitted by the batch renderer are recorded during the frame and replayed in a
//! single render pass by [`WgpuBackend::render`]. Every draw binds its own table of up
//! to [`MAX_TEXTURE_SLOTS`] textures through a texture binding array, so the device must
//! be created with [`WgpuBackend::required_features`] and the adapter's limits.
//!
//! All textures are stored as RGBA8. Single-channel coverage data is widened on upload
//! to white with the coverage in alpha, which lets glyph atlases and images share one
//! shader path.

mod textures;
mod vertex;

pub use vertex::*;

use textures::{table_key, Bound, TableCache, TextureRegistry};

use std::num::{NonZeroU32, NonZeroU64};

use glam::UVec2;
use sprig::{
    BatchVertex, CameraUniform, DrawBatch, GpuBackend, TextureDesc, TextureFormat, TextureId,
    TextureWrite, MAX_TEXTURE_SLOTS,
};

const INITIAL_VERTEX_CAPACITY: usize = 4096;
const INITIAL_CAMERA_CAPACITY: usize = 8;
const CAMERA_UNIFORM_SIZE: u64 = std::mem::size_of::<CameraUniform>() as u64;

#[derive(Clone)]
struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: UVec2,
    format: TextureFormat,
}

/// A draw recorded by `draw_batch`, waiting for `render`.
struct PendingDraw {
    base_vertex: i32,
    index_count: u32,
    textures: Vec<Bound<GpuTexture>>,
    camera_slot: u32,
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,

    camera_layout: wgpu::BindGroupLayout,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    camera_stride: u64,
    camera_capacity: usize,

    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    textures: TextureRegistry<GpuTexture>,
    bind_groups: TableCache<wgpu::BindGroup>,

    vertex_buffer: wgpu::Buffer,
    vertex_capacity: usize,
    index_buffer: Option<wgpu::Buffer>,

    frame_vertices: Vec<BatchVertex>,
    frame_cameras: Vec<CameraUniform>,
    draws: Vec<PendingDraw>,
}

impl WgpuBackend {
    /// Features the device must be created with.
    pub fn required_features() -> wgpu::Features {
        wgpu::Features::TEXTURE_BINDING_ARRAY
            | wgpu::Features::SAMPLED_TEXTURE_AND_STORAGE_BUFFER_ARRAY_NON_UNIFORM_INDEXING
    }

    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        surface_format: wgpu::TextureFormat,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Sprig Batch Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/batch.wgsl").into()),
        });

        let camera_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Sprig Camera Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(CAMERA_UNIFORM_SIZE),
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Sprig Texture Table Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: NonZeroU32::new(MAX_TEXTURE_SLOTS as u32),
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Sprig Batch Pipeline Layout"),
            bind_group_layouts: &[&camera_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Sprig Batch Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[batch_vertex_layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Sprig Texture Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let camera_stride = CAMERA_UNIFORM_SIZE
            .next_multiple_of(device.limits().min_uniform_buffer_offset_alignment as u64);
        let camera_buffer = create_camera_buffer(device, camera_stride, INITIAL_CAMERA_CAPACITY);
        let camera_bind_group = create_camera_bind_group(device, &camera_layout, &camera_buffer);

        let vertex_buffer = create_vertex_buffer(device, INITIAL_VERTEX_CAPACITY);

        let fallback = create_gpu_texture(device, UVec2::ONE, TextureFormat::Rgba8);
        write_rgba(queue, &fallback.texture, UVec2::ZERO, UVec2::ONE, &[255; 4]);

        log::info!("✓ Sprig wgpu backend initialized");

        Self {
            device: device.clone(),
            queue: queue.clone(),
            pipeline,
            camera_layout,
            camera_buffer,
            camera_bind_group,
            camera_stride,
            camera_capacity: INITIAL_CAMERA_CAPACITY,
            texture_layout,
            sampler,
            textures: TextureRegistry::new(fallback),
            bind_groups: TableCache::new(),
            vertex_buffer,
            vertex_capacity: INITIAL_VERTEX_CAPACITY,
            index_buffer: None,
            frame_vertices: Vec::new(),
            frame_cameras: Vec::new(),
            draws: Vec::new(),
        }
    }

    /// Replay every draw recorded since the last call into `target`, on top of its
    /// current contents.
    ///
    /// Each draw samples the textures as they were when it was submitted, even if a
    /// texture was resized later in the frame.
    pub fn render(&mut self, encoder: &mut wgpu::CommandEncoder, target: &wgpu::TextureView) {
        if self.draws.is_empty() {
            return;
        }
        let Some(index_buffer) = self.index_buffer.clone() else {
            log::warn!("draws recorded before the quad index buffer was created");
            self.clear_frame();
            return;
        };

        if self.frame_vertices.len() > self.vertex_capacity {
            self.vertex_capacity = self.frame_vertices.len().next_power_of_two();
            self.vertex_buffer = create_vertex_buffer(&self.device, self.vertex_capacity);
        }
        if self.frame_cameras.len() > self.camera_capacity {
            self.camera_capacity = self.frame_cameras.len().next_power_of_two();
            self.camera_buffer =
                create_camera_buffer(&self.device, self.camera_stride, self.camera_capacity);
            self.camera_bind_group =
                create_camera_bind_group(&self.device, &self.camera_layout, &self.camera_buffer);
        }

        self.queue.write_buffer(
            &self.vertex_buffer,
            0,
            bytemuck::cast_slice(&self.frame_vertices),
        );
        for (slot, camera) in self.frame_cameras.iter().enumerate() {
            self.queue.write_buffer(
                &self.camera_buffer,
                slot as u64 * self.camera_stride,
                bytemuck::bytes_of(camera),
            );
        }

        let texture_tables: Vec<wgpu::BindGroup> = self
            .draws
            .iter()
            .map(|draw| {
                self.bind_groups
                    .get_or_insert_with(table_key(&draw.textures), || {
                        create_texture_bind_group(
                            &self.device,
                            &self.texture_layout,
                            &self.sampler,
                            &draw.textures,
                        )
                    })
                    .clone()
            })
            .collect();
        self.bind_groups.end_frame();

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Sprig Batch Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
            render_pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);

            for (draw, textures) in self.draws.iter().zip(&texture_tables) {
                let camera_offset = (draw.camera_slot as u64 * self.camera_stride) as u32;
                render_pass.set_bind_group(0, &self.camera_bind_group, &[camera_offset]);
                render_pass.set_bind_group(1, textures, &[]);
                render_pass.draw_indexed(0..draw.index_count, draw.base_vertex, 0..1);
            }
        }

        self.clear_frame();
    }

    fn clear_frame(&mut self) {
        self.frame_vertices.clear();
        self.frame_cameras.clear();
        self.draws.clear();
    }
}

impl GpuBackend for WgpuBackend {
    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> TextureId {
        let texture = create_gpu_texture(&self.device, desc.size, desc.format);
        if let Some(data) = desc.data {
            let rgba = widen_to_rgba(desc.format, desc.size, 1, data);
            write_rgba(&self.queue, &texture.texture, UVec2::ZERO, desc.size, &rgba);
        }

        self.textures.insert(texture)
    }

    fn resize_texture(&mut self, texture: TextureId, size: UVec2, data: &[u8]) {
        let Some(format) = self.textures.get(texture).map(|old| old.format) else {
            log::warn!("resize of unknown texture {texture:?}");
            return;
        };

        // Draws already recorded keep the old texture alive through their snapshot.
        let replacement = create_gpu_texture(&self.device, size, format);
        let rgba = widen_to_rgba(format, size, 1, data);
        write_rgba(&self.queue, &replacement.texture, UVec2::ZERO, size, &rgba);

        self.textures.replace(texture, replacement);
    }

    fn write_texture(&mut self, texture: TextureId, write: &TextureWrite<'_>) {
        if write.size.x == 0 || write.size.y == 0 {
            return;
        }
        let Some(target) = self.textures.get(texture) else {
            log::warn!("write to unknown texture {texture:?}");
            return;
        };

        let rgba = widen_to_rgba(write.format, write.size, write.alignment, write.data);
        write_rgba(&self.queue, &target.texture, write.origin, write.size, &rgba);
    }

    fn texture_size(&self, texture: TextureId) -> UVec2 {
        self.textures.resolve(texture).value.size
    }

    fn create_index_buffer(&mut self, indices: &[u32]) {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sprig Quad Index Buffer"),
            size: std::mem::size_of_val(indices) as u64,
            usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: true,
        });
        buffer
            .slice(..)
            .get_mapped_range_mut()
            .copy_from_slice(bytemuck::cast_slice(indices));
        buffer.unmap();

        self.index_buffer = Some(buffer);
    }

    fn draw_batch(&mut self, batch: &DrawBatch<'_>) {
        self.draws.push(PendingDraw {
            base_vertex: self.frame_vertices.len() as i32,
            index_count: batch.index_count,
            textures: self.textures.snapshot(batch.textures),
            camera_slot: self.frame_cameras.len() as u32,
        });
        self.frame_vertices.extend_from_slice(batch.vertices);
        self.frame_cameras.push(batch.camera);
    }
}

fn create_gpu_texture(device: &wgpu::Device, size: UVec2, format: TextureFormat) -> GpuTexture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Sprig Texture"),
        size: wgpu::Extent3d {
            width: size.x.max(1),
            height: size.y.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    GpuTexture {
        texture,
        view,
        size,
        format,
    }
}

fn create_texture_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    table: &[Bound<GpuTexture>],
) -> wgpu::BindGroup {
    let views: Vec<&wgpu::TextureView> = table.iter().map(|bound| &bound.value.view).collect();

    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Sprig Texture Table Bind Group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureViewArray(&views),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

fn create_vertex_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Sprig Vertex Buffer"),
        size: (capacity * std::mem::size_of::<BatchVertex>()) as u64,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_camera_buffer(device: &wgpu::Device, stride: u64, capacity: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Sprig Camera Buffer"),
        size: stride * capacity as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_camera_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Sprig Camera Bind Group"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer,
                offset: 0,
                size: NonZeroU64::new(CAMERA_UNIFORM_SIZE),
            }),
        }],
    })
}

fn write_rgba(
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    origin: UVec2,
    size: UVec2,
    rgba: &[u8],
) {
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d {
                x: origin.x,
                y: origin.y,
                z: 0,
            },
            aspect: wgpu::TextureAspect::All,
        },
        rgba,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(size.x * 4),
            rows_per_image: Some(size.y),
        },
        wgpu::Extent3d {
            width: size.x,
            height: size.y,
            depth_or_array_layers: 1,
        },
    );
}

/// Repack `data` (rows padded to `alignment` bytes) into tight RGBA8 rows.
fn widen_to_rgba(format: TextureFormat, size: UVec2, alignment: u32, data: &[u8]) -> Vec<u8> {
    let row_bytes = (size.x * format.bytes_per_pixel()) as usize;
    let stride = row_bytes.next_multiple_of(alignment.max(1) as usize);

    let mut rgba = Vec::with_capacity((size.x * size.y * 4) as usize);
    for row in 0..size.y as usize {
        let Some(src) = data.get(row * stride..row * stride + row_bytes) else {
            break;
        };
        match format {
            TextureFormat::R8 => {
                for &coverage in src {
                    rgba.extend_from_slice(&[255, 255, 255, coverage]);
                }
            }
            TextureFormat::Rgba8 => rgba.extend_from_slice(src),
        }
    }
    // Short input: pad with transparent pixels rather than upload a truncated image.
    rgba.resize((size.x * size.y * 4) as usize, 0);
    rgba
}
