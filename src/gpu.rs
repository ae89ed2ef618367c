// Pingpong Diffusion - GPU Density Diffusion Sandbox
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! wgpu backend: field buffers, diffusion compute pipeline and render pipeline.

use std::sync::Arc;

use anyhow::Context;
use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::config::SimulationSettings;
use crate::error::SimError;
use crate::field::{Roles, Slot};
use crate::grid::{Grid, WORKGROUP_SIZE};
use crate::scheduler::FieldBackend;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct SimParams {
    grid_size: u32,
    edge_mode: u32,
    _pad: [u32; 2],
}

const _: [(); 16] = [(); std::mem::size_of::<SimParams>()];

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct RenderParams {
    grid_size: u32,
    _pad: [u32; 3],
    background: [f32; 4],
    color: [f32; 4],
}

const _: [(); 48] = [(); std::mem::size_of::<RenderParams>()];

// Two triangles covering the whole surface.
const QUAD_VERTICES: [[f32; 2]; 6] = [
    [-1.0, -1.0],
    [1.0, -1.0],
    [1.0, 1.0],
    [-1.0, -1.0],
    [1.0, 1.0],
    [-1.0, 1.0],
];

/// Byte offset of a density cell inside one slot buffer.
#[inline]
fn cell_offset(index: usize) -> wgpu::BufferAddress {
    (index * std::mem::size_of::<f32>()) as wgpu::BufferAddress
}

pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    grid: Grid,
    clear_color: wgpu::Color,

    // Buffers, indexed by Slot
    density: [wgpu::Buffer; 2],
    velocity: [wgpu::Buffer; 2],
    _params_buffer: wgpu::Buffer,
    _render_params_buffer: wgpu::Buffer,
    vertex_buffer: wgpu::Buffer,

    // Pipelines
    diffuse_pipeline: wgpu::ComputePipeline,
    render_pipeline: wgpu::RenderPipeline,

    // Bind groups: compute indexed by read slot, render by presented slot
    compute_bind_groups: [wgpu::BindGroup; 2],
    render_bind_groups: [wgpu::BindGroup; 2],
}

impl GpuBackend {
    /// Acquire adapter and device, create every buffer once and seed both
    /// density slots with `seed`. Fails when no compatible adapter exists.
    pub async fn new(
        window: Arc<winit::window::Window>,
        grid: Grid,
        settings: &SimulationSettings,
        seed: &[f32],
    ) -> anyhow::Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .context("failed to create window surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("no GPU adapter with compute support found")?;
        log::info!("Using GPU: {:?}", adapter.get_info());

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Diffusion Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .context("failed to open GPU device")?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .context("surface reports no texture formats")?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        // Create buffers
        let cells = grid.cell_count();
        let mut initial = seed.to_vec();
        initial.resize(cells, 0.0);
        let zero_velocity = vec![[0.0f32; 2]; cells];
        let storage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC;

        let density = ["Density A", "Density B"].map(|label| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(&initial),
                usage: storage,
            })
        });
        let velocity = ["Velocity A", "Velocity B"].map(|label| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(&zero_velocity),
                usage: storage,
            })
        });

        let params = SimParams {
            grid_size: grid.size(),
            edge_mode: settings.edge_divisor.shader_code(),
            _pad: [0; 2],
        };
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Sim Params"),
            contents: bytemuck::cast_slice(&[params]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let [br, bg, bb] = settings.background_color;
        let [cr, cg, cb] = settings.density_color;
        let render_params = RenderParams {
            grid_size: grid.size(),
            _pad: [0; 3],
            background: [br, bg, bb, 1.0],
            color: [cr, cg, cb, 1.0],
        };
        let render_params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Render Params"),
            contents: bytemuck::cast_slice(&[render_params]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Vertices"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        // Load shaders
        let diffuse_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Diffuse Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/diffuse.wgsl").into()),
        });
        let render_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Render Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/render.wgsl").into()),
        });

        let storage_entry = |binding: u32, read_only: bool, visibility: wgpu::ShaderStages| {
            wgpu::BindGroupLayoutEntry {
                binding,
                visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }
        };
        let uniform_entry = |binding: u32, visibility: wgpu::ShaderStages| {
            wgpu::BindGroupLayoutEntry {
                binding,
                visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }
        };

        let compute_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Diffuse Bind Group Layout"),
            entries: &[
                storage_entry(0, true, wgpu::ShaderStages::COMPUTE),
                storage_entry(1, false, wgpu::ShaderStages::COMPUTE),
                storage_entry(2, true, wgpu::ShaderStages::COMPUTE),
                storage_entry(3, false, wgpu::ShaderStages::COMPUTE),
                uniform_entry(4, wgpu::ShaderStages::COMPUTE),
            ],
        });

        // Bind group [i] reads slot i and writes the other slot.
        let compute_bind_groups = [Slot::A, Slot::B].map(|read| {
            let write = read.other();
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(match read {
                    Slot::A => "Diffuse Bind Group (A -> B)",
                    Slot::B => "Diffuse Bind Group (B -> A)",
                }),
                layout: &compute_layout,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: density[read.index()].as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: density[write.index()].as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 2, resource: velocity[read.index()].as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 3, resource: velocity[write.index()].as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 4, resource: params_buffer.as_entire_binding() },
                ],
            })
        });

        let compute_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Diffuse Pipeline Layout"),
            bind_group_layouts: &[&compute_layout],
            push_constant_ranges: &[],
        });
        let diffuse_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Diffuse Pipeline"),
            layout: Some(&compute_pipeline_layout),
            module: &diffuse_shader,
            entry_point: "diffuse",
            compilation_options: Default::default(),
            cache: None,
        });

        let render_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Render Bind Group Layout"),
            entries: &[
                storage_entry(0, true, wgpu::ShaderStages::FRAGMENT),
                uniform_entry(1, wgpu::ShaderStages::FRAGMENT),
            ],
        });
        let render_bind_groups = [Slot::A, Slot::B].map(|slot| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(match slot {
                    Slot::A => "Render Bind Group (density A)",
                    Slot::B => "Render Bind Group (density B)",
                }),
                layout: &render_layout,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: density[slot.index()].as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: render_params_buffer.as_entire_binding() },
                ],
            })
        });

        let render_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Render Pipeline Layout"),
            bind_group_layouts: &[&render_layout],
            push_constant_ranges: &[],
        });
        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Render Pipeline"),
            layout: Some(&render_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &render_shader,
                entry_point: "vs_main",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x2],
                }],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &render_shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_config.format,
                    blend: Some(wgpu::BlendState::REPLACE),
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
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
            cache: None,
        });

        Ok(Self {
            device,
            queue,
            surface,
            surface_config,
            grid,
            clear_color: wgpu::Color {
                r: br as f64,
                g: bg as f64,
                b: bb as f64,
                a: 1.0,
            },
            density,
            velocity,
            _params_buffer: params_buffer,
            _render_params_buffer: render_params_buffer,
            vertex_buffer,
            diffuse_pipeline,
            render_pipeline,
            compute_bind_groups,
            render_bind_groups,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.surface_config.width = width;
            self.surface_config.height = height;
            self.reconfigure();
        }
    }

    pub fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.surface_config);
    }

    /// Copy one density slot back to the host.
    pub async fn read_density(&self, slot: Slot) -> Result<Vec<f32>, SimError> {
        let size = cell_offset(self.grid.cell_count());
        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Density Staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Density Readback"),
        });
        encoder.copy_buffer_to_buffer(&self.density[slot.index()], 0, &staging_buffer, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            // Receiver outlives the poll below; a failed send means it is gone.
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        match receiver.receive().await {
            Some(Ok(())) => {}
            Some(Err(e)) => return Err(SimError::Readback(format!("{e:?}"))),
            None => return Err(SimError::Readback("map callback dropped".into())),
        }

        let data = buffer_slice.get_mapped_range();
        let result: Vec<f32> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging_buffer.unmap();
        Ok(result)
    }
}

impl FieldBackend for GpuBackend {
    fn grid(&self) -> Grid {
        self.grid
    }

    fn inject(&mut self, slot: Slot, index: usize, value: f32) -> Result<(), SimError> {
        let cell_count = self.grid.cell_count();
        if index >= cell_count {
            return Err(SimError::CellOutOfRange { index, cell_count });
        }
        // Staged writes land before the next submission on this queue.
        self.queue.write_buffer(
            &self.density[slot.index()],
            cell_offset(index),
            bytemuck::bytes_of(&value),
        );
        Ok(())
    }

    fn diffuse(&mut self, roles: Roles) {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Diffuse Encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Diffuse Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.diffuse_pipeline);
            pass.set_bind_group(0, &self.compute_bind_groups[roles.read.index()], &[]);
            let workgroups = self.grid.workgroups(WORKGROUP_SIZE);
            pass.dispatch_workgroups(workgroups, workgroups, 1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn render(&mut self, roles: Roles) -> Result<(), SimError> {
        let output = self.surface.get_current_texture()?;
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            render_pass.set_pipeline(&self.render_pipeline);
            render_pass.set_bind_group(0, &self.render_bind_groups[roles.write.index()], &[]);
            render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
            render_pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    fn reseed(&mut self, seed: &[f32]) {
        let cells = self.grid.cell_count();
        let mut initial = seed.to_vec();
        initial.resize(cells, 0.0);
        let zero_velocity = vec![[0.0f32; 2]; cells];
        for slot in [Slot::A, Slot::B] {
            self.queue
                .write_buffer(&self.density[slot.index()], 0, bytemuck::cast_slice(&initial));
            self.queue.write_buffer(
                &self.velocity[slot.index()],
                0,
                bytemuck::cast_slice(&zero_velocity),
            );
        }
    }
}
