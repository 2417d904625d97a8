//! GPU fluid solver.
//!
//! Seven full-screen passes per frame over `Rgba16Float` ping-pong targets,
//! in the same order as [`crate::fluid::CpuFluidSolver::run_stages`].

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use super::shaders::{FLUID_ENTRY_POINTS, FLUID_SHADER};
use super::{create_sampler, sampler_entry, texture_entry, uniform_entry, GpuTarget};
use crate::config::FluidSettings;
use crate::fluid::{FluidFrame, FluidGrid, FluidInputs};
use crate::input::PointerSample;
use crate::target::PingPongPair;
use crate::textures::FilterMode;

/// Uniforms shared by every fluid pass of a frame.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct FluidUniforms {
    pub pointer: [f32; 2],
    pub delta: [f32; 2],
    pub ink: [f32; 3],
    /// Milliseconds.
    pub timestep: f32,
    pub rdx: [f32; 2],
    pub aspect: f32,
    pub mouse_radius: f32,
    pub fade: f32,
    pub velocity_diffusion: f32,
    pub density_diffusion: f32,
    pub gradient_amount: f32,
    pub field_limit: f32,
    pub _padding: [f32; 3],
}

impl FluidUniforms {
    pub fn new(frame: &FluidFrame, grid: &FluidGrid, settings: &FluidSettings) -> Self {
        Self {
            pointer: frame.pointer.to_array(),
            delta: frame.delta.to_array(),
            ink: frame.ink.to_array(),
            timestep: frame.timestep_ms,
            rdx: grid.rdx().to_array(),
            aspect: grid.aspect(),
            mouse_radius: settings.mouse_radius,
            fade: settings.fade_amount,
            velocity_diffusion: settings.velocity_diffusion,
            density_diffusion: settings.density_diffusion,
            gradient_amount: settings.gradient_amount,
            field_limit: settings.field_limit,
            _padding: [0.0; 3],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FluidPass {
    PointerVelocity,
    PointerDensity,
    AdvectVelocity,
    AdvectDensity,
    Divergence,
    Pressure,
    GradientSubtract,
}

impl FluidPass {
    const ALL: [FluidPass; 7] = [
        FluidPass::PointerVelocity,
        FluidPass::PointerDensity,
        FluidPass::AdvectVelocity,
        FluidPass::AdvectDensity,
        FluidPass::Divergence,
        FluidPass::Pressure,
        FluidPass::GradientSubtract,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Pipelines and shared bindings for the fluid passes.
struct FluidPasses {
    pipelines: Vec<wgpu::RenderPipeline>,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
}

impl FluidPasses {
    fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Fluid Shader"),
            source: wgpu::ShaderSource::Wgsl(FLUID_SHADER.into()),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Fluid Bind Group Layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::FRAGMENT),
                texture_entry(1, wgpu::ShaderStages::FRAGMENT, true),
                texture_entry(2, wgpu::ShaderStages::FRAGMENT, true),
                sampler_entry(3, wgpu::ShaderStages::FRAGMENT),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Fluid Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipelines = FluidPass::ALL
            .iter()
            .map(|pass| {
                let entry_point = FLUID_ENTRY_POINTS[pass.index()];
                device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some(entry_point),
                    layout: Some(&pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: &shader,
                        entry_point: Some("vs_main"),
                        buffers: &[],
                        compilation_options: Default::default(),
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &shader,
                        entry_point: Some(entry_point),
                        targets: &[Some(wgpu::ColorTargetState {
                            format: wgpu::TextureFormat::Rgba16Float,
                            blend: None,
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                        compilation_options: Default::default(),
                    }),
                    primitive: wgpu::PrimitiveState {
                        topology: wgpu::PrimitiveTopology::TriangleList,
                        ..Default::default()
                    },
                    depth_stencil: None,
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                    cache: None,
                })
            })
            .collect();

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Fluid Uniform Buffer"),
            size: std::mem::size_of::<FluidUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            pipelines,
            layout,
            sampler: create_sampler(device, FilterMode::Linear, "Fluid Sampler"),
            uniform_buffer,
        }
    }

    /// Record one full-screen pass reading `a` and `b` into `target`.
    fn run(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        pass: FluidPass,
        a: &wgpu::TextureView,
        b: &wgpu::TextureView,
        target: &wgpu::TextureView,
    ) {
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Fluid Bind Group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(a),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(b),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(FLUID_ENTRY_POINTS[pass.index()]),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        render_pass.set_pipeline(&self.pipelines[pass.index()]);
        render_pass.set_bind_group(0, &bind_group, &[]);
        render_pass.draw(0..3, 0..1);
    }
}

/// Velocity, density, pressure and divergence targets at one resolution.
struct FluidTargets {
    velocity: PingPongPair<GpuTarget>,
    density: PingPongPair<GpuTarget>,
    pressure: PingPongPair<GpuTarget>,
    divergence: GpuTarget,
}

impl FluidTargets {
    fn new(device: &wgpu::Device, grid: &FluidGrid) -> Self {
        let desc = grid.descriptor();
        let pair = |label: &str| {
            PingPongPair::new(
                GpuTarget::new(device, &desc, &format!("{label} A")),
                GpuTarget::new(device, &desc, &format!("{label} B")),
            )
        };
        Self {
            velocity: pair("Fluid Velocity"),
            density: pair("Fluid Density"),
            pressure: pair("Fluid Pressure"),
            divergence: GpuTarget::new(device, &desc, "Fluid Divergence"),
        }
    }
}

/// Pointer-driven fluid solver running on the GPU.
pub struct FluidGpu {
    inputs: FluidInputs,
    grid: FluidGrid,
    passes: FluidPasses,
    targets: FluidTargets,
}

impl FluidGpu {
    pub fn new(device: &wgpu::Device, settings: &FluidSettings, width: u32, height: u32) -> Self {
        let inputs = FluidInputs::new(settings);
        let grid = FluidGrid::from_viewport(width, height, inputs.settings().resolution_scale());
        log::debug!("fluid grid {}x{}", grid.width, grid.height);
        Self {
            targets: FluidTargets::new(device, &grid),
            passes: FluidPasses::new(device),
            inputs,
            grid,
        }
    }

    pub fn grid(&self) -> FluidGrid {
        self.grid
    }

    pub fn inputs(&self) -> &FluidInputs {
        &self.inputs
    }

    /// Reallocate every target for a new viewport. The fields restart at rest.
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        let grid = FluidGrid::from_viewport(width, height, self.inputs.settings().resolution_scale());
        if grid == self.grid {
            return;
        }
        log::info!("fluid grid resized to {}x{}", grid.width, grid.height);
        self.grid = grid;
        self.targets = FluidTargets::new(device, &grid);
    }

    /// Read sides of velocity and density after the latest step.
    pub fn output(&self) -> (Arc<wgpu::TextureView>, Arc<wgpu::TextureView>) {
        (
            self.targets.velocity.read().view.clone(),
            self.targets.density.read().view.clone(),
        )
    }

    /// Record one solver step into `encoder`.
    pub fn step(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        pointer: PointerSample,
        dt: f32,
    ) -> FluidFrame {
        let frame = self.inputs.frame(pointer, dt);
        let uniforms = FluidUniforms::new(&frame, &self.grid, self.inputs.settings());
        queue.write_buffer(&self.passes.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let passes = &self.passes;
        let t = &mut self.targets;

        {
            let (read, write) = t.velocity.split();
            passes.run(device, encoder, FluidPass::PointerVelocity, &read.view, &read.view, &write.view);
        }
        t.velocity.swap();

        {
            let (read, write) = t.density.split();
            passes.run(device, encoder, FluidPass::PointerDensity, &read.view, &read.view, &write.view);
        }
        t.density.swap();

        {
            let (read, write) = t.velocity.split();
            passes.run(device, encoder, FluidPass::AdvectVelocity, &read.view, &read.view, &write.view);
        }
        t.velocity.swap();

        {
            let velocity = t.velocity.read();
            let (read, write) = t.density.split();
            passes.run(device, encoder, FluidPass::AdvectDensity, &read.view, &velocity.view, &write.view);
        }
        t.density.swap();

        {
            let velocity = t.velocity.read();
            passes.run(
                device,
                encoder,
                FluidPass::Divergence,
                &velocity.view,
                &velocity.view,
                &t.divergence.view,
            );
        }

        for _ in 0..self.inputs.settings().pressure_iterations {
            let (read, write) = t.pressure.split();
            passes.run(device, encoder, FluidPass::Pressure, &read.view, &t.divergence.view, &write.view);
            t.pressure.swap();
        }

        {
            let pressure = t.pressure.read();
            let (read, write) = t.velocity.split();
            passes.run(device, encoder, FluidPass::GradientSubtract, &read.view, &pressure.view, &write.view);
        }
        t.velocity.swap();

        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec3};

    #[test]
    fn test_uniform_layout_matches_wgsl() {
        // vec3 ink is 16-byte aligned in WGSL; the struct rounds up to 80.
        assert_eq!(std::mem::size_of::<FluidUniforms>(), 80);
        assert_eq!(std::mem::offset_of!(FluidUniforms, ink), 16);
        assert_eq!(std::mem::offset_of!(FluidUniforms, timestep), 28);
        assert_eq!(std::mem::offset_of!(FluidUniforms, field_limit), 64);
    }

    #[test]
    fn test_uniforms_carry_frame_and_grid() {
        let settings = FluidSettings::default();
        let grid = FluidGrid::from_viewport(400, 200, 1.0);
        let frame = FluidFrame {
            pointer: Vec2::new(0.5, -0.5),
            delta: Vec2::new(1.0, 0.0),
            timestep_ms: 16.0,
            ink: Vec3::X,
        };
        let u = FluidUniforms::new(&frame, &grid, &settings);
        assert_eq!(u.pointer, [0.5, -0.5]);
        assert_eq!(u.aspect, 2.0);
        assert_eq!(u.rdx, [1.0 / 400.0, 1.0 / 200.0]);
        assert_eq!(u.fade, settings.fade_amount);
    }

    #[test]
    fn test_pass_order_matches_entry_points() {
        assert_eq!(FluidPass::ALL.len(), FLUID_ENTRY_POINTS.len());
        assert_eq!(FLUID_ENTRY_POINTS[FluidPass::Pressure.index()], "fs_pressure");
        assert_eq!(
            FLUID_ENTRY_POINTS[FluidPass::GradientSubtract.index()],
            "fs_gradient_subtract"
        );
    }
}
