//! Particle simulation and render passes.
//!
//! Positions live in a pair of `Rgba32Float` targets, one texel per
//! particle. The simulation pass reads one side and writes the other; the
//! render pass then draws one instanced quad per particle from the freshly
//! written side.

use wgpu::util::DeviceExt;

use super::shaders::{particle_render_shader, particle_sim_shader};
use super::{create_sampler, sampler_entry, texture_entry, uniform_entry, GpuTarget, GpuTexture};
use crate::config::ParticleSettings;
use crate::particles::{
    color_slot, seed_positions, ParticleLookup, RenderUniforms, SimUniforms, COLOR_SLOTS,
};
use crate::registry::TextureKind;
use crate::scene::TextureUpload;
use crate::section::{SectionKey, SectionMap};
use crate::target::{PingPongPair, TargetDescriptor, TexelFormat};
use crate::textures::FilterMode;

const LOOKUP_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];
const LOOKUP_STRIDE: u64 = std::mem::size_of::<[f32; 2]>() as u64;
const POSITION_TEXEL_BYTES: u32 = 16;

fn texture_entries(count: usize, visibility: wgpu::ShaderStages) -> Vec<wgpu::BindGroupLayoutEntry> {
    (0..count as u32)
        .map(|binding| texture_entry(binding, visibility, true))
        .collect()
}

fn texture_layout(
    device: &wgpu::Device,
    label: &str,
    count: usize,
    visibility: wgpu::ShaderStages,
) -> wgpu::BindGroupLayout {
    let entries = texture_entries(count, visibility);
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &entries,
    })
}

fn texture_bind_group<'a>(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::BindGroupLayout,
    textures: impl Iterator<Item = &'a GpuTexture>,
) -> wgpu::BindGroup {
    let entries: Vec<_> = textures
        .enumerate()
        .map(|(binding, texture)| wgpu::BindGroupEntry {
            binding: binding as u32,
            resource: wgpu::BindingResource::TextureView(&texture.view),
        })
        .collect();
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &entries,
    })
}

/// Per-frame entries: uniforms, positions, one field texture and both samplers.
fn frame_entries(visibility: wgpu::ShaderStages) -> [wgpu::BindGroupLayoutEntry; 5] {
    [
        uniform_entry(0, visibility),
        texture_entry(1, visibility, false),
        texture_entry(2, visibility, true),
        sampler_entry(3, visibility),
        sampler_entry(4, visibility),
    ]
}

fn frame_layout(
    device: &wgpu::Device,
    label: &str,
    visibility: wgpu::ShaderStages,
) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &frame_entries(visibility),
    })
}

struct PassResources {
    pipeline: wgpu::RenderPipeline,
    frame_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
}

impl PassResources {
    fn frame_bind_group(
        &self,
        device: &wgpu::Device,
        label: &str,
        positions: &wgpu::TextureView,
        field: &wgpu::TextureView,
        samplers: &Samplers,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.frame_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(positions),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(field),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&samplers.linear),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&samplers.nearest),
                },
            ],
        })
    }
}

struct Samplers {
    linear: wgpu::Sampler,
    nearest: wgpu::Sampler,
}

fn uniform_buffer<T>(device: &wgpu::Device, label: &str) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: std::mem::size_of::<T>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_sim_pass(device: &wgpu::Device) -> PassResources {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Particle Sim Shader"),
        source: wgpu::ShaderSource::Wgsl(particle_sim_shader().into()),
    });
    let frame_layout = frame_layout(device, "Particle Sim Bind Group Layout", wgpu::ShaderStages::FRAGMENT);
    let texture_layout = texture_layout(
        device,
        "Position VAT Bind Group Layout",
        SectionKey::COUNT,
        wgpu::ShaderStages::FRAGMENT,
    );
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Particle Sim Pipeline Layout"),
        bind_group_layouts: &[&frame_layout, &texture_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Particle Sim Pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: wgpu::TextureFormat::Rgba32Float,
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
    });

    PassResources {
        pipeline,
        frame_layout,
        texture_layout,
        uniform_buffer: uniform_buffer::<SimUniforms>(device, "Particle Sim Uniform Buffer"),
    }
}

fn create_render_pass(device: &wgpu::Device, surface_format: wgpu::TextureFormat) -> PassResources {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Particle Render Shader"),
        source: wgpu::ShaderSource::Wgsl(particle_render_shader().into()),
    });
    let frame_layout = frame_layout(device, "Particle Render Bind Group Layout", wgpu::ShaderStages::VERTEX);
    let texture_layout = texture_layout(
        device,
        "Color VAT Bind Group Layout",
        COLOR_SLOTS,
        wgpu::ShaderStages::VERTEX,
    );
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Particle Render Pipeline Layout"),
        bind_group_layouts: &[&frame_layout, &texture_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Particle Render Pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: LOOKUP_STRIDE,
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: &LOOKUP_ATTRIBUTES,
            }],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: surface_format,
                // Additive.
                blend: Some(wgpu::BlendState {
                    color: wgpu::BlendComponent {
                        src_factor: wgpu::BlendFactor::SrcAlpha,
                        dst_factor: wgpu::BlendFactor::One,
                        operation: wgpu::BlendOperation::Add,
                    },
                    alpha: wgpu::BlendComponent {
                        src_factor: wgpu::BlendFactor::One,
                        dst_factor: wgpu::BlendFactor::One,
                        operation: wgpu::BlendOperation::Add,
                    },
                }),
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
    });

    PassResources {
        pipeline,
        frame_layout,
        texture_layout,
        uniform_buffer: uniform_buffer::<RenderUniforms>(device, "Particle Render Uniform Buffer"),
    }
}

/// GPU state of the particle system.
pub struct ParticleGpu {
    count: u32,
    positions: PingPongPair<GpuTarget>,
    lookup_buffer: wgpu::Buffer,
    samplers: Samplers,
    sim: PassResources,
    render: PassResources,
    vats: SectionMap<GpuTexture>,
    colors: Vec<GpuTexture>,
    vat_bind_group: wgpu::BindGroup,
    color_bind_group: wgpu::BindGroup,
}

impl ParticleGpu {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        settings: &ParticleSettings,
        surface_format: wgpu::TextureFormat,
    ) -> Self {
        let settings = settings.sanitized();
        let desc = TargetDescriptor::new(
            settings.texture_width,
            settings.texture_height,
            TexelFormat::Rgba32Float,
            FilterMode::Nearest,
        );
        let count = desc.texel_count() as u32;

        let seed = seed_positions(count as usize, settings.seed);
        let positions = PingPongPair::new(
            GpuTarget::new(device, &desc, "Particle Positions A"),
            GpuTarget::new(device, &desc, "Particle Positions B"),
        );
        positions.read().write(queue, bytemuck::cast_slice(&seed), POSITION_TEXEL_BYTES);

        let lookup = ParticleLookup::new(desc.width, desc.height);
        let lookup_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Particle Lookup Buffer"),
            contents: bytemuck::cast_slice(lookup.uvs()),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let samplers = Samplers {
            linear: create_sampler(device, FilterMode::Linear, "Particle Linear Sampler"),
            nearest: create_sampler(device, FilterMode::Nearest, "Particle Nearest Sampler"),
        };
        let sim = create_sim_pass(device);
        let render = create_render_pass(device, surface_format);

        let vats = SectionMap::from_fn(|key| {
            GpuTexture::placeholder(device, queue, &format!("{key} Position VAT"))
        });
        let colors: Vec<_> = (0..COLOR_SLOTS)
            .map(|slot| GpuTexture::placeholder(device, queue, &format!("Color VAT {slot}")))
            .collect();
        let vat_bind_group = texture_bind_group(
            device,
            "Position VAT Bind Group",
            &sim.texture_layout,
            vats.values().iter(),
        );
        let color_bind_group = texture_bind_group(
            device,
            "Color VAT Bind Group",
            &render.texture_layout,
            colors.iter(),
        );

        Self {
            count,
            positions,
            lookup_buffer,
            samplers,
            sim,
            render,
            vats,
            colors,
            vat_bind_group,
            color_bind_group,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Bind a newly loaded texture into its slot.
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, upload: &TextureUpload) {
        let label = format!("{} {:?} VAT", upload.key, upload.kind);
        let texture = GpuTexture::from_data(device, queue, &upload.texture, &label);
        match upload.kind {
            TextureKind::Position => {
                self.vats[upload.key] = texture;
                self.vat_bind_group = texture_bind_group(
                    device,
                    "Position VAT Bind Group",
                    &self.sim.texture_layout,
                    self.vats.values().iter(),
                );
            }
            TextureKind::Color => {
                let Some(slot) = color_slot(upload.key) else {
                    log::warn!("section {} has no color slot", upload.key);
                    return;
                };
                self.colors[slot] = texture;
                self.color_bind_group = texture_bind_group(
                    device,
                    "Color VAT Bind Group",
                    &self.render.texture_layout,
                    self.colors.iter(),
                );
            }
        }
        log::debug!(
            "bound {} {:?} texture ({}x{})",
            upload.key,
            upload.kind,
            upload.texture.width,
            upload.texture.height
        );
    }

    /// Record the simulation pass for `frame` and swap the position pair.
    pub fn simulate(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        frame: u64,
        uniforms: &SimUniforms,
        flow: &wgpu::TextureView,
    ) {
        if self.positions.align_to_frame(frame) {
            log::debug!("position buffers realigned to frame {}", frame);
        }
        queue.write_buffer(&self.sim.uniform_buffer, 0, bytemuck::bytes_of(uniforms));
        {
            let (read, write) = self.positions.split();
            let bind_group = self.sim.frame_bind_group(
                device,
                "Particle Sim Bind Group",
                &read.view,
                flow,
                &self.samplers,
            );

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Particle Sim Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &write.view,
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
            render_pass.set_pipeline(&self.sim.pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.set_bind_group(1, &self.vat_bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }
        self.positions.swap();
    }

    /// Record the particle draw into `target`, clearing it first.
    pub fn draw(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        uniforms: &RenderUniforms,
        density: &wgpu::TextureView,
    ) {
        queue.write_buffer(&self.render.uniform_buffer, 0, bytemuck::bytes_of(uniforms));
        let bind_group = self.render.frame_bind_group(
            device,
            "Particle Render Bind Group",
            &self.positions.read().view,
            density,
            &self.samplers,
        );

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Particle Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        render_pass.set_pipeline(&self.render.pipeline);
        render_pass.set_bind_group(0, &bind_group, &[]);
        render_pass.set_bind_group(1, &self.color_bind_group, &[]);
        render_pass.set_vertex_buffer(0, self.lookup_buffer.slice(..));
        render_pass.draw(0..6, 0..self.count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    enum Slot {
        Uniform,
        Texture,
        Sampler,
    }

    fn layout_slots(group: u32, entries: &[wgpu::BindGroupLayoutEntry]) -> Vec<(u32, u32, Slot)> {
        entries
            .iter()
            .map(|entry| {
                let slot = match entry.ty {
                    wgpu::BindingType::Buffer { .. } => Slot::Uniform,
                    wgpu::BindingType::Texture { .. } => Slot::Texture,
                    wgpu::BindingType::Sampler(_) => Slot::Sampler,
                    ref other => panic!("unexpected binding type {:?}", other),
                };
                (group, entry.binding, slot)
            })
            .collect()
    }

    fn shader_slots(code: &str) -> Vec<(u32, u32, Slot)> {
        let module = naga::front::wgsl::parse_str(code).unwrap();
        let mut slots: Vec<_> = module
            .global_variables
            .iter()
            .filter_map(|(_, var)| {
                let binding = var.binding.as_ref()?;
                let slot = match module.types[var.ty].inner {
                    naga::TypeInner::Image { .. } => Slot::Texture,
                    naga::TypeInner::Sampler { .. } => Slot::Sampler,
                    _ => Slot::Uniform,
                };
                Some((binding.group, binding.binding, slot))
            })
            .collect();
        slots.sort();
        slots
    }

    fn texture_count(slots: &[(u32, u32, Slot)]) -> u32 {
        slots.iter().filter(|(_, _, slot)| *slot == Slot::Texture).count() as u32
    }

    #[test]
    fn test_sim_layouts_match_shader_bindings() {
        let stage = wgpu::ShaderStages::FRAGMENT;
        let mut expected = layout_slots(0, &frame_entries(stage));
        expected.extend(layout_slots(1, &texture_entries(SectionKey::COUNT, stage)));
        expected.sort();

        let declared = shader_slots(&particle_sim_shader());
        assert_eq!(declared, expected);
        assert!(texture_count(&declared) <= wgpu::Limits::default().max_sampled_textures_per_shader_stage);
    }

    #[test]
    fn test_render_layouts_match_shader_bindings() {
        let stage = wgpu::ShaderStages::VERTEX;
        let mut expected = layout_slots(0, &frame_entries(stage));
        expected.extend(layout_slots(1, &texture_entries(COLOR_SLOTS, stage)));
        expected.sort();

        let declared = shader_slots(&particle_render_shader());
        assert_eq!(declared, expected);
        assert!(texture_count(&declared) <= wgpu::Limits::default().max_sampled_textures_per_shader_stage);
    }

    #[test]
    fn test_lookup_stride_matches_uvs() {
        let lookup = ParticleLookup::new(4, 2);
        let bytes: &[u8] = bytemuck::cast_slice(lookup.uvs());
        assert_eq!(bytes.len() as u64, LOOKUP_STRIDE * lookup.len() as u64);
    }

    #[test]
    fn test_seed_texels_fill_position_target() {
        let desc = TargetDescriptor::new(25, 4, TexelFormat::Rgba32Float, FilterMode::Nearest);
        let seed = seed_positions(desc.texel_count(), 7);
        let bytes: &[u8] = bytemuck::cast_slice(&seed);
        assert_eq!(bytes.len(), desc.texel_count() * POSITION_TEXEL_BYTES as usize);
    }
}
