//! GPU backend: device setup, render targets and the per-frame pass order.
//!
//! Each frame the [`Renderer`] binds newly loaded textures, runs the fluid
//! solver, publishes its output to the flow map, advances the particle
//! simulation and draws the particles to the surface, all in one command
//! encoder.

mod fluid_gpu;
mod particle_gpu;
pub mod shaders;

pub use fluid_gpu::{FluidGpu, FluidUniforms};
pub use particle_gpu::ParticleGpu;

use std::sync::Arc;

use winit::window::Window;

use crate::config::Config;
use crate::error::GpuError;
use crate::flow_map::FlowMapSlot;
use crate::scene::FrameState;
use crate::target::TargetDescriptor;
use crate::textures::{FilterMode, TextureData};

/// An offscreen texture the passes render into and sample from.
pub struct GpuTarget {
    pub texture: wgpu::Texture,
    /// Shared with the flow map while it is the published side.
    pub view: Arc<wgpu::TextureView>,
    pub descriptor: TargetDescriptor,
}

impl GpuTarget {
    pub fn new(device: &wgpu::Device, descriptor: &TargetDescriptor, label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: descriptor.width,
                height: descriptor.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: descriptor.format.into(),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = Arc::new(texture.create_view(&wgpu::TextureViewDescriptor::default()));
        Self {
            texture,
            view,
            descriptor: *descriptor,
        }
    }

    /// Overwrite the whole target with tightly packed texels.
    pub fn write(&self, queue: &wgpu::Queue, bytes: &[u8], bytes_per_texel: u32) {
        let TargetDescriptor { width, height, .. } = self.descriptor;
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * bytes_per_texel),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }
}

/// A sampled RGBA8 texture uploaded from decoded image data.
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub filter: FilterMode,
}

impl GpuTexture {
    pub fn from_data(device: &wgpu::Device, queue: &wgpu::Queue, data: &TextureData, label: &str) -> Self {
        let size = wgpu::Extent3d {
            width: data.width,
            height: data.height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &data.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * data.width),
                rows_per_image: Some(data.height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            filter: data.filter,
        }
    }

    /// The 1x1 mid-grey texture bound to slots nothing has loaded into yet.
    pub fn placeholder(device: &wgpu::Device, queue: &wgpu::Queue, label: &str) -> Self {
        Self::from_data(device, queue, &TextureData::placeholder(), label)
    }
}

/// Clamp-to-edge sampler with the given filtering.
pub fn create_sampler(device: &wgpu::Device, filter: FilterMode, label: &str) -> wgpu::Sampler {
    let filter = filter.into();
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

/// Bind group layout entry for a 2D float texture.
pub(crate) fn texture_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    filterable: bool,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

pub(crate) fn sampler_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

pub(crate) fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
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
}

/// Surface, device and queue for one window.
pub struct GpuContext {
    surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
}

impl GpuContext {
    pub async fn new(window: Arc<Window>) -> Result<Self, GpuError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(GpuError::SurfaceCreation)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;
        log::info!("using adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(GpuError::DeviceCreation)?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .unwrap_or(wgpu::TextureFormat::Bgra8UnormSrgb);
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Ok(Self {
            surface,
            device,
            queue,
            config,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Reconfigure the surface. Zero-sized requests are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    /// Reconfigure at the current size, after the surface was lost.
    pub fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.config);
    }
}

/// Runs every GPU pass of a frame.
pub struct Renderer {
    context: GpuContext,
    fluid: FluidGpu,
    particles: ParticleGpu,
    flow_map: FlowMapSlot<Arc<wgpu::TextureView>>,
}

impl Renderer {
    pub async fn new(window: Arc<Window>, config: &Config) -> Result<Self, GpuError> {
        let context = GpuContext::new(window).await?;
        let (width, height) = context.size();
        let fluid = FluidGpu::new(&context.device, &config.fluid, width, height);
        let particles = ParticleGpu::new(
            &context.device,
            &context.queue,
            &config.particles,
            context.config.format,
        );
        log::info!(
            "renderer ready: {}x{} surface, {} particles",
            width,
            height,
            config.particles.particle_count()
        );
        Ok(Self {
            context,
            fluid,
            particles,
            flow_map: FlowMapSlot::new(),
        })
    }

    pub fn size(&self) -> (u32, u32) {
        self.context.size()
    }

    pub fn fluid(&self) -> &FluidGpu {
        &self.fluid
    }

    /// Latest published fluid output.
    pub fn flow_map(&self) -> &FlowMapSlot<Arc<wgpu::TextureView>> {
        &self.flow_map
    }

    /// Resize the surface and reallocate the fluid targets. The flow map is
    /// cleared because its views belong to the old targets.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.context.resize(width, height);
        self.fluid.resize(&self.context.device, width, height);
        self.flow_map.clear();
    }

    /// Recover from a lost or outdated surface.
    pub fn reconfigure(&mut self) {
        self.context.reconfigure();
    }

    pub fn render(&mut self, state: &FrameState) -> Result<(), wgpu::SurfaceError> {
        let device = &self.context.device;
        let queue = &self.context.queue;

        // Bind textures first so nothing is lost if the surface fails.
        for upload in &state.uploads {
            self.particles.upload(device, queue, upload);
        }

        let output = self.context.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });

        self.fluid
            .step(device, queue, &mut encoder, state.pointer, state.dt);
        let (velocity, density) = self.fluid.output();
        self.flow_map.publish(state.frame, velocity, density);

        if let Some(flow) = self.flow_map.snapshot_for(state.frame) {
            self.particles
                .simulate(device, queue, &mut encoder, state.frame, &state.sim, &flow.velocity);
            self.particles
                .draw(device, queue, &mut encoder, &view, &state.render, &flow.density);
        }

        queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }
}
