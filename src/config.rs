//! Runtime configuration.
//!
//! Every tunable has a default matching the shipped experience, so an empty
//! JSON object is a complete configuration:
//!
//! ```ignore
//! let config = Config::from_json_str(r#"{ "fluid": { "velocity_multiplier": 10.0 } }"#)?;
//! ```
//!
//! Values are clamped into their legal ranges by [`Config::sanitized`]. This
//! is the boundary where numerically unsafe input (zero radius, runaway
//! timesteps) is stopped before it can poison the fluid fields.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// Fluid solver tunables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FluidSettings {
    /// Splat radius of pointer injection, in squared UV units.
    pub mouse_radius: f32,
    /// Scale from pointer delta (NDC per frame) to injected velocity.
    pub velocity_multiplier: f32,
    /// Velocity retained per advection step.
    pub velocity_diffusion: f32,
    /// Density retained per advection step.
    pub density_diffusion: f32,
    /// Scale of the pressure gradient subtracted from velocity.
    pub gradient_amount: f32,
    /// Multiplier applied to previous content before injection.
    pub fade_amount: f32,
    /// Jacobi iterations per frame.
    pub pressure_iterations: u32,
    /// Fraction of the viewport resolution the solver runs at, before DPR.
    pub downscale: f32,
    /// Device pixel ratio of the surface.
    pub device_pixel_ratio: f32,
    /// Upper bound on the advection timestep, in milliseconds.
    pub max_timestep_ms: f32,
    /// Absolute bound applied to every field value after each pass.
    pub field_limit: f32,
}

impl Default for FluidSettings {
    fn default() -> Self {
        Self {
            mouse_radius: 0.001,
            velocity_multiplier: 1.0,
            velocity_diffusion: 1.0,
            density_diffusion: 0.999,
            gradient_amount: 1.0,
            fade_amount: 0.995,
            pressure_iterations: 1,
            downscale: 0.5,
            device_pixel_ratio: 1.0,
            max_timestep_ms: 100.0,
            field_limit: 1.0e4,
        }
    }
}

impl FluidSettings {
    pub fn with_mouse_radius(mut self, radius: f32) -> Self {
        self.mouse_radius = radius;
        self
    }

    pub fn with_velocity_multiplier(mut self, multiplier: f32) -> Self {
        self.velocity_multiplier = multiplier;
        self
    }

    pub fn with_pressure_iterations(mut self, iterations: u32) -> Self {
        self.pressure_iterations = iterations;
        self
    }

    pub fn with_fade_amount(mut self, fade: f32) -> Self {
        self.fade_amount = fade;
        self
    }

    /// Effective resolution scale: `downscale * device_pixel_ratio`.
    pub fn resolution_scale(&self) -> f32 {
        self.downscale * self.device_pixel_ratio
    }

    /// Clamp every value into its legal range, logging each correction.
    pub fn sanitized(&self) -> Self {
        let mut out = self.clone();
        out.mouse_radius = clamp_logged("fluid.mouse_radius", self.mouse_radius, 1.0e-5, 0.1);
        out.velocity_multiplier =
            clamp_logged("fluid.velocity_multiplier", self.velocity_multiplier, 0.0, 100.0);
        out.velocity_diffusion =
            clamp_logged("fluid.velocity_diffusion", self.velocity_diffusion, 0.9, 1.0);
        out.density_diffusion =
            clamp_logged("fluid.density_diffusion", self.density_diffusion, 0.99, 0.9999);
        out.gradient_amount = clamp_logged("fluid.gradient_amount", self.gradient_amount, 0.0, 2.0);
        out.fade_amount = clamp_logged("fluid.fade_amount", self.fade_amount, 0.9, 1.0);
        if !(1..=64).contains(&self.pressure_iterations) {
            log::warn!(
                "fluid.pressure_iterations = {} out of range, clamping to [1, 64]",
                self.pressure_iterations
            );
            out.pressure_iterations = self.pressure_iterations.clamp(1, 64);
        }
        out.downscale = clamp_logged("fluid.downscale", self.downscale, 0.05, 2.0);
        out.device_pixel_ratio =
            clamp_logged("fluid.device_pixel_ratio", self.device_pixel_ratio, 0.25, 4.0);
        out.max_timestep_ms = clamp_logged("fluid.max_timestep_ms", self.max_timestep_ms, 1.0, 250.0);
        out.field_limit = clamp_logged("fluid.field_limit", self.field_limit, 1.0, 1.0e6);
        out
    }
}

/// Particle simulation and depth-of-field tunables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ParticleSettings {
    /// Width of the position texture; particles = width * height.
    pub texture_width: u32,
    /// Height of the position texture.
    pub texture_height: u32,
    /// Frames stored in each position VAT.
    pub frames: u32,
    /// Scale decoding VAT RGB into positions: `(rgb - 0.5) * vat_scale`.
    pub vat_scale: f32,
    /// Simulation time multiplier.
    pub speed: f32,
    /// Curl noise frequency.
    pub curl: f32,
    /// Camera aperture; smaller means more blur.
    pub aperture: f32,
    /// Field of view used by the depth-of-field point sizing.
    pub fov: f32,
    /// Seed for the initial particle positions.
    pub seed: u64,
}

impl Default for ParticleSettings {
    fn default() -> Self {
        Self {
            texture_width: 2500,
            texture_height: 4,
            frames: 139,
            vat_scale: 2.0,
            speed: 1.0,
            curl: 2.0,
            aperture: 4.5,
            fov: 50.0,
            seed: 0x5eed,
        }
    }
}

impl ParticleSettings {
    pub fn particle_count(&self) -> u32 {
        self.texture_width * self.texture_height
    }

    pub fn sanitized(&self) -> Self {
        let mut out = self.clone();
        out.texture_width = self.texture_width.max(1);
        out.texture_height = self.texture_height.max(1);
        out.frames = self.frames.max(1);
        out.speed = clamp_logged("particles.speed", self.speed, 0.1, 2.0);
        out.curl = clamp_logged("particles.curl", self.curl, 0.01, 3.0);
        out.aperture = clamp_logged("particles.aperture", self.aperture, 1.0, 10.0);
        out.fov = clamp_logged("particles.fov", self.fov, 0.0, 200.0);
        out
    }
}

/// Scene camera.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    /// Resting camera position.
    pub position: [f32; 3],
    /// Horizontal offset the camera alternates between per scroll section.
    pub side_offset: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            fov: 20.0,
            near: 0.1,
            far: 20.0,
            position: [0.0, 0.0, 7.0],
            side_offset: 0.9,
        }
    }
}

/// Blend and rig timing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BlendSettings {
    /// Fade-in duration of a section weight.
    pub duration: f32,
    /// Delay before a resumed fade starts moving.
    pub delay: f32,
    /// Duration of camera and object rotation moves.
    pub move_duration: f32,
}

impl Default for BlendSettings {
    fn default() -> Self {
        Self {
            duration: 1.5,
            delay: 0.1,
            move_duration: 1.0,
        }
    }
}

/// Where animation textures come from.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AssetSettings {
    /// Directory VAT paths are resolved against.
    pub root: PathBuf,
    /// Retries after a failed fetch before a section is marked failed.
    pub max_retries: u32,
}

impl Default for AssetSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("assets"),
            max_retries: 2,
        }
    }
}

/// Complete configuration.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fluid: FluidSettings,
    pub particles: ParticleSettings,
    pub camera: CameraSettings,
    pub blend: BlendSettings,
    pub assets: AssetSettings,
    /// Compact (touch/mobile) layout: centred camera, gentler rig.
    pub compact: bool,
}

impl Config {
    /// Parse a configuration from JSON. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn with_fluid(mut self, fluid: FluidSettings) -> Self {
        self.fluid = fluid;
        self
    }

    pub fn with_particles(mut self, particles: ParticleSettings) -> Self {
        self.particles = particles;
        self
    }

    pub fn with_compact(mut self, compact: bool) -> Self {
        if compact && !self.compact {
            // Compact layout pulls the camera back and opens the aperture.
            self.camera.position[2] = 12.0;
            self.particles.aperture = 10.0;
        }
        self.compact = compact;
        self
    }

    /// A copy with every tunable clamped into its legal range.
    pub fn sanitized(&self) -> Self {
        let mut out = self.clone();
        out.fluid = self.fluid.sanitized();
        out.particles = self.particles.sanitized();
        out.blend.duration = clamp_logged("blend.duration", self.blend.duration, 0.01, 60.0);
        out.blend.delay = clamp_logged("blend.delay", self.blend.delay, 0.0, 60.0);
        out.blend.move_duration =
            clamp_logged("blend.move_duration", self.blend.move_duration, 0.01, 60.0);
        out
    }
}

fn clamp_logged(name: &str, value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        log::warn!("{} is NaN, using {}", name, min);
        return min;
    }
    let clamped = value.clamp(min, max);
    if clamped != value {
        log::warn!("{} = {} out of range, clamping to {}", name, value, clamped);
    }
    clamped
}
