//! Pointer-driven 2D fluid solver.
//!
//! The solver runs seven full-screen passes per frame over ping-pong targets:
//!
//! 1. pointer velocity injection
//! 2. pointer density (ink) injection
//! 3. velocity self-advection
//! 4. density advection
//! 5. divergence
//! 6. Jacobi pressure relaxation (`pressure_iterations` times)
//! 7. gradient subtraction
//!
//! The per-texel math lives in the `*_kernel` functions below. They are
//! written to match the WGSL in [`crate::gpu::shaders`] line for line, and
//! [`CpuFluidSolver`] runs them over [`Field`]s so the numerical behaviour can
//! be tested and benchmarked without a GPU.
//!
//! # Edge addressing
//!
//! Every fluid target is sampled with clamp-to-edge addressing. Advection and
//! divergence sample raw neighbour UVs (outside samples read the edge texel);
//! pressure and gradient passes additionally clamp their neighbour UVs to
//! `[0, 1]` before sampling.

use glam::{Vec2, Vec3, Vec4};

use crate::config::FluidSettings;
use crate::input::PointerSample;
use crate::target::{Field, PingPongPair, TargetDescriptor, TexelFormat};
use crate::textures::FilterMode;

/// Ink colors cycled through by pointer presses.
pub const INK_PALETTE: [Vec3; 3] = [
    Vec3::new(0x1a as f32 / 255.0, 0x3d as f32 / 255.0, 0xad as f32 / 255.0),
    Vec3::new(0x98 as f32 / 255.0, 0.0, 0.0),
    Vec3::new(0.0, 0x98 as f32 / 255.0, 0.0),
];

/// Upper bound of the density splat profile.
const DENSITY_SPLAT_CAP: f32 = 0.02;

/// Solver resolution derived from the viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FluidGrid {
    pub width: u32,
    pub height: u32,
}

impl FluidGrid {
    /// `floor(viewport * scale)`, never smaller than one texel per axis.
    pub fn from_viewport(viewport_width: u32, viewport_height: u32, scale: f32) -> Self {
        let scale = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };
        let width = (viewport_width as f32 * scale).floor() as u32;
        let height = (viewport_height as f32 * scale).floor() as u32;
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// One texel in UV units.
    pub fn rdx(&self) -> Vec2 {
        Vec2::new(1.0 / self.width as f32, 1.0 / self.height as f32)
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// Descriptor shared by every fluid target.
    pub fn descriptor(&self) -> TargetDescriptor {
        TargetDescriptor::new(self.width, self.height, TexelFormat::Rgba16Float, FilterMode::Linear)
    }
}

/// Values consumed by the fluid passes for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FluidFrame {
    /// Pointer position in NDC.
    pub pointer: Vec2,
    /// `(current - previous) * velocity_multiplier`.
    pub delta: Vec2,
    /// Advection timestep in milliseconds.
    pub timestep_ms: f32,
    /// Current ink color.
    pub ink: Vec3,
}

/// CPU-side state shared by the CPU and GPU solvers: previous pointer
/// position, ink cycling and sanitized settings.
#[derive(Debug, Clone)]
pub struct FluidInputs {
    settings: FluidSettings,
    previous: Option<Vec2>,
    was_pressed: bool,
    ink_index: usize,
}

impl FluidInputs {
    pub fn new(settings: &FluidSettings) -> Self {
        Self {
            settings: settings.sanitized(),
            previous: None,
            was_pressed: false,
            ink_index: 0,
        }
    }

    pub fn settings(&self) -> &FluidSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: &FluidSettings) {
        self.settings = settings.sanitized();
    }

    /// Ink color currently injected.
    pub fn ink(&self) -> Vec3 {
        INK_PALETTE[self.ink_index]
    }

    /// Advance the ink palette.
    pub fn cycle_ink(&mut self) {
        self.ink_index = (self.ink_index + 1) % INK_PALETTE.len();
    }

    /// Consume this frame's pointer sample.
    ///
    /// The very first sample has no predecessor and injects no motion.
    pub fn frame(&mut self, pointer: PointerSample, dt: f32) -> FluidFrame {
        if pointer.pressed && !self.was_pressed {
            self.cycle_ink();
        }
        self.was_pressed = pointer.pressed;

        let previous = self.previous.unwrap_or(pointer.position);
        self.previous = Some(pointer.position);

        let timestep_ms = (dt.max(0.0) * 1000.0).min(self.settings.max_timestep_ms);
        FluidFrame {
            pointer: pointer.position,
            delta: (pointer.position - previous) * self.settings.velocity_multiplier,
            timestep_ms,
            ink: self.ink(),
        }
    }
}

fn splat_offset(uv: Vec2, pointer: Vec2, aspect: f32) -> Vec2 {
    (uv - (pointer + Vec2::ONE) * 0.5) * Vec2::new(aspect, 1.0)
}

fn limit(v: Vec4, bound: f32) -> Vec4 {
    let v = Vec4::select(v.is_nan_mask(), Vec4::ZERO, v);
    v.clamp(Vec4::splat(-bound), Vec4::splat(bound))
}

/// Stage 1: fade the old velocity and add a splat of the pointer delta.
pub fn pointer_velocity_kernel(
    old: Vec4,
    uv: Vec2,
    frame: &FluidFrame,
    aspect: f32,
    settings: &FluidSettings,
) -> Vec4 {
    let p = splat_offset(uv, frame.pointer, aspect);
    let profile = (1.0 - p.dot(p) / settings.mouse_radius).exp();
    let splat = profile * frame.delta.extend(0.0);
    limit(
        (old.truncate() * settings.fade_amount + splat).extend(1.0),
        settings.field_limit,
    )
}

/// Stage 2: fade the old density and add an ink splat whose radius grows
/// with pointer speed.
pub fn pointer_density_kernel(
    old: Vec4,
    uv: Vec2,
    frame: &FluidFrame,
    aspect: f32,
    settings: &FluidSettings,
) -> Vec4 {
    let p = splat_offset(uv, frame.pointer, aspect);
    let speed = frame.delta.x.abs().max(frame.delta.y.abs());
    let delta_radius = settings.mouse_radius * speed * 10.0;
    let splat = if delta_radius > f32::EPSILON {
        (1.0 - p.dot(p) / delta_radius).exp().min(DENSITY_SPLAT_CAP) * frame.ink
    } else {
        Vec3::ZERO
    };
    limit(
        (old.truncate() * settings.fade_amount + splat).extend(1.0),
        settings.field_limit,
    )
}

/// Stages 3 and 4: semi-Lagrangian backtrace through `velocity`.
pub fn advect_kernel(
    source: &Field,
    velocity: &Field,
    uv: Vec2,
    timestep_ms: f32,
    rdx: Vec2,
    diffusion: f32,
    bound: f32,
) -> Vec4 {
    let v = velocity.sample(uv).truncate().truncate();
    let pos = uv - timestep_ms * rdx * v;
    limit((source.sample(pos).truncate() * diffusion).extend(1.0), bound)
}

/// Stage 5: central-difference divergence of `velocity`.
pub fn divergence_kernel(velocity: &Field, uv: Vec2, rdx: Vec2) -> Vec4 {
    let l = velocity.sample(uv - Vec2::new(rdx.x, 0.0)).x;
    let r = velocity.sample(uv + Vec2::new(rdx.x, 0.0)).x;
    let t = velocity.sample(uv + Vec2::new(0.0, rdx.y)).y;
    let b = velocity.sample(uv - Vec2::new(0.0, rdx.y)).y;
    Vec4::new((r - l + t - b) * 0.5, 0.0, 0.0, 1.0)
}

fn clamped_neighbours(field: &Field, uv: Vec2, rdx: Vec2) -> (f32, f32, f32, f32) {
    let at = |offset: Vec2| field.sample((uv + offset).clamp(Vec2::ZERO, Vec2::ONE)).x;
    (
        at(Vec2::new(-rdx.x, 0.0)),
        at(Vec2::new(rdx.x, 0.0)),
        at(Vec2::new(0.0, rdx.y)),
        at(Vec2::new(0.0, -rdx.y)),
    )
}

/// Stage 6: one Jacobi iteration of the pressure Poisson equation.
pub fn pressure_kernel(pressure: &Field, divergence: &Field, uv: Vec2, rdx: Vec2, bound: f32) -> Vec4 {
    let (l, r, t, b) = clamped_neighbours(pressure, uv, rdx);
    let div = divergence.sample(uv).x;
    limit(Vec4::new((l + r + b + t - div) * 0.25, 0.0, 0.0, 1.0), bound)
}

/// Stage 7: subtract the pressure gradient from `velocity`.
pub fn gradient_subtract_kernel(
    velocity: &Field,
    pressure: &Field,
    uv: Vec2,
    rdx: Vec2,
    gradient_amount: f32,
    bound: f32,
) -> Vec4 {
    let (l, r, t, b) = clamped_neighbours(pressure, uv, rdx);
    let v = velocity.sample(uv).truncate().truncate() - Vec2::new(r - l, t - b) * gradient_amount;
    limit(Vec4::new(v.x, v.y, 0.0, 1.0), bound)
}

/// Latest fluid output of a solver.
#[derive(Debug, Clone, PartialEq)]
pub struct FluidFields {
    pub velocity: Field,
    pub density: Field,
}

/// Reference implementation of the fluid solver on the CPU.
#[derive(Debug, Clone)]
pub struct CpuFluidSolver {
    inputs: FluidInputs,
    grid: FluidGrid,
    velocity: PingPongPair<Field>,
    density: PingPongPair<Field>,
    pressure: PingPongPair<Field>,
    divergence: Field,
}

impl CpuFluidSolver {
    /// Create a solver for a viewport in physical pixels.
    pub fn new(settings: &FluidSettings, viewport_width: u32, viewport_height: u32) -> Self {
        let inputs = FluidInputs::new(settings);
        let grid = FluidGrid::from_viewport(
            viewport_width,
            viewport_height,
            inputs.settings().resolution_scale(),
        );
        let mut solver = Self {
            inputs,
            grid,
            velocity: PingPongPair::new(Field::new(1, 1), Field::new(1, 1)),
            density: PingPongPair::new(Field::new(1, 1), Field::new(1, 1)),
            pressure: PingPongPair::new(Field::new(1, 1), Field::new(1, 1)),
            divergence: Field::new(1, 1),
        };
        solver.allocate();
        solver
    }

    fn allocate(&mut self) {
        let desc = self.grid.descriptor();
        let pair = || PingPongPair::new(Field::from_descriptor(&desc), Field::from_descriptor(&desc));
        self.velocity = pair();
        self.density = pair();
        self.pressure = pair();
        self.divergence = Field::from_descriptor(&desc);
    }

    /// Reallocate all targets for a new viewport. Field contents are cleared.
    pub fn resize(&mut self, viewport_width: u32, viewport_height: u32) {
        let grid = FluidGrid::from_viewport(
            viewport_width,
            viewport_height,
            self.inputs.settings().resolution_scale(),
        );
        if grid != self.grid {
            log::info!(
                "fluid grid {}x{} -> {}x{}",
                self.grid.width,
                self.grid.height,
                grid.width,
                grid.height
            );
            self.grid = grid;
            self.allocate();
        }
    }

    pub fn grid(&self) -> FluidGrid {
        self.grid
    }

    pub fn inputs(&self) -> &FluidInputs {
        &self.inputs
    }

    pub fn inputs_mut(&mut self) -> &mut FluidInputs {
        &mut self.inputs
    }

    pub fn velocity(&self) -> &Field {
        self.velocity.read()
    }

    pub fn density(&self) -> &Field {
        self.density.read()
    }

    pub fn pressure(&self) -> &Field {
        self.pressure.read()
    }

    pub fn divergence(&self) -> &Field {
        &self.divergence
    }

    /// Run all seven stages for one frame and return the published fields.
    pub fn step(&mut self, pointer: PointerSample, dt: f32) -> FluidFields {
        let frame = self.inputs.frame(pointer, dt);
        self.run_stages(&frame);
        FluidFields {
            velocity: self.velocity.read().clone(),
            density: self.density.read().clone(),
        }
    }

    /// Run the stages with an explicit frame, bypassing pointer bookkeeping.
    pub fn run_stages(&mut self, frame: &FluidFrame) {
        let settings = self.inputs.settings().clone();
        let aspect = self.grid.aspect();
        let rdx = self.grid.rdx();
        let bound = settings.field_limit;

        self.inject_velocity(frame, aspect, &settings);
        self.inject_density(frame, aspect, &settings);

        // Velocity self-advection.
        {
            let (read, write) = self.velocity.split();
            write.render(|uv| {
                advect_kernel(read, read, uv, frame.timestep_ms, rdx, settings.velocity_diffusion, bound)
            });
        }
        self.velocity.swap();

        // Density advection through the advected velocity.
        {
            let velocity = self.velocity.read();
            let (read, write) = self.density.split();
            write.render(|uv| {
                advect_kernel(read, velocity, uv, frame.timestep_ms, rdx, settings.density_diffusion, bound)
            });
        }
        self.density.swap();

        {
            let velocity = self.velocity.read();
            self.divergence.render(|uv| divergence_kernel(velocity, uv, rdx));
        }

        for _ in 0..settings.pressure_iterations {
            self.relax_pressure(rdx, bound);
        }

        {
            let pressure = self.pressure.read();
            let (read, write) = self.velocity.split();
            write.render(|uv| {
                gradient_subtract_kernel(read, pressure, uv, rdx, settings.gradient_amount, bound)
            });
        }
        self.velocity.swap();
    }

    fn inject_velocity(&mut self, frame: &FluidFrame, aspect: f32, settings: &FluidSettings) {
        let (read, write) = self.velocity.split();
        write.render(|uv| pointer_velocity_kernel(read.sample(uv), uv, frame, aspect, settings));
        self.velocity.swap();
    }

    fn inject_density(&mut self, frame: &FluidFrame, aspect: f32, settings: &FluidSettings) {
        let (read, write) = self.density.split();
        write.render(|uv| pointer_density_kernel(read.sample(uv), uv, frame, aspect, settings));
        self.density.swap();
    }

    /// One Jacobi iteration against the current divergence.
    pub fn relax_pressure(&mut self, rdx: Vec2, bound: f32) {
        let divergence = &self.divergence;
        let (read, write) = self.pressure.split();
        write.render(|uv| pressure_kernel(read, divergence, uv, rdx, bound));
        self.pressure.swap();
    }

    /// Overwrite the pressure and divergence fields, for driving the
    /// relaxation directly.
    pub fn seed_pressure(&mut self, pressure: Vec4, divergence: Vec4) {
        let (a, b) = self.pressure.both_mut();
        a.fill(pressure);
        b.fill(pressure);
        self.divergence.fill(divergence);
    }
}
