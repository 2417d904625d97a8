//! Per-frame composition of everything that is not a GPU pass.
//!
//! [`Scene`] owns the frame clock, the blend scheduler, the texture registry,
//! the camera and rotation rig, and the uniform smoothers. Each frame it:
//!
//! 1. drains texture completions (binding uploads, resuming fades),
//! 2. advances the clock and the tweens,
//! 3. eases the rotation rig toward the pointer,
//! 4. prepares the simulation and render uniforms.
//!
//! The result is a [`FrameState`] that a backend (the GPU renderer, or the
//! CPU reference path in tests) executes.

use glam::{EulerRot, Mat4, Vec2};

use crate::blend::{Activation, BlendScheduler};
use crate::camera::{Camera, RotationRig};
use crate::config::Config;
use crate::input::PointerSample;
use crate::particles::{RenderSmoother, RenderUniforms, SimSmoother, SimUniforms};
use crate::registry::{
    AnimationRegistry, AssetSource, FileAssetSource, RegistryEvent, RequestOutcome, TextureKind,
};
use crate::section::{SectionKey, SectionTable};
use crate::textures::TextureData;
use crate::time::FrameClock;

/// A section entering or leaving the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionSignal {
    /// Scroll window of the section at page `index` toggled.
    Scroll {
        key: SectionKey,
        index: usize,
        active: bool,
    },
    /// Section chosen directly.
    Select(SectionKey),
}

/// A decoded texture to bind into a particle pass slot.
#[derive(Debug, Clone)]
pub struct TextureUpload {
    pub key: SectionKey,
    pub kind: TextureKind,
    pub texture: TextureData,
}

/// Everything a backend needs to run one frame.
#[derive(Debug, Clone)]
pub struct FrameState {
    pub frame: u64,
    /// Seconds since the previous frame.
    pub dt: f32,
    pub pointer: PointerSample,
    pub view_proj: Mat4,
    pub model: Mat4,
    pub sim: SimUniforms,
    pub render: RenderUniforms,
    /// Textures that became available since the previous frame.
    pub uploads: Vec<TextureUpload>,
}

pub struct Scene {
    config: Config,
    table: SectionTable,
    clock: FrameClock,
    blend: BlendScheduler,
    registry: AnimationRegistry,
    sim: SimSmoother,
    render: RenderSmoother,
    camera: Camera,
    rig: RotationRig,
    viewport: (u32, u32),
    uploads: Vec<TextureUpload>,
}

impl Scene {
    /// Build a scene fetching textures through `source`.
    pub fn new(config: &Config, table: SectionTable, source: Box<dyn AssetSource>) -> Self {
        let config = config.sanitized();
        let registry = AnimationRegistry::new(&table, source, config.assets.max_retries);
        Self {
            clock: FrameClock::new(),
            blend: BlendScheduler::new(&config.blend, config.camera.side_offset, config.compact),
            registry,
            sim: SimSmoother::new(&table),
            render: RenderSmoother::new(&table),
            camera: Camera::new(&config.camera),
            rig: RotationRig::new(config.compact),
            viewport: (1, 1),
            uploads: Vec::new(),
            table,
            config,
        }
    }

    /// Build a scene reading the standard section table from the configured
    /// asset root.
    pub fn with_file_assets(config: &Config) -> Self {
        let source = FileAssetSource::new(&config.assets.root);
        Self::new(config, SectionTable::standard(), Box::new(source))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn table(&self) -> &SectionTable {
        &self.table
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn blend(&self) -> &BlendScheduler {
        &self.blend
    }

    pub fn registry(&self) -> &AnimationRegistry {
        &self.registry
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn rig(&self) -> &RotationRig {
        &self.rig
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = (width.max(1), height.max(1));
        self.camera.set_viewport(width, height);
    }

    /// React to a section activation signal.
    pub fn handle_signal(&mut self, signal: SectionSignal) {
        match signal {
            SectionSignal::Scroll {
                key,
                index,
                active: true,
            } => {
                self.blend
                    .activate(self.table.get(key), Activation::Scroll { index });
                self.request(key);
                // Prefetch the neighbouring pages.
                for neighbour in [index.checked_sub(1), Some(index + 1)].into_iter().flatten() {
                    if let Some(&next) = SectionKey::ALL.get(neighbour) {
                        self.request(next);
                    }
                }
            }
            SectionSignal::Scroll {
                key, active: false, ..
            } => self.blend.deactivate(key),
            SectionSignal::Select(key) => {
                self.blend.activate(self.table.get(key), Activation::Select);
                self.request(key);
            }
        }
    }

    fn request(&mut self, key: SectionKey) {
        if self.registry.request(key) == RequestOutcome::AlreadyLoaded && self.blend.resume(key) {
            log::debug!("section {} already loaded, fading in", key);
        }
    }

    fn drain_registry(&mut self) {
        for event in self.registry.poll() {
            match event {
                RegistryEvent::PositionReady { key, texture } => {
                    self.uploads.push(TextureUpload {
                        key,
                        kind: TextureKind::Position,
                        texture,
                    });
                    if self.blend.is_active(key) {
                        self.blend.resume(key);
                        // Start the new animation on its first frames.
                        self.clock.align_frame_parity();
                    }
                }
                RegistryEvent::ColorReady { key, texture } => {
                    self.uploads.push(TextureUpload {
                        key,
                        kind: TextureKind::Color,
                        texture,
                    });
                }
                RegistryEvent::Failed { key, kind, .. } => {
                    log::debug!("section {} keeps its previous {:?} binding", key, kind);
                }
            }
        }
    }

    /// Advance one frame by `dt` seconds.
    pub fn step(&mut self, dt: f32, pointer: PointerSample) -> FrameState {
        self.drain_registry();
        self.clock.advance(dt);
        self.blend.update(dt);

        self.camera.offset_x = self.blend.camera_x();
        let parent = self.rig.update(pointer.position);
        let object = self.blend.rotation();
        let model = Mat4::from_quat(parent)
            * Mat4::from_euler(EulerRot::XYZ, object.x, object.y, object.z);
        let view_proj = self.camera.view_proj();

        let weights = *self.blend.weights();
        let scaled_frame = self.clock.scaled_frame();
        let sim = self.sim.update(
            &weights,
            &self.config.particles,
            self.clock.elapsed(),
            scaled_frame,
            view_proj * model,
        );
        let viewport = Vec2::new(self.viewport.0 as f32, self.viewport.1 as f32);
        let render = self.render.update(
            &weights,
            &self.config.particles,
            scaled_frame,
            view_proj,
            model,
            viewport,
        );

        FrameState {
            frame: self.clock.frame(),
            dt,
            pointer,
            view_proj,
            model,
            sim,
            render,
            uploads: std::mem::take(&mut self.uploads),
        }
    }

    /// Tear down the scroll session: cancel every fade, forget loaded
    /// textures and restart the frame counters.
    pub fn teardown(&mut self) {
        log::info!("scene teardown");
        self.blend.reset();
        self.registry.reset_all();
        self.clock.reset_frames();
        self.camera.offset_x = 0.0;
        self.uploads.clear();
    }
}
