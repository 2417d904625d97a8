//! # vatflow
//!
//! Scroll-driven particle morphing between vertex-animation textures (VATs),
//! stirred by a pointer-driven fluid.
//!
//! A page is split into sections. As a section scrolls into view its VAT is
//! fetched in the background, and once it is bound the particles fade toward
//! it while the camera and the object rotation ease into the section's pose.
//! Pointer movement splats velocity and ink into a small fluid solver whose
//! output drifts the particles and tints them.
//!
//! ## Quick Start
//!
//! ```ignore
//! use vatflow::prelude::*;
//!
//! fn main() -> Result<(), RunError> {
//!     env_logger::init();
//!     vatflow::app::run(Config::default())
//! }
//! ```
//!
//! ## Layout
//!
//! Everything that is not a GPU pass runs on the CPU and is testable without
//! a device:
//!
//! - [`scene::Scene`] composes a frame: texture completions, tweens, the
//!   camera rig and the per-frame uniforms.
//! - [`registry::AnimationRegistry`] loads textures once, off-thread, with
//!   retries.
//! - [`blend::BlendScheduler`] owns the weight, rotation and camera tweens.
//! - [`fluid::CpuFluidSolver`] and [`particles::CpuParticleSim`] are
//!   reference implementations of the GPU passes.
//!
//! [`gpu::Renderer`] runs the same passes on the GPU each frame and
//! [`app`] drives it from a `winit` window.

pub mod app;
pub mod blend;
pub mod camera;
pub mod config;
pub mod error;
pub mod flow_map;
pub mod fluid;
pub mod gpu;
pub mod input;
pub mod particles;
pub mod registry;
pub mod scene;
pub mod scroll;
pub mod section;
pub mod target;
pub mod textures;
pub mod time;
pub mod tween;

pub use error::{ConfigError, GpuError, RunError, TextureError};

/// Convenient re-exports for common usage.
///
/// ```ignore
/// use vatflow::prelude::*;
/// ```
pub mod prelude {
    pub use crate::blend::{Activation, BlendScheduler};
    pub use crate::config::{
        AssetSettings, BlendSettings, CameraSettings, Config, FluidSettings, ParticleSettings,
    };
    pub use crate::error::{ConfigError, GpuError, RunError, TextureError};
    pub use crate::flow_map::{FlowMapSlot, FlowMapSnapshot};
    pub use crate::fluid::{CpuFluidSolver, FluidGrid};
    pub use crate::input::{PointerInput, PointerSample};
    pub use crate::particles::CpuParticleSim;
    pub use crate::registry::{AnimationRegistry, AssetSource, FileAssetSource, LoadState};
    pub use crate::scene::{FrameState, Scene, SectionSignal};
    pub use crate::scroll::ScrollTrack;
    pub use crate::section::{SectionConfig, SectionKey, SectionMap, SectionTable};
    pub use crate::target::{Field, PingPongPair, TargetDescriptor};
    pub use crate::textures::{FilterMode, TextureData};
    pub use glam::{Vec2, Vec3, Vec4};
}
