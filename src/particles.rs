//! CPU side of the particle passes: lookup table, initial positions, the
//! per-frame uniform preparation and the reference particle kernel.
//!
//! The particle state lives in an `Rgba32Float` position texture, one texel
//! per particle (xyz = position, w = a per-particle random value). The
//! simulation pass pulls every particle toward the weighted blend of the
//! sections' position VATs; the render pass draws one depth-of-field sprite
//! per particle.
//!
//! # VAT layout
//!
//! Column `i` of a VAT holds particle `i` (`u = (i + 0.5) / vat_width`), row
//! `f` holds frame `f`. A position texel decodes as `(rgb - 0.5) * vat_scale`.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::ParticleSettings;
use crate::section::{SectionKey, SectionMap, SectionTable};
use crate::target::{Field, PingPongPair, Side};
use crate::textures::{FilterMode, TextureData};

/// Radius of the ball particles start in.
pub const SEED_RADIUS: f32 = 0.5;
/// Low-pass factor of the simulation-side weights and curl frequency.
pub const SIM_SMOOTHING: f32 = 0.1;
/// Low-pass factor of the render-side color weights.
pub const COLOR_SMOOTHING: f32 = 0.01;
/// Low-pass factor of the depth-of-field parameters.
pub const DOF_SMOOTHING: f32 = 0.1;
/// Fraction of the remaining distance to the blend target covered per frame.
pub const FOLLOW_RATE: f32 = 0.1;
/// Step length of the swirl field applied to free particles.
pub const SWIRL_STEP: f32 = 0.004;
/// Scale from flow velocity to particle displacement.
pub const FLOW_STRENGTH: f32 = 0.05;
/// Number of sections that carry a color VAT.
pub const COLOR_SLOTS: usize = 9;

/// Section keys bound to the render pass color slots, in slot order.
pub const COLOR_KEYS: [SectionKey; COLOR_SLOTS] = [
    SectionKey::Dna,
    SectionKey::Cells,
    SectionKey::StemCells,
    SectionKey::Insulin,
    SectionKey::Proteostasis,
    SectionKey::Histones,
    SectionKey::Macro,
    SectionKey::Dysbiosis,
    SectionKey::Inflammation,
];

/// Color slot of `key`, if it has one.
pub fn color_slot(key: SectionKey) -> Option<usize> {
    COLOR_KEYS.iter().position(|k| *k == key)
}

/// Position-texture UV of every particle, in particle index order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleLookup {
    width: u32,
    height: u32,
    uvs: Vec<[f32; 2]>,
}

impl ParticleLookup {
    pub fn new(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let uvs = (0..width * height)
            .map(|i| {
                [
                    (i % width) as f32 / width as f32,
                    (i / width) as f32 / height as f32,
                ]
            })
            .collect();
        Self { width, height, uvs }
    }

    pub fn len(&self) -> usize {
        self.uvs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uvs.is_empty()
    }

    pub fn uvs(&self) -> &[[f32; 2]] {
        &self.uvs
    }

    /// Integer texel of particle `index` in the position texture.
    pub fn texel(&self, index: u32) -> (u32, u32) {
        (index % self.width, index / self.width)
    }
}

/// Initial particle texels: uniform directions, radius uniform in
/// `[0, SEED_RADIUS)`, w uniform in `[0, 1)`.
pub fn seed_positions(count: usize, seed: u64) -> Vec<Vec4> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let dir = Vec3::new(
                rng.gen::<f32>() - 0.5,
                rng.gen::<f32>() - 0.5,
                rng.gen::<f32>() - 0.5,
            )
            .normalize_or_zero();
            let dist = rng.gen::<f32>() * SEED_RADIUS;
            (dir * dist).extend(rng.gen::<f32>())
        })
        .collect()
}

/// VAT U coordinate of particle `index`.
pub fn vat_column(index: u32, vat_width: u32) -> f32 {
    (index as f32 + 0.5) / vat_width.max(1) as f32
}

/// Decode a VAT position texel with RGB in `[0, 1]`.
pub fn decode_vat_position(rgb: Vec3, vat_scale: f32) -> Vec3 {
    (rgb - Vec3::splat(0.5)) * vat_scale
}

/// VAT frame for the scaled frame counter: a slow sine sweep through the
/// animation, never below frame 1.
pub fn current_frame(scaled_frame: f32, frames: u32) -> f32 {
    let frame = ((scaled_frame * 0.0026).sin() + 1.0) * 0.5 * (frames as f32 * 0.99);
    frame.max(1.0)
}

/// Divergence-free swirl used to keep unconstrained particles moving.
pub fn swirl(p: Vec3, time: f32, freq: f32) -> Vec3 {
    let q = p * freq + Vec3::splat(time);
    Vec3::new(
        q.y.sin() - q.z.cos(),
        q.z.sin() - q.x.cos(),
        q.x.sin() - q.y.cos(),
    )
}

/// One particle's update: follow the blended VAT target in proportion to
/// the total weight, swirl with the remaining freedom, and drift with the
/// flow velocity under the particle.
pub fn particle_step_kernel(
    previous: Vec4,
    target: Vec3,
    total_weight: f32,
    swirl: Vec3,
    flow: Vec2,
) -> Vec4 {
    let pull = total_weight.clamp(0.0, 1.0);
    let freedom = 1.0 - pull;
    let p = previous.truncate();
    let next = p
        + (target - p) * pull * FOLLOW_RATE
        + swirl * freedom * SWIRL_STEP
        + flow.extend(0.0) * FLOW_STRENGTH;
    next.extend(previous.w)
}

/// Weighted sum of VAT targets and the total weight.
pub fn blend_targets(samples: impl IntoIterator<Item = (f32, Vec3)>) -> (Vec3, f32) {
    samples
        .into_iter()
        .fold((Vec3::ZERO, 0.0), |(sum, total), (w, p)| (sum + p * w, total + w))
}

fn lerp(from: f32, to: f32, t: f32) -> f32 {
    from + (to - from) * t
}

fn pack_weights<const N: usize>(weights: impl IntoIterator<Item = f32>) -> [[f32; 4]; N] {
    let mut out = [[0.0; 4]; N];
    for (i, w) in weights.into_iter().take(N * 4).enumerate() {
        out[i / 4][i % 4] = w;
    }
    out
}

/// Bit `i` set when slot `i` samples with nearest filtering.
fn nearest_mask(filters: impl IntoIterator<Item = FilterMode>) -> u32 {
    filters
        .into_iter()
        .enumerate()
        .filter(|(_, f)| *f == FilterMode::Nearest)
        .fold(0, |mask, (i, _)| mask | (1 << i))
}

/// Uniforms of the simulation pass.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct SimUniforms {
    /// Model-view-projection used to find a particle's screen position.
    pub mvp: [[f32; 4]; 4],
    /// Section weights in [`SectionKey`] order; 13 of 16 used.
    pub weights: [[f32; 4]; 4],
    pub time: f32,
    pub curl_freq: f32,
    pub current_frame: f32,
    pub total_frames: f32,
    pub vat_scale: f32,
    pub flow_strength: f32,
    pub nearest_mask: u32,
    pub _padding: f32,
}

/// Uniforms of the render pass.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct RenderUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
    /// Color weights in [`COLOR_KEYS`] order; 9 of 12 used.
    pub color_weights: [[f32; 4]; 3],
    pub time: f32,
    pub focus: f32,
    pub fov: f32,
    pub blur: f32,
    pub current_frame: f32,
    pub total_frames: f32,
    pub nearest_mask: u32,
    pub _padding0: f32,
    pub viewport: [f32; 2],
    pub _padding1: [f32; 2],
}

/// Smoothed state feeding [`SimUniforms`].
#[derive(Debug, Clone)]
pub struct SimSmoother {
    curl_freq: f32,
    weights: SectionMap<f32>,
    nearest_mask: u32,
}

impl SimSmoother {
    pub fn new(table: &SectionTable) -> Self {
        Self {
            curl_freq: 0.25,
            weights: SectionMap::splat(0.0),
            nearest_mask: nearest_mask(table.iter().map(|s| s.position.filter)),
        }
    }

    pub fn weights(&self) -> &SectionMap<f32> {
        &self.weights
    }

    pub fn curl_freq(&self) -> f32 {
        self.curl_freq
    }

    /// Prepare this frame's simulation uniforms.
    ///
    /// Intro and telomere weights pass straight through; the rest low-pass
    /// toward the scheduler's weights.
    pub fn update(
        &mut self,
        targets: &SectionMap<f32>,
        settings: &ParticleSettings,
        elapsed: f32,
        scaled_frame: f32,
        mvp: Mat4,
    ) -> SimUniforms {
        self.curl_freq = lerp(self.curl_freq, settings.curl, SIM_SMOOTHING);
        for (key, weight) in self.weights.iter_mut() {
            *weight = if key.is_smoothed() {
                lerp(*weight, targets[key], SIM_SMOOTHING)
            } else {
                targets[key]
            };
        }

        SimUniforms {
            mvp: mvp.to_cols_array_2d(),
            weights: pack_weights(self.weights.values().iter().copied()),
            time: elapsed * settings.speed,
            curl_freq: self.curl_freq,
            current_frame: current_frame(scaled_frame, settings.frames),
            total_frames: settings.frames as f32,
            vat_scale: settings.vat_scale,
            flow_strength: FLOW_STRENGTH,
            nearest_mask: self.nearest_mask,
            _padding: 0.0,
        }
    }
}

/// Smoothed state feeding [`RenderUniforms`].
#[derive(Debug, Clone)]
pub struct RenderSmoother {
    focus: f32,
    fov: f32,
    blur: f32,
    color_weights: [f32; COLOR_SLOTS],
    nearest_mask: u32,
}

impl RenderSmoother {
    pub fn new(table: &SectionTable) -> Self {
        let filters = COLOR_KEYS.map(|key| {
            table
                .get(key)
                .color
                .as_ref()
                .map_or(FilterMode::Linear, |c| c.filter)
        });
        Self {
            focus: 5.1,
            fov: 50.0,
            blur: 30.0,
            color_weights: [0.0; COLOR_SLOTS],
            nearest_mask: nearest_mask(filters),
        }
    }

    pub fn focus(&self) -> f32 {
        self.focus
    }

    pub fn blur(&self) -> f32 {
        self.blur
    }

    pub fn color_weights(&self) -> &[f32; COLOR_SLOTS] {
        &self.color_weights
    }

    /// Prepare this frame's render uniforms.
    pub fn update(
        &mut self,
        targets: &SectionMap<f32>,
        settings: &ParticleSettings,
        scaled_frame: f32,
        view_proj: Mat4,
        model: Mat4,
        viewport: Vec2,
    ) -> RenderUniforms {
        self.focus = lerp(self.focus, 7.1 + (scaled_frame * 0.0066).sin(), DOF_SMOOTHING);
        self.fov = lerp(self.fov, settings.fov, DOF_SMOOTHING);
        self.blur = lerp(self.blur, (5.6 - settings.aperture) * 9.0, DOF_SMOOTHING);
        for (slot, key) in COLOR_KEYS.iter().enumerate() {
            self.color_weights[slot] = lerp(self.color_weights[slot], targets[*key], COLOR_SMOOTHING);
        }

        RenderUniforms {
            view_proj: view_proj.to_cols_array_2d(),
            model: model.to_cols_array_2d(),
            color_weights: pack_weights(self.color_weights.iter().copied()),
            time: scaled_frame,
            focus: self.focus,
            fov: self.fov,
            blur: self.blur,
            current_frame: current_frame(scaled_frame, settings.frames),
            total_frames: settings.frames as f32,
            nearest_mask: self.nearest_mask,
            _padding0: 0.0,
            viewport: viewport.to_array(),
            _padding1: [0.0; 2],
        }
    }
}

/// Sample the position VAT `vat` for particle `index` at `frame`.
///
/// The column is the particle's texel; rows are interpolated when the VAT
/// uses linear filtering.
pub fn sample_vat(vat: &TextureData, index: u32, frame: f32, total_frames: f32, vat_scale: f32) -> Vec3 {
    let x = ((vat_column(index, vat.width) * vat.width as f32) as u32).min(vat.width - 1);
    let v = frame / total_frames.max(1.0);
    let row = v * vat.height as f32 - 0.5;
    let max_y = vat.height as i64 - 1;
    let fetch = |y: f32| {
        let y = (y as i64).clamp(0, max_y) as u32;
        let [r, g, b, _] = vat.texel(x, y);
        Vec3::new(r as f32, g as f32, b as f32) / 255.0
    };
    let rgb = match vat.filter {
        FilterMode::Nearest => fetch((v * vat.height as f32).floor()),
        FilterMode::Linear => {
            let y0 = row.floor();
            fetch(y0).lerp(fetch(y0 + 1.0), row - y0)
        }
    };
    decode_vat_position(rgb, vat_scale)
}

/// Where a world-space point lands in the fluid's UV space.
pub fn screen_uv(mvp: Mat4, p: Vec3) -> Vec2 {
    let clip = mvp * p.extend(1.0);
    let w = if clip.w.abs() > f32::EPSILON { clip.w } else { f32::EPSILON };
    Vec2::new(clip.x, clip.y) / w * 0.5 + Vec2::splat(0.5)
}

/// Reference implementation of the simulation pass on the CPU.
#[derive(Debug, Clone)]
pub struct CpuParticleSim {
    positions: PingPongPair<Vec<Vec4>>,
    vats: SectionMap<Option<TextureData>>,
}

impl CpuParticleSim {
    pub fn new(settings: &ParticleSettings) -> Self {
        let seed = seed_positions(settings.particle_count() as usize, settings.seed);
        Self {
            positions: PingPongPair::new(seed.clone(), seed),
            vats: SectionMap::default(),
        }
    }

    /// Bind a position VAT for `key`, replacing any previous one.
    pub fn bind(&mut self, key: SectionKey, vat: TextureData) {
        self.vats[key] = Some(vat);
    }

    pub fn is_bound(&self, key: SectionKey) -> bool {
        self.vats[key].is_some()
    }

    /// Positions written by the latest step.
    pub fn positions(&self) -> &[Vec4] {
        self.positions.read()
    }

    /// Buffer holding [`positions`](Self::positions).
    pub fn read_side(&self) -> Side {
        self.positions.read_side()
    }

    /// Run the simulation step for `frame`. `flow` is the fluid velocity
    /// field, if any.
    pub fn step(&mut self, frame: u64, uniforms: &SimUniforms, flow: Option<&Field>) {
        self.positions.align_to_frame(frame);
        let mvp = Mat4::from_cols_array_2d(&uniforms.mvp);
        let weights: Vec<f32> = uniforms.weights.iter().flatten().copied().collect();
        let vats = &self.vats;
        let (read, write) = self.positions.split();

        for (i, (prev, out)) in read.iter().zip(write.iter_mut()).enumerate() {
            let (target, total) = blend_targets(SectionKey::ALL.iter().filter_map(|key| {
                let w = weights[key.index()];
                if w == 0.0 {
                    return None;
                }
                let p = vats[*key].as_ref().map_or(Vec3::ZERO, |vat| {
                    sample_vat(vat, i as u32, uniforms.current_frame, uniforms.total_frames, uniforms.vat_scale)
                });
                Some((w, p))
            }));
            let velocity = flow.map_or(Vec2::ZERO, |field| {
                let v = field.sample(screen_uv(mvp, prev.truncate()));
                Vec2::new(v.x, v.y)
            });
            let curl = swirl(prev.truncate(), uniforms.time, uniforms.curl_freq);
            *out = particle_step_kernel(*prev, target, total, curl, velocity);
        }
        self.positions.swap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_sizes_are_16_byte_multiples() {
        assert_eq!(std::mem::size_of::<SimUniforms>() % 16, 0);
        assert_eq!(std::mem::size_of::<RenderUniforms>() % 16, 0);
        assert_eq!(std::mem::size_of::<SimUniforms>(), 160);
        assert_eq!(std::mem::size_of::<RenderUniforms>(), 224);
    }

    #[test]
    fn test_lookup_covers_texture() {
        let lookup = ParticleLookup::new(2500, 4);
        assert_eq!(lookup.len(), 10_000);
        assert_eq!(lookup.uvs()[0], [0.0, 0.0]);
        assert_eq!(lookup.uvs()[2501], [1.0 / 2500.0, 0.25]);
        assert_eq!(lookup.texel(2501), (1, 1));
    }

    #[test]
    fn test_seed_positions_in_ball() {
        let positions = seed_positions(1000, 7);
        assert_eq!(positions.len(), 1000);
        for p in &positions {
            assert!(p.truncate().length() <= SEED_RADIUS + 1e-6);
            assert!((0.0..1.0).contains(&p.w));
        }
        assert_eq!(positions, seed_positions(1000, 7));
    }

    #[test]
    fn test_vat_contract() {
        assert_eq!(vat_column(0, 10), 0.05);
        assert_eq!(decode_vat_position(Vec3::splat(0.5), 2.0), Vec3::ZERO);
        assert_eq!(decode_vat_position(Vec3::ONE, 2.0), Vec3::ONE);
    }

    #[test]
    fn test_current_frame_bounds() {
        assert_eq!(current_frame(0.0, 139), 139.0 * 0.99 * 0.5);
        for f in 0..5000 {
            let frame = current_frame(f as f32 * 7.0, 139);
            assert!(frame >= 1.0);
            assert!(frame <= 139.0 * 0.99 + 1e-3);
        }
    }

    #[test]
    fn test_swirl_is_divergence_free() {
        let h = 1e-3;
        let p = Vec3::new(0.3, -0.2, 0.7);
        let div = (swirl(p + Vec3::X * h, 0.5, 2.0).x - swirl(p - Vec3::X * h, 0.5, 2.0).x
            + swirl(p + Vec3::Y * h, 0.5, 2.0).y
            - swirl(p - Vec3::Y * h, 0.5, 2.0).y
            + swirl(p + Vec3::Z * h, 0.5, 2.0).z
            - swirl(p - Vec3::Z * h, 0.5, 2.0).z)
            / (2.0 * h);
        assert!(div.abs() < 1e-3);
    }

    #[test]
    fn test_particle_follows_full_weight_target() {
        let mut p = Vec4::new(1.0, 0.0, 0.0, 0.3);
        let target = Vec3::new(0.0, 1.0, 0.0);
        for _ in 0..200 {
            p = particle_step_kernel(p, target, 1.0, Vec3::ONE, Vec2::ZERO);
        }
        assert!((p.truncate() - target).length() < 1e-3);
        assert_eq!(p.w, 0.3);
    }

    #[test]
    fn test_blend_targets() {
        let (sum, total) = blend_targets([(0.25, Vec3::X), (0.75, Vec3::Y)]);
        assert_eq!(sum, Vec3::new(0.25, 0.75, 0.0));
        assert_eq!(total, 1.0);
    }

    fn vat_with_rows(rows: &[[u8; 3]], filter: FilterMode) -> TextureData {
        let data = rows.iter().flat_map(|[r, g, b]| [*r, *g, *b, 255]).collect();
        TextureData::from_rgba(data, 1, rows.len() as u32, filter)
    }

    #[test]
    fn test_sample_vat_rows() {
        let vat = vat_with_rows(&[[128, 128, 128], [255, 128, 128]], FilterMode::Linear);
        // Row centres are at frames 0.5 and 1.5 of 2.
        let first = sample_vat(&vat, 0, 0.5, 2.0, 2.0);
        let second = sample_vat(&vat, 0, 1.5, 2.0, 2.0);
        let between = sample_vat(&vat, 0, 1.0, 2.0, 2.0);
        assert!(first.length() < 0.01);
        assert!((second.x - 1.0).abs() < 1e-6);
        assert!((between.x - 0.5).abs() < 0.01);

        let nearest = vat_with_rows(&[[128, 128, 128], [255, 128, 128]], FilterMode::Nearest);
        assert!((sample_vat(&nearest, 0, 1.2, 2.0, 2.0).x - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cpu_sim_converges_to_bound_vat() {
        let settings = ParticleSettings {
            texture_width: 4,
            texture_height: 1,
            ..ParticleSettings::default()
        };
        let mut sim = CpuParticleSim::new(&settings);
        let row = [[255u8, 128, 128]; 4];
        let data = row.iter().flat_map(|[r, g, b]| [*r, *g, *b, 255]).collect();
        sim.bind(SectionKey::Telomere, TextureData::from_rgba(data, 4, 1, FilterMode::Nearest));

        let mut uniforms = SimUniforms::zeroed();
        uniforms.mvp = Mat4::IDENTITY.to_cols_array_2d();
        uniforms.weights[0][1] = 1.0;
        uniforms.total_frames = 1.0;
        uniforms.vat_scale = 2.0;
        for frame in 1..=200 {
            sim.step(frame, &uniforms, None);
        }
        for p in sim.positions() {
            // 128 decodes to just above zero.
            assert!((p.truncate() - Vec3::X).length() < 0.01);
        }
    }

    #[test]
    fn test_cpu_sim_flow_pushes_particles() {
        let settings = ParticleSettings {
            texture_width: 1,
            texture_height: 1,
            ..ParticleSettings::default()
        };
        let mut sim = CpuParticleSim::new(&settings);
        let start = sim.positions()[0];
        let mut flow = Field::new(4, 4);
        flow.fill(Vec4::new(1.0, 0.0, 0.0, 1.0));

        let mut uniforms = SimUniforms::zeroed();
        uniforms.mvp = Mat4::IDENTITY.to_cols_array_2d();
        uniforms.total_frames = 1.0;
        let mut still = sim.clone();
        sim.step(1, &uniforms, Some(&flow));
        still.step(1, &uniforms, None);
        let pushed = sim.positions()[0].x - still.positions()[0].x;
        assert!((pushed - FLOW_STRENGTH).abs() < 1e-5);
        assert_eq!(sim.positions()[0].w, start.w);
    }

    #[test]
    fn test_sim_smoothing() {
        let table = SectionTable::standard();
        let mut sim = SimSmoother::new(&table);
        let mut targets = SectionMap::splat(0.0);
        targets[SectionKey::Intro] = 1.0;
        targets[SectionKey::Dna] = 1.0;
        let settings = ParticleSettings::default();

        let u = sim.update(&targets, &settings, 2.0, 0.0, Mat4::IDENTITY);
        assert_eq!(sim.weights()[SectionKey::Intro], 1.0);
        assert!((sim.weights()[SectionKey::Dna] - 0.1).abs() < 1e-6);
        assert_eq!(u.weights[0][0], 1.0);
        assert!((u.weights[0][2] - 0.1).abs() < 1e-6);
        assert_eq!(u.time, 2.0);
        assert!((sim.curl_freq() - (0.25 + (2.0 - 0.25) * 0.1)).abs() < 1e-6);
        assert_eq!(u.nearest_mask, 0);
    }

    #[test]
    fn test_render_smoothing() {
        let table = SectionTable::standard();
        let mut render = RenderSmoother::new(&table);
        let mut targets = SectionMap::splat(0.0);
        targets[SectionKey::Dysbiosis] = 1.0;
        let settings = ParticleSettings::default();

        let u = render.update(&targets, &settings, 0.0, Mat4::IDENTITY, Mat4::IDENTITY, Vec2::ONE);
        assert!((render.color_weights()[7] - 0.01).abs() < 1e-6);
        assert!((u.focus - (5.1 + (7.1 - 5.1) * 0.1)).abs() < 1e-5);
        assert!((u.blur - (30.0 + ((5.6 - 4.5) * 9.0 - 30.0) * 0.1)).abs() < 1e-4);
        // Dysbiosis and inflammation sample with nearest filtering.
        assert_eq!(u.nearest_mask, (1 << 7) | (1 << 8));
    }
}
