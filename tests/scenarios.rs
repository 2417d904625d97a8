//! End-to-end scenarios over the CPU side of a frame.

use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use glam::{Vec2, Vec4};

use vatflow::config::{Config, FluidSettings};
use vatflow::fluid::{pointer_velocity_kernel, CpuFluidSolver, FluidInputs};
use vatflow::input::PointerSample;
use vatflow::registry::{AssetSource, FetchRequest, LoadCompletion, LoadState, TextureKind};
use vatflow::scene::{Scene, SectionSignal};
use vatflow::section::{SectionKey, SectionTable};
use vatflow::textures::TextureData;
use vatflow::tween::Transport;

/// Holds fetches until the test resolves them.
#[derive(Clone, Default)]
struct DeferredSource {
    pending: Arc<Mutex<Vec<(FetchRequest, Sender<LoadCompletion>)>>>,
}

impl AssetSource for DeferredSource {
    fn fetch(&mut self, request: FetchRequest, reply: Sender<LoadCompletion>) {
        self.pending.lock().unwrap().push((request, reply));
    }
}

impl DeferredSource {
    fn requests_for(&self, key: SectionKey, kind: TextureKind) -> usize {
        self.pending
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| r.ticket.key == key && r.ticket.kind == kind)
            .count()
    }

    fn resolve(&self, key: SectionKey, kind: TextureKind) {
        let mut pending = self.pending.lock().unwrap();
        let i = pending
            .iter()
            .position(|(r, _)| r.ticket.key == key && r.ticket.kind == kind)
            .unwrap();
        let (request, reply) = pending.remove(i);
        reply
            .send(LoadCompletion {
                ticket: request.ticket,
                result: Ok(TextureData::placeholder()),
            })
            .unwrap();
    }
}

fn pointer(x: f32, y: f32) -> PointerSample {
    PointerSample::new(Vec2::new(x, y), false)
}

#[test]
fn test_pointer_drag_splats_velocity_to_the_right() {
    let settings = FluidSettings::default().with_velocity_multiplier(10.0);

    // Injection stage alone: the splat peak is the scaled pointer delta
    // times the profile peak e.
    let mut inputs = FluidInputs::new(&settings);
    inputs.frame(pointer(0.0, 0.0), 0.016);
    let frame = inputs.frame(pointer(0.5, 0.0), 0.016);
    assert!((frame.delta - Vec2::new(5.0, 0.0)).length() < 1e-5);
    let center = Vec2::new(0.75, 0.5);
    let peak = pointer_velocity_kernel(Vec4::ZERO, center, &frame, 1.0, inputs.settings());
    let expected = 5.0 * std::f32::consts::E;
    assert!((peak.x - expected).abs() < 1e-3, "peak {} vs {}", peak.x, expected);
    assert!(peak.y.abs() < 1e-6);

    // Whole solver step: the disturbance sits right of centre and points right.
    let mut solver = CpuFluidSolver::new(&settings, 128, 128);
    solver.step(pointer(0.0, 0.0), 0.016);
    let fields = solver.step(pointer(0.5, 0.0), 0.016);
    let (x, y) = fields.velocity.argmax_xy();
    assert!(x >= fields.velocity.width() / 2);
    assert!(fields.velocity.get(x, y).x > 0.0);
    assert!(fields.velocity.max_xy_magnitude() > 1.0);
}

#[test]
fn test_deferred_load_fades_in_active_section_once() {
    let source = DeferredSource::default();
    let mut scene = Scene::new(&Config::default(), SectionTable::standard(), Box::new(source.clone()));
    scene.resize(800, 600);

    scene.handle_signal(SectionSignal::Scroll {
        key: SectionKey::Dna,
        index: 2,
        active: true,
    });
    // A second request while loading does not fetch again.
    scene.handle_signal(SectionSignal::Select(SectionKey::Dna));
    assert_eq!(source.requests_for(SectionKey::Dna, TextureKind::Position), 1);

    let dt = 0.05;
    for _ in 0..10 {
        scene.step(dt, PointerSample::default());
        assert_eq!(scene.blend().weight(SectionKey::Dna), 0.0);
        assert_eq!(scene.blend().tween_state(SectionKey::Dna), Some(Transport::Paused));
    }

    source.resolve(SectionKey::Dna, TextureKind::Position);

    let mut resumes = 0;
    let mut last_state = scene.blend().tween_state(SectionKey::Dna);
    let mut last_weight = 0.0;
    let mut weights = Vec::new();
    for _ in 0..40 {
        scene.step(dt, PointerSample::default());
        let state = scene.blend().tween_state(SectionKey::Dna);
        if last_state == Some(Transport::Paused) && state == Some(Transport::Playing) {
            resumes += 1;
        }
        assert_ne!(state, Some(Transport::Paused));
        last_state = state;

        let weight = scene.blend().weight(SectionKey::Dna);
        assert!(weight >= last_weight);
        last_weight = weight;
        weights.push(weight);
    }

    assert_eq!(resumes, 1);
    assert_eq!(scene.registry().state(SectionKey::Dna), LoadState::Loaded);
    // Still inside the 0.1 delay after the first step.
    assert!(weights[0] < 1e-6);
    // Not finished 1.5 time units after resuming.
    assert!(weights[29] < 1.0);
    assert_eq!(weights[39], 1.0);
}

#[test]
fn test_degenerate_viewport_recovers() {
    let settings = FluidSettings::default();
    let mut solver = CpuFluidSolver::new(&settings, 800, 600);
    let full = solver.grid();
    assert_eq!((full.width, full.height), (400, 300));

    solver.resize(1, 1);
    let tiny = solver.grid();
    assert_eq!((tiny.width, tiny.height), (1, 1));
    solver.step(pointer(0.0, 0.0), 0.016);
    let fields = solver.step(pointer(0.4, 0.4), 0.016);
    assert_eq!(fields.velocity.texels().len(), 1);
    assert!(fields.velocity.texels().iter().all(|t| t.is_finite()));

    solver.resize(800, 600);
    assert_eq!(solver.grid(), full);
    solver.step(pointer(0.0, 0.0), 0.016);
    let fields = solver.step(pointer(0.2, 0.0), 0.016);
    assert!(fields.velocity.max_xy_magnitude() > 0.0);

    let mut scene = Scene::new(&Config::default(), SectionTable::standard(), Box::new(DeferredSource::default()));
    scene.resize(1, 1);
    let state = scene.step(0.016, PointerSample::default());
    assert!(state.view_proj.is_finite());
    assert_eq!(state.render.viewport, [1.0, 1.0]);
    scene.resize(800, 600);
    let state = scene.step(0.016, PointerSample::default());
    assert_eq!(state.render.viewport, [800.0, 600.0]);
}
