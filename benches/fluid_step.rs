//! Benchmarks for the CPU reference passes.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::{Mat4, Vec2};

use vatflow::config::{FluidSettings, ParticleSettings};
use vatflow::fluid::CpuFluidSolver;
use vatflow::input::PointerSample;
use vatflow::particles::{CpuParticleSim, SimSmoother};
use vatflow::section::{SectionMap, SectionTable};

fn bench_fluid_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("fluid_step");

    for (width, height) in [(320, 180), (800, 600)] {
        group.bench_with_input(
            BenchmarkId::new("viewport", format!("{width}x{height}")),
            &(width, height),
            |b, &(width, height)| {
                let mut solver = CpuFluidSolver::new(&FluidSettings::default(), width, height);
                let mut t = 0.0f32;
                b.iter(|| {
                    t += 0.016;
                    let pointer = PointerSample::new(Vec2::new(t.sin(), t.cos()) * 0.5, false);
                    black_box(solver.step(pointer, 0.016));
                })
            },
        );
    }

    for iterations in [1, 20] {
        group.bench_with_input(
            BenchmarkId::new("pressure_iterations", iterations),
            &iterations,
            |b, &iterations| {
                let settings = FluidSettings::default().with_pressure_iterations(iterations);
                let mut solver = CpuFluidSolver::new(&settings, 320, 180);
                b.iter(|| black_box(solver.step(PointerSample::default(), 0.016)))
            },
        );
    }

    group.finish();
}

fn bench_particle_step(c: &mut Criterion) {
    let settings = ParticleSettings::default();
    let table = SectionTable::standard();
    let mut smoother = SimSmoother::new(&table);
    let weights = SectionMap::splat(0.0);
    let uniforms = smoother.update(&weights, &settings, 1.0, 1.0, Mat4::IDENTITY);
    let mut sim = CpuParticleSim::new(&settings);

    let mut frame = 0u64;
    c.bench_function("particle_step", |b| {
        b.iter(|| {
            frame += 1;
            sim.step(frame, black_box(&uniforms), None)
        })
    });
}

criterion_group!(benches, bench_fluid_step, bench_particle_step);
criterion_main!(benches);
