// ─────────────────────────────────────────────────────────────────────
// SSM Kernel — Entropy Engine Benchmarks
// ─────────────────────────────────────────────────────────────────────
//! Criterion benchmarks for the per-iteration hot path:
//!   - Feature matrix assembly
//!   - Jacobi eigensolver on the Gram matrix
//!   - Update computation in both formulations
//!   - Full before_iteration + evaluate sweep + after_iteration

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use ssm_entropy::covariance::compute_updates;
use ssm_entropy::{assemble, FeatureLayout, GeneralEntropyGradient, SymmetricEigen, VectorFunction};
use ssm_particles::{Domain, ParticleSystem, Point3};
use ssm_types::{CovarianceForm, EntropyConfig};

const SHAPES: usize = 32;
const PARTICLES: usize = 256;

// ── Helpers ───────────────────────────────────────────────────────────

fn make_population() -> ParticleSystem {
    let mut ps = ParticleSystem::new();
    for s in 0..SHAPES {
        let positions: Vec<Point3> = (0..PARTICLES)
            .map(|p| {
                let t = p as f64 * 0.05;
                let r = 1.0 + 0.1 * ((s * 13 + p) as f64 * 0.31).sin();
                [r * t.cos(), r * t.sin(), 0.02 * (s as f64)]
            })
            .collect();
        ps.add_domain(Domain::from_positions(&positions));
    }
    ps
}

fn make_config(form: CovarianceForm) -> EntropyConfig {
    EntropyConfig {
        covariance_form: form,
        minimum_variance: 1e-3,
        ..EntropyConfig::default()
    }
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_assemble(c: &mut Criterion) {
    let ps = make_population();
    let layout = FeatureLayout::new(&EntropyConfig::default(), &ps).unwrap();
    c.bench_function("assemble_768x32", |b| {
        b.iter(|| assemble(black_box(&layout), black_box(&ps)).unwrap())
    });
}

fn bench_eigen_gram(c: &mut Criterion) {
    let n = SHAPES;
    let a: Vec<f64> = (0..n * n)
        .map(|k| {
            let (i, j) = (k / n, k % n);
            if i == j {
                n as f64
            } else {
                1.0 / (1.0 + (i as f64 - j as f64).abs())
            }
        })
        .collect();
    c.bench_function("jacobi_eigen_32x32", |b| {
        b.iter(|| SymmetricEigen::decompose(black_box(&a), n).unwrap())
    });
}

fn bench_updates_gram(c: &mut Criterion) {
    let ps = make_population();
    let cfg = make_config(CovarianceForm::Gram);
    let layout = FeatureLayout::new(&cfg, &ps).unwrap();
    let y = assemble(&layout, &ps).unwrap();
    c.bench_function("updates_gram_768x32", |b| {
        b.iter(|| compute_updates(black_box(&y), 1e-3, &cfg))
    });
}

fn bench_updates_covariance_small(c: &mut Criterion) {
    // Covariance form only pays off when dims < samples
    let mut ps = ParticleSystem::new();
    for s in 0..SHAPES {
        let o = s as f64 * 0.1;
        ps.add_domain(Domain::from_positions(&[
            [o.sin(), o.cos(), o],
            [o.cos(), 0.5 * o, o.sin()],
        ]));
    }
    let cfg = make_config(CovarianceForm::Covariance);
    let layout = FeatureLayout::new(&cfg, &ps).unwrap();
    let y = assemble(&layout, &ps).unwrap();
    c.bench_function("updates_covariance_6x32", |b| {
        b.iter(|| compute_updates(black_box(&y), 1e-3, &cfg))
    });
}

fn bench_full_iteration(c: &mut Criterion) {
    let ps = make_population();
    let mut f = GeneralEntropyGradient::new(make_config(CovarianceForm::Auto)).unwrap();
    c.bench_function("full_iteration_32_shapes_256_particles", |b| {
        b.iter(|| {
            f.before_iteration(&ps).unwrap();
            let mut acc = 0.0;
            for d in 0..SHAPES {
                for p in 0..PARTICLES {
                    acc += f.evaluate(&ps, d, p).unwrap().gradient[0];
                }
            }
            f.after_iteration();
            black_box(acc)
        })
    });
}

criterion_group!(assembly, bench_assemble,);

criterion_group!(
    spectral,
    bench_eigen_gram,
    bench_updates_gram,
    bench_updates_covariance_small,
);

criterion_group!(engine, bench_full_iteration,);

criterion_main!(assembly, spectral, engine);
