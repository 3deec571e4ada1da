// ─────────────────────────────────────────────────────────────────────
// SCPN UQ Core — Surplus Computation Benchmark
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────

use criterion::{criterion_group, criterion_main, Criterion};
use ndarray::Array1;
use uq_core::HierarchInterpExpansion;
use uq_grid::driver::HierarchSparseGridDriver;
use uq_grid::sample::{SamplePoint, SampleStore};
use uq_types::config::ExpansionConfig;

const NUM_VARS: usize = 3;
const LEVEL: usize = 3;

fn response(x: &[f64]) -> f64 {
    (x[0] + 0.5 * x[1]).exp() * (1.0 + x[2] * x[2])
}

fn samples_for(driver: &HierarchSparseGridDriver) -> SampleStore {
    let h = driver.active_hierarchy();
    let bases = driver.bases();
    let mut pts: Vec<(usize, Vec<f64>)> = Vec::new();
    for lev in 0..h.num_levels() {
        for set in 0..h.num_sets(lev) {
            for pt in 0..h.num_points(lev, set) {
                pts.push((h.sample_index(lev, set, pt), h.point(&bases, lev, set, pt)));
            }
        }
    }
    pts.sort_by_key(|(i, _)| *i);
    let mut store = SampleStore::new();
    for (_, x) in pts {
        let v = response(&x);
        store.push(SamplePoint::new(Array1::from(x), v));
    }
    store
}

/// Benchmark: full surplus computation on an isotropic level-3 grid in 3-D
/// after one adaptive trial set.
fn bench_full_compute(c: &mut Criterion) {
    let config = ExpansionConfig::new(NUM_VARS);
    let mut driver = HierarchSparseGridDriver::from_config(&config).unwrap();
    driver.initialize_isotropic(LEVEL).unwrap();
    driver.increment_set(&[LEVEL + 1, 0, 0]).unwrap();
    let samples = samples_for(&driver);

    c.bench_function("bench_surplus_full_compute", |b| {
        b.iter(|| {
            let mut e = HierarchInterpExpansion::new(config.clone()).unwrap();
            e.allocate_arrays(&driver).unwrap();
            e.compute_coefficients(&driver, &samples).unwrap();
            std::hint::black_box(e)
        })
    });
}

/// Benchmark: the same trial set added incrementally, then withdrawn so the
/// next iteration starts from the same state.
fn bench_incremental_trial(c: &mut Criterion) {
    let config = ExpansionConfig::new(NUM_VARS);
    let mut driver = HierarchSparseGridDriver::from_config(&config).unwrap();
    driver.initialize_isotropic(LEVEL).unwrap();
    let mut engine = HierarchInterpExpansion::new(config).unwrap();
    engine.allocate_arrays(&driver).unwrap();
    engine
        .compute_coefficients(&driver, &samples_for(&driver))
        .unwrap();
    let trial = vec![LEVEL + 1, 0, 0];

    c.bench_function("bench_surplus_incremental_trial", |b| {
        b.iter(|| {
            driver.increment_set(&trial).unwrap();
            let samples = samples_for(&driver);
            engine.increment_coefficients(&driver, &samples).unwrap();
            let dm = engine.delta_mean(&driver).unwrap();
            driver.pop_set().unwrap();
            engine.decrement_coefficients(&driver).unwrap();
            engine.clear_popped();
            driver.clear_popped();
            std::hint::black_box(dm)
        })
    });
}

criterion_group!(benches, bench_full_compute, bench_incremental_trial);
criterion_main!(benches);
