use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::{Rng, SeedableRng};

use rustfp::ring_buffer::DyadicRingBuffer;
use rustfp::{
    estimate_drift, extract_peaks_by_adaptive_clustering, extract_peaks_by_gap, AdaptiveClustering,
    DriftSearch, SimulatedFabryPerot, SimulationSetup, WaveformSource,
};

// three fringes of six samples each, 10 kHz sampling
fn fringe_samples(rng: &mut impl Rng) -> Vec<f64> {
    let mut out = Vec::with_capacity(18);
    for centre in [0.004, 0.021, 0.037] {
        let jitter = rng.gen_range(-1.0e-4..1.0e-4);
        out.extend((0..6).map(|i| centre + jitter + f64::from(i) * 1.0e-4));
    }
    out
}

pub fn drift_search(c: &mut Criterion) {
    let prev = [0.0125, 0.0292, 0.0458];
    let curr = [0.0131, 0.0298, 0.0464];
    let search = DriftSearch::new(0.05);
    c.bench_function("drift search 2000 candidates", |b| {
        b.iter(|| estimate_drift(black_box(&prev), black_box(&curr), &search, None))
    });
    let fine = search.resolution(20_000);
    c.bench_function("drift search 20000 candidates", |b| {
        b.iter(|| estimate_drift(black_box(&prev), black_box(&curr), &fine, None))
    });
}

pub fn clustering(c: &mut Criterion) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(1);
    let samples = fringe_samples(&mut rng);
    c.bench_function("gap clustering", |b| {
        b.iter(|| extract_peaks_by_gap(black_box(&samples), 0.008))
    });
    let setup = AdaptiveClustering::new();
    c.bench_function("adaptive clustering k=5..2", |b| {
        b.iter(|| extract_peaks_by_adaptive_clustering(black_box(&samples), 0.008, &setup))
    });
}

pub fn simulated_sweep(c: &mut Criterion) {
    let mut sim = match SimulatedFabryPerot::new(SimulationSetup::default()) {
        Ok(sim) => sim,
        Err(e) => panic!("default simulation rejected: {e}"),
    };
    c.bench_function("simulated sweep + threshold", |b| {
        b.iter(|| {
            if let Ok(Some(sweep)) = sim.next_sweep() {
                black_box(sweep.threshold(1.0).ok());
            }
        })
    });
}

pub fn drift_log(c: &mut Criterion) {
    c.bench_function("drift log 2^16 push + stats", |b| {
        b.iter(|| {
            let mut log = DyadicRingBuffer::<f64>::new(16).unwrap();
            for i in 0..100_000u32 {
                log.push(f64::from(i));
            }
            black_box(log.mean_variance())
        })
    });
}

criterion_group!(benches, drift_search, clustering, simulated_sweep, drift_log);
criterion_main!(benches);
