/// Spectral detection overhead benchmarks
///
/// Measures `detect` cost as class count and feature width grow, to catch
/// regressions in the per-class partition and power-iteration paths.
use aprender::primitives::Matrix;
use centinela::SpectralSignatureDetector;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Deterministic synthetic dataset: `n_classes` clusters with mild spread
/// plus a handful of far-out rows per class.
fn build_dataset(
    samples_per_class: usize,
    n_classes: usize,
    n_features: usize,
) -> (Matrix<f32>, Vec<i32>) {
    let mut rng = StdRng::seed_from_u64(7);
    let n_samples = samples_per_class * n_classes;
    let mut data = Vec::with_capacity(n_samples * n_features);
    let mut labels = Vec::with_capacity(n_samples);

    for class in 0..n_classes {
        for sample in 0..samples_per_class {
            let offset = if sample % 17 == 0 { 8.0 } else { 0.0 };
            for _ in 0..n_features {
                data.push(class as f32 + offset + rng.gen_range(-1.0f32..1.0));
            }
            labels.push(class as i32);
        }
    }

    (
        Matrix::from_vec(n_samples, n_features, data).unwrap(),
        labels,
    )
}

fn bench_detect(c: &mut Criterion) {
    let mut group = c.benchmark_group("spectral_detect");

    for (samples, classes, features) in [(128, 2, 32), (256, 4, 64), (512, 8, 64)] {
        let (matrix, labels) = build_dataset(samples, classes, features);
        let detector = SpectralSignatureDetector::default();

        group.bench_function(
            BenchmarkId::from_parameter(format!("{samples}x{classes}x{features}")),
            |b| {
                b.iter(|| {
                    detector
                        .detect(black_box(&matrix), black_box(&labels))
                        .unwrap()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_detect);
criterion_main!(benches);
