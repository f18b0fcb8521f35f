use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use knn_pipeline::decomposition::{KernelPCA, KernelPCAConfig};
use knn_pipeline::training::{KNNClassifier, KNNConfig};
use ndarray::{Array1, Array2};
use rand::prelude::*;

fn create_data(n_rows: usize, n_features: usize) -> (Array2<f64>, Array1<i64>) {
    let mut rng = StdRng::seed_from_u64(42);
    let x = Array2::from_shape_fn((n_rows, n_features), |_| rng.gen::<f64>() * 2.0 - 1.0);
    let y = Array1::from_shape_fn(n_rows, |i| (i % 2) as i64);
    (x, y)
}

fn bench_kernel_pca(c: &mut Criterion) {
    let mut group = c.benchmark_group("kernel_pca");
    group.sample_size(10);

    for n_rows in [128, 256, 512].iter() {
        let (x, _) = create_data(*n_rows, 150);

        group.bench_with_input(BenchmarkId::new("fit", n_rows), &x, |b, x| {
            b.iter(|| {
                let mut kpca = KernelPCA::new(KernelPCAConfig::new(90));
                kpca.fit(black_box(x), None).unwrap()
            })
        });
    }

    group.finish();
}

fn bench_knn_predict(c: &mut Criterion) {
    let mut group = c.benchmark_group("knn_predict");

    let (x_train, y_train) = create_data(256, 90);
    let (x_test, _) = create_data(64, 90);

    for n_jobs in [1usize, 0].iter() {
        let mut knn = KNNClassifier::new(KNNConfig {
            n_jobs: *n_jobs,
            ..Default::default()
        });
        knn.fit(&x_train, &y_train).unwrap();

        group.bench_with_input(BenchmarkId::new("n_jobs", n_jobs), &x_test, |b, x| {
            b.iter(|| knn.predict(black_box(x)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_kernel_pca, bench_knn_predict);
criterion_main!(benches);
