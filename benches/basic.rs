use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tinfit::{Config, HeightField, Simplifier};

fn terrain(n: usize) -> HeightField {
    let z = (0..n * n)
        .map(|i| {
            let x = (i % n) as f64;
            let y = (i / n) as f64;
            (((x / 9.0).sin() * (y / 7.0).cos() + 1.0) * 500.0) as u16
        })
        .collect();
    HeightField::new(n, n, z, None)
}

fn refine_benchmark(c: &mut Criterion) {
    let hf = terrain(64);
    c.bench_function("refine 64x64 to 100 vertices", |b| {
        b.iter(|| {
            let mut s = Simplifier::new(black_box(&hf), Config::default()).unwrap();
            s.select_new_points(100).unwrap()
        })
    });

    let config = Config {
        datadep: true,
        qual_thresh: 0.5,
        alpha: 0.5,
        ..Config::default()
    };
    c.bench_function("data-dependent 64x64 to 100 vertices", |b| {
        b.iter(|| {
            let mut s = Simplifier::new(black_box(&hf), config.clone()).unwrap();
            s.select_new_points(100).unwrap()
        })
    });
}

criterion_group!(benches, refine_benchmark);
criterion_main!(benches);
