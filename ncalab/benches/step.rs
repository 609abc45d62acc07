//! Single-step throughput of the growing update rule.

use burn::backend::NdArray;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ncalab::model::{GrowingNcaConfig, NcaModel};

fn bench_step(c: &mut Criterion) {
    let device = Default::default();
    let nca = GrowingNcaConfig::new()
        .with_num_hidden_channels(12)
        .init::<NdArray>(&device)
        .unwrap();
    let state = nca.seed(8, 32, 32, &device);

    c.bench_function("growing_step_8x32x32", |b| {
        b.iter(|| nca.step(black_box(state.clone())))
    });
}

criterion_group!(benches, bench_step);
criterion_main!(benches);
