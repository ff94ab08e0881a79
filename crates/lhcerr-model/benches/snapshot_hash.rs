use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lhcerr_model::{build_demo_model, model_content_hash, ModelSnapshot};

fn bench_snapshot(c: &mut Criterion) {
    let model = build_demo_model().expect("demo model");

    c.bench_function("model_content_hash", |b| {
        b.iter(|| model_content_hash(black_box(&model)).expect("hash"))
    });

    c.bench_function("snapshot_capture_and_encode", |b| {
        b.iter(|| {
            ModelSnapshot::capture(black_box(&model), "bench", Some(1))
                .expect("capture")
                .to_json_bytes()
                .expect("encode")
        })
    });

    let bytes = ModelSnapshot::capture(&model, "bench", Some(1))
        .expect("capture")
        .to_json_bytes()
        .expect("encode");
    c.bench_function("snapshot_decode_and_restore", |b| {
        b.iter(|| {
            ModelSnapshot::from_json_bytes(black_box(&bytes))
                .expect("decode")
                .into_model()
                .expect("restore")
        })
    });
}

criterion_group!(benches, bench_snapshot);
criterion_main!(benches);
