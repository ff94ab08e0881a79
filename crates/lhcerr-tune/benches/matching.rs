use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lhcerr_model::{build_demo_model, OpticsEngine, TwissOptions};
use lhcerr_tune::{
    staircase_match, tune_line, LinearOptics, MatchOptions, MatchTarget, TargetKind, TuneOptions,
    Vary, WorkingPoint,
};

fn matching_bench(c: &mut Criterion) {
    let engine = LinearOptics::default();
    let base = build_demo_model().unwrap();

    c.bench_function("linear_twiss", |b| {
        b.iter(|| {
            let table = engine.twiss(&base, "lhcb1", &TwissOptions::new()).unwrap();
            black_box(table);
        });
    });

    c.bench_function("staircase_tune_match", |b| {
        let varies = [
            Vary::new("kqtf.b1", 1.0e-5),
            Vary::new("kqtd.b1", 1.0e-5),
            Vary::new("ksf.b1", 1.0e-5),
            Vary::new("ksd.b1", 1.0e-5),
        ];
        let targets = [
            MatchTarget::new(TargetKind::Qx, 62.31, 1.0e-6),
            MatchTarget::new(TargetKind::Qy, 60.32, 1.0e-6),
            MatchTarget::new(TargetKind::Dqx, 3.0, 1.0e-6),
            MatchTarget::new(TargetKind::Dqy, 3.0, 1.0e-6),
        ];
        let ladder = [1.0e-4, 1.0e-6];
        b.iter(|| {
            let mut model = base.clone();
            let stages = staircase_match(
                &engine,
                &mut model,
                "lhcb1",
                &varies,
                &targets,
                &ladder,
                &MatchOptions::default(),
            )
            .unwrap();
            black_box(stages);
        });
    });

    c.bench_function("tune_line_demo", |b| {
        let working_point = WorkingPoint::default();
        let options = TuneOptions::default();
        b.iter(|| {
            let mut model = base.clone();
            let report = tune_line(&engine, &mut model, "lhcb1", &working_point, None, &options)
                .unwrap();
            black_box(report);
        });
    });
}

criterion_group!(benches, matching_bench);
criterion_main!(benches);
