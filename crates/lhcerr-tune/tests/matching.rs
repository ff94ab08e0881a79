use lhcerr_model::{build_demo_model, Expr, LatticeModel, OpticsEngine, TwissOptions};
use lhcerr_tune::{
    match_targets, staircase_match, LinearOptics, MatchOptions, MatchTarget, TargetKind, Vary,
};
use proptest::prelude::*;

fn demo() -> LatticeModel {
    build_demo_model().unwrap()
}

fn tune_varies(step: f64) -> [Vary; 4] {
    [
        Vary::new("kqtf.b1", step),
        Vary::new("kqtd.b1", step),
        Vary::new("ksf.b1", step),
        Vary::new("ksd.b1", step),
    ]
}

fn tune_targets(qx: f64, qy: f64, dqx: f64, dqy: f64, tolerance: f64) -> [MatchTarget; 4] {
    [
        MatchTarget::new(TargetKind::Qx, qx, tolerance),
        MatchTarget::new(TargetKind::Qy, qy, tolerance),
        MatchTarget::new(TargetKind::Dqx, dqx, tolerance),
        MatchTarget::new(TargetKind::Dqy, dqy, tolerance),
    ]
}

#[test]
fn a_linear_machine_matches_in_one_update() {
    let engine = LinearOptics::default();
    let mut model = demo();
    let varies = tune_varies(1.0e-5);
    let targets = tune_targets(62.31, 60.32, 3.0, 3.0, 1.0e-6);

    let outcome = match_targets(
        &engine,
        &mut model,
        "lhcb1",
        &varies,
        &targets,
        &MatchOptions::default(),
    )
    .unwrap();

    assert!(outcome.converged);
    assert_eq!(outcome.iterations, 1);
    // One evaluation per loop pass plus one response column per vary.
    assert_eq!(outcome.twiss_evaluations, 6);
    assert_eq!(outcome.residuals.len(), 4);

    let table = engine.twiss(&model, "lhcb1", &TwissOptions::new()).unwrap();
    assert!((table.qx - 62.31).abs() < 1.0e-8);
    assert!((table.qy - 60.32).abs() < 1.0e-8);
    assert!((table.dqx - 3.0).abs() < 1.0e-8);
    assert!((table.dqy - 3.0).abs() < 1.0e-8);
}

#[test]
fn matching_rejects_expression_varies() {
    let engine = LinearOptics::default();
    let mut model = demo();
    model.vars.set_expr("kqtf.b1", Expr::var("kqtf")).unwrap();

    let err = match_targets(
        &engine,
        &mut model,
        "lhcb1",
        &tune_varies(1.0e-5),
        &tune_targets(62.31, 60.32, 2.0, 2.0, 1.0e-6),
        &MatchOptions::default(),
    )
    .unwrap_err();

    assert_eq!(err.info().code, "vary-not-literal");
    assert_eq!(
        err.info().context.get("variable").map(String::as_str),
        Some("kqtf.b1")
    );
}

#[test]
fn empty_varies_or_targets_are_faults() {
    let engine = LinearOptics::default();
    let mut model = demo();
    let varies = tune_varies(1.0e-5);
    let targets = tune_targets(62.31, 60.32, 2.0, 2.0, 1.0e-6);

    let err = match_targets(
        &engine,
        &mut model,
        "lhcb1",
        &[],
        &targets,
        &MatchOptions::default(),
    )
    .unwrap_err();
    assert_eq!(err.info().code, "no-varies");

    let err = match_targets(
        &engine,
        &mut model,
        "lhcb1",
        &varies,
        &[],
        &MatchOptions::default(),
    )
    .unwrap_err();
    assert_eq!(err.info().code, "no-targets");
}

#[test]
fn powering_limits_clamp_the_update() {
    let engine = LinearOptics::default();
    let mut model = demo();
    let varies = [Vary::new("cmrs.b1", 1.0e-6).with_limits(-5.0e-3, 5.0e-3)];
    let targets = [MatchTarget::new(TargetKind::CMinusRe, 1.0e-2, 1.0e-6)];
    let options = MatchOptions {
        max_iterations: 4,
        ..MatchOptions::default()
    };

    let outcome = match_targets(&engine, &mut model, "lhcb1", &varies, &targets, &options).unwrap();

    assert!(!outcome.converged);
    assert_eq!(outcome.iterations, 4);
    let trim = model.vars.value_or("cmrs.b1", 0.0);
    assert!((trim - 5.0e-3).abs() < 1.0e-12);
    // Half the request is all the powering allows.
    assert!((outcome.penalty - 5.0e-3).abs() < 1.0e-9);
}

#[test]
fn unresponsive_varies_spin_without_converging() {
    let engine = LinearOptics::default();
    let mut model = demo();
    let varies = [Vary::new("kqt_ghost", 1.0e-5)];
    let targets = [MatchTarget::new(TargetKind::Qx, 62.31, 1.0e-6)];
    let options = MatchOptions {
        max_iterations: 3,
        ..MatchOptions::default()
    };

    let outcome = match_targets(&engine, &mut model, "lhcb1", &varies, &targets, &options).unwrap();

    assert!(!outcome.converged);
    assert_eq!(outcome.iterations, 3);
    // The damped solve returns a zero step for a dead circuit.
    assert_eq!(model.vars.value_or("kqt_ghost", 1.0), 0.0);
}

#[test]
fn the_staircase_always_runs_its_first_stage_then_skips_satisfied_ones() {
    let engine = LinearOptics::default();
    let mut model = demo();
    let varies = tune_varies(1.0e-5);
    let targets = tune_targets(62.31, 60.32, 3.0, 3.0, 1.0e-3);
    let ladder = [1.0e-3, 1.0e-4, 1.0e-6];

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

    assert_eq!(stages.len(), 3);
    assert_eq!(stages[0].tolerance, 1.0e-3);
    assert!(!stages[0].skipped);
    let first = stages[0].outcome.as_ref().unwrap();
    assert!(first.converged);
    // The linear response leaves essentially no penalty, so the tighter
    // stages are satisfied before they run.
    assert!(stages[1].skipped && stages[2].skipped);
    assert!(stages[1].outcome.is_none() && stages[2].outcome.is_none());
    assert_eq!(stages[2].tolerance, 1.0e-6);
}

#[test]
fn an_empty_ladder_is_a_fault() {
    let engine = LinearOptics::default();
    let mut model = demo();

    let err = staircase_match(
        &engine,
        &mut model,
        "lhcb1",
        &tune_varies(1.0e-5),
        &tune_targets(62.31, 60.32, 2.0, 2.0, 1.0e-6),
        &[],
        &MatchOptions::default(),
    )
    .unwrap_err();

    assert_eq!(err.info().code, "empty-ladder");
}

#[test]
fn target_kinds_serialize_in_snake_case() {
    assert_eq!(
        serde_json::to_string(&TargetKind::CMinusRe).unwrap(),
        "\"c_minus_re\""
    );
    let kind: TargetKind = serde_json::from_str("\"dqx\"").unwrap();
    assert_eq!(kind, TargetKind::Dqx);
}

proptest! {
    #[test]
    fn any_nearby_working_point_is_reached(
        qx in 62.05f64..62.45,
        qy in 60.05f64..60.45,
        dqx in -5.0f64..5.0,
        dqy in -5.0f64..5.0,
    ) {
        let engine = LinearOptics::default();
        let mut model = demo();
        let varies = tune_varies(1.0e-5);
        let targets = tune_targets(qx, qy, dqx, dqy, 1.0e-7);

        let outcome = match_targets(
            &engine,
            &mut model,
            "lhcb1",
            &varies,
            &targets,
            &MatchOptions::default(),
        )
        .unwrap();

        prop_assert!(outcome.converged);
        let table = engine.twiss(&model, "lhcb1", &TwissOptions::new()).unwrap();
        prop_assert!((table.qx - qx).abs() <= 1.0e-6);
        prop_assert!((table.qy - qy).abs() <= 1.0e-6);
        prop_assert!((table.dqx - dqx).abs() <= 1.0e-6);
        prop_assert!((table.dqy - dqy).abs() <= 1.0e-6);
    }
}
