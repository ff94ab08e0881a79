use lhcerr_core::TwissMethod;
use lhcerr_model::{build_demo_model, Expr, OpticsEngine, TwissOptions, VarDef};
use lhcerr_tune::{
    install_correction_terms, select_steering, tune_line, LinearOptics, TuneOptions, WorkingPoint,
};

#[test]
fn a_line_is_tuned_onto_its_working_point() {
    let engine = LinearOptics::default();
    let mut model = build_demo_model().unwrap();
    let working_point = WorkingPoint {
        qx: 62.31,
        qy: 60.32,
        dqx: 3.0,
        dqy: 3.0,
        c_minus: 1.0e-3,
        ..WorkingPoint::default()
    };

    let report = tune_line(
        &engine,
        &mut model,
        "lhcb1",
        &working_point,
        None,
        &TuneOptions::default(),
    )
    .unwrap();

    assert_eq!(report.line, "lhcb1");
    assert!(report.steering.is_none());
    assert!((report.qx - 62.31).abs() < 1.0e-6);
    assert!((report.qy - 60.32).abs() < 1.0e-6);
    assert!((report.dqx - 3.0).abs() < 1.0e-6);
    assert!((report.dqy - 3.0).abs() < 1.0e-6);
    assert!((report.c_minus_re - 1.0e-3).abs() < 1.0e-6);
    assert!(report.c_minus_im.abs() < 1.0e-6);

    // The ladder runs once; the tighter stages are already satisfied.
    assert_eq!(report.tune_stages.len(), 4);
    assert!(!report.tune_stages[0].skipped);
    assert!(report.tune_stages[1..].iter().all(|stage| stage.skipped));
    // The re-match finds nothing left to do after the coupling trim.
    let retune = report.retune_stages[0].outcome.as_ref().unwrap();
    assert!(retune.converged);
    assert_eq!(retune.iterations, 0);

    // Trims landed on the beam-1 circuits only.
    assert!(model.vars.value_or("kqtf.b1", 0.0) != 0.0);
    assert!(model.vars.value_or("cmrs.b1", 0.0) != 0.0);
    assert_eq!(model.vars.value_or("kqtf.b2", 1.0), 0.0);
}

#[test]
fn the_method_override_is_scoped_to_a_stored_method() {
    let engine = LinearOptics::default();

    // A line that had no stored method keeps the 4d override.
    let mut model = build_demo_model().unwrap();
    tune_line(
        &engine,
        &mut model,
        "lhcb1",
        &WorkingPoint::default(),
        None,
        &TuneOptions::default(),
    )
    .unwrap();
    assert_eq!(
        model.line("lhcb1").unwrap().twiss_method,
        Some(TwissMethod::FourD)
    );
    assert_eq!(model.line("lhcb2").unwrap().twiss_method, None);

    // A stored method is put back after the run.
    let mut model = build_demo_model().unwrap();
    model.line_mut("lhcb1").unwrap().twiss_method = Some(TwissMethod::SixD);
    tune_line(
        &engine,
        &mut model,
        "lhcb1",
        &WorkingPoint::default(),
        None,
        &TuneOptions::default(),
    )
    .unwrap();
    assert_eq!(
        model.line("lhcb1").unwrap().twiss_method,
        Some(TwissMethod::SixD)
    );
}

#[test]
fn octupole_and_phase_settings_apply_only_when_non_zero() {
    let engine = LinearOptics::default();
    let mut model = build_demo_model().unwrap();
    let parked = WorkingPoint {
        octupole_current: Some(0.0),
        phase_knob: Some(0.0),
        ..WorkingPoint::default()
    };
    tune_line(
        &engine,
        &mut model,
        "lhcb1",
        &parked,
        None,
        &TuneOptions::default(),
    )
    .unwrap();
    assert!(!model.vars.contains("i_mo"));
    assert!(!model.vars.contains("phase_change"));

    let lively = WorkingPoint {
        octupole_current: Some(40.0),
        phase_knob: Some(1.7),
        ..WorkingPoint::default()
    };
    tune_line(
        &engine,
        &mut model,
        "lhcb1",
        &lively,
        None,
        &TuneOptions::default(),
    )
    .unwrap();
    assert_eq!(model.vars.value_or("i_mo", 0.0), 40.0);
    // Phase trims only move in whole knob units.
    assert_eq!(model.vars.value_or("phase_change", 0.0), 1.0);
}

#[test]
fn re_rooted_circuits_move_their_bare_knob_instead() {
    let engine = LinearOptics::default();
    let mut model = build_demo_model().unwrap();
    // A folded correction re-roots the circuit onto the bare knob.
    model.vars.set("kqtf", 0.0);
    model.vars.set_expr("kqtf.b1", Expr::var("kqtf")).unwrap();

    tune_line(
        &engine,
        &mut model,
        "lhcb1",
        &WorkingPoint::default(),
        None,
        &TuneOptions::default(),
    )
    .unwrap();

    assert!(matches!(
        model.vars.get("kqtf.b1"),
        Some(VarDef::Expression(_))
    ));
    assert!(model.vars.value_or("kqtf", 0.0) != 0.0);
    // The untouched circuits are trimmed directly.
    assert!(matches!(
        model.vars.get("kqtd.b1"),
        Some(VarDef::Literal(_))
    ));
}

#[test]
fn an_unreachable_coupling_target_is_a_stage_fault() {
    let engine = LinearOptics::default();
    let mut model = build_demo_model().unwrap();
    let unreachable = WorkingPoint {
        c_minus: 1.0,
        ..WorkingPoint::default()
    };

    let err = tune_line(
        &engine,
        &mut model,
        "lhcb1",
        &unreachable,
        None,
        &TuneOptions::default(),
    )
    .unwrap_err();

    assert_eq!(err.info().code, "not-converged");
    assert_eq!(
        err.info().context.get("stage").map(String::as_str),
        Some("coupling")
    );
    assert_eq!(
        err.info().context.get("line").map(String::as_str),
        Some("lhcb1")
    );
}

#[test]
fn an_orbit_reference_adds_a_steering_stage() {
    let engine = LinearOptics::default();
    let mut model = build_demo_model().unwrap();
    select_steering(&mut model).unwrap();
    install_correction_terms(&mut model).unwrap();
    model
        .line_mut("lhcb1")
        .unwrap()
        .element_mut("mb.a2r6.b1")
        .unwrap()
        .accumulate_error(0, false, 2.0e-5);
    let reference = engine
        .twiss(&model, "lhcb1", &TwissOptions::new().with_errors(false))
        .unwrap();

    let report = tune_line(
        &engine,
        &mut model,
        "lhcb1",
        &WorkingPoint::default(),
        Some(&reference),
        &TuneOptions::default(),
    )
    .unwrap();

    let steering = report.steering.unwrap();
    assert!(steering.rms_x_before > 0.0);
    assert!(steering.rms_x_after < steering.rms_x_before);
    assert!((report.qx - 62.28).abs() < 1.0e-6);
}

#[test]
fn tune_options_fill_from_empty_json() {
    let options: TuneOptions = serde_json::from_str("{}").unwrap();
    assert_eq!(options, TuneOptions::default());
    assert_eq!(options.tune_ladder.last(), Some(&1.0e-6));
    assert_eq!(options.coupling_limits, [-5.0e-3, 5.0e-3]);
}
