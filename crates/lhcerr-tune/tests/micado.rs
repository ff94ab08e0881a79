use lhcerr_model::{
    build_demo_model, LatticeModel, OpticsEngine, TrajectoryCorrector, TwissOptions,
};
use lhcerr_tune::{
    consider_micado, correct_trajectory, install_correction_terms, select_steering, LinearOptics,
    Micado, MicadoOptions,
};

fn steered_demo() -> LatticeModel {
    let mut model = build_demo_model().unwrap();
    select_steering(&mut model).unwrap();
    install_correction_terms(&mut model).unwrap();
    model
}

fn kick_a_bend(model: &mut LatticeModel, line: &str, element: &str, delta: f64) {
    model
        .line_mut(line)
        .unwrap()
        .element_mut(element)
        .unwrap()
        .accumulate_error(0, false, delta);
}

#[test]
fn a_kicked_orbit_is_steered_back_towards_the_reference() {
    let engine = LinearOptics::default();
    let mut model = steered_demo();
    kick_a_bend(&mut model, "lhcb1", "mb.a2r3.b1", 2.0e-5);

    let reference = engine
        .twiss(&model, "lhcb1", &TwissOptions::new().with_errors(false))
        .unwrap();
    let outcome = correct_trajectory(
        &engine,
        &mut model,
        "lhcb1",
        &reference,
        &MicadoOptions::default(),
    )
    .unwrap();

    assert_eq!(outcome.line, "lhcb1");
    assert!(outcome.rms_x_before > 0.0);
    assert!(outcome.rms_x_after < outcome.rms_x_before);
    // Nothing disturbed the vertical plane, so nothing was trimmed there.
    assert_eq!(outcome.rms_y_before, 0.0);
    assert!(!outcome.trims.is_empty());
    assert!(outcome
        .trims
        .keys()
        .all(|circuit| circuit.starts_with("corr_co_acbh.")));
    assert!(outcome.trims.len() <= MicadoOptions::default().n_micado);

    // The reported trims are exactly what landed on the circuits.
    for (circuit, trim) in &outcome.trims {
        let live = model.vars.value_or(circuit, 0.0);
        assert!((live - trim).abs() < 1.0e-18, "{circuit}");
    }
}

#[test]
fn missing_steering_lists_are_faults() {
    let engine = LinearOptics::default();
    let mut model = build_demo_model().unwrap();
    let reference = engine.twiss(&model, "lhcb1", &TwissOptions::new()).unwrap();

    let err = correct_trajectory(
        &engine,
        &mut model,
        "lhcb1",
        &reference,
        &MicadoOptions::default(),
    )
    .unwrap_err();
    assert_eq!(err.info().code, "no-steering-correctors");
    assert_eq!(
        err.info().message,
        "no steering correctors found in the line"
    );

    // Correctors alone are not enough; the monitors must be there too.
    {
        let line = model.line_mut("lhcb1").unwrap();
        line.steering_correctors_x = vec!["mcbh.2r3.b1".to_string()];
        line.steering_correctors_y = vec!["mcbv.3r3.b1".to_string()];
    }
    let err = correct_trajectory(
        &engine,
        &mut model,
        "lhcb1",
        &reference,
        &MicadoOptions::default(),
    )
    .unwrap_err();
    assert_eq!(err.info().code, "no-steering-monitors");
}

#[test]
fn the_corrector_steers_against_an_errors_off_reference() {
    let mut model = steered_demo();
    kick_a_bend(&mut model, "lhcb2", "mb.b3r6.b2", -1.5e-5);
    let corrector = Micado::new(LinearOptics::default(), MicadoOptions::default());

    let outcome = corrector.correct_trajectory(&mut model, "lhcb2").unwrap();

    assert_eq!(outcome.line, "lhcb2");
    assert!(outcome.rms_x_before > 0.0);
    assert!(outcome.rms_x_after < outcome.rms_x_before);
}

#[test]
fn consider_micado_only_acts_inside_the_orbit_window() {
    let engine = LinearOptics::default();
    let mut model = steered_demo();
    kick_a_bend(&mut model, "lhcb1", "mb.a2r4.b1", 1.0e-5);

    // No label-1 gates set: the window stays closed even with errors on.
    model.vars.set("on_errors", 1.0);
    let outcomes = consider_micado(&engine, &mut model, &MicadoOptions::default()).unwrap();
    assert!(outcomes.is_empty());

    // The global switch closes the window regardless of the gates.
    model.vars.set("on_a1s", 1.0);
    model.vars.set("on_errors", 0.0);
    let outcomes = consider_micado(&engine, &mut model, &MicadoOptions::default()).unwrap();
    assert!(outcomes.is_empty());

    model.vars.set("on_errors", 1.0);
    let outcomes = consider_micado(&engine, &mut model, &MicadoOptions::default()).unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].line, "lhcb1");
    assert_eq!(outcomes[1].line, "lhcb2");
    assert!(outcomes[0].rms_x_after < outcomes[0].rms_x_before);
    // The untouched line needed no steering to stay on its reference.
    assert_eq!(outcomes[1].rms_x_before, 0.0);
    assert!(outcomes[1].trims.is_empty());
}

#[test]
fn options_fill_from_empty_json() {
    let options: MicadoOptions = serde_json::from_str("{}").unwrap();
    assert_eq!(options, MicadoOptions::default());
    assert_eq!(options.n_micado, 5);
    assert_eq!(options.n_iter, 1);
}
