use lhcerr_core::errors::Fault;
use lhcerr_model::{build_demo_model, Element, ElementKind, Line, VarDef};

#[test]
fn append_tracks_longitudinal_positions() {
    let mut line = Line::new("lhcb1");
    line.append("mb.a2r1.b1", Element::new(ElementKind::Bend, 14.3))
        .unwrap();
    line.append("mq.2r1.b1", Element::new(ElementKind::Quadrupole, 3.1))
        .unwrap();
    assert_eq!(line.element("mb.a2r1.b1").unwrap().s, 0.0);
    assert_eq!(line.element("mq.2r1.b1").unwrap().s, 14.3);
    assert!((line.circumference() - 17.4).abs() < 1e-12);

    let err = line
        .append("mb.a2r1.b1", Element::new(ElementKind::Bend, 14.3))
        .unwrap_err();
    assert!(matches!(err, Fault::Model(info) if info.code == "duplicate-element"));
}

#[test]
fn glob_matching_separates_main_and_separation_dipoles() {
    let mut line = Line::new("lhcb1");
    for name in ["mb.a2r1.b1", "mb.b2r1.b1", "mbrc.4r1.b1", "mq.2r1.b1"] {
        line.append(name, Element::new(ElementKind::Bend, 1.0))
            .unwrap();
    }
    let mains = line.matching_names("mb.*").unwrap();
    assert_eq!(mains, vec!["mb.a2r1.b1", "mb.b2r1.b1"]);
    let separations = line.matching_names("mb[!.]*").unwrap();
    assert_eq!(separations, vec!["mbrc.4r1.b1"]);

    let err = line.matching_names("mb[").unwrap_err();
    assert!(matches!(err, Fault::Model(info) if info.code == "bad-pattern"));
}

#[test]
fn multipole_arrays_extend_but_never_truncate() {
    let mut element = Element::new(ElementKind::Multipole, 0.11).with_knl(vec![0.0, 0.0, 0.09]);
    assert_eq!(element.allocated_order(), Some(2));
    element.extend_order(14);
    assert_eq!(element.knl.len(), 15);
    assert_eq!(element.knl[2], 0.09);
    element.extend_order(3);
    assert_eq!(element.knl.len(), 15);

    element.accumulate_error(4, false, 1.0e-5);
    element.accumulate_error(4, false, 1.0e-5);
    assert!((element.error_delta(4, false) - 2.0e-5).abs() < 1e-20);
    assert_eq!(element.error_delta(4, true), 0.0);
}

#[test]
fn reference_strength_prefers_the_named_main_field() {
    let quad = Element::new(ElementKind::Quadrupole, 3.1)
        .with_k_ref(0.0087)
        .with_knl(vec![0.0, 99.0]);
    assert_eq!(quad.reference_strength(1, false), 0.0087);
    assert_eq!(quad.reference_strength(0, false), 0.0);

    let skew_sext = Element::new(ElementKind::Sextupole, 0.37).with_k_ref_skew(0.04);
    assert_eq!(skew_sext.reference_strength(2, true), 0.04);
    assert_eq!(skew_sext.reference_strength(2, false), 0.0);

    let spool = Element::new(ElementKind::Multipole, 0.11)
        .with_knl(vec![0.0, 0.0, 0.0, 0.0, 5.0e-2]);
    assert_eq!(spool.reference_strength(4, false), 5.0e-2);
}

#[test]
fn kind_capabilities_match_the_hardware() {
    for kind in [
        ElementKind::Bend,
        ElementKind::Quadrupole,
        ElementKind::Sextupole,
        ElementKind::Octupole,
        ElementKind::Multipole,
        ElementKind::Kicker,
    ] {
        assert!(kind.carries_field(), "{kind:?} should carry field errors");
    }
    for kind in [
        ElementKind::Marker,
        ElementKind::Drift,
        ElementKind::Limit,
        ElementKind::Monitor,
        ElementKind::Cavity,
    ] {
        assert!(!kind.carries_field(), "{kind:?} cannot carry field errors");
    }
}

#[test]
fn demo_model_has_two_lines_with_shared_insertion_elements() {
    let model = build_demo_model().unwrap();
    let names: Vec<&str> = model.line_names().collect();
    assert_eq!(names, vec!["lhcb1", "lhcb2"]);
    assert!(!model.line("lhcb1").unwrap().is_reversed());
    assert!(model.line("lhcb2").unwrap().is_reversed());

    for line in ["lhcb1", "lhcb2"] {
        let line = model.line(line).unwrap();
        assert!(line.contains("ip1"));
        assert!(line.contains("mq.1r1"));
        assert!(line.contains("mb.a2r1.b1") == (line.name() == "lhcb1"));
    }

    // Octant 5 corrector sextupole is unplugged and left as a drift.
    let unplugged = model.line("lhcb1").unwrap().element("mcs.3r5.b1").unwrap();
    assert_eq!(unplugged.kind, ElementKind::Drift);
    let plugged = model.line("lhcb1").unwrap().element("mcs.3r1.b1").unwrap();
    assert_eq!(plugged.kind, ElementKind::Multipole);
}

#[test]
fn demo_crossing_circuits_are_knob_driven() {
    let model = build_demo_model().unwrap();
    match model.vars.get("acbh.2r1.b1").unwrap() {
        VarDef::Expression(expr) => assert!(expr.variables().contains("on_x1")),
        other => panic!("expected crossing-driven circuit, got {other:?}"),
    }
    // Free circuits stay literal.
    assert_eq!(model.vars.get("acbh.2r3.b1"), Some(&VarDef::Literal(0.0)));
    assert!(model.vars.dependents_of("on_x1").contains("acbh.2r1.b1"));
}
