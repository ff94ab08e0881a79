use std::fs;
use std::path::PathBuf;

use lhcerr_assign::{
    demo_error_table, demo_rotation_table, discover_seeds, error_table_path, rotation_table_path,
    store_error_table, store_rotation_table, CoefficientPlane, ErrorTable, Regime, Rotation,
    RotationTable, TableKind,
};
use lhcerr_core::errors::Fault;
use lhcerr_core::Beam;
use lhcerr_model::build_demo_model;
use lhcerr_tfs::parse_table;

#[test]
fn realisation_paths_follow_the_archive_layout() {
    assert_eq!(TableKind::from_name("wise").unwrap(), TableKind::Wise);
    assert_eq!(TableKind::from_name("fidel").unwrap(), TableKind::Fidel);
    assert_eq!(TableKind::Wise.to_string(), "wise");

    assert_eq!(Regime::for_energy(450.0), Regime::Injection);
    assert_eq!(Regime::for_energy(2000.0), Regime::Injection);
    assert_eq!(Regime::for_energy(2000.1), Regime::Collision);
    assert_eq!(Regime::for_energy(6800.0), Regime::Collision);

    assert_eq!(
        error_table_path("/data", TableKind::Wise, 6800.0, 17),
        PathBuf::from("/data/LHC/wise/collision_errors-emfqcs-17.tfs"),
    );
    assert_eq!(
        error_table_path("/data", TableKind::Fidel, 450.0, 3),
        PathBuf::from("/data/LHC/fidel/injection_errors-emfqcs-3.tfs"),
    );
    assert_eq!(
        rotation_table_path("/data"),
        PathBuf::from("/data/LHC/rotations_Q2_integral.tab"),
    );
}

#[test]
fn an_unknown_kind_name_is_a_config_fault() {
    let err = TableKind::from_name("measured").unwrap_err();
    assert!(matches!(err, Fault::Config(_)));
    assert_eq!(err.info().code, "unknown-table-kind");
}

#[test]
fn error_tables_parse_beams_and_sparse_labels() {
    let text = "\
@ ORIGIN %s \"measurement export\"
* NAME BEAM B1 B3 A2
$ %s %le %le %le %le
 \"MB.A1\" 0.0 1.5 -2.0 0.25
 \"MBRC.4R1.V2\" 2.0 3.0 0.0 0.0
 \"MQ.X\" 1.4 1.0 0.0 0.0
 not_found 0.0 0.0 0.0 0.0
";
    let table = ErrorTable::from_table(&parse_table(text).unwrap()).unwrap();
    assert_eq!(table.len(), 3);
    assert!(table.contains("MB.A1"));

    let dipole = table.entry("mb.a1").unwrap();
    assert_eq!(dipole.beam, Beam::Both);
    assert_eq!(dipole.coefficient(CoefficientPlane::Normal, 1), Some(1.5));
    assert_eq!(dipole.coefficient(CoefficientPlane::Normal, 3), Some(-2.0));
    assert_eq!(dipole.coefficient(CoefficientPlane::Normal, 2), None);
    assert_eq!(dipole.coefficient(CoefficientPlane::Skew, 2), Some(0.25));
    assert_eq!(dipole.coefficient(CoefficientPlane::Skew, 1), None);

    assert_eq!(table.entry("mbrc.4r1.v2").unwrap().beam, Beam::B2);
    // The beam indicator is rounded before it is interpreted.
    assert_eq!(table.entry("mq.x").unwrap().beam, Beam::B1);
}

#[test]
fn bad_beam_data_is_fatal() {
    let no_column = "\
* NAME B1 B2
 \"MB.A1\" 1.0 2.0
";
    let err = ErrorTable::from_table(&parse_table(no_column).unwrap()).unwrap_err();
    assert!(matches!(err, Fault::Table(_)));
    assert_eq!(err.info().code, "missing-beam-column");

    let bad_indicator = "\
* NAME BEAM B1
 \"MB.BAD\" 3.0 1.0
";
    let err = ErrorTable::from_table(&parse_table(bad_indicator).unwrap()).unwrap_err();
    assert_eq!(err.info().code, "invalid-beam");
    assert_eq!(err.info().context.get("slot").map(String::as_str), Some("mb.bad"));

    let short_row = "\
* NAME BEAM B1
 \"MB.SHORT\"
";
    let err = ErrorTable::from_table(&parse_table(short_row).unwrap()).unwrap_err();
    assert_eq!(err.info().code, "missing-column");
    assert_eq!(
        err.info().context.get("slot").map(String::as_str),
        Some("mb.short"),
    );
}

#[test]
fn rotation_lookups_apply_the_survey_tolerance() {
    let mut survey = RotationTable::new();
    survey.insert("mq.exact", Rotation { yrota: 180.0, srota: 0.0 });
    survey.insert("mq.close", Rotation { yrota: 180.0018, srota: 0.0 });
    survey.insert("mq.off", Rotation { yrota: 180.002, srota: 0.0 });
    survey.insert("mq.upright", Rotation { yrota: 0.0, srota: 0.0 });

    assert!(survey.is_rotated("mq.exact"));
    assert!(survey.is_rotated("MQ.EXACT"));
    assert!(survey.is_rotated("mq.close"));
    assert!(!survey.is_rotated("mq.off"));
    assert!(!survey.is_rotated("mq.upright"));
    assert!(!survey.is_rotated("mq.unsurveyed"));

    let text = "\
* NAME YROTA SROTA
 \"MQ.1R3\" 179.9999 0.0
 \"MQ.1R5\" 0.0 0.0
";
    let survey = RotationTable::from_table(&parse_table(text).unwrap());
    assert!(survey.is_rotated("mq.1r3"));
    assert!(!survey.is_rotated("mq.1r5"));

    // A survey without angle columns counts every slot upright.
    let bare = RotationTable::from_table(&parse_table("* NAME S\n \"MQ.1R3\" 12.0\n").unwrap());
    assert!(!bare.is_rotated("mq.1r3"));
    assert_eq!(bare.len(), 1);
}

#[test]
fn seed_discovery_walks_kind_directories_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    for relative in [
        "LHC/wise/collision_errors-emfqcs-2.tfs",
        "LHC/wise/injection_errors-emfqcs-1.tfs",
        "LHC/wise/README.txt",
        "LHC/wise/injection_errors-emfqcs-x.tfs",
        "LHC/fidel/injection_errors-emfqcs-7.tfs",
        "LHC/other/injection_errors-emfqcs-9.tfs",
        "LHC/rotations_Q2_integral.tab",
    ] {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "").unwrap();
    }

    let seeds = discover_seeds(root).unwrap();
    let summary: Vec<(TableKind, Regime, u64)> = seeds
        .iter()
        .map(|entry| (entry.kind, entry.regime, entry.seed))
        .collect();
    assert_eq!(
        summary,
        vec![
            (TableKind::Wise, Regime::Injection, 1),
            (TableKind::Wise, Regime::Collision, 2),
            (TableKind::Fidel, Regime::Injection, 7),
        ],
    );
    assert_eq!(
        seeds[0].path,
        root.join("LHC/wise/injection_errors-emfqcs-1.tfs"),
    );
}

#[test]
fn demo_error_tables_are_deterministic_per_seed() {
    let model = build_demo_model().unwrap();
    let first = demo_error_table(&model, 42);
    let again = demo_error_table(&model, 42);
    let other = demo_error_table(&model, 43);
    assert_eq!(first, again);
    assert!(first != other);

    // Shared slots carry beam 0, separation-dipole apertures their beam.
    assert_eq!(first.entry("mb.a2r1").unwrap().beam, Beam::Both);
    assert_eq!(first.entry("mq.1r1").unwrap().beam, Beam::Both);
    assert_eq!(first.entry("mbrc.4r1.v1").unwrap().beam, Beam::B1);
    assert_eq!(first.entry("mbrc.4r1.v2").unwrap().beam, Beam::B2);
    assert_eq!(first.entry("mcbh.2r1.v1").unwrap().beam, Beam::B1);
    // The unplugged spool slot is still measured.
    assert!(first.contains("mcs.3r5"));
    assert!(first.contains("mo.2r1"));
    // Instruments and trim quadrupoles never appear.
    assert!(!first.contains("bpm.2r1.b1"));
    assert!(!first.contains("bpm.2r1"));
    assert!(!first.contains("mqt.3r1"));
    assert!(!first.contains("drift.20r1"));
}

#[test]
fn stored_tables_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let model = build_demo_model().unwrap();
    let table = demo_error_table(&model, 7);

    let path = error_table_path(dir.path(), TableKind::Wise, 6800.0, 7);
    store_error_table(&table, &path).unwrap();
    let read = ErrorTable::read(&path).unwrap();

    assert_eq!(read.len(), table.len());
    for (slot, entry) in table.entries() {
        let loaded = read.entry(slot).unwrap();
        assert_eq!(loaded.beam, entry.beam);
        for plane in [CoefficientPlane::Normal, CoefficientPlane::Skew] {
            for label in 1..=6 {
                let original = entry.coefficient(plane, label).unwrap();
                let stored = loaded.coefficient(plane, label).unwrap();
                assert!(
                    (stored - original).abs() <= original.abs() * 1e-7 + 1e-12,
                    "{slot} label {label}: {stored} vs {original}",
                );
            }
        }
    }

    let survey_path = rotation_table_path(dir.path());
    store_rotation_table(&demo_rotation_table(), &survey_path).unwrap();
    let survey = RotationTable::read(&survey_path).unwrap();
    assert_eq!(survey.len(), 3);
    assert!(survey.is_rotated("mq.1r3"));
    assert!(survey.is_rotated("mq.1r7"));
    assert!(!survey.is_rotated("mq.1r5"));

    let discovered = discover_seeds(dir.path()).unwrap();
    assert_eq!(discovered.len(), 1);
    assert_eq!(discovered[0].seed, 7);
    assert_eq!(discovered[0].kind, TableKind::Wise);
    assert_eq!(discovered[0].regime, Regime::Collision);
}
