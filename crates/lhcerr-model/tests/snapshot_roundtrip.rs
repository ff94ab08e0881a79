use std::fs;

use lhcerr_core::errors::Fault;
use lhcerr_core::provenance::SchemaVersion;
use lhcerr_model::{build_demo_model, model_content_hash, ModelSnapshot, VarDef};

#[test]
fn snapshot_round_trips_the_full_model() {
    let model = build_demo_model().unwrap();
    let snapshot = ModelSnapshot::capture(&model, "clean", None).unwrap();
    let bytes = snapshot.to_json_bytes().unwrap();

    let (restored, provenance) = ModelSnapshot::from_json_bytes(&bytes)
        .unwrap()
        .into_model()
        .unwrap();
    assert_eq!(restored, model);
    assert_eq!(provenance.stage, "clean");
    assert_eq!(provenance.seed, None);
}

#[test]
fn content_hash_ignores_provenance_and_is_stable() {
    let model = build_demo_model().unwrap();
    let first = ModelSnapshot::capture(&model, "clean", None).unwrap();
    let second = ModelSnapshot::capture(&model, "errors", Some(7)).unwrap();
    assert_eq!(
        first.provenance.model_hash,
        second.provenance.model_hash
    );
    assert_eq!(model_content_hash(&model).unwrap(), first.provenance.model_hash);
}

#[test]
fn seed_is_recorded_when_present() {
    let model = build_demo_model().unwrap();
    let snapshot = ModelSnapshot::capture(&model, "errors", Some(42)).unwrap();
    let bytes = snapshot.to_json_bytes().unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("\"seed\":42"));
}

#[test]
fn tampered_snapshot_is_rejected() {
    let model = build_demo_model().unwrap();
    let mut snapshot = ModelSnapshot::capture(&model, "errors", Some(1)).unwrap();
    snapshot.vars.insert("nrj".to_string(), VarDef::Literal(450.0));
    let err = snapshot.into_model().unwrap_err();
    assert!(matches!(err, Fault::Serde(info) if info.code == "hash-mismatch"));
}

#[test]
fn unsupported_schema_major_is_rejected() {
    let model = build_demo_model().unwrap();
    let mut snapshot = ModelSnapshot::capture(&model, "clean", None).unwrap();
    snapshot.schema = SchemaVersion::new(2, 0, 0);
    let bytes = snapshot.to_json_bytes().unwrap();
    let err = ModelSnapshot::from_json_bytes(&bytes).unwrap_err();
    assert!(matches!(err, Fault::Serde(info) if info.code == "schema-version"));
}

#[test]
fn snapshot_survives_a_trip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model_000.json");

    let model = build_demo_model().unwrap();
    let bytes = ModelSnapshot::capture(&model, "clean", None)
        .unwrap()
        .to_json_bytes()
        .unwrap();
    fs::write(&path, &bytes).unwrap();

    let read = fs::read(&path).unwrap();
    let (restored, _) = ModelSnapshot::from_json_bytes(&read)
        .unwrap()
        .into_model()
        .unwrap();
    assert_eq!(restored, model);
}
