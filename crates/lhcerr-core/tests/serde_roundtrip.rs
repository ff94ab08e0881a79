use lhcerr_core::provenance::{SchemaVersion, SnapshotProvenance};
use lhcerr_core::{Beam, TwissMethod};

#[test]
fn provenance_round_trip_json() {
    let provenance = SnapshotProvenance {
        stage: "errors".into(),
        seed: Some(42),
        model_hash: "deadbeef".into(),
        created_at: "2026-03-01T00:00:00Z".into(),
        tool_versions: [("lhcerr-model".into(), "0.1.0".into())]
            .into_iter()
            .collect(),
    };

    let json = serde_json::to_string_pretty(&provenance).expect("serialize");
    let decoded: SnapshotProvenance = serde_json::from_str(&json).expect("deserialize");

    assert_eq!(decoded, provenance);
    assert_eq!(SchemaVersion::default(), SchemaVersion::new(1, 0, 0));
}

#[test]
fn beam_table_indices() {
    assert_eq!(Beam::from_table_index(0), Some(Beam::Both));
    assert_eq!(Beam::from_table_index(1), Some(Beam::B1));
    assert_eq!(Beam::from_table_index(2), Some(Beam::B2));
    assert_eq!(Beam::from_table_index(3), None);
    assert_eq!(Beam::B1.suffix(), Some("b1"));
    assert_eq!(Beam::Both.suffix(), None);
    assert!(Beam::B2.is_reversed());
    assert!(!Beam::B1.is_reversed());
}

#[test]
fn twiss_method_serde_tags() {
    let json = serde_json::to_string(&TwissMethod::FourD).expect("serialize");
    assert_eq!(json, "\"4d\"");
    let decoded: TwissMethod = serde_json::from_str("\"6d\"").expect("deserialize");
    assert_eq!(decoded, TwissMethod::SixD);
}
