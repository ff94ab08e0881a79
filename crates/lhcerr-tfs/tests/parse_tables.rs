use lhcerr_core::errors::Fault;
use lhcerr_tfs::{parse_table, read_table};

const SAMPLE: &str = r#"@ NAME             %06s "EFIELD"
@ DATE             %08s "20/06/26"
* NAME     BEAM    B1      B2      A2
$ %s       %le     %le     %le     %le
 "MB.A20R1"   0    1.25    -0.3    0.01
 mb.a21r1     1    -2.0    0.0     0.5
 not_found    0    0.0     0.0     0.0
 NOT FOUND
 "MQ.12L2"    2    0.75
"#;

#[test]
fn rows_and_columns_are_lowercased() {
    let table = parse_table(SAMPLE).unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(table.columns(), ["beam", "b1", "b2", "a2"]);
    let names: Vec<&str> = table.names().collect();
    assert_eq!(names, ["mb.a20r1", "mb.a21r1", "mq.12l2"]);
}

#[test]
fn lookups_ignore_case_and_quotes() {
    let table = parse_table(SAMPLE).unwrap();
    assert!(table.contains("MB.A20R1"));
    let row = table.row("mb.a20r1").unwrap();
    assert_eq!(row.value("B1"), Some(1.25));
    assert_eq!(row.value("b2"), Some(-0.3));
    assert_eq!(row.require("beam").unwrap(), 0.0);
}

#[test]
fn sentinel_rows_are_skipped() {
    let table = parse_table(SAMPLE).unwrap();
    assert!(!table.contains("not_found"));
    assert!(!table.contains("not"));
}

#[test]
fn short_rows_simply_lack_the_trailing_columns() {
    let table = parse_table(SAMPLE).unwrap();
    let row = table.row("mq.12l2").unwrap();
    assert_eq!(row.value("b1"), Some(0.75));
    assert!(!row.contains("b2"));
    let fault = row.require("a2").unwrap_err();
    assert!(matches!(fault, Fault::Table(info) if info.code == "missing-column"));
}

#[test]
fn data_before_a_header_is_fatal() {
    let text = "@ NAME %06s \"EFIELD\"\n \"MB.A20R1\" 0 1.25\n";
    let fault = parse_table(text).unwrap_err();
    assert_eq!(fault.info().code, "data-before-header");
    assert!(fault.info().context.contains_key("line"));
}

#[test]
fn malformed_values_are_fatal_with_position_context() {
    let text = "* NAME BEAM B1\n$ %s %le %le\n \"MB.A20R1\" 0 oops\n";
    let fault = parse_table(text).unwrap_err();
    assert_eq!(fault.info().code, "malformed-value");
    assert_eq!(fault.info().context.get("row").unwrap(), "mb.a20r1");
}

#[test]
fn later_duplicate_rows_win() {
    let text = "* NAME B1\n mb.x 1.0\n \"MB.X\" 2.0\n";
    let table = parse_table(text).unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table.row("mb.x").unwrap().value("b1"), Some(2.0));
}

#[test]
fn files_round_trip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("errors.tfs");
    std::fs::write(&path, SAMPLE).unwrap();
    let table = read_table(&path).unwrap();
    assert_eq!(table.len(), 3);
}

#[test]
fn missing_files_surface_an_io_fault() {
    let dir = tempfile::tempdir().unwrap();
    let fault = read_table(dir.path().join("absent.tfs")).unwrap_err();
    assert_eq!(fault.info().code, "table-io");
    assert!(fault.info().context.contains_key("path"));
}
