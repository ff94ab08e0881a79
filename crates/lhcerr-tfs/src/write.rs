//! Writers for the fixed-layout optics and error-field tables handed to
//! the external arc correction binary.

use std::fs;
use std::path::Path;

use lhcerr_core::errors::{ErrorInfo, Fault};
use lhcerr_core::Result;
use lhcerr_model::{Line, OpticsTable};

use crate::format::fortran_float;

/// Element name prefixes included in the reference optics table.
const OPTICS_PREFIXES: [&str; 15] = [
    "mb.", "mbh.", "mqt.14", "mqt.15", "mqt.16", "mqt.17", "mqt.18", "mqt.19", "mqt.20",
    "mqt.21", "mqs.", "mss.", "mco.", "mcd.", "mcs.",
];

/// Default slot patterns for the error-field table.
pub const DEFAULT_ERROR_PATTERNS: [&str; 2] = ["mb.*", "mbh.*"];

const TWISS_COLUMNS: &str = "* NAME                              K0L                K1L               BETX               BETY                 DX                MUX                MUY ";
const TWISS_TYPES: &str = "$ %s                                %le                %le                %le                %le                %le                %le                %le ";

const EFIELD_COLUMNS: &str = concat!(
    "* NAME                              K0L               K0SL                K1L               ",
    "K1SL                K2L               K2SL                K3L               K3SL                ",
    "K4L               K4SL                K5L               K5SL                K6L               ",
    "K6SL                K7L               K7SL                K8L               K8SL                ",
    "K9L               K9SL               K10L              K10SL               K11L              ",
    "K11SL               K12L              K12SL               K13L              K13SL               ",
    "K14L              K14SL               K15L              K15SL               K16L              ",
    "K16SL               K17L              K17SL               K18L              K18SL               ",
    "K19L              K19SL               K20L              K20SL ",
);
const EFIELD_TYPES: &str = concat!(
    "$ %s                                %le                %le                %le                ",
    "%le                %le                %le                %le                %le                ",
    "%le                %le                %le                %le                %le                ",
    "%le                %le                %le                %le                %le                ",
    "%le                %le                %le                %le                %le                ",
    "%le                %le                %le                %le                %le                ",
    "%le                %le                %le                %le                %le                ",
    "%le                %le                %le                %le                %le                ",
    "%le                %le                %le                %le ",
);

/// Writes the pre-error reference optics table for one line.
///
/// Rows cover the field-carrying elements whose names match the spool
/// piece reference families; strengths come from the optics rows so the
/// current knob settings are baked in.
pub fn store_optics_reference(
    line: &Line,
    optics: &OpticsTable,
    energy_gev: f64,
    path: impl AsRef<Path>,
) -> Result<()> {
    let mut out: Vec<String> = vec![
        "@ NAME             %05s \"TWISS\"".to_string(),
        "@ TYPE             %05s \"TWISS\"".to_string(),
        format!(
            "@ SEQUENCE         %05s \"{}\"",
            line.name().to_ascii_uppercase()
        ),
        format!(
            "@ ENERGY           %le                 {}",
            energy_gev.round() as i64
        ),
        TWISS_COLUMNS.to_string(),
        TWISS_TYPES.to_string(),
    ];
    for (name, element) in line.elements() {
        if !element.kind.carries_field() {
            continue;
        }
        if !OPTICS_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
            continue;
        }
        let Some(row) = optics.row(name) else {
            continue;
        };
        let mut text = name_cell(name);
        for value in [
            row.k0l, row.k1l, row.betx, row.bety, row.dx, row.mux, row.muy,
        ] {
            text.push_str("     ");
            text.push_str(&fortran_float(value)?);
        }
        out.push(text);
    }
    write_lines(path.as_ref(), &out)
}

/// Writes the error-field table (`EFIELD`) for one line.
///
/// One row per field-carrying element matching `patterns` (trailing `*`
/// wildcards reduce to prefix matches), with the assigned error deltas
/// for orders 0 through 20, normal and skew interleaved.
pub fn store_errors(line: &Line, patterns: &[&str], path: impl AsRef<Path>) -> Result<()> {
    let prefixes: Vec<String> = patterns
        .iter()
        .map(|pattern| pattern.replace('*', ""))
        .collect();
    let mut out: Vec<String> = vec![
        "@ NAME             %06s \"EFIELD\"".to_string(),
        "@ TYPE             %06s \"EFIELD\"".to_string(),
        EFIELD_COLUMNS.to_string(),
        EFIELD_TYPES.to_string(),
    ];
    for (name, element) in line.elements() {
        if !element.kind.carries_field() {
            continue;
        }
        if !prefixes.iter().any(|prefix| name.starts_with(prefix.as_str())) {
            continue;
        }
        let mut text = name_cell(name);
        for order in 0..=20 {
            for skew in [false, true] {
                text.push_str("     ");
                text.push_str(&fortran_float(element.error_delta(order, skew))?);
            }
        }
        out.push(text);
    }
    write_lines(path.as_ref(), &out)
}

/// Quoted upper-case name, left-justified in the 20 character key column.
fn name_cell(name: &str) -> String {
    format!("{:<20}", format!(" \"{}\"", name.to_ascii_uppercase()))
}

fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| {
            write_fault(
                "table-io",
                format!("cannot create table directory: {source}"),
            )
            .with_context("path", path.display())
        })?;
    }
    let mut text = lines.join("\n");
    text.push('\n');
    fs::write(path, text).map_err(|source| {
        write_fault("table-io", format!("cannot write table file: {source}"))
            .with_context("path", path.display())
    })
}

fn write_fault(code: impl Into<String>, message: impl Into<String>) -> Fault {
    Fault::Table(ErrorInfo::new(code, message))
}

trait ContextExt {
    fn with_context(self, key: impl Into<String>, value: impl ToString) -> Fault;
}

impl ContextExt for Fault {
    fn with_context(self, key: impl Into<String>, value: impl ToString) -> Fault {
        match self {
            Fault::Table(info) => Fault::Table(info.with_context(key, value.to_string())),
            other => other,
        }
    }
}
