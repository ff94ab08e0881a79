//! Field-error and rotation tables, their on-disk layout and a demo
//! realisation generator.
//!
//! Error tables come as one TFS file per Monte Carlo seed, grouped by
//! provenance (`wise` or `fidel`) and by machine regime. A row is one
//! magnet slot with a beam indicator and signed multipole coefficients
//! in relative units of 1e-4 at the reference radius; the column label
//! `b7` always means the 7th-order coefficient, whatever other columns
//! the table happens to carry.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use lhcerr_core::errors::{ErrorInfo, Fault};
use lhcerr_core::{Beam, RngHandle};
use lhcerr_model::LatticeModel;
use lhcerr_tfs::{fortran_float, read_table, TfsTable};

use crate::families::MagnetFamily;
use crate::sign::CoefficientPlane;

/// Highest coefficient label parsed from a table.
pub const MAX_COEFFICIENT_LABEL: usize = 15;

/// How close to 180 degrees a Y-rotation must be to count as flipped.
const ROTATION_TOLERANCE: f64 = 1e-8 + 1e-5 * 180.0;

/// Provenance of a machine-error realisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    /// WISE magnetic-measurement extrapolations.
    Wise,
    /// FiDeL field-model realisations.
    Fidel,
}

impl TableKind {
    /// Directory name the kind's tables live under.
    pub fn dir_name(&self) -> &'static str {
        match self {
            TableKind::Wise => "wise",
            TableKind::Fidel => "fidel",
        }
    }

    /// Parses a kind name as found in configuration files.
    pub fn from_name(name: &str) -> Result<TableKind, Fault> {
        match name {
            "wise" => Ok(TableKind::Wise),
            "fidel" => Ok(TableKind::Fidel),
            other => Err(Fault::Config(
                ErrorInfo::new("unknown-table-kind", "error-table kind is not recognised")
                    .with_context("kind", other),
            )),
        }
    }
}

impl Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Machine regime a table was generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    /// Injection plateau.
    Injection,
    /// Collision energy.
    Collision,
}

impl Regime {
    /// Regime implied by the beam energy in GeV.
    pub fn for_energy(energy_gev: f64) -> Regime {
        if energy_gev > 2000.0 {
            Regime::Collision
        } else {
            Regime::Injection
        }
    }
}

impl Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regime::Injection => f.write_str("injection"),
            Regime::Collision => f.write_str("collision"),
        }
    }
}

/// Error-table file for a kind, energy and seed under a table root.
pub fn error_table_path(
    root: impl AsRef<Path>,
    kind: TableKind,
    energy_gev: f64,
    seed: u64,
) -> PathBuf {
    let regime = Regime::for_energy(energy_gev);
    root.as_ref()
        .join("LHC")
        .join(kind.dir_name())
        .join(format!("{regime}_errors-emfqcs-{seed}.tfs"))
}

/// Rotation-survey file under a table root.
pub fn rotation_table_path(root: impl AsRef<Path>) -> PathBuf {
    root.as_ref().join("LHC").join("rotations_Q2_integral.tab")
}

/// One discovered error-table realisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedEntry {
    /// Table provenance.
    pub kind: TableKind,
    /// Machine regime.
    pub regime: Regime,
    /// Monte Carlo seed.
    pub seed: u64,
    /// Full path of the table file.
    pub path: PathBuf,
}

/// Scans a table root for available realisations.
///
/// Files that do not follow the `{regime}_errors-emfqcs-{seed}.tfs`
/// naming under a `wise`/`fidel` directory are ignored.
pub fn discover_seeds(root: impl AsRef<Path>) -> Result<Vec<SeedEntry>, Fault> {
    let root = root.as_ref();
    let mut entries = Vec::new();
    for step in WalkDir::new(root).sort_by_file_name() {
        let step = step.map_err(|err| {
            table_fault("table-scan", "failed to walk the error-table root")
                .with_context("root", root.display())
                .with_context("cause", err.to_string())
        })?;
        if !step.file_type().is_file() {
            continue;
        }
        let kind = step
            .path()
            .parent()
            .and_then(|dir| dir.file_name())
            .and_then(|name| name.to_str())
            .and_then(|name| TableKind::from_name(name).ok());
        let Some(kind) = kind else { continue };
        let parsed = step
            .file_name()
            .to_str()
            .and_then(parse_realisation_file_name);
        let Some((regime, seed)) = parsed else { continue };
        entries.push(SeedEntry {
            kind,
            regime,
            seed,
            path: step.into_path(),
        });
    }
    entries.sort_by(|a, b| {
        (a.kind, a.regime, a.seed)
            .cmp(&(b.kind, b.regime, b.seed))
            .then_with(|| a.path.cmp(&b.path))
    });
    Ok(entries)
}

fn parse_realisation_file_name(name: &str) -> Option<(Regime, u64)> {
    let stem = name.strip_suffix(".tfs")?;
    let (prefix, seed) = stem.split_once("_errors-emfqcs-")?;
    let regime = match prefix {
        "injection" => Regime::Injection,
        "collision" => Regime::Collision,
        _ => return None,
    };
    Some((regime, seed.parse().ok()?))
}

/// Field errors of one magnet slot.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEntry {
    /// Which beam instances the slot addresses.
    pub beam: Beam,
    normal: BTreeMap<usize, f64>,
    skew: BTreeMap<usize, f64>,
}

impl ErrorEntry {
    /// Entry without any coefficients yet.
    pub fn new(beam: Beam) -> Self {
        Self {
            beam,
            normal: BTreeMap::new(),
            skew: BTreeMap::new(),
        }
    }

    /// Sets a coefficient at a 1-based label.
    pub fn set_coefficient(&mut self, plane: CoefficientPlane, label: usize, value: f64) {
        match plane {
            CoefficientPlane::Normal => self.normal.insert(label, value),
            CoefficientPlane::Skew => self.skew.insert(label, value),
        };
    }

    /// Coefficient at a 1-based label, if the table carried the column.
    pub fn coefficient(&self, plane: CoefficientPlane, label: usize) -> Option<f64> {
        match plane {
            CoefficientPlane::Normal => self.normal.get(&label).copied(),
            CoefficientPlane::Skew => self.skew.get(&label).copied(),
        }
    }

    /// Present coefficients of one plane in label order.
    pub fn coefficients(
        &self,
        plane: CoefficientPlane,
    ) -> impl Iterator<Item = (usize, f64)> + '_ {
        let map = match plane {
            CoefficientPlane::Normal => &self.normal,
            CoefficientPlane::Skew => &self.skew,
        };
        map.iter().map(|(&label, &value)| (label, value))
    }
}

/// Error table of one realisation, keyed by lowercased slot name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorTable {
    entries: IndexMap<String, ErrorEntry>,
}

impl ErrorTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no slots.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a slot is present.
    pub fn contains(&self, slot: &str) -> bool {
        self.entries.contains_key(&slot.to_ascii_lowercase())
    }

    /// Looks up a slot entry.
    pub fn entry(&self, slot: &str) -> Option<&ErrorEntry> {
        self.entries.get(&slot.to_ascii_lowercase())
    }

    /// Inserts or replaces a slot entry.
    pub fn insert(&mut self, slot: impl Into<String>, entry: ErrorEntry) {
        self.entries.insert(slot.into().to_ascii_lowercase(), entry);
    }

    /// Slot entries in table order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &ErrorEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Builds the table from parsed TFS content.
    pub fn from_table(table: &TfsTable) -> Result<Self, Fault> {
        if !table.columns().iter().any(|column| column == "beam") {
            return Err(table_fault(
                "missing-beam-column",
                "error table has no beam column",
            ));
        }
        let mut entries = IndexMap::new();
        for (name, row) in table.rows() {
            let indicator = row
                .require("beam")
                .map_err(|err| err.with_context("slot", name))?;
            let beam = Beam::from_table_index(indicator.round() as i64).ok_or_else(|| {
                table_fault("invalid-beam", "beam indicator must be 0, 1 or 2")
                    .with_context("slot", name)
                    .with_context("beam", indicator)
            })?;
            let mut entry = ErrorEntry::new(beam);
            for label in 1..=MAX_COEFFICIENT_LABEL {
                if let Some(value) = row.value(&format!("b{label}")) {
                    entry.normal.insert(label, value);
                }
                if let Some(value) = row.value(&format!("a{label}")) {
                    entry.skew.insert(label, value);
                }
            }
            entries.insert(name.to_string(), entry);
        }
        Ok(Self { entries })
    }

    /// Reads a table file.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, Fault> {
        let path = path.as_ref();
        let table = read_table(path)?;
        Self::from_table(&table).map_err(|err| err.with_context("path", path.display()))
    }
}

/// Survey rotation angles of one slot, in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rotation {
    /// Rotation around the vertical axis.
    pub yrota: f64,
    /// Rotation around the beam axis.
    pub srota: f64,
}

/// Survey rotation table, keyed by lowercased slot name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RotationTable {
    entries: IndexMap<String, Rotation>,
}

impl RotationTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of surveyed slots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the survey has no slots.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts or replaces a slot.
    pub fn insert(&mut self, slot: impl Into<String>, rotation: Rotation) {
        self.entries
            .insert(slot.into().to_ascii_lowercase(), rotation);
    }

    /// Surveyed angles for a slot.
    pub fn rotation(&self, slot: &str) -> Option<&Rotation> {
        self.entries.get(&slot.to_ascii_lowercase())
    }

    /// Whether the slot is installed turned around the vertical axis.
    /// Slots missing from the survey count as upright.
    pub fn is_rotated(&self, slot: &str) -> bool {
        self.rotation(slot)
            .map(|rotation| (rotation.yrota - 180.0).abs() <= ROTATION_TOLERANCE)
            .unwrap_or(false)
    }

    /// Slot rotations in table order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Rotation)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Builds the survey from parsed TFS content. Rows without angle
    /// columns count as upright.
    pub fn from_table(table: &TfsTable) -> Self {
        let mut survey = Self::new();
        for (name, row) in table.rows() {
            survey.insert(
                name,
                Rotation {
                    yrota: row.value("yrota").unwrap_or(0.0),
                    srota: row.value("srota").unwrap_or(0.0),
                },
            );
        }
        survey
    }

    /// Reads a survey file.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, Fault> {
        Ok(Self::from_table(&read_table(path)?))
    }
}

/// Generates a deterministic error realisation for a model.
///
/// Every element whose base name classifies into a magnet family gets a
/// slot with coefficients up to label 6, drawn uniformly with a scale
/// falling off as 1/label. Separation dipoles are measured per
/// aperture, so they get distinct `.v{1,2}` slots with an explicit
/// beam; every other slot is shared (beam 0). Identical seeds produce
/// identical tables.
pub fn demo_error_table(model: &LatticeModel, seed: u64) -> ErrorTable {
    let mut rng = RngHandle::from_seed(seed);
    let mut table = ErrorTable::new();
    for (_, line) in model.lines() {
        for (name, _) in line.elements() {
            let (base, instance_beam) = match name.strip_suffix(".b1") {
                Some(base) => (base, Some(Beam::B1)),
                None => match name.strip_suffix(".b2") {
                    Some(base) => (base, Some(Beam::B2)),
                    None => (name, None),
                },
            };
            let Some(family) = MagnetFamily::classify(base) else {
                continue;
            };
            let (slot, beam) = match instance_beam {
                Some(beam) if family == MagnetFamily::SeparationDipoles => {
                    let aperture = if beam.is_reversed() { 2 } else { 1 };
                    (format!("{base}.v{aperture}"), beam)
                }
                _ => (base.to_string(), Beam::Both),
            };
            if table.contains(&slot) {
                continue;
            }
            let mut entry = ErrorEntry::new(beam);
            for label in 1..=6 {
                let scale = 10.0 / label as f64;
                let normal = (rng.gen::<f64>() * 2.0 - 1.0) * scale;
                let skew = (rng.gen::<f64>() * 2.0 - 1.0) * scale;
                entry.set_coefficient(CoefficientPlane::Normal, label, normal);
                entry.set_coefficient(CoefficientPlane::Skew, label, skew);
            }
            table.insert(slot, entry);
        }
    }
    table
}

/// Fixed demo survey: two of the shared insertion quadrupoles are
/// installed rotated, one is surveyed upright.
pub fn demo_rotation_table() -> RotationTable {
    let mut survey = RotationTable::new();
    survey.insert(
        "mq.1r3",
        Rotation {
            yrota: 180.0,
            srota: 0.0,
        },
    );
    survey.insert(
        "mq.1r7",
        Rotation {
            yrota: 179.9995,
            srota: 0.0,
        },
    );
    survey.insert(
        "mq.1r5",
        Rotation {
            yrota: 0.0,
            srota: 0.0,
        },
    );
    survey
}

/// Stores an error table in the realisation file layout.
pub fn store_error_table(table: &ErrorTable, path: impl AsRef<Path>) -> Result<(), Fault> {
    let mut header = format!("* {:<24}", "NAME");
    header.push_str(&cell_header("BEAM"));
    for label in 1..=MAX_COEFFICIENT_LABEL {
        header.push_str(&cell_header(&format!("B{label}")));
    }
    for label in 1..=MAX_COEFFICIENT_LABEL {
        header.push_str(&cell_header(&format!("A{label}")));
    }
    let mut lines = vec![header];
    for (slot, entry) in table.entries() {
        let mut row = format!("  {:<24}", format!("\"{}\"", slot.to_ascii_uppercase()));
        let beam = match entry.beam {
            Beam::Both => 0.0,
            Beam::B1 => 1.0,
            Beam::B2 => 2.0,
        };
        row.push_str(&cell(beam)?);
        for label in 1..=MAX_COEFFICIENT_LABEL {
            let value = entry
                .coefficient(CoefficientPlane::Normal, label)
                .unwrap_or(0.0);
            row.push_str(&cell(value)?);
        }
        for label in 1..=MAX_COEFFICIENT_LABEL {
            let value = entry
                .coefficient(CoefficientPlane::Skew, label)
                .unwrap_or(0.0);
            row.push_str(&cell(value)?);
        }
        lines.push(row);
    }
    write_lines(&lines, path.as_ref())
}

/// Stores a rotation survey in the `.tab` file layout.
pub fn store_rotation_table(survey: &RotationTable, path: impl AsRef<Path>) -> Result<(), Fault> {
    let mut header = format!("* {:<24}", "NAME");
    header.push_str(&cell_header("YROTA"));
    header.push_str(&cell_header("SROTA"));
    let mut lines = vec![header];
    for (slot, rotation) in survey.entries() {
        let mut row = format!("  {:<24}", format!("\"{}\"", slot.to_ascii_uppercase()));
        row.push_str(&cell(rotation.yrota)?);
        row.push_str(&cell(rotation.srota)?);
        lines.push(row);
    }
    write_lines(&lines, path.as_ref())
}

fn cell_header(label: &str) -> String {
    format!("{label:>16}")
}

fn cell(value: f64) -> Result<String, Fault> {
    Ok(format!("  {}", fortran_float(value)?))
}

fn write_lines(lines: &[String], path: &Path) -> Result<(), Fault> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|err| {
                table_fault("table-io", "failed to create the table directory")
                    .with_context("path", path.display())
                    .with_context("cause", err.to_string())
            })?;
        }
    }
    let mut text = lines.join("\n");
    text.push('\n');
    fs::write(path, text).map_err(|err| {
        table_fault("table-io", "failed to write the table file")
            .with_context("path", path.display())
            .with_context("cause", err.to_string())
    })
}

fn table_fault(code: impl Into<String>, message: impl Into<String>) -> Fault {
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
