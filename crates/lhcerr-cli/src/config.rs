//! Scenario configuration shared by the pipeline stages.

use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use lhcerr_assign::{AssignmentConfig, FamilySelection, Regime, TableKind};
use lhcerr_tune::{TuneOptions, WorkingPoint};

/// One scenario file: machine energy, working points, knob settings and
/// the error-table realisation to run against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Beam energy in GeV; decides the injection/collision regime.
    #[serde(default = "default_energy_gev")]
    pub energy_gev: f64,
    /// Per-line working points; lines not named use the default point.
    #[serde(default)]
    pub working_points: BTreeMap<String, WorkingPoint>,
    /// Crossing, separation and experiment knob settings.
    #[serde(default)]
    pub knob_settings: BTreeMap<String, f64>,
    /// Error-toggle overrides applied before assignment.
    #[serde(default)]
    pub error_toggles: BTreeMap<String, f64>,
    /// Error-table realisation to load.
    #[serde(default)]
    pub tables: TableConfig,
    /// Magnet groups receiving errors.
    #[serde(default)]
    pub families: FamilySelection,
    /// Sign convention and scaling options for the assignment.
    #[serde(default)]
    pub assignment: AssignmentConfig,
    /// Matching ladders and trajectory-correction controls.
    #[serde(default)]
    pub tune: TuneOptions,
    /// External correction solver.
    #[serde(default)]
    pub correction: CorrectionConfig,
}

fn default_energy_gev() -> f64 {
    6800.0
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            energy_gev: default_energy_gev(),
            working_points: BTreeMap::new(),
            knob_settings: BTreeMap::new(),
            error_toggles: BTreeMap::new(),
            tables: TableConfig::default(),
            families: FamilySelection::default(),
            assignment: AssignmentConfig::default(),
            tune: TuneOptions::default(),
            correction: CorrectionConfig::default(),
        }
    }
}

impl Scenario {
    /// Loads a scenario from a YAML file.
    pub fn load(path: &Path) -> Result<Scenario, Box<dyn Error>> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Working point for a line, falling back to the default point.
    pub fn working_point(&self, line: &str) -> WorkingPoint {
        self.working_points.get(line).copied().unwrap_or_default()
    }

    /// Whether the energy sits on the injection plateau.
    pub fn injection(&self) -> bool {
        Regime::for_energy(self.energy_gev) == Regime::Injection
    }

    /// The `on_*` knob settings, as saved by the crossing disable.
    pub fn crossing_settings(&self) -> BTreeMap<String, f64> {
        self.knob_settings
            .iter()
            .filter(|(knob, _)| knob.starts_with("on_"))
            .map(|(knob, value)| (knob.clone(), *value))
            .collect()
    }
}

/// Where the error tables live and which realisation to use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    /// Table root directory.
    #[serde(default = "default_table_root")]
    pub root: PathBuf,
    /// Table provenance (`wise` or `fidel`).
    #[serde(default = "default_table_kind")]
    pub kind: TableKind,
    /// Realisation seed.
    #[serde(default = "default_table_seed")]
    pub seed: u64,
}

fn default_table_root() -> PathBuf {
    PathBuf::from("tables")
}

fn default_table_kind() -> TableKind {
    TableKind::Wise
}

fn default_table_seed() -> u64 {
    1
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            root: default_table_root(),
            kind: default_table_kind(),
            seed: default_table_seed(),
        }
    }
}

/// External correction solver location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionConfig {
    /// Solver executable.
    #[serde(default = "default_correction_binary")]
    pub binary: PathBuf,
}

fn default_correction_binary() -> PathBuf {
    PathBuf::from("corr")
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            binary: default_correction_binary(),
        }
    }
}
