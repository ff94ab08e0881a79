use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use lhcerr_assign::{
    assign_errors, error_table_path, install_error_toggles, rotation_table_path, AssignmentReport,
    ErrorTable, RotationTable, ToggleGates,
};
use lhcerr_model::{OpticsEngine, TwissOptions};
use lhcerr_tfs::store_optics_reference;
use lhcerr_tune::{disable_crossing, LinearOptics, Micado};

use super::{load_snapshot, print_report, save_snapshot, write_json};
use crate::config::Scenario;

#[derive(Args, Debug)]
pub struct ErrorsArgs {
    /// Input snapshot from the clean or apertures stage.
    #[arg(long = "in")]
    pub input: PathBuf,
    /// Scenario YAML.
    #[arg(long)]
    pub scenario: PathBuf,
    /// Output snapshot.
    #[arg(long)]
    pub out: PathBuf,
    /// Work dir shared with the correction stage.
    #[arg(long, default_value = "runs/work")]
    pub work_dir: PathBuf,
    /// Override the scenario's table seed.
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Debug, Serialize)]
struct ErrorsReport {
    seed: u64,
    error_table: String,
    rotation_table: String,
    assignment: AssignmentReport,
}

pub fn run(args: &ErrorsArgs) -> Result<(), Box<dyn Error>> {
    let (mut model, _) = load_snapshot(&args.input)?;
    let scenario = Scenario::load(&args.scenario)?;
    let seed = args.seed.unwrap_or(scenario.tables.seed);

    // Errors are assigned on the flat machine; the crossing scheme
    // comes back in the correction stage.
    disable_crossing(&mut model, &scenario.knob_settings);
    install_error_toggles(&mut model);
    for (toggle, value) in &scenario.error_toggles {
        model.vars.set(toggle.clone(), *value);
    }

    // Errors-off reference optics for the spool-piece solver, one per
    // line, written before any error touches the lattice.
    let engine = LinearOptics::default();
    fs::create_dir_all(&args.work_dir)?;
    let lines: Vec<String> = model.line_names().map(str::to_string).collect();
    for name in &lines {
        let reference = engine.twiss(&model, name, &TwissOptions::new().with_errors(false))?;
        let line = model.require_line(name)?;
        store_optics_reference(
            line,
            &reference,
            scenario.energy_gev,
            args.work_dir.join(format!("optics0_MB_{name}.mad")),
        )?;
    }

    let error_path = error_table_path(
        &scenario.tables.root,
        scenario.tables.kind,
        scenario.energy_gev,
        seed,
    );
    let errors = ErrorTable::read(&error_path)?;
    let rotation_path = rotation_table_path(&scenario.tables.root);
    let rotations = RotationTable::read(&rotation_path)?;

    let gates = ToggleGates::from_vars(&model);
    let corrector = Micado::new(LinearOptics::default(), scenario.tune.micado);
    let assignment = assign_errors(
        &mut model,
        &errors,
        &rotations,
        &scenario.families,
        &gates,
        Some(&corrector),
        &scenario.assignment,
    )?;

    save_snapshot(&model, "errors", Some(seed), &args.out)?;
    let report = ErrorsReport {
        seed,
        error_table: error_path.display().to_string(),
        rotation_table: rotation_path.display().to_string(),
        assignment,
    };
    write_json(&args.out.with_file_name("errors_report.json"), &report)?;
    print_report(&report)
}
