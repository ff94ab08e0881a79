use std::error::Error;
use std::path::{Path, PathBuf};

use clap::Args;
use serde::Serialize;

use lhcerr_assign::{
    demo_error_table, demo_rotation_table, error_table_path, rotation_table_path,
    store_error_table, store_rotation_table, Regime, TableKind,
};
use lhcerr_model::{build_demo_model, model_content_hash, LatticeModel};
use lhcerr_tune::{
    install_correction_terms, install_octupole_knob, install_phase_knob, install_tuning_knobs,
    select_steering,
};

use super::{print_report, save_snapshot};

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Destination snapshot file.
    #[arg(long, default_value = "runs/demo/model.json")]
    pub out: PathBuf,
    /// Seed for the demo error table and the snapshot provenance.
    #[arg(long, default_value_t = 1)]
    pub seed: u64,
    /// Also write demo error and rotation tables under this root.
    #[arg(long)]
    pub tables: Option<PathBuf>,
    /// Beam energy in GeV, for the knob regime and table file name.
    #[arg(long, default_value_t = 6800.0)]
    pub energy_gev: f64,
}

#[derive(Debug, Serialize)]
struct DemoReport {
    snapshot: String,
    model_hash: String,
    variables: usize,
    lines: Vec<LineSummary>,
    tables: Option<TablesSummary>,
}

#[derive(Debug, Serialize)]
struct LineSummary {
    name: String,
    elements: usize,
    correctors_x: usize,
    correctors_y: usize,
    monitors: usize,
}

#[derive(Debug, Serialize)]
struct TablesSummary {
    error_table: String,
    rotation_table: String,
    slots: usize,
}

pub fn run(args: &DemoArgs) -> Result<(), Box<dyn Error>> {
    let mut model = build_demo_model()?;
    let injection = Regime::for_energy(args.energy_gev) == Regime::Injection;
    install_tuning_knobs(&mut model, injection)?;
    install_octupole_knob(&mut model)?;
    install_phase_knob(&mut model)?;
    install_correction_terms(&mut model)?;
    select_steering(&mut model)?;

    let tables = match &args.tables {
        Some(root) => Some(write_demo_tables(&model, root, args.seed, args.energy_gev)?),
        None => None,
    };

    save_snapshot(&model, "demo", Some(args.seed), &args.out)?;

    let lines = model
        .lines()
        .map(|(name, line)| LineSummary {
            name: name.to_string(),
            elements: line.len(),
            correctors_x: line.steering_correctors_x.len(),
            correctors_y: line.steering_correctors_y.len(),
            monitors: line.steering_monitors_x.len(),
        })
        .collect();
    print_report(&DemoReport {
        snapshot: args.out.display().to_string(),
        model_hash: model_content_hash(&model)?,
        variables: model.vars.names().count(),
        lines,
        tables,
    })
}

fn write_demo_tables(
    model: &LatticeModel,
    root: &Path,
    seed: u64,
    energy_gev: f64,
) -> Result<TablesSummary, Box<dyn Error>> {
    let errors = demo_error_table(model, seed);
    let error_path = error_table_path(root, TableKind::Wise, energy_gev, seed);
    store_error_table(&errors, &error_path)?;
    let rotations = demo_rotation_table();
    let rotation_path = rotation_table_path(root);
    store_rotation_table(&rotations, &rotation_path)?;
    Ok(TablesSummary {
        error_table: error_path.display().to_string(),
        rotation_table: rotation_path.display().to_string(),
        slots: errors.len(),
    })
}
