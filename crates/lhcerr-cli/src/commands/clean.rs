use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use lhcerr_tune::{
    apply_knob_settings, check_knob_settings, install_correction_terms, install_octupole_knob,
    install_phase_knob, install_tuning_knobs, select_steering, tune_line, KnobCheckReport,
    LinearOptics, TuneReport,
};

use super::{load_snapshot, print_report, save_snapshot, write_json};
use crate::config::Scenario;

#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Input snapshot, typically from `lhcerr demo`.
    #[arg(long = "in")]
    pub input: PathBuf,
    /// Scenario YAML.
    #[arg(long)]
    pub scenario: PathBuf,
    /// Output snapshot.
    #[arg(long)]
    pub out: PathBuf,
}

#[derive(Debug, Serialize)]
struct CleanReport {
    knobs: KnobCheckReport,
    tunes: Vec<TuneReport>,
}

pub fn run(args: &CleanArgs) -> Result<(), Box<dyn Error>> {
    let (mut model, _) = load_snapshot(&args.input)?;
    let scenario = Scenario::load(&args.scenario)?;

    model.vars.set("nrj", scenario.energy_gev);
    install_tuning_knobs(&mut model, scenario.injection())?;
    install_octupole_knob(&mut model)?;
    install_phase_knob(&mut model)?;
    install_correction_terms(&mut model)?;
    select_steering(&mut model)?;

    let knobs = check_knob_settings(&mut model, &scenario.knob_settings)?;
    apply_knob_settings(&mut model, &scenario.knob_settings);

    let engine = LinearOptics::default();
    let lines: Vec<String> = model.line_names().map(str::to_string).collect();
    let mut tunes = Vec::with_capacity(lines.len());
    for line in &lines {
        let point = scenario.working_point(line);
        tunes.push(tune_line(
            &engine,
            &mut model,
            line,
            &point,
            None,
            &scenario.tune,
        )?);
    }

    save_snapshot(&model, "clean", None, &args.out)?;
    let report = CleanReport { knobs, tunes };
    write_json(&args.out.with_file_name("clean_report.json"), &report)?;
    print_report(&report)
}
