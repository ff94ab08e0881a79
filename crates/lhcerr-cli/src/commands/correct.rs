use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use serde::Serialize;

use lhcerr_corr::{run_correction, CorrectionBridge, CorrectionSummary};
use lhcerr_model::{OpticsEngine, SteeringOutcome, TwissOptions};
use lhcerr_tune::{consider_micado, restore_crossing, tune_line, LinearOptics, TuneReport};

use super::{load_snapshot, print_report, save_snapshot, write_json};
use crate::config::Scenario;

#[derive(Args, Debug)]
pub struct CorrectArgs {
    /// Input snapshot from the errors stage.
    #[arg(long = "in")]
    pub input: PathBuf,
    /// Scenario YAML.
    #[arg(long)]
    pub scenario: PathBuf,
    /// Output snapshot.
    #[arg(long)]
    pub out: PathBuf,
    /// Work dir holding the solver tables from the errors stage.
    #[arg(long, default_value = "runs/work")]
    pub work_dir: PathBuf,
    /// Tune summary CSV; defaults next to the output snapshot.
    #[arg(long)]
    pub csv: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct CorrectReport {
    correction: CorrectionSummary,
    steering: Vec<SteeringOutcome>,
    tunes: Vec<TuneReport>,
}

pub fn run(args: &CorrectArgs) -> Result<(), Box<dyn Error>> {
    let (mut model, provenance) = load_snapshot(&args.input)?;
    let scenario = Scenario::load(&args.scenario)?;

    let bridge = CorrectionBridge::new(&scenario.correction.binary, &args.work_dir);
    let correction = run_correction(&mut model, &bridge)?;

    let engine = LinearOptics::default();
    let steering = consider_micado(&engine, &mut model, &scenario.tune.micado)?;
    restore_crossing(&mut model, &scenario.crossing_settings());

    let lines: Vec<String> = model.line_names().map(str::to_string).collect();
    let mut tunes = Vec::with_capacity(lines.len());
    for name in &lines {
        let reference = engine.twiss(&model, name, &TwissOptions::new().with_errors(false))?;
        let had_method = model.require_line(name)?.twiss_method;
        let point = scenario.working_point(name);
        tunes.push(tune_line(
            &engine,
            &mut model,
            name,
            &point,
            Some(&reference),
            &scenario.tune,
        )?);
        // The matching override is transient; a line that carried no
        // stored method leaves the pipeline without one.
        if had_method.is_none() {
            if let Some(line) = model.line_mut(name) {
                line.twiss_method = None;
            }
        }
    }

    let csv_path = match &args.csv {
        Some(path) => path.clone(),
        None => args.out.with_file_name("tune_summary.csv"),
    };
    write_tune_csv(&csv_path, &tunes)?;

    save_snapshot(&model, "correct", provenance.seed, &args.out)?;
    let report = CorrectReport {
        correction,
        steering,
        tunes,
    };
    write_json(&args.out.with_file_name("correct_report.json"), &report)?;
    print_report(&report)
}

fn write_tune_csv(path: &Path, tunes: &[TuneReport]) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["line", "qx", "qy", "dqx", "dqy", "c_minus_re", "c_minus_im"])?;
    for report in tunes {
        writer.write_record([
            report.line.clone(),
            format!("{:.9}", report.qx),
            format!("{:.9}", report.qy),
            format!("{:.9}", report.dqx),
            format!("{:.9}", report.dqy),
            format!("{:.9}", report.c_minus_re),
            format!("{:.9}", report.c_minus_im),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
