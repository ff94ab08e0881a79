//! Per-line tuning sequence: steering, tune and chromaticity staircase,
//! coupling, and a final re-match.

use lhcerr_core::errors::{ErrorInfo, Fault};
use lhcerr_core::TwissMethod;
use lhcerr_model::{
    LatticeModel, OpticsEngine, OpticsTable, SteeringOutcome, TwissOptions, VarDef,
};
use serde::{Deserialize, Serialize};

use crate::linear::beam_suffix;
use crate::matcher::{
    staircase_match, MatchOptions, MatchTarget, StaircaseStage, TargetKind, Vary,
};
use crate::micado::{correct_trajectory, MicadoOptions};

/// Target optics figures for one line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkingPoint {
    /// Horizontal tune.
    pub qx: f64,
    /// Vertical tune.
    pub qy: f64,
    /// Horizontal chromaticity.
    pub dqx: f64,
    /// Vertical chromaticity.
    pub dqy: f64,
    /// Target coupling modulus, matched onto the real part.
    pub c_minus: f64,
    /// Octupole current in A, applied only when non-zero.
    pub octupole_current: Option<f64>,
    /// Phase knob setting, applied only when non-zero.
    pub phase_knob: Option<f64>,
}

impl Default for WorkingPoint {
    fn default() -> Self {
        Self {
            qx: 62.28,
            qy: 60.31,
            dqx: 2.0,
            dqy: 2.0,
            c_minus: 0.001,
            octupole_current: None,
            phase_knob: None,
        }
    }
}

/// Controls for [`tune_line`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuneOptions {
    /// Tolerance ladder for the tune and chromaticity staircase.
    pub tune_ladder: Vec<f64>,
    /// Tolerance ladder for the coupling staircase.
    pub coupling_ladder: Vec<f64>,
    /// Trim limits for the coupling knobs.
    pub coupling_limits: [f64; 2],
    /// Trajectory-correction controls used when an orbit reference is given.
    pub micado: MicadoOptions,
}

impl Default for TuneOptions {
    fn default() -> Self {
        Self {
            tune_ladder: vec![1.0e-4, 2.0e-5, 5.0e-6, 1.0e-6],
            coupling_ladder: vec![5.0e-5],
            coupling_limits: [-5.0e-3, 5.0e-3],
            micado: MicadoOptions::default(),
        }
    }
}

/// Everything one [`tune_line`] run did, stage by stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuneReport {
    /// Line that was tuned.
    pub line: String,
    /// Trajectory correction, when an orbit reference was given.
    pub steering: Option<SteeringOutcome>,
    /// Tune and chromaticity staircase stages.
    pub tune_stages: Vec<StaircaseStage>,
    /// Coupling staircase stages.
    pub coupling_stages: Vec<StaircaseStage>,
    /// Tune and chromaticity re-match after the coupling correction.
    pub retune_stages: Vec<StaircaseStage>,
    /// Final horizontal tune.
    pub qx: f64,
    /// Final vertical tune.
    pub qy: f64,
    /// Final horizontal chromaticity.
    pub dqx: f64,
    /// Final vertical chromaticity.
    pub dqy: f64,
    /// Final coupling term, real part.
    pub c_minus_re: f64,
    /// Final coupling term, imaginary part.
    pub c_minus_im: f64,
}

/// Steers and matches one line onto its working point.
///
/// Octupole current and phase knob are applied first when set and
/// non-zero. The line's ambient twiss method is forced to `FourD` for
/// the duration; a previously stored method is put back on every exit
/// path, while a line that had none keeps the `FourD` override. The
/// matching stages themselves always request a `SixD` solution. The
/// final staircase stage of each matching phase must converge.
pub fn tune_line(
    engine: &dyn OpticsEngine,
    model: &mut LatticeModel,
    line: &str,
    working_point: &WorkingPoint,
    orbit_reference: Option<&OpticsTable>,
    options: &TuneOptions,
) -> Result<TuneReport, Fault> {
    if let Some(current) = working_point.octupole_current {
        if current != 0.0 {
            model.vars.set("i_mo", current);
        }
    }
    if let Some(phase) = working_point.phase_knob {
        if phase != 0.0 {
            // Whole knob units only.
            model.vars.set("phase_change", phase.trunc());
        }
    }

    let previous = model.require_line(line)?.twiss_method;
    model.require_line_mut(line)?.twiss_method = Some(TwissMethod::FourD);
    let report = tune_line_stages(engine, model, line, working_point, orbit_reference, options);
    if let (Some(method), Some(lattice)) = (previous, model.line_mut(line)) {
        lattice.twiss_method = Some(method);
    }
    report
}

fn tune_line_stages(
    engine: &dyn OpticsEngine,
    model: &mut LatticeModel,
    line: &str,
    working_point: &WorkingPoint,
    orbit_reference: Option<&OpticsTable>,
    options: &TuneOptions,
) -> Result<TuneReport, Fault> {
    let steering = match orbit_reference {
        Some(reference) => Some(correct_trajectory(
            engine,
            model,
            line,
            reference,
            &options.micado,
        )?),
        None => None,
    };

    let match_options = MatchOptions {
        twiss: TwissOptions::new().with_method(TwissMethod::SixD),
        ..MatchOptions::default()
    };
    let beam = beam_suffix(model.require_line(line)?);

    let tune_tol = options.tune_ladder.last().copied().unwrap_or(1.0e-3);
    let tune_varies = [
        Vary::new(trim_target(model, beam, "kqtf"), tune_tol * 0.1),
        Vary::new(trim_target(model, beam, "kqtd"), tune_tol * 0.1),
        Vary::new(trim_target(model, beam, "ksf"), tune_tol * 0.1),
        Vary::new(trim_target(model, beam, "ksd"), tune_tol * 0.1),
    ];
    let tune_targets = [
        MatchTarget::new(TargetKind::Qx, working_point.qx, tune_tol),
        MatchTarget::new(TargetKind::Qy, working_point.qy, tune_tol),
        MatchTarget::new(TargetKind::Dqx, working_point.dqx, tune_tol),
        MatchTarget::new(TargetKind::Dqy, working_point.dqy, tune_tol),
    ];

    let tune_stages = staircase_match(
        engine,
        model,
        line,
        &tune_varies,
        &tune_targets,
        &options.tune_ladder,
        &match_options,
    )?;
    require_convergence(&tune_stages, line, "tune")?;

    let coupling_tol = options.coupling_ladder.last().copied().unwrap_or(5.0e-5);
    let [low, high] = options.coupling_limits;
    let coupling_varies = [
        Vary::new(trim_target(model, beam, "cmrs"), coupling_tol * 0.1).with_limits(low, high),
        Vary::new(trim_target(model, beam, "cmis"), coupling_tol * 0.1).with_limits(low, high),
    ];
    let coupling_targets = [
        MatchTarget::new(TargetKind::CMinusRe, working_point.c_minus, coupling_tol),
        MatchTarget::new(TargetKind::CMinusIm, 0.0, coupling_tol),
    ];
    let coupling_stages = staircase_match(
        engine,
        model,
        line,
        &coupling_varies,
        &coupling_targets,
        &options.coupling_ladder,
        &match_options,
    )?;
    require_convergence(&coupling_stages, line, "coupling")?;

    let retune_stages = staircase_match(
        engine,
        model,
        line,
        &tune_varies,
        &tune_targets,
        &options.tune_ladder,
        &match_options,
    )?;
    require_convergence(&retune_stages, line, "retune")?;

    let table = engine.twiss(model, line, &match_options.twiss)?;
    Ok(TuneReport {
        line: line.to_string(),
        steering,
        tune_stages,
        coupling_stages,
        retune_stages,
        qx: table.qx,
        qy: table.qy,
        dqx: table.dqx,
        dqy: table.dqy,
        c_minus_re: table.c_minus_re,
        c_minus_im: table.c_minus_im,
    })
}

/// Per-beam circuit while it is a free literal, bare root knob once the
/// circuit has been re-rooted onto an expression by a folded correction.
fn trim_target(model: &LatticeModel, beam: &str, root: &str) -> String {
    let circuit = format!("{root}.{beam}");
    match model.vars.get(&circuit) {
        Some(VarDef::Expression(_)) => root.to_string(),
        _ => circuit,
    }
}

fn require_convergence(stages: &[StaircaseStage], line: &str, phase: &str) -> Result<(), Fault> {
    let Some(stage) = stages.last() else {
        return Ok(());
    };
    if let Some(outcome) = &stage.outcome {
        if !outcome.converged {
            return Err(Fault::Matching(
                ErrorInfo::new("not-converged", "matching did not reach its final tolerance")
                    .with_context("line", line)
                    .with_context("stage", phase)
                    .with_context("penalty", format!("{:.3e}", outcome.penalty)),
            ));
        }
    }
    Ok(())
}
