//! Damped Gauss-Newton matching of global optics figures.
//!
//! A match varies literal knob variables until every target figure is
//! inside its tolerance. The staircase variant walks a ladder of
//! tolerances, skipping stages the previous penalty already satisfies.

use lhcerr_core::errors::{ErrorInfo, Fault};
use lhcerr_model::{LatticeModel, OpticsEngine, OpticsTable, TwissOptions, VarDef};
use serde::{Deserialize, Serialize};

use crate::solve::least_squares_columns;

/// Damping added to the normal-equation diagonal of each update.
const STEP_DAMPING: f64 = 1e-12;

/// One knob the matcher may move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vary {
    /// Variable name; must hold a literal value, not an expression.
    pub name: String,
    /// Finite-difference step for the response measurement.
    pub step: f64,
    /// Powering limits clamped after every update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<[f64; 2]>,
}

impl Vary {
    /// A free vary with the given response step.
    pub fn new(name: impl Into<String>, step: f64) -> Self {
        Self {
            name: name.into(),
            step,
            limits: None,
        }
    }

    /// Clamps the vary between two powering limits.
    pub fn with_limits(mut self, low: f64, high: f64) -> Self {
        self.limits = Some([low, high]);
        self
    }
}

/// Global figure a target constrains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Horizontal tune.
    Qx,
    /// Vertical tune.
    Qy,
    /// Horizontal chromaticity.
    Dqx,
    /// Vertical chromaticity.
    Dqy,
    /// Real part of the coupling term.
    CMinusRe,
    /// Imaginary part of the coupling term.
    CMinusIm,
}

impl TargetKind {
    /// Reads the constrained figure from a computed table.
    pub fn read(&self, table: &OpticsTable) -> f64 {
        match self {
            TargetKind::Qx => table.qx,
            TargetKind::Qy => table.qy,
            TargetKind::Dqx => table.dqx,
            TargetKind::Dqy => table.dqy,
            TargetKind::CMinusRe => table.c_minus_re,
            TargetKind::CMinusIm => table.c_minus_im,
        }
    }
}

/// One matching target with its own tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchTarget {
    /// Figure being constrained.
    pub kind: TargetKind,
    /// Requested value.
    pub value: f64,
    /// Acceptable absolute residual.
    pub tolerance: f64,
}

impl MatchTarget {
    /// Target at a value within a tolerance.
    pub fn new(kind: TargetKind, value: f64, tolerance: f64) -> Self {
        Self {
            kind,
            value,
            tolerance,
        }
    }
}

/// Matching controls; the twiss options are passed through to every
/// evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOptions {
    /// Options forwarded to each twiss evaluation.
    pub twiss: TwissOptions,
    /// Gauss-Newton updates before giving up.
    pub max_iterations: usize,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            twiss: TwissOptions::new(),
            max_iterations: 32,
        }
    }
}

/// Outcome of one matching run. Non-convergence is data here; the
/// staircase caller decides when it becomes a fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    /// Whether every residual ended inside its tolerance.
    pub converged: bool,
    /// Gauss-Newton updates performed.
    pub iterations: usize,
    /// Euclidean norm of the final residual vector.
    pub penalty: f64,
    /// Final residual per target, in target order.
    pub residuals: Vec<f64>,
    /// Twiss evaluations spent, response measurements included.
    pub twiss_evaluations: usize,
}

/// One stage of a tolerance staircase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaircaseStage {
    /// Tolerance this stage was asked to reach.
    pub tolerance: f64,
    /// Whether the previous penalty already satisfied the tolerance.
    pub skipped: bool,
    /// The match outcome; `None` for skipped stages.
    pub outcome: Option<MatchOutcome>,
}

/// Matches a set of targets by varying literal knobs.
///
/// Expression-valued vary names are rejected: a deferred definition
/// would be silently overwritten by the update, severing its inputs.
pub fn match_targets(
    engine: &dyn OpticsEngine,
    model: &mut LatticeModel,
    line: &str,
    varies: &[Vary],
    targets: &[MatchTarget],
    options: &MatchOptions,
) -> Result<MatchOutcome, Fault> {
    if varies.is_empty() {
        return Err(match_fault("no-varies", "matching needs at least one vary"));
    }
    if targets.is_empty() {
        return Err(match_fault(
            "no-targets",
            "matching needs at least one target",
        ));
    }
    let mut values = Vec::with_capacity(varies.len());
    for vary in varies {
        if let Some(VarDef::Expression(expr)) = model.vars.get(&vary.name) {
            return Err(match_fault(
                "vary-not-literal",
                "vary target holds a deferred expression",
            )
            .with_context("variable", &vary.name)
            .with_context("expression", expr));
        }
        values.push(model.vars.value_or(&vary.name, 0.0));
    }

    let mut evaluations = 0usize;
    let mut iterations = 0usize;
    loop {
        let table = engine.twiss(model, line, &options.twiss)?;
        evaluations += 1;
        let residuals: Vec<f64> = targets
            .iter()
            .map(|target| target.kind.read(&table) - target.value)
            .collect();
        let penalty = residuals.iter().map(|r| r * r).sum::<f64>().sqrt();
        let converged = residuals
            .iter()
            .zip(targets)
            .all(|(residual, target)| residual.abs() <= target.tolerance);
        if converged || iterations >= options.max_iterations {
            return Ok(MatchOutcome {
                converged,
                iterations,
                penalty,
                residuals,
                twiss_evaluations: evaluations,
            });
        }

        // One response column per vary, by forward difference.
        let mut columns = Vec::with_capacity(varies.len());
        for (vary, &value) in varies.iter().zip(&values) {
            model.vars.set(vary.name.clone(), value + vary.step);
            let perturbed = engine.twiss(model, line, &options.twiss)?;
            evaluations += 1;
            model.vars.set(vary.name.clone(), value);
            let column: Vec<f64> = targets
                .iter()
                .map(|target| (target.kind.read(&perturbed) - target.kind.read(&table)) / vary.step)
                .collect();
            columns.push(column);
        }
        let negated: Vec<f64> = residuals.iter().map(|r| -r).collect();
        let delta = least_squares_columns(&columns, &negated, STEP_DAMPING).ok_or_else(|| {
            match_fault("singular-response", "response matrix is singular")
                .with_context("line", line)
        })?;
        for ((vary, value), step) in varies.iter().zip(&mut values).zip(&delta) {
            *value += step;
            if let Some([low, high]) = vary.limits {
                *value = value.clamp(low, high);
            }
            model.vars.set(vary.name.clone(), *value);
        }
        iterations += 1;
    }
}

/// Runs a match through a ladder of tolerances.
///
/// Each stage replaces every target tolerance with the stage tolerance
/// and every vary step with a tenth of it. A stage is skipped when the
/// penalty left by the previous one is already below its tolerance; the
/// first stage always runs.
pub fn staircase_match(
    engine: &dyn OpticsEngine,
    model: &mut LatticeModel,
    line: &str,
    varies: &[Vary],
    targets: &[MatchTarget],
    ladder: &[f64],
    options: &MatchOptions,
) -> Result<Vec<StaircaseStage>, Fault> {
    if ladder.is_empty() {
        return Err(match_fault(
            "empty-ladder",
            "staircase matching needs at least one tolerance",
        ));
    }
    let mut stages = Vec::with_capacity(ladder.len());
    let mut penalty = f64::INFINITY;
    for &tolerance in ladder {
        if penalty < tolerance {
            stages.push(StaircaseStage {
                tolerance,
                skipped: true,
                outcome: None,
            });
            continue;
        }
        let stage_varies: Vec<Vary> = varies
            .iter()
            .map(|vary| Vary {
                step: tolerance * 0.1,
                ..vary.clone()
            })
            .collect();
        let stage_targets: Vec<MatchTarget> = targets
            .iter()
            .map(|target| MatchTarget {
                tolerance,
                ..*target
            })
            .collect();
        let outcome = match_targets(engine, model, line, &stage_varies, &stage_targets, options)?;
        penalty = outcome.penalty;
        stages.push(StaircaseStage {
            tolerance,
            skipped: false,
            outcome: Some(outcome),
        });
    }
    Ok(stages)
}

fn match_fault(code: impl Into<String>, message: impl Into<String>) -> Fault {
    Fault::Matching(ErrorInfo::new(code, message))
}

trait ContextExt {
    fn with_context(self, key: impl Into<String>, value: impl ToString) -> Fault;
}

impl ContextExt for Fault {
    fn with_context(self, key: impl Into<String>, value: impl ToString) -> Fault {
        match self {
            Fault::Matching(info) => Fault::Matching(info.with_context(key, value.to_string())),
            other => other,
        }
    }
}
