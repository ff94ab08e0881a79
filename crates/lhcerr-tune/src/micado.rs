//! Greedy trajectory correction against a reference orbit.
//!
//! The corrector measures the orbit response of every free steering
//! circuit by finite difference, then picks correctors one at a time,
//! keeping the candidate whose least-squares fit shrinks the residual
//! the most. Trims land on the `corr_co_…` circuit variables so the
//! crossing wiring underneath stays untouched.

use std::collections::BTreeMap;

use lhcerr_core::errors::{ErrorInfo, Fault};
use lhcerr_model::{
    LatticeModel, OpticsEngine, OpticsTable, SteeringOutcome, TrajectoryCorrector, TwissOptions,
};
use serde::{Deserialize, Serialize};

use crate::solve::least_squares_columns;

/// Controls for one correction pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MicadoOptions {
    /// Correctors the greedy selection may use per plane.
    pub n_micado: usize,
    /// Measure-and-correct sweeps per plane.
    pub n_iter: usize,
    /// Kick used to measure one corrector's orbit response.
    pub response_kick: f64,
}

impl Default for MicadoOptions {
    fn default() -> Self {
        Self {
            n_micado: 5,
            n_iter: 1,
            response_kick: 1.0e-6,
        }
    }
}

/// Corrects one line's orbit towards a reference optics table.
///
/// The residual is the current orbit minus the reference at the
/// steering monitors; both planes are corrected independently.
pub fn correct_trajectory(
    engine: &dyn OpticsEngine,
    model: &mut LatticeModel,
    line: &str,
    reference: &OpticsTable,
    options: &MicadoOptions,
) -> Result<SteeringOutcome, Fault> {
    let (correctors_x, correctors_y, monitors_x, monitors_y) = {
        let lattice = model.require_line(line)?;
        if lattice.steering_correctors_x.is_empty() || lattice.steering_correctors_y.is_empty() {
            return Err(
                steering_fault("no-steering-correctors", "no steering correctors found in the line")
                    .with_context("line", line),
            );
        }
        if lattice.steering_monitors_x.is_empty() || lattice.steering_monitors_y.is_empty() {
            return Err(
                steering_fault("no-steering-monitors", "no steering monitors found in the line")
                    .with_context("line", line),
            );
        }
        (
            lattice.steering_correctors_x.clone(),
            lattice.steering_correctors_y.clone(),
            lattice.steering_monitors_x.clone(),
            lattice.steering_monitors_y.clone(),
        )
    };

    let mut trims = BTreeMap::new();
    let before = engine.twiss(model, line, &TwissOptions::new())?;
    let rms_x_before = rms_residual(&before, reference, &monitors_x, Plane::Horizontal)?;
    let rms_y_before = rms_residual(&before, reference, &monitors_y, Plane::Vertical)?;

    correct_plane(
        engine,
        model,
        line,
        &correctors_x,
        &monitors_x,
        reference,
        Plane::Horizontal,
        options,
        &mut trims,
    )?;
    correct_plane(
        engine,
        model,
        line,
        &correctors_y,
        &monitors_y,
        reference,
        Plane::Vertical,
        options,
        &mut trims,
    )?;

    let after = engine.twiss(model, line, &TwissOptions::new())?;
    Ok(SteeringOutcome {
        line: line.to_string(),
        rms_x_before,
        rms_y_before,
        rms_x_after: rms_residual(&after, reference, &monitors_x, Plane::Horizontal)?,
        rms_y_after: rms_residual(&after, reference, &monitors_y, Plane::Vertical)?,
        trims,
    })
}

/// Trajectory corrector that computes its own reference with errors
/// forced off, then steers the live orbit back onto it.
#[derive(Debug, Clone)]
pub struct Micado<E> {
    engine: E,
    options: MicadoOptions,
}

impl<E: OpticsEngine> Micado<E> {
    /// Corrector over an owned engine.
    pub fn new(engine: E, options: MicadoOptions) -> Self {
        Self { engine, options }
    }
}

impl<E: OpticsEngine> TrajectoryCorrector for Micado<E> {
    fn correct_trajectory(
        &self,
        model: &mut LatticeModel,
        line: &str,
    ) -> Result<SteeringOutcome, Fault> {
        let reference = self
            .engine
            .twiss(model, line, &TwissOptions::new().with_errors(false))?;
        correct_trajectory(&self.engine, model, line, &reference, &self.options)
    }
}

/// Corrects every line once when the orbit window is open: errors live
/// and at least one of the label-1 toggles set. Returns an empty list
/// when the window is closed.
pub fn consider_micado(
    engine: &dyn OpticsEngine,
    model: &mut LatticeModel,
    options: &MicadoOptions,
) -> Result<Vec<SteeringOutcome>, Fault> {
    if model.vars.value_or("on_errors", 0.0) == 0.0 {
        return Ok(Vec::new());
    }
    let window: f64 = ["on_a1s", "on_a1r", "on_b1s", "on_b1r"]
        .iter()
        .map(|gate| model.vars.value_or(gate, 0.0).powi(2))
        .sum();
    if window <= 0.0 {
        return Ok(Vec::new());
    }
    let lines: Vec<String> = model.line_names().map(str::to_string).collect();
    let mut outcomes = Vec::with_capacity(lines.len());
    for line in lines {
        let reference = engine.twiss(model, &line, &TwissOptions::new().with_errors(false))?;
        outcomes.push(correct_trajectory(
            engine, model, &line, &reference, options,
        )?);
    }
    Ok(outcomes)
}

#[derive(Clone, Copy, PartialEq)]
enum Plane {
    Horizontal,
    Vertical,
}

impl Plane {
    fn read(self, row: &lhcerr_model::OpticsRow) -> f64 {
        match self {
            Plane::Horizontal => row.x,
            Plane::Vertical => row.y,
        }
    }
}

/// Where a corrector's trim lands.
enum TrimTarget {
    /// A literal circuit variable, usually `corr_co_{circuit}`.
    Var(String),
    /// Direct integrated strength on the element, for correctors with
    /// no trimmable circuit.
    Array { element: String, skew: bool },
}

impl TrimTarget {
    fn key(&self) -> &str {
        match self {
            TrimTarget::Var(name) => name,
            TrimTarget::Array { element, .. } => element,
        }
    }
}

fn resolve_trim(
    model: &LatticeModel,
    line: &str,
    corrector: &str,
    plane: Plane,
) -> Result<TrimTarget, Fault> {
    let element = model.require_line(line)?.lookup(corrector)?;
    if let Some(knob) = element.knob.as_deref() {
        let trim = format!("corr_co_{knob}");
        if model.vars.contains(&trim) {
            return Ok(TrimTarget::Var(trim));
        }
        if !matches!(
            model.vars.get(knob),
            Some(lhcerr_model::VarDef::Expression(_))
        ) {
            return Ok(TrimTarget::Var(knob.to_string()));
        }
    }
    Ok(TrimTarget::Array {
        element: corrector.to_string(),
        skew: plane == Plane::Vertical,
    })
}

fn read_trim(model: &LatticeModel, line: &str, target: &TrimTarget) -> Result<f64, Fault> {
    match target {
        TrimTarget::Var(name) => Ok(model.vars.value_or(name, 0.0)),
        TrimTarget::Array { element, skew } => {
            let found = model.require_line(line)?.lookup(element)?;
            let array = if *skew { &found.ksl } else { &found.knl };
            Ok(array.first().copied().unwrap_or(0.0))
        }
    }
}

fn write_trim(
    model: &mut LatticeModel,
    line: &str,
    target: &TrimTarget,
    value: f64,
) -> Result<(), Fault> {
    match target {
        TrimTarget::Var(name) => {
            model.vars.set(name.clone(), value);
            Ok(())
        }
        TrimTarget::Array { element, skew } => {
            let lattice = model.require_line_mut(line)?;
            let found = lattice.element_mut(element).ok_or_else(|| {
                steering_fault("unknown-corrector", "steering corrector is not in the line")
                    .with_context("line", line)
                    .with_context("element", element)
            })?;
            found.extend_order(0);
            let array = if *skew {
                &mut found.ksl
            } else {
                &mut found.knl
            };
            array[0] = value;
            Ok(())
        }
    }
}

fn residuals(
    table: &OpticsTable,
    reference: &OpticsTable,
    monitors: &[String],
    plane: Plane,
) -> Result<Vec<f64>, Fault> {
    monitors
        .iter()
        .map(|monitor| {
            let now = table.row(monitor).ok_or_else(|| {
                steering_fault("unknown-monitor", "steering monitor is not in the optics table")
                    .with_context("monitor", monitor)
            })?;
            let reference_row = reference.row(monitor).ok_or_else(|| {
                steering_fault("unknown-monitor", "steering monitor is not in the reference")
                    .with_context("monitor", monitor)
            })?;
            Ok(plane.read(now) - plane.read(reference_row))
        })
        .collect()
}

fn rms_residual(
    table: &OpticsTable,
    reference: &OpticsTable,
    monitors: &[String],
    plane: Plane,
) -> Result<f64, Fault> {
    let residual = residuals(table, reference, monitors, plane)?;
    let n = residual.len().max(1) as f64;
    Ok((residual.iter().map(|r| r * r).sum::<f64>() / n).sqrt())
}

#[allow(clippy::too_many_arguments)]
fn correct_plane(
    engine: &dyn OpticsEngine,
    model: &mut LatticeModel,
    line: &str,
    correctors: &[String],
    monitors: &[String],
    reference: &OpticsTable,
    plane: Plane,
    options: &MicadoOptions,
    trims: &mut BTreeMap<String, f64>,
) -> Result<(), Fault> {
    let targets: Vec<TrimTarget> = correctors
        .iter()
        .map(|corrector| resolve_trim(model, line, corrector, plane))
        .collect::<Result<_, _>>()?;

    for _ in 0..options.n_iter {
        let base = engine.twiss(model, line, &TwissOptions::new())?;
        let residual = residuals(&base, reference, monitors, plane)?;

        // Orbit response of each corrector, one finite difference per
        // circuit.
        let mut columns = Vec::with_capacity(targets.len());
        for target in &targets {
            let rest = read_trim(model, line, target)?;
            write_trim(model, line, target, rest + options.response_kick)?;
            let kicked = engine.twiss(model, line, &TwissOptions::new())?;
            write_trim(model, line, target, rest)?;
            let shifted = residuals(&kicked, reference, monitors, plane)?;
            let column: Vec<f64> = shifted
                .iter()
                .zip(&residual)
                .map(|(new, old)| (new - old) / options.response_kick)
                .collect();
            columns.push(column);
        }

        let selected = select_greedy(&columns, &residual, options.n_micado);
        if selected.is_empty() {
            break;
        }
        let picked: Vec<Vec<f64>> = selected.iter().map(|&i| columns[i].clone()).collect();
        let negated: Vec<f64> = residual.iter().map(|r| -r).collect();
        let kicks = match least_squares_columns(&picked, &negated, 1e-18) {
            Some(kicks) => kicks,
            None => break,
        };
        for (&index, &kick) in selected.iter().zip(&kicks) {
            let target = &targets[index];
            let rest = read_trim(model, line, target)?;
            write_trim(model, line, target, rest + kick)?;
            *trims.entry(target.key().to_string()).or_insert(0.0) += kick;
        }
    }
    Ok(())
}

/// Greedy micado pick: add the corrector whose least-squares fit leaves
/// the smallest residual, stop early when nothing improves.
fn select_greedy(columns: &[Vec<f64>], residual: &[f64], n_micado: usize) -> Vec<usize> {
    let mut selected: Vec<usize> = Vec::new();
    let mut best_norm = norm(residual);
    let budget = n_micado.min(columns.len());
    while selected.len() < budget {
        let mut best: Option<(usize, f64)> = None;
        for candidate in 0..columns.len() {
            if selected.contains(&candidate) {
                continue;
            }
            let mut trial: Vec<Vec<f64>> = selected.iter().map(|&i| columns[i].clone()).collect();
            trial.push(columns[candidate].clone());
            let negated: Vec<f64> = residual.iter().map(|r| -r).collect();
            let Some(kicks) = least_squares_columns(&trial, &negated, 1e-18) else {
                continue;
            };
            let mut left = residual.to_vec();
            for (column, kick) in trial.iter().zip(&kicks) {
                for (value, response) in left.iter_mut().zip(column) {
                    *value += response * kick;
                }
            }
            let score = norm(&left);
            if best.map_or(true, |(_, held)| score < held) {
                best = Some((candidate, score));
            }
        }
        match best {
            Some((index, score)) if score < best_norm => {
                selected.push(index);
                best_norm = score;
            }
            _ => break,
        }
    }
    selected
}

fn norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}

fn steering_fault(code: impl Into<String>, message: impl Into<String>) -> Fault {
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
