//! Folding solver settings back onto the machine variable graph.

use serde::{Deserialize, Serialize};

use lhcerr_core::errors::Fault;
use lhcerr_model::{Expr, LatticeModel, VarDef};
use lhcerr_tfs::{store_errors, DEFAULT_ERROR_PATTERNS};

use crate::bridge::CorrectionBridge;

/// How one settings file landed on the variable graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldReport {
    /// Settings that defined a previously unknown variable.
    pub created: usize,
    /// Settings accumulated onto an existing definition.
    pub accumulated: usize,
    /// Settings that replaced an existing definition outright.
    pub overwritten: usize,
}

/// Per-line outcome of a correction run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineCorrection {
    /// Line the solver ran for.
    pub line: String,
    /// Number of settings parsed from the solver output.
    pub settings: usize,
    /// How the settings landed on the variable graph.
    pub fold: FoldReport,
}

/// Outcome of [`run_correction`] across every line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionSummary {
    /// Per-line outcomes, in model line order.
    pub lines: Vec<LineCorrection>,
}

/// Installs the trim aliases the solver settings are written against.
///
/// The per-beam tune circuits are re-rooted onto their bare knob plus
/// whatever trim they currently hold, so the solver's `kqtf`/`kqtd`
/// terms reach both beams while earlier tuning survives. The skew
/// settings arrive as `cmrskew`/`cmiskew`; those are chained between
/// the bare knob and the live per-beam circuits. Runs once, keyed on
/// `cmrskew`.
pub fn install_trim_aliases(model: &mut LatticeModel) -> Result<(), Fault> {
    if model.vars.contains("cmrskew") {
        return Ok(());
    }
    for root in ["kqtf", "kqtd"] {
        model.vars.define_default(root, 0.0);
        for beam in ["b1", "b2"] {
            reroot(model, &format!("{root}.{beam}"), root)?;
        }
    }
    for (alias, root) in [("cmrskew", "cmrs"), ("cmiskew", "cmis")] {
        model.vars.define_default(root, 0.0);
        model.vars.set_expr(alias, Expr::var(root))?;
        for beam in ["b1", "b2"] {
            reroot(model, &format!("{root}.{beam}"), alias)?;
        }
    }
    Ok(())
}

/// Points a literal circuit at `feed` while keeping its held trim.
fn reroot(model: &mut LatticeModel, circuit: &str, feed: &str) -> Result<(), Fault> {
    if matches!(model.vars.get(circuit), Some(VarDef::Expression(_))) {
        return Ok(());
    }
    let held = model.vars.value_or(circuit, 0.0);
    let expr = if held == 0.0 {
        Expr::var(feed)
    } else {
        Expr::var(feed).add(Expr::number(held))
    };
    model.vars.set_expr(circuit, expr)
}

/// Folds parsed settings into the variable graph.
///
/// Existing variables accumulate the new term and unknown names are
/// defined by it. The radiation-loss constant `prad` is replaced
/// outright, since it is a measurement rather than a trim.
pub fn fold_settings(
    model: &mut LatticeModel,
    settings: &[(String, Expr)],
) -> Result<FoldReport, Fault> {
    let mut report = FoldReport::default();
    for (name, expr) in settings {
        if !model.vars.contains(name) {
            model.vars.set_expr(name.clone(), expr.clone())?;
            report.created += 1;
        } else if name == "prad" {
            model.vars.set_expr(name.clone(), expr.clone())?;
            report.overwritten += 1;
        } else {
            model.vars.add_to(name.clone(), expr.clone())?;
            report.accumulated += 1;
        }
    }
    Ok(report)
}

/// Runs the external correction for every line and folds the results.
///
/// The error-field tables are rewritten first so the solver sees the
/// errors as currently assigned; the reference optics tables must
/// already sit in the bridge work dir from the error stage. Lines are
/// solved strictly serially, then every settings file is folded.
pub fn run_correction(
    model: &mut LatticeModel,
    bridge: &CorrectionBridge,
) -> Result<CorrectionSummary, Fault> {
    model.vars.set("on_errors", 1.0);
    model.vars.set("on_correction", 1.0);

    let line_names: Vec<String> = model.line_names().map(str::to_string).collect();
    for name in &line_names {
        let line = model.require_line(name)?;
        store_errors(
            line,
            &DEFAULT_ERROR_PATTERNS,
            bridge.work_dir().join(format!("MB_{name}.errors")),
        )?;
    }

    let mut solved = Vec::with_capacity(line_names.len());
    for name in &line_names {
        solved.push((name.clone(), bridge.solve_line(name)?));
    }

    install_trim_aliases(model)?;
    let mut summary = CorrectionSummary::default();
    for (line, settings) in solved {
        let fold = fold_settings(model, &settings)?;
        summary.lines.push(LineCorrection {
            line,
            settings: settings.len(),
            fold,
        });
    }
    Ok(summary)
}
