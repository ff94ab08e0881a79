//! Machine knob plumbing shared by the pipeline stages.
//!
//! Installers are idempotent on the variable graph, so a stage can be
//! re-run against a saved snapshot without doubling trim terms.

use std::collections::{BTreeMap, BTreeSet};

use lhcerr_core::errors::Fault;
use lhcerr_model::{arc_label, ElementKind, Expr, LatticeModel};
use serde::{Deserialize, Serialize};

const C_LIGHT: f64 = 299_792_458.0;

/// Knob names that appear in historical scenario files but power nothing.
const LEGACY_KNOBS: [&str; 4] = ["on_a1", "on_a5", "on_o1", "on_o5"];

/// Arc-by-arc trim-quad coefficients of the phase knob.
const PHASE_TRIMS: [(&str, f64); 31] = [
    ("kqtf.a12b1", -0.00224772),
    ("kqtf.a23b1", -0.000610902667),
    ("kqtf.a34b1", -0.000674072667),
    ("kqtf.a45b1", 0.00152229),
    ("kqtf.a56b1", 0.00111893),
    ("kqtf.a67b1", 0.002038776394),
    ("kqtf.a78b1", -0.001101030607),
    ("kqtf.a81b1", -0.000130025),
    ("kqtd.a12b1", -0.000143719),
    ("kqtd.a23b1", 0.001061974842),
    ("kqtd.a34b1", 0.0001529048423),
    ("kqtd.a45b1", -0.000489133),
    ("kqtd.a56b1", 0.00084196),
    ("kqtd.a67b1", 0.001607272254),
    ("kqtd.a78b1", -0.001369616746),
    ("kqtd.a81b1", -0.00164254),
    ("kqtf.a12b2", -0.00150003),
    ("kqtf.a23b2", -0.002608099978),
    ("kqtf.a34b2", 0.000229292022),
    ("kqtf.a45b2", 0.0018962),
    ("kqtf.a56b2", 0.00272665),
    ("kqtf.a67b2", -0.0005254090387),
    ("kqtf.a78b2", -0.0006960890387),
    ("kqtd.a12b2", -0.000604701),
    ("kqtd.a23b2", 0.0007281687569),
    ("kqtd.a34b2", 0.001554813657),
    ("kqtd.a45b2", -0.000344118),
    ("kqtd.a56b2", 0.000252779),
    ("kqtd.a67b2", -0.002434551755),
    ("kqtd.a78b2", -0.0006010707552),
    ("kqtd.a81b2", 0.00142397),
];

/// Outcome of reconciling scenario knob settings with the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnobCheckReport {
    /// Legacy knobs present in the settings but powering nothing.
    pub skipped: Vec<String>,
    /// Normalized experiment knobs wired onto their plain counterpart.
    pub wired: Vec<String>,
    /// Knobs the model does not define at all.
    pub unknown: Vec<String>,
}

/// Installs the tune, chromaticity and coupling trim knobs.
///
/// The canonical roots (`kqtf`, `kqtd`, `ksf`, `ksd`, `cmrs`, `cmis`)
/// are defined once and kept across re-installs; the `dq*` aliases are
/// rewired each time so `on_sq` tracks the optics regime. `cmrs.b1` and
/// `cmis.b1` are the live skew circuits, so the coupling roots only get
/// the squeezed alias flavour.
pub fn install_tuning_knobs(model: &mut LatticeModel, injection: bool) -> Result<(), Fault> {
    model.vars.set("on_sq", if injection { 0.0 } else { 1.0 });
    for root in ["kqtf", "kqtd", "ksf", "ksd", "cmrs", "cmis"] {
        model.vars.define_default(root, 0.0);
    }
    for beam in ["b1", "b2"] {
        for (alias, root) in [
            ("dqx", "kqtf"),
            ("dqy", "kqtd"),
            ("dqpx", "ksf"),
            ("dqpy", "ksd"),
        ] {
            model.vars.set_expr(
                format!("{alias}.{beam}"),
                Expr::number(1.0)
                    .sub(Expr::var("on_sq"))
                    .mul(Expr::var(root)),
            )?;
            model.vars.set_expr(
                format!("{alias}.{beam}_sq"),
                Expr::var("on_sq").mul(Expr::var(root)),
            )?;
        }
        for root in ["cmrs", "cmis"] {
            model.vars.set_expr(
                format!("{root}.{beam}_sq"),
                Expr::var("on_sq").mul(Expr::var(root)),
            )?;
        }
    }
    Ok(())
}

/// Installs the octupole current knob `i_mo` and powers the `kof`/`kod`
/// arc circuits from it.
///
/// The magnetic rigidity is baked in from the beam energy `nrj` at
/// install time, so the knob must be reinstalled after an energy change.
pub fn install_octupole_knob(model: &mut LatticeModel) -> Result<(), Fault> {
    model.vars.define_default("i_mo", 0.0);
    let brho = model.vars.value("nrj")? * 1.0e9 / C_LIGHT;
    for beam in ["b1", "b2"] {
        model
            .vars
            .set_expr(format!("i_oct_{beam}"), Expr::var("i_mo"))?;
        model
            .vars
            .set_expr(format!("i_mo.{beam}"), Expr::var(format!("i_oct_{beam}")))?;
        for octant in 1..=8 {
            let arc = arc_label(octant);
            let strength = Expr::var("kmax_mo")
                .mul(Expr::var(format!("i_mo.{beam}")))
                .div(Expr::var("imax_mo"))
                .div(Expr::number(brho));
            model
                .vars
                .set_expr(format!("kof.{arc}{beam}"), strength.clone())?;
            model.vars.set_expr(format!("kod.{arc}{beam}"), strength)?;
        }
    }
    Ok(())
}

/// Installs the phase knob and its fixed arc-by-arc trim coefficients.
///
/// Already-installed graphs are left untouched, since the trim terms
/// accumulate onto the arc circuits.
pub fn install_phase_knob(model: &mut LatticeModel) -> Result<(), Fault> {
    if model.vars.contains("phase_knob") {
        return Ok(());
    }
    model.vars.set("phase_knob", 0.0);
    model.vars.set_expr("phase_change", Expr::var("phase_knob"))?;
    for beam in ["b1", "b2"] {
        model
            .vars
            .set_expr(format!("phase_knob.{beam}"), Expr::var("phase_change"))?;
        model.vars.set_expr(
            format!("phase_change.{beam}"),
            Expr::var(format!("phase_knob.{beam}")),
        )?;
    }
    for (circuit, coefficient) in PHASE_TRIMS {
        let beam = &circuit[circuit.len() - 2..];
        let term =
            Expr::number(coefficient.abs()).mul(Expr::var(format!("phase_change.{beam}")));
        let term = if coefficient < 0.0 { term.neg() } else { term };
        model.vars.add_to(circuit, term)?;
    }
    // kqtf.a81b2 is assigned rather than accumulated, which detaches
    // that one trim circuit from its tune trim.
    model.vars.set_expr(
        "kqtf.a81b2",
        Expr::number(0.00049397).mul(Expr::var("phase_change.b2")),
    )?;
    Ok(())
}

/// Adds a `corr_co_*` trim term to every `acb*` steering circuit, gated
/// by `on_corr_co`. Circuits that already carry their trim are skipped.
pub fn install_correction_terms(model: &mut LatticeModel) -> Result<(), Fault> {
    model.vars.set("on_corr_co", 1.0);
    let circuits: Vec<String> = model
        .vars
        .names()
        .filter(|name| name.starts_with("acb"))
        .map(str::to_string)
        .collect();
    for circuit in circuits {
        let trim = format!("corr_co_{circuit}");
        if model.vars.contains(&trim) {
            continue;
        }
        model.vars.set(trim.clone(), 0.0);
        model
            .vars
            .add_to(circuit, Expr::var(trim).mul(Expr::var("on_corr_co")))?;
    }
    Ok(())
}

/// Discovers the steering correctors and monitors of every line.
///
/// `mcb*` kickers whose circuit hangs off a crossing or separation knob
/// are reserved for the crossing bumps and excluded from free steering.
/// Monitor discovery skips the interlock and synchrotron-light BPM
/// families plus `_entry`/`_exit` slicing leftovers.
pub fn select_steering(model: &mut LatticeModel) -> Result<(), Fault> {
    let crossing: Vec<String> = model
        .vars
        .names()
        .filter(|name| is_crossing_knob(name))
        .map(str::to_string)
        .collect();
    let mut driven = BTreeSet::new();
    for knob in &crossing {
        driven.extend(model.vars.dependents_of(knob));
    }

    let line_names: Vec<String> = model.line_names().map(str::to_string).collect();
    for name in line_names {
        let (correctors_x, correctors_y, monitors) = {
            let line = model.require_line(&name)?;
            let mut correctors_x = Vec::new();
            let mut correctors_y = Vec::new();
            for (element_name, element) in line.elements() {
                if element.kind != ElementKind::Kicker || !element_name.starts_with("mcb") {
                    continue;
                }
                if element
                    .knob
                    .as_deref()
                    .is_some_and(|knob| driven.contains(knob))
                {
                    continue;
                }
                if element_name.contains("h.") {
                    correctors_x.push(element_name.to_string());
                } else if element_name.contains("v.") {
                    correctors_y.push(element_name.to_string());
                }
            }
            let monitors: Vec<String> = line
                .elements()
                .filter(|(element_name, element)| {
                    element.kind == ElementKind::Monitor && is_steering_monitor(element_name)
                })
                .map(|(element_name, _)| element_name.to_string())
                .collect();
            (correctors_x, correctors_y, monitors)
        };
        let line = model.require_line_mut(&name)?;
        line.steering_correctors_x = correctors_x;
        line.steering_correctors_y = correctors_y;
        line.steering_monitors_x = monitors.clone();
        line.steering_monitors_y = monitors;
    }
    Ok(())
}

/// Zeroes every `on_*` knob named in the settings, returning the values
/// they held for a later [`restore_crossing`].
pub fn disable_crossing(
    model: &mut LatticeModel,
    settings: &BTreeMap<String, f64>,
) -> BTreeMap<String, f64> {
    let mut saved = BTreeMap::new();
    for knob in settings.keys().filter(|knob| knob.starts_with("on_")) {
        saved.insert(knob.clone(), model.vars.value_or(knob, 0.0));
        model.vars.set(knob.clone(), 0.0);
    }
    saved
}

/// Puts saved crossing-knob values back.
pub fn restore_crossing(model: &mut LatticeModel, saved: &BTreeMap<String, f64>) {
    for (knob, value) in saved {
        model.vars.set(knob.clone(), *value);
    }
}

/// Reconciles scenario knob settings with the variable graph.
///
/// Knobs the model defines pass through untouched. Legacy names are
/// skipped, the normalized experiment knobs are wired onto their plain
/// counterpart (scaled by `7000/nrj` when given as a fraction), and
/// anything else is reported as unknown. The settings themselves are
/// applied separately by [`apply_knob_settings`].
pub fn check_knob_settings(
    model: &mut LatticeModel,
    settings: &BTreeMap<String, f64>,
) -> Result<KnobCheckReport, Fault> {
    let mut report = KnobCheckReport::default();
    for (knob, value) in settings {
        if model.vars.contains(knob) {
            continue;
        }
        if LEGACY_KNOBS.contains(&knob.as_str()) {
            report.skipped.push(knob.clone());
            continue;
        }
        if knob == "on_alice_normalized" || knob == "on_lhcb_normalized" {
            let base = knob.trim_end_matches("_normalized").to_string();
            model.vars.set(knob.clone(), 0.0);
            let scaled = if *value > 1.0 {
                Expr::var(knob.clone())
            } else {
                Expr::number(7000.0)
                    .div(Expr::var("nrj"))
                    .mul(Expr::var(knob.clone()))
            };
            model.vars.set_expr(base, scaled)?;
            report.wired.push(knob.clone());
            continue;
        }
        report.unknown.push(knob.clone());
    }
    Ok(report)
}

/// Applies every scenario knob setting as a literal value.
pub fn apply_knob_settings(model: &mut LatticeModel, settings: &BTreeMap<String, f64>) {
    for (knob, value) in settings {
        model.vars.set(knob.clone(), *value);
    }
}

fn is_crossing_knob(name: &str) -> bool {
    matches!(name, "on_alice" | "on_lhcb" | "on_disp")
        || name.starts_with("on_x")
        || name.starts_with("on_sep")
}

fn is_steering_monitor(name: &str) -> bool {
    name.starts_with("bpm")
        && !name.ends_with("_entry")
        && !name.ends_with("_exit")
        && !["bpmwa", "bpmwb", "bpmse", "bpmsd"]
            .iter()
            .any(|family| name.starts_with(family))
}
