//! Two-pass field-error assignment over a lattice model.
//!
//! The main dipoles go first because their `b1` errors bend the closed
//! orbit; when the label-1 gates are live, a trajectory correction runs
//! right after them so that the remaining families are assigned on a
//! corrected orbit. Every other enabled family follows in dispatch
//! order with the systematic `b2` gate suppressed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use lhcerr_core::errors::{ErrorInfo, Fault};
use lhcerr_core::Beam;
use lhcerr_model::{LatticeModel, SteeringOutcome, TrajectoryCorrector};

use crate::families::{FamilySelection, MagnetFamily};
use crate::sign::{coefficient_sign, CoefficientPlane, ParityTable, SignContext};
use crate::tables::{ErrorEntry, ErrorTable, RotationTable};
use crate::toggles::ToggleGates;

/// Options steering one assignment run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    /// Parity convention for the geometry sign flips.
    pub parity: ParityTable,
    /// Highest coefficient label applied; matching coefficient arrays
    /// are pre-extended to this order.
    pub max_order: usize,
    /// Reference radius in m the relative coefficients scale from.
    pub reference_radius: f64,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            parity: ParityTable::default(),
            max_order: 15,
            reference_radius: 0.017,
        }
    }
}

/// Outcome of one assignment run. Lookup misses are data here, not
/// faults; deciding what to print is the caller's business.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignmentReport {
    /// Instances that received errors, counted per family.
    pub assigned: BTreeMap<String, usize>,
    /// Resolved instances absent from the model, as `element/line`.
    pub missing: Vec<String>,
    /// Instances skipped because their kind carries no field.
    pub vetoed: Vec<String>,
    /// Whether the label-1 gates opened the orbit-correction window.
    pub orbit_correction: bool,
    /// Per-line steering outcomes when the window fired.
    pub steering: Vec<SteeringOutcome>,
}

/// Assigns a table of field errors to the model.
///
/// Coefficient arrays of every element matching an enabled family
/// pattern are extended up front, main dipoles are assigned first with
/// an orbit correction in between when the label-1 gates ask for one,
/// and the remaining enabled families follow. The model's design
/// strengths are never touched; only the error arrays accumulate.
pub fn assign_errors(
    model: &mut LatticeModel,
    errors: &ErrorTable,
    rotations: &RotationTable,
    selection: &FamilySelection,
    gates: &ToggleGates,
    corrector: Option<&dyn TrajectoryCorrector>,
    config: &AssignmentConfig,
) -> Result<AssignmentReport, Fault> {
    let mut report = AssignmentReport::default();
    extend_families(model, selection, config.max_order)?;

    let pass = Pass {
        rotations,
        gates,
        config,
    };
    if selection.dipoles {
        for (slot, entry) in errors.entries() {
            if !slot.starts_with("mb.") {
                continue;
            }
            pass.apply_slot(model, slot, entry, MagnetFamily::MainDipoles, &mut report);
        }
        correct_orbits(model, gates, corrector, &mut report)?;
    }

    let prefixes = selection.selected_prefixes();
    if !prefixes.is_empty() {
        let damped = gates.with_suppressed_b2_systematic();
        let pass = Pass {
            rotations,
            gates: &damped,
            config,
        };
        for (slot, entry) in errors.entries() {
            if !prefixes.iter().any(|prefix| slot.starts_with(prefix)) {
                continue;
            }
            let Some(family) = MagnetFamily::classify(slot) else {
                continue;
            };
            if family == MagnetFamily::MainDipoles {
                continue;
            }
            pass.apply_slot(model, slot, entry, family, &mut report);
        }
    }
    Ok(report)
}

/// Extends the coefficient arrays of every field-carrying element that
/// matches an enabled family pattern.
fn extend_families(
    model: &mut LatticeModel,
    selection: &FamilySelection,
    max_order: usize,
) -> Result<(), Fault> {
    let patterns = selection.extension_patterns();
    if patterns.is_empty() {
        return Ok(());
    }
    for (_, line) in model.lines_mut() {
        for pattern in &patterns {
            for name in line.matching_names(pattern)? {
                let Some(element) = line.element_mut(&name) else {
                    continue;
                };
                if !element.kind.carries_field() {
                    continue;
                }
                element.extend_order(max_order);
            }
        }
    }
    Ok(())
}

fn correct_orbits(
    model: &mut LatticeModel,
    gates: &ToggleGates,
    corrector: Option<&dyn TrajectoryCorrector>,
    report: &mut AssignmentReport,
) -> Result<(), Fault> {
    if !(gates.errors_enabled() && gates.orbit_toggles_active()) {
        return Ok(());
    }
    report.orbit_correction = true;
    let Some(corrector) = corrector else {
        return Err(assignment_fault(
            "corrector-required",
            "label-1 gates are active but no trajectory corrector was supplied",
        ));
    };
    let lines: Vec<String> = model.line_names().map(str::to_string).collect();
    for line in lines {
        let outcome = corrector.correct_trajectory(model, &line)?;
        report.steering.push(outcome);
    }
    Ok(())
}

/// Borrowed context shared by every slot of one assignment pass.
struct Pass<'a> {
    rotations: &'a RotationTable,
    gates: &'a ToggleGates,
    config: &'a AssignmentConfig,
}

impl Pass<'_> {
    fn apply_slot(
        &self,
        model: &mut LatticeModel,
        slot: &str,
        entry: &ErrorEntry,
        family: MagnetFamily,
        report: &mut AssignmentReport,
    ) {
        for instance in resolve_instances(model, slot, entry.beam, self.rotations, report) {
            let element = model
                .line_mut(&instance.line)
                .and_then(|line| line.element_mut(&instance.element));
            let Some(element) = element else {
                continue;
            };
            if !element.kind.carries_field() {
                report
                    .vetoed
                    .push(format!("{}/{}", instance.element, instance.line));
                continue;
            }
            let order = family.reference_order();
            let skew = family.is_skew();
            let sign = SignContext {
                magnetic_sign: family.magnetic_sign(),
                beam_reversed: instance.beam_reversed,
                rotated: instance.rotated,
            };
            let kl_ref = 1e-4
                * element.reference_strength(order, skew)
                * element.length
                * sign.reference_sign(order, skew);
            let yfac = sign.yfac();
            for plane in [CoefficientPlane::Normal, CoefficientPlane::Skew] {
                for (label, raw) in entry.coefficients(plane) {
                    if label == 0 || label > self.config.max_order {
                        continue;
                    }
                    let index = label - 1;
                    let signed =
                        raw * coefficient_sign(self.config.parity, plane, order, label, yfac);
                    let gate = self.gates.on_errors() * self.gates.systematic(label, plane);
                    let delta = signed
                        * gate
                        * kl_ref
                        * self
                            .config
                            .reference_radius
                            .powi(order as i32 - index as i32)
                        * factorial(index)
                        / factorial(order);
                    element.accumulate_error(index, plane.is_skew(), delta);
                }
            }
            *report.assigned.entry(family.name().to_string()).or_insert(0) += 1;
        }
    }
}

/// One model element a table slot resolved to.
struct Instance {
    line: String,
    element: String,
    beam_reversed: bool,
    rotated: bool,
}

/// Maps a table slot to model elements.
///
/// Shared slots (beam 0) are looked up in every line, first under the
/// slot name itself and then with the line's own beam suffix; an
/// instance living in the counter-rotating line counts as
/// beam-reversed. Per-beam slots drop the aperture-model `.v*` tail
/// before gaining their suffix. The rotation survey is keyed by the
/// trimmed base name in both cases.
fn resolve_instances(
    model: &LatticeModel,
    slot: &str,
    beam: Beam,
    rotations: &RotationTable,
    report: &mut AssignmentReport,
) -> Vec<Instance> {
    let mut instances = Vec::new();
    match beam {
        Beam::Both => {
            let rotated = rotations.is_rotated(slot);
            for (line_name, line) in model.lines() {
                let element = if line.contains(slot) {
                    slot.to_string()
                } else {
                    let suffix = if line.is_reversed() { "b2" } else { "b1" };
                    format!("{slot}.{suffix}")
                };
                if !line.contains(&element) {
                    report.missing.push(format!("{element}/{line_name}"));
                    continue;
                }
                instances.push(Instance {
                    line: line_name.to_string(),
                    element,
                    beam_reversed: line.is_reversed(),
                    rotated,
                });
            }
        }
        Beam::B1 | Beam::B2 => {
            let base = trim_aperture_suffix(slot);
            let rotated = rotations.is_rotated(base);
            let suffix = if beam.is_reversed() { "b2" } else { "b1" };
            let element = format!("{base}.{suffix}");
            let line_name = model
                .line_names()
                .find(|name| name.ends_with(suffix))
                .map(str::to_string);
            let Some(line_name) = line_name else {
                report.missing.push(format!("{element}/{beam}"));
                return instances;
            };
            let found = model
                .line(&line_name)
                .map(|line| line.contains(&element))
                .unwrap_or(false);
            if !found {
                report.missing.push(format!("{element}/{line_name}"));
                return instances;
            }
            instances.push(Instance {
                line: line_name,
                element,
                beam_reversed: beam.is_reversed(),
                rotated,
            });
        }
    }
    instances
}

/// Drops the trailing aperture-model tail (`.v` plus one character)
/// from a slot name, if present.
fn trim_aperture_suffix(slot: &str) -> &str {
    let mut chars = slot.chars();
    match chars.next_back() {
        Some(last) if chars.as_str().ends_with(".v") => &slot[..slot.len() - 2 - last.len_utf8()],
        _ => slot,
    }
}

fn factorial(n: usize) -> f64 {
    (1..=n).map(|k| k as f64).product()
}

fn assignment_fault(code: impl Into<String>, message: impl Into<String>) -> Fault {
    Fault::Assignment(ErrorInfo::new(code, message))
}
