//! Error-activation toggles and their assignment-time snapshot.
//!
//! Every coefficient label has four gate variables in the model,
//! `on_{a|b}{i}{s|r}`, split by plane and by systematic/random part,
//! plus the global `on_errors` switch. Gates are plain multiplicative
//! factors, so fractional activation is allowed.

use lhcerr_model::LatticeModel;

use crate::sign::CoefficientPlane;

/// Highest coefficient label with installed gate variables.
pub const MAX_TOGGLE_ORDER: usize = 15;

/// Defines any activation variables that are not present yet.
///
/// Existing values are left alone, so a scenario can pre-set gates
/// before the install. Labels 1 and 2 default to off because dipole and
/// quadrupole errors distort the orbit and the tune and are normally
/// brought in deliberately; all higher labels default to on.
pub fn install_error_toggles(model: &mut LatticeModel) {
    model.vars.define_default("on_errors", 1.0);
    for label in 1..=MAX_TOGGLE_ORDER {
        let default = if label <= 2 { 0.0 } else { 1.0 };
        for plane in ["a", "b"] {
            model
                .vars
                .define_default(format!("on_{plane}{label}s"), default);
            model
                .vars
                .define_default(format!("on_{plane}{label}r"), default);
        }
    }
}

/// Snapshot of the activation gates at the start of an assignment run.
///
/// Assignment works from this copy instead of poking the live variable
/// graph, so suppressing a gate for part of a run never leaks into the
/// model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToggleGates {
    on_errors: f64,
    systematic_b: Vec<f64>,
    systematic_a: Vec<f64>,
    random_b: Vec<f64>,
    random_a: Vec<f64>,
}

impl ToggleGates {
    /// Reads the gates from a model, using the install defaults for
    /// variables that were never defined.
    pub fn from_vars(model: &LatticeModel) -> Self {
        let vars = &model.vars;
        let mut gates = ToggleGates {
            on_errors: vars.value_or("on_errors", 1.0),
            systematic_b: Vec::with_capacity(MAX_TOGGLE_ORDER),
            systematic_a: Vec::with_capacity(MAX_TOGGLE_ORDER),
            random_b: Vec::with_capacity(MAX_TOGGLE_ORDER),
            random_a: Vec::with_capacity(MAX_TOGGLE_ORDER),
        };
        for label in 1..=MAX_TOGGLE_ORDER {
            let default = if label <= 2 { 0.0 } else { 1.0 };
            gates
                .systematic_b
                .push(vars.value_or(&format!("on_b{label}s"), default));
            gates
                .systematic_a
                .push(vars.value_or(&format!("on_a{label}s"), default));
            gates
                .random_b
                .push(vars.value_or(&format!("on_b{label}r"), default));
            gates
                .random_a
                .push(vars.value_or(&format!("on_a{label}r"), default));
        }
        gates
    }

    /// Global error switch.
    pub fn on_errors(&self) -> f64 {
        self.on_errors
    }

    /// Whether errors are switched on at all.
    pub fn errors_enabled(&self) -> bool {
        self.on_errors != 0.0
    }

    /// Systematic gate for a 1-based coefficient label. Labels beyond
    /// the installed range gate to zero.
    pub fn systematic(&self, label: usize, plane: CoefficientPlane) -> f64 {
        let gates = match plane {
            CoefficientPlane::Normal => &self.systematic_b,
            CoefficientPlane::Skew => &self.systematic_a,
        };
        label
            .checked_sub(1)
            .and_then(|index| gates.get(index))
            .copied()
            .unwrap_or(0.0)
    }

    /// Random-part gate for a 1-based coefficient label.
    pub fn random(&self, label: usize, plane: CoefficientPlane) -> f64 {
        let gates = match plane {
            CoefficientPlane::Normal => &self.random_b,
            CoefficientPlane::Skew => &self.random_a,
        };
        label
            .checked_sub(1)
            .and_then(|index| gates.get(index))
            .copied()
            .unwrap_or(0.0)
    }

    /// Whether any label-1 gate is live, which is the condition for the
    /// post-assignment trajectory correction window.
    pub fn orbit_toggles_active(&self) -> bool {
        let sum = self.systematic(1, CoefficientPlane::Normal).powi(2)
            + self.systematic(1, CoefficientPlane::Skew).powi(2)
            + self.random(1, CoefficientPlane::Normal).powi(2)
            + self.random(1, CoefficientPlane::Skew).powi(2);
        sum > 0.0
    }

    /// Copy with the systematic `b2` gate forced to zero.
    ///
    /// The systematic quadrupole component of every family beyond the
    /// main dipoles is considered part of the measured machine optics
    /// and must not be applied twice.
    pub fn with_suppressed_b2_systematic(&self) -> Self {
        let mut gates = self.clone();
        if let Some(gate) = gates.systematic_b.get_mut(1) {
            *gate = 0.0;
        }
        gates
    }
}
