//! Optics interfaces shared by the assignment and tuning crates.
//!
//! The model crate owns the twiss vocabulary so that error assignment
//! can request a trajectory correction without depending on the engine
//! that computes it.

use std::collections::BTreeMap;

use lhcerr_core::errors::Fault;
use lhcerr_core::TwissMethod;
use serde::{Deserialize, Serialize};

use crate::model::LatticeModel;

/// Per-computation twiss options.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TwissOptions {
    /// Overrides the line's stored method when set.
    pub method: Option<TwissMethod>,
    /// Forces field errors on or off for this computation only.
    ///
    /// When unset, the `on_errors` variable decides as usual.
    pub include_errors: Option<bool>,
}

impl TwissOptions {
    /// Options using the line's stored method and the `on_errors` state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces a twiss method for this computation.
    pub fn with_method(mut self, method: TwissMethod) -> Self {
        self.method = Some(method);
        self
    }

    /// Forces field errors on or off for this computation.
    pub fn with_errors(mut self, include: bool) -> Self {
        self.include_errors = Some(include);
        self
    }
}

/// One optics sample at an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpticsRow {
    /// Element name.
    pub name: String,
    /// Longitudinal position.
    pub s: f64,
    /// Horizontal closed orbit.
    pub x: f64,
    /// Vertical closed orbit.
    pub y: f64,
    /// Horizontal beta function.
    pub betx: f64,
    /// Vertical beta function.
    pub bety: f64,
    /// Horizontal dispersion.
    pub dx: f64,
    /// Horizontal phase advance in turns.
    pub mux: f64,
    /// Vertical phase advance in turns.
    pub muy: f64,
    /// Integrated dipole strength, knob contribution included.
    pub k0l: f64,
    /// Integrated quadrupole strength, knob contribution included.
    pub k1l: f64,
}

/// Computed optics for one line: global figures plus per-element rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpticsTable {
    /// Line the optics were computed for.
    pub line: String,
    /// Method used for the computation.
    pub method: TwissMethod,
    /// Horizontal tune.
    pub qx: f64,
    /// Vertical tune.
    pub qy: f64,
    /// Horizontal chromaticity.
    pub dqx: f64,
    /// Vertical chromaticity.
    pub dqy: f64,
    /// Real part of the difference-resonance coupling term.
    pub c_minus_re: f64,
    /// Imaginary part of the difference-resonance coupling term.
    pub c_minus_im: f64,
    /// Per-element samples, in line order.
    pub rows: Vec<OpticsRow>,
}

impl OpticsTable {
    /// Looks up the sample at a named element.
    pub fn row(&self, name: &str) -> Option<&OpticsRow> {
        self.rows.iter().find(|row| row.name == name)
    }

    /// Modulus of the difference-resonance coupling term.
    pub fn c_minus(&self) -> f64 {
        (self.c_minus_re.powi(2) + self.c_minus_im.powi(2)).sqrt()
    }
}

/// Computes closed-orbit optics for a line of the model.
pub trait OpticsEngine {
    /// Computes the optics table for one line.
    fn twiss(
        &self,
        model: &LatticeModel,
        line: &str,
        options: &TwissOptions,
    ) -> Result<OpticsTable, Fault>;
}

/// Result of one trajectory-correction pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SteeringOutcome {
    /// Line the correction acted on.
    pub line: String,
    /// Horizontal orbit rms at the monitors before the correction.
    pub rms_x_before: f64,
    /// Vertical orbit rms at the monitors before the correction.
    pub rms_y_before: f64,
    /// Horizontal orbit rms at the monitors after the correction.
    pub rms_x_after: f64,
    /// Vertical orbit rms at the monitors after the correction.
    pub rms_y_after: f64,
    /// Trim applied per steering circuit variable.
    pub trims: BTreeMap<String, f64>,
}

/// Steers the closed orbit of a line back towards a reference.
pub trait TrajectoryCorrector {
    /// Corrects the trajectory of one line, trimming steering circuits.
    fn correct_trajectory(
        &self,
        model: &mut LatticeModel,
        line: &str,
    ) -> Result<SteeringOutcome, Fault>;
}
