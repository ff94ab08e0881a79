//! Deterministic linear-optics surrogate engine.
//!
//! The pipeline needs an engine that answers twiss queries with stable,
//! smoothly responding figures, not a tracking code. This one uses a
//! smooth-ring approximation: constant beta and dispersion, phase
//! advancing uniformly with `s`, and global figures responding linearly
//! to the per-beam trim circuits and to the accumulated field-error
//! deltas. The same kick model drives the closed orbit, so trimming a
//! steering circuit moves the monitors exactly the way the response
//! matrix predicts.

use std::f64::consts::{PI, TAU};

use lhcerr_core::errors::Fault;
use lhcerr_core::TwissMethod;
use lhcerr_model::{
    Element, ElementKind, LatticeModel, Line, OpticsEngine, OpticsRow, OpticsTable, TwissOptions,
};
use serde::{Deserialize, Serialize};

/// Base figures and response coefficients of the surrogate ring.
///
/// The tune and chromaticity blocks are `d(qx, qy) / d(kqtf, kqtd)` and
/// `d(dqx, dqy) / d(ksf, ksd)` in row-major order; both defaults are
/// non-singular so joint matching always has a solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearOpticsConfig {
    /// Design horizontal tune.
    pub base_qx: f64,
    /// Design vertical tune.
    pub base_qy: f64,
    /// Design horizontal chromaticity.
    pub base_dqx: f64,
    /// Design vertical chromaticity.
    pub base_dqy: f64,
    /// Smooth horizontal beta in m.
    pub beta_x: f64,
    /// Smooth vertical beta in m.
    pub beta_y: f64,
    /// Smooth horizontal dispersion in m.
    pub dispersion: f64,
    /// Tune response to the per-beam trim-quad circuits.
    pub tune_response: [[f64; 2]; 2],
    /// Chromaticity response to the per-beam sextupole circuits.
    pub chroma_response: [[f64; 2]; 2],
    /// Coupling response to the per-beam skew circuits.
    pub coupling_response: f64,
    /// Tune shift added by the 6d method relative to 4d.
    pub rf_tune_shift: f64,
}

impl Default for LinearOpticsConfig {
    fn default() -> Self {
        Self {
            base_qx: 62.28,
            base_qy: 60.31,
            base_dqx: 2.0,
            base_dqy: 2.0,
            beta_x: 180.0,
            beta_y: 175.0,
            dispersion: 2.2,
            tune_response: [[95.0, -27.0], [-25.0, 88.0]],
            chroma_response: [[305.0, 92.0], [-88.0, -273.0]],
            coupling_response: 1.0,
            rf_tune_shift: -2.1e-4,
        }
    }
}

/// Smooth-ring optics engine.
#[derive(Debug, Clone, Default)]
pub struct LinearOptics {
    config: LinearOpticsConfig,
}

impl LinearOptics {
    /// Engine with explicit response coefficients.
    pub fn new(config: LinearOpticsConfig) -> Self {
        Self { config }
    }

    /// The response coefficients in use.
    pub fn config(&self) -> &LinearOpticsConfig {
        &self.config
    }
}

/// One orbit kick source: phases at the source and both planes.
struct Kick {
    mux: f64,
    muy: f64,
    horizontal: f64,
    vertical: f64,
}

impl OpticsEngine for LinearOptics {
    fn twiss(
        &self,
        model: &LatticeModel,
        line: &str,
        options: &TwissOptions,
    ) -> Result<OpticsTable, Fault> {
        let cfg = &self.config;
        let lattice = model.require_line(line)?;
        let method = options
            .method
            .or(lattice.twiss_method)
            .unwrap_or(TwissMethod::SixD);
        let gate = match options.include_errors {
            Some(true) => 1.0,
            Some(false) => 0.0,
            None => {
                if model.vars.value_or("on_errors", 1.0) != 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        };
        let circumference = lattice.circumference().max(1.0);
        let beam = beam_suffix(lattice);

        // Per-beam circuit readings; post-correction these chase the
        // bare knobs through the alias chain.
        let kf = model.vars.value_or(&format!("kqtf.{beam}"), 0.0);
        let kd = model.vars.value_or(&format!("kqtd.{beam}"), 0.0);
        let sf = model.vars.value_or(&format!("ksf.{beam}"), 0.0);
        let sd = model.vars.value_or(&format!("ksd.{beam}"), 0.0);
        let cr = model.vars.value_or(&format!("cmrs.{beam}"), 0.0);
        let ci = model.vars.value_or(&format!("cmis.{beam}"), 0.0);

        let mut qx = cfg.base_qx + cfg.tune_response[0][0] * kf + cfg.tune_response[0][1] * kd;
        let mut qy = cfg.base_qy + cfg.tune_response[1][0] * kf + cfg.tune_response[1][1] * kd;
        let mut dqx =
            cfg.base_dqx + cfg.chroma_response[0][0] * sf + cfg.chroma_response[0][1] * sd;
        let mut dqy =
            cfg.base_dqy + cfg.chroma_response[1][0] * sf + cfg.chroma_response[1][1] * sd;
        let mut c_re = cfg.coupling_response * cr;
        let mut c_im = cfg.coupling_response * ci;

        let mut kicks = Vec::new();
        for (name, element) in lattice.elements() {
            let mid = element.s + element.length / 2.0;
            let mux = cfg.base_qx * mid / circumference;
            let muy = cfg.base_qy * mid / circumference;

            let quad_err = gate * element.error_delta(1, false);
            qx += cfg.beta_x * quad_err / (2.0 * TAU);
            qy -= cfg.beta_y * quad_err / (2.0 * TAU);

            let sext_err = gate * element.error_delta(2, false);
            dqx += cfg.beta_x * cfg.dispersion * sext_err / (2.0 * TAU);
            dqy -= cfg.beta_y * cfg.dispersion * sext_err / (2.0 * TAU);

            let skew_err = gate * element.error_delta(1, true);
            if skew_err != 0.0 {
                let weight = (cfg.beta_x * cfg.beta_y).sqrt() * skew_err / TAU;
                let phase = TAU * (mux - muy);
                c_re += weight * phase.cos();
                c_im += weight * phase.sin();
            }

            let (horizontal, vertical) = kick_at(model, name, element, gate);
            if horizontal != 0.0 || vertical != 0.0 {
                kicks.push(Kick {
                    mux,
                    muy,
                    horizontal,
                    vertical,
                });
            }
        }
        if method == TwissMethod::SixD {
            qx += cfg.rf_tune_shift;
            qy += cfg.rf_tune_shift;
        }

        let sin_x = (PI * cfg.base_qx).sin();
        let sin_y = (PI * cfg.base_qy).sin();
        let mut rows = Vec::with_capacity(lattice.len());
        for (name, element) in lattice.elements() {
            let mid = element.s + element.length / 2.0;
            let mux = cfg.base_qx * mid / circumference;
            let muy = cfg.base_qy * mid / circumference;
            let mut x = 0.0;
            let mut y = 0.0;
            for kick in &kicks {
                let dphx = TAU * (mux - kick.mux).abs() - PI * cfg.base_qx;
                x += kick.horizontal * cfg.beta_x * dphx.cos() / (2.0 * sin_x);
                let dphy = TAU * (muy - kick.muy).abs() - PI * cfg.base_qy;
                y += kick.vertical * cfg.beta_y * dphy.cos() / (2.0 * sin_y);
            }
            rows.push(OpticsRow {
                name: name.to_string(),
                s: element.s,
                x,
                y,
                betx: cfg.beta_x,
                bety: cfg.beta_y,
                dx: cfg.dispersion,
                mux,
                muy,
                k0l: strength_row(model, name, element, 0, gate),
                k1l: strength_row(model, name, element, 1, gate),
            });
        }

        Ok(OpticsTable {
            line: line.to_string(),
            method,
            qx,
            qy,
            dqx,
            dqy,
            c_minus_re: c_re,
            c_minus_im: c_im,
            rows,
        })
    }
}

/// Beam suffix of a line name; anything not ending in `b2` reads the
/// beam-1 circuits.
pub fn beam_suffix(line: &Line) -> &'static str {
    if line.is_reversed() {
        "b2"
    } else {
        "b1"
    }
}

/// Plane of a steering kicker, read off the element name the powering
/// convention encodes it in (`mcbh.…` vs `mcbv.…`).
fn kicker_plane(name: &str) -> Option<char> {
    if name.contains("h.") {
        Some('h')
    } else if name.contains("v.") {
        Some('v')
    } else {
        None
    }
}

/// Orbit kick contributed by one element, per plane.
///
/// Steering kickers kick with their circuit plus any direct array
/// entry; order-zero error deltas kick every magnet, with the opposite
/// sign of the field in the horizontal plane.
fn kick_at(model: &LatticeModel, name: &str, element: &Element, gate: f64) -> (f64, f64) {
    let mut horizontal = -gate * element.error_delta(0, false);
    let mut vertical = gate * element.error_delta(0, true);
    if element.kind == ElementKind::Kicker {
        let circuit = element
            .knob
            .as_deref()
            .map(|knob| model.vars.value_or(knob, 0.0))
            .unwrap_or(0.0);
        match kicker_plane(name) {
            Some('h') => horizontal += circuit + element.integrated(0, false),
            Some('v') => vertical += circuit + element.integrated(0, true),
            _ => {}
        }
    }
    (horizontal, vertical)
}

/// Integrated strength sample for the optics rows: design plus knob
/// contribution plus gated error delta.
fn strength_row(
    model: &LatticeModel,
    name: &str,
    element: &Element,
    order: usize,
    gate: f64,
) -> f64 {
    let mut total = element.integrated(order, false) + gate * element.error_delta(order, false);
    if let Some(knob) = element.knob.as_deref() {
        let circuit = model.vars.value_or(knob, 0.0);
        if element.kind == ElementKind::Kicker {
            if order == 0 && kicker_plane(name) == Some('h') {
                total += circuit;
            }
        } else if element.kind.main_order() == Some(order) {
            total += circuit * element.length;
        }
    }
    total
}
