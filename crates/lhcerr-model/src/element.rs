//! Lattice elements and their multipole strength bookkeeping.
//!
//! Design strengths (`knl`/`ksl` plus the named main strength) and
//! accumulated field-error deltas (`knl_err`/`ksl_err`) are kept in
//! separate arrays so that errors can be gated in and out of optics
//! computations without mutating the machine settings.

use serde::{Deserialize, Serialize};

/// Physical type of a lattice element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElementKind {
    /// Main or separation dipole.
    Bend,
    /// Quadrupole magnet.
    Quadrupole,
    /// Sextupole magnet.
    Sextupole,
    /// Octupole magnet.
    Octupole,
    /// Thin multipole (spool-piece correctors and the like).
    Multipole,
    /// Orbit corrector (steering dipole).
    Kicker,
    /// Beam position monitor.
    Monitor,
    /// RF cavity.
    Cavity,
    /// Zero-length marker.
    Marker,
    /// Field-free straight section.
    Drift,
    /// Aperture limiter (collimator jaw, mask).
    Limit,
}

impl ElementKind {
    /// Whether elements of this kind carry a magnetic field at all.
    ///
    /// Unplugged magnets are installed as drifts, and markers and
    /// aperture limiters never had a field, so none of those may receive
    /// error contributions or order extension.
    pub fn carries_field(&self) -> bool {
        matches!(
            self,
            ElementKind::Bend
                | ElementKind::Quadrupole
                | ElementKind::Sextupole
                | ElementKind::Octupole
                | ElementKind::Multipole
                | ElementKind::Kicker
        )
    }

    /// Multipole order of the kind's named main strength, if it has one.
    pub fn main_order(&self) -> Option<usize> {
        match self {
            ElementKind::Bend => Some(0),
            ElementKind::Quadrupole => Some(1),
            ElementKind::Sextupole => Some(2),
            ElementKind::Octupole => Some(3),
            _ => None,
        }
    }
}

/// One lattice component within a [`crate::Line`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Physical type.
    pub kind: ElementKind,
    /// Longitudinal position of the element entry along its line, in m.
    pub s: f64,
    /// Physical length in m.
    pub length: f64,
    /// Named main normal strength (k0 for bends, k1 for quadrupoles, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k_ref: Option<f64>,
    /// Named main skew strength (k2s for skew sextupoles, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k_ref_skew: Option<f64>,
    /// Integrated normal multipole strengths by order (design settings).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub knl: Vec<f64>,
    /// Integrated skew multipole strengths by order (design settings).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ksl: Vec<f64>,
    /// Accumulated normal field-error deltas by order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub knl_err: Vec<f64>,
    /// Accumulated skew field-error deltas by order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ksl_err: Vec<f64>,
    /// Name of the circuit variable powering the element, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knob: Option<String>,
}

impl Element {
    /// Creates an element of the given kind and length, positioned at s = 0.
    pub fn new(kind: ElementKind, length: f64) -> Self {
        Self {
            kind,
            s: 0.0,
            length,
            k_ref: None,
            k_ref_skew: None,
            knl: Vec::new(),
            ksl: Vec::new(),
            knl_err: Vec::new(),
            ksl_err: Vec::new(),
            knob: None,
        }
    }

    /// Sets the named main normal strength.
    pub fn with_k_ref(mut self, k: f64) -> Self {
        self.k_ref = Some(k);
        self
    }

    /// Sets the named main skew strength.
    pub fn with_k_ref_skew(mut self, k: f64) -> Self {
        self.k_ref_skew = Some(k);
        self
    }

    /// Links the element to its powering circuit variable.
    pub fn with_knob(mut self, knob: impl Into<String>) -> Self {
        self.knob = Some(knob.into());
        self
    }

    /// Sets the design normal multipole array.
    pub fn with_knl(mut self, knl: Vec<f64>) -> Self {
        self.knl = knl;
        self
    }

    /// Sets the design skew multipole array.
    pub fn with_ksl(mut self, ksl: Vec<f64>) -> Self {
        self.ksl = ksl;
        self
    }

    /// Zero-extends all four multipole arrays to cover `order` inclusive.
    ///
    /// Arrays are never truncated; asking for a lower order than already
    /// allocated is a no-op.
    pub fn extend_order(&mut self, order: usize) {
        let target = order + 1;
        for arr in [
            &mut self.knl,
            &mut self.ksl,
            &mut self.knl_err,
            &mut self.ksl_err,
        ] {
            if arr.len() < target {
                arr.resize(target, 0.0);
            }
        }
    }

    /// Highest order currently allocated in any of the multipole arrays.
    pub fn allocated_order(&self) -> Option<usize> {
        let len = self
            .knl
            .len()
            .max(self.ksl.len())
            .max(self.knl_err.len())
            .max(self.ksl_err.len());
        len.checked_sub(1)
    }

    /// Nominal strength the relative errors of a family scale against.
    ///
    /// When the element type defines a named main strength at the
    /// requested order, that named value wins; otherwise the integrated
    /// multipole array entry is used, defaulting to zero.
    pub fn reference_strength(&self, order: usize, skew: bool) -> f64 {
        let named = if skew { self.k_ref_skew } else { self.k_ref };
        if self.kind.main_order() == Some(order) {
            if let Some(k) = named {
                return k;
            }
        }
        let arr = if skew { &self.ksl } else { &self.knl };
        arr.get(order).copied().unwrap_or(0.0)
    }

    /// Integrated design strength at an order, including the named main
    /// strength times the length where the type defines one.
    pub fn integrated(&self, order: usize, skew: bool) -> f64 {
        let arr = if skew { &self.ksl } else { &self.knl };
        let mut total = arr.get(order).copied().unwrap_or(0.0);
        if self.kind.main_order() == Some(order) {
            let named = if skew { self.k_ref_skew } else { self.k_ref };
            if let Some(k) = named {
                total += k * self.length;
            }
        }
        total
    }

    /// Accumulated error delta at an order.
    pub fn error_delta(&self, order: usize, skew: bool) -> f64 {
        let arr = if skew { &self.ksl_err } else { &self.knl_err };
        arr.get(order).copied().unwrap_or(0.0)
    }

    /// Adds an error contribution at an order, extending the arrays as
    /// needed.
    pub fn accumulate_error(&mut self, order: usize, skew: bool, delta: f64) {
        self.extend_order(order);
        let arr = if skew {
            &mut self.ksl_err
        } else {
            &mut self.knl_err
        };
        arr[order] += delta;
    }
}
