//! Geometry sign resolution for table coefficients.
//!
//! A measured multipole coefficient is expressed in the frame of the
//! measurement bench. Mapping it onto an installed magnet picks up sign
//! flips from the magnetic polarity convention, from the direction of
//! travel of the counter-rotating beam, and from magnets that were
//! physically installed rotated by 180 degrees around the vertical
//! axis. The combined factor is `yfac`; which coefficient labels absorb
//! it is a parity convention with two historical variants that must not
//! be blended.

use serde::{Deserialize, Serialize};

/// Parity convention deciding which coefficient labels absorb `yfac`.
///
/// The two conventions agree whenever the family's reference order is
/// odd and diverge when it is even, which is exactly where mixing them
/// silently would corrupt dipole and sextupole errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParityTable {
    /// Label parity alone decides: even `b` labels flip, odd `a` labels
    /// flip, for every family.
    Unified,
    /// Label parity relative to the family's reference order decides:
    /// `b` labels of opposite parity to the reference order flip, `a`
    /// labels of equal parity flip.
    #[default]
    PerFamily,
}

/// Coefficient plane of an error-table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoefficientPlane {
    /// `b` columns, feeding the normal multipole deltas.
    Normal,
    /// `a` columns, feeding the skew multipole deltas.
    Skew,
}

impl CoefficientPlane {
    /// True for the skew (`a`) plane.
    pub fn is_skew(&self) -> bool {
        matches!(self, CoefficientPlane::Skew)
    }
}

/// Geometry of one magnet instance as seen from the error tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignContext {
    /// Magnetic polarity convention applies. True for every family
    /// except the normal arc quadrupoles.
    pub magnetic_sign: bool,
    /// The instance lives in the counter-rotating line.
    pub beam_reversed: bool,
    /// The survey flags a ~180 degree rotation around the vertical axis.
    pub rotated: bool,
}

impl SignContext {
    /// Combined geometry factor, -1 for an odd number of flips.
    pub fn yfac(&self) -> f64 {
        let mut yfac = 1.0;
        if self.magnetic_sign {
            yfac *= -1.0;
        }
        if self.beam_reversed {
            yfac *= -1.0;
        }
        if self.rotated {
            yfac *= -1.0;
        }
        yfac
    }

    /// Factor the reference strength picks up under a negative `yfac`.
    ///
    /// The reference flips with `(-1)^order`, and once more when the
    /// family's reference strength is itself a skew component.
    pub fn reference_sign(&self, order: usize, skew: bool) -> f64 {
        if self.yfac() >= 0.0 {
            return 1.0;
        }
        let mut sign = if order % 2 == 0 { 1.0 } else { -1.0 };
        if skew {
            sign = -sign;
        }
        sign
    }
}

/// Whether the coefficient at a 1-based `label` absorbs `yfac`.
///
/// `reference_order` is the 0-based order of the family's reference
/// strength (dipole 0, quadrupole 1, ...). It only participates under
/// [`ParityTable::PerFamily`].
pub fn coefficient_flips(
    table: ParityTable,
    plane: CoefficientPlane,
    reference_order: usize,
    label: usize,
) -> bool {
    match (table, plane) {
        (ParityTable::Unified, CoefficientPlane::Normal) => label % 2 == 0,
        (ParityTable::Unified, CoefficientPlane::Skew) => label % 2 == 1,
        (ParityTable::PerFamily, CoefficientPlane::Normal) => label % 2 != reference_order % 2,
        (ParityTable::PerFamily, CoefficientPlane::Skew) => label % 2 == reference_order % 2,
    }
}

/// Signed multiplier for the raw coefficient at `label`.
pub fn coefficient_sign(
    table: ParityTable,
    plane: CoefficientPlane,
    reference_order: usize,
    label: usize,
    yfac: f64,
) -> f64 {
    if coefficient_flips(table, plane, reference_order, label) {
        yfac
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yfac_counts_flips() {
        let none = SignContext::default();
        assert_eq!(none.yfac(), 1.0);
        let one = SignContext {
            magnetic_sign: true,
            ..SignContext::default()
        };
        assert_eq!(one.yfac(), -1.0);
        let two = SignContext {
            magnetic_sign: true,
            beam_reversed: true,
            rotated: false,
        };
        assert_eq!(two.yfac(), 1.0);
        let three = SignContext {
            magnetic_sign: true,
            beam_reversed: true,
            rotated: true,
        };
        assert_eq!(three.yfac(), -1.0);
    }

    #[test]
    fn reference_sign_tracks_order_and_skew() {
        let flipped = SignContext {
            magnetic_sign: true,
            ..SignContext::default()
        };
        assert_eq!(flipped.reference_sign(0, false), 1.0);
        assert_eq!(flipped.reference_sign(1, false), -1.0);
        assert_eq!(flipped.reference_sign(2, true), -1.0);
        assert_eq!(flipped.reference_sign(3, true), 1.0);
        let upright = SignContext::default();
        assert_eq!(upright.reference_sign(3, true), 1.0);
    }

    #[test]
    fn tables_agree_at_odd_reference_orders() {
        for label in 1..=15 {
            for plane in [CoefficientPlane::Normal, CoefficientPlane::Skew] {
                assert_eq!(
                    coefficient_flips(ParityTable::Unified, plane, 1, label),
                    coefficient_flips(ParityTable::PerFamily, plane, 1, label),
                );
                assert_eq!(
                    coefficient_flips(ParityTable::Unified, plane, 3, label),
                    coefficient_flips(ParityTable::PerFamily, plane, 3, label),
                );
            }
        }
    }

    #[test]
    fn tables_diverge_at_even_reference_orders() {
        // At order 0 the per-family convention flips b1 while the
        // unified one leaves it raw.
        assert!(coefficient_flips(
            ParityTable::PerFamily,
            CoefficientPlane::Normal,
            0,
            1
        ));
        assert!(!coefficient_flips(
            ParityTable::Unified,
            CoefficientPlane::Normal,
            0,
            1
        ));
        assert!(coefficient_flips(
            ParityTable::Unified,
            CoefficientPlane::Normal,
            0,
            2
        ));
        assert!(!coefficient_flips(
            ParityTable::PerFamily,
            CoefficientPlane::Normal,
            0,
            2
        ));
    }
}
