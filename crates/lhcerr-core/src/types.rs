use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Beam selector attached to every error-table entry.
///
/// `Both` (table value 0) addresses shared insertion-region slots that
/// exist once per line under the same name; `B1`/`B2` address the
/// per-beam instances suffixed `.b1`/`.b2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Beam {
    /// Shared slot, present in every line.
    Both,
    /// Clockwise beam.
    B1,
    /// Counter-rotating beam (beam 2, beam 4 in the injector convention).
    B2,
}

impl Beam {
    /// Maps the table's integer beam column to a selector.
    pub fn from_table_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(Beam::Both),
            1 => Some(Beam::B1),
            2 => Some(Beam::B2),
            _ => None,
        }
    }

    /// Element name suffix for per-beam instances, `None` for shared slots.
    pub fn suffix(&self) -> Option<&'static str> {
        match self {
            Beam::Both => None,
            Beam::B1 => Some("b1"),
            Beam::B2 => Some("b2"),
        }
    }

    /// True for the counter-rotating beam, which inverts the sign frame.
    pub fn is_reversed(&self) -> bool {
        matches!(self, Beam::B2)
    }
}

impl Display for Beam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Beam::Both => write!(f, "both"),
            Beam::B1 => write!(f, "b1"),
            Beam::B2 => write!(f, "b2"),
        }
    }
}

/// Closed-solution mode requested from an optics engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TwissMethod {
    /// Transverse-only solution with frozen longitudinal coordinates.
    #[serde(rename = "4d")]
    FourD,
    /// Full six-dimensional solution including the RF bucket.
    #[serde(rename = "6d")]
    SixD,
}

impl Display for TwissMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TwissMethod::FourD => write!(f, "4d"),
            TwissMethod::SixD => write!(f, "6d"),
        }
    }
}
