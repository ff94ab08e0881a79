//! Magnet family classification and the per-run selection flags.
//!
//! Table slots are classified purely by name prefix, in a fixed
//! dispatch order. The prefixes all end in a dot except for the bare
//! `mb`/`mcb` groups, so `mss.` never falls into the `ms.` family and
//! `mcssx.` never falls into `mcs.`.

use serde::{Deserialize, Serialize};

/// One hardware family addressed by the error tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MagnetFamily {
    /// `mb.` main arc dipoles. Assigning them opens the trajectory
    /// correction window.
    MainDipoles,
    /// Bare `mb*` separation dipoles and `mcb*` orbit correctors.
    SeparationDipoles,
    /// `mq.` arc quadrupoles.
    ArcQuadrupoles,
    /// `ms.` lattice sextupoles and `mcs.`/`mcsx.` spool correctors.
    Sextupoles,
    /// `mss.` skew sextupoles and `mcssx.` correctors.
    SkewSextupoles,
    /// `mo.` lattice octupoles and `mco.`/`mcox.` spool correctors.
    Octupoles,
    /// `mcosx.` skew octupole correctors.
    SkewOctupoles,
    /// `mcd.` decapole spool correctors.
    Decapoles,
    /// `mctx.` dodecapole trim correctors.
    Dodecapoles,
}

impl MagnetFamily {
    /// Classifies a lowercased slot name, first match in dispatch order.
    pub fn classify(name: &str) -> Option<MagnetFamily> {
        if name.starts_with("mb.") {
            Some(MagnetFamily::MainDipoles)
        } else if name.starts_with("mb") || name.starts_with("mcb") {
            Some(MagnetFamily::SeparationDipoles)
        } else if name.starts_with("mq.") {
            Some(MagnetFamily::ArcQuadrupoles)
        } else if name.starts_with("ms.") || name.starts_with("mcs.") || name.starts_with("mcsx.")
        {
            Some(MagnetFamily::Sextupoles)
        } else if name.starts_with("mss.") || name.starts_with("mcssx.") {
            Some(MagnetFamily::SkewSextupoles)
        } else if name.starts_with("mo.") || name.starts_with("mco.") || name.starts_with("mcox.")
        {
            Some(MagnetFamily::Octupoles)
        } else if name.starts_with("mcosx.") {
            Some(MagnetFamily::SkewOctupoles)
        } else if name.starts_with("mcd.") {
            Some(MagnetFamily::Decapoles)
        } else if name.starts_with("mctx.") {
            Some(MagnetFamily::Dodecapoles)
        } else {
            None
        }
    }

    /// 0-based order of the reference strength the coefficients scale
    /// against.
    pub fn reference_order(&self) -> usize {
        match self {
            MagnetFamily::MainDipoles | MagnetFamily::SeparationDipoles => 0,
            MagnetFamily::ArcQuadrupoles => 1,
            MagnetFamily::Sextupoles | MagnetFamily::SkewSextupoles => 2,
            MagnetFamily::Octupoles | MagnetFamily::SkewOctupoles => 3,
            MagnetFamily::Decapoles => 4,
            MagnetFamily::Dodecapoles => 5,
        }
    }

    /// Whether the reference strength is a skew component.
    pub fn is_skew(&self) -> bool {
        matches!(
            self,
            MagnetFamily::SkewSextupoles | MagnetFamily::SkewOctupoles
        )
    }

    /// Whether the magnetic polarity convention applies to the family.
    ///
    /// The normal arc quadrupoles do not follow it; everything else
    /// does.
    pub fn magnetic_sign(&self) -> bool {
        !matches!(self, MagnetFamily::ArcQuadrupoles)
    }

    /// Stable report key.
    pub fn name(&self) -> &'static str {
        match self {
            MagnetFamily::MainDipoles => "main-dipoles",
            MagnetFamily::SeparationDipoles => "separation-dipoles",
            MagnetFamily::ArcQuadrupoles => "arc-quadrupoles",
            MagnetFamily::Sextupoles => "sextupoles",
            MagnetFamily::SkewSextupoles => "skew-sextupoles",
            MagnetFamily::Octupoles => "octupoles",
            MagnetFamily::SkewOctupoles => "skew-octupoles",
            MagnetFamily::Decapoles => "decapoles",
            MagnetFamily::Dodecapoles => "dodecapoles",
        }
    }
}

/// Which magnet groups an assignment run touches.
///
/// Every flag defaults to off, so a scenario names exactly the groups
/// it wants errors on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FamilySelection {
    /// `mb.` main dipoles.
    pub dipoles: bool,
    /// Bare `mb*` separation and recombination dipoles.
    pub separation_dipoles: bool,
    /// `mq.` arc quadrupoles.
    pub quadrupoles: bool,
    /// `ms.` lattice sextupoles.
    pub sextupoles: bool,
    /// `mss.` skew sextupoles.
    pub skew_sextupoles: bool,
    /// `mo.` lattice octupoles.
    pub octupoles: bool,
    /// `mcb*` orbit correctors.
    pub corrector_dipoles: bool,
    /// `mcs.`/`mcsx.` sextupole spool correctors.
    pub corrector_sextupoles: bool,
    /// `mcssx.` skew sextupole correctors.
    pub corrector_skew_sextupoles: bool,
    /// `mco.`/`mcox.` octupole spool correctors.
    pub corrector_octupoles: bool,
    /// `mcosx.` skew octupole correctors.
    pub corrector_skew_octupoles: bool,
    /// `mcd.` decapole spool correctors.
    pub corrector_decapoles: bool,
    /// `mctx.` dodecapole trim correctors.
    pub corrector_dodecapoles: bool,
}

impl FamilySelection {
    /// Selection with every group enabled.
    pub fn enable_all() -> Self {
        Self {
            dipoles: true,
            separation_dipoles: true,
            quadrupoles: true,
            sextupoles: true,
            skew_sextupoles: true,
            octupoles: true,
            corrector_dipoles: true,
            corrector_sextupoles: true,
            corrector_skew_sextupoles: true,
            corrector_octupoles: true,
            corrector_skew_octupoles: true,
            corrector_decapoles: true,
            corrector_dodecapoles: true,
        }
    }

    /// Whether any group at all is enabled.
    pub fn any(&self) -> bool {
        *self != FamilySelection::default()
    }

    /// Table-slot prefixes collected by the enabled flags, in scan
    /// order, for the families after the main dipoles.
    ///
    /// The bare `mb` prefix of the separation group also matches `mb.`
    /// slots; those are classified back to the main dipoles and skipped
    /// by the second pass.
    pub fn selected_prefixes(&self) -> Vec<&'static str> {
        let mut prefixes = Vec::new();
        if self.separation_dipoles {
            prefixes.push("mb");
        }
        if self.quadrupoles {
            prefixes.push("mq.");
        }
        if self.sextupoles {
            prefixes.push("ms.");
        }
        if self.skew_sextupoles {
            prefixes.push("mss.");
        }
        if self.octupoles {
            prefixes.push("mo.");
        }
        if self.corrector_dipoles {
            prefixes.push("mcb.");
        }
        if self.corrector_sextupoles {
            prefixes.extend(["mcs.", "mcsx."]);
        }
        if self.corrector_skew_sextupoles {
            prefixes.push("mcssx.");
        }
        if self.corrector_octupoles {
            prefixes.extend(["mco.", "mcox."]);
        }
        if self.corrector_skew_octupoles {
            prefixes.push("mcosx.");
        }
        if self.corrector_decapoles {
            prefixes.push("mcd.");
        }
        if self.corrector_dodecapoles {
            prefixes.push("mctx.");
        }
        prefixes
    }

    /// Element-name globs whose matches get their coefficient arrays
    /// pre-extended, one entry per enabled flag, in scan order.
    pub fn extension_patterns(&self) -> Vec<&'static str> {
        let mut patterns = Vec::new();
        if self.dipoles {
            patterns.push("mb.*");
        }
        if self.separation_dipoles {
            patterns.push("mb[!.]*");
        }
        if self.quadrupoles {
            patterns.push("mq.*");
        }
        if self.sextupoles {
            patterns.push("ms.*");
        }
        if self.skew_sextupoles {
            patterns.push("mss.*");
        }
        if self.octupoles {
            patterns.push("mo.*");
        }
        if self.corrector_dipoles {
            patterns.push("mcb*");
        }
        if self.corrector_sextupoles {
            patterns.extend(["mcs.*", "mcsx.*"]);
        }
        if self.corrector_skew_sextupoles {
            patterns.push("mcssx.*");
        }
        if self.corrector_octupoles {
            patterns.extend(["mco.*", "mcox.*"]);
        }
        if self.corrector_skew_octupoles {
            patterns.push("mcosx.*");
        }
        if self.corrector_decapoles {
            patterns.push("mcd.*");
        }
        if self.corrector_dodecapoles {
            patterns.push("mctx.*");
        }
        patterns
    }
}
