//! Arc spool-piece correction through an external solver binary.
//!
//! The solver is a black box that reads a reference optics table and an
//! error-field table under fixed generic names, and emits a MAD-X
//! settings file with the spool-piece circuit trims. This crate wraps
//! the per-line file shuffling around the binary, parses its output and
//! folds the settings back onto the machine variable graph.

#![deny(missing_docs)]

pub mod bridge;
pub mod correct;
pub mod settings;

pub use bridge::CorrectionBridge;
pub use correct::{
    fold_settings, install_trim_aliases, run_correction, CorrectionSummary, FoldReport,
    LineCorrection,
};
pub use settings::parse_settings;
