//! Magnet field-error assignment: tables, toggles, sign conventions and
//! the two-pass engine that maps measured multipole coefficients onto a
//! lattice model.

#![deny(missing_docs)]

pub mod engine;
pub mod families;
pub mod sign;
pub mod tables;
pub mod toggles;

pub use engine::{assign_errors, AssignmentConfig, AssignmentReport};
pub use families::{FamilySelection, MagnetFamily};
pub use sign::{coefficient_flips, coefficient_sign, CoefficientPlane, ParityTable, SignContext};
pub use tables::{
    demo_error_table, demo_rotation_table, discover_seeds, error_table_path, rotation_table_path,
    store_error_table, store_rotation_table, ErrorEntry, ErrorTable, Regime, Rotation,
    RotationTable, SeedEntry, TableKind, MAX_COEFFICIENT_LABEL,
};
pub use toggles::{install_error_toggles, ToggleGates, MAX_TOGGLE_ORDER};
