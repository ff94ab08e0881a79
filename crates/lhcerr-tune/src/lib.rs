//! Optics tuning: a deterministic linear engine, staircase matching,
//! MICADO trajectory correction and the machine-knob plumbing shared by
//! the pipeline stages.

#![deny(missing_docs)]

pub mod knobs;
pub mod linear;
pub mod matcher;
pub mod micado;
mod solve;
pub mod tune;

pub use knobs::{
    apply_knob_settings, check_knob_settings, disable_crossing, install_correction_terms,
    install_octupole_knob, install_phase_knob, install_tuning_knobs, restore_crossing,
    select_steering, KnobCheckReport,
};
pub use linear::{beam_suffix, LinearOptics, LinearOpticsConfig};
pub use matcher::{
    match_targets, staircase_match, MatchOptions, MatchOutcome, MatchTarget, StaircaseStage,
    TargetKind, Vary,
};
pub use micado::{consider_micado, correct_trajectory, Micado, MicadoOptions};
pub use tune::{tune_line, TuneOptions, TuneReport, WorkingPoint};
