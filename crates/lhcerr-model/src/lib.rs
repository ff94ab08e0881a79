//! Lattice model: elements, lines, deferred-expression variable graph,
//! snapshot serialization and the optics-engine seam.

#![deny(missing_docs)]

mod element;
mod generators;
mod hash;
mod line;
mod model;
mod optics;
mod serialization;
mod vars;

pub use element::{Element, ElementKind};
pub use generators::{arc_label, build_demo_model, DEMO_CELLS, DEMO_CROSSING_OCTANTS, DEMO_OCTANTS};
pub use line::Line;
pub use model::{ElementRef, LatticeModel};
pub use optics::{
    OpticsEngine, OpticsRow, OpticsTable, SteeringOutcome, TrajectoryCorrector, TwissOptions,
};
pub use vars::{Expr, VarDef, VarGraph};

/// Re-export canonical JSON and hashing helpers for downstream crates.
pub use hash::{from_json_slice, stable_hash_string, to_canonical_json_bytes};

/// Re-export snapshot helpers for downstream crates.
pub use serialization::{
    model_content_hash, model_from_json_bytes, model_to_json_bytes, ModelSnapshot,
};
