//! Shared fault surface and vocabulary types for the lhcerr pipeline.

#![deny(missing_docs)]

pub mod errors;
pub mod provenance;
pub mod rng;
mod types;

pub use errors::{ErrorInfo, Fault};
pub use provenance::{SchemaVersion, SnapshotProvenance};
pub use rng::RngHandle;
pub use types::{Beam, TwissMethod};

/// Convenience alias used by every crate in the workspace.
pub type Result<T> = std::result::Result<T, Fault>;
