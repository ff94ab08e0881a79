//! Provenance and schema descriptors shared across lhcerr artifacts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Semantic version describing the schema of serialized payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Major version incremented for breaking changes.
    pub major: u32,
    /// Minor version incremented for additive changes.
    pub minor: u32,
    /// Patch version incremented for bug fixes and documentation updates.
    pub patch: u32,
}

impl SchemaVersion {
    /// Creates a new schema version descriptor.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::new(1, 0, 0)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Provenance information attached to every serialized lattice snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SnapshotProvenance {
    /// Pipeline stage that produced the snapshot (e.g. "clean", "errors").
    pub stage: String,
    /// Error-table realization seed, when one has been applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Canonical content hash of the model carried in the snapshot.
    pub model_hash: String,
    /// ISO-8601 timestamp recording when the snapshot was written.
    pub created_at: String,
    /// Version map for all tools involved in producing the snapshot.
    pub tool_versions: BTreeMap<String, String>,
}

impl SnapshotProvenance {
    /// Creates provenance for a stage with its content hash; timestamp,
    /// seed and tool versions are filled in by the caller.
    pub fn new(stage: impl Into<String>, model_hash: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            seed: None,
            model_hash: model_hash.into(),
            created_at: String::new(),
            tool_versions: BTreeMap::new(),
        }
    }
}
