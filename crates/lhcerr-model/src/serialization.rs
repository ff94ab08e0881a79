//! Versioned machine snapshots.
//!
//! Every pipeline stage persists the full model (lines plus variable
//! graph) as a JSON document carrying a schema version, provenance and
//! a content hash. Loading re-validates the variable graph through its
//! public API and refuses documents whose content hash does not match.

use indexmap::IndexMap;
use lhcerr_core::errors::{ErrorInfo, Fault};
use lhcerr_core::provenance::{SchemaVersion, SnapshotProvenance};
use serde::{Deserialize, Serialize};

use crate::hash::{from_json_slice, stable_hash_string, to_canonical_json_bytes};
use crate::line::Line;
use crate::model::LatticeModel;
use crate::vars::VarDef;

/// On-disk snapshot document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSnapshot {
    /// Document schema version.
    pub schema: SchemaVersion,
    /// Stage, seed and hash bookkeeping.
    pub provenance: SnapshotProvenance,
    /// Lines in model order.
    pub lines: Vec<Line>,
    /// Variable definitions in insertion order.
    pub vars: IndexMap<String, VarDef>,
}

#[derive(Serialize)]
struct ContentDoc<'a> {
    lines: &'a [Line],
    vars: &'a IndexMap<String, VarDef>,
}

/// Computes the content hash of a model, ignoring provenance.
pub fn model_content_hash(model: &LatticeModel) -> Result<String, Fault> {
    let lines: Vec<Line> = model.lines().map(|(_, line)| line.clone()).collect();
    let vars: IndexMap<String, VarDef> = model
        .vars
        .defs()
        .map(|(name, def)| (name.to_string(), def.clone()))
        .collect();
    stable_hash_string(&ContentDoc {
        lines: &lines,
        vars: &vars,
    })
}

impl ModelSnapshot {
    /// Captures the model under the given stage label and optional seed.
    pub fn capture(model: &LatticeModel, stage: &str, seed: Option<u64>) -> Result<Self, Fault> {
        let lines: Vec<Line> = model.lines().map(|(_, line)| line.clone()).collect();
        let vars: IndexMap<String, VarDef> = model
            .vars
            .defs()
            .map(|(name, def)| (name.to_string(), def.clone()))
            .collect();
        let model_hash = stable_hash_string(&ContentDoc {
            lines: &lines,
            vars: &vars,
        })?;
        let mut provenance = SnapshotProvenance::new(stage, model_hash);
        provenance.seed = seed;
        provenance.created_at = chrono::Utc::now().to_rfc3339();
        provenance
            .tool_versions
            .insert("lhcerr".to_string(), env!("CARGO_PKG_VERSION").to_string());
        Ok(Self {
            schema: SchemaVersion::default(),
            provenance,
            lines,
            vars,
        })
    }

    /// Serializes the snapshot to canonical JSON bytes.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, Fault> {
        to_canonical_json_bytes(self)
    }

    /// Parses a snapshot document without restoring the model.
    pub fn from_json_bytes(data: &[u8]) -> Result<Self, Fault> {
        let snapshot: ModelSnapshot = from_json_slice(data)?;
        let supported = SchemaVersion::default();
        if snapshot.schema.major != supported.major {
            return Err(Fault::Serde(
                ErrorInfo::new("schema-version", "unsupported snapshot schema")
                    .with_context("found", snapshot.schema.to_string())
                    .with_context("supported", supported.to_string()),
            ));
        }
        Ok(snapshot)
    }

    /// Content hash recomputed from the document body.
    pub fn content_hash(&self) -> Result<String, Fault> {
        stable_hash_string(&ContentDoc {
            lines: &self.lines,
            vars: &self.vars,
        })
    }

    /// Restores the model, re-validating the variable graph and checking
    /// the stored content hash.
    pub fn into_model(self) -> Result<(LatticeModel, SnapshotProvenance), Fault> {
        let recomputed = self.content_hash()?;
        if recomputed != self.provenance.model_hash {
            return Err(Fault::Serde(
                ErrorInfo::new("hash-mismatch", "snapshot content does not match its hash")
                    .with_context("stored", &self.provenance.model_hash)
                    .with_context("recomputed", recomputed)
                    .with_hint("the snapshot file was edited or truncated after capture"),
            ));
        }
        let mut model = LatticeModel::new();
        for line in self.lines {
            model.add_line(line)?;
        }
        model.vars = crate::vars::VarGraph::from_defs(self.vars)?;
        Ok((model, self.provenance))
    }
}

/// Serializes a model with fresh provenance straight to JSON bytes.
pub fn model_to_json_bytes(
    model: &LatticeModel,
    stage: &str,
    seed: Option<u64>,
) -> Result<Vec<u8>, Fault> {
    ModelSnapshot::capture(model, stage, seed)?.to_json_bytes()
}

/// Restores a model and its provenance from snapshot JSON bytes.
pub fn model_from_json_bytes(data: &[u8]) -> Result<(LatticeModel, SnapshotProvenance), Fault> {
    ModelSnapshot::from_json_bytes(data)?.into_model()
}
