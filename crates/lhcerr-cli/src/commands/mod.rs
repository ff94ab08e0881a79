pub mod apertures;
pub mod clean;
pub mod correct;
pub mod demo;
pub mod doctor;
pub mod errors;
pub mod seeds;

use std::error::Error;
use std::fs;
use std::path::Path;

use lhcerr_core::provenance::SnapshotProvenance;
use lhcerr_model::{
    model_from_json_bytes, model_to_json_bytes, to_canonical_json_bytes, LatticeModel,
};

/// Reads a snapshot file back into a model.
pub(crate) fn load_snapshot(
    path: &Path,
) -> Result<(LatticeModel, SnapshotProvenance), Box<dyn Error>> {
    let data = fs::read(path)?;
    Ok(model_from_json_bytes(&data)?)
}

/// Writes a model snapshot, creating parent directories.
pub(crate) fn save_snapshot(
    model: &LatticeModel,
    stage: &str,
    seed: Option<u64>,
    path: &Path,
) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let bytes = model_to_json_bytes(model, stage, seed)?;
    fs::write(path, bytes)?;
    Ok(())
}

/// Prints a report to stdout as canonical JSON.
pub(crate) fn print_report<T: serde::Serialize>(report: &T) -> Result<(), Box<dyn Error>> {
    let json = to_canonical_json_bytes(report)?;
    println!("{}", String::from_utf8(json)?);
    Ok(())
}

/// Writes a report as pretty JSON beside the other stage artifacts.
pub(crate) fn write_json<T: serde::Serialize>(
    path: &Path,
    value: &T,
) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}
