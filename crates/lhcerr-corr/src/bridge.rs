//! Process bridge to the external arc correction binary.
//!
//! The binary reads a fixed pair of generic file names in its working
//! directory and writes its settings under another fixed name. The
//! bridge re-points the generic names at the per-line tables, runs the
//! binary and claims the output under a per-line name, one line at a
//! time.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use lhcerr_core::errors::{ErrorInfo, Fault};
use lhcerr_model::Expr;

use crate::settings::parse_settings;

/// Generic reference-optics name the binary reads.
const GENERIC_OPTICS: &str = "optics0_MB.mad";
/// Generic error-table name the binary reads.
const GENERIC_ERRORS: &str = "MB.errors";
/// Settings file name the binary writes.
const GENERIC_OUTPUT: &str = "MB_corr_setting.mad";

/// Runs the external spool-piece correction binary over per-line tables.
#[derive(Debug, Clone)]
pub struct CorrectionBridge {
    binary: PathBuf,
    work_dir: PathBuf,
}

impl CorrectionBridge {
    /// Bridge running `binary` inside `work_dir`.
    pub fn new(binary: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            work_dir: work_dir.into(),
        }
    }

    /// Directory the binary runs in and the tables live in.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Solves one line and returns the parsed settings.
    ///
    /// Expects `optics0_MB_{line}.mad` and `MB_{line}.errors` in the
    /// work dir. All lines share the one set of generic names, so calls
    /// must stay serial.
    pub fn solve_line(&self, line: &str) -> Result<Vec<(String, Expr)>, Fault> {
        let optics = format!("optics0_MB_{line}.mad");
        let errors = format!("MB_{line}.errors");
        for input in [&optics, &errors] {
            if !self.work_dir.join(input).exists() {
                return Err(
                    bridge_fault("missing-input", "correction input table is missing")
                        .with_context("line", line)
                        .with_context("file", input)
                        .with_hint("write the reference optics and error tables first"),
                );
            }
        }
        self.repoint(GENERIC_OPTICS, &optics)?;
        self.repoint(GENERIC_ERRORS, &errors)?;

        let output = Command::new(&self.binary)
            .current_dir(&self.work_dir)
            .output()
            .map_err(|source| {
                bridge_fault("binary-launch", "cannot launch the correction binary")
                    .with_context("binary", self.binary.display())
                    .with_context("cause", source)
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(
                bridge_fault("binary-failed", "the correction binary reported failure")
                    .with_context("line", line)
                    .with_context("status", output.status)
                    .with_context("stderr", stderr.trim()),
            );
        }

        let settings_path = self.work_dir.join(format!("MB_corr_setting_{line}.mad"));
        fs::rename(self.work_dir.join(GENERIC_OUTPUT), &settings_path).map_err(|source| {
            bridge_fault("missing-output", "the correction binary wrote no settings file")
                .with_context("line", line)
                .with_context("file", GENERIC_OUTPUT)
                .with_context("cause", source)
        })?;
        let text = fs::read_to_string(&settings_path).map_err(|source| {
            bridge_fault("settings-io", "cannot read the correction settings file")
                .with_context("path", settings_path.display())
                .with_context("cause", source)
        })?;
        parse_settings(&text)
    }

    /// Points a generic file name at the per-line table.
    fn repoint(&self, generic: &str, target: &str) -> Result<(), Fault> {
        let link = self.work_dir.join(generic);
        match fs::symlink_metadata(&link) {
            Ok(_) => fs::remove_file(&link).map_err(|source| {
                bridge_fault("settings-io", "cannot clear a generic table name")
                    .with_context("path", link.display())
                    .with_context("cause", source)
            })?,
            Err(source) if source.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(
                    bridge_fault("settings-io", "cannot inspect a generic table name")
                        .with_context("path", link.display())
                        .with_context("cause", source),
                )
            }
        }
        #[cfg(unix)]
        let linked = std::os::unix::fs::symlink(target, &link);
        #[cfg(not(unix))]
        let linked = fs::copy(self.work_dir.join(target), &link).map(|_| ());
        linked.map_err(|source| {
            bridge_fault("settings-io", "cannot point a generic table name")
                .with_context("path", link.display())
                .with_context("target", target)
                .with_context("cause", source)
        })
    }
}

fn bridge_fault(code: &str, message: &str) -> Fault {
    Fault::Correction(ErrorInfo::new(code, message))
}

trait ContextExt {
    fn with_context(self, key: &str, value: impl ToString) -> Fault;
    fn with_hint(self, hint: &str) -> Fault;
}

impl ContextExt for Fault {
    fn with_context(self, key: &str, value: impl ToString) -> Fault {
        match self {
            Fault::Correction(info) => Fault::Correction(info.with_context(key, value.to_string())),
            other => other,
        }
    }

    fn with_hint(self, hint: &str) -> Fault {
        match self {
            Fault::Correction(info) => Fault::Correction(info.with_hint(hint)),
            other => other,
        }
    }
}
