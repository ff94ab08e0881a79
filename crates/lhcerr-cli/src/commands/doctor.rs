use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use serde::Serialize;

use lhcerr_model::{to_canonical_json_bytes, ModelSnapshot};

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Snapshot file to diagnose.
    #[arg(long = "in")]
    pub input: PathBuf,
    /// Emit only JSON without the status line.
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: String,
    ok: bool,
    detail: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    status: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(args: &DoctorArgs) -> Result<(), Box<dyn Error>> {
    let report = diagnose(&args.input)?;
    let json = to_canonical_json_bytes(&report)?;
    let rendered = String::from_utf8(json)?;
    if args.quiet {
        println!("{rendered}");
    } else {
        println!("lhcerr doctor status: {}", report.status);
        println!("{rendered}");
    }
    if report.status != "ok" {
        return Err("one or more checks failed".into());
    }
    Ok(())
}

fn diagnose(path: &Path) -> Result<DoctorReport, Box<dyn Error>> {
    let mut checks = Vec::new();
    let data = fs::read(path)?;
    let snapshot = match ModelSnapshot::from_json_bytes(&data) {
        Ok(snapshot) => {
            checks.push(ok(
                "schema",
                format!(
                    "version {}, stage {}",
                    snapshot.schema, snapshot.provenance.stage
                ),
            ));
            snapshot
        }
        Err(fault) => {
            checks.push(bad("schema", fault.to_string()));
            return Ok(finish(checks));
        }
    };

    match snapshot.content_hash() {
        Ok(hash) if hash == snapshot.provenance.model_hash => {
            checks.push(ok("content-hash", hash));
        }
        Ok(hash) => checks.push(bad(
            "content-hash",
            format!(
                "stored {} but recomputed {}",
                snapshot.provenance.model_hash, hash
            ),
        )),
        Err(fault) => checks.push(bad("content-hash", fault.to_string())),
    }

    match snapshot.into_model() {
        Ok((model, _)) => {
            checks.push(ok(
                "variable-graph",
                format!("{} definitions, acyclic", model.vars.names().count()),
            ));
            for (name, line) in model.lines() {
                let configured = !line.steering_correctors_x.is_empty()
                    && !line.steering_correctors_y.is_empty()
                    && !line.steering_monitors_x.is_empty();
                if configured {
                    checks.push(ok(
                        &format!("steering/{name}"),
                        format!(
                            "{}h + {}v correctors over {} monitors",
                            line.steering_correctors_x.len(),
                            line.steering_correctors_y.len(),
                            line.steering_monitors_x.len()
                        ),
                    ));
                } else {
                    checks.push(bad(
                        &format!("steering/{name}"),
                        "steering lists are empty; run the clean stage first".to_string(),
                    ));
                }
            }
        }
        Err(fault) => checks.push(bad("model-restore", fault.to_string())),
    }

    Ok(finish(checks))
}

fn ok(name: &str, detail: String) -> DoctorCheck {
    DoctorCheck {
        name: name.to_string(),
        ok: true,
        detail,
    }
}

fn bad(name: &str, detail: String) -> DoctorCheck {
    DoctorCheck {
        name: name.to_string(),
        ok: false,
        detail,
    }
}

fn finish(checks: Vec<DoctorCheck>) -> DoctorReport {
    let status = if checks.iter().all(|check| check.ok) {
        "ok"
    } else {
        "needs-attention"
    };
    DoctorReport {
        status: status.to_string(),
        checks,
    }
}
