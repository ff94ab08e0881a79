use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use super::{load_snapshot, print_report, save_snapshot};

#[derive(Args, Debug)]
pub struct AperturesArgs {
    /// Input snapshot from the clean stage.
    #[arg(long = "in")]
    pub input: PathBuf,
    /// Output snapshot.
    #[arg(long)]
    pub out: PathBuf,
}

#[derive(Debug, Serialize)]
struct AperturesReport {
    status: String,
    detail: String,
}

/// Aperture computation is out of scope; the stage keeps its slot in
/// the pipeline so stage numbering and snapshot chains stay intact.
pub fn run(args: &AperturesArgs) -> Result<(), Box<dyn Error>> {
    let (model, provenance) = load_snapshot(&args.input)?;
    save_snapshot(&model, "apertures", provenance.seed, &args.out)?;
    print_report(&AperturesReport {
        status: "not-implemented".to_string(),
        detail: "aperture model computation is a recorded placeholder; snapshot passed through"
            .to_string(),
    })
}
