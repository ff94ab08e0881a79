use std::error::Error;
use std::path::PathBuf;

use clap::Args;

use lhcerr_assign::discover_seeds;

use super::print_report;

#[derive(Args, Debug)]
pub struct SeedsArgs {
    /// Table root to scan.
    #[arg(long, default_value = "tables")]
    pub root: PathBuf,
}

pub fn run(args: &SeedsArgs) -> Result<(), Box<dyn Error>> {
    let seeds = discover_seeds(&args.root)?;
    print_report(&seeds)
}
