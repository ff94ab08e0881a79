use std::error::Error;

use clap::{Parser, Subcommand};

use commands::{
    apertures::{self, AperturesArgs},
    clean::{self, CleanArgs},
    correct::{self, CorrectArgs},
    demo::{self, DemoArgs},
    doctor::{self, DoctorArgs},
    errors::{self, ErrorsArgs},
    seeds::{self, SeedsArgs},
};

mod commands;
mod config;

#[derive(Parser, Debug)]
#[command(
    name = "lhcerr",
    about = "LHC field-error assignment and correction pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate the built-in demo machine and write its snapshot.
    Demo(DemoArgs),
    /// Stage 000: match the bare machine onto its clean working point.
    Clean(CleanArgs),
    /// Stage 001: aperture placeholder, passes the snapshot through.
    Apertures(AperturesArgs),
    /// Stage 002: assign measured field errors onto the lattice.
    Errors(ErrorsArgs),
    /// Stage 003: spool-piece correction and final re-match.
    Correct(CorrectArgs),
    /// List error-table realisations available under a table root.
    Seeds(SeedsArgs),
    /// Diagnose a snapshot file.
    Doctor(DoctorArgs),
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    match cli.command {
        Command::Demo(args) => demo::run(&args),
        Command::Clean(args) => clean::run(&args),
        Command::Apertures(args) => apertures::run(&args),
        Command::Errors(args) => errors::run(&args),
        Command::Correct(args) => correct::run(&args),
        Command::Seeds(args) => seeds::run(&args),
        Command::Doctor(args) => doctor::run(&args),
    }
}
