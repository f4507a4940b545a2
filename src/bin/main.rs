//! Thin entry point: parse arguments, persist them for reproducibility,
//! initialize the logger, and dispatch into the library's `run(cli)`.
//!
//! Grounded on the teacher's `src/bin/main.rs`: parse -> serialize -> init
//! logger -> dispatch, converting a returned error into a logged diagnostic
//! and a non-zero exit code rather than a panic/backtrace.

use std::process::ExitCode;

use clap::Parser;
use log::error;
use parser::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let verbosity = cli.verbose + u8::from(!cli.quiet);
    logger::Logger::init(verbosity);

    if let Err(e) = cli.serialize() {
        log::warn!("Failed to serialize command line arguments: {e}");
    }

    match demohist_rs::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:?}");
            ExitCode::FAILURE
        },
    }
}
