use std::{
    error::Error,
    fs::File,
    path::PathBuf,
    ffi::OsStr,
};

use located_error::*;

use clap::{Parser, Subcommand, Args};
use serde::{Serialize, Deserialize};
use log::debug;
use anyhow::{anyhow, Result};

mod error;
pub use error::ParserError;

#[derive(Parser, Debug, Serialize, Deserialize)]
#[clap(name="demohist", author, version, about, long_about = None)]
#[clap(propagate_version = true)]
/// demohist-rs: estimate demographic history from site-pattern branch lengths via coalescent simulation
pub struct Cli {
    ///Set the verbosity level (-v -vv -vvv)
    ///
    /// Set the verbosity level of this program. Multiple levels allowed {n}
    ///
    /// -v: Info  |  -vv: Debug  | -vvv: Trace {n}
    ///
    /// Note that the program will still output warnings by default, even when this flag is off.
    /// Use the --quiet/-q to disable them
    #[clap(short='v', long, action = clap::ArgAction::Count, global=true)]
    pub verbose: u8,

    /// Disable warnings.
    ///
    /// By default, warnings are emitted and redirected to the console, even when verbose mode is off.
    /// Use this argument to disable this. Only errors will be displayed.
    #[clap(short='q', long, global=true)]
    pub quiet: bool,

    #[clap(subcommand)]
    pub commands: Commands,
}

impl Cli {
    /// Serialize command line arguments within a `.yaml` file, next to the requested output file.
    ///
    /// # Behavior
    /// File naming follows the convention '{current time}-demohist.yaml'. current time follows the format
    /// `YYYY`-`MM`-`DD`T`hhmmss`
    ///
    /// # Errors
    /// Sends an unrecoverable error if `serde_yaml` fails to parse `Self` to a string.
    pub fn serialize(&self) -> Result<(), Box<dyn Error>> {
        let serialized = serde_yaml::to_string(&self)
            .map_err(|err| format!("Failed to serialize command line arguments. got [{err}]"))?;

        debug!("\n---- Command line args ----\n{}\n---", serialized);

        let current_time = chrono::offset::Local::now().format("%Y-%m-%dT%H%M%S").to_string();
        let output_file = match &self.commands {
            Commands::Simulate{..}  => format!("{current_time}-demohist.yaml"),
            Commands::FromYaml{..} | Commands::Cite => return Ok(()),
        };

        match std::fs::write(&output_file, serialized) {
            Err(e) => Err(format!("Unable to serialize arguments into {output_file}: [{e}]").into()),
            Ok(()) => Ok(()),
        }
    }

    /// Deserialize a `.yaml` file into Command line arguments.
    ///
    /// # Errors
    /// Returns `FileNotFound` or `PermissionDenied` if the provided `.yaml` is invalid, or does not
    /// carry read permissions; sends an unrecoverable error if `serde_yaml` fails to parse the file.
    pub fn deserialize(yaml: PathBuf) -> Result<Self, Box<dyn Error>> {
        Ok(serde_yaml::from_reader(File::open(yaml)?)?)
    }
}

#[derive(Subcommand, Debug, Serialize, Deserialize)]
pub enum Commands {
    /// Run the coalescent replicate engine over a population-description file.
    Simulate {
        #[clap(flatten)]
        model: Model,
        #[clap(flatten)]
        run: Run,
    },

    /// Run demohist-rs using a previously generated .yaml configuration file.
    ///
    /// This allows users to easily re-apply a demohist-rs invocation using the exact same
    /// parameters and arguments.
    FromYaml {
        yaml: PathBuf,
    },

    Cite,
}

#[derive(Args, Debug, Default, Serialize, Deserialize)]
pub struct Model {
    /// Path to the population-description file (see the grammar in the README).
    #[clap(value_parser=valid_input_file)]
    pub population: PathBuf,

    /// Include singleton site patterns (tipsets with exactly one sample bit set) in the branch table.
    #[clap(long)]
    pub singletons: bool,

    /// Re-emit the parsed population-description file to this path (debugging aid, round-trips
    /// through the same grammar `population` was read with).
    #[clap(long, value_name="PATH")]
    pub dump_model: Option<PathBuf>,
}

#[derive(Args, Debug, Serialize, Deserialize)]
pub struct Run {
    /// Number of independent coalescent replicates to simulate.
    #[clap(short='i', long, default_value_t=1_000_000)]
    pub reps: usize,

    /// Number of worker threads to use. 0 detects the available core count, capped at --reps.
    #[clap(short='t', long, default_value_t=0)]
    pub threads: usize,

    /// Output file for the normalized site-pattern probability table. Defaults to stdout.
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Seed the per-thread RNG streams. Each worker thread derives `seed + thread_index`.
    #[clap(long, default_value_t=fastrand::u64(u64::MIN..=u64::MAX))]
    pub seed: u64,

    /// Overwrite an existing --output file.
    #[clap(short='w', long)]
    pub overwrite: bool,
}

impl Default for Run {
    fn default() -> Self {
        Self{reps: 1_000_000, threads: 0, output: None, seed: 0, overwrite: false}
    }
}

fn valid_input_file(s: &str) -> Result<PathBuf> {
    use ParserError::MissingFileEntity;
    let path = PathBuf::from(s);
    if !path.is_file() {
        return Err(anyhow!(MissingFileEntity(path.display().to_string())))
            .loc("While checking for population-description file validity")
    }
    Ok(path)
}

/// Resolve the requested worker thread count, per spec §6: 0 detects available parallelism,
/// capped so no more threads are spawned than there are replicates to run.
#[must_use]
pub fn resolve_thread_count(requested: usize, reps: usize) -> usize {
    let detected = match requested {
        0 => std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
        n => n,
    };
    detected.min(reps.max(1))
}

pub fn assert_overwrite_allowed(path: &OsStr, overwrite: bool) -> Result<(), ParserError> {
    let path = PathBuf::from(path);
    if path.exists() && !overwrite {
        return Err(ParserError::CannotOverwrite(path.display().to_string()));
    }
    Ok(())
}
