//! Top-level dispatch for the `demohist` binary (spec §6/§7): parses a
//! population-description file, runs the coalescent replicate engine, and
//! writes the resulting site-pattern table.
//!
//! Grounded on the teacher's `grups_rs::run(cli)` / `src/bin/main.rs` split:
//! a library entry point that matches on [`parser::Commands`] and does the
//! actual work, kept separate from the thin binary that owns CLI parsing,
//! logger initialization, and the process exit code.

use std::io;

use anyhow::{anyhow, Result};
use located_error::prelude::*;
use log::info;

use parser::{Cli, Commands, Model, Run};

/// Dispatch one parsed invocation. `FromYaml` recurses into a
/// freshly-deserialized `Cli`, mirroring the teacher's own `self::run(cli)`
/// re-entry.
pub fn run(cli: Cli) -> Result<()> {
    match cli.commands {
        Commands::Simulate{model, run} => run_simulate(&model, &run),
        Commands::FromYaml{yaml} => {
            let cli = Cli::deserialize(yaml).map_err(|e| anyhow!(e.to_string()))?;
            self::run(cli)
        },
        Commands::Cite => { print_citation(); Ok(()) },
    }
}

fn run_simulate(model: &Model, run_cfg: &Run) -> Result<()> {
    if let Some(output) = &run_cfg.output {
        parser::assert_overwrite_allowed(output.as_os_str(), run_cfg.overwrite)
            .loc("While checking whether the output file may be overwritten")?;
    }

    info!("Reading population-description file {}", model.population.display());
    let (params, dag, labels) = netio::read_model(&model.population)
        .loc("While reading the population-description file")?;

    if let Some(dump_path) = &model.dump_model {
        info!("Dumping parsed population description to {}", dump_path.display());
        netio::write_model(dump_path, &params, &dag)
            .loc("While dumping the parsed population-description file")?;
    }

    let (any_handle, _) = dag.iter().next()
        .ok_or_else(|| anyhow!("population-description file '{}' declares no segments", model.population.display()))?;
    let root = dag.root(any_handle)
        .loc("While locating the root of the population network")?;

    let universe = labels.all_samples();
    let threads = parser::resolve_thread_count(run_cfg.threads, run_cfg.reps);
    info!("Simulating {} replicates across {threads} worker thread(s)", run_cfg.reps);

    let bar = indicatif::ProgressBar::new(run_cfg.reps as u64);
    logger::Logger::multi().add(bar.clone());

    let config = sim::RunConfig{
        reps: run_cfg.reps,
        threads,
        seed: run_cfg.seed,
        include_singletons: model.singletons,
    };
    let table = sim::run(&dag, &params, root, universe, &config, Some(&bar))
        .loc("While running the coalescent replicate engine")?;
    bar.finish_and_clear();

    match &run_cfg.output {
        Some(path) => netio::write_site_patterns(path, &table, &labels)
            .loc("While writing the site-pattern output file")?,
        None => netio::write_site_patterns_to(io::stdout(), &table, &labels)
            .loc("While writing the site-pattern output to stdout")?,
    }
    Ok(())
}

fn print_citation() {
    println!("demohist-rs: a coalescent replicate engine for demographic history estimation.");
    println!("https://github.com/demohist-rs/demohist-rs");
}
