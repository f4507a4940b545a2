//! The parallel replicate scheduler (spec §4.5/§4.6): duplicates a
//! population network and its parameter store once per worker thread, runs
//! each worker's share of replicates through the coalescent kernel, and
//! reduces the per-worker branch tables into one normalized aggregate.
//!
//! Grounded on [`jobqueue::JobQueue`]'s bounded pool: one job per worker
//! (not one job per replicate), so each job *is* the "per-thread batch" the
//! spec describes, and the aggregate merge happens exactly once per worker
//! instead of once per replicate.

use std::sync::{Arc, Mutex};

use coalescent::{simulate, tabulate, BranchTable, CoalescentError};
use indicatif::ProgressBar;
use jobqueue::JobQueue;
use log::{debug, info};
use network::{PopulationDag, SegHandle, TipSet};
use params::ParameterStore;

mod error;
pub use error::SimError;

/// Inputs to one outer call of the replicate driver. `threads` is expected
/// to already be resolved (see the CLI's `resolve_thread_count`) — 0 is not
/// special-cased here, it simply runs everything on a single worker.
#[derive(Debug, Clone, Copy)]
pub struct RunConfig {
    pub reps: usize,
    pub threads: usize,
    /// Per-thread RNG streams are seeded `seed + thread_index`, so a run is
    /// exactly reproducible given `(seed, threads)` (spec §9).
    pub seed: u64,
    /// Include single-tip site patterns in the branch table (spec §4.3's
    /// tabulation config flag).
    pub include_singletons: bool,
}

struct WorkerState {
    dag: PopulationDag,
    params: ParameterStore,
    rng: fastrand::Rng,
}

/// Run `config.reps` independent coalescent replicates from `root`, spread
/// across `config.threads` workers, and return the normalized aggregate
/// branch table. `progress`, if given, is ticked once per completed
/// replicate — safe to share across worker threads, since
/// [`indicatif::ProgressBar`] is internally an `Arc`.
///
/// # Errors
/// Propagates the first [`CoalescentError`] any worker hits (e.g. a
/// non-finite segment end time) once every worker has drained, and
/// [`jobqueue::JobQueueError`] if a worker thread failed to spawn.
pub fn run(
    dag: &PopulationDag,
    params: &ParameterStore,
    root: SegHandle,
    universe: TipSet,
    config: &RunConfig,
    progress: Option<&ProgressBar>,
) -> Result<BranchTable, SimError> {
    let threads = config.threads.max(1).min(config.reps.max(1));
    let dag_owned = dag.duplicate();
    let params_owned = params.duplicate();
    let seed = config.seed;

    let pool: JobQueue<WorkerState> = JobQueue::new(threads, move |index| WorkerState{
        dag: dag_owned.duplicate(),
        params: params_owned.duplicate(),
        rng: fastrand::Rng::with_seed(seed.wrapping_add(index as u64)),
    });

    let aggregate: Arc<Mutex<BranchTable>> = Arc::new(Mutex::new(BranchTable::new()));
    let status: Arc<Mutex<Option<CoalescentError>>> = Arc::new(Mutex::new(None));

    let base = config.reps / threads;
    let extra = config.reps % threads;
    let include_singletons = config.include_singletons;
    info!("Scheduling {} replicates across {threads} worker(s)", config.reps);

    for i in 0..threads {
        let batch = base + usize::from(i < extra);
        if batch == 0 { continue; }
        let aggregate = Arc::clone(&aggregate);
        let status = Arc::clone(&status);
        let progress = progress.cloned();
        pool.add_job(move |state: &mut WorkerState| {
            let mut local = BranchTable::new();
            for _ in 0..batch {
                if status.lock().expect("status mutex poisoned").is_some() { break; }
                match simulate(&state.dag, &state.params, root, &mut state.rng) {
                    Ok(tree) => tabulate(&tree, universe, include_singletons, &mut local),
                    Err(e) => {
                        *status.lock().expect("status mutex poisoned") = Some(e);
                        break;
                    },
                }
                if let Some(bar) = &progress { bar.inc(1); }
            }
            debug!("Worker finished a batch of {batch} replicates, merging {} site patterns", local.len());
            aggregate.lock().expect("aggregate branch table mutex poisoned").merge(&local);
        })?;
    }
    pool.wait_on_jobs();
    drop(pool);

    if let Some(e) = status.lock().expect("status mutex poisoned").take() {
        return Err(e.into());
    }

    let mut result = Arc::try_unwrap(aggregate)
        .expect("every worker thread has joined by the time wait_on_jobs returns")
        .into_inner()
        .expect("aggregate branch table mutex poisoned");
    result.normalize()?;
    Ok(result)
}
