//! A bounded thread pool with exactly three worker states — idle, running,
//! terminating — and a caller-visible `addJob` / `noMoreJobs` / `waitOnJobs`
//! contract. Workers are spawned lazily, on demand, up to a fixed maximum.
//!
//! Grounded on the `Executor`/`Promise` job-queue pattern (a mutex-guarded
//! heap plus a `Condvar`, workers parked until woken), generalized here to a
//! second condition variable so the main thread can itself block until the
//! pool drains, and to a per-worker state object built by a caller-supplied
//! factory instead of stateless closures.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use log::{debug, trace};

mod error;
pub use error::JobQueueError;

type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

struct QueueState<S> {
    jobs: VecDeque<Job<S>>,
    idle: usize,
    threads: usize,
    accepting: bool,
    handles: Vec<JoinHandle<()>>,
}

struct Shared<S> {
    state: Mutex<QueueState<S>>,
    wake_worker: Condvar,
    wake_main: Condvar,
    max_threads: usize,
    factory: Box<dyn Fn(usize) -> S + Send + Sync>,
}

/// A bounded pool of worker threads, each carrying its own `S` (typically
/// per-thread RNG state), running jobs submitted via [`Self::add_job`].
///
/// Jobs are independent and unordered; no job ever holds the queue's
/// internal mutex while running.
pub struct JobQueue<S> {
    shared: Arc<Shared<S>>,
}

impl<S: Send + 'static> JobQueue<S> {
    /// Create a pool that spawns up to `max_threads` workers on demand, each
    /// built by calling `factory(thread_index)` the first time that slot is
    /// needed. `max_threads == 0` is clamped to 1.
    #[must_use]
    pub fn new(max_threads: usize, factory: impl Fn(usize) -> S + Send + Sync + 'static) -> Self {
        let shared = Arc::new(Shared{
            state: Mutex::new(QueueState{
                jobs: VecDeque::new(),
                idle: 0,
                threads: 0,
                accepting: true,
                handles: Vec::new(),
            }),
            wake_worker: Condvar::new(),
            wake_main: Condvar::new(),
            max_threads: max_threads.max(1),
            factory: Box::new(factory),
        });
        Self{shared}
    }

    /// `addJob`: submit a job. If an idle worker exists, wake it; else if the
    /// pool has not reached `max_threads`, spawn a new worker; else the job
    /// waits in the queue for the next free worker.
    ///
    /// # Errors
    /// [`JobQueueError::ThreadSpawn`] if a new worker thread was needed and
    /// the OS refused to spawn it.
    pub fn add_job(&self, job: impl FnOnce(&mut S) + Send + 'static) -> Result<(), JobQueueError> {
        let mut state = self.shared.state.lock().expect("jobqueue mutex poisoned");
        state.jobs.push_back(Box::new(job));
        if state.idle > 0 {
            self.shared.wake_worker.notify_one();
            return Ok(());
        }
        if state.threads < self.shared.max_threads {
            let index = state.threads;
            state.threads += 1;
            let shared = Arc::clone(&self.shared);
            let handle = std::thread::Builder::new()
                .name(format!("jobqueue-worker-{index}"))
                .spawn(move || worker_loop(shared, index))
                .map_err(|source| JobQueueError::ThreadSpawn{index, source})?;
            state.handles.push(handle);
            debug!("Spawned jobqueue worker {index} ({} of {} max)", index + 1, self.shared.max_threads);
        }
        Ok(())
    }

    /// `noMoreJobs`: stop accepting new work and wake every idle worker so it
    /// can observe the closed queue and start terminating once drained.
    pub fn no_more_jobs(&self) {
        let mut state = self.shared.state.lock().expect("jobqueue mutex poisoned");
        state.accepting = false;
        self.shared.wake_worker.notify_all();
    }

    /// `waitOnJobs`: block until the job queue is empty and every spawned
    /// worker is idle (not running, not yet terminated).
    pub fn wait_on_jobs(&self) {
        let mut state = self.shared.state.lock().expect("jobqueue mutex poisoned");
        while !(state.jobs.is_empty() && state.idle == state.threads) {
            state = self.shared.wake_main.wait(state).expect("jobqueue mutex poisoned");
        }
    }

    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.shared.state.lock().expect("jobqueue mutex poisoned").threads
    }
}

impl<S> Drop for JobQueue<S> {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock().expect("jobqueue mutex poisoned");
            state.accepting = false;
            self.shared.wake_worker.notify_all();
        }
        let handles = std::mem::take(&mut self.shared.state.lock().expect("jobqueue mutex poisoned").handles);
        for handle in handles {
            let _ = handle.join();
        }
    }
}

fn worker_loop<S>(shared: Arc<Shared<S>>, index: usize) {
    // Per-thread state is owned locally and drops when this function
    // returns — Rust's destructor takes the place of the caller-supplied
    // teardown callback the contract otherwise calls for.
    let mut thread_state = (shared.factory)(index);
    let mut state = shared.state.lock().expect("jobqueue mutex poisoned");
    loop {
        if let Some(job) = state.jobs.pop_front() {
            drop(state);
            job(&mut thread_state);
            state = shared.state.lock().expect("jobqueue mutex poisoned");
            continue;
        }

        if !state.accepting {
            state.threads -= 1;
            shared.wake_main.notify_all();
            trace!("jobqueue worker {index} terminating, queue drained");
            return;
        }

        state.idle += 1;
        if state.jobs.is_empty() && state.idle == state.threads {
            shared.wake_main.notify_all();
        }
        state = shared.wake_worker.wait(state).expect("jobqueue mutex poisoned");
        state.idle -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn runs_every_submitted_job() {
        let pool: JobQueue<()> = JobQueue::new(4, |_| ());
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            pool.add_job(move |()| { counter.fetch_add(1, Ordering::SeqCst); }).unwrap();
        }
        pool.wait_on_jobs();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn never_spawns_more_than_max_threads() {
        let pool: JobQueue<()> = JobQueue::new(2, |_| ());
        for _ in 0..20 {
            pool.add_job(|()| std::thread::sleep(std::time::Duration::from_millis(1))).unwrap();
        }
        pool.wait_on_jobs();
        assert!(pool.thread_count() <= 2);
    }

    #[test]
    fn per_thread_state_is_isolated() {
        let pool: JobQueue<usize> = JobQueue::new(4, |index| index);
        let seen = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..8 {
            let seen = Arc::clone(&seen);
            pool.add_job(move |state: &mut usize| {
                seen.lock().unwrap().push(*state);
            }).unwrap();
        }
        pool.wait_on_jobs();
        // every recorded state came from a thread's own factory-assigned index,
        // and no job ever mutated it into something out of range.
        let seen = seen.lock().unwrap();
        assert!(seen.iter().all(|&s| s < 4));
    }

    #[test]
    fn wait_on_jobs_returns_immediately_when_nothing_was_submitted() {
        let pool: JobQueue<()> = JobQueue::new(4, |_| ());
        pool.wait_on_jobs();
    }

    #[test]
    fn no_more_jobs_lets_workers_drain_and_terminate() {
        let pool: JobQueue<()> = JobQueue::new(4, |_| ());
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..16 {
            let counter = Arc::clone(&counter);
            pool.add_job(move |()| { counter.fetch_add(1, Ordering::SeqCst); }).unwrap();
        }
        pool.no_more_jobs();
        drop(pool);
        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }
}
