use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobQueueError {
    #[error("failed to spawn worker thread #{index}: {source}")]
    ThreadSpawn{index: usize, #[source] source: std::io::Error},
}
