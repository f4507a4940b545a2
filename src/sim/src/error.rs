use thiserror::Error;

use coalescent::CoalescentError;
use jobqueue::JobQueueError;

#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Coalescent(#[from] CoalescentError),

    #[error(transparent)]
    JobQueue(#[from] JobQueueError),
}
