use network::TipSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoalescentError {
    #[error("segment '{0}' has a non-finite end time that is not +infinity")]
    NonFiniteEnd(String),

    #[error("replicate finished with {0} lineage(s) remaining at the root; expected exactly 1")]
    IncompleteCoalescence(usize),

    #[error("cannot normalize an empty or zero-sum branch table")]
    EmptyBranchTable,

    #[error("site pattern {0} present in the observed table is missing from the estimated one")]
    MissingKey(TipSet),
}
