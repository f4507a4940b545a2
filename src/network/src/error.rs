use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("segment '{0}' already has two children")]
    TooManyChildren(String),

    #[error("segment '{0}' already has two parents")]
    TooManyParents(String),

    #[error("segment '{0}' starts after its parent's start")]
    DateMismatch(String),

    #[error("the two parent chains of an admixture node diverge to different roots")]
    MultipleRoots,

    #[error("infeasible population network: {0}")]
    Infeasible(String),

    #[error("segment name '{0}' is declared more than once")]
    DuplicateSegment(String),

    #[error("sample label '{0}' is declared more than once")]
    DuplicateLabel(String),

    #[error("sample count exceeds the {0}-bit tipset width")]
    BitmaskOverflow(u32),

    #[error("unknown segment '{0}'")]
    UnknownSegment(String),

    #[error("unknown sample label '{0}'")]
    UnknownLabel(String),
}
