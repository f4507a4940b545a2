mod dag;
mod error;
mod label;
mod tipset;

pub use dag::{PopulationDag, SegHandle, Segment};
pub use error::NetworkError;
pub use label::LabelIndex;
pub use tipset::{TipSet, BITMASK_WIDTH};
