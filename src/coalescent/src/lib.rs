mod branch_table;
mod error;
mod gene_node;
mod kernel;

pub use branch_table::BranchTable;
pub use error::CoalescentError;
pub use gene_node::GeneNode;
pub use kernel::{simulate, tabulate};
