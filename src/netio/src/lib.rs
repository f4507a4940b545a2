mod error;
mod model;
mod sitepat;

pub use error::NetIoError;
pub use model::{read_model, write_model};
pub use sitepat::{format_site_patterns, read_site_patterns, write_site_patterns, write_site_patterns_to};
