use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Invalid slice or value format for --{arg}. [{err}]")]
    ParseArg{arg: String, err: String},

    #[error("The provided value must lie between {0} and {1}")]
    ParseRatio(f64, f64),

    #[error("{0} does not exist")]
    MissingFileEntity(String),

    #[error("{0} already exists. Use --overwrite to force.")]
    CannotOverwrite(String),
}
