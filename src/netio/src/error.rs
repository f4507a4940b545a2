use thiserror::Error;

use network::NetworkError;
use params::ParamError;

#[derive(Error, Debug)]
pub enum NetIoError {
    #[error("Failed to open population-description file {0}: {1}")]
    OpenFile(String, std::io::Error),

    #[error("line {0}: {1}")]
    MalformedLine(usize, String),

    #[error("line {0}: unknown declaration keyword '{1}'")]
    UnknownKeyword(usize, String),

    #[error("line {0}: unknown status '{1}' (expected fixed, free or constrained)")]
    UnknownStatus(usize, String),

    #[error("line {0}: unparsable numeric literal '{1}'")]
    BadNumber(usize, String),

    #[error("line {0}: reference to undeclared segment '{1}'")]
    UnknownSegment(usize, String),

    #[error("line {0}: reference to undeclared parameter '{1}'")]
    UnknownParameter(usize, String),

    #[error("line {0}: {1}")]
    #[allow(clippy::enum_variant_names)]
    ParamError(usize, #[source] ParamError),

    #[error("line {0}: {1}")]
    NetworkError(usize, #[source] NetworkError),

    #[error("no segments were declared in the population-description file")]
    EmptyNetwork,

    #[error("# SitePat header not found before the first data line (line {0})")]
    MissingSitePatHeader(usize),

    #[error("line {0}: unknown sample label '{1}'")]
    UnknownLabel(usize, String),

    #[error("line {0}: site-pattern line missing a frequency column")]
    MissingFrequency(usize),

    #[error("I/O error while writing {0}: {1}")]
    WriteFailed(String, std::io::Error),
}
