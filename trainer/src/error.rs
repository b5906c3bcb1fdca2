use std::{error::Error, fmt, io};

use machine_learning::MlErr;

use crate::metrics::Phase;

/// The trainer's result type.
pub type Result<T> = std::result::Result<T, TrainErr>;

/// Training run failures. All of them end the run.
#[derive(Debug)]
pub enum TrainErr {
    Io(io::Error),
    Ml(MlErr),
    /// A malformed or inconsistent startup argument, with the key path at fault.
    Config(String),
    UnknownVariant {
        what: &'static str,
        got: String,
    },
    MissingLoss {
        key: String,
        phase: Phase,
    },
    EmptyEpoch {
        phase: Phase,
    },
}

impl fmt::Display for TrainErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainErr::Io(e) => write!(f, "io error: {e}"),
            TrainErr::Ml(e) => write!(f, "{e}"),
            TrainErr::Config(msg) => write!(f, "bad configuration: {msg}"),
            TrainErr::UnknownVariant { what, got } => write!(f, "unknown {what} {got:?}"),
            TrainErr::MissingLoss { key, phase } => {
                write!(f, "{phase} losses lack the {key:?} key")
            }
            TrainErr::EmptyEpoch { phase } => write!(f, "the {phase} epoch had no batches"),
        }
    }
}

impl Error for TrainErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TrainErr::Io(e) => Some(e),
            TrainErr::Ml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TrainErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<MlErr> for TrainErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<TrainErr> for io::Error {
    fn from(value: TrainErr) -> Self {
        match value {
            TrainErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
