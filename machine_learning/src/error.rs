use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use ndarray::ShapeError;
use safetensors::SafeTensorError;

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    Io(io::Error),
    Json(serde_json::Error),
    Checkpoint(SafeTensorError),
    Shape(ShapeError),
    ShapeMismatch {
        what: String,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    MissingParam(String),
    MissingInput {
        got: usize,
        expected: usize,
    },
    UnknownOp {
        what: &'static str,
        got: String,
    },
    InvalidSpec(String),
    Dataset(String),
    NoTrace,
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::Io(e) => write!(f, "io error: {e}"),
            MlErr::Json(e) => write!(f, "json error: {e}"),
            MlErr::Checkpoint(e) => write!(f, "checkpoint error: {e}"),
            MlErr::Shape(e) => write!(f, "shape error: {e}"),
            MlErr::ShapeMismatch { what, got, expected } => {
                write!(f, "shape mismatch for {what}: got {got:?}, expected {expected:?}")
            }
            MlErr::MissingParam(name) => write!(f, "missing parameter {name}"),
            MlErr::MissingInput { got, expected } => {
                write!(f, "the batch has {got} tensors, expected at least {expected}")
            }
            MlErr::UnknownOp { what, got } => write!(f, "unknown {what} op {got:?}"),
            MlErr::InvalidSpec(msg) => write!(f, "invalid spec: {msg}"),
            MlErr::Dataset(msg) => write!(f, "dataset error: {msg}"),
            MlErr::NoTrace => write!(f, "backward pass without a preceding loss pass"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Io(e) => Some(e),
            MlErr::Json(e) => Some(e),
            MlErr::Checkpoint(e) => Some(e),
            MlErr::Shape(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for MlErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for MlErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<SafeTensorError> for MlErr {
    fn from(value: SafeTensorError) -> Self {
        Self::Checkpoint(value)
    }
}

impl From<ShapeError> for MlErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<MlErr> for io::Error {
    fn from(value: MlErr) -> Self {
        match value {
            MlErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
