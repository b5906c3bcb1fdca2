use std::{error::Error, fmt, io};

use machine_learning::MlErr;

/// The server's result type.
pub type Result<T> = std::result::Result<T, ServerErr>;

/// Inference server failures. All of them end the server.
#[derive(Debug)]
pub enum ServerErr {
    Io(io::Error),
    Ml(MlErr),
    /// The network's output is not a probability vector.
    BadOutput(String),
}

impl fmt::Display for ServerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerErr::Io(e) => write!(f, "io error: {e}"),
            ServerErr::Ml(e) => write!(f, "{e}"),
            ServerErr::BadOutput(msg) => write!(f, "bad network output: {msg}"),
        }
    }
}

impl Error for ServerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ServerErr::Io(e) => Some(e),
            ServerErr::Ml(e) => Some(e),
            ServerErr::BadOutput(_) => None,
        }
    }
}

impl From<io::Error> for ServerErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<MlErr> for ServerErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<ServerErr> for io::Error {
    fn from(value: ServerErr) -> Self {
        match value {
            ServerErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
