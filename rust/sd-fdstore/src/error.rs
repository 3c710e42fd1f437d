use std::fmt;
use std::io;

/// Errors from talking to the supervisor.
#[derive(Debug)]
pub enum FdStoreError {
    /// A descriptor name the supervisor would refuse.
    InvalidFdName(String),
    /// The supervisor environment is malformed, or the notify socket failed.
    Io(io::Error),
}

impl fmt::Display for FdStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FdStoreError::InvalidFdName(name) => write!(f, "invalid fd name: {name:?}"),
            FdStoreError::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for FdStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FdStoreError::Io(err) => Some(err),
            FdStoreError::InvalidFdName(_) => None,
        }
    }
}

impl From<io::Error> for FdStoreError {
    fn from(value: io::Error) -> Self {
        FdStoreError::Io(value)
    }
}
