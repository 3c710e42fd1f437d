use std::fmt;
use std::io;

/// Errors raised while creating or attaching a shared region.
#[derive(Debug)]
pub enum RegionError {
    /// A region of zero bytes was requested.
    ZeroSize,
    /// An existing descriptor does not have the size this process expects.
    SizeMismatch { expected: usize, actual: u64 },
    Io(io::Error),
}

impl fmt::Display for RegionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionError::ZeroSize => write!(f, "region size must be > 0"),
            RegionError::SizeMismatch { expected, actual } => write!(
                f,
                "region size mismatch: expected {expected} bytes, descriptor has {actual}"
            ),
            RegionError::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for RegionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegionError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for RegionError {
    fn from(value: io::Error) -> Self {
        RegionError::Io(value)
    }
}
