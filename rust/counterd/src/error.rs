use std::fmt;
use std::io;

use sd_fdstore::FdStoreError;
use shm_primitives::RegionError;

/// Anything that stops the daemon other than the simulated crash.
#[derive(Debug)]
pub enum DaemonError {
    /// Creating or mapping the shared region failed.
    Region(RegionError),
    /// Talking to the supervisor failed.
    Supervisor(FdStoreError),
    /// Writing the dump failed.
    Io(io::Error),
}

impl fmt::Display for DaemonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonError::Region(err) => write!(f, "shared region: {err}"),
            DaemonError::Supervisor(err) => write!(f, "supervisor: {err}"),
            DaemonError::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for DaemonError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DaemonError::Region(err) => Some(err),
            DaemonError::Supervisor(err) => Some(err),
            DaemonError::Io(err) => Some(err),
        }
    }
}

impl From<RegionError> for DaemonError {
    fn from(value: RegionError) -> Self {
        DaemonError::Region(value)
    }
}

impl From<FdStoreError> for DaemonError {
    fn from(value: FdStoreError) -> Self {
        DaemonError::Supervisor(value)
    }
}

impl From<io::Error> for DaemonError {
    fn from(value: io::Error) -> Self {
        DaemonError::Io(value)
    }
}
