//! Descriptors inherited from the supervisor at startup.
//!
//! The supervisor passes stored descriptors as consecutive fds starting at 3
//! and describes them in `LISTEN_PID`, `LISTEN_FDS` and `LISTEN_FDNAMES`.
//! `sd_notify::listen_fds_with_names` reads that description and marks the
//! descriptors close-on-exec; this module takes ownership of them.

use std::os::fd::{FromRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::FdStoreError;

static ADOPTED: AtomicBool = AtomicBool::new(false);

/// Inherited descriptors, owned by this process, with their names.
///
/// Descriptors nobody claims with [`ListenFds::take`] are closed on drop.
#[derive(Debug, Default)]
pub struct ListenFds {
    entries: Vec<(OwnedFd, String)>,
}

impl ListenFds {
    /// An empty set: nothing was inherited.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a set from descriptors already owned by the caller.
    pub fn from_entries(entries: Vec<(OwnedFd, String)>) -> Self {
        Self { entries }
    }

    /// Take ownership of the descriptors the environment describes.
    ///
    /// A malformed `LISTEN_PID` or `LISTEN_FDS`, or a described descriptor
    /// that is not open, is an error. Only the first call in a process adopts
    /// anything; later calls return an empty set, since the numbers may have
    /// been reused by then.
    pub fn from_env() -> Result<Self, FdStoreError> {
        if ADOPTED.swap(true, Ordering::SeqCst) {
            tracing::warn!("inherited descriptors were already adopted, ignoring LISTEN_FDS");
            return Ok(Self::empty());
        }

        let mut entries = Vec::new();
        for (raw, name) in sd_notify::listen_fds_with_names(false)? {
            tracing::debug!(fd = raw, name = %name, "adopted inherited descriptor");
            // SAFETY: the supervisor handed these numbers to this pid, and the
            // ADOPTED guard makes sure they are wrapped exactly once.
            entries.push((unsafe { OwnedFd::from_raw_fd(raw) }, name));
        }
        Ok(Self { entries })
    }

    /// Remove and return the first descriptor named `name`.
    pub fn take(&mut self, name: &str) -> Option<OwnedFd> {
        let position = self.entries.iter().position(|(_, n)| n == name)?;
        Some(self.entries.remove(position).0)
    }

    /// Names of the descriptors still held, in inheritance order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, name)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsRawFd;

    #[test]
    fn take_claims_first_match_once() {
        let a = OwnedFd::from(tempfile::tempfile().unwrap());
        let b = OwnedFd::from(tempfile::tempfile().unwrap());
        let a_raw = a.as_raw_fd();
        let b_raw = b.as_raw_fd();

        let mut fds = ListenFds::from_entries(vec![(a, "memfd".into()), (b, "memfd".into())]);
        assert_eq!(fds.len(), 2);

        assert_eq!(fds.take("memfd").map(|fd| fd.as_raw_fd()), Some(a_raw));
        assert_eq!(fds.names().collect::<Vec<_>>(), vec!["memfd"]);
        assert_eq!(fds.take("memfd").map(|fd| fd.as_raw_fd()), Some(b_raw));
        assert!(fds.take("memfd").is_none());
        assert!(fds.is_empty());
    }

    #[test]
    fn other_names_stay_in_the_set() {
        let a = OwnedFd::from(tempfile::tempfile().unwrap());
        let b = OwnedFd::from(tempfile::tempfile().unwrap());
        let mut fds = ListenFds::from_entries(vec![(a, "sock".into()), (b, "memfd".into())]);

        assert!(fds.take("memfd").is_some());
        assert_eq!(fds.names().collect::<Vec<_>>(), vec!["sock"]);
    }

    #[test]
    fn empty_set_has_nothing_to_take() {
        let mut fds = ListenFds::empty();
        assert!(fds.take("memfd").is_none());
    }
}
