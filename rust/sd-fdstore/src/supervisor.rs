use std::env;
use std::ffi::OsString;
use std::os::fd::{BorrowedFd, OwnedFd};

use sd_notify::NotifyState;

use crate::FdStoreError;
use crate::listen::ListenFds;

/// Longest descriptor name systemd accepts.
pub const FDNAME_MAX: usize = 255;

/// Whether systemd would accept `name` as an `FDNAME=`.
pub fn is_valid_fd_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= FDNAME_MAX
        && name.bytes().all(|b| (0x20..0x7f).contains(&b) && b != b':')
}

/// A process manager that can hold descriptors for us across restarts.
///
/// Build one at startup and pass it to whatever needs it.
pub trait Supervisor {
    /// Take the descriptor a previous incarnation stored as `name`, if any.
    fn lookup_inherited(&mut self, name: &str) -> Option<OwnedFd>;

    /// Ask the supervisor to keep a duplicate of `fd` under `name`.
    fn register(&mut self, name: &str, fd: BorrowedFd<'_>) -> Result<(), FdStoreError>;

    /// Report readiness or status.
    fn notify(&mut self, states: &[NotifyState<'_>]) -> Result<(), FdStoreError>;
}

/// The systemd flavour: inherited descriptors come from `LISTEN_FDS`, and
/// messages go to `NOTIFY_SOCKET` through `sd-notify`.
///
/// Without a notify socket the process runs unsupervised: messages are
/// dropped and nothing survives a restart.
#[derive(Debug)]
pub struct SystemdSupervisor {
    inherited: ListenFds,
    notify_socket: Option<OsString>,
}

impl SystemdSupervisor {
    pub fn new(inherited: ListenFds, notify_socket: Option<OsString>) -> Self {
        Self {
            inherited,
            notify_socket,
        }
    }

    /// Adopt inherited descriptors and note where notifications go.
    pub fn from_env() -> Result<Self, FdStoreError> {
        let inherited = ListenFds::from_env()?;
        let notify_socket = env::var_os("NOTIFY_SOCKET");
        tracing::info!(
            inherited = ?inherited.names().collect::<Vec<_>>(),
            notify_socket = ?notify_socket,
            "supervisor environment"
        );
        Ok(Self::new(inherited, notify_socket))
    }

    /// Whether anyone is listening to our notifications.
    pub fn is_supervised(&self) -> bool {
        self.notify_socket.is_some()
    }
}

impl Supervisor for SystemdSupervisor {
    fn lookup_inherited(&mut self, name: &str) -> Option<OwnedFd> {
        self.inherited.take(name)
    }

    fn register(&mut self, name: &str, fd: BorrowedFd<'_>) -> Result<(), FdStoreError> {
        if !is_valid_fd_name(name) {
            return Err(FdStoreError::InvalidFdName(name.to_owned()));
        }
        if !self.is_supervised() {
            tracing::warn!(name, "no notify socket, descriptor will not survive a restart");
            return Ok(());
        }
        sd_notify::notify_with_fds(
            false,
            &[NotifyState::FdStore, NotifyState::FdName(name)],
            &[fd],
        )?;
        Ok(())
    }

    fn notify(&mut self, states: &[NotifyState<'_>]) -> Result<(), FdStoreError> {
        if !self.is_supervised() {
            tracing::debug!(
                states = ?states.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "no notify socket, dropping notification"
            );
            return Ok(());
        }
        sd_notify::notify(false, states)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::{AsFd, AsRawFd};

    #[test]
    fn fd_name_rules() {
        assert!(is_valid_fd_name("memfd"));
        assert!(is_valid_fd_name("with space"));
        assert!(is_valid_fd_name(&"x".repeat(FDNAME_MAX)));

        assert!(!is_valid_fd_name(""));
        assert!(!is_valid_fd_name("a:b"));
        assert!(!is_valid_fd_name("tab\there"));
        assert!(!is_valid_fd_name("caf\u{e9}"));
        assert!(!is_valid_fd_name(&"x".repeat(FDNAME_MAX + 1)));
    }

    #[test]
    fn lookup_takes_from_inherited_set() {
        let file = OwnedFd::from(tempfile::tempfile().unwrap());
        let raw = file.as_raw_fd();
        let mut supervisor =
            SystemdSupervisor::new(ListenFds::from_entries(vec![(file, "memfd".into())]), None);

        assert!(supervisor.lookup_inherited("other").is_none());
        assert_eq!(
            supervisor.lookup_inherited("memfd").map(|fd| fd.as_raw_fd()),
            Some(raw)
        );
        assert!(supervisor.lookup_inherited("memfd").is_none());
    }

    #[test]
    fn unsupervised_process_drops_messages() {
        let mut supervisor = SystemdSupervisor::new(ListenFds::empty(), None);
        assert!(!supervisor.is_supervised());

        let file = tempfile::tempfile().unwrap();
        supervisor.register("memfd", file.as_fd()).unwrap();
        supervisor.notify(&[NotifyState::Ready]).unwrap();
    }

    #[test]
    fn bad_fd_name_is_refused_before_sending() {
        let mut supervisor = SystemdSupervisor::new(ListenFds::empty(), None);
        let file = tempfile::tempfile().unwrap();

        assert!(matches!(
            supervisor.register("bad:name", file.as_fd()),
            Err(FdStoreError::InvalidFdName(name)) if name == "bad:name"
        ));
        assert!(matches!(
            supervisor.register("", file.as_fd()),
            Err(FdStoreError::InvalidFdName(_))
        ));
    }
}
