//! Supervisor stand-ins for tests.
//!
//! - `NotifyListener` is the receiving end of the notification socket: point
//!   a process's `NOTIFY_SOCKET` at [`NotifyListener::addr`] and read back
//!   what it reports, descriptors included.
//! - `InMemorySupervisor` keeps the fd store inside the test process and can
//!   simulate a restart with [`InMemorySupervisor::restart`].

use std::io::{self, ErrorKind};
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixDatagram;
use std::path::Path;
use std::time::Duration;

use sd_notify::NotifyState;

use crate::FdStoreError;
use crate::listen::ListenFds;
use crate::supervisor::{Supervisor, is_valid_fd_name};

const MAX_PAYLOAD: usize = 4096;
const MAX_FDS: usize = 16;
const RECV_TIMEOUT: Duration = Duration::from_secs(10);

/// One notification as the supervisor would see it.
#[derive(Debug)]
pub struct ReceivedNotification {
    pub payload: String,
    pub fds: Vec<OwnedFd>,
}

impl ReceivedNotification {
    /// The `KEY=value` lines of the payload.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.payload.lines().filter(|line| !line.is_empty())
    }

    /// Whether the payload contains `wanted`.
    pub fn has(&self, wanted: &NotifyState<'_>) -> bool {
        let wanted = wanted.to_string();
        self.lines().any(|line| line == wanted)
    }
}

/// A bound notification socket.
pub struct NotifyListener {
    socket: UnixDatagram,
    addr: String,
}

impl NotifyListener {
    /// Bind a socket at `path`.
    pub fn bind(path: &Path) -> io::Result<Self> {
        let addr = path
            .to_str()
            .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "socket path is not UTF-8"))?
            .to_owned();
        let socket = UnixDatagram::bind(path)?;
        socket.set_read_timeout(Some(RECV_TIMEOUT))?;
        Ok(Self { socket, addr })
    }

    /// The value to put in `NOTIFY_SOCKET`.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Wait for the next notification.
    pub fn recv(&self) -> io::Result<ReceivedNotification> {
        recv_with_fds(self.socket.as_raw_fd(), 0)
    }

    /// Take the next notification if one is already queued.
    pub fn try_recv(&self) -> io::Result<Option<ReceivedNotification>> {
        match recv_with_fds(self.socket.as_raw_fd(), libc::MSG_DONTWAIT) {
            Ok(msg) => Ok(Some(msg)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Take every notification already queued.
    pub fn drain(&self) -> io::Result<Vec<ReceivedNotification>> {
        let mut out = Vec::new();
        while let Some(msg) = self.try_recv()? {
            out.push(msg);
        }
        Ok(out)
    }
}

/// Receive one datagram and every descriptor attached to it.
fn recv_with_fds(sock_fd: RawFd, flags: libc::c_int) -> io::Result<ReceivedNotification> {
    let mut payload = vec![0u8; MAX_PAYLOAD];
    let mut iov = libc::iovec {
        iov_base: payload.as_mut_ptr().cast(),
        iov_len: payload.len(),
    };

    let data_len = MAX_FDS * std::mem::size_of::<RawFd>();
    let cmsg_space = unsafe { libc::CMSG_SPACE(data_len as u32) as usize };
    let mut control = vec![0u8; cmsg_space];

    let mut msghdr: libc::msghdr = unsafe { std::mem::zeroed() };
    msghdr.msg_iov = &mut iov;
    msghdr.msg_iovlen = 1;
    msghdr.msg_control = control.as_mut_ptr().cast();
    msghdr.msg_controllen = control.len() as _;

    let n = unsafe { libc::recvmsg(sock_fd, &mut msghdr, flags | libc::MSG_CMSG_CLOEXEC) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }

    let mut fds = Vec::new();
    unsafe {
        let mut cmsg = libc::CMSG_FIRSTHDR(&msghdr);
        while !cmsg.is_null() {
            if (*cmsg).cmsg_level == libc::SOL_SOCKET && (*cmsg).cmsg_type == libc::SCM_RIGHTS {
                let cmsg_len = (*cmsg).cmsg_len as usize;
                let base_len = libc::CMSG_LEN(0) as usize;
                let count = cmsg_len.saturating_sub(base_len) / std::mem::size_of::<RawFd>();
                let data_ptr = libc::CMSG_DATA(cmsg).cast::<RawFd>();
                for i in 0..count {
                    let raw = data_ptr.add(i).read_unaligned();
                    fds.push(OwnedFd::from_raw_fd(raw));
                }
            }
            cmsg = libc::CMSG_NXTHDR(&msghdr, cmsg);
        }
    }

    if (msghdr.msg_flags & (libc::MSG_CTRUNC | libc::MSG_TRUNC)) != 0 {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            "notification truncated",
        ));
    }

    payload.truncate(n as usize);
    let payload = String::from_utf8(payload)
        .map_err(|_| io::Error::new(ErrorKind::InvalidData, "notification is not UTF-8"))?;
    Ok(ReceivedNotification { payload, fds })
}

/// An fd store that lives in the test process.
///
/// Registrations keep a duplicate of the descriptor, the way a real
/// supervisor would, and every message is recorded.
#[derive(Debug, Default)]
pub struct InMemorySupervisor {
    inherited: ListenFds,
    stored: Vec<(OwnedFd, String)>,
    /// Names passed to `register`, in order, for this incarnation.
    pub registrations: Vec<String>,
    /// Messages sent this incarnation, in order, one `KEY=value` line per state.
    pub notifications: Vec<Vec<String>>,
}

impl InMemorySupervisor {
    /// A supervisor with an empty store: the first start of a service.
    pub fn new() -> Self {
        Self::default()
    }

    /// End this incarnation and start the next one.
    ///
    /// The store carries over; the new incarnation inherits a duplicate of
    /// every stored descriptor. Per-incarnation records start empty.
    pub fn restart(self) -> io::Result<Self> {
        let inherited = self
            .stored
            .iter()
            .map(|(fd, name)| Ok((fd.try_clone()?, name.clone())))
            .collect::<io::Result<Vec<_>>>()?;

        Ok(Self {
            inherited: ListenFds::from_entries(inherited),
            stored: self.stored,
            registrations: Vec::new(),
            notifications: Vec::new(),
        })
    }

    /// Names of the descriptors in the store.
    pub fn stored_names(&self) -> Vec<&str> {
        self.stored.iter().map(|(_, name)| name.as_str()).collect()
    }

    /// Whether any message of this incarnation contained `wanted`.
    pub fn was_notified(&self, wanted: &NotifyState<'_>) -> bool {
        let wanted = wanted.to_string();
        self.notifications.iter().any(|msg| msg.contains(&wanted))
    }
}

impl Supervisor for InMemorySupervisor {
    fn lookup_inherited(&mut self, name: &str) -> Option<OwnedFd> {
        self.inherited.take(name)
    }

    fn register(&mut self, name: &str, fd: BorrowedFd<'_>) -> Result<(), FdStoreError> {
        if !is_valid_fd_name(name) {
            return Err(FdStoreError::InvalidFdName(name.to_owned()));
        }
        self.stored.push((fd.try_clone_to_owned()?, name.to_owned()));
        self.registrations.push(name.to_owned());
        self.notifications
            .push(render(&[NotifyState::FdStore, NotifyState::FdName(name)]));
        Ok(())
    }

    fn notify(&mut self, states: &[NotifyState<'_>]) -> Result<(), FdStoreError> {
        self.notifications.push(render(states));
        Ok(())
    }
}

fn render(states: &[NotifyState<'_>]) -> Vec<String> {
    states.iter().map(ToString::to_string).collect()
}
