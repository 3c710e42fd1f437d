#![doc = include_str!("../README.md")]

mod error;
pub mod listen;
mod supervisor;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use error::FdStoreError;
pub use listen::ListenFds;
pub use sd_notify::NotifyState;
pub use supervisor::{FDNAME_MAX, Supervisor, SystemdSupervisor, is_valid_fd_name};
