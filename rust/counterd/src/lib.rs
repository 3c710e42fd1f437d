//! A counter daemon whose memory outlives it.
//!
//! On startup `counterd` asks its supervisor for the region a previous
//! incarnation stored in the fd store. If there is none it creates a 16-byte
//! memfd and registers it. It then reports `READY=1` and loops forever:
//! print the bytes, increment a random one, and now and then crash on purpose
//! so the supervisor restarts it and the region gets picked up again.

pub mod acquire;
pub mod config;
mod daemon;
mod error;
pub mod liveness;

pub use acquire::{AcquiredRegion, RegionOrigin, acquire_region};
pub use config::{Args, DaemonConfig};
pub use daemon::Daemon;
pub use error::DaemonError;
pub use liveness::{Liveness, LoopOutcome, Step};
