use std::io::Write;

use rand::Rng;
use sd_fdstore::{NotifyState, Supervisor};
use shm_primitives::{MemfdRegion, Region};

use crate::DaemonError;
use crate::acquire::{AcquiredRegion, RegionOrigin, acquire_region};
use crate::config::{DaemonConfig, READY_STATUS};
use crate::liveness::{Liveness, LoopOutcome};

/// One incarnation of the counter daemon.
///
/// Holds the mapping for as long as it lives. On the crash path the caller
/// exits the process while the daemon is still alive, so nothing is unmapped.
pub struct Daemon<S, R> {
    supervisor: S,
    region: MemfdRegion,
    origin: RegionOrigin,
    liveness: Liveness<R>,
}

impl<S: Supervisor, R: Rng> Daemon<S, R> {
    /// Acquire the region, then tell the supervisor we are ready.
    pub fn start(config: &DaemonConfig, mut supervisor: S, rng: R) -> Result<Self, DaemonError> {
        let AcquiredRegion { region, origin } = acquire_region(&mut supervisor, &config.fd_name)?;

        supervisor.notify(&[
            NotifyState::Ready,
            NotifyState::Status(READY_STATUS),
        ])?;
        tracing::info!(?origin, fd_name = %config.fd_name, "ready");

        Ok(Self {
            supervisor,
            region,
            origin,
            liveness: Liveness::new(rng, config),
        })
    }

    /// Run the counter loop, dumping the region to `out` every iteration.
    pub fn run<W: Write>(&mut self, out: &mut W) -> Result<LoopOutcome, DaemonError> {
        Ok(self.liveness.run(self.region.region(), out)?)
    }

    pub fn region(&self) -> Region {
        self.region.region()
    }

    pub fn origin(&self) -> RegionOrigin {
        self.origin
    }

    pub fn supervisor(&self) -> &S {
        &self.supervisor
    }

    /// Tear down this incarnation, unmapping the region.
    pub fn into_supervisor(self) -> S {
        self.supervisor
    }
}
