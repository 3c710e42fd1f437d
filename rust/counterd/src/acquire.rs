//! Getting hold of the shared region at startup.

use std::os::fd::{AsFd, AsRawFd};

use sd_fdstore::Supervisor;
use shm_primitives::MemfdRegion;

use crate::DaemonError;
use crate::config::{MEMFD_DEBUG_NAME, REGION_SIZE};

/// Where the region of this incarnation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionOrigin {
    /// Handed back by the supervisor; contents are those of the last incarnation.
    Reused,
    /// Created and registered by this incarnation; contents start zeroed.
    Created,
}

pub struct AcquiredRegion {
    pub region: MemfdRegion,
    pub origin: RegionOrigin,
}

/// Reuse the region stored as `name`, or create and register a new one.
///
/// Exactly one registration is sent when the region is created, none when it
/// is reused. A stored region that is not `REGION_SIZE` bytes is an error.
pub fn acquire_region<S>(supervisor: &mut S, name: &str) -> Result<AcquiredRegion, DaemonError>
where
    S: Supervisor + ?Sized,
{
    if let Some(fd) = supervisor.lookup_inherited(name) {
        let raw = fd.as_raw_fd();
        let region = MemfdRegion::from_fd(fd, REGION_SIZE)?;
        tracing::info!(fd = raw, name, "retrieved region from fd store");
        return Ok(AcquiredRegion {
            region,
            origin: RegionOrigin::Reused,
        });
    }

    let region = MemfdRegion::create(MEMFD_DEBUG_NAME, REGION_SIZE)?;
    tracing::info!(
        fd = region.as_fd().as_raw_fd(),
        name,
        "storing new region in fd store"
    );
    supervisor.register(name, region.as_fd())?;

    Ok(AcquiredRegion {
        region,
        origin: RegionOrigin::Created,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sd_fdstore::ListenFds;
    use sd_fdstore::testkit::InMemorySupervisor;
    use shm_primitives::RegionError;
    use std::os::fd::OwnedFd;

    #[test]
    fn first_start_creates_and_registers_once() {
        let mut supervisor = InMemorySupervisor::new();
        let acquired = acquire_region(&mut supervisor, "memfd").unwrap();

        assert_eq!(acquired.origin, RegionOrigin::Created);
        assert_eq!(acquired.region.len(), REGION_SIZE);
        assert_eq!(acquired.region.region().to_vec(), vec![0u8; REGION_SIZE]);
        assert_eq!(supervisor.registrations, vec!["memfd"]);
    }

    #[test]
    fn restart_reuses_without_registering() {
        let mut supervisor = InMemorySupervisor::new();
        let first = acquire_region(&mut supervisor, "memfd").unwrap();
        first.region.region().store(0, 41);
        first.region.region().store(15, 255);
        drop(first);

        let mut supervisor = supervisor.restart().unwrap();
        let second = acquire_region(&mut supervisor, "memfd").unwrap();

        assert_eq!(second.origin, RegionOrigin::Reused);
        assert_eq!(second.region.len(), REGION_SIZE);
        let bytes = second.region.region().to_vec();
        assert_eq!(bytes[0], 41);
        assert_eq!(bytes[15], 255);
        assert!(supervisor.registrations.is_empty());
        assert_eq!(supervisor.stored_names(), vec!["memfd"]);
    }

    #[test]
    fn other_names_are_not_reused() {
        let mut supervisor = InMemorySupervisor::new();
        acquire_region(&mut supervisor, "other").unwrap();

        let mut supervisor = supervisor.restart().unwrap();
        let acquired = acquire_region(&mut supervisor, "memfd").unwrap();
        assert_eq!(acquired.origin, RegionOrigin::Created);
        assert_eq!(supervisor.registrations, vec!["memfd"]);
    }

    #[test]
    fn wrong_sized_region_fails_fast() {
        let stray = MemfdRegion::create("stray", REGION_SIZE * 2).unwrap();
        let fd: OwnedFd = stray.as_fd().try_clone_to_owned().unwrap();
        let mut supervisor = sd_fdstore::SystemdSupervisor::new(
            ListenFds::from_entries(vec![(fd, "memfd".into())]),
            None,
        );

        match acquire_region(&mut supervisor, "memfd") {
            Err(DaemonError::Region(RegionError::SizeMismatch { expected, actual })) => {
                assert_eq!(expected, REGION_SIZE);
                assert_eq!(actual, (REGION_SIZE * 2) as u64);
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("wrong-sized region accepted"),
        }
    }
}
