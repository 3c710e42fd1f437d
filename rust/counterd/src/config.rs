use std::time::Duration;

use clap::Parser;
use sd_fdstore::is_valid_fd_name;

/// Size of the shared region in bytes.
pub const REGION_SIZE: usize = 16;

/// Name the region is stored under unless told otherwise.
pub const DEFAULT_FD_NAME: &str = "memfd";

/// Debug name of freshly created memfds, as seen in `/proc/<pid>/fd`.
pub const MEMFD_DEBUG_NAME: &str = "counterd_memfd";

/// Status text sent along with `READY=1`.
pub const READY_STATUS: &str = "Running counter loop";

/// Exit status of the simulated crash.
pub const CRASH_EXIT_CODE: i32 = 1;

/// Diagnostic printed to stderr right before the simulated crash.
pub const CRASH_MESSAGE: &str = "Simulating crash!";

#[derive(Parser, Debug)]
#[command(name = "counterd")]
#[command(about = "Counter daemon whose memory survives restarts through the supervisor's fd store")]
pub struct Args {
    /// Name the region is stored under in the fd store
    #[arg(long, env = "COUNTERD_FD_NAME", default_value = DEFAULT_FD_NAME, value_parser = parse_fd_name)]
    pub fd_name: String,

    /// Delay between iterations, in milliseconds
    #[arg(long, env = "COUNTERD_INTERVAL_MS", default_value_t = 20)]
    pub interval_ms: u64,

    /// Crash with probability 1/N per iteration
    #[arg(
        long,
        env = "COUNTERD_CRASH_ONE_IN",
        default_value_t = 50,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub crash_one_in: u32,

    /// Seed for the random source (OS entropy when absent)
    #[arg(long, env = "COUNTERD_SEED")]
    pub seed: Option<u64>,

    /// Stop after this many iterations instead of running forever (test hook)
    #[arg(long, env = "COUNTERD_MAX_ITERATIONS", hide = true)]
    pub max_iterations: Option<u64>,
}

impl Args {
    pub fn config(&self) -> DaemonConfig {
        DaemonConfig {
            fd_name: self.fd_name.clone(),
            interval: Duration::from_millis(self.interval_ms),
            crash_one_in: self.crash_one_in,
            max_iterations: self.max_iterations,
        }
    }
}

fn parse_fd_name(raw: &str) -> Result<String, String> {
    if is_valid_fd_name(raw) {
        Ok(raw.to_owned())
    } else {
        Err("must be 1-255 printable ASCII characters without ':'".to_owned())
    }
}

/// What the daemon needs to know, independent of where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub fd_name: String,
    pub interval: Duration,
    /// Crash probability per iteration is `1 / crash_one_in`. Never zero.
    pub crash_one_in: u32,
    /// `None` runs until the simulated crash.
    pub max_iterations: Option<u64>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            fd_name: DEFAULT_FD_NAME.to_owned(),
            interval: Duration::from_millis(20),
            crash_one_in: 50,
            max_iterations: None,
        }
    }
}
