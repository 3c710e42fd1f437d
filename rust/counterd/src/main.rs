//! counterd: keeps 16 bytes alive across its own crashes.
//!
//! # Usage
//!
//! Run it as a systemd service with `FileDescriptorStoreMax=1` (or more) and
//! `Restart=always`:
//!
//! ```ini
//! [Service]
//! Type=notify
//! ExecStart=/usr/local/bin/counterd
//! FileDescriptorStoreMax=1
//! Restart=always
//! ```

use std::io;
use std::process::{self, ExitCode};

use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use counterd::config::{CRASH_EXIT_CODE, CRASH_MESSAGE};
use counterd::{Args, Daemon, DaemonError, LoopOutcome};
use sd_fdstore::SystemdSupervisor;

fn main() -> ExitCode {
    let args = Args::parse();

    // stdout carries the dump, so logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    match run(&args) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "counterd failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<ExitCode, DaemonError> {
    let config = args.config();
    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let supervisor = SystemdSupervisor::from_env()?;
    let mut daemon = Daemon::start(&config, supervisor, rng)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match daemon.run(&mut out)? {
        LoopOutcome::Crashed { iteration } => {
            tracing::debug!(iteration, "crash drawn");
            eprintln!("{CRASH_MESSAGE}");
            // no unmapping, no destructors
            process::exit(CRASH_EXIT_CODE);
        }
        LoopOutcome::Exhausted { iterations } => {
            tracing::info!(iterations, "iteration bound reached");
            Ok(ExitCode::SUCCESS)
        }
    }
}
