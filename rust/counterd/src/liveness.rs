//! The counter loop: dump, bump one byte, maybe crash, sleep.

use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use rand::Rng;
use shm_primitives::Region;

use crate::config::DaemonConfig;

/// What one iteration decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// The dice came up: time to fall over.
    Crash,
}

/// How a bounded or unbounded run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The crash was drawn on iteration `iteration` (1-based), after its write.
    Crashed { iteration: u64 },
    /// The iteration bound was reached without a crash.
    Exhausted { iterations: u64 },
}

/// Drives the loop with an injected random source.
pub struct Liveness<R> {
    rng: R,
    crash_one_in: u32,
    interval: Duration,
    max_iterations: Option<u64>,
}

impl<R: Rng> Liveness<R> {
    pub fn new(rng: R, config: &DaemonConfig) -> Self {
        Self {
            rng,
            crash_one_in: config.crash_one_in.max(1),
            interval: config.interval,
            max_iterations: config.max_iterations,
        }
    }

    /// One iteration without the sleep.
    ///
    /// Writes the region as a list to `out`, increments one uniformly chosen
    /// byte (wrapping), then draws the crash.
    pub fn step<W: Write>(&mut self, region: Region, out: &mut W) -> io::Result<Step> {
        writeln!(out, "{:?}", region.to_vec())?;

        let index = self.rng.random_range(0..region.len());
        let value = region.wrapping_increment(index);
        tracing::trace!(index, value, "incremented byte");

        if self.rng.random_range(0..self.crash_one_in) == 0 {
            Ok(Step::Crash)
        } else {
            Ok(Step::Continue)
        }
    }

    /// Iterate until the crash is drawn or the bound, if any, is reached.
    pub fn run<W: Write>(&mut self, region: Region, out: &mut W) -> io::Result<LoopOutcome> {
        let mut iteration = 0;
        loop {
            if self.max_iterations.is_some_and(|max| iteration >= max) {
                return Ok(LoopOutcome::Exhausted {
                    iterations: iteration,
                });
            }
            iteration += 1;

            if self.step(region, out)? == Step::Crash {
                return Ok(LoopOutcome::Crashed { iteration });
            }

            if !self.interval.is_zero() {
                thread::sleep(self.interval);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::REGION_SIZE;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use shm_primitives::HeapRegion;

    fn config(crash_one_in: u32, max_iterations: Option<u64>) -> DaemonConfig {
        DaemonConfig {
            interval: Duration::ZERO,
            crash_one_in,
            max_iterations,
            ..DaemonConfig::default()
        }
    }

    fn sum(bytes: &[u8]) -> u32 {
        bytes.iter().map(|&b| b as u32).sum()
    }

    #[test]
    fn step_prints_then_bumps_one_byte() {
        let heap = HeapRegion::new_zeroed(REGION_SIZE);
        let mut liveness = Liveness::new(StdRng::seed_from_u64(1), &config(u32::MAX, None));
        let mut out = Vec::new();

        liveness.step(heap.region(), &mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]\n"
        );
        let after = heap.region().to_vec();
        assert_eq!(sum(&after), 1);
        assert_eq!(after.iter().filter(|&&b| b == 1).count(), 1);
    }

    #[test]
    fn each_step_adds_one_modulo_256() {
        let heap = HeapRegion::new_zeroed(REGION_SIZE);
        let region = heap.region();
        for off in 0..REGION_SIZE {
            region.store(off, 250);
        }

        let mut liveness = Liveness::new(StdRng::seed_from_u64(7), &config(u32::MAX, None));
        let mut before = region.to_vec();
        for _ in 0..500 {
            liveness.step(region, &mut io::sink()).unwrap();
            let after = region.to_vec();

            let changed: Vec<usize> = (0..REGION_SIZE).filter(|&i| before[i] != after[i]).collect();
            assert_eq!(changed.len(), 1);
            let i = changed[0];
            assert_eq!(after[i], before[i].wrapping_add(1));
            assert_eq!(sum(&after) % 256, (sum(&before) + 1) % 256);

            before = after;
        }
    }

    #[test]
    fn byte_255_wraps_to_zero() {
        let heap = HeapRegion::new_zeroed(1);
        heap.region().store(0, 255);

        let mut liveness = Liveness::new(StdRng::seed_from_u64(3), &config(u32::MAX, None));
        liveness.step(heap.region(), &mut io::sink()).unwrap();
        assert_eq!(heap.region().load(0), 0);
    }

    #[test]
    fn crash_rate_converges_to_one_in_fifty() {
        let heap = HeapRegion::new_zeroed(REGION_SIZE);
        let mut liveness = Liveness::new(StdRng::seed_from_u64(0xC0FFEE), &config(50, None));

        const N: u32 = 200_000;
        let crashes = (0..N)
            .filter(|_| liveness.step(heap.region(), &mut io::sink()).unwrap() == Step::Crash)
            .count() as f64;

        let rate = crashes / N as f64;
        assert!((rate - 0.02).abs() < 0.002, "crash rate {rate}");
    }

    #[test]
    fn crash_one_in_one_always_crashes() {
        let heap = HeapRegion::new_zeroed(REGION_SIZE);
        let mut liveness = Liveness::new(StdRng::seed_from_u64(5), &config(1, None));
        let mut out = Vec::new();

        let outcome = liveness.run(heap.region(), &mut out).unwrap();
        assert_eq!(outcome, LoopOutcome::Crashed { iteration: 1 });
        // the write of the crashing iteration has landed
        assert_eq!(sum(&heap.region().to_vec()), 1);
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 1);
    }

    #[test]
    fn bounded_run_stops_after_max_iterations() {
        let heap = HeapRegion::new_zeroed(REGION_SIZE);
        let mut liveness = Liveness::new(StdRng::seed_from_u64(11), &config(u32::MAX, Some(25)));
        let mut out = Vec::new();

        let outcome = liveness.run(heap.region(), &mut out).unwrap();
        assert_eq!(outcome, LoopOutcome::Exhausted { iterations: 25 });
        assert_eq!(sum(&heap.region().to_vec()), 25);
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 25);
    }

    #[test]
    fn same_seed_same_run() {
        let a = HeapRegion::new_zeroed(REGION_SIZE);
        let b = HeapRegion::new_zeroed(REGION_SIZE);
        let cfg = config(10, Some(200));

        let outcome_a = Liveness::new(StdRng::seed_from_u64(42), &cfg)
            .run(a.region(), &mut io::sink())
            .unwrap();
        let outcome_b = Liveness::new(StdRng::seed_from_u64(42), &cfg)
            .run(b.region(), &mut io::sink())
            .unwrap();

        assert_eq!(outcome_a, outcome_b);
        assert_eq!(a.region().to_vec(), b.region().to_vec());
    }
}
