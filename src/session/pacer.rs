//! Fixed-period pacing for the network loop
//!
//! Each iteration gets a deadline on the monotonic clock. Finishing early
//! idles until the deadline; an overrun starts the next period immediately
//! with no catch-up burst.

use serde::{Deserialize, Serialize};
use std::thread;
use std::time::{Duration, Instant};

/// Below this remaining time the hybrid strategy stops sleeping and spins
const HYBRID_SPIN_WINDOW: Duration = Duration::from_millis(1);

/// How the loop idles until its deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacingStrategy {
    /// Busy-wait: tightest timing, one core at 100%
    Spin,
    /// Busy-wait that yields the core between checks
    Yield,
    /// Sleep for most of the gap, spin the last millisecond
    #[default]
    Hybrid,
}

/// Deadline-driven idler
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    period: Duration,
    strategy: PacingStrategy,
}

impl Pacer {
    pub fn new(period: Duration, strategy: PacingStrategy) -> Self {
        Self { period, strategy }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn strategy(&self) -> PacingStrategy {
        self.strategy
    }

    /// Deadline for an iteration starting at `start`
    pub fn deadline_from(&self, start: Instant) -> Instant {
        start + self.period
    }

    /// Idle until `deadline`. Returns false if the deadline had already
    /// passed (the iteration overran).
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let now = Instant::now();
        if now >= deadline {
            return false;
        }

        match self.strategy {
            PacingStrategy::Spin => {
                while Instant::now() < deadline {
                    std::hint::spin_loop();
                }
            }
            PacingStrategy::Yield => {
                while Instant::now() < deadline {
                    thread::yield_now();
                }
            }
            PacingStrategy::Hybrid => {
                let remaining = deadline - now;
                if remaining > HYBRID_SPIN_WINDOW * 2 {
                    thread::sleep(remaining - HYBRID_SPIN_WINDOW);
                }
                while Instant::now() < deadline {
                    std::hint::spin_loop();
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_strategy(strategy: PacingStrategy) {
        let pacer = Pacer::new(Duration::from_millis(5), strategy);
        let start = Instant::now();
        let deadline = pacer.deadline_from(start);

        assert!(pacer.wait_until(deadline));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(5));
        assert!(elapsed < Duration::from_millis(50));
    }

    #[test]
    fn test_spin_reaches_deadline() {
        check_strategy(PacingStrategy::Spin);
    }

    #[test]
    fn test_yield_reaches_deadline() {
        check_strategy(PacingStrategy::Yield);
    }

    #[test]
    fn test_hybrid_reaches_deadline() {
        check_strategy(PacingStrategy::Hybrid);
    }

    #[test]
    fn test_past_deadline_returns_immediately() {
        let pacer = Pacer::new(Duration::from_millis(5), PacingStrategy::Spin);
        let deadline = Instant::now();
        std::thread::sleep(Duration::from_millis(1));
        assert!(!pacer.wait_until(deadline));
    }
}
