//! Session counters and the latency reporter
//!
//! Latency is `receive time - send timestamp` on unsynchronized clocks. It
//! moves with real delay changes but its absolute value means nothing, so it
//! is only ever shown as a trend.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::Mode;
use crate::session::{SessionShared, SessionState};

/// Hot-path event counters, bumped with relaxed atomics
#[derive(Debug, Default)]
pub struct Counters {
    pub frames_captured: AtomicU64,
    pub encode_failures: AtomicU64,
    pub packets_sent: AtomicU64,
    pub send_failures: AtomicU64,
    pub packets_received: AtomicU64,
    pub malformed_packets: AtomicU64,
    pub decode_failures: AtomicU64,
    /// One per destination a relayed packet was written to
    pub packets_relayed: AtomicU64,
    pub loop_overruns: AtomicU64,
}

impl Counters {
    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn read(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Average over one reporting period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyReport {
    pub average_us: u64,
    pub packets: u64,
}

/// Running (sum, count) latency accumulator
#[derive(Debug, Default)]
pub struct LatencyStats {
    total_us: AtomicU64,
    packets: AtomicU64,
    last_report: Mutex<Option<LatencyReport>>,
}

impl LatencyStats {
    pub fn record(&self, latency_us: u64) {
        self.total_us.fetch_add(latency_us, Ordering::Relaxed);
        self.packets.fetch_add(1, Ordering::Relaxed);
    }

    /// Read and zero the accumulator. A sample recorded between the two
    /// swaps can land in the wrong period; acceptable for a display value.
    pub fn take(&self) -> Option<LatencyReport> {
        let packets = self.packets.swap(0, Ordering::AcqRel);
        let total = self.total_us.swap(0, Ordering::AcqRel);
        if packets == 0 {
            return None;
        }

        let report = LatencyReport {
            average_us: total / packets,
            packets,
        };
        *self.last_report.lock() = Some(report);
        Some(report)
    }

    /// Most recent report produced by [`LatencyStats::take`]
    pub fn last_report(&self) -> Option<LatencyReport> {
        *self.last_report.lock()
    }
}

/// Point-in-time view of a session
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub mode: Mode,
    pub state: SessionState,
    pub frames_captured: u64,
    pub encode_failures: u64,
    pub packets_sent: u64,
    pub send_failures: u64,
    pub packets_received: u64,
    pub malformed_packets: u64,
    pub decode_failures: u64,
    pub packets_relayed: u64,
    pub loop_overruns: u64,
    pub outbound_depth: usize,
    pub outbound_dropped: u64,
    pub inbound_depth: usize,
    pub inbound_dropped: u64,
    pub playback_underruns: u64,
    pub peers: usize,
    pub last_latency: Option<LatencyReport>,
}

impl SessionStats {
    pub(crate) fn collect(mode: Mode, state: SessionState, shared: &SessionShared) -> Self {
        let counters = &shared.counters;
        let queues = &shared.queues;
        Self {
            mode,
            state,
            frames_captured: Counters::read(&counters.frames_captured),
            encode_failures: Counters::read(&counters.encode_failures),
            packets_sent: Counters::read(&counters.packets_sent),
            send_failures: Counters::read(&counters.send_failures),
            packets_received: Counters::read(&counters.packets_received),
            malformed_packets: Counters::read(&counters.malformed_packets),
            decode_failures: Counters::read(&counters.decode_failures),
            packets_relayed: Counters::read(&counters.packets_relayed),
            loop_overruns: Counters::read(&counters.loop_overruns),
            outbound_depth: queues.outbound.len(),
            outbound_dropped: queues.outbound.overflow_count(),
            inbound_depth: queues.inbound.len(),
            inbound_dropped: queues.inbound.overflow_count(),
            playback_underruns: queues.inbound.underrun_count(),
            peers: shared.peer_count.load(Ordering::Relaxed),
            last_latency: shared.latency.last_report(),
        }
    }
}

/// Client-side reporter: every `period`, log and reset the latency
/// accumulator. Checks the running flag every 50 ms so shutdown is prompt.
pub(crate) fn run_reporter(shared: Arc<SessionShared>, period: Duration) {
    let slice = period.min(Duration::from_millis(50));
    let mut next_report = Instant::now() + period;

    tracing::debug!(period_ms = period.as_millis() as u64, "Latency reporter started");

    while shared.running.load(Ordering::Acquire) {
        thread::sleep(slice);
        let now = Instant::now();
        if now < next_report {
            continue;
        }
        next_report = now + period;

        if let Some(report) = shared.latency.take() {
            tracing::info!(
                latency_ms = report.average_us as f64 / 1000.0,
                packets = report.packets,
                jitter_buffer = shared.queues.inbound.len(),
                "Latency trend"
            );
        }
    }

    tracing::debug!("Latency reporter stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_average_and_reset() {
        let stats = LatencyStats::default();
        assert!(stats.take().is_none());

        stats.record(1000);
        stats.record(3000);
        let report = stats.take().unwrap();
        assert_eq!(report.average_us, 2000);
        assert_eq!(report.packets, 2);

        assert!(stats.take().is_none());
        assert_eq!(stats.last_report(), Some(report));
    }

    #[test]
    fn test_concurrent_records() {
        let stats = Arc::new(LatencyStats::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let stats = stats.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.record(10);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let report = stats.take().unwrap();
        assert_eq!(report.packets, 4000);
        assert_eq!(report.average_us, 10);
    }
}
