//! Inter-packet pacing and throughput accounting.
//!
//! Pacing busy-spins on `Instant::now()` until the deadline; it never
//! sleeps, and holds one core for the duration of each wait.

use std::time::{Duration, Instant};

use crate::error::ConfigError;

/// Shortest allowed reporting interval.
pub const MIN_REPORT_INTERVAL: Duration = Duration::from_millis(250);

/// Spin until `deadline`, returning the time the spin ended.
#[inline]
pub fn spin_until(deadline: Instant) -> Instant {
    let mut now = Instant::now();
    while now < deadline {
        std::hint::spin_loop();
        now = Instant::now();
    }
    now
}

/// Delay between packets for a target rate.
///
/// `packets_per_second = target / 8 / (payload_bytes - header_bytes)`,
/// truncated to a whole number.
pub fn inter_packet_delay(
    target_mbps: f64,
    payload_bytes: usize,
    header_bytes: usize,
) -> Result<Duration, ConfigError> {
    let packet_bytes = payload_bytes.saturating_sub(header_bytes);
    let err = || ConfigError::PacingRate {
        mbps: target_mbps,
        packet_bytes,
    };
    if packet_bytes == 0 || !target_mbps.is_finite() || target_mbps <= 0.0 {
        return Err(err());
    }

    let packets_per_second = (target_mbps * 1e6 / 8.0 / packet_bytes as f64) as u64;
    if packets_per_second == 0 {
        return Err(err());
    }
    Ok(Duration::from_nanos(1_000_000_000 / packets_per_second))
}

/// Shared pacing and sequence state for one run.
#[derive(Debug)]
pub struct PacingState {
    sequence: u64,
    delay: Duration,
    last_send: Option<Instant>,
}

impl PacingState {
    /// `Duration::ZERO` disables pacing.
    pub fn new(delay: Duration) -> Self {
        Self {
            sequence: 0,
            delay,
            last_send: None,
        }
    }

    /// Current value of the datagram sequence envelope.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Advance the sequence after a full rotation of threads.
    pub fn bump_sequence(&mut self) {
        self.sequence += 1;
    }

    pub fn is_throttled(&self) -> bool {
        !self.delay.is_zero()
    }

    /// Block until one delay has passed since the previous paced send.
    pub fn pace(&mut self) {
        if !self.is_throttled() {
            return;
        }
        let now = match self.last_send {
            Some(last) => spin_until(last + self.delay),
            None => Instant::now(),
        };
        self.last_send = Some(now);
    }
}

/// Throughput over one reporting interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalReport {
    pub bytes: u64,
    pub elapsed: Duration,
}

impl IntervalReport {
    pub fn mbps(&self) -> f64 {
        mbps(self.bytes, self.elapsed)
    }
}

fn mbps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        bytes as f64 * 8.0 / secs / 1e6
    } else {
        0.0
    }
}

/// Cumulative byte counter with periodic interval reports.
#[derive(Debug)]
pub struct ThroughputMeter {
    interval: Duration,
    start: Instant,
    last_report: Instant,
    interval_bytes: u64,
    total_bytes: u64,
}

impl ThroughputMeter {
    /// `interval` is raised to `MIN_REPORT_INTERVAL` if shorter.
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval: interval.max(MIN_REPORT_INTERVAL),
            start: now,
            last_report: now,
            interval_bytes: 0,
            total_bytes: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Count `bytes` sent at `now`. Returns a report once per interval and
    /// folds the interval into the running total.
    pub fn record(&mut self, bytes: u64, now: Instant) -> Option<IntervalReport> {
        self.interval_bytes += bytes;

        let elapsed = now.saturating_duration_since(self.last_report);
        if elapsed <= self.interval {
            return None;
        }
        let report = IntervalReport {
            bytes: self.interval_bytes,
            elapsed,
        };
        self.total_bytes += self.interval_bytes;
        self.interval_bytes = 0;
        self.last_report = now;
        Some(report)
    }

    /// Flush the open interval into the total. Returns `(total_bytes,
    /// elapsed since start)`.
    pub fn drain(&mut self, now: Instant) -> (u64, Duration) {
        self.total_bytes += self.interval_bytes;
        self.interval_bytes = 0;
        (self.total_bytes, now.saturating_duration_since(self.start))
    }
}
