//! Run logging trait for structured send-engine events.
//!
//! The engine reports lifecycle and throughput events through a
//! `BlastLogger`, so tests can capture them and the binary can route them
//! to `tracing`.

use std::fmt;
use std::net::SocketAddr;

use crate::engine::BlastState;
use crate::transport::TransportKind;

/// Structured log entry for one engine event.
#[derive(Debug, Clone)]
pub struct BlastLog {
    pub component: &'static str,
    pub event: BlastEvent,
}

/// Events emitted during a run.
#[derive(Debug, Clone)]
pub enum BlastEvent {
    /// Frame size and rate chosen
    RunPlanned {
        payload_bytes: usize,
        frames_per_second: u32,
        threads: usize,
        total_frames: u64,
        total_mbps: f64,
        start_mjd: f64,
        start_time: String,
    },
    /// Inter-packet delay derived or configured
    PacingConfigured {
        delay_us: f64,
    },
    /// Transport session established
    SessionOpened {
        kind: TransportKind,
        dest: SocketAddr,
        send_buffer: Option<usize>,
    },
    /// State machine transition
    StateChanged {
        from: BlastState,
        to: BlastState,
    },
    /// Synthetic drop: the network call was skipped
    FrameDropped {
        call: u64,
        sequence: u64,
    },
    /// Periodic throughput over the last reporting interval
    Throughput {
        mbps: f64,
        seconds: f64,
        bytes: u64,
    },
    /// Run finished
    RunComplete {
        mbps: f64,
        seconds: f64,
        frames_sent: u64,
        frames_skipped: u64,
        sequence: u64,
    },
    /// Error occurred
    Error {
        message: String,
    },
}

impl fmt::Display for BlastEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunPlanned { payload_bytes, frames_per_second, threads, total_frames, total_mbps, start_mjd, start_time } => {
                write!(
                    f,
                    "run_planned frame={}B fps={} threads={} frames={} rate={:.1}Mbps mjd={:.4} ({})",
                    payload_bytes, frames_per_second, threads, total_frames, total_mbps, start_mjd, start_time
                )
            }
            Self::PacingConfigured { delay_us } => {
                write!(f, "pacing delay={:.1}us", delay_us)
            }
            Self::SessionOpened { kind, dest, send_buffer } => match send_buffer {
                Some(size) => write!(f, "session_opened {} dest={} sndbuf={}KB", kind, dest, size / 1024),
                None => write!(f, "session_opened {} dest={}", kind, dest),
            },
            Self::StateChanged { from, to } => {
                write!(f, "state {:?} -> {:?}", from, to)
            }
            Self::FrameDropped { call, sequence } => {
                write!(f, "frame_dropped call={} seq={}", call, sequence)
            }
            Self::Throughput { mbps, seconds, bytes } => {
                write!(f, "{:6.1} Mbps {:.1} sec {:5.1} MB", mbps, seconds, *bytes as f64 / 1e6)
            }
            Self::RunComplete { mbps, seconds, frames_sent, frames_skipped, sequence } => {
                write!(
                    f,
                    "run_complete rate={:.2}Mbps ({:.1} sec) frames={} dropped={} seq={}",
                    mbps, seconds, frames_sent, frames_skipped, sequence
                )
            }
            Self::Error { message } => {
                write!(f, "error: {}", message)
            }
        }
    }
}

/// Sink for engine events. Implementations can write to tracing, collect
/// for assertions, or discard.
pub trait BlastLogger: Send + Sync {
    fn log(&self, entry: BlastLog);
}

/// Logger that uses the `tracing` crate.
pub struct TracingLogger;

impl BlastLogger for TracingLogger {
    fn log(&self, entry: BlastLog) {
        // Per-frame drop notices are debug-only spam at real rates.
        match &entry.event {
            BlastEvent::FrameDropped { .. } => {
                tracing::debug!(component = entry.component, "{}", entry.event);
            }
            BlastEvent::Error { .. } => {
                tracing::error!(component = entry.component, "{}", entry.event);
            }
            _ => {
                tracing::info!(component = entry.component, "{}", entry.event);
            }
        }
    }
}

/// No-op logger that discards all log entries.
pub struct NullLogger;

impl BlastLogger for NullLogger {
    fn log(&self, _entry: BlastLog) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throughput_display() {
        let event = BlastEvent::Throughput {
            mbps: 256.04,
            seconds: 1.0,
            bytes: 32_000_000,
        };
        assert_eq!(event.to_string(), " 256.0 Mbps 1.0 sec  32.0 MB");
    }

    #[test]
    fn session_display_reports_buffer_in_kb() {
        let event = BlastEvent::SessionOpened {
            kind: TransportKind::Datagram,
            dest: "127.0.0.1:52100".parse().unwrap(),
            send_buffer: Some(2 * 1024 * 1024),
        };
        assert_eq!(event.to_string(), "session_opened udp dest=127.0.0.1:52100 sndbuf=2048KB");
    }

    #[test]
    fn run_planned_display() {
        let event = BlastEvent::RunPlanned {
            payload_bytes: 8000,
            frames_per_second: 1000,
            threads: 2,
            total_frames: 4000,
            total_mbps: 128.0,
            start_mjd: 60_000.5,
            start_time: "2023/056 12:00:00".into(),
        };
        assert_eq!(
            event.to_string(),
            "run_planned frame=8000B fps=1000 threads=2 frames=4000 rate=128.0Mbps mjd=60000.5000 (2023/056 12:00:00)"
        );
    }
}
