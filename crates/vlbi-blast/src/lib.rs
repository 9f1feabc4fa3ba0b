//! VLBI Blast: paced VDIF/CODIF frame sender.
//!
//! Provides:
//! - Round-robin per-thread header advancement with a shared frame rate
//! - Stream (TCP) transport with partial-write retry
//! - Datagram (UDP) transport with scatter/gather sends, an optional 8-byte
//!   sequence envelope and synthetic drop injection
//! - Busy-spin inter-packet pacing for sub-millisecond precision
//! - Periodic throughput reporting through a pluggable logger

pub mod engine;
pub mod error;
pub mod logging;
pub mod pacer;
pub mod transport;

// Re-export key types for convenience.
pub use engine::{
    BlastConfig, BlastPlan, BlastSession, BlastState, BlastSummary, Destination, MAX_THREADS,
    Pacing, TransportMode, run_blast,
};
pub use error::{BlastError, ConfigError, TransportError};
pub use logging::{BlastEvent, BlastLog, BlastLogger, NullLogger, TracingLogger};
pub use pacer::{IntervalReport, MIN_REPORT_INTERVAL, PacingState, ThroughputMeter, inter_packet_delay, spin_until};
pub use transport::{
    DatagramTransport, DropController, FrameTransport, SendOutcome, StreamTransport, TransportKind,
    open_datagram, open_stream, resolve,
};
