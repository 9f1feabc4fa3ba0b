//! VDIF / CODIF frame generation.
//!
//! Provides:
//! - Per-thread frame headers for both formats, with epoch / second stamping
//!   and frame-within-second advancement
//! - Header encoding to and decoding from the wire layout
//! - A frame-size solver that yields an integral frame rate for a bit rate
//! - The deterministic sentinel + counter payload pattern

pub mod error;
pub mod header;
pub mod payload;
pub mod rate;

pub use error::{HeaderError, SolveError};
pub use header::{
    CODIF_HEADER_BYTES, CodifParams, FrameFormat, FrameHeader, HeaderConfig, VDIF_HEADER_BYTES,
    Variant, station_code,
};
pub use payload::{END_MARKER, MARKER_BYTES, START_MARKER, build_payload};
pub use rate::{
    FrameLimit, FrameSolution, IPV4_HEADER_BYTES, RateRequest, SEQUENCE_BYTES, UDP_HEADER_BYTES,
};
