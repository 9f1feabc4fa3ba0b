use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use vlbi_frame::{HeaderError, SolveError};

/// Result type alias for blast operations.
pub type Result<T, E = BlastError> = std::result::Result<T, E>;

/// Invalid run configuration, detected before any network activity.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("too many VDIF/CODIF threads {threads} cf max {max}")]
    TooManyThreads { threads: usize, max: usize },

    #[error("at least one thread is required")]
    NoThreads,

    #[error("duration must be a positive number of seconds, got {seconds}")]
    Duration { seconds: f64 },

    #[error("drop interval must be at least 1")]
    DropInterval,

    #[error("{frames_per_second} frames/sec exceeds the header counter limit of {max}")]
    FrameRate { frames_per_second: u32, max: u64 },

    #[error("pacing rate {mbps} Mbps gives no whole packets per second for {packet_bytes} byte packets")]
    PacingRate { mbps: f64, packet_bytes: usize },

    #[error(transparent)]
    Solve(#[from] SolveError),
}

/// Transport setup or send failure.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to look up hostname {host}")]
    Resolve {
        host: String,
        #[source]
        source: Option<io::Error>,
    },

    #[error("failed to allocate socket")]
    Socket(#[source] io::Error),

    #[error("setting socket send buffer")]
    SendBuffer(#[source] io::Error),

    #[error("failed to connect to {addr}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("did not write any bytes ({remaining} bytes outstanding)")]
    ShortWrite { remaining: usize },

    #[error("error writing to network")]
    Write(#[source] io::Error),

    #[error("sending {expected} byte datagram")]
    Send {
        expected: usize,
        #[source]
        source: io::Error,
    },

    #[error("only sent {sent} of {expected} bytes for datagram")]
    ShortSend { sent: usize, expected: usize },

    #[error("error closing socket")]
    Close(#[source] io::Error),
}

/// Any failure that aborts a run.
#[derive(Debug, Error)]
pub enum BlastError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("error creating frame header")]
    Header(#[from] HeaderError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<SolveError> for BlastError {
    fn from(err: SolveError) -> Self {
        Self::Config(ConfigError::Solve(err))
    }
}
