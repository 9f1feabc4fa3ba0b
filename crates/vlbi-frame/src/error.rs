use thiserror::Error;

/// A header could not be built or stamped with the requested parameters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("payload of {bytes} bytes is not a multiple of 8")]
    PayloadNotAligned { bytes: usize },

    #[error("payload of {bytes} bytes exceeds the format maximum of {max}")]
    PayloadTooLarge { bytes: usize, max: usize },

    #[error("{channels} channels cannot be encoded")]
    ChannelCount { channels: u32 },

    #[error("{bits} bits per sample cannot be encoded (1..=32)")]
    BitsPerSample { bits: u32 },

    #[error("thread id {thread} exceeds the format maximum of {max}")]
    ThreadId { thread: u32, max: u32 },

    #[error("station id {code:?} must be one or two ASCII characters")]
    StationId { code: String },

    #[error("payload of {payload} bytes is not a whole number of {block}-byte sample blocks")]
    SampleBlock { payload: usize, block: u32 },

    #[error("total samples per period must be non-zero")]
    ZeroTotalSamples,

    #[error("MJD {mjd} has no reference epoch in this format")]
    EpochOutOfRange { mjd: i64 },

    #[error("{seconds} seconds past the reference epoch cannot be encoded")]
    SecondsOutOfRange { seconds: i64 },
}

/// No payload size satisfies the integral frame rate constraint.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SolveError {
    #[error("requested bit rate is zero")]
    ZeroRate,

    #[error("frame limit of {limit} bytes leaves no room for a payload after {overhead} bytes of overhead")]
    LimitTooSmall { limit: usize, overhead: usize },

    #[error("could not find a frame size to suit {bit_rate} bps")]
    NoIntegralRate { bit_rate: u64 },
}
