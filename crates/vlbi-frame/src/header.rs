//! Per-thread VDIF and CODIF frame headers.
//!
//! VDIF (32 bytes, little-endian 32-bit words):
//!
//! ```text
//! word 0  [0..30)  seconds from reference epoch   [30] legacy   [31] invalid
//! word 1  [0..24)  frame within second            [24..30) reference epoch (half-years since 2000)
//! word 2  [0..24)  frame length / 8 (incl. header) [24..29) log2(channels)  [29..32) version
//! word 3  [0..16)  station id  [16..26) thread id  [26..31) bits/sample - 1  [31] complex
//! word 4-7         extended user data (zero)
//! ```
//!
//! CODIF (64 bytes, little-endian 64-bit words):
//!
//! ```text
//! word 0  [0..32)  frame within period  [32..62) seconds from epoch  [62] complex  [63] invalid
//! word 1  [0..8)   reference epoch  [8..13) bits/sample - 1  [13..16) version
//!         [16..20) sample representation  [32..48) station id  [48..64) thread id
//! word 2  [0..32)  channels  [32..48) sample block length (bytes)  [48..64) group id
//! word 3  [0..32)  data array length / 8  [32..48) period (seconds)
//! word 4           total samples per period
//! word 5  [0..32)  sync word 0xFEEDCAFE
//! word 6-7         extended user data (zero)
//! ```

use vlbi_epoch::{SECONDS_PER_DAY, calendar_to_mjd, mjd_to_calendar};

use crate::error::HeaderError;

/// VDIF header size in bytes.
pub const VDIF_HEADER_BYTES: usize = 32;

/// CODIF header size in bytes.
pub const CODIF_HEADER_BYTES: usize = 64;

const VDIF_MAX_EPOCH: i64 = 0x3f;
const VDIF_MAX_THREAD: u32 = 1023;
const VDIF_MAX_FRAME_UNITS: usize = (1 << 24) - 1;
const VDIF_MAX_SECONDS: i64 = (1 << 30) - 1;

const CODIF_MAX_EPOCH: i64 = 0xff;
const CODIF_MAX_THREAD: u32 = 0xffff;
const CODIF_VERSION: u64 = 1;
const CODIF_SYNC: u64 = 0xFEED_CAFE;

/// Year of reference epoch 0 in both formats.
const EPOCH_BASE_YEAR: i32 = 2000;

/// Protocol variant tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Vdif,
    Codif,
}

impl Variant {
    pub fn header_bytes(self) -> usize {
        match self {
            Self::Vdif => VDIF_HEADER_BYTES,
            Self::Codif => CODIF_HEADER_BYTES,
        }
    }

    /// Largest frame rate the frame-within-second counter can carry.
    pub fn max_frames_per_second(self) -> u64 {
        match self {
            Self::Vdif => 1 << 24,
            Self::Codif => u32::MAX as u64,
        }
    }
}

/// CODIF-only rate description fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodifParams {
    /// Bytes in one sample block (all channels, one sample time).
    pub sample_block_length: u32,
    /// Samples per channel in one period.
    pub total_samples: u64,
    /// Period length in seconds.
    pub period: u16,
}

impl CodifParams {
    /// Derive the block length and samples-per-second of a Nyquist sampled
    /// stream.
    pub fn for_stream(bandwidth_mhz: f64, channels: u32, bits_per_sample: u32, complex: bool) -> Self {
        let mut block_bits = channels as u64 * bits_per_sample as u64;
        if complex {
            block_bits *= 2;
        }
        let sample_block_length = ((block_bits / 8) as u32).max(1);

        let mut total_samples = (bandwidth_mhz * 1e6).round() as u64;
        if !complex {
            total_samples *= 2;
        }

        Self {
            sample_block_length,
            total_samples,
            period: 1,
        }
    }
}

/// Header format selection, with the extra CODIF fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Vdif,
    Codif(CodifParams),
}

impl FrameFormat {
    pub fn variant(&self) -> Variant {
        match self {
            Self::Vdif => Variant::Vdif,
            Self::Codif(_) => Variant::Codif,
        }
    }
}

/// Fixed fields of one thread's header.
#[derive(Debug, Clone)]
pub struct HeaderConfig {
    pub format: FrameFormat,
    pub thread_id: u32,
    pub payload_bytes: usize,
    pub bits_per_sample: u32,
    pub channels: u32,
    pub complex: bool,
    pub station_id: u16,
}

/// Pack a one or two character station code into 16 bits.
pub fn station_code(code: &str) -> Result<u16, HeaderError> {
    let err = || HeaderError::StationId {
        code: code.to_string(),
    };
    if !code.is_ascii() {
        return Err(err());
    }
    match code.as_bytes() {
        [a] => Ok(*a as u16),
        [a, b] => Ok(((*a as u16) << 8) | *b as u16),
        _ => Err(err()),
    }
}

/// One thread's frame header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    format: FrameFormat,
    epoch: u8,
    seconds: u32,
    frame: u32,
    thread_id: u32,
    channels: u32,
    bits_per_sample: u32,
    complex: bool,
    payload_bytes: usize,
    station_id: u16,
}

impl FrameHeader {
    /// Build a header at epoch 0, second 0, frame 0.
    pub fn new(config: &HeaderConfig) -> Result<Self, HeaderError> {
        let payload = config.payload_bytes;
        if payload == 0 || payload % 8 != 0 {
            return Err(HeaderError::PayloadNotAligned { bytes: payload });
        }
        if !(1..=32).contains(&config.bits_per_sample) {
            return Err(HeaderError::BitsPerSample {
                bits: config.bits_per_sample,
            });
        }
        if config.channels == 0 {
            return Err(HeaderError::ChannelCount { channels: 0 });
        }

        match config.format {
            FrameFormat::Vdif => {
                let max = VDIF_MAX_FRAME_UNITS * 8 - VDIF_HEADER_BYTES;
                if payload > max {
                    return Err(HeaderError::PayloadTooLarge { bytes: payload, max });
                }
                if !config.channels.is_power_of_two() {
                    return Err(HeaderError::ChannelCount {
                        channels: config.channels,
                    });
                }
                if config.thread_id > VDIF_MAX_THREAD {
                    return Err(HeaderError::ThreadId {
                        thread: config.thread_id,
                        max: VDIF_MAX_THREAD,
                    });
                }
            }
            FrameFormat::Codif(params) => {
                let max = u32::MAX as usize * 8;
                if payload > max {
                    return Err(HeaderError::PayloadTooLarge { bytes: payload, max });
                }
                if config.thread_id > CODIF_MAX_THREAD {
                    return Err(HeaderError::ThreadId {
                        thread: config.thread_id,
                        max: CODIF_MAX_THREAD,
                    });
                }
                let block = params.sample_block_length;
                if block == 0 || block > u16::MAX as u32 || payload % block as usize != 0 {
                    return Err(HeaderError::SampleBlock { payload, block });
                }
                if params.total_samples == 0 {
                    return Err(HeaderError::ZeroTotalSamples);
                }
            }
        }

        Ok(Self {
            format: config.format,
            epoch: 0,
            seconds: 0,
            frame: 0,
            thread_id: config.thread_id,
            channels: config.channels,
            bits_per_sample: config.bits_per_sample,
            complex: config.complex,
            payload_bytes: payload,
            station_id: config.station_id,
        })
    }

    pub fn variant(&self) -> Variant {
        self.format.variant()
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    pub fn header_bytes(&self) -> usize {
        self.variant().header_bytes()
    }

    pub fn payload_bytes(&self) -> usize {
        self.payload_bytes
    }

    /// Header plus payload.
    pub fn frame_bytes(&self) -> usize {
        self.header_bytes() + self.payload_bytes
    }

    pub fn epoch(&self) -> u8 {
        self.epoch
    }

    pub fn seconds(&self) -> u32 {
        self.seconds
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }

    pub fn thread_id(&self) -> u32 {
        self.thread_id
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn bits_per_sample(&self) -> u32 {
        self.bits_per_sample
    }

    pub fn is_complex(&self) -> bool {
        self.complex
    }

    pub fn station_id(&self) -> u16 {
        self.station_id
    }

    /// Set the reference epoch to the half-year containing the whole-day
    /// `mjd`.
    pub fn stamp_epoch(&mut self, mjd: i64) -> Result<(), HeaderError> {
        let date = mjd_to_calendar(mjd as f64);
        let half = if date.month >= 7 { 1 } else { 0 };
        let epoch = (date.year as i64 - EPOCH_BASE_YEAR as i64) * 2 + half;

        let max = match self.variant() {
            Variant::Vdif => VDIF_MAX_EPOCH,
            Variant::Codif => CODIF_MAX_EPOCH,
        };
        if !(0..=max).contains(&epoch) {
            return Err(HeaderError::EpochOutOfRange { mjd });
        }
        self.epoch = epoch as u8;
        Ok(())
    }

    /// Whole-day MJD at which the current reference epoch starts.
    pub fn epoch_mjd(&self) -> i64 {
        let year = EPOCH_BASE_YEAR + self.epoch as i32 / 2;
        let month = if self.epoch % 2 == 1 { 7 } else { 1 };
        calendar_to_mjd(1, month, year)
    }

    /// Set the whole seconds since the reference epoch.
    pub fn stamp_second(&mut self, seconds: u32) {
        debug_assert!(seconds as i64 <= VDIF_MAX_SECONDS);
        self.seconds = seconds;
    }

    /// Set the seconds field from an absolute MJD second count
    /// (`mjd * 86400`), relative to the stamped epoch.
    pub fn stamp_mjd_second(&mut self, mjd_seconds: i64) -> Result<(), HeaderError> {
        let seconds = mjd_seconds - self.epoch_mjd() * SECONDS_PER_DAY as i64;
        if !(0..=VDIF_MAX_SECONDS).contains(&seconds) {
            return Err(HeaderError::SecondsOutOfRange { seconds });
        }
        self.stamp_second(seconds as u32);
        Ok(())
    }

    /// Step to the next frame, rolling into the next second after
    /// `frames_per_second` frames.
    pub fn advance(&mut self, frames_per_second: u32) {
        self.frame += 1;
        if self.frame >= frames_per_second {
            self.frame = 0;
            self.seconds += 1;
        }
    }

    /// Time of the current frame as a fractional MJD.
    pub fn frame_mjd(&self, frames_per_second: u32) -> f64 {
        let seconds = self.seconds as f64 + self.frame as f64 / frames_per_second as f64;
        self.epoch_mjd() as f64 + seconds / SECONDS_PER_DAY
    }

    /// Encode into the first `header_bytes()` bytes of `buf`.
    pub fn write_to(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= self.header_bytes());
        match self.format {
            FrameFormat::Vdif => self.write_vdif(buf),
            FrameFormat::Codif(params) => self.write_codif(buf, &params),
        }
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.header_bytes()];
        self.write_to(&mut buf);
        buf
    }

    fn write_vdif(&self, buf: &mut [u8]) {
        let frame_units = (self.frame_bytes() / 8) as u32;
        let words: [u32; 8] = [
            self.seconds & 0x3fff_ffff,
            (self.frame & 0x00ff_ffff) | ((self.epoch as u32 & 0x3f) << 24),
            (frame_units & 0x00ff_ffff) | ((self.channels.trailing_zeros() & 0x1f) << 24),
            self.station_id as u32
                | ((self.thread_id & 0x3ff) << 16)
                | (((self.bits_per_sample - 1) & 0x1f) << 26)
                | ((self.complex as u32) << 31),
            0,
            0,
            0,
            0,
        ];
        for (chunk, word) in buf[..VDIF_HEADER_BYTES].chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
    }

    fn write_codif(&self, buf: &mut [u8], params: &CodifParams) {
        let words: [u64; 8] = [
            self.frame as u64
                | ((self.seconds as u64 & 0x3fff_ffff) << 32)
                | ((self.complex as u64) << 62),
            self.epoch as u64
                | (((self.bits_per_sample as u64 - 1) & 0x1f) << 8)
                | (CODIF_VERSION << 13)
                | ((self.station_id as u64) << 32)
                | ((self.thread_id as u64 & 0xffff) << 48),
            self.channels as u64 | ((params.sample_block_length as u64 & 0xffff) << 32),
            (self.payload_bytes / 8) as u64 | ((params.period as u64) << 32),
            params.total_samples,
            CODIF_SYNC,
            0,
            0,
        ];
        for (chunk, word) in buf[..CODIF_HEADER_BYTES].chunks_exact_mut(8).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
    }

    /// Decode a header of the given variant. Returns None if `buf` is too
    /// short or does not hold a valid header.
    pub fn parse(variant: Variant, buf: &[u8]) -> Option<Self> {
        match variant {
            Variant::Vdif => Self::parse_vdif(buf),
            Variant::Codif => Self::parse_codif(buf),
        }
    }

    fn parse_vdif(buf: &[u8]) -> Option<Self> {
        if buf.len() < VDIF_HEADER_BYTES {
            return None;
        }
        let word = |i: usize| u32::from_le_bytes(buf[i * 4..i * 4 + 4].try_into().unwrap_or([0; 4]));
        let (w0, w1, w2, w3) = (word(0), word(1), word(2), word(3));

        let frame_bytes = (w2 & 0x00ff_ffff) as usize * 8;
        if frame_bytes <= VDIF_HEADER_BYTES || w0 >> 31 != 0 {
            return None;
        }

        Some(Self {
            format: FrameFormat::Vdif,
            epoch: ((w1 >> 24) & 0x3f) as u8,
            seconds: w0 & 0x3fff_ffff,
            frame: w1 & 0x00ff_ffff,
            thread_id: (w3 >> 16) & 0x3ff,
            channels: 1 << ((w2 >> 24) & 0x1f),
            bits_per_sample: ((w3 >> 26) & 0x1f) + 1,
            complex: w3 >> 31 == 1,
            payload_bytes: frame_bytes - VDIF_HEADER_BYTES,
            station_id: (w3 & 0xffff) as u16,
        })
    }

    fn parse_codif(buf: &[u8]) -> Option<Self> {
        if buf.len() < CODIF_HEADER_BYTES {
            return None;
        }
        let word = |i: usize| u64::from_le_bytes(buf[i * 8..i * 8 + 8].try_into().unwrap_or([0; 8]));
        let (w0, w1, w2, w3, w4, w5) = (word(0), word(1), word(2), word(3), word(4), word(5));

        if w5 & 0xffff_ffff != CODIF_SYNC || w0 >> 63 != 0 {
            return None;
        }

        let params = CodifParams {
            sample_block_length: ((w2 >> 32) & 0xffff) as u32,
            total_samples: w4,
            period: ((w3 >> 32) & 0xffff) as u16,
        };

        Some(Self {
            format: FrameFormat::Codif(params),
            epoch: (w1 & 0xff) as u8,
            seconds: ((w0 >> 32) & 0x3fff_ffff) as u32,
            frame: (w0 & 0xffff_ffff) as u32,
            thread_id: ((w1 >> 48) & 0xffff) as u32,
            channels: (w2 & 0xffff_ffff) as u32,
            bits_per_sample: ((w1 >> 8) & 0x1f) as u32 + 1,
            complex: (w0 >> 62) & 1 == 1,
            payload_bytes: (w3 & 0xffff_ffff) as usize * 8,
            station_id: ((w1 >> 32) & 0xffff) as u16,
        })
    }
}
