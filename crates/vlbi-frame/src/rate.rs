//! Frame-size solver.
//!
//! The header only carries an integer frame-within-second counter, so the
//! payload must divide the per-thread bit rate exactly. Starting from the
//! largest payload the transport allows, step down 8 bytes at a time until
//! `bit_rate % (payload * 8) == 0`.

use crate::error::SolveError;

/// IPv4 header bytes reserved per datagram.
pub const IPV4_HEADER_BYTES: usize = 20;

/// UDP header bytes reserved per datagram.
pub const UDP_HEADER_BYTES: usize = 8;

/// Sequence envelope bytes prefixed to each datagram when enabled.
pub const SEQUENCE_BYTES: usize = 8;

/// Upper bound on a frame, by transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLimit {
    /// Whole frame (header + payload) size for the stream transport.
    Stream { frame_bytes: usize },
    /// Datagram MTU; `sequence` reserves the 8-byte envelope.
    Datagram { mtu: usize, sequence: bool },
}

impl FrameLimit {
    fn bytes(&self) -> usize {
        match *self {
            Self::Stream { frame_bytes } => frame_bytes,
            Self::Datagram { mtu, .. } => mtu,
        }
    }

    /// Bytes of the limit not available to the payload.
    pub fn overhead(&self, header_bytes: usize) -> usize {
        match *self {
            Self::Stream { .. } => header_bytes,
            Self::Datagram { sequence, .. } => {
                let envelope = if sequence { SEQUENCE_BYTES } else { 0 };
                IPV4_HEADER_BYTES + UDP_HEADER_BYTES + envelope + header_bytes
            }
        }
    }
}

/// Everything needed to size a frame.
#[derive(Debug, Clone)]
pub struct RateRequest {
    /// Per-channel bandwidth in MHz.
    pub bandwidth_mhz: f64,
    pub channels: u32,
    pub bits_per_sample: u32,
    pub threads: usize,
    pub header_bytes: usize,
    pub limit: FrameLimit,
    /// Payload must also be a whole number of these blocks (CODIF).
    pub sample_block: Option<usize>,
}

/// Result of a successful solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSolution {
    pub payload_bytes: usize,
    /// Frames per second, per thread.
    pub frames_per_second: u32,
    /// Bits per second, per thread.
    pub bit_rate: u64,
}

impl RateRequest {
    /// Nyquist bit rate of one thread, in bits per second.
    pub fn thread_bit_rate(&self) -> u64 {
        let samples_per_second = (2.0 * self.bandwidth_mhz * 1e6).round() as u64;
        samples_per_second * self.channels as u64 * self.bits_per_sample as u64
    }

    /// Bit rate summed over all threads.
    pub fn total_bit_rate(&self) -> u64 {
        self.thread_bit_rate() * self.threads as u64
    }

    /// Largest 8-byte aligned payload the limit allows.
    pub fn max_payload(&self) -> Result<usize, SolveError> {
        let limit = self.limit.bytes();
        let overhead = self.limit.overhead(self.header_bytes);
        let max = limit.saturating_sub(overhead) & !0x7;
        if max < 8 {
            return Err(SolveError::LimitTooSmall { limit, overhead });
        }
        Ok(max)
    }

    pub fn solve(&self) -> Result<FrameSolution, SolveError> {
        let bit_rate = self.thread_bit_rate();
        if bit_rate == 0 {
            return Err(SolveError::ZeroRate);
        }

        let mut payload = self.max_payload()?;
        while payload >= 8 {
            let frame_bits = payload as u64 * 8;
            let whole_blocks = self.sample_block.is_none_or(|b| b > 0 && payload % b == 0);
            if whole_blocks && bit_rate % frame_bits == 0 {
                let frames_per_second = u32::try_from(bit_rate / frame_bits)
                    .map_err(|_| SolveError::NoIntegralRate { bit_rate })?;
                return Ok(FrameSolution {
                    payload_bytes: payload,
                    frames_per_second,
                    bit_rate,
                });
            }
            payload -= 8;
        }
        Err(SolveError::NoIntegralRate { bit_rate })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(limit: FrameLimit) -> RateRequest {
        RateRequest {
            bandwidth_mhz: 16.0,
            channels: 4,
            bits_per_sample: 2,
            threads: 1,
            header_bytes: 32,
            limit,
            sample_block: None,
        }
    }

    #[test]
    fn bit_rates() {
        let r = request(FrameLimit::Stream { frame_bytes: 9000 });
        assert_eq!(r.thread_bit_rate(), 256_000_000);
        let r = RateRequest { threads: 4, ..r };
        assert_eq!(r.total_bit_rate(), 1_024_000_000);
    }

    #[test]
    fn solves_256_mbps_datagram() {
        let r = request(FrameLimit::Datagram {
            mtu: 9000,
            sequence: true,
        });
        assert_eq!(r.max_payload().unwrap(), 8928);
        let s = r.solve().unwrap();
        assert_eq!(s.payload_bytes % 8, 0);
        assert_eq!(256_000_000 % (s.payload_bytes as u64 * 8), 0);
        assert_eq!(s.payload_bytes, 8000);
        assert_eq!(s.frames_per_second, 4000);
    }

    #[test]
    fn solves_stream_frame_size() {
        let r = RateRequest {
            channels: 1,
            ..request(FrameLimit::Stream { frame_bytes: 9000 })
        };
        assert_eq!(r.max_payload().unwrap(), 8968);
        let s = r.solve().unwrap();
        assert_eq!(s.payload_bytes, 8000);
        assert_eq!(s.frames_per_second, 1000);
    }

    #[test]
    fn standard_ethernet_mtu() {
        let r = request(FrameLimit::Datagram {
            mtu: 1500,
            sequence: false,
        });
        // 1500 - 28 - 32 = 1440
        assert_eq!(r.max_payload().unwrap(), 1440);
        let s = r.solve().unwrap();
        assert!(s.payload_bytes <= 1440);
        assert_eq!(256_000_000 % (s.payload_bytes as u64 * 8), 0);
    }

    #[test]
    fn payload_holds_whole_sample_blocks() {
        // 16 MHz x 3 chan x 8 bits, CODIF header, 3 byte blocks.
        let r = RateRequest {
            channels: 3,
            bits_per_sample: 8,
            header_bytes: 64,
            sample_block: Some(3),
            ..request(FrameLimit::Stream { frame_bytes: 9000 })
        };
        assert_eq!(r.thread_bit_rate(), 768_000_000);
        let s = r.solve().unwrap();
        assert_eq!(s.payload_bytes, 7680);
        assert_eq!(s.frames_per_second, 12_500);

        // Without the block constraint 8000 bytes wins.
        let unblocked = RateRequest { sample_block: None, ..r };
        assert_eq!(unblocked.solve().unwrap().payload_bytes, 8000);
    }

    #[test]
    fn limit_too_small() {
        let r = request(FrameLimit::Datagram {
            mtu: 60,
            sequence: true,
        });
        assert!(matches!(r.solve(), Err(SolveError::LimitTooSmall { .. })));
    }

    #[test]
    fn zero_rate_rejected() {
        let r = RateRequest {
            bandwidth_mhz: 0.0,
            ..request(FrameLimit::Stream { frame_bytes: 9000 })
        };
        assert_eq!(r.solve(), Err(SolveError::ZeroRate));
    }

    #[test]
    fn no_integral_rate() {
        // 2 * 1 Hz * 1 chan * 3 bits = 6 bps, never a multiple of 64 bits.
        let r = RateRequest {
            bandwidth_mhz: 1e-6,
            channels: 1,
            bits_per_sample: 3,
            ..request(FrameLimit::Stream { frame_bytes: 9000 })
        };
        assert!(matches!(r.solve(), Err(SolveError::NoIntegralRate { .. })));
    }
}
