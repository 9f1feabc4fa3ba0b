//! Send engine: plans a run, then drives the round-robin frame loop.
//!
//! State machine:
//!
//! ```text
//! Init ──► Running ──► Draining ──► Closed
//!            │  ▲
//!            └──┘ one frame per step
//! ```
//!
//! Every thread's header advances in lockstep. The stop test only looks at
//! header time, never the wall clock, so a run of `D` seconds always emits
//! `D × fps × threads` frames regardless of how fast the network accepts
//! them.

use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use vlbi_epoch::{SECONDS_PER_DAY, mjd_to_day_of_year, mjd_to_time_string};
use vlbi_frame::{
    CodifParams, FrameFormat, FrameHeader, FrameLimit, FrameSolution, HeaderConfig, RateRequest,
    Variant, build_payload,
};

use crate::error::{ConfigError, Result};
use crate::logging::{BlastEvent, BlastLog, BlastLogger};
use crate::pacer::{PacingState, ThroughputMeter, inter_packet_delay};
use crate::transport::{
    FrameTransport, SendOutcome, TransportKind, open_datagram, open_stream, resolve,
};

/// Largest number of interleaved threads in one run.
pub const MAX_THREADS: usize = 64;

const COMPONENT: &str = "engine";

/// Where frames are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub host: String,
    pub port: u16,
}

impl Default for Destination {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 52100,
        }
    }
}

/// Transport selection and its frame-size limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// TCP; `frame_bytes` bounds header plus payload.
    Stream { frame_bytes: usize },
    /// UDP; `mtu` bounds the whole IP packet.
    Datagram {
        mtu: usize,
        sequence: bool,
        drop_every: Option<NonZeroU64>,
    },
}

impl TransportMode {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Stream { .. } => TransportKind::Stream,
            Self::Datagram { .. } => TransportKind::Datagram,
        }
    }

    fn limit(&self) -> FrameLimit {
        match *self {
            Self::Stream { frame_bytes } => FrameLimit::Stream { frame_bytes },
            Self::Datagram { mtu, sequence, .. } => FrameLimit::Datagram { mtu, sequence },
        }
    }
}

/// Inter-packet pacing request.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Pacing {
    #[default]
    None,
    /// Fixed delay between datagrams.
    Delay(Duration),
    /// Delay derived from a target rate in Mbps. Takes precedence over a
    /// fixed delay when both are configured.
    RateMbps(f64),
}

/// Everything needed to run one blast.
#[derive(Clone)]
pub struct BlastConfig {
    pub format: Variant,
    /// Per-channel bandwidth in MHz.
    pub bandwidth_mhz: f64,
    pub channels: u32,
    pub bits_per_sample: u32,
    pub complex: bool,
    pub threads: usize,
    /// Thread id of the first thread; the rest follow consecutively.
    pub first_thread: u32,
    pub station_id: u16,
    pub transport: TransportMode,
    pub pacing: Pacing,
    pub destination: Destination,
    /// Requested `SO_SNDBUF` in bytes.
    pub send_buffer: Option<usize>,
    /// Start time; rounded to the nearest whole second when headers are
    /// stamped.
    pub start_mjd: f64,
    /// Seconds of header time to generate.
    pub duration_secs: f64,
    pub report_interval: Duration,
    pub logger: Option<Arc<dyn BlastLogger>>,
}

impl std::fmt::Debug for BlastConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlastConfig")
            .field("format", &self.format)
            .field("bandwidth_mhz", &self.bandwidth_mhz)
            .field("channels", &self.channels)
            .field("bits_per_sample", &self.bits_per_sample)
            .field("complex", &self.complex)
            .field("threads", &self.threads)
            .field("first_thread", &self.first_thread)
            .field("station_id", &self.station_id)
            .field("transport", &self.transport)
            .field("pacing", &self.pacing)
            .field("destination", &self.destination)
            .field("send_buffer", &self.send_buffer)
            .field("start_mjd", &self.start_mjd)
            .field("duration_secs", &self.duration_secs)
            .field("report_interval", &self.report_interval)
            .field("logger", &self.logger.as_ref().map(|_| "<dyn BlastLogger>"))
            .finish()
    }
}

impl BlastConfig {
    /// Defaults for everything except the start time.
    pub fn new(start_mjd: f64) -> Self {
        Self {
            format: Variant::Vdif,
            bandwidth_mhz: 16.0,
            channels: 4,
            bits_per_sample: 2,
            complex: false,
            threads: 1,
            first_thread: 0,
            station_id: u16::from_be_bytes(*b"Tt"),
            transport: TransportMode::Stream { frame_bytes: 9000 },
            pacing: Pacing::None,
            destination: Destination::default(),
            send_buffer: None,
            start_mjd,
            duration_secs: 60.0,
            report_interval: Duration::from_secs(1),
            logger: None,
        }
    }
}

/// Validated, solved run: headers at their start time, the shared payload
/// and the stop condition.
#[derive(Debug, Clone)]
pub struct BlastPlan {
    solution: FrameSolution,
    headers: Vec<FrameHeader>,
    payload: Bytes,
    delay: Duration,
    total_bit_rate: u64,
    start_mjd: f64,
    start_second: u32,
    duration_secs: f64,
}

impl BlastPlan {
    pub fn new(config: &BlastConfig) -> Result<Self> {
        if config.threads == 0 {
            return Err(ConfigError::NoThreads.into());
        }
        if config.threads > MAX_THREADS {
            return Err(ConfigError::TooManyThreads {
                threads: config.threads,
                max: MAX_THREADS,
            }
            .into());
        }
        if !config.duration_secs.is_finite() || config.duration_secs <= 0.0 {
            return Err(ConfigError::Duration {
                seconds: config.duration_secs,
            }
            .into());
        }

        let variant = config.format;
        let header_bytes = variant.header_bytes();
        let format = match variant {
            Variant::Vdif => FrameFormat::Vdif,
            Variant::Codif => FrameFormat::Codif(CodifParams::for_stream(
                config.bandwidth_mhz,
                config.channels,
                config.bits_per_sample,
                config.complex,
            )),
        };
        let sample_block = match format {
            FrameFormat::Vdif => None,
            FrameFormat::Codif(params) => Some(params.sample_block_length as usize),
        };

        let request = RateRequest {
            bandwidth_mhz: config.bandwidth_mhz,
            channels: config.channels,
            bits_per_sample: config.bits_per_sample,
            threads: config.threads,
            header_bytes,
            limit: config.transport.limit(),
            sample_block,
        };
        let solution = request.solve()?;

        let max_fps = variant.max_frames_per_second();
        if solution.frames_per_second as u64 > max_fps {
            return Err(ConfigError::FrameRate {
                frames_per_second: solution.frames_per_second,
                max: max_fps,
            }
            .into());
        }

        let start_day = config.start_mjd.floor() as i64;
        let start_mjd_second = (config.start_mjd * SECONDS_PER_DAY).round() as i64;

        let mut headers = Vec::with_capacity(config.threads);
        for offset in 0..config.threads as u32 {
            let mut header = FrameHeader::new(&HeaderConfig {
                format,
                thread_id: config.first_thread + offset,
                payload_bytes: solution.payload_bytes,
                bits_per_sample: config.bits_per_sample,
                channels: config.channels,
                complex: config.complex,
                station_id: config.station_id,
            })?;
            header.stamp_epoch(start_day)?;
            header.stamp_mjd_second(start_mjd_second)?;
            headers.push(header);
        }

        let delay = match (config.transport.kind(), config.pacing) {
            (_, Pacing::None) => Duration::ZERO,
            (TransportKind::Stream, pacing) => {
                tracing::warn!(?pacing, "pacing is only applied to datagram transport, ignoring");
                Duration::ZERO
            }
            (TransportKind::Datagram, Pacing::Delay(delay)) => delay,
            (TransportKind::Datagram, Pacing::RateMbps(mbps)) => {
                inter_packet_delay(mbps, solution.payload_bytes, header_bytes)?
            }
        };

        let start_second = headers[0].seconds();
        let start_mjd = headers[0].frame_mjd(solution.frames_per_second);

        Ok(Self {
            solution,
            headers,
            payload: build_payload(solution.payload_bytes),
            delay,
            total_bit_rate: request.total_bit_rate(),
            start_mjd,
            start_second,
            duration_secs: config.duration_secs,
        })
    }

    pub fn solution(&self) -> FrameSolution {
        self.solution
    }

    pub fn payload_bytes(&self) -> usize {
        self.solution.payload_bytes
    }

    pub fn frames_per_second(&self) -> u32 {
        self.solution.frames_per_second
    }

    pub fn threads(&self) -> usize {
        self.headers.len()
    }

    pub fn headers(&self) -> &[FrameHeader] {
        &self.headers
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Inter-packet delay; zero when unpaced.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Data rate over all threads, in Mbps.
    pub fn total_mbps(&self) -> f64 {
        self.total_bit_rate as f64 / 1e6
    }

    /// MJD of the first frame.
    pub fn start_mjd(&self) -> f64 {
        self.start_mjd
    }

    pub fn finish_mjd(&self) -> f64 {
        self.start_mjd + self.duration_secs / SECONDS_PER_DAY
    }

    /// Frames each thread will emit.
    pub fn frames_per_thread(&self) -> u64 {
        let fps = self.solution.frames_per_second as f64;
        (self.duration_secs * fps - 0.5).ceil().max(0.0) as u64
    }

    /// Seconds of header time between the start and `header`.
    fn header_offset(&self, header: &FrameHeader) -> f64 {
        let whole = header.seconds().wrapping_sub(self.start_second) as f64;
        whole + header.frame() as f64 / self.solution.frames_per_second as f64
    }

    /// Stop test: true while `header` is more than half a frame before the
    /// finish time.
    fn before_finish(&self, header: &FrameHeader) -> bool {
        let epsilon = 0.5 / self.solution.frames_per_second as f64;
        self.header_offset(header) + epsilon < self.duration_secs
    }

    fn describe(&self) -> BlastEvent {
        let (dayno, year, _) = mjd_to_day_of_year(self.start_mjd);
        BlastEvent::RunPlanned {
            payload_bytes: self.solution.payload_bytes,
            frames_per_second: self.solution.frames_per_second,
            threads: self.headers.len(),
            total_frames: self.frames_per_thread() * self.headers.len() as u64,
            total_mbps: self.total_mbps(),
            start_mjd: self.start_mjd,
            start_time: format!(
                "{}/{:03} {}",
                year,
                dayno,
                mjd_to_time_string(self.start_mjd, 0)
            ),
        }
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlastState {
    Init,
    Running,
    Draining,
    Closed,
}

/// Counters for a finished (or drained) run.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BlastSummary {
    pub frames_sent: u64,
    pub frames_skipped: u64,
    pub bytes_sent: u64,
    /// Final value of the datagram sequence counter.
    pub sequence: u64,
    pub elapsed: Duration,
}

impl BlastSummary {
    /// Average rate over the run, in Mbps.
    pub fn mbps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes_sent as f64 * 8.0 / secs / 1e6
        } else {
            0.0
        }
    }
}

/// One run over an open transport.
pub struct BlastSession<T: FrameTransport> {
    plan: BlastPlan,
    transport: T,
    logger: Option<Arc<dyn BlastLogger>>,
    state: BlastState,
    current: usize,
    header_buf: Vec<u8>,
    pacing: PacingState,
    meter: Option<ThroughputMeter>,
    report_interval: Duration,
    summary: BlastSummary,
}

impl<T: FrameTransport> BlastSession<T> {
    pub fn new(
        plan: BlastPlan,
        transport: T,
        report_interval: Duration,
        logger: Option<Arc<dyn BlastLogger>>,
    ) -> Self {
        let header_bytes = plan.headers[0].header_bytes();
        let pacing = PacingState::new(plan.delay);
        Self {
            plan,
            transport,
            logger,
            state: BlastState::Init,
            current: 0,
            header_buf: vec![0u8; header_bytes],
            pacing,
            meter: None,
            report_interval,
            summary: BlastSummary::default(),
        }
    }

    pub fn state(&self) -> BlastState {
        self.state
    }

    pub fn plan(&self) -> &BlastPlan {
        &self.plan
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Counters so far.
    pub fn summary(&self) -> BlastSummary {
        BlastSummary {
            sequence: self.pacing.sequence(),
            ..self.summary
        }
    }

    /// MJD of the next frame to be sent on the current thread.
    pub fn current_mjd(&self) -> f64 {
        self.plan.headers[self.current].frame_mjd(self.plan.frames_per_second())
    }

    /// Advance the state machine by one step. In `Running`, one step sends
    /// at most one frame.
    pub fn step(&mut self) -> Result<BlastState> {
        match self.state {
            BlastState::Init => {
                self.meter = Some(ThroughputMeter::new(self.report_interval, Instant::now()));
                self.transition(BlastState::Running);
            }
            BlastState::Running => {
                if self.current == 0 && !self.plan.before_finish(&self.plan.headers[0]) {
                    self.transition(BlastState::Draining);
                } else if let Err(e) = self.send_current() {
                    self.emit(BlastEvent::Error {
                        message: e.to_string(),
                    });
                    return Err(e);
                }
            }
            BlastState::Draining => {
                if let Some(meter) = self.meter.as_mut() {
                    let (_, elapsed) = meter.drain(Instant::now());
                    self.summary.elapsed = elapsed;
                }
                self.transport.close()?;
                self.transition(BlastState::Closed);

                let summary = self.summary();
                self.emit(BlastEvent::RunComplete {
                    mbps: summary.mbps(),
                    seconds: summary.elapsed.as_secs_f64(),
                    frames_sent: summary.frames_sent,
                    frames_skipped: summary.frames_skipped,
                    sequence: summary.sequence,
                });
            }
            BlastState::Closed => {}
        }
        Ok(self.state)
    }

    /// Step until `Closed`.
    pub fn run(&mut self) -> Result<BlastSummary> {
        while self.step()? != BlastState::Closed {}
        Ok(self.summary())
    }

    fn send_current(&mut self) -> Result<()> {
        let fps = self.plan.frames_per_second();
        let sequence = self.pacing.sequence();

        self.plan.headers[self.current].write_to(&mut self.header_buf);
        let outcome = self
            .transport
            .send(&self.header_buf, &self.plan.payload, Some(sequence))?;

        match outcome {
            SendOutcome::Sent(bytes) => {
                self.summary.frames_sent += 1;
                self.summary.bytes_sent += bytes as u64;
                let report = self
                    .meter
                    .as_mut()
                    .and_then(|m| m.record(bytes as u64, Instant::now()));
                if let Some(report) = report {
                    self.emit(BlastEvent::Throughput {
                        mbps: report.mbps(),
                        seconds: report.elapsed.as_secs_f64(),
                        bytes: report.bytes,
                    });
                }
            }
            SendOutcome::Skipped => {
                self.summary.frames_skipped += 1;
                self.emit(BlastEvent::FrameDropped {
                    call: self.summary.frames_sent + self.summary.frames_skipped,
                    sequence,
                });
            }
        }

        self.pacing.pace();

        self.plan.headers[self.current].advance(fps);
        self.current += 1;
        if self.current == self.plan.headers.len() {
            self.current = 0;
            self.pacing.bump_sequence();
        }
        Ok(())
    }

    fn transition(&mut self, to: BlastState) {
        let from = self.state;
        self.state = to;
        self.emit(BlastEvent::StateChanged { from, to });
    }

    fn emit(&self, event: BlastEvent) {
        if let Some(ref logger) = self.logger {
            logger.log(BlastLog {
                component: COMPONENT,
                event,
            });
        }
    }
}

/// Plan, connect and run to completion.
pub fn run_blast(config: BlastConfig) -> Result<BlastSummary> {
    let plan = BlastPlan::new(&config)?;
    let logger = config.logger.clone();
    let log = |event: BlastEvent| {
        if let Some(ref logger) = logger {
            logger.log(BlastLog {
                component: COMPONENT,
                event,
            });
        }
    };

    log(plan.describe());
    if !plan.delay().is_zero() {
        log(BlastEvent::PacingConfigured {
            delay_us: plan.delay().as_secs_f64() * 1e6,
        });
    }

    let dest = resolve(&config.destination.host, config.destination.port)?;
    let transport: Box<dyn FrameTransport> = match config.transport {
        TransportMode::Stream { .. } => Box::new(open_stream(dest, config.send_buffer)?),
        TransportMode::Datagram {
            sequence,
            drop_every,
            ..
        } => Box::new(open_datagram(dest, config.send_buffer, sequence, drop_every)?),
    };
    log(BlastEvent::SessionOpened {
        kind: transport.kind(),
        dest,
        send_buffer: transport.send_buffer_size(),
    });

    let mut session = BlastSession::new(plan, transport, config.report_interval, logger.clone());
    session.run()
}
