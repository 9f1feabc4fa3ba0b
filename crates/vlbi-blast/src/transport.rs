//! Frame transports.
//!
//! ```text
//! stream   : [header][payload] [header][payload] ...        (one TCP connection)
//! datagram : [seq u64, host order][header][payload]          (one sendmsg per frame)
//! ```
//!
//! The stream receiver relies on the fixed header size for framing; there
//! is no delimiter. Each datagram is a single scatter/gather send and a
//! short send is an error, never retried.

use std::fmt;
use std::io::{self, IoSlice, Write};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream, ToSocketAddrs};
use std::num::NonZeroU64;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::error::TransportError;

/// Transport selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Stream,
    Datagram,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream => write!(f, "tcp"),
            Self::Datagram => write!(f, "udp"),
        }
    }
}

/// What happened to one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Bytes put on the wire, including any sequence envelope.
    Sent(usize),
    /// Skipped by drop injection; no network call was made.
    Skipped,
}

/// One live connection (or quasi-connection) that frames are written to.
pub trait FrameTransport {
    fn kind(&self) -> TransportKind;

    /// Send one frame. `sequence` is the envelope value for transports that
    /// carry one and is ignored otherwise.
    fn send(
        &mut self,
        header: &[u8],
        payload: &[u8],
        sequence: Option<u64>,
    ) -> Result<SendOutcome, TransportError>;

    /// Flush and release the underlying socket.
    fn close(&mut self) -> Result<(), TransportError>;

    /// Negotiated `SO_SNDBUF`, if one was requested.
    fn send_buffer_size(&self) -> Option<usize> {
        None
    }
}

impl<T: FrameTransport + ?Sized> FrameTransport for Box<T> {
    fn kind(&self) -> TransportKind {
        (**self).kind()
    }

    fn send(
        &mut self,
        header: &[u8],
        payload: &[u8],
        sequence: Option<u64>,
    ) -> Result<SendOutcome, TransportError> {
        (**self).send(header, payload, sequence)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }

    fn send_buffer_size(&self) -> Option<usize> {
        (**self).send_buffer_size()
    }
}

/// Resolve `host:port`, preferring an IPv4 address.
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr, TransportError> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| TransportError::Resolve {
            host: host.to_string(),
            source: Some(e),
        })?
        .collect();

    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| TransportError::Resolve {
            host: host.to_string(),
            source: None,
        })
}

/// Apply a requested send buffer size and read back what the OS granted.
fn apply_send_buffer(socket: &Socket, size: Option<usize>) -> Result<Option<usize>, TransportError> {
    match size {
        Some(size) => {
            socket
                .set_send_buffer_size(size)
                .map_err(TransportError::SendBuffer)?;
            let granted = socket.send_buffer_size().map_err(TransportError::SendBuffer)?;
            Ok(Some(granted))
        }
        None => Ok(None),
    }
}

// ── Stream ─────────────────────────────────────────────────────────────

/// Write all of `buf`, retrying interrupted and partial writes.
fn write_fully<W: Write>(writer: &mut W, mut buf: &[u8]) -> Result<(), TransportError> {
    while !buf.is_empty() {
        match writer.write(buf) {
            Ok(0) => {
                return Err(TransportError::ShortWrite {
                    remaining: buf.len(),
                });
            }
            Ok(n) => buf = &buf[n..],
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransportError::Write(e)),
        }
    }
    Ok(())
}

/// Reliable byte-stream transport.
pub struct StreamTransport<W: Write = TcpStream> {
    writer: W,
    send_buffer: Option<usize>,
}

impl<W: Write> StreamTransport<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            send_buffer: None,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> FrameTransport for StreamTransport<W> {
    fn kind(&self) -> TransportKind {
        TransportKind::Stream
    }

    fn send(
        &mut self,
        header: &[u8],
        payload: &[u8],
        _sequence: Option<u64>,
    ) -> Result<SendOutcome, TransportError> {
        write_fully(&mut self.writer, header)?;
        write_fully(&mut self.writer, payload)?;
        Ok(SendOutcome::Sent(header.len() + payload.len()))
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.writer.flush().map_err(TransportError::Close)
    }

    fn send_buffer_size(&self) -> Option<usize> {
        self.send_buffer
    }
}

/// Connect a TCP stream to `dest`.
pub fn open_stream(
    dest: SocketAddr,
    send_buffer: Option<usize>,
) -> Result<StreamTransport<TcpStream>, TransportError> {
    let socket = Socket::new(Domain::for_address(dest), Type::STREAM, Some(Protocol::TCP))
        .map_err(TransportError::Socket)?;
    let granted = apply_send_buffer(&socket, send_buffer)?;

    socket
        .connect(&dest.into())
        .map_err(|source| TransportError::Connect { addr: dest, source })?;

    Ok(StreamTransport {
        writer: socket.into(),
        send_buffer: granted,
    })
}

// ── Datagram ───────────────────────────────────────────────────────────

/// Skips every Nth send call.
#[derive(Debug, Clone, Default)]
pub struct DropController {
    every: Option<NonZeroU64>,
    calls: u64,
    dropped: u64,
}

impl DropController {
    pub fn new(every: Option<NonZeroU64>) -> Self {
        Self {
            every,
            calls: 0,
            dropped: 0,
        }
    }

    /// Count one send call; true if it should be skipped.
    pub fn should_drop(&mut self) -> bool {
        self.calls += 1;
        let drop = match self.every {
            Some(n) => self.calls % n.get() == 0,
            None => false,
        };
        if drop {
            self.dropped += 1;
        }
        drop
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Connectionless datagram transport.
pub struct DatagramTransport {
    socket: Socket,
    dest: SockAddr,
    sequence_envelope: bool,
    drops: DropController,
    send_buffer: Option<usize>,
}

impl FrameTransport for DatagramTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Datagram
    }

    fn send(
        &mut self,
        header: &[u8],
        payload: &[u8],
        sequence: Option<u64>,
    ) -> Result<SendOutcome, TransportError> {
        if self.drops.should_drop() {
            return Ok(SendOutcome::Skipped);
        }

        let envelope = match (self.sequence_envelope, sequence) {
            (true, Some(seq)) => Some(seq.to_ne_bytes()),
            _ => None,
        };
        let envelope: &[u8] = match &envelope {
            Some(bytes) => bytes,
            None => &[],
        };

        let slices = [
            IoSlice::new(envelope),
            IoSlice::new(header),
            IoSlice::new(payload),
        ];
        let expected = envelope.len() + header.len() + payload.len();

        let sent = self
            .socket
            .send_to_vectored(&slices, &self.dest)
            .map_err(|source| TransportError::Send { expected, source })?;
        if sent != expected {
            return Err(TransportError::ShortSend { sent, expected });
        }
        Ok(SendOutcome::Sent(sent))
    }

    fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn send_buffer_size(&self) -> Option<usize> {
        self.send_buffer
    }
}

/// Create a UDP socket aimed at `dest`.
pub fn open_datagram(
    dest: SocketAddr,
    send_buffer: Option<usize>,
    sequence_envelope: bool,
    drop_every: Option<NonZeroU64>,
) -> Result<DatagramTransport, TransportError> {
    let socket = Socket::new(Domain::for_address(dest), Type::DGRAM, Some(Protocol::UDP))
        .map_err(TransportError::Socket)?;
    socket.set_nonblocking(false).map_err(TransportError::Socket)?;

    let any: SocketAddr = if dest.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    socket.bind(&any.into()).map_err(TransportError::Socket)?;

    let granted = apply_send_buffer(&socket, send_buffer)?;

    Ok(DatagramTransport {
        socket,
        dest: dest.into(),
        sequence_envelope,
        drops: DropController::new(drop_every),
        send_buffer: granted,
    })
}
