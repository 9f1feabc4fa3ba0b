/// Integration tests: blast frames at loopback receivers and check what
/// arrives on the wire.
///
/// Receivers run on their own thread and report decoded frames back over a
/// crossbeam channel.

use std::io::Read;
use std::net::{TcpListener, UdpSocket};
use std::num::NonZeroU64;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use vlbi_blast::{
    BlastConfig, BlastError, Destination, NullLogger, Pacing, TransportError, TransportMode, run_blast,
};
use vlbi_frame::{END_MARKER, FrameHeader, START_MARKER, Variant};

const START_MJD: f64 = 60_000.25;

#[derive(Debug)]
struct Received {
    header: FrameHeader,
    sequence: Option<u64>,
    sentinels_ok: bool,
}

fn sentinels_ok(payload: &[u8]) -> bool {
    payload.starts_with(START_MARKER) && payload.ends_with(END_MARKER)
}

fn drain(rx: Receiver<Received>) -> Vec<Received> {
    let mut frames = Vec::new();
    loop {
        match rx.recv_timeout(Duration::from_secs(10)) {
            Ok(frame) => frames.push(frame),
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => panic!("receiver stalled"),
        }
    }
    frames
}

fn destination(port: u16) -> Destination {
    Destination {
        host: "127.0.0.1".into(),
        port,
    }
}

/// Accept one connection and split the byte stream into frames using the
/// length field of each header.
fn spawn_stream_receiver(listener: TcpListener) -> Receiver<Received> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut header_buf = [0u8; 32];
        loop {
            if stream.read_exact(&mut header_buf).is_err() {
                break;
            }
            let header = FrameHeader::parse(Variant::Vdif, &header_buf).unwrap();
            let mut payload = vec![0u8; header.payload_bytes()];
            stream.read_exact(&mut payload).unwrap();
            let frame = Received {
                header,
                sequence: None,
                sentinels_ok: sentinels_ok(&payload),
            };
            if tx.send(frame).is_err() {
                break;
            }
        }
    });
    rx
}

/// Read datagrams until the sender goes quiet.
fn spawn_datagram_receiver(socket: UdpSocket) -> Receiver<Received> {
    let (tx, rx) = crossbeam_channel::unbounded();
    socket
        .set_read_timeout(Some(Duration::from_millis(500)))
        .unwrap();
    thread::spawn(move || {
        let mut buf = vec![0u8; 65536];
        while let Ok((n, _)) = socket.recv_from(&mut buf) {
            let sequence = u64::from_ne_bytes(buf[..8].try_into().unwrap());
            let header = FrameHeader::parse(Variant::Vdif, &buf[8..n]).unwrap();
            let payload = &buf[8 + 32..n];
            assert_eq!(payload.len(), header.payload_bytes());
            let frame = Received {
                header,
                sequence: Some(sequence),
                sentinels_ok: sentinels_ok(payload),
            };
            if tx.send(frame).is_err() {
                break;
            }
        }
    });
    rx
}

#[test]
fn stream_two_seconds_exact_frame_count() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let rx = spawn_stream_receiver(listener);

    // 16 MHz x 1 chan x 2 bits = 64 Mbps, 8000 byte payloads, 1000 fps.
    let config = BlastConfig {
        channels: 1,
        duration_secs: 2.0,
        destination: destination(port),
        send_buffer: Some(1024 * 1024),
        ..BlastConfig::new(START_MJD)
    };
    let summary = run_blast(config).unwrap();
    assert_eq!(summary.frames_sent, 2000);
    assert_eq!(summary.bytes_sent, 2000 * 8032);

    let frames = drain(rx);
    assert_eq!(frames.len(), 2000);

    let first_second = frames[0].header.seconds();
    for (i, f) in frames.iter().enumerate() {
        assert_eq!(f.header.frame(), (i % 1000) as u32, "frame {}", i);
        assert_eq!(f.header.seconds(), first_second + (i / 1000) as u32);
        assert_eq!(f.header.payload_bytes(), 8000);
        assert_eq!(f.header.thread_id(), 0);
        assert!(f.sentinels_ok, "sentinels broken in frame {}", i);
    }
}

#[test]
fn stream_multiple_threads() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let rx = spawn_stream_receiver(listener);

    let config = BlastConfig {
        channels: 1,
        threads: 3,
        first_thread: 10,
        duration_secs: 0.1,
        destination: destination(port),
        logger: Some(Arc::new(NullLogger)),
        ..BlastConfig::new(START_MJD)
    };
    let summary = run_blast(config).unwrap();
    assert_eq!(summary.frames_sent, 300);

    let frames = drain(rx);
    assert_eq!(frames.len(), 300);
    for (i, f) in frames.iter().enumerate() {
        assert_eq!(f.header.thread_id(), 10 + (i % 3) as u32);
        assert_eq!(f.header.frame(), (i / 3) as u32);
    }
}

#[test]
fn datagram_drop_every_third() {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = socket.local_addr().unwrap().port();
    let rx = spawn_datagram_receiver(socket);

    // MTU 1500 gives 1280 byte payloads at 6250 fps; 30 frames is 4.8 ms.
    let config = BlastConfig {
        channels: 1,
        duration_secs: 30.0 / 6250.0,
        transport: TransportMode::Datagram {
            mtu: 1500,
            sequence: true,
            drop_every: NonZeroU64::new(3),
        },
        pacing: Pacing::Delay(Duration::from_micros(100)),
        destination: destination(port),
        send_buffer: Some(256 * 1024),
        ..BlastConfig::new(START_MJD)
    };
    let summary = run_blast(config).unwrap();
    assert_eq!(summary.frames_sent, 20);
    assert_eq!(summary.frames_skipped, 10);
    assert_eq!(summary.sequence, 30);

    let frames = drain(rx);
    let sequences: Vec<u64> = frames.iter().filter_map(|f| f.sequence).collect();
    let expected: Vec<u64> = (0..30).filter(|n| n % 3 != 2).collect();
    assert_eq!(sequences, expected);

    // Header counters advanced for the skipped frames too.
    for f in &frames {
        let seq = f.sequence.unwrap_or_default() as u32;
        assert_eq!(f.header.frame(), seq);
        assert_eq!(f.header.payload_bytes(), 1280);
        assert!(f.sentinels_ok);
    }
}

#[test]
fn unresolvable_host_fails_before_sending() {
    let config = BlastConfig {
        destination: Destination {
            host: "no-such-host.invalid".into(),
            port: 52100,
        },
        duration_secs: 1.0,
        ..BlastConfig::new(START_MJD)
    };
    let err = run_blast(config).unwrap_err();
    assert!(matches!(
        err,
        BlastError::Transport(TransportError::Resolve { .. })
    ));
}

#[test]
fn refused_connection_is_fatal() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = BlastConfig {
        destination: destination(port),
        duration_secs: 1.0,
        ..BlastConfig::new(START_MJD)
    };
    let err = run_blast(config).unwrap_err();
    assert!(matches!(
        err,
        BlastError::Transport(TransportError::Connect { .. })
    ));
}
