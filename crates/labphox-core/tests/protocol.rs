//! End-to-end protocol tests over a scripted in-memory transport.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use labphox_core::commands::{
    AdcCmd, DacChannel, DacCmd, Device, EthernetCmd, GpioLine, ResetCmd,
};
use labphox_core::history::HistoryLog;
use labphox_core::protocol::{
    Argument, Command, Connection, ConnectionConfig, ConnectionState, ProtocolError, Subsystem,
    Transport, PACKET_SENTINEL, SW_VERSION,
};

#[derive(Default)]
struct MockInner {
    /// Stale bytes left over from a "previous" reply; dropped by flush_input
    stale: Vec<u8>,
    /// Scripted reply chunks, one per try_read_available call
    chunks: VecDeque<Vec<u8>>,
    /// Everything the driver wrote
    written: Vec<Vec<u8>>,
    flushes: usize,
    ended_requests: usize,
}

/// Scripted transport; `is_stream` selects serial-like or datagram-like
/// behavior.
struct MockTransport {
    inner: Arc<Mutex<MockInner>>,
    is_stream: bool,
}

impl MockTransport {
    fn new(is_stream: bool) -> (Self, Arc<Mutex<MockInner>>) {
        let inner = Arc::new(Mutex::new(MockInner::default()));
        (
            Self {
                inner: Arc::clone(&inner),
                is_stream,
            },
            inner,
        )
    }
}

impl Transport for MockTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.inner.lock().unwrap().written.push(bytes.to_vec());
        Ok(())
    }

    fn try_read_available(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.stale.is_empty() {
            return Ok(std::mem::take(&mut inner.stale));
        }
        Ok(inner.chunks.pop_front().unwrap_or_default())
    }

    fn flush_input(&mut self) -> Result<(), ProtocolError> {
        let mut inner = self.inner.lock().unwrap();
        inner.stale.clear();
        inner.flushes += 1;
        Ok(())
    }

    fn is_stream(&self) -> bool {
        self.is_stream
    }

    fn end_request(&mut self) {
        self.inner.lock().unwrap().ended_requests += 1;
    }
}

/// Reply chunks that satisfy the identity handshake with firmware `fw`
fn handshake_chunks(fw: &str) -> Vec<Vec<u8>> {
    vec![
        b"LabPhox;".to_vec(),
        b"HW1.0;".to_vec(),
        b"SN-042;".to_vec(),
        format!("{};", fw).into_bytes(),
        b"channels 6;".to_vec(),
    ]
}

/// Route protocol traces to the test harness; `RUST_LOG` selects verbosity.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn test_config() -> ConnectionConfig {
    init_tracing();
    ConnectionConfig {
        timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(1),
        ..Default::default()
    }
}

fn connect(is_stream: bool, fw: &str) -> (Connection, Arc<Mutex<MockInner>>) {
    let (mock, inner) = MockTransport::new(is_stream);
    inner
        .lock()
        .unwrap()
        .chunks
        .extend(handshake_chunks(fw));
    let conn = Connection::open_with_transport(Box::new(mock), test_config())
        .expect("handshake should succeed");
    (conn, inner)
}

#[test]
fn test_handshake_resolves_identity() {
    let (conn, inner) = connect(true, "0.1");

    assert_eq!(conn.state(), ConnectionState::Connected);
    let identity = conn.identity().expect("identity after handshake");
    assert_eq!(identity.name, "LABPHOX");
    assert_eq!(identity.hardware_id, "HW1.0");
    assert_eq!(identity.serial_number, "SN-042");
    assert_eq!(identity.firmware_version, SW_VERSION);
    assert_eq!(identity.channels, 6);

    // The handshake is order-dependent: name, hw id, serial, fw, channels
    let written = inner.lock().unwrap().written.clone();
    assert_eq!(
        written,
        vec![
            b"W:2:A:;".to_vec(),
            b"W:2:D:;".to_vec(),
            b"W:2:E:;".to_vec(),
            b"W:2:B:;".to_vec(),
            b"W:2:F:;".to_vec(),
        ]
    );
}

#[test]
fn test_incompatible_firmware_refuses_connection() {
    let (mock, inner) = MockTransport::new(true);
    inner.lock().unwrap().chunks.extend(handshake_chunks("0.2"));

    let err = Connection::open_with_transport(Box::new(mock), test_config())
        .expect_err("version 2 board must be refused");
    match err {
        ProtocolError::IncompatibleFirmware { board, software } => {
            assert_eq!(board, 2);
            assert_eq!(software, 1);
        }
        other => panic!("expected IncompatibleFirmware, got {other:?}"),
    }
}

#[test]
fn test_unexpected_device_name_fails_connect() {
    let (mock, inner) = MockTransport::new(true);
    inner.lock().unwrap().chunks.push_back(b"SomeOtherBox;".to_vec());

    let err = Connection::open_with_transport(Box::new(mock), test_config())
        .expect_err("wrong device family must be refused");
    assert!(matches!(err, ProtocolError::ConnectFailed(_)));
}

#[test]
fn test_timeout_is_bounded_and_carries_budget() {
    let (mut conn, _inner) = connect(true, "0.1");

    let start = Instant::now();
    let err = conn
        .request(&Command::new(Subsystem::Adc, 'G', Argument::None))
        .expect_err("no reply scripted, must time out");
    let elapsed = start.elapsed();

    match err {
        ProtocolError::Timeout { budget } => assert_eq!(budget, Duration::from_millis(200)),
        other => panic!("expected Timeout, got {other:?}"),
    }
    // budget + one poll interval, with generous slack for CI scheduling
    assert!(elapsed < Duration::from_secs(2), "hung for {elapsed:?}");
}

#[test]
fn test_stream_flush_drops_stale_bytes() {
    let (mut conn, inner) = connect(true, "0.1");
    {
        let mut inner = inner.lock().unwrap();
        // Stray trailing bytes from a previous reply; without the flush
        // these would complete (and corrupt) the next reply.
        inner.stale = b"stray;".to_vec();
        inner.chunks.push_back(b"0:A:15;".to_vec());
    }

    let reply = conn
        .request(&Command::new(Subsystem::Timer, 'A', Argument::Int(15)))
        .unwrap();
    assert_eq!(reply.raw(), "0:A:15");
    assert_eq!(reply.value(), "15");
}

#[test]
fn test_datagram_reply_spanning_two_datagrams() {
    let (mut conn, inner) = connect(false, "0.1");
    {
        let mut inner = inner.lock().unwrap();
        inner.chunks.push_back(b"rep".to_vec());
        inner.chunks.push_back(b"ly;".to_vec());
    }

    let text = conn
        .request_raw(&Command::new(Subsystem::Utility, 'C', Argument::None))
        .unwrap();
    assert_eq!(text, "reply");
}

#[test]
fn test_datagram_invalid_bytes_are_skipped_not_fatal() {
    let (mut conn, inner) = connect(false, "0.1");
    {
        let mut inner = inner.lock().unwrap();
        inner.chunks.push_back(vec![0xff, 0xfe, 0x80]);
        inner.chunks.push_back(b"2:C:1;".to_vec());
    }

    let reply = conn
        .request(&Command::new(Subsystem::Utility, 'C', Argument::None))
        .unwrap();
    assert_eq!(reply.value(), "1");
}

#[test]
fn test_packet_reply_strips_echo_and_sentinel() {
    let (mut conn, inner) = connect(true, "0.1");
    {
        let mut inner = inner.lock().unwrap();
        inner.chunks.push_back(b"W:3:T:1;".to_vec());
        inner.chunks.push_back(vec![0x01, 0x02, 0x03]);
        inner.chunks.push_back(PACKET_SENTINEL.to_vec());
    }

    let payload = conn
        .request_packet(&Command::new(Subsystem::Application, 'T', Argument::Int(1)))
        .unwrap();
    assert_eq!(payload, vec![0x01, 0x02, 0x03]);
}

#[test]
fn test_packet_echo_mismatch_is_desync() {
    let (mut conn, inner) = connect(true, "0.1");
    {
        let mut inner = inner.lock().unwrap();
        inner.chunks.push_back(b"W:9:X:0;\x01".to_vec());
        inner.chunks.push_back(PACKET_SENTINEL.to_vec());
    }

    let err = conn
        .request_packet(&Command::new(Subsystem::Application, 'T', Argument::Int(1)))
        .expect_err("mismatched echo must surface");
    assert!(matches!(err, ProtocolError::Desync { .. }));
}

#[test]
fn test_disconnect_refuses_further_requests() {
    let (mut conn, _inner) = connect(true, "0.1");
    conn.disconnect();
    assert_eq!(conn.state(), ConnectionState::Disconnected);
    assert!(conn.identity().is_none());

    let err = conn
        .request(&Command::new(Subsystem::Utility, 'C', Argument::None))
        .expect_err("disconnected");
    assert!(matches!(err, ProtocolError::NotConnected));
}

#[test]
fn test_device_pulse_strips_packet_header() {
    let (mock, inner) = MockTransport::new(true);
    {
        let mut inner = inner.lock().unwrap();
        inner.chunks.extend(handshake_chunks("0.1"));
        inner.chunks.push_back(b"W:3:T:1;".to_vec());
        inner.chunks.push_back(vec![0u8; 7]); // packet header
        inner.chunks.push_back(vec![0x10, 0x20, 0x30]);
        inner.chunks.push_back(PACKET_SENTINEL.to_vec());
    }

    let mut device = Device::open_with_transport(Box::new(mock), test_config()).unwrap();
    let samples = device.pulse(1).unwrap();
    assert_eq!(samples, vec![0x10, 0x20, 0x30]);
}

#[test]
fn test_device_typed_commands_hit_the_wire() {
    let (mock, inner) = MockTransport::new(true);
    {
        let mut inner = inner.lock().unwrap();
        inner.chunks.extend(handshake_chunks("0.1"));
        inner.chunks.push_back(b"5:T:1;".to_vec());
        inner.chunks.push_back(b"4:G:1023;".to_vec());
        inner.chunks.push_back(b"1:E:1;".to_vec());
        inner.chunks.push_back(b"7:R:;".to_vec());
    }

    let mut device = Device::open_with_transport(Box::new(mock), test_config()).unwrap();
    device.dac(DacChannel::Dac1, DacCmd::On).unwrap();
    assert_eq!(device.adc_read().unwrap(), 1023);
    device.gpio_set(GpioLine::PwrEn, 1).unwrap();
    let reset = device.reset(ResetCmd::Reset).unwrap();
    assert_eq!(reset.value(), "");

    let written = inner.lock().unwrap().written.clone();
    let after_handshake = written[5..].to_vec();
    assert_eq!(
        after_handshake,
        vec![
            b"W:5:T:1;".to_vec(),
            b"W:4:G:;".to_vec(),
            b"W:1:E:1;".to_vec(),
            b"W:7:R:;".to_vec(),
        ]
    );
}

#[test]
fn test_device_timer_echo_mismatch_errors() {
    let (mock, inner) = MockTransport::new(true);
    {
        let mut inner = inner.lock().unwrap();
        inner.chunks.extend(handshake_chunks("0.1"));
        inner.chunks.push_back(b"0:A:14;".to_vec()); // board echoes wrong value
    }

    let mut device = Device::open_with_transport(Box::new(mock), test_config()).unwrap();
    let err = device.timer_duration(15).expect_err("echo mismatch");
    assert!(matches!(err, ProtocolError::InvalidField { .. }));
}

#[test]
fn test_device_board_ip_decodes_little_endian() {
    let (mock, inner) = MockTransport::new(true);
    let wire = 192u32 + (168 << 8) + (1 << 16) + (6 << 24);
    {
        let mut inner = inner.lock().unwrap();
        inner.chunks.extend(handshake_chunks("0.1"));
        inner.chunks.push_back(format!("Q:G:{};", wire).into_bytes());
    }

    let mut device = Device::open_with_transport(Box::new(mock), test_config()).unwrap();
    let ip = device.board_ip().unwrap();
    assert_eq!(ip, "192.168.1.6".parse::<std::net::Ipv4Addr>().unwrap());

    // And the set side renders the same integer
    let (mock2, inner2) = MockTransport::new(true);
    {
        let mut inner2 = inner2.lock().unwrap();
        inner2.chunks.extend(handshake_chunks("0.1"));
        inner2
            .chunks
            .push_back(format!("Q:I:{};", wire).into_bytes());
    }
    let mut device2 = Device::open_with_transport(Box::new(mock2), test_config()).unwrap();
    device2
        .ethernet(EthernetCmd::SetIp(ip))
        .unwrap();
    let written = inner2.lock().unwrap().written.clone();
    assert_eq!(written.last().unwrap(), &format!("W:Q:I:{};", wire).into_bytes());
}

#[test]
fn test_history_records_actions_and_replies() {
    let dir = tempfile::tempdir().unwrap();
    let history_path = dir.path().join("history.json");

    let (mock, inner) = MockTransport::new(true);
    {
        let mut inner = inner.lock().unwrap();
        inner.chunks.extend(handshake_chunks("0.1"));
        inner.chunks.push_back(b"4:G:512;".to_vec());
    }

    let config = ConnectionConfig {
        log_history: true,
        history_path: history_path.clone(),
        ..test_config()
    };
    let mut conn = Connection::open_with_transport(Box::new(mock), config).unwrap();
    conn.request(&AdcCmd::Get.command()).unwrap();
    drop(conn);

    let log = HistoryLog::new(&history_path);
    let actions: Vec<String> = log.entries("actions").into_iter().map(|e| e.data).collect();
    let received: Vec<String> = log
        .entries("received")
        .into_iter()
        .map(|e| e.data)
        .collect();

    assert!(actions.contains(&"W:4:G:;".to_string()));
    assert!(received.contains(&"4:G:512".to_string()));
    // Handshake traffic is logged too
    assert!(actions.contains(&"W:2:A:;".to_string()));
    assert!(received.contains(&"LabPhox".to_string()));
}

#[test]
fn test_history_write_failure_does_not_abort_request() {
    let dir = tempfile::tempdir().unwrap();

    let (mock, inner) = MockTransport::new(true);
    {
        let mut inner = inner.lock().unwrap();
        inner.chunks.extend(handshake_chunks("0.1"));
        inner.chunks.push_back(b"4:G:512;".to_vec());
    }

    // Pointing the log at a directory makes every history write fail;
    // the command in flight must not be affected.
    let config = ConnectionConfig {
        log_history: true,
        history_path: dir.path().to_path_buf(),
        ..test_config()
    };
    let mut conn = Connection::open_with_transport(Box::new(mock), config).unwrap();
    let reply = conn.request(&AdcCmd::Get.command()).unwrap();
    assert_eq!(reply.value(), "512");
}

#[test]
fn test_udp_request_releases_socket_per_request() {
    let (mut conn, inner) = connect(false, "0.1");
    {
        let mut inner = inner.lock().unwrap();
        inner.chunks.push_back(b"2:C:1;".to_vec());
    }
    let before = inner.lock().unwrap().ended_requests;
    conn.request(&Command::new(Subsystem::Utility, 'C', Argument::None))
        .unwrap();
    let after = inner.lock().unwrap().ended_requests;
    assert_eq!(after, before + 1);
}
