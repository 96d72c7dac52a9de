//! Transport abstraction
//!
//! One polymorphic interface over the two links the board can be reached
//! through: a byte-stream serial port and a connectionless UDP socket. The
//! variant is chosen once at connection time and fixed for the life of the
//! connection.

use std::io::{ErrorKind, Read, Write};
use std::net::UdpSocket;
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, trace};

use super::{serial, ProtocolError, UDP_BUFFER_SIZE};

/// A link the board is reachable over
///
/// The transport is exclusively owned by the connection; there is at most
/// one command in flight, so no concurrent access is ever needed.
pub trait Transport: Send {
    /// Send one full command atomically
    fn write(&mut self, bytes: &[u8]) -> Result<(), ProtocolError>;

    /// Fetch the next chunk of reply bytes
    ///
    /// Stream transports return whatever is currently buffered without
    /// blocking (possibly nothing). Datagram transports block up to their
    /// read timeout for exactly one datagram and return an empty chunk when
    /// none arrives in time.
    fn try_read_available(&mut self) -> Result<Vec<u8>, ProtocolError>;

    /// Discard stale input left over from a previous reply
    ///
    /// Only meaningful for stream transports; datagram transports use a
    /// fresh socket per request and have nothing to flush.
    fn flush_input(&mut self) -> Result<(), ProtocolError>;

    /// Whether this is a byte-stream link (serial) as opposed to datagrams
    fn is_stream(&self) -> bool;

    /// Release per-request resources; called at the end of every request
    /// regardless of success or timeout
    fn end_request(&mut self) {}
}

/// Serial (byte-stream) transport
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Wrap an already opened and configured serial port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        trace!(len = bytes.len(), "serial write");
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn try_read_available(&mut self) -> Result<Vec<u8>, ProtocolError> {
        // Explicit bytes-waiting query so the read itself never blocks
        let available = self
            .port
            .bytes_to_read()
            .map_err(|e| ProtocolError::Serial(e.to_string()))? as usize;
        if available == 0 {
            return Ok(Vec::new());
        }

        let mut chunk = vec![0u8; available];
        match self.port.read(&mut chunk) {
            Ok(n) => {
                chunk.truncate(n);
                trace!(len = n, "serial read");
                Ok(chunk)
            }
            Err(ref e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                Ok(Vec::new())
            }
            Err(e) => Err(ProtocolError::Serial(e.to_string())),
        }
    }

    fn flush_input(&mut self) -> Result<(), ProtocolError> {
        serial::clear_input(self.port.as_mut())
    }

    fn is_stream(&self) -> bool {
        true
    }
}

/// UDP (datagram) transport
///
/// Every request opens a fresh ephemeral socket in [`write`](Transport::write)
/// and releases it in [`end_request`](Transport::end_request), so no socket
/// state is shared across requests.
pub struct UdpTransport {
    host: String,
    port: u16,
    read_timeout: Duration,
    socket: Option<UdpSocket>,
}

impl UdpTransport {
    /// Create a transport targeting `host:port`
    pub fn new(host: impl Into<String>, port: u16, read_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            read_timeout,
            socket: None,
        }
    }

    /// The configured target address
    pub fn target(&self) -> (&str, u16) {
        (&self.host, self.port)
    }
}

impl Transport for UdpTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        // Scoped acquisition: a socket lives for exactly one request.
        let socket = UdpSocket::bind(("0.0.0.0", 0))
            .map_err(|e| ProtocolError::ConnectFailed(e.to_string()))?;
        socket.set_read_timeout(Some(self.read_timeout))?;
        socket.send_to(bytes, (self.host.as_str(), self.port))?;
        debug!(host = %self.host, port = self.port, len = bytes.len(), "udp send");
        self.socket = Some(socket);
        Ok(())
    }

    fn try_read_available(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let socket = self.socket.as_ref().ok_or(ProtocolError::NotConnected)?;
        let mut buf = [0u8; UDP_BUFFER_SIZE];
        match socket.recv(&mut buf) {
            Ok(n) => {
                trace!(len = n, "udp recv");
                Ok(buf[..n].to_vec())
            }
            Err(ref e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                Ok(Vec::new())
            }
            Err(e) => Err(ProtocolError::Io(e)),
        }
    }

    fn flush_input(&mut self) -> Result<(), ProtocolError> {
        // Nothing to flush: each request gets a fresh socket.
        Ok(())
    }

    fn is_stream(&self) -> bool {
        false
    }

    fn end_request(&mut self) {
        self.socket = None;
    }
}
