//! Connection management
//!
//! Owns the transport, performs the identity handshake, gates on firmware
//! compatibility, and executes commands against the board. At most one
//! command is in flight at a time; the protocol carries no request
//! identifiers, so every reply is attributed to the most recently sent
//! command.

use std::fmt;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{
    command::{Argument, Command, Subsystem},
    reply::{Reassembler, StructuredReply, Termination, PACKET_SENTINEL, PULSE_HEADER_LEN},
    serial,
    transport::{SerialTransport, Transport, UdpTransport},
    ProtocolError, DEFAULT_TIMEOUT_SECS, DEFAULT_UDP_PORT,
};
use crate::history::HistoryLog;

/// Protocol version this library speaks; the board firmware must match
pub const SW_VERSION: u32 = 1;

/// Device-family substring expected in the board's name reply; the rest of
/// the handshake is gated on it
const DEVICE_FAMILY: &str = "LABP";

/// How long the board takes to walk the I2C bus during a scan
const I2C_BUS_WALK_TIME: Duration = Duration::from_secs(5);

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Identity handshake in progress
    Connecting,
    /// Identity resolved and firmware compatibility confirmed
    Connected,
    /// Firmware version mismatch; terminal, the connection is refused
    Incompatible,
}

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Serial port name; `None` selects auto-discovery by USB product ID
    pub port_name: Option<String>,
    /// UDP target host; when set, UDP is used instead of serial
    pub host: Option<String>,
    /// UDP target port
    pub udp_port: u16,
    /// Reply timeout budget, re-armed at the start of each request
    pub timeout: Duration,
    /// Sleep between poll iterations of the read loop (may be zero)
    pub poll_interval: Duration,
    /// Record raw commands and replies to the JSON history log
    pub log_history: bool,
    /// Path of the history log file
    pub history_path: PathBuf,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port_name: None,
            host: None,
            udp_port: DEFAULT_UDP_PORT,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            poll_interval: Duration::ZERO,
            log_history: false,
            history_path: PathBuf::from("history.json"),
        }
    }
}

/// Board identity, resolved once by the handshake and immutable afterwards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Board name (upper-cased name reply)
    pub name: String,
    /// Hardware revision identifier
    pub hardware_id: String,
    /// Board serial number
    pub serial_number: String,
    /// Firmware version number
    pub firmware_version: u32,
    /// Number of switch channels on the board
    pub channels: u32,
}

/// A connection to the board
///
/// Exclusively owns its transport; `&mut self` on every request enforces
/// the single-command-in-flight invariant.
pub struct Connection {
    /// Active transport, dropped on disconnect
    transport: Option<Box<dyn Transport>>,
    /// Current connection state; owned by this type exclusively
    state: ConnectionState,
    /// Connection configuration
    config: ConnectionConfig,
    /// Board identity (after a successful handshake)
    identity: Option<Identity>,
    /// Optional command history sink
    history: Option<HistoryLog>,
}

impl Connection {
    /// Open a connection per the configuration and perform the handshake
    ///
    /// Picks UDP when `config.host` is set, otherwise serial (auto-discovered
    /// by USB product ID when `config.port_name` is `None`). Fails with
    /// [`ProtocolError::ConnectFailed`] when the transport cannot be opened
    /// and fatally with [`ProtocolError::IncompatibleFirmware`] when the
    /// board firmware does not match [`SW_VERSION`].
    pub fn open(config: ConnectionConfig) -> Result<Self, ProtocolError> {
        let transport: Box<dyn Transport> = if let Some(host) = config.host.clone() {
            Box::new(UdpTransport::new(host, config.udp_port, config.timeout))
        } else {
            let port_name = match config.port_name.clone() {
                Some(name) => name,
                None => serial::find_board().map(|p| p.name).ok_or_else(|| {
                    ProtocolError::ConnectFailed(
                        "no LabPhox board found on any serial port".into(),
                    )
                })?,
            };
            let mut stream = SerialTransport::new(serial::open_port(&port_name)?);
            stream.flush_input()?;
            Box::new(stream)
        };

        Self::open_with_transport(transport, config)
    }

    /// Open a connection over an already constructed transport
    ///
    /// Performs the same identity handshake as [`open`](Connection::open).
    /// Useful for custom transports and for testing against a mock link.
    pub fn open_with_transport(
        transport: Box<dyn Transport>,
        config: ConnectionConfig,
    ) -> Result<Self, ProtocolError> {
        let history = config
            .log_history
            .then(|| HistoryLog::new(config.history_path.clone()));

        let mut conn = Self {
            transport: Some(transport),
            state: ConnectionState::Connecting,
            config,
            identity: None,
            history,
        };

        match conn.handshake() {
            Ok(identity) => {
                info!(
                    name = %identity.name,
                    serial = %identity.serial_number,
                    firmware = identity.firmware_version,
                    channels = identity.channels,
                    "connected"
                );
                conn.identity = Some(identity);
                conn.state = ConnectionState::Connected;
                Ok(conn)
            }
            Err(e) => {
                conn.state = if matches!(e, ProtocolError::IncompatibleFirmware { .. }) {
                    ConnectionState::Incompatible
                } else {
                    ConnectionState::Disconnected
                };
                // The half-built connection is dropped here; no partially
                // usable connection escapes.
                Err(e)
            }
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Board identity, if the handshake has completed
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Connection configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Drop the transport and return to `Disconnected`
    pub fn disconnect(&mut self) {
        self.transport = None;
        self.identity = None;
        self.state = ConnectionState::Disconnected;
    }

    /// Ordered identity handshake: name, hardware id, serial number,
    /// firmware version, channel count. Later requests are gated on the
    /// name reply matching the expected device family.
    fn handshake(&mut self) -> Result<Identity, ProtocolError> {
        let name = self.utility_query('A')?.to_uppercase();
        debug!(name = %name, "handshake: name reply");
        if !name.contains(DEVICE_FAMILY) {
            return Err(ProtocolError::ConnectFailed(format!(
                "unexpected device name: {name:?}"
            )));
        }

        let hardware_id = self.utility_query('D')?;
        let serial_number = self.utility_query('E')?;
        let firmware_reply = self.utility_query('B')?;
        let firmware_version = parse_firmware_version(&firmware_reply)?;
        let channels_reply = self.utility_query('F')?;
        let channels = parse_channel_count(&channels_reply)?;

        if firmware_version != SW_VERSION {
            return Err(ProtocolError::IncompatibleFirmware {
                board: firmware_version,
                software: SW_VERSION,
            });
        }

        Ok(Identity {
            name,
            hardware_id,
            serial_number,
            firmware_version,
            channels,
        })
    }

    fn utility_query(&mut self, action: char) -> Result<String, ProtocolError> {
        self.request_raw(&Command::new(Subsystem::Utility, action, Argument::None))
    }

    /// Send a command and return the text reply split into fields
    pub fn request(&mut self, command: &Command) -> Result<StructuredReply, ProtocolError> {
        Ok(StructuredReply::new(self.request_raw(command)?))
    }

    /// Send a command and return the text reply as-is (no field split)
    pub fn request_raw(&mut self, command: &Command) -> Result<String, ProtocolError> {
        let bytes = self.run_request(&command.encode(), Termination::Delimited(b';'))?;
        String::from_utf8(bytes).map_err(|e| ProtocolError::InvalidPacketByte(e.into_bytes()))
    }

    /// Send a command and return the binary packet reply, with the command
    /// echo and the terminal sentinel stripped
    pub fn request_packet(&mut self, command: &Command) -> Result<Vec<u8>, ProtocolError> {
        let wire = command.encode();
        let termination = Termination::Sentinel {
            sentinel: PACKET_SENTINEL,
            echo: wire.clone(),
        };
        self.run_request(&wire, termination)
    }

    /// Send a pulse-acquisition command and return the raw sample bytes,
    /// with the fixed packet header additionally stripped
    pub fn request_pulse(&mut self, command: &Command) -> Result<Vec<u8>, ProtocolError> {
        let payload = self.request_packet(command)?;
        if payload.len() < PULSE_HEADER_LEN {
            return Err(ProtocolError::InvalidField {
                field: "pulse header",
                value: format!("{} payload bytes", payload.len()),
            });
        }
        Ok(payload[PULSE_HEADER_LEN..].to_vec())
    }

    /// Scan the I2C bus and return the addresses the board reports
    ///
    /// Fires the read-token scan command, gives the board time to walk the
    /// bus, then drains whatever it printed. Serial transport only in
    /// practice, though the command is sent over whichever link is active.
    pub fn scan_i2c(&mut self) -> Result<Vec<String>, ProtocolError> {
        let cmd = Command::read(Subsystem::Adc, 'T', Argument::Int(1));
        self.record_history("actions", &cmd.wire_string());

        let transport = self
            .transport
            .as_mut()
            .ok_or(ProtocolError::NotConnected)?;
        if transport.is_stream() {
            transport.flush_input()?;
        }
        transport.write(&cmd.encode())?;
        thread::sleep(I2C_BUS_WALK_TIME);
        let chunk = transport.try_read_available()?;
        transport.end_request();

        let text = String::from_utf8(chunk)
            .map_err(|e| ProtocolError::InvalidPacketByte(e.into_bytes()))?;
        Ok(text
            .trim()
            .trim_matches('-')
            .split('&')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// The request loop shared by both reply shapes and both transports
    ///
    /// Writes the command (flushing stale stream input first), then polls
    /// the transport and feeds the reassembler until the termination
    /// condition holds or the timeout budget runs out. Uncancellable, but
    /// always terminates within the budget plus one poll interval.
    fn run_request(
        &mut self,
        wire: &[u8],
        termination: Termination,
    ) -> Result<Vec<u8>, ProtocolError> {
        self.record_history("actions", &String::from_utf8_lossy(wire));

        let text_mode = matches!(termination, Termination::Delimited(_));
        let poll_interval = self.config.poll_interval;
        let budget = self.config.timeout;

        let transport = self
            .transport
            .as_mut()
            .ok_or(ProtocolError::NotConnected)?;
        if transport.is_stream() {
            // Discard stray bytes from a previous, possibly unconsumed reply
            transport.flush_input()?;
        }
        transport.write(wire)?;

        let mut reassembler = Reassembler::new(termination, budget);
        let result = loop {
            if !poll_interval.is_zero() {
                thread::sleep(poll_interval);
            }

            let chunk = match transport.try_read_available() {
                Ok(chunk) => chunk,
                Err(e) => break Err(e),
            };
            if !chunk.is_empty() {
                if text_mode
                    && !transport.is_stream()
                    && !chunk.contains(&b';')
                    && std::str::from_utf8(&chunk).is_err()
                {
                    // Malformed datagram: drop it and keep waiting for the
                    // rest of the reply rather than aborting the request.
                    warn!(bytes = ?chunk, "dropping undecodable datagram");
                } else {
                    reassembler.feed(&chunk);
                }
            }

            match reassembler.poll_complete() {
                Ok(Some(reply)) => break Ok(reply),
                Ok(None) => {}
                Err(e) => break Err(e),
            }
            if let Err(e) = reassembler.check_timeout() {
                break Err(e);
            }
        };
        transport.end_request();

        if let Ok(reply) = &result {
            self.record_history("received", &String::from_utf8_lossy(reply));
        }
        result
    }

    /// Write to the history sink; failures must never abort the command in
    /// flight, so they are logged and swallowed.
    fn record_history(&self, category: &str, data: &str) {
        if let Some(history) = &self.history {
            if let Err(e) = history.append(category, data) {
                warn!(error = %e, category, "failed to write command history");
            }
        }
    }
}

// Manual impl: the transport trait object is not Debug and is elided.
impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("config", &self.config)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// The firmware reply carries a dotted version string; the version number
/// is its final component.
fn parse_firmware_version(reply: &str) -> Result<u32, ProtocolError> {
    reply
        .rsplit('.')
        .next()
        .unwrap_or("")
        .trim()
        .parse()
        .map_err(|_| ProtocolError::InvalidField {
            field: "firmware version",
            value: reply.to_string(),
        })
}

/// The channel-count reply is of the form `channels <n>`.
fn parse_channel_count(reply: &str) -> Result<u32, ProtocolError> {
    reply
        .split_whitespace()
        .nth(1)
        .and_then(|token| token.parse().ok())
        .ok_or_else(|| ProtocolError::InvalidField {
            field: "channel count",
            value: reply.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_config_default() {
        let config = ConnectionConfig::default();
        assert_eq!(config.udp_port, DEFAULT_UDP_PORT);
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.poll_interval, Duration::ZERO);
        assert!(!config.log_history);
        assert!(config.host.is_none());
    }

    #[test]
    fn test_parse_firmware_version() {
        assert_eq!(parse_firmware_version("0.1").unwrap(), 1);
        assert_eq!(parse_firmware_version("FW 2.0.3").unwrap(), 3);
        assert!(matches!(
            parse_firmware_version("garbage"),
            Err(ProtocolError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_parse_channel_count() {
        assert_eq!(parse_channel_count("channels 6").unwrap(), 6);
        assert!(matches!(
            parse_channel_count("channels"),
            Err(ProtocolError::InvalidField { .. })
        ));
        assert!(matches!(
            parse_channel_count("channels many"),
            Err(ProtocolError::InvalidField { .. })
        ));
    }
}
