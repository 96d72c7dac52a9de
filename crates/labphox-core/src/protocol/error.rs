//! Protocol errors

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during protocol communication
///
/// None of these are retried by this layer; retry policy belongs to the
/// calling application.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The transport could not be opened. Recoverable; the caller may try
    /// again with a different port or address.
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    /// No complete reply arrived within the configured budget. No partial
    /// data is returned.
    #[error("Reply timeout exceeded ({budget:?})")]
    Timeout {
        /// The budget that was exhausted
        budget: Duration,
    },

    /// The echoed command prefix of a packet reply did not match the command
    /// that was sent. Indicates the host and board have lost framing.
    #[error("Protocol desynchronized: expected prefix {expected:02x?}, got {got:02x?}")]
    Desync {
        /// Bytes the reply was expected to start with
        expected: Vec<u8>,
        /// Bytes actually found at the head of the reply
        got: Vec<u8>,
    },

    /// Board firmware and host software versions differ. Fatal at connect
    /// time; no usable connection is produced.
    #[error("Board firmware version {board} is not compatible with software version {software}")]
    IncompatibleFirmware {
        /// Version reported by the board
        board: u32,
        /// Version this library speaks
        software: u32,
    },

    /// A reply field that should carry a specific shape could not be parsed
    #[error("Invalid {field} field in reply: {value:?}")]
    InvalidField {
        /// Name of the offending field
        field: &'static str,
        /// The raw text that failed to parse
        value: String,
    },

    /// A datagram or reply could not be decoded as text
    #[error("Invalid packet bytes: {0:02x?}")]
    InvalidPacketByte(Vec<u8>),

    /// No transport is attached (after `disconnect`, or misuse)
    #[error("Not connected to the board")]
    NotConnected,

    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(String),

    /// I/O error from the underlying transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
