//! LabPhox wire protocol
//!
//! Implements the ASCII command framing and reply reassembly used by the
//! LabPhox switch controller, over either a serial link or a UDP socket.
//!
//! Commands are short ASCII strings of the form `W:<subsystem>:<action>:<argument>;`.
//! Replies come in two shapes: text replies terminated by a `;` delimiter, and
//! binary packet replies terminated by a 4-byte sentinel.

pub mod command;
mod connection;
mod error;
mod reply;
pub mod serial;
pub mod transport;

pub use command::{Argument, Command, ExpanderPort, Subsystem};
pub use connection::{Connection, ConnectionConfig, ConnectionState, Identity, SW_VERSION};
pub use error::ProtocolError;
pub use reply::{Reassembler, StructuredReply, Termination, PACKET_SENTINEL, PULSE_HEADER_LEN};
pub use transport::{SerialTransport, Transport, UdpTransport};

/// Default UDP port the board listens on
pub const DEFAULT_UDP_PORT: u16 = 7;

/// Default reply timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Receive buffer size for a single UDP datagram
pub const UDP_BUFFER_SIZE: usize = 1024;

/// USB product ID the board enumerates with
pub const LABPHOX_USB_PID: u16 = 1812;
