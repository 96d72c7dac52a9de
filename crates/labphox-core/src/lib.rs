//! # LabPhox Core Library
//!
//! Host-side driver for the LabPhox cryogenic switch controller.
//!
//! This library provides:
//! - ASCII command framing and reply reassembly over serial or UDP
//! - Typed per-subsystem command dispatch (DAC, ADC, GPIO, timers,
//!   I/O-expander routing, reset, Ethernet configuration)
//! - Connection lifecycle with identity handshake and firmware gating
//! - Optional JSON command-history logging
//! - Firmware flashing via the external `dfu-util` utility
//!
//! ## Example
//!
//! ```rust,ignore
//! use labphox_core::commands::{DacChannel, DacCmd, Device};
//! use labphox_core::protocol::ConnectionConfig;
//!
//! // Connect over UDP; serial auto-discovery is used when no host is set
//! let config = ConnectionConfig {
//!     host: Some("192.168.1.6".into()),
//!     ..Default::default()
//! };
//! let mut board = Device::open(config)?;
//!
//! board.dac(DacChannel::Dac1, DacCmd::Set(1000))?;
//! let samples = board.pulse(1)?;
//! println!("{} sample bytes", samples.len());
//! ```

#![warn(missing_docs)]

pub mod commands;
pub mod flash;
pub mod history;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::commands::{
        AdcCmd, AppCmd, DacChannel, DacCmd, Device, EthernetCmd, GpioLine, IoExpanderCmd,
        ResetCmd, TimerCmd, UtilityCmd,
    };
    pub use crate::history::{HistoryEntry, HistoryLog};
    pub use crate::protocol::{
        Command, Connection, ConnectionConfig, ConnectionState, Identity, ProtocolError,
        StructuredReply,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
