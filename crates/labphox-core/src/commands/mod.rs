//! Typed command dispatch
//!
//! The [`Device`] facade pairs a [`Connection`] with the typed command
//! catalog, turning symbolic operations into wire commands and interpreting
//! the structured replies.

mod actions;

pub use actions::{
    power_status_command, pulse_command, AdcCmd, AppCmd, DacChannel, DacCmd, EthernetCmd,
    GpioLine, IoExpanderCmd, ResetCmd, TimerCmd, UtilityCmd,
};

use std::net::Ipv4Addr;

use crate::protocol::{
    Connection, ConnectionConfig, Identity, ProtocolError, StructuredReply, Transport,
};

/// High-level handle on the board
///
/// Owns the connection; all operations take `&mut self` because the protocol
/// allows exactly one command in flight.
pub struct Device {
    conn: Connection,
}

impl Device {
    /// Connect to the board and resolve its identity
    pub fn open(config: ConnectionConfig) -> Result<Self, ProtocolError> {
        Ok(Self {
            conn: Connection::open(config)?,
        })
    }

    /// Connect over an already constructed transport
    pub fn open_with_transport(
        transport: Box<dyn Transport>,
        config: ConnectionConfig,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            conn: Connection::open_with_transport(transport, config)?,
        })
    }

    /// The underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// The underlying connection, mutably
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Board identity resolved during the handshake
    pub fn identity(&self) -> Option<&Identity> {
        self.conn.identity()
    }

    /// Execute a utility operation
    pub fn utility(&mut self, cmd: UtilityCmd) -> Result<StructuredReply, ProtocolError> {
        self.conn.request(&cmd.command())
    }

    /// Execute a DAC operation on the given channel
    pub fn dac(
        &mut self,
        channel: DacChannel,
        cmd: DacCmd,
    ) -> Result<StructuredReply, ProtocolError> {
        self.conn.request(&cmd.command(channel))
    }

    /// Execute an ADC operation
    pub fn adc(&mut self, cmd: AdcCmd) -> Result<StructuredReply, ProtocolError> {
        self.conn.request(&cmd.command())
    }

    /// Read the latest ADC conversion result as an integer
    pub fn adc_read(&mut self) -> Result<i64, ProtocolError> {
        self.adc(AdcCmd::Get)?.int_value()
    }

    /// Set a GPIO power-rail line
    pub fn gpio_set(
        &mut self,
        line: GpioLine,
        value: u32,
    ) -> Result<StructuredReply, ProtocolError> {
        self.conn.request(&line.set(value))
    }

    /// Query the power status word
    pub fn power_status(&mut self) -> Result<i64, ProtocolError> {
        self.conn.request(&power_status_command())?.int_value()
    }

    /// Set the pulse timer duration
    ///
    /// The board echoes the value back; a mismatched echo is surfaced as an
    /// error rather than ignored.
    pub fn timer_duration(&mut self, ticks: u32) -> Result<StructuredReply, ProtocolError> {
        let reply = self.conn.request(&TimerCmd::Duration(ticks).command())?;
        if reply.int_value()? != ticks as i64 {
            return Err(ProtocolError::InvalidField {
                field: "timer duration echo",
                value: reply.value().to_string(),
            });
        }
        Ok(reply)
    }

    /// Execute an application operation with a text reply
    pub fn application(&mut self, cmd: AppCmd) -> Result<StructuredReply, ProtocolError> {
        self.conn.request(&cmd.command())
    }

    /// Trigger a pulse acquisition and return the raw sample bytes
    pub fn pulse(&mut self, value: u32) -> Result<Vec<u8>, ProtocolError> {
        self.conn.request_pulse(&pulse_command(value))
    }

    /// Execute an I/O-expander operation
    pub fn io_expander(&mut self, cmd: IoExpanderCmd) -> Result<StructuredReply, ProtocolError> {
        self.conn.request(&cmd.command())
    }

    /// Execute a reset/boot operation
    pub fn reset(&mut self, cmd: ResetCmd) -> Result<StructuredReply, ProtocolError> {
        self.conn.request(&cmd.command())
    }

    /// Execute an Ethernet-configuration operation
    pub fn ethernet(&mut self, cmd: EthernetCmd) -> Result<StructuredReply, ProtocolError> {
        self.conn.request(&cmd.command())
    }

    /// Query the board's IPv4 address
    pub fn board_ip(&mut self) -> Result<Ipv4Addr, ProtocolError> {
        let reply = self.ethernet(EthernetCmd::GetIp)?;
        let value = reply.value();
        let wire: u32 = value
            .trim()
            .parse()
            .map_err(|_| ProtocolError::InvalidField {
                field: "ip address",
                value: value.to_string(),
            })?;
        Ok(actions::ip_from_wire(wire))
    }

    /// Scan the I2C bus and return the addresses the board reports
    pub fn scan_i2c(&mut self) -> Result<Vec<String>, ProtocolError> {
        self.conn.scan_i2c()
    }
}
