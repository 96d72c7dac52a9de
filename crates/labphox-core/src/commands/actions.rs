//! Typed command catalog
//!
//! Closed per-subsystem enums mapping symbolic operations onto wire command
//! descriptors. Every variant corresponds to exactly one wire command, so an
//! unknown operation is a compile-time impossibility rather than a silent
//! no-op.

use std::net::Ipv4Addr;

use crate::protocol::{Argument, Command, ExpanderPort, Subsystem};

/// Utility/identity operations (subsystem `2`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtilityCmd {
    /// Query the board name
    Name,
    /// Query the firmware version string
    Firmware,
    /// Query the connected flag
    Connected,
    /// Query the hardware revision
    HardwareId,
    /// Query the serial number
    SerialNumber,
    /// Query the channel count
    Channels,
    /// Put the board to sleep for the given number of time units
    Sleep(u32),
}

impl UtilityCmd {
    /// The wire command for this operation
    pub fn command(&self) -> Command {
        let (action, argument) = match self {
            UtilityCmd::Name => ('A', Argument::None),
            UtilityCmd::Firmware => ('B', Argument::None),
            UtilityCmd::Connected => ('C', Argument::None),
            UtilityCmd::HardwareId => ('D', Argument::None),
            UtilityCmd::SerialNumber => ('E', Argument::None),
            UtilityCmd::Channels => ('F', Argument::None),
            UtilityCmd::Sleep(v) => ('S', Argument::Int(*v as i64)),
        };
        Command::new(Subsystem::Utility, action, argument)
    }
}

/// Which of the two DACs a command addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DacChannel {
    /// First DAC (subsystem `5`)
    Dac1,
    /// Second DAC (subsystem `8`)
    Dac2,
}

impl DacChannel {
    fn subsystem(&self) -> Subsystem {
        match self {
            DacChannel::Dac1 => Subsystem::Dac1,
            DacChannel::Dac2 => Subsystem::Dac2,
        }
    }
}

/// DAC operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DacCmd {
    /// Enable the DAC output
    On,
    /// Disable the DAC output
    Off,
    /// Set the output code
    Set(u32),
    /// Set the buffer configuration
    Buffer(u32),
}

impl DacCmd {
    /// The wire command for this operation on the given DAC
    pub fn command(&self, channel: DacChannel) -> Command {
        let (action, argument) = match self {
            DacCmd::On => ('T', Argument::Int(1)),
            DacCmd::Off => ('T', Argument::Int(0)),
            DacCmd::Set(v) => ('S', Argument::Int(*v as i64)),
            DacCmd::Buffer(v) => ('B', Argument::Int(*v as i64)),
        };
        Command::new(channel.subsystem(), action, argument)
    }
}

/// ADC operations (subsystem `4`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdcCmd {
    /// Select the input channel
    Channel(u32),
    /// Start continuous conversion
    Start,
    /// Stop continuous conversion
    Stop,
    /// Select a channel and take one sample
    SelectAndSample(u32),
    /// Read the latest conversion result
    Get,
}

impl AdcCmd {
    /// The wire command for this operation
    pub fn command(&self) -> Command {
        let (action, argument) = match self {
            AdcCmd::Channel(v) => ('C', Argument::Int(*v as i64)),
            AdcCmd::Start => ('T', Argument::Int(1)),
            AdcCmd::Stop => ('T', Argument::Int(0)),
            AdcCmd::SelectAndSample(v) => ('S', Argument::Int(*v as i64)),
            AdcCmd::Get => ('G', Argument::None),
        };
        Command::new(Subsystem::Adc, action, argument)
    }
}

/// GPIO power-rail lines (subsystem `1`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioLine {
    /// 3.3 V rail enable
    En3v3,
    /// 5 V rail enable
    En5v,
    /// Charge-pump enable
    EnChgp,
    /// Forced power enable
    ForcePwrEn,
    /// Main power enable
    PwrEn,
    /// DC-DC converter enable
    DcdcEn,
    /// Chopping enable
    ChoppingEn,
}

impl GpioLine {
    fn action(&self) -> char {
        match self {
            GpioLine::En3v3 => 'A',
            GpioLine::En5v => 'B',
            GpioLine::EnChgp => 'C',
            GpioLine::ForcePwrEn => 'D',
            GpioLine::PwrEn => 'E',
            GpioLine::DcdcEn => 'F',
            GpioLine::ChoppingEn => 'G',
        }
    }

    /// The wire command setting this line to `value`
    pub fn set(&self, value: u32) -> Command {
        Command::new(Subsystem::Gpio, self.action(), Argument::Int(value as i64))
    }
}

/// The wire command querying the power status word (`1:H:0`)
pub fn power_status_command() -> Command {
    Command::new(Subsystem::Gpio, 'H', Argument::Int(0))
}

/// Timer operations (subsystem `0`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCmd {
    /// Set the pulse duration; the board echoes the value back
    Duration(u32),
}

impl TimerCmd {
    /// The wire command for this operation
    pub fn command(&self) -> Command {
        match self {
            TimerCmd::Duration(v) => {
                Command::new(Subsystem::Timer, 'A', Argument::Int(*v as i64))
            }
        }
    }
}

/// Application-level operations with text replies (subsystem `3`)
///
/// Pulse acquisition lives on [`Device::pulse`](super::Device::pulse)
/// instead, because its reply is a binary packet rather than text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCmd {
    /// Trigger an acquisition
    Acquire(u32),
    /// Set the actuation voltage
    Voltage(u32),
}

impl AppCmd {
    /// The wire command for this operation
    pub fn command(&self) -> Command {
        let (action, argument) = match self {
            AppCmd::Acquire(v) => ('Q', Argument::Int(*v as i64)),
            AppCmd::Voltage(v) => ('V', Argument::Int(*v as i64)),
        };
        Command::new(Subsystem::Application, action, argument)
    }
}

/// The wire command for a pulse acquisition (`3:T`, binary packet reply)
pub fn pulse_command(value: u32) -> Command {
    Command::new(Subsystem::Application, 'T', Argument::Int(value as i64))
}

/// I/O-expander operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoExpanderCmd {
    /// Route a switch contact through the given port
    Connect {
        /// Port the contact hangs off
        port: ExpanderPort,
        /// Contact number
        value: u32,
    },
    /// Release a switch contact on the given port
    Disconnect {
        /// Port the contact hangs off
        port: ExpanderPort,
        /// Contact number
        value: u32,
    },
    /// Drive an expander output high (subsystem `6`)
    On(u32),
    /// Drive an expander output low (subsystem `6`)
    Off(u32),
    /// Set the expander output type (subsystem `6`)
    OutputType(u32),
}

impl IoExpanderCmd {
    /// The wire command for this operation
    pub fn command(&self) -> Command {
        match self {
            IoExpanderCmd::Connect { port, value } => Command::new(
                Subsystem::Port(*port),
                'C',
                Argument::Int(*value as i64),
            ),
            IoExpanderCmd::Disconnect { port, value } => Command::new(
                Subsystem::Port(*port),
                'D',
                Argument::Int(*value as i64),
            ),
            IoExpanderCmd::On(v) => {
                Command::new(Subsystem::IoExpander, 'O', Argument::Int(*v as i64))
            }
            IoExpanderCmd::Off(v) => {
                Command::new(Subsystem::IoExpander, 'U', Argument::Int(*v as i64))
            }
            IoExpanderCmd::OutputType(v) => {
                Command::new(Subsystem::IoExpander, 'S', Argument::Int(*v as i64))
            }
        }
    }
}

/// Reset/boot operations (subsystem `7`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetCmd {
    /// Reset the firmware
    Reset,
    /// Reboot into the DFU bootloader
    Boot,
}

impl ResetCmd {
    /// The wire command for this operation
    pub fn command(&self) -> Command {
        let action = match self {
            ResetCmd::Reset => 'R',
            ResetCmd::Boot => 'B',
        };
        Command::new(Subsystem::Reset, action, Argument::None)
    }
}

/// Ethernet configuration operations (subsystem `Q`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EthernetCmd {
    /// Read a configuration register
    Read(u32),
    /// Set the board's IPv4 address
    SetIp(Ipv4Addr),
    /// Query the board's IPv4 address
    GetIp,
}

impl EthernetCmd {
    /// The wire command for this operation
    ///
    /// IPv4 addresses go over the wire as the decimal rendering of the
    /// little-endian interpretation of their octets.
    pub fn command(&self) -> Command {
        let (action, argument) = match self {
            EthernetCmd::Read(v) => ('R', Argument::Int(*v as i64)),
            EthernetCmd::SetIp(ip) => (
                'I',
                Argument::Int(u32::from_le_bytes(ip.octets()) as i64),
            ),
            EthernetCmd::GetIp => ('G', Argument::Int(0)),
        };
        Command::new(Subsystem::EthernetConfig, action, argument)
    }
}

/// Decode an IPv4 address from its little-endian integer wire form
pub(crate) fn ip_from_wire(value: u32) -> Ipv4Addr {
    Ipv4Addr::from(value.to_le_bytes())
}
