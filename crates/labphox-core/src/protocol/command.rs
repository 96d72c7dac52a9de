//! Command model and wire encoding
//!
//! A [`Command`] is an immutable descriptor of one request to the board:
//! a subsystem selector, a single-letter action code, and an optional
//! argument. It serializes to the fixed grammar
//! `W:<subsystem>:<action>:<argument>;` (the leading `W` is the write
//! token; the argument field may be empty).
//!
//! This layer performs no validation of subsystem/action legality. Invalid
//! combinations are a contract violation of the caller (the typed command
//! layer in [`crate::commands`]), not of the encoder.

use std::fmt;

/// Functional group addressed by a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    /// Timer peripheral (`0`)
    Timer,
    /// GPIO power rails (`1`)
    Gpio,
    /// Utility/identity (`2`)
    Utility,
    /// Application-level operations such as pulse acquisition (`3`)
    Application,
    /// ADC sampling (`4`)
    Adc,
    /// First DAC (`5`)
    Dac1,
    /// I/O expander global operations (`6`)
    IoExpander,
    /// Reset/boot control (`7`)
    Reset,
    /// Second DAC (`8`)
    Dac2,
    /// Ethernet configuration (`Q`)
    EthernetConfig,
    /// One port of the I/O expander, addressed by letter
    Port(ExpanderPort),
}

impl Subsystem {
    /// Wire selector character for this subsystem
    pub fn selector(&self) -> char {
        match self {
            Subsystem::Timer => '0',
            Subsystem::Gpio => '1',
            Subsystem::Utility => '2',
            Subsystem::Application => '3',
            Subsystem::Adc => '4',
            Subsystem::Dac1 => '5',
            Subsystem::IoExpander => '6',
            Subsystem::Reset => '7',
            Subsystem::Dac2 => '8',
            Subsystem::EthernetConfig => 'Q',
            Subsystem::Port(port) => port.letter(),
        }
    }
}

/// I/O expander port selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpanderPort {
    /// Port A
    A,
    /// Port B
    B,
    /// Port C
    C,
    /// Port D
    D,
    /// Port E
    E,
    /// Port F
    F,
}

impl ExpanderPort {
    /// Wire selector letter for this port
    pub fn letter(&self) -> char {
        match self {
            ExpanderPort::A => 'A',
            ExpanderPort::B => 'B',
            ExpanderPort::C => 'C',
            ExpanderPort::D => 'D',
            ExpanderPort::E => 'E',
            ExpanderPort::F => 'F',
        }
    }
}

/// Optional command argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    /// No argument; renders as an empty field (two adjacent colons)
    None,
    /// Integer argument, rendered in plain decimal with no padding
    Int(i64),
    /// Literal text argument
    Text(String),
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::None => Ok(()),
            Argument::Int(v) => write!(f, "{}", v),
            Argument::Text(s) => f.write_str(s),
        }
    }
}

/// One request to the board, created per call and not retained
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    token: char,
    subsystem: Subsystem,
    action: char,
    argument: Argument,
}

impl Command {
    /// Create a write command (the common case)
    pub fn new(subsystem: Subsystem, action: char, argument: Argument) -> Self {
        Self {
            token: 'W',
            subsystem,
            action,
            argument,
        }
    }

    /// Create a read command (`R` token; used only by the I2C bus scan)
    pub fn read(subsystem: Subsystem, action: char, argument: Argument) -> Self {
        Self {
            token: 'R',
            subsystem,
            action,
            argument,
        }
    }

    /// The subsystem this command addresses
    pub fn subsystem(&self) -> Subsystem {
        self.subsystem
    }

    /// The action code within the subsystem
    pub fn action(&self) -> char {
        self.action
    }

    /// The command argument
    pub fn argument(&self) -> &Argument {
        &self.argument
    }

    /// Render the ASCII wire form as a string
    pub fn wire_string(&self) -> String {
        format!(
            "{}:{}:{}:{};",
            self.token,
            self.subsystem.selector(),
            self.action,
            self.argument
        )
    }

    /// Encode to the bytes that go on the wire
    pub fn encode(&self) -> Vec<u8> {
        self.wire_string().into_bytes()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire_string())
    }
}
