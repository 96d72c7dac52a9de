//! Reply recognition and reassembly
//!
//! The board answers in one of two shapes:
//!
//! - *Text replies*: ASCII up to a `;` delimiter, further split on `:` into
//!   a [`StructuredReply`].
//! - *Packet replies*: binary of unknown length, terminated by the 4-byte
//!   sentinel [`PACKET_SENTINEL`] and prefixed by an echo of the command
//!   that was sent.
//!
//! The [`Reassembler`] accumulates transport chunks (partial serial reads or
//! whole datagrams) until one of these termination conditions holds, and
//! enforces the overall timeout budget. Callers never see partial data.

use std::time::{Duration, Instant};

use super::ProtocolError;

/// Terminal sentinel for binary packet replies
pub const PACKET_SENTINEL: [u8; 4] = [0x00, 0xFF, 0x00, 0xFF];

/// Length of the fixed header at the front of a pulse-acquisition reply
pub const PULSE_HEADER_LEN: usize = 7;

/// How many trailing bytes of the accumulator are searched for the sentinel
const SENTINEL_WINDOW: usize = 5;

/// A text reply decomposed into colon-separated fields
///
/// Splitting is purely syntactic: no field count is validated, and an empty
/// trailing field yields an empty [`value`](StructuredReply::value) rather
/// than an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredReply {
    raw: String,
}

impl StructuredReply {
    /// Wrap a raw text reply (delimiter already stripped)
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// The full reply text
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// All colon-separated fields
    pub fn fields(&self) -> Vec<&str> {
        self.raw.split(':').collect()
    }

    /// The designated value field (the final colon-separated token)
    pub fn value(&self) -> &str {
        self.raw.rsplit(':').next().unwrap_or("")
    }

    /// Everything but the value field (the echoed command path)
    pub fn command_path(&self) -> Vec<&str> {
        let fields = self.fields();
        fields[..fields.len().saturating_sub(1)].to_vec()
    }

    /// Parse the value field as an integer
    pub fn int_value(&self) -> Result<i64, ProtocolError> {
        let value = self.value();
        value
            .trim()
            .parse()
            .map_err(|_| ProtocolError::InvalidField {
                field: "value",
                value: value.to_string(),
            })
    }
}

/// Reply termination policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Complete when the accumulator contains this byte; the reply is
    /// everything before its first occurrence. Bytes after it are
    /// discarded (the protocol never pipelines).
    Delimited(u8),
    /// Complete when the sentinel appears within the trailing
    /// [`SENTINEL_WINDOW`] bytes of the accumulator.
    ///
    /// Only the tail window is checked, matching the board firmware's
    /// framing: the firmware never emits the sentinel mid-payload, and
    /// checking only the tail keeps wire compatibility with it. The
    /// extracted reply has the sentinel removed from the end and `echo`
    /// removed from the front by exact byte comparison; an echo mismatch is
    /// a [`ProtocolError::Desync`].
    Sentinel {
        /// The terminal byte sequence
        sentinel: [u8; 4],
        /// The command bytes the board echoes ahead of the payload
        echo: Vec<u8>,
    },
}

/// Accumulates transport chunks until a complete reply is recognized
///
/// One `Reassembler` serves exactly one request; the timeout budget is
/// re-armed by constructing a fresh instance.
#[derive(Debug)]
pub struct Reassembler {
    acc: Vec<u8>,
    termination: Termination,
    started: Instant,
    budget: Duration,
}

impl Reassembler {
    /// Start reassembly for one request
    pub fn new(termination: Termination, budget: Duration) -> Self {
        Self {
            acc: Vec::new(),
            termination,
            started: Instant::now(),
            budget,
        }
    }

    /// Append a chunk of transport bytes
    pub fn feed(&mut self, chunk: &[u8]) {
        self.acc.extend_from_slice(chunk);
    }

    /// Number of bytes accumulated so far
    pub fn len(&self) -> usize {
        self.acc.len()
    }

    /// Whether nothing has been accumulated yet
    pub fn is_empty(&self) -> bool {
        self.acc.is_empty()
    }

    /// Evaluate the termination condition against the accumulated bytes
    ///
    /// Returns `Ok(Some(reply))` once a complete reply is recognized,
    /// `Ok(None)` while more bytes are needed, or an error when the
    /// echoed prefix of a packet reply does not match.
    pub fn poll_complete(&self) -> Result<Option<Vec<u8>>, ProtocolError> {
        match &self.termination {
            Termination::Delimited(delim) => {
                match self.acc.iter().position(|b| b == delim) {
                    Some(pos) => Ok(Some(self.acc[..pos].to_vec())),
                    None => Ok(None),
                }
            }
            Termination::Sentinel { sentinel, echo } => {
                let window_start = self.acc.len().saturating_sub(SENTINEL_WINDOW);
                let window = &self.acc[window_start..];
                let hit = window
                    .windows(sentinel.len())
                    .position(|w| w == sentinel);
                let Some(pos) = hit else {
                    return Ok(None);
                };

                let body = &self.acc[..window_start + pos];
                if !body.starts_with(echo) {
                    return Err(ProtocolError::Desync {
                        expected: echo.clone(),
                        got: body[..body.len().min(echo.len())].to_vec(),
                    });
                }
                Ok(Some(body[echo.len()..].to_vec()))
            }
        }
    }

    /// Fail the request if the timeout budget is exhausted
    pub fn check_timeout(&self) -> Result<(), ProtocolError> {
        if self.started.elapsed() >= self.budget {
            Err(ProtocolError::Timeout {
                budget: self.budget,
            })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn delimited() -> Reassembler {
        Reassembler::new(Termination::Delimited(b';'), Duration::from_secs(1))
    }

    #[test]
    fn test_delimited_incomplete_then_complete() {
        let mut r = delimited();
        r.feed(b"2:A:LABPHOX-01");
        assert_eq!(r.poll_complete().unwrap(), None);
        r.feed(b";");
        assert_eq!(r.poll_complete().unwrap(), Some(b"2:A:LABPHOX-01".to_vec()));
    }

    #[test]
    fn test_delimited_discards_trailing_bytes() {
        let mut r = delimited();
        r.feed(b"reply;stray-bytes");
        assert_eq!(r.poll_complete().unwrap(), Some(b"reply".to_vec()));
    }

    #[test]
    fn test_delimited_spanning_datagrams() {
        let mut r = delimited();
        r.feed(b"rep");
        assert_eq!(r.poll_complete().unwrap(), None);
        r.feed(b"ly;");
        assert_eq!(r.poll_complete().unwrap(), Some(b"reply".to_vec()));
    }

    #[test]
    fn test_sentinel_exact_scenario() {
        let mut r = Reassembler::new(
            Termination::Sentinel {
                sentinel: PACKET_SENTINEL,
                echo: b"W:3:T:1;".to_vec(),
            },
            Duration::from_secs(1),
        );
        r.feed(b"W:3:T:1;");
        assert_eq!(r.poll_complete().unwrap(), None);
        r.feed(b"\x01\x02\x03");
        assert_eq!(r.poll_complete().unwrap(), None);
        r.feed(b"\x00\xff\x00\xff");
        assert_eq!(r.poll_complete().unwrap(), Some(vec![0x01, 0x02, 0x03]));
    }

    #[test]
    fn test_sentinel_split_across_reads() {
        let mut r = Reassembler::new(
            Termination::Sentinel {
                sentinel: PACKET_SENTINEL,
                echo: b"W:3:T:1;".to_vec(),
            },
            Duration::from_secs(1),
        );
        r.feed(b"W:3:T:1;\xaa\xbb\x00\xff");
        assert_eq!(r.poll_complete().unwrap(), None);
        r.feed(b"\x00\xff");
        assert_eq!(r.poll_complete().unwrap(), Some(vec![0xaa, 0xbb]));
    }

    #[test]
    fn test_sentinel_payload_sharing_sentinel_bytes_survives() {
        // Exact-length strip: a payload that begins or ends with bytes equal
        // to sentinel bytes must not be truncated.
        let mut r = Reassembler::new(
            Termination::Sentinel {
                sentinel: PACKET_SENTINEL,
                echo: b"W:3:T:1;".to_vec(),
            },
            Duration::from_secs(1),
        );
        r.feed(b"W:3:T:1;\x00\x01\x00");
        r.feed(&PACKET_SENTINEL);
        assert_eq!(r.poll_complete().unwrap(), Some(vec![0x00, 0x01, 0x00]));
    }

    #[test]
    fn test_sentinel_echo_mismatch_is_desync() {
        let mut r = Reassembler::new(
            Termination::Sentinel {
                sentinel: PACKET_SENTINEL,
                echo: b"W:3:T:1;".to_vec(),
            },
            Duration::from_secs(1),
        );
        r.feed(b"W:9:X:0;\x01\x02");
        r.feed(&PACKET_SENTINEL);
        assert!(matches!(
            r.poll_complete(),
            Err(ProtocolError::Desync { .. })
        ));
    }

    #[test]
    fn test_timeout_check() {
        let r = Reassembler::new(Termination::Delimited(b';'), Duration::from_millis(0));
        assert!(matches!(
            r.check_timeout(),
            Err(ProtocolError::Timeout { .. })
        ));
    }

    #[test]
    fn test_structured_reply_fields_and_value() {
        let reply = StructuredReply::new("2:A:LABPHOX-01");
        assert_eq!(reply.fields(), vec!["2", "A", "LABPHOX-01"]);
        assert_eq!(reply.command_path(), vec!["2", "A"]);
        assert_eq!(reply.value(), "LABPHOX-01");
    }

    #[test]
    fn test_structured_reply_empty_value() {
        let reply = StructuredReply::new("2:A:");
        assert_eq!(reply.value(), "");
        assert_eq!(reply.fields(), vec!["2", "A", ""]);
    }

    #[test]
    fn test_structured_reply_int_value() {
        let reply = StructuredReply::new("4:G:1023");
        assert_eq!(reply.int_value().unwrap(), 1023);

        let bad = StructuredReply::new("4:G:abc");
        assert!(matches!(
            bad.int_value(),
            Err(ProtocolError::InvalidField { .. })
        ));
    }
}
