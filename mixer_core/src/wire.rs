//! Wire vocabulary of the machine controller.
//!
//! Commands are plain ASCII written in one piece (the channel owns framing);
//! completion is signalled by a single ASCII byte per command.

use std::fmt;

/// Single-byte acknowledgment code. Always ASCII.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AckCode(u8);

impl AckCode {
    pub const fn new(byte: u8) -> Option<Self> {
        if byte.is_ascii() { Some(Self(byte)) } else { None }
    }

    #[inline]
    pub const fn byte(self) -> u8 {
        self.0
    }
}

impl fmt::Display for AckCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.escape_ascii())
    }
}

impl TryFrom<char> for AckCode {
    type Error = InvalidAck;
    fn try_from(c: char) -> Result<Self, Self::Error> {
        u8::try_from(c)
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| InvalidAck(c.to_string()))
    }
}

impl TryFrom<&str> for AckCode {
    type Error = InvalidAck;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::try_from(c),
            _ => Err(InvalidAck(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("acknowledgment must be a single ASCII character, got {0:?}")]
pub struct InvalidAck(pub String);

pub const TARE_COMMAND: &str = "tare";
pub const DISPENSE_COMMAND: &str = "dispense";
pub const MIX_COMMAND: &str = "mix";

pub const TARE_ACK: AckCode = AckCode(b't');
pub const DISPENSE_ACK: AckCode = AckCode(b'd');
pub const MIX_ACK: AckCode = AckCode(b'm');

/// Command words the controller firmware acknowledges, with their codes.
pub const KNOWN_REPLIES: [(&str, AckCode); 3] = [
    (TARE_COMMAND, TARE_ACK),
    (DISPENSE_COMMAND, DISPENSE_ACK),
    (MIX_COMMAND, MIX_ACK),
];
