//! Acknowledgment decoding over the channel's receive buffer.
//!
//! Decoding is a pure function of the buffered bytes; the caller applies the
//! returned `consumed` count to the channel.

use crate::wire::AckCode;

/// What to do when the first buffered byte is not the expected code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MismatchPolicy {
    /// Report the byte and leave it in the buffer.
    #[default]
    Error,
    /// Treat non-matching bytes as line noise and drop them.
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Matched,
    Absent,
    Unexpected(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    pub verdict: Verdict,
    /// Bytes to remove from the front of the buffer.
    pub consumed: usize,
}

pub fn decode(buffered: &[u8], expected: AckCode, policy: MismatchPolicy) -> Decoded {
    let want = expected.byte();
    match policy {
        MismatchPolicy::Error => match buffered.first() {
            None => Decoded {
                verdict: Verdict::Absent,
                consumed: 0,
            },
            Some(&b) if b == want => Decoded {
                verdict: Verdict::Matched,
                consumed: 1,
            },
            Some(&b) => Decoded {
                verdict: Verdict::Unexpected(b),
                consumed: 0,
            },
        },
        MismatchPolicy::Discard => match buffered.iter().position(|&b| b == want) {
            Some(i) => Decoded {
                verdict: Verdict::Matched,
                consumed: i + 1,
            },
            None => Decoded {
                verdict: Verdict::Absent,
                consumed: buffered.len(),
            },
        },
    }
}
