pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Boxed error used at trait boundaries so transports can surface their own types.
pub type ChannelError = Box<dyn std::error::Error + Send + Sync>;

/// Byte-oriented link to the machine controller.
///
/// Implementations never block: `send` only reports whether the transport
/// accepted the write, and `available_bytes` returns whatever has been received
/// so far without waiting for more.
pub trait CommandChannel {
    /// Hand one command payload to the transport.
    fn send(&mut self, payload: &[u8]) -> Result<(), ChannelError>;

    /// Received bytes not yet consumed, oldest first.
    fn available_bytes(&mut self) -> Result<&[u8], ChannelError>;

    /// Drop the first `n` received bytes. `n` larger than the buffer empties it.
    fn consume(&mut self, n: usize);
}

impl<T: CommandChannel + ?Sized> CommandChannel for Box<T> {
    fn send(&mut self, payload: &[u8]) -> Result<(), ChannelError> {
        (**self).send(payload)
    }

    fn available_bytes(&mut self) -> Result<&[u8], ChannelError> {
        (**self).available_bytes()
    }

    fn consume(&mut self, n: usize) {
        (**self).consume(n);
    }
}
