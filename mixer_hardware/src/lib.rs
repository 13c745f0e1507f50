//! Command channel implementations for the mixing machine.
//!
//! - `SimulatedChannel`: in-memory transport with fault injection and an
//!   optional responder that plays the machine's side of the protocol.
//! - `DeviceChannel`: any byte stream (typically a tty device file) with a
//!   background reader thread.
pub mod device;
pub mod error;

pub use device::DeviceChannel;
pub use error::HwError;

use mixer_traits::clock::Clock;
use mixer_traits::{ChannelError, CommandChannel};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Answers commands the way the controller firmware would, after a fixed latency.
struct Responder {
    clock: Arc<dyn Clock + Send + Sync>,
    latency: Duration,
    /// (first word of the command, ack byte)
    replies: Vec<(Vec<u8>, u8)>,
    silent: bool,
    noise: Option<u8>,
    scheduled: VecDeque<(Instant, u8)>,
}

impl Responder {
    fn schedule(&mut self, payload: &[u8]) {
        if self.silent {
            return;
        }
        let word = payload.split(|b| *b == b' ').next().unwrap_or_default();
        let Some(ack) = self
            .replies
            .iter()
            .find(|(w, _)| w.as_slice() == word)
            .map(|(_, a)| *a)
        else {
            tracing::debug!(
                command = %String::from_utf8_lossy(payload),
                "simulator has no reply for command"
            );
            return;
        };
        let due = self.clock.now() + self.latency;
        if let Some(n) = self.noise.take() {
            self.scheduled.push_back((due, n));
        }
        self.scheduled.push_back((due, ack));
    }

    fn release_due(&mut self, rx: &mut Vec<u8>) {
        let now = self.clock.now();
        while let Some((due, _)) = self.scheduled.front() {
            if *due > now {
                break;
            }
            if let Some((_, b)) = self.scheduled.pop_front() {
                rx.push(b);
            }
        }
    }
}

/// Simulated command channel.
///
/// Without a responder nothing is ever received unless a test injects bytes.
/// Every accepted send is recorded so callers can assert exactly what went
/// over the wire.
pub struct SimulatedChannel {
    rx: Vec<u8>,
    sent: Vec<Vec<u8>>,
    connected: bool,
    reject_sends: bool,
    responder: Option<Responder>,
}

impl Default for SimulatedChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedChannel {
    pub fn new() -> Self {
        Self {
            rx: Vec::new(),
            sent: Vec::new(),
            connected: true,
            reject_sends: false,
            responder: None,
        }
    }

    /// Channel that acknowledges known commands `latency` after they are sent,
    /// measured on `clock`. Register replies with `reply_to`.
    pub fn responsive(clock: Arc<dyn Clock + Send + Sync>, latency: Duration) -> Self {
        let mut ch = Self::new();
        ch.responder = Some(Responder {
            clock,
            latency,
            replies: Vec::new(),
            silent: false,
            noise: None,
            scheduled: VecDeque::new(),
        });
        ch
    }

    /// Acknowledge commands whose first word is `word` with `ack`.
    /// No-op without a responder.
    pub fn reply_to(mut self, word: &str, ack: u8) -> Self {
        if let Some(r) = self.responder.as_mut() {
            r.replies.push((word.as_bytes().to_vec(), ack));
        }
        self
    }

    /// Keep accepting commands but never answer them.
    pub fn silent(mut self, silent: bool) -> Self {
        if let Some(r) = self.responder.as_mut() {
            r.silent = silent;
        }
        self
    }

    /// Emit one stray byte ahead of the next reply.
    pub fn with_noise(mut self, byte: u8) -> Self {
        if let Some(r) = self.responder.as_mut() {
            r.noise = Some(byte);
        }
        self
    }

    /// Append bytes as if the controller had sent them.
    pub fn inject(&mut self, bytes: &[u8]) {
        self.rx.extend_from_slice(bytes);
    }

    pub fn disconnect(&mut self) {
        self.connected = false;
    }

    pub fn reconnect(&mut self) {
        self.connected = true;
    }

    /// Make every subsequent send fail while the link stays up.
    pub fn set_reject_sends(&mut self, reject: bool) {
        self.reject_sends = reject;
    }

    /// Payloads accepted so far, in send order.
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    /// Received bytes not yet consumed (does not release scheduled replies).
    pub fn buffered(&self) -> &[u8] {
        &self.rx
    }
}

impl CommandChannel for SimulatedChannel {
    fn send(&mut self, payload: &[u8]) -> Result<(), ChannelError> {
        if !self.connected {
            return Err(Box::new(HwError::Disconnected));
        }
        if self.reject_sends {
            return Err(Box::new(HwError::Rejected("simulated write failure".into())));
        }
        tracing::trace!(command = %String::from_utf8_lossy(payload), "sim send");
        self.sent.push(payload.to_vec());
        if let Some(r) = self.responder.as_mut() {
            r.schedule(payload);
        }
        Ok(())
    }

    fn available_bytes(&mut self) -> Result<&[u8], ChannelError> {
        if let Some(r) = self.responder.as_mut() {
            r.release_due(&mut self.rx);
        }
        if !self.connected && self.rx.is_empty() {
            return Err(Box::new(HwError::Disconnected));
        }
        Ok(&self.rx)
    }

    fn consume(&mut self, n: usize) {
        let n = n.min(self.rx.len());
        self.rx.drain(..n);
    }
}
