//! Type-state builder for `Sequencer`.
//!
//! `build()` only exists once a channel has been provided; `try_build()` is
//! always available and reports what is missing.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use mixer_traits::CommandChannel;
use mixer_traits::clock::{Clock, MonotonicClock};

use crate::config::{FailurePolicy, MismatchPolicy, ProtocolCfg};
use crate::error::{BuildError, Result};
use crate::sequencer::Sequencer;

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

pub struct SequencerBuilder<C, S> {
    channel: Option<C>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    protocol: ProtocolCfg,
    on_failure: FailurePolicy,
    _s: PhantomData<S>,
}

impl<C: CommandChannel> Sequencer<C> {
    /// Start building a Sequencer.
    pub fn builder() -> SequencerBuilder<C, Missing> {
        SequencerBuilder {
            channel: None,
            clock: None,
            protocol: ProtocolCfg::default(),
            on_failure: FailurePolicy::default(),
            _s: PhantomData,
        }
    }
}

impl<C: CommandChannel> SequencerBuilder<C, Missing> {
    pub fn with_channel(self, channel: C) -> SequencerBuilder<C, Set> {
        SequencerBuilder {
            channel: Some(channel),
            clock: self.clock,
            protocol: self.protocol,
            on_failure: self.on_failure,
            _s: PhantomData,
        }
    }
}

/// Chainable setters that do not affect type-state.
impl<C: CommandChannel, S> SequencerBuilder<C, S> {
    pub fn with_protocol(mut self, protocol: ProtocolCfg) -> Self {
        self.protocol = protocol;
        self
    }
    /// Default acknowledgment deadline; `None` waits forever.
    pub fn with_ack_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.protocol.ack_timeout = timeout;
        self
    }
    pub fn with_mismatch_policy(mut self, policy: MismatchPolicy) -> Self {
        self.protocol.mismatch = policy;
        self
    }
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }
    /// Provide a custom clock implementation; defaults to `MonotonicClock` when not provided.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Fallible build available in any type-state.
    pub fn try_build(self) -> Result<Sequencer<C>> {
        let channel = self
            .channel
            .ok_or_else(|| eyre::Report::new(BuildError::MissingChannel))?;
        if self.protocol.ack_timeout == Some(Duration::ZERO) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "ack timeout must be > 0 (use None to wait forever)",
            )));
        }
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        Ok(Sequencer::from_parts(
            channel,
            clock,
            self.protocol,
            self.on_failure,
        ))
    }
}

impl<C: CommandChannel> SequencerBuilder<C, Set> {
    /// Validate and build. Only available once a channel is set.
    pub fn build(self) -> Result<Sequencer<C>> {
        self.try_build()
    }
}
