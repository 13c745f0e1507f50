//! One hardware operation as a state machine.
//!
//! NotStarted → Running → {Finished, Failed}. `start` sends the command
//! exactly once; `poll` inspects the channel's receive buffer without
//! blocking. All decisions for a running action are made by [`advance`], a
//! pure function of the buffered bytes and the time elapsed since `start`.

use std::fmt;
use std::time::{Duration, Instant};

use mixer_traits::CommandChannel;

use crate::decoder::{MismatchPolicy, Verdict, decode};
use crate::error::ActionError;
use crate::hw_error::{map_read_error, map_send_error};
use crate::util::duration_ms;
use crate::wire::{self, AckCode};

/// The closed set of operations the machine understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// Zero the scale before measuring.
    Tare,
    /// Run `pump` until `grams` have been added.
    Dispense { pump: u8, grams: u32 },
    /// Run the mixer for `duration`.
    Mix { duration: Duration },
    /// Pause without talking to the machine.
    Wait { duration: Duration },
    /// Machine-specific command with its own acknowledgment.
    Raw { command: String, ack: AckCode },
}

/// Identity of an action kind, without parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionTag {
    Tare,
    Dispense,
    Mix,
    Wait,
    Raw,
}

impl ActionTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionTag::Tare => "tare",
            ActionTag::Dispense => "dispense",
            ActionTag::Mix => "mix",
            ActionTag::Wait => "wait",
            ActionTag::Raw => "raw",
        }
    }
}

impl fmt::Display for ActionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an action talks to the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Protocol {
    /// Send `payload` once, then wait for `ack`.
    Command { payload: Vec<u8>, ack: AckCode },
    /// No command; done once the duration has elapsed.
    Timed(Duration),
}

impl ActionKind {
    pub fn tag(&self) -> ActionTag {
        match self {
            ActionKind::Tare => ActionTag::Tare,
            ActionKind::Dispense { .. } => ActionTag::Dispense,
            ActionKind::Mix { .. } => ActionTag::Mix,
            ActionKind::Wait { .. } => ActionTag::Wait,
            ActionKind::Raw { .. } => ActionTag::Raw,
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            ActionKind::Tare => Protocol::Command {
                payload: wire::TARE_COMMAND.as_bytes().to_vec(),
                ack: wire::TARE_ACK,
            },
            ActionKind::Dispense { pump, grams } => Protocol::Command {
                payload: format!("{} {pump} {grams}", wire::DISPENSE_COMMAND).into_bytes(),
                ack: wire::DISPENSE_ACK,
            },
            ActionKind::Mix { duration } => Protocol::Command {
                payload: format!("{} {}", wire::MIX_COMMAND, duration_ms(*duration)).into_bytes(),
                ack: wire::MIX_ACK,
            },
            ActionKind::Wait { duration } => Protocol::Timed(*duration),
            ActionKind::Raw { command, ack } => Protocol::Command {
                payload: command.as_bytes().to_vec(),
                ack: *ack,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    NotStarted,
    Running,
    Finished,
    Failed,
}

impl ActionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ActionState::Finished | ActionState::Failed)
    }
}

/// Result of `start`/`poll`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    Pending,
    Finished,
    Failed(ActionError),
}

/// Inputs to one transition of a running action.
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub buffered: &'a [u8],
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: ActionState,
    /// Bytes to remove from the channel buffer.
    pub consume: usize,
    pub error: Option<ActionError>,
}

/// Transition function for a running action.
///
/// An acknowledgment present in the buffer wins over an elapsed deadline.
pub fn advance(
    protocol: &Protocol,
    policy: MismatchPolicy,
    timeout: Option<Duration>,
    obs: Observation<'_>,
) -> Transition {
    let (expected, decoded) = match protocol {
        Protocol::Timed(d) => {
            let state = if obs.elapsed >= *d {
                ActionState::Finished
            } else {
                ActionState::Running
            };
            return Transition {
                state,
                consume: 0,
                error: None,
            };
        }
        Protocol::Command { ack, .. } => (*ack, decode(obs.buffered, *ack, policy)),
    };

    match decoded.verdict {
        Verdict::Matched => Transition {
            state: ActionState::Finished,
            consume: decoded.consumed,
            error: None,
        },
        Verdict::Unexpected(got) => Transition {
            state: ActionState::Failed,
            consume: decoded.consumed,
            error: Some(ActionError::UnexpectedAck { expected, got }),
        },
        Verdict::Absent => match timeout {
            Some(t) if obs.elapsed >= t => Transition {
                state: ActionState::Failed,
                consume: decoded.consumed,
                error: Some(ActionError::AckTimeout {
                    expected,
                    waited_ms: duration_ms(obs.elapsed),
                }),
            },
            _ => Transition {
                state: ActionState::Running,
                consume: decoded.consumed,
                error: None,
            },
        },
    }
}

#[derive(Debug)]
pub struct Action {
    kind: ActionKind,
    protocol: Protocol,
    timeout: Option<Duration>,
    policy: MismatchPolicy,
    state: ActionState,
    started_at: Option<Instant>,
    error: Option<ActionError>,
    commands_sent: u32,
}

impl Action {
    /// `timeout` bounds the wait for the acknowledgment; `None` waits forever.
    /// It has no effect on timed actions.
    pub fn new(kind: ActionKind, timeout: Option<Duration>, policy: MismatchPolicy) -> Self {
        let protocol = kind.protocol();
        Self {
            kind,
            protocol,
            timeout,
            policy,
            state: ActionState::NotStarted,
            started_at: None,
            error: None,
            commands_sent: 0,
        }
    }

    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    pub fn tag(&self) -> ActionTag {
        self.kind.tag()
    }

    pub fn state(&self) -> ActionState {
        self.state
    }

    pub fn error(&self) -> Option<&ActionError> {
        self.error.as_ref()
    }

    /// Commands handed to the channel so far (0 or 1).
    pub fn commands_sent(&self) -> u32 {
        self.commands_sent
    }

    /// Send the command and enter Running. Only effective from NotStarted.
    pub fn start<C: CommandChannel + ?Sized>(&mut self, channel: &mut C, now: Instant) -> Progress {
        if self.state != ActionState::NotStarted {
            return self.progress();
        }
        if let Protocol::Command { payload, .. } = &self.protocol {
            if let Err(e) = channel.send(payload) {
                let err = map_send_error(&*e);
                tracing::warn!(action = %self.tag(), error = %err, "command rejected");
                return self.fail(err);
            }
            self.commands_sent += 1;
            tracing::debug!(
                action = %self.tag(),
                command = %String::from_utf8_lossy(payload),
                "command sent"
            );
        }
        self.started_at = Some(now);
        self.state = ActionState::Running;
        Progress::Pending
    }

    /// Check for completion. Idempotent once Finished or Failed.
    pub fn poll<C: CommandChannel + ?Sized>(&mut self, channel: &mut C, now: Instant) -> Progress {
        if self.state != ActionState::Running {
            return self.progress();
        }
        let elapsed = self
            .started_at
            .map_or(Duration::ZERO, |t| now.saturating_duration_since(t));

        let transition = if matches!(self.protocol, Protocol::Timed(_)) {
            advance(
                &self.protocol,
                self.policy,
                self.timeout,
                Observation {
                    buffered: &[],
                    elapsed,
                },
            )
        } else {
            match channel.available_bytes() {
                Ok(buffered) => advance(
                    &self.protocol,
                    self.policy,
                    self.timeout,
                    Observation { buffered, elapsed },
                ),
                Err(e) => {
                    let err = map_read_error(&*e);
                    tracing::warn!(action = %self.tag(), error = %err, "channel read failed");
                    return self.fail(err);
                }
            }
        };

        if transition.consume > 0 {
            if transition.state == ActionState::Running {
                tracing::debug!(action = %self.tag(), dropped = transition.consume, "discarded noise");
            }
            channel.consume(transition.consume);
        }
        match (transition.state, transition.error) {
            (ActionState::Failed, Some(err)) => {
                tracing::warn!(action = %self.tag(), error = %err, "action failed");
                self.fail(err)
            }
            (ActionState::Finished, _) => {
                self.state = ActionState::Finished;
                tracing::debug!(
                    action = %self.tag(),
                    elapsed_ms = duration_ms(elapsed),
                    "action finished"
                );
                Progress::Finished
            }
            _ => Progress::Pending,
        }
    }

    fn fail(&mut self, err: ActionError) -> Progress {
        self.state = ActionState::Failed;
        self.error = Some(err.clone());
        Progress::Failed(err)
    }

    fn progress(&self) -> Progress {
        match self.state {
            ActionState::NotStarted | ActionState::Running => Progress::Pending,
            ActionState::Finished => Progress::Finished,
            ActionState::Failed => match &self.error {
                Some(e) => Progress::Failed(e.clone()),
                None => Progress::Pending,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::wire::{MIX_ACK, TARE_ACK};

    fn tare() -> Protocol {
        ActionKind::Tare.protocol()
    }

    fn obs(buffered: &[u8], ms: u64) -> Observation<'_> {
        Observation {
            buffered,
            elapsed: Duration::from_millis(ms),
        }
    }

    #[test]
    fn wire_payloads() {
        assert_eq!(
            ActionKind::Dispense { pump: 3, grams: 45 }.protocol(),
            Protocol::Command {
                payload: b"dispense 3 45".to_vec(),
                ack: wire::DISPENSE_ACK
            }
        );
        assert_eq!(
            ActionKind::Mix {
                duration: Duration::from_millis(2500)
            }
            .protocol(),
            Protocol::Command {
                payload: b"mix 2500".to_vec(),
                ack: MIX_ACK
            }
        );
        assert_eq!(
            ActionKind::Wait {
                duration: Duration::from_secs(1)
            }
            .protocol(),
            Protocol::Timed(Duration::from_secs(1))
        );
    }

    #[test]
    fn ack_finishes_and_consumes_one_byte() {
        let t = advance(&tare(), MismatchPolicy::Error, None, obs(b"td", 5));
        assert_eq!(t.state, ActionState::Finished);
        assert_eq!(t.consume, 1);
        assert_eq!(t.error, None);
    }

    #[test]
    fn empty_buffer_without_deadline_stays_running() {
        let t = advance(&tare(), MismatchPolicy::Error, None, obs(b"", 1_000_000));
        assert_eq!(t.state, ActionState::Running);
        assert_eq!(t.consume, 0);
    }

    #[test]
    fn deadline_boundary() {
        let timeout = Some(Duration::from_millis(100));
        let before = advance(&tare(), MismatchPolicy::Error, timeout, obs(b"", 99));
        assert_eq!(before.state, ActionState::Running);
        let at = advance(&tare(), MismatchPolicy::Error, timeout, obs(b"", 100));
        assert_eq!(at.state, ActionState::Failed);
        assert_eq!(at.error.map(|e| e.kind()), Some(ErrorKind::AckTimeout));
    }

    #[test]
    fn ack_wins_over_elapsed_deadline() {
        let t = advance(
            &tare(),
            MismatchPolicy::Error,
            Some(Duration::from_millis(10)),
            obs(b"t", 500),
        );
        assert_eq!(t.state, ActionState::Finished);
    }

    #[test]
    fn mismatch_fails_without_consuming() {
        let t = advance(&tare(), MismatchPolicy::Error, None, obs(b"dt", 0));
        assert_eq!(t.state, ActionState::Failed);
        assert_eq!(t.consume, 0);
        assert_eq!(
            t.error,
            Some(ActionError::UnexpectedAck {
                expected: TARE_ACK,
                got: b'd'
            })
        );
    }

    #[test]
    fn discard_policy_drops_noise_while_waiting() {
        let t = advance(&tare(), MismatchPolicy::Discard, None, obs(b"\r\n", 0));
        assert_eq!(t.state, ActionState::Running);
        assert_eq!(t.consume, 2);
    }

    #[test]
    fn timed_protocol_ignores_buffer() {
        let p = Protocol::Timed(Duration::from_millis(50));
        let t = advance(&p, MismatchPolicy::Error, Some(Duration::ZERO), obs(b"x", 49));
        assert_eq!(t.state, ActionState::Running);
        assert_eq!(t.consume, 0);
        let t = advance(&p, MismatchPolicy::Error, None, obs(b"x", 50));
        assert_eq!(t.state, ActionState::Finished);
    }
}
