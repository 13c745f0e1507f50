use crate::action::ActionTag;
use crate::status::RunHandle;
use crate::wire::AckCode;
use thiserror::Error;

/// Failure category of an action, independent of the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    CommandSend,
    AckTimeout,
    UnexpectedAck,
    ChannelDisconnected,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::CommandSend => "CommandSend",
            ErrorKind::AckTimeout => "AckTimeout",
            ErrorKind::UnexpectedAck => "UnexpectedAck",
            ErrorKind::ChannelDisconnected => "ChannelDisconnected",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// The transport refused the command; `disconnected` is set when the link was down.
    #[error("command send failed: {reason}")]
    CommandSend { reason: String, disconnected: bool },
    #[error("no acknowledgment '{expected}' within {waited_ms} ms")]
    AckTimeout { expected: AckCode, waited_ms: u64 },
    #[error("unexpected acknowledgment: expected '{expected}', got '{}'", .got.escape_ascii())]
    UnexpectedAck { expected: AckCode, got: u8 },
    #[error("channel disconnected: {0}")]
    ChannelDisconnected(String),
}

impl ActionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ActionError::CommandSend { .. } => ErrorKind::CommandSend,
            ActionError::AckTimeout { .. } => ErrorKind::AckTimeout,
            ActionError::UnexpectedAck { .. } => ErrorKind::UnexpectedAck,
            ActionError::ChannelDisconnected(_) => ErrorKind::ChannelDisconnected,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SequencerError {
    #[error("unknown run handle {0}")]
    UnknownHandle(RunHandle),
    #[error("run {active} is still active on this channel")]
    Busy { active: RunHandle },
    #[error("run {0} has not finished")]
    StillRunning(RunHandle),
}

/// Why a blocking recipe run did not complete.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecipeError {
    #[error("recipe aborted at step {step} ({action}): {error}", step = .index + 1)]
    Aborted {
        index: usize,
        action: ActionTag,
        error: ActionError,
    },
    #[error("recipe cancelled at step {step}", step = .index + 1)]
    Cancelled { index: usize },
    #[error("max run time exceeded ({limit_ms} ms)")]
    MaxRuntime { limit_ms: u64 },
    #[error("run rejected: {0}")]
    Rejected(#[from] SequencerError),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing command channel")]
    MissingChannel,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
