//! Recipe run status reported by the sequencer.

use std::fmt;

use crate::action::ActionTag;
use crate::error::{ActionError, ErrorKind};

/// Opaque handle for a submitted recipe run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunHandle(pub(crate) u64);

impl RunHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Completed,
    Aborted,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunState::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Running => "Running",
            RunState::Completed => "Completed",
            RunState::Aborted => "Aborted",
        }
    }
}

/// A failed step: which one, what it was, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Zero-based step index.
    pub index: usize,
    pub action: ActionTag,
    pub error: ActionError,
}

impl Failure {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortCause {
    /// A step failed under the abort-on-failure policy.
    Failed(Failure),
    /// `cancel` was called while step `index` was next or in flight.
    Cancelled { index: usize },
    /// The runner's max-run deadline expired.
    Deadline { index: usize, limit_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStatus {
    pub handle: RunHandle,
    pub recipe: String,
    pub state: RunState,
    /// Steps that have left the pipeline (finished, or failed and skipped).
    pub completed: usize,
    pub total: usize,
    pub commands_sent: usize,
    /// Every failed step, in order. Under abort-on-failure this holds at most one.
    pub failures: Vec<Failure>,
    /// Set when `state` is Aborted.
    pub abort: Option<AbortCause>,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// The failing step, when the run aborted because of one.
    pub fn failed_step(&self) -> Option<&Failure> {
        match &self.abort {
            Some(AbortCause::Failed(f)) => Some(f),
            _ => None,
        }
    }
}
