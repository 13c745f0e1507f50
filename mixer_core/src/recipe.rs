//! Ordered list of steps submitted to the sequencer.

use std::time::Duration;

use crate::action::ActionKind;

/// Acknowledgment deadline for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Deadline {
    /// Use the sequencer's configured default.
    #[default]
    Inherit,
    /// Wait for the acknowledgment indefinitely.
    Never,
    After(Duration),
}

impl Deadline {
    /// Effective ack timeout for a step. A zero `After` means no deadline,
    /// the same as a `timeout_ms = 0` override in a recipe file.
    pub fn resolve(self, default: Option<Duration>) -> Option<Duration> {
        match self {
            Deadline::Inherit => default,
            Deadline::Never => None,
            Deadline::After(d) if d.is_zero() => None,
            Deadline::After(d) => Some(d),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub kind: ActionKind,
    pub deadline: Deadline,
}

impl From<ActionKind> for Step {
    fn from(kind: ActionKind) -> Self {
        Self {
            kind,
            deadline: Deadline::Inherit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    name: String,
    steps: Vec<Step>,
}

impl Recipe {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step using the default deadline.
    pub fn then(mut self, kind: ActionKind) -> Self {
        self.steps.push(kind.into());
        self
    }

    /// Append a step that must be acknowledged within `timeout`.
    /// A zero timeout waits indefinitely.
    pub fn then_within(mut self, kind: ActionKind, timeout: Duration) -> Self {
        let deadline = if timeout.is_zero() {
            Deadline::Never
        } else {
            Deadline::After(timeout)
        };
        self.steps.push(Step { kind, deadline });
        self
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub(crate) fn into_parts(self) -> (String, Vec<Step>) {
        (self.name, self.steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_after_resolves_to_no_deadline() {
        let default = Some(Duration::from_millis(500));
        assert_eq!(Deadline::After(Duration::ZERO).resolve(default), None);
        assert_eq!(
            Deadline::After(Duration::from_millis(20)).resolve(default),
            Some(Duration::from_millis(20))
        );
        assert_eq!(Deadline::Inherit.resolve(default), default);
    }
}
