//! Recipe sequencer: runs steps strictly one after another on one channel.
//!
//! The sequencer owns the command channel. Only one run may be active at a
//! time, and within a run only one action exists at a time, so the channel's
//! receive buffer is only ever touched by the action currently waiting on it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use mixer_traits::CommandChannel;
use mixer_traits::clock::Clock;

use crate::action::{Action, Progress};
use crate::config::{FailurePolicy, ProtocolCfg};
use crate::error::{ErrorKind, SequencerError};
use crate::recipe::{Recipe, Step};
use crate::status::{AbortCause, Failure, RunHandle, RunState, RunStatus};

struct RecipeRun {
    recipe: String,
    /// Emptied once the run is terminal.
    steps: Vec<Step>,
    total: usize,
    index: usize,
    active: Option<Action>,
    state: RunState,
    commands_sent: usize,
    failures: Vec<Failure>,
    abort: Option<AbortCause>,
}

impl RecipeRun {
    fn new(recipe: Recipe) -> Self {
        let (name, steps) = recipe.into_parts();
        let total = steps.len();
        let mut run = Self {
            recipe: name,
            steps,
            total,
            index: 0,
            active: None,
            state: RunState::Running,
            commands_sent: 0,
            failures: Vec::new(),
            abort: None,
        };
        if total == 0 {
            run.close(RunState::Completed, None);
        }
        run
    }

    fn tick<C: CommandChannel + ?Sized>(
        &mut self,
        channel: &mut C,
        now: Instant,
        protocol: &ProtocolCfg,
        on_failure: FailurePolicy,
    ) {
        if self.state.is_terminal() {
            return;
        }

        if self.active.is_none() {
            let Some(step) = self.steps.get(self.index) else {
                self.close(RunState::Completed, None);
                return;
            };
            let timeout = step.deadline.resolve(protocol.ack_timeout);
            let mut action = Action::new(step.kind.clone(), timeout, protocol.mismatch);
            tracing::info!(
                recipe = %self.recipe,
                step = self.index + 1,
                action = %action.tag(),
                "action start"
            );
            action.start(channel, now);
            self.commands_sent += action.commands_sent() as usize;
            self.active = Some(action);
        }

        let Some(action) = self.active.as_mut() else {
            return;
        };
        match action.poll(channel, now) {
            Progress::Pending => {}
            Progress::Finished => {
                tracing::info!(
                    recipe = %self.recipe,
                    step = self.index + 1,
                    action = %action.tag(),
                    "action finished"
                );
                self.active = None;
                self.advance();
            }
            Progress::Failed(error) => {
                let failure = Failure {
                    index: self.index,
                    action: action.tag(),
                    error,
                };
                tracing::warn!(
                    recipe = %self.recipe,
                    step = self.index + 1,
                    action = %failure.action,
                    kind = %failure.kind(),
                    error = %failure.error,
                    "action failed"
                );
                self.active = None;
                self.failures.push(failure.clone());
                // A stray byte stays at the head of the buffer, so every
                // later step would fail on it too. Stop instead.
                let desynced = failure.kind() == ErrorKind::UnexpectedAck;
                match on_failure {
                    FailurePolicy::Continue if !desynced => self.advance(),
                    _ => {
                        self.close(RunState::Aborted, Some(AbortCause::Failed(failure)));
                    }
                }
            }
        }
    }

    fn advance(&mut self) {
        self.index += 1;
        if self.index >= self.total {
            self.close(RunState::Completed, None);
        }
    }

    fn close(&mut self, state: RunState, abort: Option<AbortCause>) {
        self.state = state;
        self.abort = abort;
        self.active = None;
        self.steps = Vec::new();
    }

    fn status(&self, handle: RunHandle) -> RunStatus {
        RunStatus {
            handle,
            recipe: self.recipe.clone(),
            state: self.state,
            completed: self.index,
            total: self.total,
            commands_sent: self.commands_sent,
            failures: self.failures.clone(),
            abort: self.abort.clone(),
        }
    }
}

pub struct Sequencer<C: CommandChannel> {
    channel: C,
    clock: Arc<dyn Clock + Send + Sync>,
    protocol: ProtocolCfg,
    on_failure: FailurePolicy,
    runs: BTreeMap<RunHandle, RecipeRun>,
    next_id: u64,
    active: Option<RunHandle>,
}

impl<C: CommandChannel> core::fmt::Debug for Sequencer<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Sequencer")
            .field("protocol", &self.protocol)
            .field("on_failure", &self.on_failure)
            .field("runs", &self.runs.len())
            .field("active", &self.active)
            .finish()
    }
}

impl<C: CommandChannel> Sequencer<C> {
    pub(crate) fn from_parts(
        channel: C,
        clock: Arc<dyn Clock + Send + Sync>,
        protocol: ProtocolCfg,
        on_failure: FailurePolicy,
    ) -> Self {
        Self {
            channel,
            clock,
            protocol,
            on_failure,
            runs: BTreeMap::new(),
            next_id: 1,
            active: None,
        }
    }

    /// Accept a recipe for execution. Nothing is sent until the first `tick`.
    ///
    /// Rejected with `Busy` while another run is still active on the channel.
    /// An empty recipe is Completed immediately.
    pub fn submit(&mut self, recipe: Recipe) -> Result<RunHandle, SequencerError> {
        if let Some(active) = self.active {
            return Err(SequencerError::Busy { active });
        }
        let handle = RunHandle(self.next_id);
        self.next_id += 1;
        tracing::info!(run = %handle, recipe = recipe.name(), steps = recipe.len(), "recipe submitted");
        let run = RecipeRun::new(recipe);
        if !run.state.is_terminal() {
            self.active = Some(handle);
        }
        self.runs.insert(handle, run);
        Ok(handle)
    }

    /// Make progress on a run: start the next action if none is in flight,
    /// then poll the one in flight. Never blocks. No effect on terminal runs.
    pub fn tick(&mut self, handle: RunHandle) -> Result<RunStatus, SequencerError> {
        let now = self.clock.now();
        let run = self
            .runs
            .get_mut(&handle)
            .ok_or(SequencerError::UnknownHandle(handle))?;
        run.tick(&mut self.channel, now, &self.protocol, self.on_failure);
        if run.state.is_terminal() {
            if run.state == RunState::Completed {
                tracing::info!(run = %handle, recipe = %run.recipe, "recipe completed");
            }
            if self.active == Some(handle) {
                self.active = None;
            }
        }
        Ok(run.status(handle))
    }

    pub fn status(&self, handle: RunHandle) -> Result<RunStatus, SequencerError> {
        self.runs
            .get(&handle)
            .map(|r| r.status(handle))
            .ok_or(SequencerError::UnknownHandle(handle))
    }

    /// Abort a running recipe. Commands already sent are not revoked.
    pub fn cancel(&mut self, handle: RunHandle) -> Result<RunStatus, SequencerError> {
        self.interrupt(handle, |index| AbortCause::Cancelled { index })
    }

    pub(crate) fn expire(
        &mut self,
        handle: RunHandle,
        limit_ms: u64,
    ) -> Result<RunStatus, SequencerError> {
        self.interrupt(handle, |index| AbortCause::Deadline { index, limit_ms })
    }

    fn interrupt(
        &mut self,
        handle: RunHandle,
        cause: impl FnOnce(usize) -> AbortCause,
    ) -> Result<RunStatus, SequencerError> {
        let run = self
            .runs
            .get_mut(&handle)
            .ok_or(SequencerError::UnknownHandle(handle))?;
        if run.state == RunState::Running {
            let cause = cause(run.index);
            tracing::warn!(run = %handle, recipe = %run.recipe, step = run.index + 1, ?cause, "recipe interrupted");
            run.close(RunState::Aborted, Some(cause));
            if self.active == Some(handle) {
                self.active = None;
            }
        }
        Ok(run.status(handle))
    }

    /// Forget a terminal run and return its final status.
    pub fn release(&mut self, handle: RunHandle) -> Result<RunStatus, SequencerError> {
        let run = self
            .runs
            .get(&handle)
            .ok_or(SequencerError::UnknownHandle(handle))?;
        if !run.state.is_terminal() {
            return Err(SequencerError::StillRunning(handle));
        }
        let status = run.status(handle);
        self.runs.remove(&handle);
        Ok(status)
    }

    /// The run currently holding the channel, if any.
    pub fn active_run(&self) -> Option<RunHandle> {
        self.active
    }

    pub fn protocol(&self) -> &ProtocolCfg {
        &self.protocol
    }

    pub fn on_failure(&self) -> FailurePolicy {
        self.on_failure
    }

    pub fn clock(&self) -> Arc<dyn Clock + Send + Sync> {
        self.clock.clone()
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn into_channel(self) -> C {
        self.channel
    }
}
