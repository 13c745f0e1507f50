//! Blocking driver: ticks one recipe to completion on the calling thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mixer_traits::CommandChannel;

use crate::error::{RecipeError, Report, Result};
use crate::recipe::Recipe;
use crate::sequencer::Sequencer;
use crate::status::{AbortCause, RunState, RunStatus};
use crate::util::{duration_ms, tick_period};

/// Pacing and limits for a blocking run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunParams {
    pub tick_hz: u32,
    /// Hard cap on the whole run; `None` disables it.
    pub max_run: Option<Duration>,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            tick_hz: 100,
            max_run: None,
        }
    }
}

/// Run `recipe` until it completes or aborts, sleeping one tick period on the
/// sequencer's clock between ticks.
///
/// Returns the final status when the run Completed (under the continue policy
/// it may still list failures). `shutdown` is checked before every tick and
/// cancels the run once set.
pub fn run<C: CommandChannel>(
    seq: &mut Sequencer<C>,
    recipe: Recipe,
    params: RunParams,
    shutdown: Option<&AtomicBool>,
) -> Result<RunStatus> {
    let name = recipe.name().to_string();
    let steps = recipe.len();
    let handle = seq
        .submit(recipe)
        .map_err(|e| Report::new(RecipeError::from(e)))?;
    let clock = seq.clock();
    let period = tick_period(params.tick_hz);
    let start = clock.now();
    tracing::info!(recipe = %name, steps, run = %handle, "recipe start");

    loop {
        if shutdown.is_some_and(|f| f.load(Ordering::Relaxed)) {
            seq.cancel(handle)?;
            break;
        }
        if let Some(limit) = params.max_run {
            if clock.now().saturating_duration_since(start) >= limit {
                seq.expire(handle, duration_ms(limit))?;
                break;
            }
        }
        if seq.tick(handle)?.is_terminal() {
            break;
        }
        clock.sleep(period);
    }

    let status = seq.release(handle)?;
    finish(status)
}

fn finish(status: RunStatus) -> Result<RunStatus> {
    if status.state == RunState::Completed {
        tracing::info!(
            recipe = %status.recipe,
            commands = status.commands_sent,
            failures = status.failures.len(),
            "recipe complete"
        );
        return Ok(status);
    }
    let err = match status.abort.clone() {
        Some(AbortCause::Failed(f)) => RecipeError::Aborted {
            index: f.index,
            action: f.action,
            error: f.error,
        },
        Some(AbortCause::Deadline { limit_ms, .. }) => RecipeError::MaxRuntime { limit_ms },
        Some(AbortCause::Cancelled { index }) => RecipeError::Cancelled { index },
        None => RecipeError::Cancelled {
            index: status.completed,
        },
    };
    tracing::error!(recipe = %status.recipe, error = %err, "recipe aborted");
    Err(Report::new(err))
}
