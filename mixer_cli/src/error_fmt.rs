//! Human-readable error descriptions and structured JSON error formatting.

use mixer_core::error::{ActionError, BuildError, ErrorKind, RecipeError};

use crate::cli::LAST_LIMITS;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingChannel => {
                "What happened: No command channel was provided to the sequencer.\nLikely causes: The channel failed to open or was not wired into the builder.\nHow to fix: Check the [channel] section of the config.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(re) = err.downcast_ref::<RecipeError>() {
        return match re {
            RecipeError::Aborted {
                index,
                action,
                error,
            } => humanize_action(*index + 1, action.as_str(), error),
            RecipeError::Cancelled { index } => format!(
                "What happened: The recipe was cancelled before step {} finished.\nLikely causes: Ctrl-C or a shutdown request.\nHow to fix: Start a new run. Commands already sent were not undone.",
                index + 1
            ),
            RecipeError::MaxRuntime { limit_ms } => format!(
                "What happened: max run time was exceeded ({limit_ms} ms).\nLikely causes: Slow machine, long mix or wait steps, or a limit that is too tight.\nHow to fix: Increase runner.max_run_ms or pass --max-run-ms."
            ),
            RecipeError::Rejected(e) => format!(
                "What happened: The sequencer refused the run ({e}).\nLikely causes: Another recipe is still active on the channel.\nHow to fix: Wait for it to finish, then rerun."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("open device channel") {
        return "What happened: Failed to open the device channel.\nLikely causes: Wrong device path, controller unplugged, or insufficient permissions.\nHow to fix: Fix channel.path in the config and make sure the process may open the device.".to_string();
    }

    if lower.contains("recipe") {
        return format!(
            "What happened: The recipe could not be loaded ({msg}).\nLikely causes: Missing file, TOML syntax error, or an invalid step.\nHow to fix: Fix the recipe file and try again."
        );
    }

    if lower.contains("config")
        || lower.starts_with("channel.")
        || lower.starts_with("protocol.")
        || lower.starts_with("runner.")
        || lower.starts_with("logging.")
    {
        return format!(
            "What happened: Configuration is invalid or incomplete ({msg}).\nLikely causes: Missing keys or out-of-range values.\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

fn humanize_action(step: usize, action: &str, error: &ActionError) -> String {
    match error {
        ActionError::AckTimeout {
            expected,
            waited_ms,
        } => format!(
            "What happened: The machine did not acknowledge step {step} ({action}) within {waited_ms} ms; expected '{expected}'.\nLikely causes: Controller busy or powered off, wrong device, or a timeout that is too low.\nHow to fix: Check the controller, then raise protocol.ack_timeout_ms or the step's timeout_ms."
        ),
        ActionError::UnexpectedAck { expected, got } => format!(
            "What happened: The machine answered step {step} ({action}) with '{}' instead of '{expected}'.\nLikely causes: Line noise, stale bytes from an earlier run, or a firmware mismatch.\nHow to fix: Power-cycle the controller, or set protocol.on_mismatch = \"discard\" if it emits noise.",
            got.escape_ascii()
        ),
        ActionError::CommandSend { reason, .. } => format!(
            "What happened: The command for step {step} ({action}) could not be sent ({reason}).\nLikely causes: Device unplugged or write permissions missing.\nHow to fix: Check the cable and channel.path, then rerun."
        ),
        ActionError::ChannelDisconnected(reason) => format!(
            "What happened: The channel closed while step {step} ({action}) was waiting ({reason}).\nLikely causes: Controller reset or cable pulled.\nHow to fix: Reconnect the controller and start a new run."
        ),
    }
}

/// Map failures to stable exit codes; everything else returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<RecipeError>() {
        Some(RecipeError::Cancelled { .. }) => 2,
        Some(RecipeError::MaxRuntime { .. }) => 3,
        Some(RecipeError::Aborted { error, .. }) => match error.kind() {
            ErrorKind::AckTimeout => 4,
            ErrorKind::UnexpectedAck => 5,
            ErrorKind::CommandSend => 6,
            ErrorKind::ChannelDisconnected => 7,
        },
        _ => 1,
    }
}

/// Stable reason name for JSON output.
fn reason_name(err: &eyre::Report) -> &'static str {
    match err.downcast_ref::<RecipeError>() {
        Some(RecipeError::Cancelled { .. }) => "Cancelled",
        Some(RecipeError::MaxRuntime { .. }) => "MaxRuntime",
        Some(RecipeError::Aborted { error, .. }) => error.kind().as_str(),
        Some(RecipeError::Rejected(_)) => "Rejected",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let msg = humanize(err);
    let reason = reason_name(err);
    let details = match err.downcast_ref::<RecipeError>() {
        Some(RecipeError::Aborted { index, action, .. }) => {
            let timeout = LAST_LIMITS.get().map(|l| l.ack_timeout_ms);
            Some(json!({ "step": index + 1, "action": action.as_str(), "ack_timeout_ms": timeout }))
        }
        Some(RecipeError::Cancelled { index }) => Some(json!({ "step": index + 1 })),
        Some(RecipeError::MaxRuntime { limit_ms }) => Some(json!({ "max_run_ms": limit_ms })),
        _ => None,
    };

    let obj = if let Some(d) = details {
        json!({ "reason": reason, "details": d, "message": msg })
    } else {
        json!({ "reason": reason, "message": msg })
    };
    obj.to_string()
}
