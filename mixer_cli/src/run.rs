//! Channel assembly and recipe execution for the CLI.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use eyre::{Result, WrapErr};
use mixer_config::{ChannelKind, Config};
use mixer_core::wire::KNOWN_REPLIES;
use mixer_core::{FailurePolicy, ProtocolCfg, Recipe, RunParams, RunStatus, Sequencer};
use mixer_hardware::{DeviceChannel, SimulatedChannel};
use mixer_traits::clock::{Clock, MonotonicClock};
use mixer_traits::CommandChannel;
use serde_json::json;

use crate::cli::{LAST_LIMITS, RunLimits};

/// Simulator never acknowledges when set to "1".
const SIM_SILENT_ENV: &str = "MIXER_SIM_SILENT";
/// Simulator emits this ASCII character ahead of its first reply.
const SIM_NOISE_ENV: &str = "MIXER_SIM_NOISE";

pub fn open_channel(
    cfg: &Config,
    clock: Arc<dyn Clock + Send + Sync>,
) -> Result<Box<dyn CommandChannel>> {
    match cfg.channel.kind {
        ChannelKind::Sim => {
            let latency = std::time::Duration::from_millis(cfg.channel.sim_latency_ms);
            let mut sim = KNOWN_REPLIES.iter().fold(
                SimulatedChannel::responsive(clock, latency),
                |ch, (word, ack)| ch.reply_to(word, ack.byte()),
            );
            if std::env::var(SIM_SILENT_ENV).is_ok_and(|v| v == "1") {
                sim = sim.silent(true);
            }
            if let Some(b) = std::env::var(SIM_NOISE_ENV)
                .ok()
                .and_then(|v| v.bytes().next())
                .filter(u8::is_ascii)
            {
                sim = sim.with_noise(b);
            }
            tracing::info!(latency_ms = cfg.channel.sim_latency_ms, "using simulated channel");
            Ok(Box::new(sim))
        }
        ChannelKind::Device => {
            let path = cfg
                .channel
                .path
                .as_deref()
                .ok_or_else(|| eyre::eyre!("channel.path is required for kind = \"device\""))?;
            let dev = DeviceChannel::open(Path::new(path), cfg.channel.terminator.as_bytes())
                .wrap_err_with(|| format!("open device channel {path}"))?;
            Ok(Box::new(dev))
        }
    }
}

/// Everything the CLI reports about a finished run.
pub struct RunReport {
    pub status: RunStatus,
    pub duration_ms: u64,
}

pub fn run_recipe(
    cfg: &Config,
    recipe_path: &Path,
    max_run_ms_override: Option<u64>,
    continue_on_failure: bool,
    shutdown: &AtomicBool,
) -> Result<RunReport> {
    let file = mixer_config::load_recipe_file(recipe_path)
        .map_err(|e| eyre::eyre!("invalid recipe {recipe_path:?}: {e}"))?;
    let recipe = Recipe::try_from(&file).wrap_err_with(|| format!("recipe {recipe_path:?}"))?;

    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let channel = open_channel(cfg, clock.clone())?;

    // Config sections map onto core types through their From impls.
    let protocol: ProtocolCfg = (&cfg.protocol).into();
    let on_failure = if continue_on_failure {
        FailurePolicy::Continue
    } else {
        cfg.sequencer.on_failure.into()
    };
    let mut params: RunParams = (&cfg.runner).into();
    if let Some(ms) = max_run_ms_override {
        params.max_run = (ms > 0).then(|| std::time::Duration::from_millis(ms));
    }
    let _ = LAST_LIMITS.set(RunLimits {
        max_run_ms: params.max_run.map_or(0, mixer_core::util::duration_ms),
        ack_timeout_ms: protocol.ack_timeout.map_or(0, mixer_core::util::duration_ms),
    });

    let mut seq = Sequencer::builder()
        .with_channel(channel)
        .with_clock(clock)
        .with_protocol(protocol)
        .with_failure_policy(on_failure)
        .build()?;

    let t0 = Instant::now();
    let status = mixer_core::run(&mut seq, recipe, params, Some(shutdown))?;
    Ok(RunReport {
        status,
        duration_ms: mixer_core::util::duration_ms(t0.elapsed()),
    })
}

/// One JSON line describing a completed run.
pub fn report_json(r: &RunReport) -> serde_json::Value {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    let failures: Vec<_> = r
        .status
        .failures
        .iter()
        .map(|f| {
            json!({
                "step": f.index + 1,
                "action": f.action.as_str(),
                "kind": f.kind().as_str(),
                "message": f.error.to_string(),
            })
        })
        .collect();
    json!({
        "timestamp": timestamp,
        "recipe": r.status.recipe,
        "state": r.status.state.as_str(),
        "completed": r.status.completed,
        "total": r.status.total,
        "commands_sent": r.status.commands_sent,
        "duration_ms": r.duration_ms,
        "failures": failures,
    })
}

pub fn report_human(r: &RunReport) -> String {
    let s = &r.status;
    let mut out = format!(
        "recipe '{}' complete: {}/{} steps, {} commands in {} ms",
        s.recipe, s.completed, s.total, s.commands_sent, r.duration_ms
    );
    for f in &s.failures {
        out.push_str(&format!(
            "\n  step {} ({}) failed: {}",
            f.index + 1,
            f.action,
            f.error
        ));
    }
    out
}

/// Open the channel and read once without sending anything.
pub fn self_check(cfg: &Config) -> Result<()> {
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let mut channel = open_channel(cfg, clock)?;
    let pending = channel
        .available_bytes()
        .map_err(|e| eyre::eyre!("channel read failed: {e}"))?
        .len();
    tracing::info!(pending, "self-check passed");
    Ok(())
}

pub fn health(cfg: &Config) -> Result<serde_json::Value> {
    self_check(cfg)?;
    let kind = match cfg.channel.kind {
        ChannelKind::Sim => "sim",
        ChannelKind::Device => "device",
    };
    Ok(json!({
        "status": "ok",
        "channel": kind,
        "path": cfg.channel.path,
        "ack_timeout_ms": cfg.protocol.ack_timeout_ms,
        "tick_hz": cfg.runner.tick_hz,
    }))
}
