#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and recipe files for the mixing machine.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - `RecipeFile` describes an ordered list of steps; it is validated here and
//!   converted into runtime types by `mixer_core`.
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// In-process simulator that acknowledges commands after `sim_latency_ms`.
    #[default]
    Sim,
    /// Device node (serial/USB) at `path`.
    Device,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ChannelCfg {
    pub kind: ChannelKind,
    /// Device path, required when `kind = "device"`.
    pub path: Option<String>,
    /// Appended to every command written to the device.
    pub terminator: String,
    /// Simulated acknowledgment latency (ms).
    pub sim_latency_ms: u64,
}

impl Default for ChannelCfg {
    fn default() -> Self {
        Self {
            kind: ChannelKind::Sim,
            path: None,
            terminator: "\n".into(),
            sim_latency_ms: 20,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MismatchMode {
    /// A wrong leading byte fails the waiting action.
    #[default]
    Error,
    /// Wrong leading bytes are dropped as line noise.
    Discard,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ProtocolCfg {
    /// Default wait for an acknowledgment (ms). 0 waits forever.
    pub ack_timeout_ms: u64,
    pub on_mismatch: MismatchMode,
}

impl Default for ProtocolCfg {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 10_000,
            on_mismatch: MismatchMode::Error,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    #[default]
    Abort,
    Continue,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct SequencerCfg {
    /// "abort" stops the recipe at the first failed action; "continue" records it and moves on.
    pub on_failure: FailureMode,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RunnerCfg {
    /// Tick cadence of the blocking runner.
    pub tick_hz: u32,
    /// Hard cap on one recipe run (ms). 0 disables.
    pub max_run_ms: u64,
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self {
            tick_hz: 100,
            max_run_ms: 0,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub channel: ChannelCfg,
    pub protocol: ProtocolCfg,
    pub sequencer: SequencerCfg,
    pub runner: RunnerCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Channel
        if self.channel.kind == ChannelKind::Device {
            match self.channel.path.as_deref() {
                None | Some("") => eyre::bail!("channel.path is required when channel.kind = \"device\""),
                Some(_) => {}
            }
        }
        if !self.channel.terminator.is_ascii() {
            eyre::bail!("channel.terminator must be ASCII");
        }
        if self.channel.sim_latency_ms > 60 * 1000 {
            eyre::bail!("channel.sim_latency_ms is unreasonably large (>1min)");
        }

        // Protocol
        if self.protocol.ack_timeout_ms > 24 * 60 * 60 * 1000 {
            eyre::bail!("protocol.ack_timeout_ms is unreasonably large (>24h)");
        }

        // Runner
        if self.runner.tick_hz == 0 {
            eyre::bail!("runner.tick_hz must be > 0");
        }
        if self.runner.tick_hz > 10_000 {
            eyre::bail!("runner.tick_hz must be <= 10000");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref() {
            if !matches!(r, "never" | "daily" | "hourly") {
                eyre::bail!("logging.rotation must be one of never|daily|hourly, got {r:?}");
            }
        }

        Ok(())
    }
}

/// One recipe step as written in TOML.
///
/// ```toml
/// [[steps]]
/// action = "dispense"
/// pump = 2
/// grams = 40
/// timeout_ms = 20000
/// ```
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StepToml {
    #[serde(flatten)]
    pub action: ActionToml,
    /// Overrides `protocol.ack_timeout_ms` for this step. 0 waits forever.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ActionToml {
    Tare,
    Dispense { pump: u8, grams: u32 },
    Mix { duration_ms: u64 },
    Wait { duration_ms: u64 },
    Raw { command: String, ack: String },
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecipeFile {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<StepToml>,
}

pub fn load_recipe_toml(s: &str) -> Result<RecipeFile, toml::de::Error> {
    toml::from_str::<RecipeFile>(s)
}

pub fn load_recipe_file(path: &std::path::Path) -> eyre::Result<RecipeFile> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read recipe {:?}: {}", path, e))?;
    let recipe =
        load_recipe_toml(&text).map_err(|e| eyre::eyre!("parse recipe {:?}: {}", path, e))?;
    recipe.validate()?;
    Ok(recipe)
}

impl RecipeFile {
    pub fn validate(&self) -> eyre::Result<()> {
        if self.name.trim().is_empty() {
            eyre::bail!("recipe name must not be empty");
        }
        for (i, step) in self.steps.iter().enumerate() {
            let n = i + 1;
            match &step.action {
                ActionToml::Tare => {}
                ActionToml::Dispense { grams, .. } => {
                    if *grams == 0 {
                        eyre::bail!("step {n}: dispense grams must be > 0");
                    }
                }
                ActionToml::Mix { duration_ms } => {
                    if *duration_ms == 0 {
                        eyre::bail!("step {n}: mix duration_ms must be > 0");
                    }
                }
                ActionToml::Wait { duration_ms } => {
                    if *duration_ms == 0 {
                        eyre::bail!("step {n}: wait duration_ms must be > 0");
                    }
                }
                ActionToml::Raw { command, ack } => {
                    if command.trim().is_empty() || !command.is_ascii() {
                        eyre::bail!("step {n}: raw command must be non-empty ASCII");
                    }
                    if ack.len() != 1 || !ack.is_ascii() {
                        eyre::bail!("step {n}: raw ack must be a single ASCII character, got {ack:?}");
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = load_toml("").expect("empty TOML is valid");
        assert_eq!(cfg.channel.kind, ChannelKind::Sim);
        assert_eq!(cfg.protocol.ack_timeout_ms, 10_000);
        assert_eq!(cfg.sequencer.on_failure, FailureMode::Abort);
        assert_eq!(cfg.runner.tick_hz, 100);
        cfg.validate().expect("defaults validate");
    }

    #[test]
    fn step_timeout_is_optional() {
        let r = load_recipe_toml(
            r#"
name = "shot"
[[steps]]
action = "tare"
[[steps]]
action = "dispense"
pump = 1
grams = 40
timeout_ms = 500
"#,
        )
        .expect("parse");
        assert_eq!(r.steps[0].timeout_ms, None);
        assert_eq!(r.steps[1].action, ActionToml::Dispense { pump: 1, grams: 40 });
        assert_eq!(r.steps[1].timeout_ms, Some(500));
    }
}
