//! `From` implementations bridging `mixer_config` types to `mixer_core` types.
//!
//! Zero durations in the TOML mean "no deadline" and map to `None`/`Deadline::Never`.

use std::time::Duration;

use crate::action::ActionKind;
use crate::config::{FailurePolicy, MismatchPolicy, ProtocolCfg};
use crate::error::Report;
use crate::recipe::{Deadline, Recipe, Step};
use crate::runner::RunParams;
use crate::wire::AckCode;

fn optional_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

// ── ProtocolCfg ──────────────────────────────────────────────────────────────

impl From<mixer_config::MismatchMode> for MismatchPolicy {
    fn from(m: mixer_config::MismatchMode) -> Self {
        match m {
            mixer_config::MismatchMode::Error => Self::Error,
            mixer_config::MismatchMode::Discard => Self::Discard,
        }
    }
}

impl From<&mixer_config::ProtocolCfg> for ProtocolCfg {
    fn from(c: &mixer_config::ProtocolCfg) -> Self {
        Self {
            ack_timeout: optional_ms(c.ack_timeout_ms),
            mismatch: c.on_mismatch.into(),
        }
    }
}

// ── FailurePolicy ────────────────────────────────────────────────────────────

impl From<mixer_config::FailureMode> for FailurePolicy {
    fn from(m: mixer_config::FailureMode) -> Self {
        match m {
            mixer_config::FailureMode::Abort => Self::Abort,
            mixer_config::FailureMode::Continue => Self::Continue,
        }
    }
}

// ── RunParams ────────────────────────────────────────────────────────────────

impl From<&mixer_config::RunnerCfg> for RunParams {
    fn from(c: &mixer_config::RunnerCfg) -> Self {
        Self {
            tick_hz: c.tick_hz,
            max_run: optional_ms(c.max_run_ms),
        }
    }
}

// ── Recipe ───────────────────────────────────────────────────────────────────

impl TryFrom<&mixer_config::ActionToml> for ActionKind {
    type Error = Report;

    fn try_from(a: &mixer_config::ActionToml) -> Result<Self, Self::Error> {
        use mixer_config::ActionToml;
        Ok(match a {
            ActionToml::Tare => ActionKind::Tare,
            ActionToml::Dispense { pump, grams } => ActionKind::Dispense {
                pump: *pump,
                grams: *grams,
            },
            ActionToml::Mix { duration_ms } => ActionKind::Mix {
                duration: Duration::from_millis(*duration_ms),
            },
            ActionToml::Wait { duration_ms } => ActionKind::Wait {
                duration: Duration::from_millis(*duration_ms),
            },
            ActionToml::Raw { command, ack } => ActionKind::Raw {
                command: command.clone(),
                ack: AckCode::try_from(ack.as_str())?,
            },
        })
    }
}

impl TryFrom<&mixer_config::RecipeFile> for Recipe {
    type Error = Report;

    fn try_from(f: &mixer_config::RecipeFile) -> Result<Self, Self::Error> {
        let mut recipe = Recipe::new(f.name.clone());
        for (i, s) in f.steps.iter().enumerate() {
            let kind =
                ActionKind::try_from(&s.action).map_err(|e| eyre::eyre!("step {}: {e}", i + 1))?;
            let deadline = match s.timeout_ms {
                None => Deadline::Inherit,
                Some(0) => Deadline::Never,
                Some(ms) => Deadline::After(Duration::from_millis(ms)),
            };
            recipe.push(Step { kind, deadline });
        }
        Ok(recipe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ack_timeout_waits_forever() {
        let cfg = mixer_config::ProtocolCfg {
            ack_timeout_ms: 0,
            on_mismatch: mixer_config::MismatchMode::Discard,
        };
        let p = ProtocolCfg::from(&cfg);
        assert_eq!(p.ack_timeout, None);
        assert_eq!(p.mismatch, MismatchPolicy::Discard);
    }

    #[test]
    fn recipe_file_maps_steps_and_deadlines() {
        let file = mixer_config::load_recipe_toml(
            r#"
            name = "negroni"
            [[steps]]
            action = "tare"
            [[steps]]
            action = "dispense"
            pump = 1
            grams = 30
            timeout_ms = 0
            [[steps]]
            action = "raw"
            command = "light on"
            ack = "l"
            timeout_ms = 500
            "#,
        )
        .unwrap();
        let recipe = Recipe::try_from(&file).unwrap();
        assert_eq!(recipe.name(), "negroni");
        let steps = recipe.steps();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].deadline, Deadline::Inherit);
        assert_eq!(steps[1].kind, ActionKind::Dispense { pump: 1, grams: 30 });
        assert_eq!(steps[1].deadline, Deadline::Never);
        assert_eq!(
            steps[2].deadline,
            Deadline::After(Duration::from_millis(500))
        );
        match &steps[2].kind {
            ActionKind::Raw { command, ack } => {
                assert_eq!(command, "light on");
                assert_eq!(ack.byte(), b'l');
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn bad_raw_ack_names_the_step() {
        let file = mixer_config::RecipeFile {
            name: "x".into(),
            steps: vec![mixer_config::StepToml {
                action: mixer_config::ActionToml::Raw {
                    command: "ping".into(),
                    ack: "ok".into(),
                },
                timeout_ms: None,
            }],
        };
        let err = Recipe::try_from(&file).unwrap_err();
        assert!(err.to_string().starts_with("step 1:"), "{err}");
    }
}
