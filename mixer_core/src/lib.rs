#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core sequencing logic (transport-agnostic).
//!
//! This crate drives a cocktail machine through recipes. All I/O goes through
//! the `mixer_traits::CommandChannel` trait; all time through `mixer_traits::clock::Clock`.
//!
//! ## Architecture
//!
//! - **Wire**: command words and acknowledgment codes (`wire` module)
//! - **Decoding**: classify the channel's receive buffer against an expected ack (`decoder`)
//! - **Actions**: one command, one acknowledgment, as a state machine (`action`)
//! - **Sequencing**: recipes run strictly one action at a time (`sequencer`)
//! - **Runner**: blocking tick loop with shutdown and max-run handling (`runner`)
//!
//! Nothing in this crate blocks except `runner::run`.

pub mod action;
pub mod builder;
pub mod config;
pub mod conversions;
pub mod decoder;
pub mod error;
pub mod hw_error;
pub mod recipe;
pub mod runner;
pub mod sequencer;
pub mod status;
pub mod util;
pub mod wire;

pub use action::{Action, ActionKind, ActionState, ActionTag, Progress};
pub use builder::SequencerBuilder;
pub use config::{FailurePolicy, MismatchPolicy, ProtocolCfg};
pub use error::{ActionError, BuildError, ErrorKind, RecipeError, SequencerError};
pub use recipe::{Deadline, Recipe, Step};
pub use runner::{RunParams, run};
pub use sequencer::Sequencer;
pub use status::{AbortCause, Failure, RunHandle, RunState, RunStatus};
pub use wire::AckCode;
