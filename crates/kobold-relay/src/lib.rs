//! Character chat relay for KoboldAI-compatible text-generation backends.
//!
//! `kobold-relay` sits between a chat surface and a locally hosted language
//! model. For every incoming message it assembles a prompt from a fixed
//! character preamble plus as much recent conversation history as fits the
//! model's context length, asks the backend for a completion, extracts the
//! character's reply from the raw completion, and persists both sides of the
//! exchange to an append-only transcript per channel.
//!
//! # Getting started
//!
//! ```ignore
//! use kobold_relay::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> kobold_relay::Result<()> {
//!     let config = RelayConfig::default();
//!     let profile = Arc::new(CharacterProfile::load(&config.profile)?);
//!     let backend = Arc::new(KoboldClient::new(&config.endpoint, config.timeout)?);
//!
//!     let registry = SessionRegistry::new(
//!         profile,
//!         Arc::new(CharRatioTokenizer::default()),
//!         backend,
//!         config.generation_config()?.into_shared(),
//!         SeenSpeakers::shared(),
//!         &config.chatlog_dir,
//!     )?;
//!     let commands = RelayCommands::new(Arc::new(registry));
//!
//!     let reply = commands.chat("general", "Alice", "Hello there!").await?;
//!     println!("{reply}");
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Keep prompts inside the context length:** see
//!   [`ContextWindow`](context::ContextWindow) for the FIFO history and
//!   [`ContextBudget`](context::ContextBudget) for the arithmetic.
//!   Token costs come from a [`Tokenizer`](tokenizer::Tokenizer).
//!
//! - **Talk to a different backend:** implement
//!   [`GenerationBackend`](backend::GenerationBackend). The bundled
//!   [`KoboldClient`](backend::KoboldClient) speaks `POST /api/v1/generate`.
//!
//! - **Tune generation:** [`GenerationConfig`](config::GenerationConfig) holds
//!   the sampler parameters sent with every request and can be edited live
//!   through [`RelayCommands`](commands::RelayCommands).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`session`] | [`ConversationSession`](session::ConversationSession) request/response cycle, per-channel [`SessionRegistry`](session::SessionRegistry), transcripts |
//! | [`context`] | Token budget and rolling history window |
//! | [`prompt`] | Prompt assembly from preamble, history and speaker cue |
//! | [`parser`] | Reply extraction from raw completions |
//! | [`character`] | Character card loading and derived text blocks |
//! | [`backend`] | Backend trait and the KoboldAI HTTP client |
//! | [`config`] | Generation parameters and process configuration |
//! | [`commands`] | Command surface for front ends |
//! | [`mentions`] | Chat-platform mention and emoji cleanup |

pub mod backend;
pub mod character;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod mentions;
pub mod parser;
pub mod prelude;
pub mod prompt;
pub mod session;
pub mod speakers;
pub mod tokenizer;

pub use error::{RelayError, Result};

use std::sync::{Mutex, MutexGuard};

/// Lock a std mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
