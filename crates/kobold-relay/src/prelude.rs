//! Convenience re-exports for common `kobold-relay` types.
//!
//! ```ignore
//! use kobold_relay::prelude::*;
//! ```

// ── Core types ──────────────────────────────────────────────────────
pub use crate::character::CharacterProfile;
pub use crate::config::{GenerationConfig, RelayConfig, SharedConfig};
pub use crate::error::{RelayError, Result};
pub use crate::speakers::{SeenSpeakers, SharedSpeakers};

// ── Conversation ────────────────────────────────────────────────────
pub use crate::commands::RelayCommands;
pub use crate::session::{ConversationSession, SessionRegistry, Transcript};

// ── Context management ──────────────────────────────────────────────
pub use crate::context::{ContextBudget, ContextUsage, ContextWindow};
pub use crate::tokenizer::{CharRatioTokenizer, Tokenizer};

// ── Backend ─────────────────────────────────────────────────────────
pub use crate::backend::{GenerateFuture, GenerationBackend, KoboldClient};
pub use crate::mentions::{MentionResolver, NoMentions};
