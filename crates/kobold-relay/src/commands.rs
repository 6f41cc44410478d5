//! Operator and user commands.
//!
//! [`RelayCommands`] is the surface a front end (the terminal REPL in
//! `main.rs`, or a chat-platform adapter) drives. Each method maps to one
//! command: chatting, follow-ups, regenerating, resetting, and live edits
//! of the generation config.

use crate::config::{STOP_SEQUENCE_KEY, SharedConfig};
use crate::error::Result;
use crate::lock;
use crate::mentions::{MentionResolver, NoMentions, replace_mentions};
use crate::session::SessionRegistry;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Command dispatcher over a [`SessionRegistry`].
pub struct RelayCommands {
    registry: Arc<SessionRegistry>,
    resolver: Arc<dyn MentionResolver + Send + Sync>,
}

impl RelayCommands {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            resolver: Arc::new(NoMentions),
        }
    }

    /// Resolve `<@id>` mentions in chat messages with `resolver`.
    pub fn with_resolver(mut self, resolver: Arc<dyn MentionResolver + Send + Sync>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    fn config(&self) -> &SharedConfig {
        self.registry.config()
    }

    /// Relay `text` from `speaker` in `channel` and return the reply.
    pub async fn chat(&self, channel: &str, speaker: &str, text: &str) -> Result<String> {
        let text = replace_mentions(text, self.resolver.as_ref());
        let handle = self.registry.session_for(channel)?;
        let mut session = handle.lock().await;
        session.submit(speaker, &text).await
    }

    /// Let the character speak again without new input.
    pub async fn follow_up(&self, channel: &str) -> Result<String> {
        let handle = self.registry.session_for(channel)?;
        let mut session = handle.lock().await;
        session.follow_up().await
    }

    /// Replace the character's latest reply in `channel`.
    pub async fn regenerate(&self, channel: &str) -> Result<String> {
        let handle = self.registry.session_for(channel)?;
        let mut session = handle.lock().await;
        session.regenerate().await
    }

    /// Wipe the conversation in `channel` back to the greeting.
    pub async fn reset(&self, channel: &str) -> Result<()> {
        let handle = self.registry.session_for(channel)?;
        let mut session = handle.lock().await;
        session.reset()
    }

    /// Current value of a generation parameter.
    pub fn config_get(&self, key: &str) -> Option<Value> {
        lock(self.config()).get(key).cloned()
    }

    /// Set a generation parameter. `raw` is parsed as JSON, so `0.7`, `true`
    /// and `["a","b"]` keep their types; anything else is stored as a string.
    /// Returns the stored value.
    pub fn config_put(&self, key: &str, raw: &str) -> Value {
        let value = lock(self.config()).set_from_str(key, raw);
        info!("Generation config: {key} = {value}");
        value
    }

    /// Allow or forbid multi-line replies.
    pub fn set_multiline(&self, enabled: bool) {
        let mut config = lock(self.config());
        config.set_multiline(enabled);
        info!(
            "Multi-line replies {}; {STOP_SEQUENCE_KEY} = {:?}",
            if enabled { "enabled" } else { "disabled" },
            config.stop_sequences()
        );
    }

    pub fn multiline_enabled(&self) -> bool {
        lock(self.config()).multiline_enabled()
    }
}
