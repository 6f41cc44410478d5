//! Channel → session lookup.

use super::ConversationSession;
use crate::backend::GenerationBackend;
use crate::character::CharacterProfile;
use crate::config::SharedConfig;
use crate::error::{RelayError, Result};
use crate::lock;
use crate::speakers::SharedSpeakers;
use crate::tokenizer::Tokenizer;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Handle to one session. Holding the lock serializes requests for that
/// binding; other bindings proceed concurrently.
pub type SessionHandle = Arc<tokio::sync::Mutex<ConversationSession>>;

/// Owns every session of one character, keyed by channel.
pub struct SessionRegistry {
    profile: Arc<CharacterProfile>,
    tokenizer: Arc<dyn Tokenizer>,
    backend: Arc<dyn GenerationBackend>,
    config: SharedConfig,
    speakers: SharedSpeakers,
    chatlog_dir: PathBuf,
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("character", &self.profile.name())
            .field("chatlog_dir", &self.chatlog_dir)
            .field("sessions", &self.len())
            .finish()
    }
}

impl SessionRegistry {
    /// Create a registry writing transcripts under `chatlog_dir`, which is
    /// created if missing.
    pub fn new(
        profile: Arc<CharacterProfile>,
        tokenizer: Arc<dyn Tokenizer>,
        backend: Arc<dyn GenerationBackend>,
        config: SharedConfig,
        speakers: SharedSpeakers,
        chatlog_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let chatlog_dir = chatlog_dir.into();
        std::fs::create_dir_all(&chatlog_dir)
            .map_err(|e| RelayError::transcript(&chatlog_dir, e))?;
        Ok(Self {
            profile,
            tokenizer,
            backend,
            config,
            speakers,
            chatlog_dir,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub fn profile(&self) -> &Arc<CharacterProfile> {
        &self.profile
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn chatlog_dir(&self) -> &Path {
        &self.chatlog_dir
    }

    /// Transcript path for a channel: `<dir>/<character>_<channel>_chatlog.log`.
    pub fn chatlog_path(&self, channel_key: &str) -> PathBuf {
        self.chatlog_dir.join(format!(
            "{}_{}_chatlog.log",
            sanitize_key(self.profile.name()),
            sanitize_key(channel_key)
        ))
    }

    /// The session for `channel_key`, created and bound on first use.
    ///
    /// A failed bind is not cached; the next call retries.
    pub fn session_for(&self, channel_key: &str) -> Result<SessionHandle> {
        let key = sanitize_key(channel_key);
        let mut sessions = lock(&self.sessions);
        if let Some(handle) = sessions.get(&key) {
            return Ok(Arc::clone(handle));
        }

        let mut session = ConversationSession::new(
            Arc::clone(&self.profile),
            Arc::clone(&self.tokenizer),
            Arc::clone(&self.backend),
            Arc::clone(&self.config),
            Arc::clone(&self.speakers),
        );
        session.bind(self.chatlog_path(channel_key))?;
        debug!("Opened session for channel '{key}'");

        let handle = Arc::new(tokio::sync::Mutex::new(session));
        sessions.insert(key, Arc::clone(&handle));
        Ok(handle)
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Make a channel key safe to embed in a file name.
pub fn sanitize_key(key: &str) -> String {
    let cleaned: String = key
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}
