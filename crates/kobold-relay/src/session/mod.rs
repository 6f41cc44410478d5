//! Conversation sessions: one character talking in one channel.
//!
//! A [`ConversationSession`] ties together everything a single
//! request/response cycle needs: the transcript on disk, the rolling
//! [`ContextWindow`], prompt assembly, the backend call, and reply parsing.
//!
//! Sessions start `Unbound` and become bound to a transcript file with
//! [`bind`](ConversationSession::bind). Every other operation requires a
//! bound session and fails with [`RelayError::NotBound`] otherwise.
//!
//! Generation is staged: the window is cloned, the new lines are pushed onto
//! the clone, and the clone only replaces the live window once the backend
//! call and the transcript append have both succeeded. A failed generation
//! therefore leaves window and transcript exactly as they were.
//!
//! [`registry`] maps channels to sessions; [`transcript`] owns the file I/O.

pub mod registry;
pub mod transcript;

pub use registry::SessionRegistry;
pub use transcript::Transcript;

use crate::backend::GenerationBackend;
use crate::character::CharacterProfile;
use crate::config::SharedConfig;
use crate::context::ContextWindow;
use crate::error::{RelayError, Result};
use crate::lock;
use crate::parser::ResponseParser;
use crate::prompt::PromptBuilder;
use crate::speakers::SharedSpeakers;
use crate::tokenizer::Tokenizer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Binding state of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    Unbound,
    Bound(Transcript),
}

/// One character's conversation in one channel.
pub struct ConversationSession {
    profile: Arc<CharacterProfile>,
    prompt: PromptBuilder,
    parser: ResponseParser,
    window: ContextWindow,
    backend: Arc<dyn GenerationBackend>,
    config: SharedConfig,
    speakers: SharedSpeakers,
    state: SessionState,
}

impl std::fmt::Debug for ConversationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationSession")
            .field("character", &self.profile.name())
            .field("state", &self.state)
            .field("window", &self.window)
            .finish()
    }
}

impl ConversationSession {
    /// Create an unbound session. The process-wide config and speaker set
    /// are shared with every other session.
    pub fn new(
        profile: Arc<CharacterProfile>,
        tokenizer: Arc<dyn Tokenizer>,
        backend: Arc<dyn GenerationBackend>,
        config: SharedConfig,
        speakers: SharedSpeakers,
    ) -> Self {
        let prompt = PromptBuilder::new(&profile);
        let budget = lock(&config).budget();
        let window = ContextWindow::new(tokenizer, prompt.preamble(), budget);
        Self {
            parser: ResponseParser::new(profile.name()),
            profile,
            prompt,
            window,
            backend,
            config,
            speakers,
            state: SessionState::Unbound,
        }
    }

    pub fn profile(&self) -> &CharacterProfile {
        &self.profile
    }

    pub fn window(&self) -> &ContextWindow {
        &self.window
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.state, SessionState::Bound(_))
    }

    pub fn transcript_path(&self) -> Option<&Path> {
        match self.state {
            SessionState::Bound(ref t) => Some(t.path()),
            SessionState::Unbound => None,
        }
    }

    /// Bind the session to a transcript file.
    ///
    /// An existing file is replayed into a fresh window line by line, so only
    /// the tail that fits the budget survives. A missing file is created with
    /// the character's greeting block. Rebinding discards the previous
    /// window; on failure the session keeps its previous binding.
    pub fn bind(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        let transcript = Transcript::new(path);
        let mut window = self.empty_window();

        if transcript.exists() {
            let lines = transcript.read_lines()?;
            let total = lines.len();
            let evicted = window.push_lines(lines);
            info!(
                "Bound '{}' to {} ({total} line(s), {evicted} evicted; {})",
                self.profile.name(),
                transcript.path().display(),
                window.usage().to_log_string()
            );
        } else {
            let greeting = self.profile.greeting_block();
            transcript.rewrite(&greeting)?;
            window.push_lines(greeting.lines());
            info!(
                "Started new transcript for '{}' at {}",
                self.profile.name(),
                transcript.path().display()
            );
        }

        self.window = window;
        self.state = SessionState::Bound(transcript);
        Ok(())
    }

    /// Relay a user's message and return the character's reply.
    pub async fn submit(&mut self, speaker: &str, text: &str) -> Result<String> {
        let transcript = self.transcript()?.clone();
        self.note_speaker(speaker);

        let user_line = format!("{speaker}: {text}");
        let mut staged = self.staged_window();
        staged.push(user_line.as_str());

        let reply = self.generate(&staged).await?;
        let reply_line = format!("{}{reply}", self.profile.line_prefix());
        staged.push(reply_line.as_str());
        transcript.append(&[&user_line, &reply_line])?;

        self.window = staged;
        Ok(reply)
    }

    /// Have the character continue the conversation without new input.
    pub async fn follow_up(&mut self) -> Result<String> {
        let transcript = self.transcript()?.clone();
        let mut staged = self.staged_window();
        let reply = self.reply_and_commit(&transcript, &mut staged).await?;
        self.window = staged;
        Ok(reply)
    }

    /// Discard the character's latest reply and generate a new one.
    ///
    /// Only a reply that is still the newest line of the conversation is
    /// replaced; if anyone spoke since, this behaves like
    /// [`follow_up`](Self::follow_up). The old reply is swapped for the new
    /// one in a single transcript rewrite, after generation succeeds.
    pub async fn regenerate(&mut self) -> Result<String> {
        let transcript = self.transcript()?.clone();
        let mut staged = self.staged_window();

        let name = self.profile.name();
        let newest_reply = staged
            .rposition(|l| l.speaker() == Some(name))
            .filter(|&idx| idx + 1 == staged.len());
        let Some(old) = newest_reply.and_then(|idx| staged.remove_at(idx)) else {
            let reply = self.reply_and_commit(&transcript, &mut staged).await?;
            self.window = staged;
            return Ok(reply);
        };

        let reply = self.generate(&staged).await?;
        let reply_line = format!("{}{reply}", self.profile.line_prefix());
        transcript.replace_tail(old.text(), &[&reply_line])?;
        staged.push(reply_line.as_str());
        debug!("Replaced reply: {:?}", old.text());

        self.window = staged;
        Ok(reply)
    }

    /// Wipe the conversation back to the greeting block.
    pub fn reset(&mut self) -> Result<()> {
        let transcript = self.transcript()?.clone();
        let greeting = self.profile.greeting_block();
        transcript.rewrite(&greeting)?;

        let mut window = self.empty_window();
        window.push_lines(greeting.lines());
        self.window = window;
        info!(
            "Reset conversation for '{}' at {}",
            self.profile.name(),
            transcript.path().display()
        );
        Ok(())
    }

    // ── Internals ──────────────────────────────────────────────────

    fn transcript(&self) -> Result<&Transcript> {
        match self.state {
            SessionState::Bound(ref t) => Ok(t),
            SessionState::Unbound => Err(RelayError::NotBound),
        }
    }

    /// Record a speaker; first-time speakers also become stop sequences so
    /// the backend stops before impersonating them.
    fn note_speaker(&self, speaker: &str) {
        let is_new = lock(&self.speakers).insert(speaker);
        if is_new {
            let added = lock(&self.config).add_stop_sequence(&format!("{speaker}:"));
            debug!("New speaker '{speaker}' (stop sequence added: {added})");
        }
    }

    /// An empty window with the live budget, keeping the cached preamble cost.
    fn empty_window(&self) -> ContextWindow {
        let mut window = self.staged_window();
        window.clear();
        window
    }

    /// A copy of the live window carrying the current budget from config.
    fn staged_window(&self) -> ContextWindow {
        let mut staged = self.window.clone();
        staged.set_budget(lock(&self.config).budget());
        staged
    }

    async fn generate(&self, window: &ContextWindow) -> Result<String> {
        let prompt = self.prompt.build(window);
        let body = lock(&self.config).request_body(&prompt);
        debug!(
            "Generating for '{}'; {}",
            self.profile.name(),
            window.usage().to_log_string()
        );

        let raw = self.backend.generate(body).await?;
        let reply = {
            let seen = lock(&self.speakers);
            self.parser.extract(&raw, &seen)
        };
        if reply.is_empty() {
            debug!("Reply for '{}' parsed to empty text", self.profile.name());
        }
        Ok(reply)
    }

    /// Generate a reply from `staged`, push it, and append it to the transcript.
    async fn reply_and_commit(
        &self,
        transcript: &Transcript,
        staged: &mut ContextWindow,
    ) -> Result<String> {
        let reply = self.generate(staged).await?;
        let reply_line = format!("{}{reply}", self.profile.line_prefix());
        staged.push(reply_line.as_str());
        transcript.append(&[&reply_line])?;
        Ok(reply)
    }
}
