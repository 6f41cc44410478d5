//! Reply extraction from raw backend completions.
//!
//! Completion backends rarely stop exactly where the character's turn ends.
//! They drift into the next speaker's line, or start impersonating a human
//! participant. [`ResponseParser`] keeps only the in-character part:
//!
//! 1. Drop the first character of the raw text (the backend echoes the
//!    separator after the `"<name>:"` cue).
//! 2. Keep the first line unconditionally.
//! 3. Keep following lines while they mention the character; the first line
//!    that does not stops collection for good.
//! 4. Strip every `"<name>: "` prefix and join the kept lines with `\n`.
//! 5. Cut the reply at the first `"<speaker>:"` of any known participant.

use crate::speakers::SeenSpeakers;
use tracing::trace;

/// Line-collection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Collecting,
    Stopped,
}

/// Extracts in-character replies for one character.
#[derive(Debug, Clone)]
pub struct ResponseParser {
    name: String,
    prefix: String,
}

impl ResponseParser {
    pub fn new(character_name: impl Into<String>) -> Self {
        let name = character_name.into();
        let prefix = format!("{name}: ");
        Self { name, prefix }
    }

    /// Extract the clean reply from `raw`. The result may be empty, which is
    /// a valid (if unhelpful) reply.
    pub fn extract(&self, raw: &str, seen: &SeenSpeakers) -> String {
        let mut chars = raw.chars();
        chars.next();
        let body = chars.as_str();

        let mut state = ParseState::Collecting;
        let mut kept: Vec<String> = Vec::new();
        for (i, line) in body.split('\n').enumerate() {
            state = match state {
                ParseState::Stopped => break,
                ParseState::Collecting if i == 0 || line.contains(&self.name) => {
                    kept.push(line.replace(&self.prefix, ""));
                    ParseState::Collecting
                }
                ParseState::Collecting => ParseState::Stopped,
            };
        }
        trace!(
            "Kept {} completion line(s) for '{}' (stopped early: {})",
            kept.len(),
            self.name,
            state == ParseState::Stopped
        );

        let mut reply = kept.join("\n");
        for speaker in seen.iter() {
            let marker = format!("{speaker}:");
            if let Some(pos) = reply.find(&marker) {
                reply.truncate(pos);
            }
        }
        reply
    }
}
