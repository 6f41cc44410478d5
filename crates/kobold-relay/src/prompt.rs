//! Generation prompt assembly.
//!
//! A prompt is always three parts: the character preamble, the rolling
//! history rendered oldest first, and a trailing `"<name>:"` cue that asks
//! the backend to speak as the character.

use crate::character::CharacterProfile;
use crate::context::ContextWindow;

/// Builds prompts for one character.
///
/// The preamble and cue are derived from the profile once, at construction;
/// [`build`](Self::build) is then a pure function of the window.
///
/// # Example
///
/// ```
/// use kobold_relay::character::CharacterProfile;
/// use kobold_relay::context::{ContextBudget, ContextWindow};
/// use kobold_relay::prompt::PromptBuilder;
/// use kobold_relay::tokenizer::CharRatioTokenizer;
/// use std::sync::Arc;
///
/// let profile = CharacterProfile::from_json(
///     r#"{"char_name": "Bob", "char_persona": "A sailor.",
///         "char_greeting": "Ahoy!", "example_dialogue": ""}"#,
/// ).unwrap();
/// let builder = PromptBuilder::new(&profile);
/// let mut window = ContextWindow::new(
///     Arc::new(CharRatioTokenizer::default()),
///     builder.preamble(),
///     ContextBudget::new(2048, 150),
/// );
/// window.push("Alice: hello");
///
/// assert_eq!(
///     builder.build(&window),
///     "Bob's Persona: A sailor.\n\nAlice: hello\nBob:"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    preamble: String,
    cue: String,
}

impl PromptBuilder {
    pub fn new(profile: &CharacterProfile) -> Self {
        Self {
            preamble: profile.preamble(),
            cue: format!("{}:", profile.name()),
        }
    }

    /// The fixed preamble block every prompt starts with.
    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    /// Assemble `preamble + "\n" + history + "<name>:"`.
    ///
    /// History lines are newline-terminated, so the cue always starts on a
    /// line of its own.
    pub fn build(&self, window: &ContextWindow) -> String {
        let history = window.render_oldest_first();
        let mut prompt =
            String::with_capacity(self.preamble.len() + 1 + history.len() + self.cue.len());
        prompt.push_str(&self.preamble);
        prompt.push('\n');
        prompt.push_str(&history);
        prompt.push_str(&self.cue);
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextBudget;
    use std::sync::Arc;

    fn profile() -> CharacterProfile {
        CharacterProfile::from_json(
            r#"{"char_name": "Bob", "char_persona": "{{char}} keeps a lighthouse.",
                "char_greeting": "Hi", "example_dialogue": "",
                "world_scenario": "A storm rolls in."}"#,
        )
        .unwrap()
    }

    fn window(builder: &PromptBuilder) -> ContextWindow {
        let words = |s: &str| s.split_whitespace().count();
        ContextWindow::new(Arc::new(words), builder.preamble(), ContextBudget::new(512, 64))
    }

    #[test]
    fn prompt_has_preamble_history_and_cue() {
        let builder = PromptBuilder::new(&profile());
        let mut w = window(&builder);
        w.push_lines(["<START>", "Alice: is the light on?", "Bob: Always."]);
        assert_eq!(
            builder.build(&w),
            "Bob's Persona: Bob keeps a lighthouse.\n\
             Scenario: A storm rolls in.\n<START>\n\
             <START>\n\
             Alice: is the light on?\n\
             Bob: Always.\n\
             Bob:"
        );
    }

    #[test]
    fn empty_history_still_ends_with_cue() {
        let builder = PromptBuilder::new(&profile());
        let prompt = builder.build(&window(&builder));
        assert!(prompt.ends_with("<START>\nBob:"));
    }

    #[test]
    fn build_is_deterministic() {
        let builder = PromptBuilder::new(&profile());
        let mut w = window(&builder);
        w.push("Alice: hello");
        assert_eq!(builder.build(&w), builder.build(&w));
    }
}
