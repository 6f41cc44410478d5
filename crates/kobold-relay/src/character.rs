//! Character profiles.
//!
//! A [`CharacterProfile`] is the immutable identity the relay speaks as. It is
//! loaded once from a JSON card at startup, has its `{{char}}` placeholders
//! resolved, and from then on only derives the two fixed text blocks the rest
//! of the relay needs: the prompt preamble and the transcript greeting block.

use crate::error::{RelayError, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// Placeholder a card uses to refer to its own character.
pub const CHAR_PLACEHOLDER: &str = "{{char}}";

/// Marker that separates example dialogue from the live conversation.
pub const START_MARKER: &str = "<START>";

/// On-disk shape of a character card.
#[derive(Deserialize)]
struct ProfileFile {
    char_name: String,
    char_persona: String,
    char_greeting: String,
    example_dialogue: String,
    #[serde(default)]
    world_scenario: Option<String>,
    #[serde(default)]
    personality: Option<String>,
}

/// An immutable character definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterProfile {
    name: String,
    persona: String,
    greeting: String,
    scenario: Option<String>,
    example_dialogue: Option<String>,
    personality: Option<String>,
}

impl CharacterProfile {
    /// Load and validate a character card from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| RelayError::profile(path, format!("unreadable: {e}")))?;
        let profile = Self::from_json(&data).map_err(|reason| RelayError::profile(path, reason))?;
        debug!(
            "Loaded character '{}' from {} (scenario: {}, personality: {})",
            profile.name,
            path.display(),
            profile.scenario.is_some(),
            profile.personality.is_some(),
        );
        Ok(profile)
    }

    /// Parse a character card from JSON text.
    ///
    /// Returns a human-readable reason on failure; [`load`](Self::load) wraps
    /// it into [`RelayError::ProfileLoad`] together with the file path.
    pub fn from_json(data: &str) -> std::result::Result<Self, String> {
        let raw: ProfileFile = serde_json::from_str(data).map_err(|e| e.to_string())?;
        let name = raw.char_name.trim().to_string();
        if name.is_empty() {
            return Err("`char_name` is empty".into());
        }
        if raw.char_persona.trim().is_empty() {
            return Err("`char_persona` is empty".into());
        }

        let resolve = |text: &str| text.replace(CHAR_PLACEHOLDER, &name);
        let resolve_opt = |text: Option<String>| {
            text.filter(|t| !t.trim().is_empty())
                .map(|t| resolve(&t))
        };

        Ok(Self {
            persona: resolve(&raw.char_persona),
            greeting: resolve(&raw.char_greeting),
            scenario: resolve_opt(raw.world_scenario),
            example_dialogue: resolve_opt(Some(raw.example_dialogue)),
            personality: resolve_opt(raw.personality),
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn persona(&self) -> &str {
        &self.persona
    }

    /// The character's opening line, shown to users when a session starts.
    pub fn greeting(&self) -> &str {
        &self.greeting
    }

    pub fn scenario(&self) -> Option<&str> {
        self.scenario.as_deref()
    }

    pub fn example_dialogue(&self) -> Option<&str> {
        self.example_dialogue.as_deref()
    }

    pub fn personality(&self) -> Option<&str> {
        self.personality.as_deref()
    }

    /// Fixed text injected at the start of every prompt.
    ///
    /// The start marker closes the block only when a scenario is present;
    /// otherwise the greeting block in the transcript provides it.
    pub fn preamble(&self) -> String {
        let mut block = format!("{}'s Persona: {}\n", self.name, self.persona);
        if let Some(ref personality) = self.personality {
            block.push_str(&format!("Description of {}: {personality}\n", self.name));
        }
        if let Some(ref scenario) = self.scenario {
            block.push_str(&format!("Scenario: {scenario}\n{START_MARKER}"));
        }
        block
    }

    /// Text a fresh transcript starts with: the example dialogue (if any)
    /// followed by the start marker. Always newline-terminated.
    pub fn greeting_block(&self) -> String {
        let mut block = String::new();
        if let Some(ref example) = self.example_dialogue {
            block.push_str(&format!("Example Dialogue: {example}\n"));
        }
        block.push_str(START_MARKER);
        block.push('\n');
        block
    }

    /// The prefix every line spoken by this character starts with.
    pub fn line_prefix(&self) -> String {
        format!("{}: ", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn card(extra: &str) -> String {
        format!(
            r#"{{
                "char_name": "Bob",
                "char_persona": "{{{{char}}}} is a grumpy lighthouse keeper.",
                "char_greeting": "Hello, I'm {{{{char}}}}.",
                "example_dialogue": "{{{{char}}}}: Go away."
                {extra}
            }}"#
        )
    }

    #[test]
    fn resolves_char_placeholder_everywhere() {
        let json = card(
            r#", "world_scenario": "{{char}}'s island", "personality": "{{char}} hates gulls""#,
        );
        let profile = CharacterProfile::from_json(&json).unwrap();
        assert_eq!(profile.persona(), "Bob is a grumpy lighthouse keeper.");
        assert_eq!(profile.greeting(), "Hello, I'm Bob.");
        assert_eq!(profile.scenario(), Some("Bob's island"));
        assert_eq!(profile.example_dialogue(), Some("Bob: Go away."));
        assert_eq!(profile.personality(), Some("Bob hates gulls"));
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let profile = CharacterProfile::from_json(&card("")).unwrap();
        assert!(profile.scenario().is_none());
        assert!(profile.personality().is_none());
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let json = r#"{"char_name": "Bob", "char_persona": "p", "char_greeting": "g"}"#;
        let err = CharacterProfile::from_json(json).unwrap_err();
        assert!(err.contains("example_dialogue"), "{err}");
    }

    #[test]
    fn empty_name_is_rejected() {
        let json = r#"{"char_name": " ", "char_persona": "p", "char_greeting": "g", "example_dialogue": ""}"#;
        assert!(CharacterProfile::from_json(json).is_err());
    }

    #[test]
    fn empty_persona_is_rejected() {
        let json = r#"{"char_name": "Bob", "char_persona": "", "char_greeting": "g", "example_dialogue": ""}"#;
        assert!(CharacterProfile::from_json(json).is_err());
    }

    #[test]
    fn preamble_without_optional_sections() {
        let profile = CharacterProfile::from_json(&card("")).unwrap();
        assert_eq!(
            profile.preamble(),
            "Bob's Persona: Bob is a grumpy lighthouse keeper.\n"
        );
    }

    #[test]
    fn preamble_with_personality_and_scenario() {
        let json = card(r#", "world_scenario": "A storm", "personality": "Stubborn""#);
        let profile = CharacterProfile::from_json(&json).unwrap();
        assert_eq!(
            profile.preamble(),
            "Bob's Persona: Bob is a grumpy lighthouse keeper.\n\
             Description of Bob: Stubborn\n\
             Scenario: A storm\n<START>"
        );
    }

    #[test]
    fn greeting_block_includes_example_dialogue() {
        let profile = CharacterProfile::from_json(&card("")).unwrap();
        assert_eq!(
            profile.greeting_block(),
            "Example Dialogue: Bob: Go away.\n<START>\n"
        );
    }

    #[test]
    fn greeting_block_without_example_dialogue() {
        let json = r#"{"char_name": "Bob", "char_persona": "p", "char_greeting": "g", "example_dialogue": ""}"#;
        let profile = CharacterProfile::from_json(json).unwrap();
        assert_eq!(profile.greeting_block(), "<START>\n");
    }

    #[test]
    fn load_reports_path_on_failure() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = CharacterProfile::load(file.path()).unwrap_err();
        assert!(matches!(err, RelayError::ProfileLoad { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = CharacterProfile::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, RelayError::ProfileLoad { .. }));
    }
}
