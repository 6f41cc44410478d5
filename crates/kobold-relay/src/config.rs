//! Configuration types.
//!
//! Two kinds of configuration live here:
//!
//! - [`GenerationConfig`] - the live key → value map merged into every
//!   generation request (sampling parameters, stop sequences, context and
//!   reply lengths). One instance is shared by all sessions and operators can
//!   change it at runtime; every subsequent generation sees the change.
//! - [`RelayConfig`] - static process settings (profile path, backend
//!   endpoint, chat log directory, timeouts), fixed at startup.

use crate::context::ContextBudget;
use crate::error::{RelayError, Result};
use crate::tokenizer::DEFAULT_CHARS_PER_TOKEN;
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Default backend context length in tokens.
pub const DEFAULT_MAX_CONTEXT_LENGTH: usize = 2048;

/// Default number of tokens reserved for each reply.
pub const DEFAULT_MAX_LENGTH: usize = 150;

/// Config key for the backend context length.
pub const MAX_CONTEXT_LENGTH_KEY: &str = "max_context_length";

/// Config key for the reply length.
pub const MAX_LENGTH_KEY: &str = "max_length";

/// Config key for the stop sequence list.
pub const STOP_SEQUENCE_KEY: &str = "stop_sequence";

/// Stop sequence that limits replies to a single line.
pub const NEWLINE_STOP: &str = "\n";

/// Shared handle to the process-wide generation config.
pub type SharedConfig = Arc<Mutex<GenerationConfig>>;

// ── GenerationConfig ──────────────────────────────────────────────

/// Mutable generation parameters sent with every backend request.
///
/// Values are stored as JSON so that operators can set any parameter the
/// backend understands, including ones this crate has never heard of.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    values: Map<String, Value>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        let defaults = json!({
            "use_story": false,
            "use_authors_note": false,
            "use_world_info": false,
            "use_memory": false,
            "max_context_length": DEFAULT_MAX_CONTEXT_LENGTH,
            "max_length": DEFAULT_MAX_LENGTH,
            "rep_pen": 1.19,
            "rep_pen_range": 1024,
            "rep_pen_slope": 0.9,
            "temperature": 0.79,
            "tfs": 0.95,
            "top_a": 0,
            "top_k": 0,
            "top_p": 0.9,
            "typical": 1,
            "n": 1,
            "sampler_order": [6, 0, 1, 2, 3, 4, 5],
            "stop_sequence": ["\\<START\\>", "<START>", "<STOP>", "<END>", "User:"],
        });
        let values = match defaults {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { values }
    }
}

impl GenerationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap this config for sharing across sessions.
    pub fn into_shared(self) -> SharedConfig {
        Arc::new(Mutex::new(self))
    }

    /// Load a JSON object of overrides and merge it over the defaults.
    pub fn load_overrides(&mut self, path: &Path) -> Result<()> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!(
                "failed to read generation config {}: {e}",
                path.display()
            ))
        })?;
        let overrides: Map<String, Value> = serde_json::from_str(&data).map_err(|e| {
            RelayError::Config(format!(
                "generation config {} is not a JSON object: {e}",
                path.display()
            ))
        })?;
        debug!(
            "Applying {} generation override(s) from {}",
            overrides.len(),
            path.display()
        );
        self.values.extend(overrides);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Set a parameter, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    /// Set a parameter from operator-supplied text.
    ///
    /// The text is parsed as JSON (`0.7`, `true`, `[1, 2]`, `"quoted"`);
    /// anything that isn't valid JSON is stored as a plain string.
    pub fn set_from_str(&mut self, key: impl Into<String>, raw: &str) -> Value {
        let value = serde_json::from_str::<Value>(raw.trim())
            .unwrap_or_else(|_| Value::String(raw.to_string()));
        self.values.insert(key.into(), value.clone());
        value
    }

    pub fn max_context_length(&self) -> usize {
        self.usize_or(MAX_CONTEXT_LENGTH_KEY, DEFAULT_MAX_CONTEXT_LENGTH)
    }

    pub fn max_length(&self) -> usize {
        self.usize_or(MAX_LENGTH_KEY, DEFAULT_MAX_LENGTH)
    }

    /// Context budget implied by the current context and reply lengths.
    pub fn budget(&self) -> ContextBudget {
        ContextBudget::new(self.max_context_length(), self.max_length())
    }

    /// Numeric parameters may arrive as integers or as floats (`2048.0`)
    /// depending on how an operator set them.
    fn usize_or(&self, key: &str, default: usize) -> usize {
        match self.values.get(key) {
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .map_or(default, |v| v as usize),
            _ => default,
        }
    }

    /// Current stop sequences, in order.
    pub fn stop_sequences(&self) -> Vec<String> {
        match self.values.get(STOP_SEQUENCE_KEY) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Append a stop sequence if it is not already present.
    pub fn add_stop_sequence(&mut self, stop: &str) -> bool {
        self.with_stop_list(|list| {
            if list.iter().any(|v| v.as_str() == Some(stop)) {
                return false;
            }
            list.push(Value::String(stop.to_string()));
            true
        })
    }

    /// Remove every occurrence of a stop sequence.
    pub fn remove_stop_sequence(&mut self, stop: &str) -> bool {
        self.with_stop_list(|list| {
            let before = list.len();
            list.retain(|v| v.as_str() != Some(stop));
            list.len() != before
        })
    }

    /// Whether replies may span multiple lines (no newline stop sequence).
    pub fn multiline_enabled(&self) -> bool {
        !self.stop_sequences().iter().any(|s| s == NEWLINE_STOP)
    }

    /// Allow or forbid multi-line replies by toggling the newline stop sequence.
    pub fn set_multiline(&mut self, enabled: bool) {
        if enabled {
            self.remove_stop_sequence(NEWLINE_STOP);
        } else {
            self.add_stop_sequence(NEWLINE_STOP);
        }
    }

    /// Run `f` on the stop sequence list. A missing list is created, and one
    /// an operator replaced with a non-list value is reset to empty.
    fn with_stop_list<R>(&mut self, f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        let mut list = match self.values.remove(STOP_SEQUENCE_KEY) {
            Some(Value::Array(list)) => list,
            _ => Vec::new(),
        };
        let out = f(&mut list);
        self.values.insert(STOP_SEQUENCE_KEY.to_string(), Value::Array(list));
        out
    }

    /// Request body: the prompt merged with every config value.
    ///
    /// The prompt always wins over a config key of the same name.
    pub fn request_body(&self, prompt: &str) -> Value {
        let mut body = self.values.clone();
        body.insert("prompt".into(), Value::String(prompt.to_string()));
        Value::Object(body)
    }
}

// ── RelayConfig ───────────────────────────────────────────────────

/// Static process configuration for the relay.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Character card to speak as. Default: `chardata.json`.
    pub profile: PathBuf,
    /// Base URL of the KoboldAI-compatible backend. Default: `http://localhost:5000`.
    pub endpoint: String,
    /// Directory holding one transcript per character and channel. Default: `chatlogs`.
    pub chatlog_dir: PathBuf,
    /// Timeout for a single generation request. Default: 120 seconds.
    pub timeout: Duration,
    /// Optional JSON file of generation parameter overrides.
    pub generation_overrides: Option<PathBuf>,
    /// Channel key the terminal front end talks in. Default: `terminal`.
    pub channel: String,
    /// Speaker name for terminal input. Default: `$USER`, else `User`.
    pub speaker: String,
    /// Characters per token for the estimating tokenizer. Default: `3.5`.
    pub chars_per_token: f64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            profile: PathBuf::from("chardata.json"),
            endpoint: "http://localhost:5000".to_string(),
            chatlog_dir: PathBuf::from("chatlogs"),
            timeout: Duration::from_secs(120),
            generation_overrides: None,
            channel: "terminal".to_string(),
            speaker: default_speaker(),
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

/// Name of the local user, for terminal sessions.
pub fn default_speaker() -> String {
    std::env::var("USER")
        .ok()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| "User".to_string())
}

impl RelayConfig {
    /// Build the initial generation config, applying overrides if configured.
    pub fn generation_config(&self) -> Result<GenerationConfig> {
        let mut config = GenerationConfig::default();
        if let Some(ref path) = self.generation_overrides {
            config.load_overrides(path)?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_llama_tuning() {
        let config = GenerationConfig::default();
        assert_eq!(config.max_context_length(), 2048);
        assert_eq!(config.max_length(), 150);
        assert_eq!(config.get("temperature"), Some(&json!(0.79)));
        assert_eq!(config.budget().prompt_budget(), 1898);
        assert!(config.stop_sequences().contains(&"<START>".to_string()));
    }

    #[test]
    fn set_from_str_parses_json_values() {
        let mut config = GenerationConfig::default();
        assert_eq!(config.set_from_str("temperature", "0.5"), json!(0.5));
        assert_eq!(config.set_from_str("use_memory", "true"), json!(true));
        assert_eq!(config.set_from_str("note", "plain text"), json!("plain text"));
        assert_eq!(config.get("note"), Some(&json!("plain text")));
    }

    #[test]
    fn float_lengths_are_accepted() {
        let mut config = GenerationConfig::default();
        config.set_from_str(MAX_CONTEXT_LENGTH_KEY, "4096.0");
        config.set(MAX_LENGTH_KEY, json!(200));
        assert_eq!(config.max_context_length(), 4096);
        assert_eq!(config.budget().prompt_budget(), 3896);
    }

    #[test]
    fn invalid_lengths_fall_back_to_defaults() {
        let mut config = GenerationConfig::default();
        config.set(MAX_LENGTH_KEY, json!("lots"));
        config.set(MAX_CONTEXT_LENGTH_KEY, json!(-5.0));
        assert_eq!(config.max_length(), DEFAULT_MAX_LENGTH);
        assert_eq!(config.max_context_length(), DEFAULT_MAX_CONTEXT_LENGTH);
    }

    #[test]
    fn stop_sequences_deduplicate() {
        let mut config = GenerationConfig::default();
        assert!(config.add_stop_sequence("Alice:"));
        assert!(!config.add_stop_sequence("Alice:"));
        let count = config
            .stop_sequences()
            .iter()
            .filter(|s| *s == "Alice:")
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn multiline_toggle_controls_newline_stop() {
        let mut config = GenerationConfig::default();
        assert!(config.multiline_enabled());
        config.set_multiline(false);
        assert!(!config.multiline_enabled());
        config.set_multiline(false);
        assert_eq!(
            config.stop_sequences().iter().filter(|s| *s == "\n").count(),
            1
        );
        config.set_multiline(true);
        assert!(config.multiline_enabled());
    }

    #[test]
    fn stop_list_is_repaired_when_clobbered() {
        let mut config = GenerationConfig::default();
        config.set(STOP_SEQUENCE_KEY, json!(3));
        assert!(config.add_stop_sequence("Bob:"));
        assert_eq!(config.stop_sequences(), vec!["Bob:".to_string()]);
    }

    #[test]
    fn request_body_merges_prompt_and_config() {
        let mut config = GenerationConfig::default();
        config.set("prompt", json!("operator junk"));
        let body = config.request_body("Bob:");
        assert_eq!(body["prompt"], "Bob:");
        assert_eq!(body["max_length"], 150);
        assert!(body["stop_sequence"].is_array());
    }

    #[test]
    fn overrides_file_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gen.json");
        std::fs::write(&path, r#"{"temperature": 1.1, "max_length": 80}"#).unwrap();

        let relay = RelayConfig {
            generation_overrides: Some(path),
            ..Default::default()
        };
        let config = relay.generation_config().unwrap();
        assert_eq!(config.get("temperature"), Some(&json!(1.1)));
        assert_eq!(config.max_length(), 80);
        assert_eq!(config.get("tfs"), Some(&json!(0.95)));
    }

    #[test]
    fn relay_defaults() {
        let relay = RelayConfig::default();
        assert_eq!(relay.endpoint, "http://localhost:5000");
        assert_eq!(relay.channel, "terminal");
        assert_eq!(relay.timeout, Duration::from_secs(120));
        assert!(!relay.speaker.is_empty());
    }

    #[test]
    fn overrides_must_be_an_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gen.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        let mut config = GenerationConfig::default();
        assert!(matches!(
            config.load_overrides(&path),
            Err(RelayError::Config(_))
        ));
    }
}
