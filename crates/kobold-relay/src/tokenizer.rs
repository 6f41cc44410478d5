//! Token counting.
//!
//! The relay never tokenizes for real; it only needs to know how many tokens
//! a line will cost in the backend's context window. That question is
//! answered by a [`Tokenizer`] supplied by the caller. Two implementations
//! ship with the crate:
//!
//! - [`CharRatioTokenizer`] - a chars-per-token estimate. Cheap, no model
//!   files, good enough when the backend's context length has some slack.
//! - `BpeTokenizer` - exact BPE counts via `tiktoken-rs`, behind the
//!   `tiktoken` cargo feature.
//!
//! Any `Fn(&str) -> usize` closure is also a tokenizer, which keeps tests
//! deterministic.

/// Default characters per token (conservative estimate for English text).
/// Most tokenizers average 3-4 chars per token; we use 3.5 as a middle ground.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Counts the tokens a piece of text occupies in the backend's context.
///
/// Implementations must be deterministic and side-effect free: the context
/// window relies on `count` returning the same value for the same line when
/// it is pushed and when it is later evicted.
pub trait Tokenizer: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

impl<F> Tokenizer for F
where
    F: Fn(&str) -> usize + Send + Sync,
{
    fn count(&self, text: &str) -> usize {
        self(text)
    }
}

/// Estimates token counts from the character count of the text.
#[derive(Debug, Clone, Copy)]
pub struct CharRatioTokenizer {
    chars_per_token: f64,
}

impl CharRatioTokenizer {
    /// Create an estimator with a custom ratio. Non-positive ratios fall back
    /// to [`DEFAULT_CHARS_PER_TOKEN`].
    pub fn new(chars_per_token: f64) -> Self {
        let chars_per_token = if chars_per_token > 0.0 {
            chars_per_token
        } else {
            DEFAULT_CHARS_PER_TOKEN
        };
        Self { chars_per_token }
    }

    pub fn chars_per_token(&self) -> f64 {
        self.chars_per_token
    }
}

impl Default for CharRatioTokenizer {
    fn default() -> Self {
        Self::new(DEFAULT_CHARS_PER_TOKEN)
    }
}

impl Tokenizer for CharRatioTokenizer {
    fn count(&self, text: &str) -> usize {
        let chars = text.chars().count();
        (chars as f64 / self.chars_per_token).ceil() as usize
    }
}

/// Exact token counts using a tiktoken BPE vocabulary.
#[cfg(feature = "tiktoken")]
pub struct BpeTokenizer {
    bpe: tiktoken_rs::CoreBPE,
}

#[cfg(feature = "tiktoken")]
impl BpeTokenizer {
    /// Load the `cl100k_base` vocabulary.
    pub fn cl100k() -> crate::Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| crate::RelayError::Config(format!("failed to load cl100k_base: {e}")))?;
        Ok(Self { bpe })
    }
}

#[cfg(feature = "tiktoken")]
impl Tokenizer for BpeTokenizer {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}
