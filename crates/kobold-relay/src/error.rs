//! Error type shared by every relay component.

use std::path::PathBuf;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Everything that can go wrong while relaying a conversation.
///
/// Only [`RelayError::ProfileLoad`] is fatal; every other variant is surfaced
/// per request and leaves the session usable for the next attempt.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The character profile is unreadable, malformed, or missing a required field.
    #[error("failed to load character profile {}: {reason}", path.display())]
    ProfileLoad { path: PathBuf, reason: String },

    /// The backend call failed, timed out, or returned unusable data.
    #[error("generation failed: {0}")]
    Generation(String),

    /// An operation that needs a transcript was attempted before `bind`.
    #[error("conversation is not bound to a transcript yet; send a message first")]
    NotBound,

    /// Reading or writing a transcript file failed.
    #[error("transcript I/O failed for {}: {source}", path.display())]
    Transcript {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The relay was configured with values it cannot use.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RelayError {
    pub(crate) fn profile(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ProfileLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn transcript(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Transcript {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_error_names_the_file() {
        let err = RelayError::profile("chars/bob.json", "missing field `char_name`");
        let msg = err.to_string();
        assert!(msg.contains("chars/bob.json"));
        assert!(msg.contains("char_name"));
    }
}
