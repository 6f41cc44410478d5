//! Chat-platform markup in user messages.
//!
//! Messages relayed from a chat platform may contain user mentions
//! (`<@123>`, `<@!123>`) and custom emoji (`<:name:123>`, `<a:name:123>`).
//! The model only sees plain text, so mentions become display names and
//! emoji become `:name:`.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

static MENTION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@!?(\d+)>").expect("valid mention regex"));

static EMOJI_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<a?:(\w+):\d+>").expect("valid emoji regex"));

/// Looks up a display name for a platform user id.
pub trait MentionResolver {
    fn display_name(&self, user_id: &str) -> Option<String>;
}

impl MentionResolver for HashMap<String, String> {
    fn display_name(&self, user_id: &str) -> Option<String> {
        self.get(user_id).cloned()
    }
}

/// Resolves nothing; mentions are left as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMentions;

impl MentionResolver for NoMentions {
    fn display_name(&self, _user_id: &str) -> Option<String> {
        None
    }
}

/// Replace mentions with display names and custom emoji with `:name:`.
/// Mentions of unknown users are left intact.
pub fn replace_mentions<R: MentionResolver + ?Sized>(text: &str, resolver: &R) -> String {
    let text = MENTION_REGEX.replace_all(text, |caps: &Captures<'_>| {
        resolver
            .display_name(&caps[1])
            .unwrap_or_else(|| caps[0].to_string())
    });
    EMOJI_REGEX.replace_all(&text, ":$1:").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> HashMap<String, String> {
        HashMap::from([
            ("42".to_string(), "Alice".to_string()),
            ("7".to_string(), "Carol".to_string()),
        ])
    }

    #[test]
    fn mentions_become_display_names() {
        assert_eq!(
            replace_mentions("hey <@42> and <@!7>", &names()),
            "hey Alice and Carol"
        );
    }

    #[test]
    fn unknown_mentions_are_kept() {
        assert_eq!(replace_mentions("ping <@999>", &names()), "ping <@999>");
        assert_eq!(replace_mentions("ping <@42>", &NoMentions), "ping <@42>");
    }

    #[test]
    fn custom_emoji_become_shortcodes() {
        assert_eq!(
            replace_mentions("nice <:pog:123> <a:dance:456>", &NoMentions),
            "nice :pog: :dance:"
        );
    }

    #[test]
    fn plain_text_is_unchanged() {
        assert_eq!(replace_mentions("a < b > c: d", &names()), "a < b > c: d");
    }
}
