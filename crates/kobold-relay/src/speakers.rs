//! Participants seen during this process lifetime.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Shared handle to the process-wide speaker set.
pub type SharedSpeakers = Arc<Mutex<SeenSpeakers>>;

/// Insertion-ordered set of speaker names. Grows monotonically.
///
/// Used in two places: every new speaker gets a `"<name>:"` stop sequence,
/// and the [`ResponseParser`](crate::parser::ResponseParser) cuts replies
/// where the backend starts speaking as a known participant.
#[derive(Debug, Clone, Default)]
pub struct SeenSpeakers {
    order: Vec<String>,
    index: HashSet<String>,
}

impl SeenSpeakers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedSpeakers {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Record a speaker. Returns `true` if the name was not seen before.
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.index.contains(&name) {
            return false;
        }
        self.index.insert(name.clone());
        self.order.push(name);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains(name)
    }

    /// Names in the order they were first seen.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
