//! Token-budgeted FIFO of conversation history.
//!
//! Lines are physically stored newest-first: pushes insert at the front and
//! eviction pops from the back. Every read path reverses that, so callers
//! always observe chronological order.

use super::budget::{ContextBudget, ContextUsage};
use crate::tokenizer::Tokenizer;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// One line of conversation history together with its cached token cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryLine {
    text: String,
    token_count: usize,
    speaker: Option<String>,
}

impl HistoryLine {
    fn new(text: String, token_count: usize) -> Self {
        let speaker = text
            .split_once(": ")
            .map(|(who, _)| who.trim())
            .filter(|who| !who.is_empty())
            .map(str::to_string);
        Self {
            text,
            token_count,
            speaker,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn token_count(&self) -> usize {
        self.token_count
    }

    /// Text before the first `": "`, if the line has that shape.
    pub fn speaker(&self) -> Option<&str> {
        self.speaker.as_deref()
    }
}

/// Ordered, token-budgeted queue of history lines.
///
/// Invariant: `preamble_tokens + total_tokens ≤ budget.prompt_budget()` after
/// every push, unless a single line is larger than the whole history budget.
/// Such a line is accepted on its own (nothing older is left to evict and the
/// line itself is never evicted), and the overflow is logged.
#[derive(Clone)]
pub struct ContextWindow {
    /// Newest first.
    lines: VecDeque<HistoryLine>,
    total_tokens: usize,
    preamble_tokens: usize,
    budget: ContextBudget,
    tokenizer: Arc<dyn Tokenizer>,
}

impl fmt::Debug for ContextWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextWindow")
            .field("lines", &self.lines.len())
            .field("total_tokens", &self.total_tokens)
            .field("preamble_tokens", &self.preamble_tokens)
            .field("budget", &self.budget)
            .finish()
    }
}

impl ContextWindow {
    /// Create an empty window. The preamble's token cost is computed once
    /// here and cached for the window's lifetime.
    pub fn new(tokenizer: Arc<dyn Tokenizer>, preamble: &str, budget: ContextBudget) -> Self {
        let preamble_tokens = tokenizer.count(preamble);
        Self {
            lines: VecDeque::new(),
            total_tokens: 0,
            preamble_tokens,
            budget,
            tokenizer,
        }
    }

    /// Replace the budget used by subsequent pushes.
    ///
    /// Lines already retained are not re-evicted; a tighter budget takes
    /// effect on the next push.
    pub fn set_budget(&mut self, budget: ContextBudget) {
        self.budget = budget;
    }

    pub fn budget(&self) -> ContextBudget {
        self.budget
    }

    /// Push a line as the newest entry, evicting the oldest entries first
    /// until it fits. Returns how many lines were evicted.
    pub fn push(&mut self, line: impl Into<String>) -> usize {
        let mut text = line.into();
        let trimmed_len = text.trim_end_matches(['\r', '\n']).len();
        text.truncate(trimmed_len);

        let token_count = self.tokenizer.count(&text);
        let mut evicted = 0;
        while !self
            .budget
            .fits(self.preamble_tokens, self.total_tokens, token_count)
        {
            let Some(oldest) = self.lines.pop_back() else {
                break;
            };
            self.total_tokens -= oldest.token_count;
            evicted += 1;
            trace!("Evicted {} token(s): {:?}", oldest.token_count, oldest.text);
        }

        if !self
            .budget
            .fits(self.preamble_tokens, self.total_tokens, token_count)
        {
            warn!(
                "Line of {token_count} tokens exceeds the history budget of {} tokens; keeping it anyway",
                self.budget.history_budget(self.preamble_tokens)
            );
        }

        self.total_tokens += token_count;
        self.lines.push_front(HistoryLine::new(text, token_count));

        if evicted > 0 {
            debug!(
                "Evicted {evicted} line(s) to make room; {}",
                self.usage().to_log_string()
            );
        }
        evicted
    }

    /// Push several lines in order. Returns the total number of evictions.
    pub fn push_lines<I, S>(&mut self, lines: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lines.into_iter().map(|line| self.push(line)).sum()
    }

    /// Remove the line at chronological position `index` (0 = oldest).
    pub fn remove_at(&mut self, index: usize) -> Option<HistoryLine> {
        let physical = self.lines.len().checked_sub(index)?.checked_sub(1)?;
        let removed = self.lines.remove(physical)?;
        self.total_tokens -= removed.token_count;
        Some(removed)
    }

    /// Chronological index of the newest line matching `pred`.
    pub fn rposition(&self, mut pred: impl FnMut(&HistoryLine) -> bool) -> Option<usize> {
        let physical = self.lines.iter().position(|line| pred(line))?;
        Some(self.lines.len() - 1 - physical)
    }

    /// All lines, oldest first, each terminated by a newline.
    pub fn render_oldest_first(&self) -> String {
        let mut out = String::with_capacity(self.lines.iter().map(|l| l.text.len() + 1).sum());
        for line in self.lines() {
            out.push_str(&line.text);
            out.push('\n');
        }
        out
    }

    /// Iterate lines oldest first.
    pub fn lines(&self) -> impl DoubleEndedIterator<Item = &HistoryLine> + ExactSizeIterator {
        self.lines.iter().rev()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.total_tokens = 0;
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of the token counts of every retained line.
    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    pub fn preamble_tokens(&self) -> usize {
        self.preamble_tokens
    }

    pub fn usage(&self) -> ContextUsage {
        self.budget.usage(self.preamble_tokens, self.total_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(text: &str) -> usize {
        text.split_whitespace().count()
    }

    /// Window with no preamble cost and `room` tokens of history budget.
    fn window(room: usize) -> ContextWindow {
        ContextWindow::new(Arc::new(words), "", ContextBudget::new(room + 10, 10))
    }

    fn texts(window: &ContextWindow) -> Vec<&str> {
        window.lines().map(HistoryLine::text).collect()
    }

    fn retained_sum(window: &ContextWindow) -> usize {
        window.lines().map(HistoryLine::token_count).sum()
    }

    #[test]
    fn fifo_eviction_keeps_newest() {
        let mut w = window(4);
        w.push("a b");
        w.push("c d");
        let evicted = w.push("e f");
        assert_eq!(evicted, 1);
        assert_eq!(texts(&w), vec!["c d", "e f"]);
    }

    #[test]
    fn total_tokens_never_drifts() {
        let mut w = window(7);
        for line in ["one", "two words", "three more words", "x", "a b c d e", "y z"] {
            w.push(line);
            assert_eq!(w.total_tokens(), retained_sum(&w));
            assert!(w.total_tokens() <= 7);
        }
        w.remove_at(0);
        assert_eq!(w.total_tokens(), retained_sum(&w));
        w.clear();
        assert_eq!(w.total_tokens(), 0);
        assert!(w.is_empty());
    }

    #[test]
    fn preamble_counts_against_budget() {
        let mut w = ContextWindow::new(Arc::new(words), "p q r", ContextBudget::new(15, 10));
        assert_eq!(w.preamble_tokens(), 3);
        w.push("a");
        w.push("b");
        w.push("c");
        assert_eq!(texts(&w), vec!["b", "c"]);
    }

    #[test]
    fn oversized_line_is_accepted_alone() {
        let mut w = window(3);
        w.push("a");
        w.push("b");
        let evicted = w.push("one two three four five");
        assert_eq!(evicted, 2);
        assert_eq!(texts(&w), vec!["one two three four five"]);
        assert_eq!(w.total_tokens(), 5);
        assert!(w.usage().is_over_budget());

        // The next push evicts the oversized line like any other.
        w.push("c");
        assert_eq!(texts(&w), vec!["c"]);
    }

    #[test]
    fn renders_chronologically() {
        let mut w = window(100);
        w.push("Alice: hi");
        w.push("Bob: hello");
        w.push("Alice: bye");
        assert_eq!(
            w.render_oldest_first(),
            "Alice: hi\nBob: hello\nAlice: bye\n"
        );
    }

    #[test]
    fn empty_window_renders_nothing() {
        assert_eq!(window(10).render_oldest_first(), "");
    }

    #[test]
    fn push_strips_trailing_newlines() {
        let mut w = window(10);
        w.push("Alice: hi\r\n");
        assert_eq!(w.render_oldest_first(), "Alice: hi\n");
    }

    #[test]
    fn remove_at_uses_chronological_index() {
        let mut w = window(100);
        w.push_lines(["a", "b c", "d"]);
        let removed = w.remove_at(1).unwrap();
        assert_eq!(removed.text(), "b c");
        assert_eq!(texts(&w), vec!["a", "d"]);
        assert_eq!(w.total_tokens(), 2);
        assert!(w.remove_at(5).is_none());
        assert!(w.remove_at(usize::MAX).is_none());
        assert_eq!(texts(&w), vec!["a", "d"]);
    }

    #[test]
    fn rposition_finds_newest_match() {
        let mut w = window(100);
        w.push_lines(["Bob: one", "Alice: two", "Bob: three", "Alice: four"]);
        let idx = w.rposition(|l| l.speaker() == Some("Bob")).unwrap();
        assert_eq!(idx, 2);
        assert!(w.rposition(|l| l.speaker() == Some("Carol")).is_none());
    }

    #[test]
    fn speaker_is_parsed_from_prefix() {
        let mut w = window(100);
        w.push_lines(["Alice: hi there", "<START>"]);
        let speakers: Vec<_> = w.lines().map(HistoryLine::speaker).collect();
        assert_eq!(speakers, vec![Some("Alice"), None]);
    }

    #[test]
    fn tighter_budget_applies_on_next_push() {
        let mut w = window(10);
        w.push_lines(["a b", "c d", "e f"]);
        w.set_budget(ContextBudget::new(13, 10));
        assert_eq!(w.len(), 3);
        w.push("g");
        assert_eq!(texts(&w), vec!["e f", "g"]);
    }
}
