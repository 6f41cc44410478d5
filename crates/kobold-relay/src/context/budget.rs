//! Context budget arithmetic.
//!
//! The backend has a fixed context length. Part of it is reserved for the
//! reply (`max_length`), part is taken by the character preamble, and what
//! remains is the room available to conversation history. [`ContextBudget`]
//! captures that split so the window only has to ask "does this fit?".

/// The token limits a [`ContextWindow`](super::ContextWindow) must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBudget {
    /// Maximum context length of the backend, in tokens.
    max_context_length: usize,
    /// Tokens reserved for the generated reply.
    reply_reserve: usize,
}

impl ContextBudget {
    pub fn new(max_context_length: usize, reply_reserve: usize) -> Self {
        Self {
            max_context_length,
            reply_reserve,
        }
    }

    pub fn max_context_length(&self) -> usize {
        self.max_context_length
    }

    pub fn reply_reserve(&self) -> usize {
        self.reply_reserve
    }

    /// Tokens available to preamble plus history: the context length minus
    /// the reply reserve. Saturates at zero.
    pub fn prompt_budget(&self) -> usize {
        self.max_context_length.saturating_sub(self.reply_reserve)
    }

    /// Tokens available to history once the preamble is accounted for.
    pub fn history_budget(&self, preamble_tokens: usize) -> usize {
        self.prompt_budget().saturating_sub(preamble_tokens)
    }

    /// Whether adding `incoming` tokens to `history_tokens` stays in budget.
    pub fn fits(&self, preamble_tokens: usize, history_tokens: usize, incoming: usize) -> bool {
        preamble_tokens + history_tokens + incoming <= self.prompt_budget()
    }

    /// Snapshot of how much of the prompt budget is in use.
    pub fn usage(&self, preamble_tokens: usize, history_tokens: usize) -> ContextUsage {
        let used_tokens = preamble_tokens + history_tokens;
        let budget = self.prompt_budget();
        let usage_pct = if budget > 0 {
            used_tokens as f64 / budget as f64
        } else {
            1.0
        };
        ContextUsage {
            used_tokens,
            budget_tokens: budget,
            usage_pct,
        }
    }
}

/// Snapshot of context usage at a point in time.
#[derive(Debug, Clone, Copy)]
pub struct ContextUsage {
    /// Preamble plus history tokens.
    pub used_tokens: usize,
    /// Prompt budget (context length minus reply reserve).
    pub budget_tokens: usize,
    /// Usage as a fraction (0.0 to 1.0+; above 1.0 only after an oversized line).
    pub usage_pct: f64,
}

impl ContextUsage {
    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "context: {} tokens ({:.0}% of {})",
            self.used_tokens,
            self.usage_pct * 100.0,
            self.budget_tokens,
        )
    }

    pub fn is_over_budget(&self) -> bool {
        self.used_tokens > self.budget_tokens
    }
}
