//! Context window management: budgets and the rolling history window.
//!
//! The backend's context length is fixed while a conversation grows without
//! bound. This module decides which lines of history stay in the prompt:
//!
//! 1. **[`budget`]** - [`ContextBudget`] splits the backend's context length
//!    into the reply reserve and the room left for preamble plus history.
//!
//! 2. **[`window`]** - [`ContextWindow`] is a strict FIFO of history lines
//!    that evicts the oldest entries before each push until the new line fits.

pub mod budget;
pub mod window;

// Re-export commonly used items at the module level.
pub use budget::{ContextBudget, ContextUsage};
pub use window::{ContextWindow, HistoryLine};
