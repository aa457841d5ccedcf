//! Bounded dialogue history
//!
//! Holds the turns of the active conversation. One exchange is a user message
//! plus an assistant message, so the store keeps at most `2 * max_turns`
//! messages and evicts the oldest first.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Role of a message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Lowercase wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    /// Capitalized name used as a speaker label in text prompts
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
            Self::System => "System",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One role-tagged message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// Ordered, size-bounded log of turns for one conversation
#[derive(Debug, Clone)]
pub struct HistoryStore {
    turns: VecDeque<Turn>,
    max_turns: usize,
}

impl HistoryStore {
    /// Create an empty store keeping at most `max_turns` exchanges
    ///
    /// A `max_turns` of zero is clamped to one so the latest exchange is
    /// always retained.
    #[must_use]
    pub fn new(max_turns: usize) -> Self {
        let max_turns = max_turns.max(1);
        Self {
            turns: VecDeque::with_capacity(max_turns * 2 + 1),
            max_turns,
        }
    }

    /// Append a turn, then evict the oldest entries until the bound holds
    pub fn append(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push_back(Turn::new(role, content));

        let capacity = self.capacity();
        let mut evicted = 0usize;
        while self.turns.len() > capacity {
            self.turns.pop_front();
            evicted += 1;
        }

        if evicted > 0 {
            tracing::trace!(evicted, len = self.turns.len(), "pruned history");
        }
    }

    /// Independent copy of the stored turns, oldest first
    #[must_use]
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    /// Remove every turn
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Content of the newest turn if it was spoken by the user
    #[must_use]
    pub fn last_user_utterance(&self) -> Option<&str> {
        self.turns
            .back()
            .filter(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
    }

    /// Iterate over stored turns, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Maximum number of stored messages (`2 * max_turns`)
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.max_turns * 2
    }

    /// Configured number of exchanges
    #[must_use]
    pub const fn max_turns(&self) -> usize {
        self.max_turns
    }
}
