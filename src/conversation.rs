//! Conversation Log
//!
//! Process-wide bounded message history shared by all inbound requests.
//! An explicit reset command clears it; otherwise it is append-only with
//! window truncation. Concurrent writers race most-recent-write-wins,
//! which matches the single-user deployment this backend targets.

use crate::config::MAX_HISTORY_TURNS;
use crate::llm::ChatMessage;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::info;

/// Bounded in-memory conversation history.
pub struct ConversationLog {
    turns: Mutex<VecDeque<ChatMessage>>,
    max_turns: usize,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::with_capacity(MAX_HISTORY_TURNS)
    }

    pub fn with_capacity(max_turns: usize) -> Self {
        Self {
            turns: Mutex::new(VecDeque::new()),
            max_turns,
        }
    }

    /// Append a turn, truncating the window from the front.
    pub fn push(&self, message: ChatMessage) {
        let mut turns = self.turns.lock();
        turns.push_back(message);
        while turns.len() > self.max_turns {
            turns.pop_front();
        }
    }

    /// Last `limit` turns in chronological order.
    pub fn recent(&self, limit: usize) -> Vec<ChatMessage> {
        let turns = self.turns.lock();
        let skip = turns.len().saturating_sub(limit);
        turns.iter().skip(skip).cloned().collect()
    }

    /// Clear all history. Returns the number of turns removed.
    pub fn clear(&self) -> usize {
        let mut turns = self.turns.lock();
        let removed = turns.len();
        turns.clear();
        info!("Conversation history cleared ({} turns)", removed);
        removed
    }

    pub fn len(&self) -> usize {
        self.turns.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.lock().is_empty()
    }
}

impl Default for ConversationLog {
    fn default() -> Self {
        Self::new()
    }
}

/// True when a user message is an explicit history-reset command.
pub fn is_reset_command(message: &str) -> bool {
    matches!(
        message.trim().to_lowercase().as_str(),
        "clear" | "reset" | "清除" | "重置"
    )
}
