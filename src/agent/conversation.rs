// Conversation history with context window management
//
// The system message and the latest exchange (last user message onward) are
// never evicted. Everything in between goes oldest-first once the estimated
// size exceeds the budget.

use crate::config::ContextBudget;
use crate::llm::{ChatMessage, Role};

/// Role-tagged history owned by a single agent
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    budget: ContextBudget,
}

impl Conversation {
    /// Start a conversation with a persona as its system message
    pub fn new(system_prompt: impl Into<String>, budget: ContextBudget) -> Self {
        Self {
            messages: vec![ChatMessage::system(system_prompt)],
            budget,
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }

    /// Drop the trailing user message of a turn that got no reply
    pub fn pop_dangling_user(&mut self) -> Option<ChatMessage> {
        match self.messages.last() {
            Some(m) if m.role == Role::User => self.messages.pop(),
            _ => None,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn total_chars(&self) -> usize {
        self.messages.iter().map(ChatMessage::size).sum()
    }

    /// Get estimated token count (rough approximation)
    pub fn estimated_tokens(&self) -> usize {
        self.budget.estimate_tokens(self.total_chars())
    }

    /// Keep only the system message
    pub fn reset(&mut self) {
        self.messages.truncate(1);
    }

    /// Evict old messages until the conversation fits the budget.
    ///
    /// Returns how many messages were removed. If the protected messages alone
    /// are over budget they are kept and a warning is logged.
    pub fn truncate(&mut self) -> usize {
        let limit = self.budget.char_limit();
        let mut total = self.total_chars();
        let mut evicted = 0;

        while total > limit {
            let first = usize::from(self.messages.first().map(|m| m.role) == Some(Role::System));
            let protected_from = self
                .messages
                .iter()
                .rposition(|m| m.role == Role::User)
                .unwrap_or(self.messages.len());

            if first >= protected_from {
                tracing::warn!(
                    "Conversation still ~{} tokens over budget after truncation; sending anyway",
                    self.budget.estimate_tokens(total - limit)
                );
                break;
            }

            let removed = self.messages.remove(first);
            total -= removed.size();
            evicted += 1;
        }

        if evicted > 0 {
            tracing::debug!(
                "Truncated {} messages, ~{} tokens remain",
                evicted,
                self.estimated_tokens()
            );
        }
        evicted
    }
}
