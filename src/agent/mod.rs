// Agents - role-scoped conversations with the inference backend
//
// An `Agent` owns one conversation and turns a user message into a validated
// assistant reply. The task contracts (implement, verify, advise) are built on
// top of `Agent::chat` in their own modules.

use std::sync::Arc;
use thiserror::Error;

use crate::config::{ContextBudget, Settings};
use crate::llm::{ClientError, InferenceBackend};
use crate::workspace::WorkspaceError;

pub mod advisor;
pub mod checks;
pub mod conversation;
pub mod factory;
pub mod implementer;
pub mod roles;
pub mod verifier;

pub use advisor::Advice;
pub use checks::{CheckOutcome, CheckResult, CheckRunner};
pub use conversation::Conversation;
pub use factory::LlmRoleFactory;
pub use implementer::{ImplementationPlan, ImplementationResult};
pub use roles::{AgentRole, RoleAgent, RoleContext, RoleFactory, Task, TaskKind, TaskOutput};
pub use verifier::{CriterionResult, CriterionStatus, VerificationResult};

/// Agent-level failures
#[derive(Error, Debug)]
pub enum AgentError {
    /// The backend kept answering with nothing usable
    #[error("{role} got no usable reply after {attempts} attempts: {reason}")]
    TurnFailure {
        role: AgentRole,
        attempts: u32,
        reason: String,
    },

    #[error(transparent)]
    Backend(#[from] ClientError),

    /// The reply arrived but does not satisfy the task contract
    #[error("{role} returned unusable output: {reason}")]
    Contract { role: AgentRole, reason: String },

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

/// Per-agent knobs taken from `Settings`
#[derive(Debug, Clone, Copy)]
pub struct AgentOptions {
    pub context: ContextBudget,
    pub turn_attempts: u32,
    pub stream: bool,
}

impl AgentOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            context: settings.context,
            turn_attempts: settings.turn_attempts.max(1),
            stream: settings.stream,
        }
    }
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// A role-scoped conversational wrapper around the inference backend
pub struct Agent {
    role: AgentRole,
    backend: Arc<dyn InferenceBackend>,
    conversation: Conversation,
    options: AgentOptions,
}

impl Agent {
    pub fn new(role: AgentRole, backend: Arc<dyn InferenceBackend>, options: AgentOptions) -> Self {
        Self {
            role,
            backend,
            conversation: Conversation::new(role.persona(), options.context),
            options,
        }
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Send a message and return the assistant's reply.
    ///
    /// Invalid or blank replies are retried up to `turn_attempts` times. Other
    /// backend errors propagate at once. Either way a failed turn leaves the
    /// conversation as it was before the call.
    pub async fn chat(&mut self, message: impl Into<String>) -> Result<String, AgentError> {
        self.conversation.push_user(message);
        self.conversation.truncate();

        let attempts = self.options.turn_attempts.max(1);
        let mut last_reason = String::new();

        for attempt in 1..=attempts {
            match self.request().await {
                Ok(reply) if !reply.trim().is_empty() => {
                    self.conversation.push_assistant(reply.clone());
                    return Ok(reply);
                }
                Ok(_) => last_reason = "blank reply".to_string(),
                Err(ClientError::InvalidResponse { reason, .. }) => last_reason = reason,
                Err(e) => {
                    self.conversation.pop_dangling_user();
                    return Err(AgentError::Backend(e));
                }
            }
            tracing::warn!(
                "{} turn attempt {}/{} failed: {}",
                self.role,
                attempt,
                attempts,
                last_reason
            );
        }

        self.conversation.pop_dangling_user();
        Err(AgentError::TurnFailure {
            role: self.role,
            attempts,
            reason: last_reason,
        })
    }

    async fn request(&self) -> Result<String, ClientError> {
        self.backend
            .complete(self.conversation.messages(), self.options.stream)
            .await?
            .into_text()
            .await
    }

    /// Start a new exchange without the history of earlier ones
    pub fn reset(&mut self) {
        self.conversation.reset();
    }
}

/// Strip a surrounding markdown code fence (with optional language tag)
pub fn strip_markdown_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let mut lines: Vec<&str> = trimmed.lines().skip(1).collect();
    if lines.last().map(|l| l.trim() == "```").unwrap_or(false) {
        lines.pop();
    }
    lines.join("\n")
}


#[cfg(test)]
mod tests {
    use super::testing::{Reply, ScriptedBackend};
    use super::*;
    use crate::llm::Role;

    fn agent(backend: Arc<ScriptedBackend>) -> Agent {
        Agent::new(AgentRole::Implementer, backend, AgentOptions::default())
    }

    #[tokio::test]
    async fn test_chat_appends_exchange() {
        let backend = ScriptedBackend::texts(["hello back"]);
        let mut agent = agent(backend.clone());

        let reply = agent.chat("hello").await.unwrap();
        assert_eq!(reply, "hello back");

        let messages = agent.conversation().messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "hello");
        assert_eq!(messages[2].role, Role::Assistant);

        // The backend saw system + user
        let sent = &backend.requests.lock().unwrap()[0];
        assert_eq!(sent.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_reply_retried_at_turn_level() {
        let backend = ScriptedBackend::new(vec![Reply::Invalid, Reply::Text("ok".into())]);
        let mut agent = agent(backend.clone());
        assert_eq!(agent.chat("q").await.unwrap(), "ok");
        assert_eq!(backend.request_count(), 2);
    }

    #[tokio::test]
    async fn test_blank_replies_exhaust_turn() {
        let backend = ScriptedBackend::texts(["   ", ""]);
        let mut agent = agent(backend.clone());

        let err = agent.chat("q").await.unwrap_err();
        assert!(matches!(err, AgentError::TurnFailure { attempts: 2, .. }));
        // Dangling user message removed
        assert_eq!(agent.conversation().len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_propagates_without_retry() {
        let backend = ScriptedBackend::new(vec![Reply::Unreachable, Reply::Text("late".into())]);
        let mut agent = agent(backend.clone());

        let err = agent.chat("q").await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::Backend(ClientError::UnreachableBackend { .. })
        ));
        assert_eq!(backend.request_count(), 1);
        assert_eq!(agent.conversation().len(), 1);
    }

    #[test]
    fn test_strip_markdown_fences() {
        assert_eq!(
            strip_markdown_fences("```python\ndef f():\n    pass\n```"),
            "def f():\n    pass"
        );
        assert_eq!(strip_markdown_fences("```\nx = 1\n```\n"), "x = 1");
        assert_eq!(strip_markdown_fences("x = 1"), "x = 1");
        // Unterminated fence keeps the body
        assert_eq!(strip_markdown_fences("```js\nlet a;"), "let a;");
    }
}
