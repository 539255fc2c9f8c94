// Chat message types and OpenAI-compatible wire format
//
// `ChatMessage` is what agents and conversations work with. The `Wire*` types
// mirror the /v1/chat/completions request/response shapes and never leave
// this module tree.

use serde::{Deserialize, Serialize};

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single role-tagged message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Serialized size used for context budgeting
    pub fn size(&self) -> usize {
        self.content.len()
    }
}

// ── Wire types ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub(crate) struct WireRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "is_false")]
    pub stream: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireResponse {
    pub choices: Vec<WireChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireChoice {
    pub message: WireResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireResponseMessage {
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireStreamChunk {
    pub choices: Vec<WireStreamChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireStreamChoice {
    pub delta: WireDelta,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireDelta {
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireModelList {
    pub data: Vec<WireModel>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireModel {
    pub id: String,
}

impl WireResponse {
    /// Extract the first choice's text, rejecting empty or missing content
    pub fn into_text(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
    }
}
