use super::role::Role;
use serde::{Deserialize, Serialize};

/// A message as the browser ui sees it, the role is carried as a flag
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub is_assistant: bool,
    pub content: String,
}

impl ChatMessage {
    pub fn user<S: Into<String>>(content: S) -> Self {
        ChatMessage {
            is_assistant: false,
            content: content.into(),
        }
    }

    pub fn assistant<S: Into<String>>(content: S) -> Self {
        ChatMessage {
            is_assistant: true,
            content: content.into(),
        }
    }

    pub fn role(&self) -> Role {
        if self.is_assistant {
            Role::Assistant
        } else {
            Role::User
        }
    }
}

/// The full running conversation, oldest message first
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }
}
