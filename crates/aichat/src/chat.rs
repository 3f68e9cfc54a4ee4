use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use serde_json::json;

use crate::models::chat::{ChatMessage, ChatRequest};
use crate::models::message::Message;
use crate::prompt_template::load_prompt;
use crate::providers::base::Provider;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");

/// The poem shape the assistant is held to
#[derive(Clone, Debug, Serialize)]
pub struct PoemForm {
    pub name: String,
    pub lines: u32,
    pub rhyme_scheme: String,
}

impl Default for PoemForm {
    fn default() -> Self {
        Self {
            name: "limerick".to_string(),
            lines: 5,
            rhyme_scheme: "AABBA".to_string(),
        }
    }
}

/// ChatService turns the ui conversation into a single completion and a single reply
pub struct ChatService {
    provider: Arc<dyn Provider>,
    system_prompt: String,
}

impl fmt::Debug for ChatService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatService")
            .field("system_prompt", &self.system_prompt)
            .finish_non_exhaustive()
    }
}

impl ChatService {
    pub fn new(provider: Arc<dyn Provider>) -> Result<Self> {
        Self::with_form(provider, PoemForm::default())
    }

    pub fn with_form(provider: Arc<dyn Provider>, form: PoemForm) -> Result<Self> {
        let system_prompt = load_prompt(SYSTEM_TEMPLATE, &json!({ "form": form }))?;
        Ok(Self {
            provider,
            system_prompt: system_prompt.trim_end().to_string(),
        })
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Send the whole history to the provider and return the assistant's reply.
    ///
    /// Provider failures are returned as is, the caller decides what a failed turn means.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatMessage> {
        let history = self.history_from_request(request);
        tracing::debug!(turns = history.len(), "requesting completion");

        let (reply, usage) = self.provider.complete(&history).await?;
        tracing::debug!(?usage, "completion received");

        Ok(ChatMessage::assistant(reply.content))
    }

    fn history_from_request(&self, request: &ChatRequest) -> Vec<Message> {
        let mut history = Vec::with_capacity(request.messages.len() + 1);
        history.push(Message::system(self.system_prompt.clone()));
        history.extend(
            request
                .messages
                .iter()
                .map(|message| Message::new(message.role(), message.content.clone())),
        );
        history
    }
}
