use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::{json, Value};

use super::base::{Provider, Usage};
use super::credentials::Credential;
use super::pipeline::{Pipeline, PipelinePosition, Policy};
use super::utils::{
    check_openai_context_length_error, get_usage, messages_to_openai_format,
    openai_response_to_message,
};
use crate::models::message::Message;

pub const DEFAULT_API_VERSION: &str = "2024-06-01";

pub struct ClientOptions {
    pub api_version: String,
    pub timeout: Duration,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
    policies: Vec<(Arc<dyn Policy>, PipelinePosition)>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: Duration::from_secs(600), // 10 minutes timeout
            temperature: None,
            max_tokens: None,
            policies: Vec::new(),
        }
    }
}

impl ClientOptions {
    pub fn add_policy(&mut self, policy: Arc<dyn Policy>, position: PipelinePosition) {
        self.policies.push((policy, position));
    }

    pub fn with_policy(mut self, policy: Arc<dyn Policy>, position: PipelinePosition) -> Self {
        self.add_policy(policy, position);
        self
    }
}

/// A client for deployment-scoped chat endpoints authenticated with an `api-key` header
pub struct AzureOpenAiClient {
    endpoint: Url,
    api_version: String,
    temperature: Option<f32>,
    max_tokens: Option<i32>,
    pipeline: Arc<Pipeline>,
}

impl AzureOpenAiClient {
    pub fn new(endpoint: Url, credential: Credential, options: ClientOptions) -> Result<Self> {
        if endpoint.cannot_be_a_base() {
            bail!("Endpoint must be an absolute http(s) url: {}", endpoint);
        }

        let client = Client::builder().timeout(options.timeout).build()?;
        let pipeline = Pipeline::new(client, credential, &options.policies);

        Ok(Self {
            endpoint,
            api_version: options.api_version,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            pipeline: Arc::new(pipeline),
        })
    }

    pub fn chat_client(&self, deployment: &str) -> ChatClient {
        let mut url = self.endpoint.clone();
        let path = format!(
            "{}/openai/deployments/{}/chat/completions",
            url.path().trim_end_matches('/'),
            deployment
        );
        url.set_path(&path);
        url.set_query(None);
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);

        ChatClient {
            url,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            pipeline: self.pipeline.clone(),
        }
    }
}

/// Chat completions against a single deployment
pub struct ChatClient {
    url: Url,
    temperature: Option<f32>,
    max_tokens: Option<i32>,
    pipeline: Arc<Pipeline>,
}

impl ChatClient {
    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn post(&self, payload: Value) -> Result<Value> {
        let request = self
            .pipeline
            .request(Method::POST, self.url.clone())
            .json(&payload)
            .build()?;

        let response = self.pipeline.send(request).await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() => {
                Err(anyhow!("Server error: {}", status))
            }
            status => {
                let err_text = response.text().await.unwrap_or_default();
                if let Some(err) = serde_json::from_str::<Value>(&err_text)
                    .ok()
                    .as_ref()
                    .and_then(|body| body.get("error"))
                    .and_then(check_openai_context_length_error)
                {
                    return Err(err.into());
                }
                Err(anyhow!("Request failed: {}: {}", status, err_text))
            }
        }
    }
}

#[async_trait]
impl Provider for ChatClient {
    async fn complete(&self, messages: &[Message]) -> Result<(Message, Usage)> {
        let mut payload = json!({
            "messages": messages_to_openai_format(messages),
        });

        if let Some(temp) = self.temperature {
            payload["temperature"] = json!(temp);
        }
        if let Some(tokens) = self.max_tokens {
            payload["max_tokens"] = json!(tokens);
        }

        let response = self.post(payload).await?;

        // Raise specific error if context length is exceeded
        if let Some(error) = response.get("error") {
            if let Some(err) = check_openai_context_length_error(error) {
                return Err(err.into());
            }
            return Err(anyhow!("Chat completion error: {}", error));
        }

        let message = openai_response_to_message(&response)?;
        let usage = get_usage(&response);

        Ok((message, usage))
    }
}
