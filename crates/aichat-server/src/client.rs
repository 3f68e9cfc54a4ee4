use crate::configuration::Settings;
use aichat::chat::ChatService;
use aichat::providers::azure::ClientOptions;
use aichat::providers::credentials::{ClientSecretCredential, Credential};
use aichat::providers::direct::{DirectDeploymentClient, DirectDeploymentOptions};
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

/// Build the chat service the routes share, choosing api key or client secret auth
pub fn build_chat_service(settings: &Settings) -> Result<ChatService> {
    let chat = &settings.chat;
    let connection = &settings.connection;

    info!(
        deployment = %chat.deployment,
        endpoint = %connection.endpoint,
        "registering chat client"
    );

    let credential = match connection.key.as_deref() {
        Some(key) => {
            info!(api_key_length = key.len(), "api key found, using api key credentials");
            Credential::ApiKey(key.to_string())
        }
        None => {
            info!("no api key, using client secret credentials");
            Credential::Token(Arc::new(ClientSecretCredential::from_env()?))
        }
    };

    let mut options = ClientOptions::default();
    options.api_version = chat.api_version.clone();
    options.temperature = chat.temperature;
    options.max_tokens = chat.max_tokens;

    let adapter = DirectDeploymentOptions {
        translate_api_key: chat.translate_api_key,
        path_prefix: chat.path_prefix.clone(),
    };

    let client =
        DirectDeploymentClient::new(connection.endpoint.clone(), credential, options, adapter)?;
    ChatService::new(Arc::new(client.chat_client()))
}
