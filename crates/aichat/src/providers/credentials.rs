use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;

/// Scope requested for tokens used against cognitive services endpoints
pub const COGNITIVE_SERVICES_SCOPE: &str = "https://cognitiveservices.azure.com/.default";

const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Tokens this close to expiry are refreshed instead of reused
const EXPIRY_MARGIN_SECS: i64 = 300;

/// Upper bound on the lifetime taken from a token response
const MAX_TOKEN_LIFETIME_SECS: u64 = 60 * 60 * 24 * 365;

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Environment variable {0} is not set")]
    MissingEnvVar(String),

    #[error("Failed to reach token endpoint: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Token endpoint returned {status}: {body}")]
    TokenEndpoint { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        self.expires_at - chrono::Duration::seconds(EXPIRY_MARGIN_SECS) > Utc::now()
    }
}

/// A source of bearer tokens, used when no api key is configured
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken, CredentialError>;
}

/// How a vendor client proves who it is
#[derive(Clone)]
pub enum Credential {
    ApiKey(String),
    Token(Arc<dyn TokenCredential>),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::ApiKey(key) => write!(f, "ApiKey(<{} chars>)", key.len()),
            Credential::Token(_) => write!(f, "Token(..)"),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// OAuth2 client credentials grant against the identity platform
pub struct ClientSecretCredential {
    authority_host: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    client: Client,
    cache: Mutex<HashMap<String, AccessToken>>,
}

impl ClientSecretCredential {
    pub fn new(
        authority_host: Option<String>,
        tenant_id: String,
        client_id: String,
        client_secret: String,
    ) -> Result<Self, CredentialError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            authority_host: authority_host.unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string()),
            tenant_id,
            client_id,
            client_secret,
            client,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Read AZURE_TENANT_ID, AZURE_CLIENT_ID, AZURE_CLIENT_SECRET and AZURE_AUTHORITY_HOST
    pub fn from_env() -> Result<Self, CredentialError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, CredentialError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| CredentialError::MissingEnvVar(key.to_string()))
        };

        let tenant_id = required("AZURE_TENANT_ID")?;
        let client_id = required("AZURE_CLIENT_ID")?;
        let client_secret = required("AZURE_CLIENT_SECRET")?;
        let authority_host = lookup("AZURE_AUTHORITY_HOST").filter(|value| !value.is_empty());

        Self::new(authority_host, tenant_id, client_id, client_secret)
    }

    fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        )
    }

    async fn request_token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope),
        ];

        let response = self
            .client
            .post(self.token_url())
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::TokenEndpoint {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response.json().await?;
        Ok(AccessToken {
            token: token.access_token,
            expires_at: expiry_from(token.expires_in),
        })
    }
}

fn expiry_from(expires_in: u64) -> DateTime<Utc> {
    let now = Utc::now();
    let lifetime = i64::try_from(expires_in.min(MAX_TOKEN_LIFETIME_SECS))
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or_else(chrono::Duration::zero);
    now.checked_add_signed(lifetime).unwrap_or(now)
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken, CredentialError> {
        let scope = scopes.join(" ");
        let mut cache = self.cache.lock().await;
        if let Some(token) = cache.get(&scope).filter(|token| token.is_fresh()) {
            return Ok(token.clone());
        }

        tracing::debug!(%scope, "requesting access token");
        let token = self.request_token(&scope).await?;
        cache.insert(scope, token.clone());
        Ok(token)
    }
}
