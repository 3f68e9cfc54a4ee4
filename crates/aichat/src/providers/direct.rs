//! Direct model deployments speak the openai wire format but are not routed
//! by deployment: they expect a flat path and a bearer token. The
//! [DirectDeploymentPolicy] lets the deployment-scoped [AzureOpenAiClient]
//! talk to them without changing any call site:
//!
//! - the infixed `/openai/deployments/{name}` is removed from the request path
//! - an `api-key` header is moved into `Authorization: Bearer {key}`
//! - [DirectDeploymentClient::chat_client] needs no deployment name
use std::sync::Arc;

use anyhow::Result;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Url;

use super::azure::{AzureOpenAiClient, ChatClient, ClientOptions};
use super::credentials::Credential;
use super::pipeline::{OutboundRequest, PipelinePosition, Policy, API_KEY_HEADER};

/// Stands in for the deployment name, the policy strips it before the request leaves
pub const PLACEHOLDER_DEPLOYMENT: &str = "direct-deployment-placeholder";

lazy_static! {
    static ref DEPLOYMENT_SEGMENT: Regex = Regex::new(r"/openai/deployments/[^/]*").unwrap();
}

#[derive(Debug, Clone)]
pub struct DirectDeploymentOptions {
    /// Move `api-key` into a bearer `Authorization` header
    pub translate_api_key: bool,
    /// Prepended to the path whenever a deployment segment was removed
    pub path_prefix: Option<String>,
}

impl Default for DirectDeploymentOptions {
    fn default() -> Self {
        Self {
            translate_api_key: true,
            path_prefix: None,
        }
    }
}

/// Rewrite a deployment-scoped request into the direct deployment shape.
///
/// Only the url path is searched, a deployment segment inside the query
/// string or fragment is left alone. Requests already in that shape are left
/// byte for byte unchanged, so applying this twice is the same as applying it
/// once. Returns whether anything changed.
pub fn rewrite(request: &mut dyn OutboundRequest, options: &DirectDeploymentOptions) -> bool {
    let moved = move_api_key_header(request.headers_mut(), options);
    let adjusted = adjust_request_url(request.url_mut(), options);
    moved || adjusted
}

fn move_api_key_header(headers: &mut HeaderMap, options: &DirectDeploymentOptions) -> bool {
    if !options.translate_api_key {
        return false;
    }
    let Some(key) = headers.remove(API_KEY_HEADER) else {
        return false;
    };

    match HeaderValue::from_bytes(&[b"Bearer ", key.as_bytes()].concat()) {
        Ok(mut bearer) => {
            bearer.set_sensitive(true);
            headers.insert(AUTHORIZATION, bearer);
            true
        }
        Err(_) => {
            headers.insert(API_KEY_HEADER, key);
            false
        }
    }
}

fn adjust_request_url(url: &mut Url, options: &DirectDeploymentOptions) -> bool {
    let original = url.path();
    let mut path = original.to_string();
    // Removing one segment can splice a new one together, keep going until none is left
    while let Some(found) = DEPLOYMENT_SEGMENT.find(&path) {
        path.replace_range(found.range(), "");
    }
    if path == original {
        return false;
    }

    if let Some(prefix) = options
        .path_prefix
        .as_deref()
        .map(|prefix| prefix.trim_matches('/'))
        .filter(|prefix| !prefix.is_empty())
    {
        path = format!("/{}{}", prefix, path);
    }

    url.set_path(&path);
    true
}

pub struct DirectDeploymentPolicy {
    options: DirectDeploymentOptions,
}

impl DirectDeploymentPolicy {
    pub fn new(options: DirectDeploymentOptions) -> Self {
        Self { options }
    }
}

impl Policy for DirectDeploymentPolicy {
    fn name(&self) -> &str {
        "direct-deployment"
    }

    fn process(&self, request: &mut dyn OutboundRequest) {
        if rewrite(request, &self.options) {
            tracing::debug!(url = %request.url(), "rewrote request for direct deployment");
        }
    }
}

/// An [AzureOpenAiClient] whose requests are reshaped for a direct model deployment
pub struct DirectDeploymentClient {
    inner: AzureOpenAiClient,
}

impl DirectDeploymentClient {
    pub fn new(
        endpoint: Url,
        credential: Credential,
        options: ClientOptions,
        adapter: DirectDeploymentOptions,
    ) -> Result<Self> {
        let options = options.with_policy(
            Arc::new(DirectDeploymentPolicy::new(adapter)),
            PipelinePosition::BeforeTransport,
        );
        Ok(Self {
            inner: AzureOpenAiClient::new(endpoint, credential, options)?,
        })
    }

    /// A chat client for the endpoint itself, direct deployments serve exactly one model
    pub fn chat_client(&self) -> ChatClient {
        self.inner.chat_client(PLACEHOLDER_DEPLOYMENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::Message;
    use crate::providers::base::Provider;
    use reqwest::{Method, Request};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(url: &str) -> Request {
        Request::new(Method::POST, Url::parse(url).unwrap())
    }

    fn with_api_key(mut request: Request, key: &'static str) -> Request {
        request
            .headers_mut()
            .insert(API_KEY_HEADER, HeaderValue::from_static(key));
        request
    }

    #[test]
    fn test_strips_deployment_segment_and_keeps_query() {
        let mut request =
            request("https://host/openai/deployments/DeepSeek-R1/chat/completions?api-version=1");

        assert!(rewrite(&mut request, &DirectDeploymentOptions::default()));
        assert_eq!(
            request.url().as_str(),
            "https://host/chat/completions?api-version=1"
        );
    }

    #[test]
    fn test_conformant_url_is_untouched() {
        let original = "https://host/models/chat/completions?api-version=2024-05-01-preview#frag";
        let mut request = request(original);

        assert!(!rewrite(&mut request, &DirectDeploymentOptions::default()));
        assert_eq!(request.url().as_str(), original);
        assert!(request.headers().is_empty());
    }

    #[test]
    fn test_similar_paths_are_not_matched() {
        for original in [
            "https://host/openai/deployment/x/chat/completions",
            "https://host/openai-deployments/x/chat/completions",
            "https://host/chat/completions?path=/openai/deployments/x",
        ] {
            let mut request = request(original);
            rewrite(&mut request, &DirectDeploymentOptions::default());
            assert_eq!(request.url().as_str(), original);
        }
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let options = DirectDeploymentOptions {
            translate_api_key: true,
            path_prefix: Some("/models".to_string()),
        };
        for original in [
            "https://host/openai/deployments/DeepSeek-R1/chat/completions?api-version=1",
            "https://host/openai/openai/deployments/a/deployments/b/chat/completions",
            "https://host/base/openai/deployments/a/openai/deployments/b",
            "https://host/chat/completions",
        ] {
            let mut once = with_api_key(request(original), "secret");
            rewrite(&mut once, &options);

            let mut twice = with_api_key(request(original), "secret");
            rewrite(&mut twice, &options);
            assert!(!rewrite(&mut twice, &options));

            assert_eq!(once.url(), twice.url());
            assert_eq!(once.headers(), twice.headers());
            assert!(!once.url().path().contains("/openai/deployments/"));
        }
    }

    #[test]
    fn test_spliced_segments_are_all_removed() {
        let mut request =
            request("https://host/openai/openai/deployments/a/deployments/b/chat/completions");
        rewrite(&mut request, &DirectDeploymentOptions::default());
        assert_eq!(request.url().path(), "/chat/completions");
    }

    #[test]
    fn test_bare_deployment_path_becomes_root() {
        let mut request = request("https://host/openai/deployments/DeepSeek-R1");
        rewrite(&mut request, &DirectDeploymentOptions::default());
        assert_eq!(request.url().as_str(), "https://host/");
    }

    #[test]
    fn test_path_prefix_applied_only_when_stripped() {
        let options = DirectDeploymentOptions {
            translate_api_key: true,
            path_prefix: Some("models/".to_string()),
        };

        let mut scoped = request("https://host/openai/deployments/x/chat/completions?api-version=1");
        rewrite(&mut scoped, &options);
        assert_eq!(
            scoped.url().as_str(),
            "https://host/models/chat/completions?api-version=1"
        );

        let mut flat = request("https://host/chat/completions");
        rewrite(&mut flat, &options);
        assert_eq!(flat.url().as_str(), "https://host/chat/completions");
    }

    #[test]
    fn test_api_key_moves_to_bearer() {
        let mut request = with_api_key(request("https://host/chat/completions"), "secret");

        assert!(rewrite(&mut request, &DirectDeploymentOptions::default()));
        assert!(!request.headers().contains_key(API_KEY_HEADER));
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer secret");
        assert!(request.headers()[AUTHORIZATION].is_sensitive());
    }

    #[test]
    fn test_api_key_kept_when_translation_disabled() {
        let options = DirectDeploymentOptions {
            translate_api_key: false,
            path_prefix: None,
        };
        let mut request = with_api_key(
            request("https://host/openai/deployments/x/chat/completions"),
            "secret",
        );

        rewrite(&mut request, &options);
        assert_eq!(request.headers()[API_KEY_HEADER], "secret");
        assert!(!request.headers().contains_key(AUTHORIZATION));
        assert_eq!(request.url().path(), "/chat/completions");
    }

    #[test]
    fn test_existing_bearer_untouched_without_api_key() {
        let mut request = request("https://host/chat/completions");
        request
            .headers_mut()
            .insert(AUTHORIZATION, HeaderValue::from_static("Bearer token"));

        assert!(!rewrite(&mut request, &DirectDeploymentOptions::default()));
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer token");
    }

    #[test]
    fn test_blocking_request_gets_same_rewrite() {
        let url = "https://host/openai/deployments/DeepSeek-R1/chat/completions?api-version=1";
        let mut blocking = reqwest::blocking::Request::new(Method::POST, Url::parse(url).unwrap());
        blocking
            .headers_mut()
            .insert(API_KEY_HEADER, HeaderValue::from_static("secret"));
        let mut suspending = with_api_key(request(url), "secret");

        let policy = DirectDeploymentPolicy::new(DirectDeploymentOptions::default());
        policy.process(&mut blocking);
        policy.process(&mut suspending);

        assert_eq!(blocking.url(), suspending.url());
        assert_eq!(blocking.headers(), suspending.headers());
    }

    #[tokio::test]
    async fn test_direct_client_reaches_flat_endpoint() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(query_param("api-version", "2024-05-01-preview"))
            .and(header("Authorization", "Bearer test-key"))
            .and(|req: &wiremock::Request| !req.headers.contains_key("api-key"))
            .and(body_json(json!({
                "messages": [
                    {"role": "system", "content": "Write limericks"},
                    {"role": "user", "content": "cats"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {"role": "assistant", "content": "There once was a cat"}
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut options = ClientOptions::default();
        options.api_version = "2024-05-01-preview".to_string();
        let client = DirectDeploymentClient::new(
            Url::parse(&server.uri())?,
            Credential::ApiKey("test-key".to_string()),
            options,
            DirectDeploymentOptions::default(),
        )?;

        let chat = client.chat_client();
        assert!(chat.url().path().contains(PLACEHOLDER_DEPLOYMENT));

        let (message, _) = chat
            .complete(&[Message::system("Write limericks"), Message::user("cats")])
            .await?;
        assert_eq!(message, Message::assistant("There once was a cat"));
        Ok(())
    }
}
