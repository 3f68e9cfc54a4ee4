//! The request pipeline every vendor call flows through.
//!
//! A send runs the per-call policies, attaches credentials, runs the
//! before-transport policies and finally hands the request to the transport.
//! Policies only see the request they are given, so one pipeline can serve
//! any number of concurrent requests.
use std::sync::Arc;

use anyhow::Result;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, Request, RequestBuilder, Response, Url};
use uuid::Uuid;

use super::credentials::{Credential, COGNITIVE_SERVICES_SCOPE};

pub const API_KEY_HEADER: &str = "api-key";
pub const CLIENT_REQUEST_ID_HEADER: &str = "x-ms-client-request-id";

/// The parts of an in-flight request a policy may rewrite
pub trait OutboundRequest {
    fn url(&self) -> &Url;
    fn url_mut(&mut self) -> &mut Url;
    fn headers(&self) -> &HeaderMap;
    fn headers_mut(&mut self) -> &mut HeaderMap;
}

impl OutboundRequest for Request {
    fn url(&self) -> &Url {
        Request::url(self)
    }

    fn url_mut(&mut self) -> &mut Url {
        Request::url_mut(self)
    }

    fn headers(&self) -> &HeaderMap {
        Request::headers(self)
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        Request::headers_mut(self)
    }
}

impl OutboundRequest for reqwest::blocking::Request {
    fn url(&self) -> &Url {
        reqwest::blocking::Request::url(self)
    }

    fn url_mut(&mut self) -> &mut Url {
        reqwest::blocking::Request::url_mut(self)
    }

    fn headers(&self) -> &HeaderMap {
        reqwest::blocking::Request::headers(self)
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        reqwest::blocking::Request::headers_mut(self)
    }
}

/// A stage that may observe and rewrite a request before it is sent
pub trait Policy: Send + Sync {
    fn name(&self) -> &str;

    /// Rewrite the request in place. Policies never fail, a request they
    /// have nothing to do with passes through untouched.
    fn process(&self, request: &mut dyn OutboundRequest);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePosition {
    /// Before credentials are attached
    PerCall,
    /// After credentials are attached, right before the transport
    BeforeTransport,
}

/// Stamps every request with a fresh client request id
pub struct RequestIdPolicy;

impl Policy for RequestIdPolicy {
    fn name(&self) -> &str {
        "request-id"
    }

    fn process(&self, request: &mut dyn OutboundRequest) {
        let headers = request.headers_mut();
        if !headers.contains_key(CLIENT_REQUEST_ID_HEADER) {
            if let Ok(value) = HeaderValue::from_str(&Uuid::new_v4().to_string()) {
                headers.insert(CLIENT_REQUEST_ID_HEADER, value);
            }
        }
    }
}

pub struct Pipeline {
    client: Client,
    credential: Credential,
    scopes: Vec<String>,
    per_call: Vec<Arc<dyn Policy>>,
    before_transport: Vec<Arc<dyn Policy>>,
}

impl Pipeline {
    pub fn new(
        client: Client,
        credential: Credential,
        policies: &[(Arc<dyn Policy>, PipelinePosition)],
    ) -> Self {
        let mut per_call: Vec<Arc<dyn Policy>> = vec![Arc::new(RequestIdPolicy)];
        let mut before_transport = Vec::new();
        for (policy, position) in policies {
            match position {
                PipelinePosition::PerCall => per_call.push(policy.clone()),
                PipelinePosition::BeforeTransport => before_transport.push(policy.clone()),
            }
        }

        Self {
            client,
            credential,
            scopes: vec![COGNITIVE_SERVICES_SCOPE.to_string()],
            per_call,
            before_transport,
        }
    }

    /// Start building a request that can later be handed to [Pipeline::send]
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client.request(method, url)
    }

    pub async fn send(&self, mut request: Request) -> Result<Response> {
        for policy in &self.per_call {
            tracing::trace!(policy = policy.name(), "per-call policy");
            policy.process(&mut request);
        }

        self.authenticate(&mut request).await?;

        for policy in &self.before_transport {
            tracing::trace!(policy = policy.name(), "before-transport policy");
            policy.process(&mut request);
        }

        tracing::debug!(method = %request.method(), url = %request.url(), "sending request");
        Ok(self.client.execute(request).await?)
    }

    async fn authenticate(&self, request: &mut Request) -> Result<()> {
        match &self.credential {
            Credential::ApiKey(key) => {
                let mut value = HeaderValue::from_str(key)?;
                value.set_sensitive(true);
                request.headers_mut().insert(API_KEY_HEADER, value);
            }
            Credential::Token(credential) => {
                let token = credential.get_token(&self.scopes).await?;
                let mut value = HeaderValue::from_str(&format!("Bearer {}", token.token))?;
                value.set_sensitive(true);
                request.headers_mut().insert(AUTHORIZATION, value);
            }
        }
        Ok(())
    }
}
