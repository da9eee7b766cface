//! HTTP gateway to the Keon runtime

use std::time::Duration;

use async_trait::async_trait;
use keon_types::{
    CorrelationId, DecideRequest, DecisionReceipt, ExecuteRequest, ExecutionResult, KeonError,
    KeonResult, ResponseEnvelope,
};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{AuthConfig, ClientConfig};
use crate::gateway::Gateway;

pub const CORRELATION_HEADER: &str = "x-correlation-id";
pub const API_KEY_HEADER: &str = "x-api-key";

/// Longest body excerpt carried into an error message.
const BODY_EXCERPT: usize = 200;

/// reqwest-backed [`Gateway`].
///
/// Owns its connection pool; dropping the gateway releases it.
#[derive(Clone, Debug)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
}

impl HttpGateway {
    /// Create a gateway for `base_url` (e.g. `https://api.keon.systems/runtime/v1`).
    pub fn new(base_url: &str, auth: &AuthConfig, timeout: Duration) -> KeonResult<Self> {
        auth.validate()?;
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(auth_headers(auth)?)
            .build()
            .map_err(|e| KeonError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &ClientConfig) -> KeonResult<Self> {
        config.validate()?;
        Self::new(&config.base_url, &config.auth, config.timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        correlation_id: &CorrelationId,
        body: &B,
    ) -> KeonResult<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, correlation_id = %correlation_id, "POST");

        let response = self
            .client
            .post(&url)
            .header(CORRELATION_HEADER, correlation_id.as_str())
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(e, path))?;

        self.handle_response(response, path).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
        path: &str,
    ) -> KeonResult<T> {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            warn!(path, ?retry_after, "rate limited");
            return Err(KeonError::RateLimit { retry_after });
        }

        if status.is_server_error() {
            let message = response.text().await.unwrap_or_default();
            warn!(path, status = status.as_u16(), "server error");
            return Err(KeonError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| transport_error(e, path))?;

        let envelope = match serde_json::from_str::<ResponseEnvelope>(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                return Err(KeonError::InvalidResponse {
                    message: format!("failed to parse response: {e}: {}", excerpt(&body)),
                    status: Some(status.as_u16()),
                })
            }
            Err(_) => return Err(http_rejection(status, &body)),
        };

        if !status.is_success() && envelope.success {
            return Err(http_rejection(status, &body));
        }

        envelope.into_data(Some(status.as_u16()))
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn decide(&self, request: &DecideRequest) -> KeonResult<DecisionReceipt> {
        self.post("/decide", request.correlation_id(), request).await
    }

    async fn execute(&self, request: &ExecuteRequest) -> KeonResult<ExecutionResult> {
        self.post("/execute", request.correlation_id(), request).await
    }
}

fn auth_headers(auth: &AuthConfig) -> KeonResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    if let Some(key) = &auth.api_key {
        let mut value = HeaderValue::from_str(key)
            .map_err(|_| KeonError::Config("api_key is not a valid header value".into()))?;
        value.set_sensitive(true);
        headers.insert(API_KEY_HEADER, value);
    }
    if let Some(token) = &auth.bearer_token {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| KeonError::Config("bearer_token is not a valid header value".into()))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
}

fn transport_error(err: reqwest::Error, path: &str) -> KeonError {
    let message = if err.is_timeout() {
        format!("Request timeout: {err}")
    } else if err.is_connect() {
        format!("Connection error: {err}")
    } else {
        format!("HTTP error: {err}")
    };
    warn!(path, error = %err, "transport failure");
    KeonError::network(message, Some(path.to_string()))
}

fn http_rejection(status: StatusCode, body: &str) -> KeonError {
    KeonError::Rejected {
        status: Some(status.as_u16()),
        code: format!("HTTP_{}", status.as_u16()),
        message: excerpt(body).to_string(),
        details: Default::default(),
    }
}

fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(BODY_EXCERPT) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
