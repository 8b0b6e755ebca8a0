//! HTTP transport for the Gemini REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};

use super::model::{GenerateRequest, GenerateResponse};
use crate::config::ApiConfig;

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
}

/// Anything that can answer a `generateContent` call.
///
/// The model is taken from `request.model`.
#[async_trait]
pub trait GenerateContent: Send + Sync {
    async fn generate_content(
        &self,
        api_key: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, ClientError>;
}

/// reqwest-backed [`GenerateContent`].
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
}

impl GeminiClient {
    /// Create a new client with the given base URL and timeouts
    pub fn new(
        base_url: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, ClientError> {
        Self::new(
            &config.base_url,
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Endpoint URL for `model`, without the key.
    pub fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }
}

#[async_trait]
impl GenerateContent for GeminiClient {
    /// POST /v1beta/models/{model}:generateContent?key={api_key}
    async fn generate_content(
        &self,
        api_key: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, ClientError> {
        let url = self.endpoint(&request.model);
        tracing::debug!(
            model = %request.model,
            key_prefix = %key_prefix(api_key),
            parts = request.contents.iter().map(|c| c.parts.len()).sum::<usize>(),
            "sending generateContent"
        );

        let resp = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .header(header::CONTENT_TYPE, "application/json")
            .json(request)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            let message = api_error_message(&body);
            tracing::warn!(model = %request.model, status, message = %message, "generateContent failed");
            return Err(ClientError::Api { status, message });
        }

        let response: GenerateResponse = resp.json().await?;
        tracing::debug!(
            model = %request.model,
            candidates = response.candidate_count(),
            "generateContent response received"
        );
        Ok(response)
    }
}

/// The remote `error.message` if the body carries one, otherwise the raw body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<GenerateResponse>(body)
        .ok()
        .and_then(|r| r.error.map(|e| e.message))
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.to_string())
}

/// First 10 characters of the key, for log correlation.
pub(crate) fn key_prefix(api_key: &str) -> String {
    let prefix: String = api_key.chars().take(10).collect();
    format!("{}...", prefix)
}
