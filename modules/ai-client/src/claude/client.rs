use anyhow::{bail, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use tracing::{debug, warn};

use super::types::*;
use crate::util::truncate_to_char_boundary;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Error bodies can be large HTML pages behind a proxy.
const MAX_ERROR_BODY_BYTES: usize = 500;

/// One-shot Messages API caller.
pub(crate) struct ClaudeClient {
    http: reqwest::Client,
    url: String,
    headers: HeaderMap,
}

impl ClaudeClient {
    pub fn new(api_key: &str, base_url: Option<&str>, http: reqwest::Client) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key).context("API key is not a valid header value")?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let base = base_url.unwrap_or(ANTHROPIC_API_URL).trim_end_matches('/');
        Ok(Self {
            http,
            url: format!("{base}/messages"),
            headers,
        })
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        debug!(model = %request.model, messages = request.messages.len(), "Claude chat request");

        let response = self
            .http
            .post(&self.url)
            .headers(self.headers.clone())
            .json(request)
            .send()
            .await
            .context("Claude request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = truncate_to_char_boundary(&body, MAX_ERROR_BODY_BYTES);
            warn!(%status, "Claude API error");
            bail!("Claude API error ({status}): {body}");
        }

        let parsed: ChatResponse = response.json().await.context("Invalid Claude response body")?;
        if let Some(usage) = parsed.usage {
            debug!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                stop_reason = parsed.stop_reason.as_deref().unwrap_or("unknown"),
                "Claude chat response"
            );
        }
        Ok(parsed)
    }
}
