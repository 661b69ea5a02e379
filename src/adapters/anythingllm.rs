//! AnythingLLM chat history client.
//!
//! Endpoint: POST {base_url}/v1/admin/workspace-chats
//! Auth: Bearer token

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::ChatSource;
use crate::domain::{parse_chat_batch, Record, SourceSettings};

/// Chat history client
pub struct AnythingLlmClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl AnythingLlmClient {
    /// Create a new client
    pub fn new(base_url: String, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url,
            api_key,
            client,
        })
    }

    /// Create from source settings
    pub fn from_settings(settings: &SourceSettings, api_key: Option<&str>) -> Result<Self> {
        Self::new(
            settings.base_url.clone(),
            api_key.map(str::to_string),
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    /// Chat history endpoint
    pub fn chats_url(&self) -> String {
        format!(
            "{}/v1/admin/workspace-chats",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl ChatSource for AnythingLlmClient {
    fn name(&self) -> &str {
        "anythingllm"
    }

    async fn fetch_batch(&self) -> Result<Vec<Record>> {
        let mut request = self
            .client
            .post(self.chats_url())
            .header("Accept", "application/json")
            .json(&serde_json::json!({}));

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .context("Failed to reach AnythingLLM")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("AnythingLLM returned {}: {}", status, body);
        }

        let body: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse AnythingLLM response")?;

        let (records, skipped) = parse_chat_batch(&body);
        if skipped > 0 {
            tracing::warn!("Skipped {} undecodable chat entries", skipped);
        }

        Ok(records)
    }
}
