//! F5-TTS client over the Gradio HTTP API.
//!
//! One synthesis is four requests:
//! 1. POST {server}/gradio_api/upload (multipart reference clip)
//! 2. POST {server}/gradio_api/call/basic_tts -> event_id
//! 3. GET  {server}/gradio_api/call/basic_tts/{event_id} (SSE until `complete`)
//! 4. GET  the generated file

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use super::{SynthesisRequest, Synthesizer};

/// Synthesis can take much longer than a chat fetch
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// F5-TTS Gradio client
pub struct F5TtsClient {
    server_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CallResponse {
    event_id: String,
}

/// Gradio file reference in a result payload
#[derive(Debug, Deserialize)]
struct FileData {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl F5TtsClient {
    /// Create a new client
    pub fn new(server_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/gradio_api/{}", self.server_url, path)
    }

    /// Upload the reference clip, returning its server-side path
    async fn upload(&self, audio_path: &Path) -> Result<String> {
        let file_name = audio_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let file_bytes = tokio::fs::read(audio_path)
            .await
            .with_context(|| format!("Failed to read {}", audio_path.display()))?;

        let form = Form::new().part("files", Part::bytes(file_bytes).file_name(file_name));

        let response = self
            .client
            .post(self.api_url("upload"))
            .multipart(form)
            .send()
            .await
            .context("Failed to upload reference audio")?;

        if !response.status().is_success() {
            anyhow::bail!("Reference upload failed: {}", response.status());
        }

        let paths: Vec<String> = response
            .json()
            .await
            .context("Failed to parse upload response")?;

        paths
            .into_iter()
            .next()
            .context("Upload response contained no file path")
    }

    /// Start a `basic_tts` job
    async fn call(&self, uploaded: &str, request: &SynthesisRequest) -> Result<String> {
        let settings = &request.settings;
        let body = serde_json::json!({
            "data": [
                { "path": uploaded, "meta": { "_type": "gradio.FileData" } },
                request.voice.transcript,
                request.text,
                settings.remove_silence,
                settings.cross_fade,
                settings.nfe_steps,
                settings.speed,
            ]
        });

        let response = self
            .client
            .post(self.api_url("call/basic_tts"))
            .json(&body)
            .send()
            .await
            .context("Failed to start synthesis")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Synthesis request failed ({}): {}", status, text);
        }

        let call: CallResponse = response
            .json()
            .await
            .context("Failed to parse synthesis call response")?;
        Ok(call.event_id)
    }

    /// Wait for the job's completion event and return its payload
    async fn await_result(&self, event_id: &str) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(self.api_url(&format!("call/basic_tts/{}", event_id)))
            .send()
            .await
            .context("Failed to read synthesis events")?;

        if !response.status().is_success() {
            anyhow::bail!("Synthesis event stream failed: {}", response.status());
        }

        let stream = response
            .text()
            .await
            .context("Synthesis event stream interrupted")?;
        parse_completion(&stream)
    }

    /// Download the generated audio into a scratch file
    async fn download(&self, file: &FileData) -> Result<PathBuf> {
        let url = match (&file.url, &file.path) {
            (Some(url), _) => url.clone(),
            (None, Some(path)) => self.api_url(&format!("file={}", path)),
            (None, None) => anyhow::bail!("Synthesis result has no file reference"),
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to download generated audio")?;

        if !response.status().is_success() {
            anyhow::bail!("Audio download failed: {}", response.status());
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read generated audio")?;

        let scratch = tempfile::Builder::new()
            .prefix("chatvoice_")
            .suffix(".wav")
            .tempfile()
            .context("Failed to create scratch file")?;
        let (_, path) = scratch.keep().context("Failed to keep scratch file")?;

        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

/// Extract the `data` of the `complete` event from a Gradio SSE body
fn parse_completion(stream: &str) -> Result<serde_json::Value> {
    let mut event = "";

    for line in stream.lines() {
        if let Some(name) = line.strip_prefix("event:") {
            event = name.trim();
        } else if let Some(data) = line.strip_prefix("data:") {
            match event {
                "complete" => {
                    return serde_json::from_str(data.trim())
                        .context("Failed to parse synthesis result");
                }
                "error" => anyhow::bail!("Synthesis server reported an error: {}", data.trim()),
                _ => {}
            }
        }
    }

    anyhow::bail!("Synthesis event stream ended without a result")
}

#[async_trait]
impl Synthesizer for F5TtsClient {
    fn name(&self) -> &str {
        "f5-tts"
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<PathBuf> {
        let uploaded = self.upload(&request.voice.audio_path).await?;
        let event_id = self.call(&uploaded, request).await?;
        tracing::debug!("Synthesis job {} started", event_id);

        let result = self.await_result(&event_id).await?;
        let audio = result
            .get(0)
            .cloned()
            .context("Synthesis result is empty")?;
        let file: FileData =
            serde_json::from_value(audio).context("Unexpected synthesis result shape")?;

        self.download(&file).await
    }
}
