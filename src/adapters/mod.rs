//! Adapter interfaces for external systems.
//!
//! Adapters provide a unified interface to the two services the poll loop
//! talks to: the chat history source and the speech synthesizer.

pub mod anythingllm;
pub mod f5tts;

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{Record, SynthesisSettings};
use crate::voices::ReferenceVoice;

pub use anythingllm::AnythingLlmClient;
pub use f5tts::F5TtsClient;

/// Source of chat records, fetched once per tick
#[async_trait]
pub trait ChatSource: Send + Sync {
    /// Human-readable source name
    fn name(&self) -> &str;

    /// Fetch the current batch. Transport and non-2xx errors are failures.
    async fn fetch_batch(&self) -> Result<Vec<Record>>;
}

/// Input to one synthesis call
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    /// Text to speak
    pub text: String,

    /// Voice to imitate
    pub voice: ReferenceVoice,

    pub settings: SynthesisSettings,
}

/// Text-to-speech backend
#[async_trait]
pub trait Synthesizer: Send + Sync {
    fn name(&self) -> &str;

    /// Generate audio and return the path of the produced file
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<PathBuf>;
}
