use crate::error::GenerationError;
use async_trait::async_trait;
use serde::Serialize;

/// Sampling parameters sent with every generation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationParams {
    pub max_output_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_output_tokens: 60,
            temperature: 0.7,
            top_p: 0.9,
            stop_sequences: vec!["\n".into()],
        }
    }
}

impl GenerationParams {
    pub fn from_config(ai: &crate::config::AiConfig) -> Self {
        Self {
            max_output_tokens: ai.max_output_tokens,
            temperature: ai.temperature,
            top_p: ai.top_p,
            ..Self::default()
        }
    }
}

/// Reply tone. Picks the instruction preamble for the prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyTone {
    #[default]
    Neutral,
    Romantic,
}

impl ReplyTone {
    pub fn from_lover_mode(lover_mode: bool) -> Self {
        if lover_mode {
            Self::Romantic
        } else {
            Self::Neutral
        }
    }
}

/// What the AI reply client is asked to answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRequest {
    pub text: String,
    pub tone: ReplyTone,
}

impl ReplyRequest {
    pub fn new(text: impl Into<String>, tone: ReplyTone) -> Self {
        Self {
            text: text.into(),
            tone,
        }
    }
}

/// A text-generation backend. One call is exactly one attempt.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Generate a completion for a single prompt string.
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, GenerationError>;

    /// Warm up the HTTP connection pool (TLS handshake, DNS).
    /// Default implementation is a no-op.
    async fn warmup(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
