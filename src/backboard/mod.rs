pub mod client;
#[cfg(test)]
pub mod testing;

use crate::pipeline::PipelineError;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use client::{BackboardClient, BackboardConfig};

#[derive(Debug, Error)]
pub enum BackboardError {
    #[error("missing BACKBOARD_API_KEY")]
    MissingApiKey,
    #[error("http error: {0}")]
    Http(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl BackboardError {
    pub fn into_stage(self, stage: &'static str) -> PipelineError {
        match self {
            Self::MissingApiKey => PipelineError::configuration(stage, self.to_string()),
            _ => PipelineError::transport(stage, self.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assistant {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Thread {
    pub id: String,
    pub assistant_id: String,
}

/// Model routing for a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelChoice {
    pub provider: &'static str,
    pub model: &'static str,
    pub memory: Option<&'static str>,
}

impl ModelChoice {
    pub const GEMINI_FLASH: Self = Self {
        provider: "google",
        model: "gemini-2.5-flash",
        memory: None,
    };

    pub const CLAUDE_SONNET: Self = Self {
        provider: "google",
        model: "anthropic/claude-sonnet-4.5",
        memory: None,
    };

    pub fn with_memory(self, memory: &'static str) -> Self {
        Self {
            memory: Some(memory),
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantReply {
    pub content: String,
    pub thread_id: String,
}

/// Assistant-platform capabilities used by the manifesto, comparison and
/// campaign services.
#[async_trait]
pub trait AssistantClient: Send + Sync {
    async fn create_assistant(
        &self,
        name: &str,
        description: &str,
    ) -> Result<Assistant, BackboardError>;

    async fn create_thread(&self, assistant_id: &str) -> Result<Thread, BackboardError>;

    async fn add_message(
        &self,
        thread_id: &str,
        content: &str,
        model: ModelChoice,
    ) -> Result<AssistantReply, BackboardError>;
}

/// Runs the create-assistant → create-thread → message sequence used by the
/// one-shot generators.
pub async fn ask_once(
    client: &dyn AssistantClient,
    name: &str,
    description: &str,
    prompt: &str,
    model: ModelChoice,
) -> Result<AssistantReply, BackboardError> {
    let assistant = client.create_assistant(name, description).await?;
    let thread = client.create_thread(&assistant.id).await?;
    client.add_message(&thread.id, prompt, model).await
}
