pub mod client;
pub mod config;
pub mod types;

use crate::pipeline::PipelineError;
use async_trait::async_trait;
use thiserror::Error;

pub use client::{TwelveLabsClient, TwelveLabsConfig};
pub use types::{AnalysisStream, IndexedAsset, IndexingStatus, StreamEvent, VideoAsset, VideoIndex};

#[derive(Debug, Error)]
pub enum TwelveLabsError {
    #[error("missing TWELVELABS_API_KEY")]
    MissingApiKey,
    #[error("http error: {0}")]
    Http(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("resource already exists: {0}")]
    Conflict(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl TwelveLabsError {
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Status { .. })
    }

    pub fn into_stage(self, stage: &'static str) -> PipelineError {
        match self {
            Self::MissingApiKey => PipelineError::configuration(stage, self.to_string()),
            Self::Conflict(_) => PipelineError::conflict(stage, self.to_string()),
            Self::Http(_) | Self::Status { .. } | Self::InvalidResponse(_) => {
                PipelineError::transport(stage, self.to_string())
            }
        }
    }
}

/// Video-understanding capabilities the orchestrator needs.
#[async_trait]
pub trait VideoAnalysisClient: Send + Sync {
    async fn list_indexes(&self) -> Result<Vec<VideoIndex>, TwelveLabsError>;

    async fn create_index(&self, name: &str) -> Result<VideoIndex, TwelveLabsError>;

    async fn create_asset(&self, source_url: &str) -> Result<VideoAsset, TwelveLabsError>;

    async fn create_indexed_asset(
        &self,
        index_id: &str,
        asset_id: &str,
    ) -> Result<IndexedAsset, TwelveLabsError>;

    async fn retrieve_indexed_asset(
        &self,
        index_id: &str,
        indexed_asset_id: &str,
    ) -> Result<IndexedAsset, TwelveLabsError>;

    async fn analyze_stream(
        &self,
        video_id: &str,
        prompt: &str,
    ) -> Result<AnalysisStream, TwelveLabsError>;
}
