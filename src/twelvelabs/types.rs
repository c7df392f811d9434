use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use super::TwelveLabsError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoIndex {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoAsset {
    pub id: String,
    pub source_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexedAsset {
    pub id: String,
    pub index_id: String,
    pub status: IndexingStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingStatus {
    Pending,
    Ready,
    Failed,
}

impl IndexingStatus {
    /// Collapses the remote lifecycle (`queued`, `validating`, `indexing`, ...)
    /// onto the three states the orchestrator cares about.
    pub fn from_raw(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "ready" => Self::Ready,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

/// One line of the NDJSON analysis stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum StreamEvent {
    StreamStart,
    TextGeneration {
        text: String,
    },
    StreamEnd,
    #[serde(other)]
    Unknown,
}

impl StreamEvent {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::TextGeneration { text } => Some(text),
            _ => None,
        }
    }
}

pub type AnalysisStream = BoxStream<'static, Result<StreamEvent, TwelveLabsError>>;
