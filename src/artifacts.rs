//! Hand-off point between pipeline steps.
//!
//! Each kind keeps only its latest artifact. Writes are visible to readers as
//! soon as `put` returns. When a mirror directory is configured the content is
//! also written to a markdown file so operators can inspect it; mirror
//! failures are logged and never fail the request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Analysis,
    Comparison,
    CampaignDraft,
}

impl ArtifactKind {
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Analysis => "ANALYSIS.md",
            Self::Comparison => "COMPARISON.md",
            Self::CampaignDraft => "CAMPAIGN.md",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub content: String,
    pub metadata: Value,
    pub stored_at: DateTime<Utc>,
}

pub struct ArtifactStore {
    latest: RwLock<HashMap<ArtifactKind, Artifact>>,
    mirror_dir: Option<PathBuf>,
}

impl ArtifactStore {
    pub fn new(mirror_dir: Option<PathBuf>) -> Self {
        Self {
            latest: RwLock::new(HashMap::new()),
            mirror_dir,
        }
    }

    pub async fn put(&self, kind: ArtifactKind, content: String, metadata: Value) -> Artifact {
        let artifact = Artifact {
            kind,
            content,
            metadata,
            stored_at: Utc::now(),
        };
        if let Some(dir) = &self.mirror_dir {
            let path = dir.join(kind.file_name());
            match write_atomic(&path, &artifact.content).await {
                Ok(()) => debug!(target = "brandcast.artifacts", path = %path.display(), "artifact_mirrored"),
                Err(err) => warn!(
                    target = "brandcast.artifacts",
                    path = %path.display(),
                    error = %err,
                    "artifact_mirror_failed"
                ),
            }
        }
        self.latest.write().await.insert(kind, artifact.clone());
        artifact
    }

    pub async fn latest(&self, kind: ArtifactKind) -> Option<Artifact> {
        self.latest.read().await.get(&kind).cloned()
    }
}

/// Writes `content` to a sibling temp file, then renames it over `path`, so
/// readers see either the old file or the complete new one.
pub(crate) async fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("artifact");
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));
    if let Err(err) = tokio::fs::write(&tmp, content.as_bytes()).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err);
    }
    if let Err(err) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err);
    }
    Ok(())
}
