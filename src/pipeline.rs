use crate::artifacts::{Artifact, ArtifactKind, ArtifactStore};
use crate::backboard::{AssistantClient, BackboardClient, BackboardConfig};
use crate::campaign::{CampaignDraft, CampaignService, Channel};
use crate::compare::{ComparisonResult, ComparisonService};
use crate::manifesto::{Manifesto, ManifestoService, ManifestoStatus};
use crate::models::StageReport;
use crate::shopify::{CommerceClient, MarketingEvent, ShopCredentials, ShopifyClient, ShopifyConfig};
use crate::twelvelabs::{TwelveLabsClient, TwelveLabsConfig, VideoAnalysisClient};
use crate::video::{AnalysisResult, AnalyzerConfig, VideoAnalyzer};
use serde::Serialize;
use serde_json::{Value, json};
use std::{future::Future, path::PathBuf, sync::Arc, time::Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
    kind: PipelineErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineErrorKind {
    InvalidInput,
    Configuration,
    Transport,
    TerminalContent,
    Conflict,
    Timeout,
    Cancelled,
    NotFound,
    Internal,
}

impl PipelineErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::Configuration => "configuration",
            Self::Transport => "transport",
            Self::TerminalContent => "terminal_content",
            Self::Conflict => "conflict",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::NotFound => "not_found",
            Self::Internal => "internal",
        }
    }
}

impl PipelineError {
    fn new(stage: &'static str, message: impl Into<String>, kind: PipelineErrorKind) -> Self {
        Self {
            stage,
            message: message.into(),
            kind,
        }
    }

    pub fn invalid_input(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, PipelineErrorKind::InvalidInput)
    }

    pub fn configuration(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, PipelineErrorKind::Configuration)
    }

    pub fn transport(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, PipelineErrorKind::Transport)
    }

    pub fn terminal_content(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, PipelineErrorKind::TerminalContent)
    }

    pub fn conflict(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, PipelineErrorKind::Conflict)
    }

    pub fn timeout(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, PipelineErrorKind::Timeout)
    }

    pub fn cancelled(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, PipelineErrorKind::Cancelled)
    }

    pub fn not_found(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, PipelineErrorKind::NotFound)
    }

    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, PipelineErrorKind::Internal)
    }

    /// Puts a user-facing sentence in front of the technical detail.
    pub fn with_summary(mut self, summary: &str) -> Self {
        self.message = format!("{summary} {}", self.message);
        self
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

#[derive(Debug)]
pub struct StageOutcome<T> {
    pub value: T,
    pub output: Value,
}

impl<T> StageOutcome<T> {
    pub fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}

/// Runs one stage and appends its transcript entry on success.
pub async fn capture_stage<T, Fut>(
    name: &'static str,
    stages: &mut Vec<StageReport>,
    fut: Fut,
) -> Result<T, PipelineError>
where
    Fut: Future<Output = Result<StageOutcome<T>, PipelineError>>,
{
    let started = Instant::now();
    let outcome = fut.await?;
    let elapsed_ms = started.elapsed().as_millis();
    crate::metrics::stage_elapsed(name, elapsed_ms);
    stages.push(StageReport::new(name, elapsed_ms, outcome.output));
    Ok(outcome.value)
}

/// External clients the pipeline talks to.
#[derive(Clone)]
pub struct PipelineClients {
    pub commerce: Arc<dyn CommerceClient>,
    pub video: Arc<dyn VideoAnalysisClient>,
    pub assistants: Arc<dyn AssistantClient>,
}

impl PipelineClients {
    pub fn from_env() -> Self {
        Self {
            commerce: Arc::new(ShopifyClient::new(ShopifyConfig::from_env())),
            video: Arc::new(TwelveLabsClient::new(TwelveLabsConfig::from_env())),
            assistants: Arc::new(BackboardClient::new(BackboardConfig::from_env())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub analyzer: AnalyzerConfig,
    pub manifesto_path: PathBuf,
    pub artifact_dir: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self {
            analyzer: AnalyzerConfig::from_env(),
            manifesto_path: crate::config::env_string("MANIFESTO_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(crate::manifesto::DEFAULT_MANIFESTO_PATH)),
            artifact_dir: crate::config::env_string("ARTIFACT_DIR").map(PathBuf::from),
        }
    }
}

/// Service root shared by the HTTP handlers and the job worker. Cloning is
/// cheap; every part sits behind an `Arc`.
#[derive(Clone)]
pub struct Pipeline {
    analyzer: Arc<VideoAnalyzer>,
    manifesto: Arc<ManifestoService>,
    comparison: Arc<ComparisonService>,
    campaign: Arc<CampaignService>,
    artifacts: Arc<ArtifactStore>,
}

impl Pipeline {
    pub async fn from_env() -> Result<Self, PipelineError> {
        Self::new(PipelineClients::from_env(), PipelineConfig::from_env()).await
    }

    pub async fn new(clients: PipelineClients, config: PipelineConfig) -> Result<Self, PipelineError> {
        let manifesto = Arc::new(
            ManifestoService::open(
                config.manifesto_path,
                clients.commerce.clone(),
                clients.assistants.clone(),
            )
            .await?,
        );
        Ok(Self {
            analyzer: Arc::new(VideoAnalyzer::new(clients.video, config.analyzer)),
            comparison: Arc::new(ComparisonService::new(clients.assistants.clone())),
            campaign: Arc::new(CampaignService::new(
                clients.assistants,
                clients.commerce,
                manifesto.clone(),
            )),
            manifesto,
            artifacts: Arc::new(ArtifactStore::new(config.artifact_dir)),
        })
    }

    pub async fn analyze(
        &self,
        source_url: &str,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, PipelineError> {
        let result = self.analyzer.analyze(source_url, prompt, cancel).await?;
        self.artifacts
            .put(
                ArtifactKind::Analysis,
                result.text.clone(),
                json!({ "video_id": result.video_id, "source": result.source, "source_url": source_url.trim() }),
            )
            .await;
        info!(target = "brandcast.pipeline", video_id = %result.video_id, chars = result.text.len(), "analysis_stored");
        Ok(result)
    }

    pub async fn generate_manifesto(&self, shop: &ShopCredentials) -> Result<Manifesto, PipelineError> {
        self.manifesto.get_or_create(shop).await
    }

    pub async fn view_manifesto(&self) -> Result<Option<Manifesto>, PipelineError> {
        self.manifesto.view().await
    }

    pub fn manifesto_status(&self) -> ManifestoStatus {
        self.manifesto.status()
    }

    /// Compares `summary`, or the latest stored analysis when absent, against
    /// the manifesto.
    pub async fn compare(&self, summary: Option<&str>) -> Result<ComparisonResult, PipelineError> {
        let manifesto = self
            .manifesto
            .view()
            .await?
            .ok_or_else(|| PipelineError::not_found("compare_manifesto", "No manifesto found."))?;
        let summary = self
            .summary_or_latest_analysis("compare_manifesto", summary)
            .await?;
        let result = self.comparison.compare(&summary, &manifesto).await?;
        self.artifacts
            .put(
                ArtifactKind::Comparison,
                result.comparison.clone(),
                json!({ "thread_id": result.thread_id }),
            )
            .await;
        Ok(result)
    }

    pub async fn draft_campaign(
        &self,
        summary: Option<&str>,
        channels: &[Channel],
        thread_id: Option<&str>,
    ) -> Result<CampaignDraft, PipelineError> {
        let summary = self
            .summary_or_latest_analysis("campaign_draft", summary)
            .await?;
        let draft = self
            .campaign
            .generate_draft(&summary, channels, thread_id)
            .await?;
        self.artifacts
            .put(
                ArtifactKind::CampaignDraft,
                draft.to_markdown(),
                serde_json::to_value(&draft).unwrap_or(Value::Null),
            )
            .await;
        Ok(draft)
    }

    pub async fn publish_campaign(
        &self,
        shop: &ShopCredentials,
        campaign_data: &Value,
    ) -> Result<MarketingEvent, PipelineError> {
        self.campaign.publish(shop, campaign_data).await
    }

    pub async fn latest_artifact(&self, kind: ArtifactKind) -> Option<Artifact> {
        self.artifacts.latest(kind).await
    }

    async fn summary_or_latest_analysis(
        &self,
        stage: &'static str,
        summary: Option<&str>,
    ) -> Result<String, PipelineError> {
        if let Some(summary) = summary.map(str::trim).filter(|s| !s.is_empty()) {
            return Ok(summary.to_string());
        }
        self.artifacts
            .latest(ArtifactKind::Analysis)
            .await
            .map(|artifact| artifact.content)
            .ok_or_else(|| {
                PipelineError::not_found(stage, "no summary given and no video analysis stored yet")
            })
    }
}
