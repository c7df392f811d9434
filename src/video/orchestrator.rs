use super::index::{DEFAULT_CACHE_TTL, IndexResolver};
use super::preindexed::PreindexedTable;
use crate::config::{env_parse, env_string};
use crate::models::StageReport;
use crate::pipeline::{PipelineError, StageOutcome, capture_stage};
use crate::twelvelabs::config::DEFAULT_INDEX_NAME;
use crate::twelvelabs::{IndexedAsset, IndexingStatus, TwelveLabsError, VideoAnalysisClient};
use futures_util::StreamExt;
use rand::Rng;
use serde::Serialize;
use serde_json::json;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::time::{Instant, sleep, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How the indexing status is polled.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_interval: Duration,
    /// Multiplier applied after each pending poll. `1.0` keeps a fixed interval.
    pub backoff_factor: f64,
    /// Upper bound on the whole wait, measured from the first poll.
    pub deadline: Duration,
    /// Consecutive transport failures tolerated before giving up.
    pub transport_retries: u32,
    /// Random extra delay as a fraction of the interval.
    pub jitter_ratio: f64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(30),
            backoff_factor: 1.0,
            deadline: Duration::from_secs(15 * 60),
            transport_retries: 0,
            jitter_ratio: 0.0,
        }
    }
}

impl PollPolicy {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            interval: env_parse::<u64>("POLL_INTERVAL_SECS")
                .filter(|v| *v > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.interval),
            max_interval: env_parse::<u64>("POLL_MAX_INTERVAL_SECS")
                .filter(|v| *v > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_interval),
            backoff_factor: env_parse::<f64>("POLL_BACKOFF_FACTOR")
                .filter(|v| v.is_finite() && *v >= 1.0)
                .unwrap_or(defaults.backoff_factor),
            deadline: env_parse::<u64>("POLL_DEADLINE_SECS")
                .filter(|v| *v > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.deadline),
            transport_retries: env_parse("POLL_TRANSPORT_RETRIES")
                .unwrap_or(defaults.transport_retries),
            jitter_ratio: env_parse::<f64>("POLL_JITTER_RATIO")
                .filter(|v| v.is_finite() && (0.0..=1.0).contains(v))
                .unwrap_or(defaults.jitter_ratio),
        }
    }

    pub fn next_interval(&self, current: Duration) -> Duration {
        if self.backoff_factor <= 1.0 {
            return current;
        }
        current
            .mul_f64(self.backoff_factor)
            .min(self.max_interval.max(self.interval))
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter_ratio <= 0.0 {
            return delay;
        }
        let extra = rand::rng().random_range(0.0..=self.jitter_ratio);
        delay + delay.mul_f64(extra)
    }
}

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub index_name: String,
    pub index_cache_ttl: Duration,
    pub poll: PollPolicy,
    pub preindexed: PreindexedTable,
}

impl AnalyzerConfig {
    pub fn from_env() -> Self {
        Self {
            index_name: env_string("INDEX_NAME").unwrap_or_else(|| DEFAULT_INDEX_NAME.to_string()),
            index_cache_ttl: env_parse::<u64>("INDEX_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_CACHE_TTL),
            poll: PollPolicy::from_env(),
            preindexed: PreindexedTable::from_env(),
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            index_name: DEFAULT_INDEX_NAME.to_string(),
            index_cache_ttl: DEFAULT_CACHE_TTL,
            poll: PollPolicy::default(),
            preindexed: PreindexedTable::empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSource {
    Indexed,
    Preindexed,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub video_id: String,
    #[serde(rename = "analysis")]
    pub text: String,
    pub source: AnalysisSource,
    pub stages: Vec<StageReport>,
}

/// Drives upload → index → wait → streamed analysis for one video.
pub struct VideoAnalyzer {
    client: Arc<dyn VideoAnalysisClient>,
    resolver: IndexResolver,
    index_name: String,
    policy: PollPolicy,
    preindexed: PreindexedTable,
}

impl VideoAnalyzer {
    pub fn new(client: Arc<dyn VideoAnalysisClient>, config: AnalyzerConfig) -> Self {
        Self {
            resolver: IndexResolver::new(client.clone(), config.index_cache_ttl),
            client,
            index_name: config.index_name,
            policy: config.poll,
            preindexed: config.preindexed,
        }
    }

    pub async fn analyze(
        &self,
        source_url: &str,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, PipelineError> {
        let source_url = source_url.trim();
        let prompt = prompt.trim();
        if source_url.is_empty() {
            return Err(PipelineError::invalid_input("validate_request", "url is required"));
        }
        if !(source_url.starts_with("https://") || source_url.starts_with("http://")) {
            return Err(PipelineError::invalid_input(
                "validate_request",
                "url must use http or https",
            ));
        }
        if prompt.is_empty() {
            return Err(PipelineError::invalid_input("validate_request", "prompt is required"));
        }

        let mut stages = Vec::new();
        let (video_id, source) = match self.preindexed.lookup(source_url) {
            Some(hit) => {
                info!(
                    target = "brandcast.video",
                    video_id = %hit.video_id,
                    label = %hit.label,
                    "preindexed_video_used"
                );
                stages.push(StageReport::new("preindexed_lookup", 0, json!(hit)));
                (hit.video_id, AnalysisSource::Preindexed)
            }
            None => (
                self.ingest(source_url, &mut stages, cancel).await?,
                AnalysisSource::Indexed,
            ),
        };

        let text = capture_stage(
            "stream_analysis",
            &mut stages,
            self.stream_analysis(&video_id, prompt, cancel),
        )
        .await?;

        Ok(AnalysisResult {
            video_id,
            text,
            source,
            stages,
        })
    }

    async fn ingest(
        &self,
        source_url: &str,
        stages: &mut Vec<StageReport>,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let index_id = capture_stage("resolve_index", stages, async {
            let id = until_cancelled(
                cancel,
                "resolve_index",
                self.resolver.resolve_or_create(&self.index_name),
            )
            .await?;
            Ok(StageOutcome::new(
                id.clone(),
                json!({ "index_id": id, "index_name": self.index_name }),
            ))
        })
        .await?;

        let asset = capture_stage("create_asset", stages, async {
            let asset = until_cancelled(cancel, "create_asset", async {
                self.client
                    .create_asset(source_url)
                    .await
                    .map_err(|err| err.into_stage("create_asset"))
            })
            .await?;
            info!(target = "brandcast.video", asset_id = %asset.id, "asset_created");
            Ok(StageOutcome::new(
                asset.clone(),
                json!({ "asset_id": asset.id, "source_url": asset.source_url }),
            ))
        })
        .await?;

        let indexed = capture_stage("create_indexed_asset", stages, async {
            let indexed = until_cancelled(cancel, "create_indexed_asset", async {
                match self.client.create_indexed_asset(&index_id, &asset.id).await {
                    Ok(indexed) => Ok(indexed),
                    Err(err) => {
                        // The cached index may have been deleted remotely.
                        if matches!(err, TwelveLabsError::Status { status: 404, .. }) {
                            warn!(target = "brandcast.video", index_id = %index_id, "index_missing_invalidated");
                            self.resolver.invalidate(&self.index_name);
                        }
                        Err(err.into_stage("create_indexed_asset"))
                    }
                }
            })
            .await?;
            info!(target = "brandcast.video", indexed_asset_id = %indexed.id, "indexed_asset_created");
            Ok(StageOutcome::new(
                indexed.clone(),
                json!({ "indexed_asset_id": indexed.id, "index_id": indexed.index_id }),
            ))
        })
        .await?;

        let ready = capture_stage(
            "poll_indexing",
            stages,
            self.wait_until_ready(&indexed, cancel),
        )
        .await?;
        Ok(ready.id)
    }

    async fn wait_until_ready(
        &self,
        indexed: &IndexedAsset,
        cancel: &CancellationToken,
    ) -> Result<StageOutcome<IndexedAsset>, PipelineError> {
        const STAGE: &str = "poll_indexing";
        let started = Instant::now();
        let deadline = started + self.policy.deadline;
        let mut interval = self.policy.interval;
        let mut attempt = 0u32;
        let mut transport_failures = 0u32;

        loop {
            attempt += 1;
            let polled = until_cancelled(cancel, STAGE, async {
                timeout_at(
                    deadline,
                    self.client
                        .retrieve_indexed_asset(&indexed.index_id, &indexed.id),
                )
                .await
                .map_err(|_| self.deadline_exceeded(STAGE))
            })
            .await?;

            match polled {
                Ok(asset) => {
                    transport_failures = 0;
                    crate::metrics::poll_observed(asset.status.as_str(), attempt);
                    debug!(
                        target = "brandcast.video",
                        indexed_asset_id = %asset.id,
                        status = asset.status.as_str(),
                        attempt,
                        "indexing_status"
                    );
                    match asset.status {
                        IndexingStatus::Ready => {
                            let waited_ms = started.elapsed().as_millis() as u64;
                            info!(target = "brandcast.video", indexed_asset_id = %asset.id, attempt, waited_ms, "indexing_complete");
                            return Ok(StageOutcome::new(
                                asset.clone(),
                                json!({
                                    "indexed_asset_id": asset.id,
                                    "polls": attempt,
                                    "waited_ms": waited_ms,
                                }),
                            ));
                        }
                        IndexingStatus::Failed => {
                            warn!(target = "brandcast.video", indexed_asset_id = %asset.id, attempt, "indexing_failed");
                            return Err(PipelineError::terminal_content(
                                STAGE,
                                format!("Indexing failed for indexed asset {}", asset.id),
                            ));
                        }
                        IndexingStatus::Pending => {}
                    }
                }
                Err(err) if err.is_transport() && transport_failures < self.policy.transport_retries => {
                    transport_failures += 1;
                    warn!(
                        target = "brandcast.video",
                        error = %err,
                        transport_failures,
                        "indexing_poll_retry"
                    );
                }
                Err(err) => return Err(err.into_stage(STAGE)),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(self.deadline_exceeded(STAGE));
            }
            let pause = self.policy.jittered(interval).min(deadline - now);
            until_cancelled(cancel, STAGE, async {
                sleep(pause).await;
                Ok(())
            })
            .await?;
            interval = self.policy.next_interval(interval);
        }
    }

    async fn stream_analysis(
        &self,
        video_id: &str,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<StageOutcome<String>, PipelineError> {
        const STAGE: &str = "stream_analysis";
        let mut stream = until_cancelled(cancel, STAGE, async {
            self.client
                .analyze_stream(video_id, prompt)
                .await
                .map_err(|err| err.into_stage(STAGE))
        })
        .await?;

        let mut text = String::new();
        let mut tokens = 0usize;
        loop {
            let next = until_cancelled(cancel, STAGE, async { Ok(stream.next().await) }).await?;
            match next {
                None => break,
                Some(Ok(event)) => {
                    if let Some(token) = event.text() {
                        text.push_str(token);
                        tokens += 1;
                    }
                }
                Some(Err(err)) => return Err(err.into_stage(STAGE)),
            }
        }
        debug!(target = "brandcast.video", video_id, tokens, chars = text.len(), "analysis_streamed");
        let output = json!({ "video_id": video_id, "tokens": tokens, "chars": text.len() });
        Ok(StageOutcome::new(text, output))
    }

    fn deadline_exceeded(&self, stage: &'static str) -> PipelineError {
        PipelineError::timeout(
            stage,
            format!(
                "indexing did not reach a terminal state within {}s",
                self.policy.deadline.as_secs()
            ),
        )
    }
}

/// Resolves `fut` unless `cancel` fires first.
async fn until_cancelled<T, Fut>(
    cancel: &CancellationToken,
    stage: &'static str,
    fut: Fut,
) -> Result<T, PipelineError>
where
    Fut: Future<Output = Result<T, PipelineError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::cancelled(stage, "request cancelled")),
        result = fut => result,
    }
}
