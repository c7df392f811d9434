use crate::{
    models::AnalyzeRequest,
    pipeline::{Pipeline, PipelineError, PipelineErrorKind},
    video::AnalysisResult,
};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Background analysis worker. One job runs at a time; the rest wait in a
/// bounded channel. Finished jobs stay readable for `retention`, then are
/// swept on the next enqueue.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
    jobs: Arc<Mutex<HashMap<Uuid, JobEntry>>>,
    retention: Duration,
}

struct Job {
    id: Uuid,
    request: AnalyzeRequest,
    cancel: CancellationToken,
}

struct JobEntry {
    state: JobState,
    cancel: CancellationToken,
    finished_at: Option<Instant>,
}

impl JobEntry {
    fn set(&mut self, state: JobState) {
        if state.is_finished() && self.finished_at.is_none() {
            self.finished_at = Some(Instant::now());
        }
        self.state = state;
    }
}

#[derive(Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Completed {
        result: AnalysisResult,
    },
    Failed {
        error: String,
        stage: Option<String>,
        kind: PipelineErrorKind,
    },
    Cancelled,
}

impl JobState {
    fn is_finished(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. } | Self::Cancelled)
    }
}

#[derive(Clone, Serialize)]
pub struct JobInfo {
    pub id: String,
    #[serde(flatten)]
    pub state: JobState,
}

impl JobQueue {
    pub fn spawn(pipeline: Pipeline) -> (Self, JoinHandle<()>) {
        let (queue, handle) = Self::spawn_with_capacity(pipeline, queue_capacity_from_env());
        (queue.with_retention(retention_from_env()), handle)
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn spawn_with_capacity(pipeline: Pipeline, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Job>(capacity.max(1));
        let jobs: Arc<Mutex<HashMap<Uuid, JobEntry>>> = Arc::new(Mutex::new(HashMap::new()));
        let jobs_bg = jobs.clone();

        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                if job.cancel.is_cancelled() {
                    continue;
                }
                set_state(&jobs_bg, job.id, JobState::Running).await;
                info!(target = "brandcast.jobs", job_id = %job.id, "job_started");

                let result = pipeline
                    .analyze(&job.request.url, job.request.prompt(), &job.cancel)
                    .await;
                let state = match result {
                    Ok(result) => JobState::Completed { result },
                    Err(err) if err.kind() == PipelineErrorKind::Cancelled => JobState::Cancelled,
                    Err(err) => {
                        warn!(target = "brandcast.jobs", job_id = %job.id, stage = err.stage(), error = %err, "job_failed");
                        JobState::Failed {
                            error: err.detail().to_string(),
                            stage: Some(err.stage().to_string()),
                            kind: err.kind(),
                        }
                    }
                };
                set_state(&jobs_bg, job.id, state).await;
            }
        });

        (
            Self {
                tx,
                jobs,
                retention: Duration::from_secs(DEFAULT_RETENTION_SECS),
            },
            handle,
        )
    }

    pub async fn enqueue_analysis(&self, request: AnalyzeRequest) -> Result<Uuid, PipelineError> {
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        {
            let mut jobs = self.jobs.lock().await;
            let retention = self.retention;
            let before = jobs.len();
            jobs.retain(|_, entry| entry.finished_at.is_none_or(|at| at.elapsed() < retention));
            if jobs.len() < before {
                debug!(target = "brandcast.jobs", swept = before - jobs.len(), "finished_jobs_swept");
            }
            jobs.insert(
                id,
                JobEntry {
                    state: JobState::Queued,
                    cancel: cancel.clone(),
                    finished_at: None,
                },
            );
        }
        let job = Job { id, request, cancel };
        if self.tx.try_send(job).is_err() {
            self.jobs.lock().await.remove(&id);
            return Err(PipelineError::internal("enqueue", "job queue is full or worker not available"));
        }
        Ok(id)
    }

    pub async fn get(&self, id: Uuid) -> Option<JobInfo> {
        let guard = self.jobs.lock().await;
        guard.get(&id).map(|entry| JobInfo {
            id: id.to_string(),
            state: entry.state.clone(),
        })
    }

    /// Cancels a queued or running job. Finished jobs are left as they are.
    pub async fn cancel(&self, id: Uuid) -> Option<JobInfo> {
        let mut guard = self.jobs.lock().await;
        let entry = guard.get_mut(&id)?;
        if !entry.state.is_finished() {
            entry.cancel.cancel();
            if matches!(entry.state, JobState::Queued) {
                entry.set(JobState::Cancelled);
            }
        }
        Some(JobInfo {
            id: id.to_string(),
            state: entry.state.clone(),
        })
    }
}

async fn set_state(jobs: &Mutex<HashMap<Uuid, JobEntry>>, id: Uuid, state: JobState) {
    if let Some(entry) = jobs.lock().await.get_mut(&id) {
        entry.set(state);
    }
}

const DEFAULT_RETENTION_SECS: u64 = 3600;

fn retention_from_env() -> Duration {
    let secs = crate::config::env_parse::<u64>("JOB_RETENTION_SECS").unwrap_or(DEFAULT_RETENTION_SECS);
    Duration::from_secs(secs)
}

fn queue_capacity_from_env() -> usize {
    crate::config::env_parse::<usize>("QUEUE_CAPACITY")
        .filter(|v| *v > 0)
        .unwrap_or(64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backboard::testing::FakeAssistant;
    use crate::pipeline::{PipelineClients, PipelineConfig};
    use crate::shopify::testing::FakeCommerce;
    use crate::twelvelabs::IndexingStatus;
    use crate::video::AnalyzerConfig;
    use crate::video::testing::{FakeVideoClient, PollStep};
    use std::time::Duration;

    async fn queue(video: Arc<FakeVideoClient>, dir: &tempfile::TempDir) -> JobQueue {
        let pipeline = Pipeline::new(
            PipelineClients {
                commerce: Arc::new(FakeCommerce::default()),
                video,
                assistants: Arc::new(FakeAssistant::default()),
            },
            PipelineConfig {
                analyzer: AnalyzerConfig::default(),
                manifesto_path: dir.path().join("MANIFESTO.md"),
                artifact_dir: None,
            },
        )
        .await
        .unwrap();
        JobQueue::spawn_with_capacity(pipeline, 4).0
    }

    fn request() -> AnalyzeRequest {
        AnalyzeRequest {
            url: "https://cdn.example.com/clip.mp4".into(),
            prompt: None,
        }
    }

    async fn wait_finished(queue: &JobQueue, id: Uuid) -> JobState {
        for _ in 0..200 {
            if let Some(info) = queue.get(id).await {
                if info.state.is_finished() {
                    return info.state;
                }
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        panic!("job {id} never finished");
    }

    #[tokio::test(start_paused = true)]
    async fn job_runs_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let video = Arc::new(FakeVideoClient::default());
        video.stream_tokens(&["Bold."]);
        let queue = queue(video.clone(), &dir).await;
        let id = queue.enqueue_analysis(request()).await.unwrap();
        match wait_finished(&queue, id).await {
            JobState::Completed { result } => assert_eq!(result.text, "Bold."),
            _ => panic!("expected completion"),
        }
        assert_eq!(video.analyzed()[0].1, crate::models::DEFAULT_ANALYSIS_PROMPT);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_indexing_is_reported_with_stage() {
        let dir = tempfile::tempdir().unwrap();
        let video = Arc::new(FakeVideoClient::default());
        video.script_polls(&[PollStep::Status(IndexingStatus::Failed)]);
        let queue = queue(video, &dir).await;
        let id = queue.enqueue_analysis(request()).await.unwrap();
        match wait_finished(&queue, id).await {
            JobState::Failed { stage, kind, .. } => {
                assert_eq!(stage.as_deref(), Some("poll_indexing"));
                assert_eq!(kind, PipelineErrorKind::TerminalContent);
            }
            _ => panic!("expected failure"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn running_job_can_be_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let video = Arc::new(FakeVideoClient::default());
        video.script_polls(&[PollStep::Status(IndexingStatus::Pending)]);
        let queue = queue(video.clone(), &dir).await;
        let id = queue.enqueue_analysis(request()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;
        queue.cancel(id).await.expect("known job");
        assert!(matches!(wait_finished(&queue, id).await, JobState::Cancelled));
        assert_eq!(video.analyze_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_jobs_are_swept_after_retention() {
        let dir = tempfile::tempdir().unwrap();
        let video = Arc::new(FakeVideoClient::default());
        video.stream_tokens(&["Bold."]);
        let queue = queue(video, &dir).await.with_retention(Duration::from_secs(60));
        let first = queue.enqueue_analysis(request()).await.unwrap();
        wait_finished(&queue, first).await;

        let second = queue.enqueue_analysis(request()).await.unwrap();
        assert!(queue.get(first).await.is_some());
        wait_finished(&queue, second).await;

        tokio::time::sleep(Duration::from_secs(61)).await;
        let third = queue.enqueue_analysis(request()).await.unwrap();
        assert!(queue.get(first).await.is_none());
        assert!(queue.get(second).await.is_none());
        assert!(queue.get(third).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_queued_job_is_swept_after_retention() {
        let dir = tempfile::tempdir().unwrap();
        let video = Arc::new(FakeVideoClient::default());
        video.script_polls(&[PollStep::Status(IndexingStatus::Pending)]);
        let queue = queue(video, &dir).await.with_retention(Duration::from_secs(30));
        let running = queue.enqueue_analysis(request()).await.unwrap();
        let waiting = queue.enqueue_analysis(request()).await.unwrap();
        let info = queue.cancel(waiting).await.expect("known job");
        assert!(matches!(info.state, JobState::Cancelled));

        tokio::time::sleep(Duration::from_secs(31)).await;
        queue.enqueue_analysis(request()).await.unwrap();
        assert!(queue.get(waiting).await.is_none());
        assert!(queue.get(running).await.is_some());
    }

    #[tokio::test]
    async fn unknown_job_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let queue = queue(Arc::new(FakeVideoClient::default()), &dir).await;
        assert!(queue.get(Uuid::new_v4()).await.is_none());
        assert!(queue.cancel(Uuid::new_v4()).await.is_none());
    }
}
