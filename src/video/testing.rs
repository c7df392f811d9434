//! In-memory stand-in for the video service used by unit tests.

use crate::twelvelabs::{
    AnalysisStream, IndexedAsset, IndexingStatus, StreamEvent, TwelveLabsError,
    VideoAnalysisClient, VideoAsset, VideoIndex,
};
use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy)]
pub enum PollStep {
    Status(IndexingStatus),
    TransportError,
}

#[derive(Default)]
struct FakeState {
    indexes: Vec<VideoIndex>,
    conflict: Option<Option<VideoIndex>>,
    list_failures: u32,
    create_failures: u32,
    index_missing: bool,
    polls: VecDeque<PollStep>,
    last_poll: Option<PollStep>,
    tokens: Vec<String>,
    list_calls: u32,
    create_index_calls: u32,
    asset_calls: u32,
    retrieve_calls: u32,
    analyze_calls: u32,
    analyzed: Vec<(String, String)>,
}

#[derive(Default)]
pub struct FakeVideoClient {
    state: Mutex<FakeState>,
}

impl FakeVideoClient {
    pub fn with_indexes(indexes: &[(&str, &str)]) -> Self {
        let client = Self::default();
        client.state.lock().unwrap().indexes = indexes
            .iter()
            .map(|(id, name)| VideoIndex {
                id: id.to_string(),
                name: name.to_string(),
            })
            .collect();
        client
    }

    /// The next create reports a conflict; `appears` is what a re-list will
    /// then find.
    pub fn conflict_on_create(&self, appears: Option<(&str, &str)>) {
        self.state.lock().unwrap().conflict = Some(appears.map(|(id, name)| VideoIndex {
            id: id.to_string(),
            name: name.to_string(),
        }));
    }

    pub fn fail_next_lists(&self, count: u32) {
        self.state.lock().unwrap().list_failures = count;
    }

    pub fn fail_next_creates(&self, count: u32) {
        self.state.lock().unwrap().create_failures = count;
    }

    /// The next indexed-asset create answers 404, as if the index was deleted.
    pub fn lose_index_once(&self) {
        self.state.lock().unwrap().index_missing = true;
    }

    /// Scripted poll results; the last step repeats once the script runs out.
    pub fn script_polls(&self, steps: &[PollStep]) {
        self.state.lock().unwrap().polls = steps.iter().copied().collect();
    }

    pub fn stream_tokens(&self, tokens: &[&str]) {
        self.state.lock().unwrap().tokens = tokens.iter().map(|t| t.to_string()).collect();
    }

    pub fn list_calls(&self) -> u32 {
        self.state.lock().unwrap().list_calls
    }

    pub fn create_index_calls(&self) -> u32 {
        self.state.lock().unwrap().create_index_calls
    }

    pub fn asset_calls(&self) -> u32 {
        self.state.lock().unwrap().asset_calls
    }

    pub fn retrieve_calls(&self) -> u32 {
        self.state.lock().unwrap().retrieve_calls
    }

    pub fn analyze_calls(&self) -> u32 {
        self.state.lock().unwrap().analyze_calls
    }

    pub fn analyzed(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().analyzed.clone()
    }
}

#[async_trait]
impl VideoAnalysisClient for FakeVideoClient {
    async fn list_indexes(&self) -> Result<Vec<VideoIndex>, TwelveLabsError> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if state.list_failures > 0 {
            state.list_failures -= 1;
            return Err(TwelveLabsError::Http("list unavailable".into()));
        }
        Ok(state.indexes.clone())
    }

    async fn create_index(&self, name: &str) -> Result<VideoIndex, TwelveLabsError> {
        let mut state = self.state.lock().unwrap();
        state.create_index_calls += 1;
        if let Some(appears) = state.conflict.take() {
            if let Some(index) = appears {
                state.indexes.push(index);
            }
            return Err(TwelveLabsError::Conflict("index_name_already_exists".into()));
        }
        if state.create_failures > 0 {
            state.create_failures -= 1;
            return Err(TwelveLabsError::Status {
                status: 500,
                body: "boom".into(),
            });
        }
        let index = VideoIndex {
            id: format!("idx-{}", state.create_index_calls),
            name: name.to_string(),
        };
        state.indexes.push(index.clone());
        Ok(index)
    }

    async fn create_asset(&self, source_url: &str) -> Result<VideoAsset, TwelveLabsError> {
        let mut state = self.state.lock().unwrap();
        state.asset_calls += 1;
        Ok(VideoAsset {
            id: format!("asset-{}", state.asset_calls),
            source_url: source_url.to_string(),
        })
    }

    async fn create_indexed_asset(
        &self,
        index_id: &str,
        asset_id: &str,
    ) -> Result<IndexedAsset, TwelveLabsError> {
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.index_missing) {
            state.indexes.retain(|index| index.id != index_id);
            return Err(TwelveLabsError::Status {
                status: 404,
                body: "index_not_found".into(),
            });
        }
        Ok(IndexedAsset {
            id: format!("ia-{asset_id}"),
            index_id: index_id.to_string(),
            status: IndexingStatus::Pending,
        })
    }

    async fn retrieve_indexed_asset(
        &self,
        index_id: &str,
        indexed_asset_id: &str,
    ) -> Result<IndexedAsset, TwelveLabsError> {
        let mut state = self.state.lock().unwrap();
        state.retrieve_calls += 1;
        let step = match state.polls.pop_front() {
            Some(step) => {
                state.last_poll = Some(step);
                step
            }
            None => state
                .last_poll
                .unwrap_or(PollStep::Status(IndexingStatus::Ready)),
        };
        match step {
            PollStep::Status(status) => Ok(IndexedAsset {
                id: indexed_asset_id.to_string(),
                index_id: index_id.to_string(),
                status,
            }),
            PollStep::TransportError => Err(TwelveLabsError::Http("connection reset".into())),
        }
    }

    async fn analyze_stream(
        &self,
        video_id: &str,
        prompt: &str,
    ) -> Result<AnalysisStream, TwelveLabsError> {
        let mut state = self.state.lock().unwrap();
        state.analyze_calls += 1;
        state.analyzed.push((video_id.to_string(), prompt.to_string()));
        let mut events = vec![Ok(StreamEvent::StreamStart)];
        events.extend(
            state
                .tokens
                .iter()
                .map(|text| Ok(StreamEvent::TextGeneration { text: text.clone() })),
        );
        events.push(Ok(StreamEvent::StreamEnd));
        Ok(stream::iter(events).boxed())
    }
}
