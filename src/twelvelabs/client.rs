use super::config::{
    API_ROOT, INDEX_MODEL_NAME, INDEX_MODEL_OPTIONS, INDEX_PAGE_LIMIT, MAX_INDEX_PAGES,
};
use super::types::{AnalysisStream, IndexedAsset, IndexingStatus, StreamEvent, VideoAsset, VideoIndex};
use super::{TwelveLabsError, VideoAnalysisClient};
use crate::config::env_string;
use crate::http::{build_client, build_streaming_client};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt, stream};
use reqwest::{Client, RequestBuilder, Response, StatusCode, multipart::Form};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct TwelveLabsConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl TwelveLabsConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: API_ROOT.clone(),
            api_key: env_string("TWELVELABS_API_KEY"),
        }
    }
}

pub struct TwelveLabsClient {
    http: Client,
    streaming: Client,
    config: TwelveLabsConfig,
}

impl TwelveLabsClient {
    pub fn new(config: TwelveLabsConfig) -> Self {
        Self {
            http: build_client(),
            streaming: build_streaming_client(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, TwelveLabsError> {
        let key = self
            .config
            .api_key
            .as_deref()
            .ok_or(TwelveLabsError::MissingApiKey)?;
        Ok(request.header("x-api-key", key))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, TwelveLabsError> {
        let response = self
            .authorize(request)?
            .send()
            .await
            .map_err(|err| TwelveLabsError::Http(err.to_string()))?;
        check_status(response).await
    }

    async fn list_page(&self, page: u32) -> Result<IndexPage, TwelveLabsError> {
        let request = self.http.get(self.url("/indexes")).query(&[
            ("page", page.to_string()),
            ("page_limit", INDEX_PAGE_LIMIT.to_string()),
        ]);
        self.send(request)
            .await?
            .json::<IndexPage>()
            .await
            .map_err(|err| TwelveLabsError::InvalidResponse(err.to_string()))
    }
}

#[async_trait]
impl VideoAnalysisClient for TwelveLabsClient {
    async fn list_indexes(&self) -> Result<Vec<VideoIndex>, TwelveLabsError> {
        let mut indexes = Vec::new();
        let mut page = 1;
        loop {
            let payload = self.list_page(page).await?;
            let fetched = payload.data.len();
            indexes.extend(payload.data.into_iter().map(|record| VideoIndex {
                id: record.id,
                name: record.index_name,
            }));
            let total_pages = payload.page_info.map(|info| info.total_page).unwrap_or(page);
            if fetched == 0 || page >= total_pages || page >= MAX_INDEX_PAGES {
                break;
            }
            page += 1;
        }
        debug!(target = "brandcast.twelvelabs", count = indexes.len(), "indexes_listed");
        Ok(indexes)
    }

    async fn create_index(&self, name: &str) -> Result<VideoIndex, TwelveLabsError> {
        let body = CreateIndexBody {
            index_name: name,
            models: vec![IndexModel {
                model_name: INDEX_MODEL_NAME,
                model_options: INDEX_MODEL_OPTIONS,
            }],
        };
        let created: CreatedResource = self
            .send(self.http.post(self.url("/indexes")).json(&body))
            .await?
            .json()
            .await
            .map_err(|err| TwelveLabsError::InvalidResponse(err.to_string()))?;
        Ok(VideoIndex {
            id: created.id,
            name: name.to_string(),
        })
    }

    async fn create_asset(&self, source_url: &str) -> Result<VideoAsset, TwelveLabsError> {
        let form = Form::new()
            .text("method", "url")
            .text("url", source_url.to_string());
        let created: CreatedResource = self
            .send(self.http.post(self.url("/assets")).multipart(form))
            .await?
            .json()
            .await
            .map_err(|err| TwelveLabsError::InvalidResponse(err.to_string()))?;
        Ok(VideoAsset {
            id: created.id,
            source_url: source_url.to_string(),
        })
    }

    async fn create_indexed_asset(
        &self,
        index_id: &str,
        asset_id: &str,
    ) -> Result<IndexedAsset, TwelveLabsError> {
        let url = self.url(&format!("/indexes/{index_id}/indexed-assets"));
        let record: IndexedAssetRecord = self
            .send(self.http.post(url).json(&CreateIndexedAssetBody { asset_id }))
            .await?
            .json()
            .await
            .map_err(|err| TwelveLabsError::InvalidResponse(err.to_string()))?;
        Ok(record.into_asset(index_id))
    }

    async fn retrieve_indexed_asset(
        &self,
        index_id: &str,
        indexed_asset_id: &str,
    ) -> Result<IndexedAsset, TwelveLabsError> {
        let url = self.url(&format!("/indexes/{index_id}/indexed-assets/{indexed_asset_id}"));
        let record: IndexedAssetRecord = self
            .send(self.http.get(url))
            .await?
            .json()
            .await
            .map_err(|err| TwelveLabsError::InvalidResponse(err.to_string()))?;
        Ok(record.into_asset(index_id))
    }

    async fn analyze_stream(
        &self,
        video_id: &str,
        prompt: &str,
    ) -> Result<AnalysisStream, TwelveLabsError> {
        let body = AnalyzeBody {
            video_id,
            prompt,
            stream: true,
        };
        let response = self
            .send(self.streaming.post(self.url("/analyze")).json(&body))
            .await?;
        Ok(decode_ndjson(response.bytes_stream()))
    }
}

async fn check_status(response: Response) -> Result<Response, TwelveLabsError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::CONFLICT || body.contains("already_exists") {
        return Err(TwelveLabsError::Conflict(body));
    }
    Err(TwelveLabsError::Status {
        status: status.as_u16(),
        body,
    })
}

struct NdjsonState<S> {
    body: Pin<Box<S>>,
    buffer: Vec<u8>,
    exhausted: bool,
}

/// Splits a chunked body into newline-delimited JSON events, preserving the
/// order in which lines arrive. A body error ends the stream after being
/// yielded once.
pub(crate) fn decode_ndjson<S, B, E>(body: S) -> AnalysisStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = NdjsonState {
        body: Box::pin(body),
        buffer: Vec::new(),
        exhausted: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(pos) = state.buffer.iter().position(|byte| *byte == b'\n') {
                let line: Vec<u8> = state.buffer.drain(..=pos).collect();
                match parse_line(&line) {
                    Some(event) => return Some((event, state)),
                    None => continue,
                }
            }
            if state.exhausted {
                if state.buffer.is_empty() {
                    return None;
                }
                let line = std::mem::take(&mut state.buffer);
                return parse_line(&line).map(|event| (event, state));
            }
            match state.body.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(err)) => {
                    state.exhausted = true;
                    state.buffer.clear();
                    return Some((Err(TwelveLabsError::Http(err.to_string())), state));
                }
                None => state.exhausted = true,
            }
        }
    })
    .boxed()
}

fn parse_line(line: &[u8]) -> Option<Result<StreamEvent, TwelveLabsError>> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return None;
    }
    Some(
        serde_json::from_slice::<StreamEvent>(trimmed)
            .map_err(|err| TwelveLabsError::InvalidResponse(err.to_string())),
    )
}

#[derive(Debug, Deserialize)]
struct IndexPage {
    #[serde(default)]
    data: Vec<IndexRecord>,
    #[serde(default)]
    page_info: Option<PageInfo>,
}

#[derive(Debug, Deserialize)]
struct IndexRecord {
    #[serde(rename = "_id")]
    id: String,
    index_name: String,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    total_page: u32,
}

#[derive(Debug, Serialize)]
struct CreateIndexBody<'a> {
    index_name: &'a str,
    models: Vec<IndexModel>,
}

#[derive(Debug, Serialize)]
struct IndexModel {
    model_name: &'static str,
    model_options: &'static [&'static str],
}

#[derive(Debug, Serialize)]
struct CreateIndexedAssetBody<'a> {
    asset_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreatedResource {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct IndexedAssetRecord {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    status: Option<String>,
}

impl IndexedAssetRecord {
    fn into_asset(self, index_id: &str) -> IndexedAsset {
        IndexedAsset {
            id: self.id,
            index_id: index_id.to_string(),
            status: IndexingStatus::from_raw(self.status.as_deref().unwrap_or("pending")),
        }
    }
}

#[derive(Debug, Serialize)]
struct AnalyzeBody<'a> {
    video_id: &'a str,
    prompt: &'a str,
    stream: bool,
}
