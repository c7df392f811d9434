use super::{Assistant, AssistantClient, AssistantReply, BackboardError, ModelChoice, Thread};
use crate::config::env_string;
use crate::http::build_client;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

static API_ROOT: Lazy<String> = Lazy::new(|| {
    std::env::var("BACKBOARD_BASE_URL")
        .map(|v| v.trim_end_matches('/').to_string())
        .unwrap_or_else(|_| "https://app.backboard.io/api".to_string())
});

#[derive(Debug, Clone)]
pub struct BackboardConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl BackboardConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: API_ROOT.clone(),
            api_key: env_string("BACKBOARD_API_KEY"),
        }
    }
}

pub struct BackboardClient {
    http: Client,
    config: BackboardConfig,
}

impl BackboardClient {
    pub fn new(config: BackboardConfig) -> Self {
        Self {
            http: build_client(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, BackboardError> {
        let key = self
            .config
            .api_key
            .as_deref()
            .ok_or(BackboardError::MissingApiKey)?;
        let response = request
            .header("X-API-Key", key)
            .send()
            .await
            .map_err(|err| BackboardError::Http(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackboardError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl AssistantClient for BackboardClient {
    async fn create_assistant(
        &self,
        name: &str,
        description: &str,
    ) -> Result<Assistant, BackboardError> {
        let payload: AssistantRecord = self
            .send(
                self.http
                    .post(self.url("/assistants"))
                    .json(&CreateAssistantBody { name, description }),
            )
            .await?
            .json()
            .await
            .map_err(|err| BackboardError::InvalidResponse(err.to_string()))?;
        debug!(target = "brandcast.backboard", assistant_id = %payload.assistant_id, assistant = name, "assistant_created");
        Ok(Assistant {
            id: payload.assistant_id,
            name: name.to_string(),
            description: description.to_string(),
        })
    }

    async fn create_thread(&self, assistant_id: &str) -> Result<Thread, BackboardError> {
        let payload: ThreadRecord = self
            .send(
                self.http
                    .post(self.url(&format!("/assistants/{assistant_id}/threads")))
                    .json(&serde_json::json!({})),
            )
            .await?
            .json()
            .await
            .map_err(|err| BackboardError::InvalidResponse(err.to_string()))?;
        Ok(Thread {
            id: payload.thread_id,
            assistant_id: assistant_id.to_string(),
        })
    }

    async fn add_message(
        &self,
        thread_id: &str,
        content: &str,
        model: ModelChoice,
    ) -> Result<AssistantReply, BackboardError> {
        let mut form = vec![
            ("content", content),
            ("llm_provider", model.provider),
            ("model_name", model.model),
            ("stream", "false"),
        ];
        if let Some(memory) = model.memory {
            form.push(("memory", memory));
        }
        let payload: MessageRecord = self
            .send(
                self.http
                    .post(self.url(&format!("/threads/{thread_id}/messages")))
                    .form(&form),
            )
            .await?
            .json()
            .await
            .map_err(|err| BackboardError::InvalidResponse(err.to_string()))?;
        let content = payload
            .content
            .ok_or_else(|| BackboardError::InvalidResponse("missing content".into()))?;
        Ok(AssistantReply {
            content,
            thread_id: thread_id.to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
struct CreateAssistantBody<'a> {
    name: &'a str,
    description: &'a str,
}

#[derive(Debug, Deserialize)]
struct AssistantRecord {
    assistant_id: String,
}

#[derive(Debug, Deserialize)]
struct ThreadRecord {
    thread_id: String,
}

#[derive(Debug, Deserialize)]
struct MessageRecord {
    #[serde(default)]
    content: Option<String>,
}
