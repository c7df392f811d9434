use crate::campaign::Channel;
use crate::shopify::ShopCredentials;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;

pub const DEFAULT_ANALYSIS_PROMPT: &str = "Provide a theme analysis of this video. Use 3 short sentences";

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    pub url: String,
    #[serde(default)]
    pub prompt: Option<String>,
}

impl AnalyzeRequest {
    pub fn prompt(&self) -> &str {
        self.prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_ANALYSIS_PROMPT)
    }
}

pub type ManifestoRequest = ShopCredentials;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompareRequest {
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CampaignRequest {
    #[serde(default)]
    pub hit_video_summary: Option<String>,
    #[serde(default = "default_channels")]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub thread_id: Option<String>,
}

fn default_channels() -> Vec<Channel> {
    Channel::ALL.to_vec()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishRequest {
    #[serde(flatten)]
    pub shop: ShopCredentials,
    pub campaign_data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishResponse {
    pub status: String,
    pub shopify_event_id: String,
    pub shopify_event: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub status: &'static str,
    pub error: String,
    pub kind: Option<&'static str>,
    pub detail: Option<String>,
}

impl ApiError {
    pub fn new(error: impl Into<String>, kind: &'static str, detail: impl Into<String>) -> Self {
        Self {
            status: "error",
            error: error.into(),
            kind: Some(kind),
            detail: Some(detail.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn analyze_prompt_defaults_when_blank() {
        let req: AnalyzeRequest = serde_json::from_value(json!({"url": "https://x/y.mp4"})).unwrap();
        assert_eq!(req.prompt(), DEFAULT_ANALYSIS_PROMPT);
        let req: AnalyzeRequest =
            serde_json::from_value(json!({"url": "https://x/y.mp4", "prompt": "  "})).unwrap();
        assert_eq!(req.prompt(), DEFAULT_ANALYSIS_PROMPT);
    }

    #[test]
    fn campaign_channels_default_to_both() {
        let req: CampaignRequest = serde_json::from_value(json!({"hit_video_summary": "s"})).unwrap();
        assert_eq!(req.channels, vec![Channel::Email, Channel::YoutubeShorts]);
        let req: CampaignRequest =
            serde_json::from_value(json!({"channels": ["YOUTUBE_SHORTS"]})).unwrap();
        assert_eq!(req.channels, vec![Channel::YoutubeShorts]);
    }

    #[test]
    fn publish_request_flattens_shop_fields() {
        let req: PublishRequest = serde_json::from_value(json!({
            "shop_domain": "a.myshopify.com",
            "access_token": "shpat",
            "campaign_data": {"event_type": "ad"}
        }))
        .unwrap();
        assert_eq!(req.shop.shop_domain, "a.myshopify.com");
        assert_eq!(req.campaign_data["event_type"], "ad");
    }

    #[test]
    fn api_error_body_shape() {
        let body = serde_json::to_value(ApiError::new("poll_indexing", "timeout", "late")).unwrap();
        assert_eq!(
            body,
            json!({"status": "error", "error": "poll_indexing", "kind": "timeout", "detail": "late"})
        );
    }
}
