use crate::backboard::{Assistant, AssistantClient, ModelChoice};
use crate::manifesto::ManifestoService;
use crate::pipeline::PipelineError;
use crate::shopify::{CommerceClient, MarketingEvent, ShopCredentials};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

const PERSONA_NAME: &str = "BrandGuardianStrategist";

const CAMPAIGN_MODEL: ModelChoice = ModelChoice::CLAUDE_SONNET;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    Email,
    YoutubeShorts,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Email, Channel::YoutubeShorts];
}

/// One channel's draft. Failures are recorded in `error` instead of being
/// raised, so a partial campaign still reaches the caller.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftResult {
    pub channel: Channel,
    pub thread_id: Option<String>,
    pub content: Option<String>,
    pub error: Option<String>,
}

impl DraftResult {
    fn ok(channel: Channel, thread_id: String, content: String) -> Self {
        Self {
            channel,
            thread_id: Some(thread_id),
            content: Some(content),
            error: None,
        }
    }

    fn failed(channel: Channel, thread_id: Option<String>, error: String) -> Self {
        Self {
            channel,
            thread_id,
            content: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignDraft {
    pub drafts: Vec<DraftResult>,
}

impl CampaignDraft {
    pub fn to_markdown(&self) -> String {
        let mut out = String::from("# Campaign draft\n");
        for draft in &self.drafts {
            let heading = match draft.channel {
                Channel::Email => "Email",
                Channel::YoutubeShorts => "YouTube Shorts",
            };
            out.push_str(&format!("\n## {heading}\n\n"));
            match (&draft.content, &draft.error) {
                (Some(content), _) => out.push_str(content),
                (None, Some(error)) => out.push_str(&format!("_Failed: {error}_")),
                (None, None) => {}
            }
            out.push('\n');
        }
        out
    }
}

pub struct CampaignService {
    assistants: Arc<dyn AssistantClient>,
    commerce: Arc<dyn CommerceClient>,
    manifesto: Arc<ManifestoService>,
    persona: OnceCell<Assistant>,
}

impl CampaignService {
    pub fn new(
        assistants: Arc<dyn AssistantClient>,
        commerce: Arc<dyn CommerceClient>,
        manifesto: Arc<ManifestoService>,
    ) -> Self {
        Self {
            assistants,
            commerce,
            manifesto,
            persona: OnceCell::new(),
        }
    }

    /// Short-video scripts. Always opens a new thread.
    pub async fn draft_scripts(&self, context: &str) -> DraftResult {
        let result: Result<(String, String), PipelineError> = async {
            let persona = self.persona().await?;
            let thread = self
                .assistants
                .create_thread(&persona.id)
                .await
                .map_err(|err| err.into_stage("draft_scripts"))?;
            let prompt = format!(
                "A video is hitting. Summary: {context}\n\
TASK: Generate 2 YouTube Short scripts that replicate the 'hook' of the hit video but stay 100% on-brand."
            );
            let reply = self
                .assistants
                .add_message(&thread.id, &prompt, CAMPAIGN_MODEL)
                .await
                .map_err(|err| err.into_stage("draft_scripts"))?;
            Ok((thread.id, reply.content))
        }
        .await;
        match result {
            Ok((thread_id, content)) => DraftResult::ok(Channel::YoutubeShorts, thread_id, content),
            Err(err) => {
                warn!(target = "brandcast.campaign", stage = err.stage(), error = %err, "scripts_draft_failed");
                DraftResult::failed(
                    Channel::YoutubeShorts,
                    None,
                    format!("Video Generation Failed: {}", err.detail()),
                )
            }
        }
    }

    /// Marketing email. Continues `thread_id` when given so earlier drafts
    /// stay in context.
    pub async fn draft_email(&self, context: &str, thread_id: Option<&str>) -> DraftResult {
        let existing = thread_id.map(str::trim).filter(|id| !id.is_empty());
        let result: Result<(String, String), PipelineError> = async {
            let persona = self.persona().await?;
            let thread_id = match existing {
                Some(id) => id.to_string(),
                None => {
                    self.assistants
                        .create_thread(&persona.id)
                        .await
                        .map_err(|err| err.into_stage("draft_email"))?
                        .id
                }
            };
            let prompt = format!(
                "Context: {context}\n\
TASK: Create a marketing email draft that leverages this viral momentum.\n\
STRATEGY: Do not be pushy. Align with the Manifesto's values. Drive traffic without devaluing the brand."
            );
            let reply = self
                .assistants
                .add_message(&thread_id, &prompt, CAMPAIGN_MODEL)
                .await
                .map_err(|err| err.into_stage("draft_email"))?;
            Ok((thread_id, reply.content))
        }
        .await;
        match result {
            Ok((thread_id, content)) => DraftResult::ok(Channel::Email, thread_id, content),
            Err(err) => {
                warn!(target = "brandcast.campaign", stage = err.stage(), error = %err, "email_draft_failed");
                DraftResult::failed(
                    Channel::Email,
                    existing.map(str::to_string),
                    format!("Email Draft Failed: {}", err.detail()),
                )
            }
        }
    }

    /// One draft per requested channel. Scripts run first and the email
    /// continues their thread.
    pub async fn generate_draft(
        &self,
        summary: &str,
        channels: &[Channel],
        thread_id: Option<&str>,
    ) -> Result<CampaignDraft, PipelineError> {
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(PipelineError::invalid_input("campaign_draft", "hit_video_summary is required"));
        }
        if channels.is_empty() {
            return Err(PipelineError::invalid_input("campaign_draft", "channels must not be empty"));
        }

        let mut drafts = Vec::with_capacity(2);
        let mut chained = thread_id.map(str::to_string);
        if channels.contains(&Channel::YoutubeShorts) {
            let scripts = self.draft_scripts(summary).await;
            if chained.is_none() {
                chained = scripts.thread_id.clone();
            }
            drafts.push(scripts);
        }
        if channels.contains(&Channel::Email) {
            drafts.push(self.draft_email(summary, chained.as_deref()).await);
        }
        info!(
            target = "brandcast.campaign",
            drafts = drafts.len(),
            failed = drafts.iter().filter(|d| !d.is_ok()).count(),
            "campaign_drafted"
        );
        Ok(CampaignDraft { drafts })
    }

    /// Records the campaign as a marketing event on the store.
    pub async fn publish(
        &self,
        shop: &ShopCredentials,
        campaign_data: &Value,
    ) -> Result<MarketingEvent, PipelineError> {
        const STAGE: &str = "publish_campaign";
        if !campaign_data.as_object().is_some_and(|map| !map.is_empty()) {
            return Err(PipelineError::invalid_input(
                STAGE,
                "campaign_data must be a non-empty JSON object",
            ));
        }
        let event = self
            .commerce
            .create_marketing_event(shop, campaign_data)
            .await
            .map_err(|err| err.into_stage(STAGE).with_summary("Failed to publish campaign to Shopify."))?;
        info!(target = "brandcast.campaign", shop = %shop.shop_domain, event_id = %event.id, "campaign_published");
        Ok(event)
    }

    async fn persona(&self) -> Result<&Assistant, PipelineError> {
        self.persona
            .get_or_try_init(|| async {
                let manifesto = self.manifesto.view().await?.ok_or_else(|| {
                    PipelineError::not_found("campaign_persona", "No manifesto found.")
                })?;
                let description = format!(
                    "You are the Lead Brand Strategist. Your mission is to protect our brand identity \
while scaling the success of viral content. Use the provided Manifesto as your absolute law for voice, tone \
and decision-making.\n\nMANIFESTO:\n{}",
                    manifesto.content
                );
                let assistant = self
                    .assistants
                    .create_assistant(PERSONA_NAME, &description)
                    .await
                    .map_err(|err| err.into_stage("campaign_persona"))?;
                info!(target = "brandcast.campaign", assistant_id = %assistant.id, "persona_created");
                Ok(assistant)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backboard::testing::FakeAssistant;
    use crate::pipeline::PipelineErrorKind;
    use crate::shopify::testing::FakeCommerce;
    use serde_json::json;

    struct Harness {
        service: CampaignService,
        assistants: Arc<FakeAssistant>,
        commerce: Arc<FakeCommerce>,
        _dir: tempfile::TempDir,
    }

    async fn harness(manifesto: Option<&str>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("MANIFESTO.md");
        if let Some(content) = manifesto {
            std::fs::write(&path, content).unwrap();
        }
        let assistants = Arc::new(FakeAssistant::default());
        let commerce = Arc::new(FakeCommerce::default());
        let manifesto = Arc::new(
            ManifestoService::open(path, commerce.clone(), assistants.clone())
                .await
                .unwrap(),
        );
        Harness {
            service: CampaignService::new(assistants.clone(), commerce.clone(), manifesto),
            assistants,
            commerce,
            _dir: dir,
        }
    }

    fn shop() -> ShopCredentials {
        ShopCredentials {
            shop_domain: "arcteryx.myshopify.com".into(),
            access_token: "shpat_demo".into(),
        }
    }

    #[tokio::test]
    async fn persona_embeds_manifesto_and_is_created_once() {
        let h = harness(Some("# Quiet confidence")).await;
        h.service.draft_scripts("clip one").await;
        h.service.draft_scripts("clip two").await;
        let created = h.assistants.assistants();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].name, "BrandGuardianStrategist");
        assert!(created[0].description.ends_with("MANIFESTO:\n# Quiet confidence"));
        assert_eq!(h.assistants.threads().len(), 2);
        assert!(h.assistants.messages().iter().all(|m| m.model == ModelChoice::CLAUDE_SONNET));
    }

    #[tokio::test]
    async fn email_reuses_supplied_thread() {
        let h = harness(Some("# M")).await;
        let draft = h.service.draft_email("viral clip", Some("thread-77")).await;
        assert_eq!(draft.thread_id.as_deref(), Some("thread-77"));
        assert!(h.assistants.threads().is_empty());
        assert_eq!(h.assistants.messages()[0].thread_id, "thread-77");
    }

    #[tokio::test]
    async fn email_without_thread_opens_one() {
        let h = harness(Some("# M")).await;
        let draft = h.service.draft_email("viral clip", None).await;
        assert!(draft.is_ok());
        assert_eq!(draft.thread_id.as_deref(), Some("thread-1"));
    }

    #[tokio::test]
    async fn errors_are_captured_in_the_draft() {
        let h = harness(Some("# M")).await;
        h.assistants.fail_next_messages(1);
        let draft = h.service.draft_scripts("clip").await;
        assert!(draft.content.is_none());
        let error = draft.error.expect("error recorded");
        assert!(error.starts_with("Video Generation Failed:"));
    }

    #[tokio::test]
    async fn missing_manifesto_fails_drafts_softly() {
        let h = harness(None).await;
        let draft = h.service.draft_email("clip", None).await;
        assert!(draft.error.unwrap().contains("No manifesto found."));
        assert!(h.assistants.assistants().is_empty());
    }

    #[tokio::test]
    async fn generate_draft_chains_email_onto_scripts_thread() {
        let h = harness(Some("# M")).await;
        h.assistants.reply("SCRIPT A / SCRIPT B");
        h.assistants.reply("Subject: The long way up");
        let campaign = h
            .service
            .generate_draft("Climber at dawn", &Channel::ALL, None)
            .await
            .expect("draft");
        assert_eq!(campaign.drafts.len(), 2);
        assert_eq!(campaign.drafts[0].channel, Channel::YoutubeShorts);
        assert_eq!(campaign.drafts[1].channel, Channel::Email);
        assert_eq!(campaign.drafts[0].thread_id, campaign.drafts[1].thread_id);
        assert_eq!(h.assistants.threads().len(), 1);
        assert!(campaign.to_markdown().contains("Subject: The long way up"));
    }

    #[tokio::test]
    async fn generate_draft_validates_input() {
        let h = harness(Some("# M")).await;
        let err = h.service.generate_draft(" ", &Channel::ALL, None).await.unwrap_err();
        assert_eq!(err.kind(), PipelineErrorKind::InvalidInput);
        let err = h.service.generate_draft("clip", &[], None).await.unwrap_err();
        assert_eq!(err.kind(), PipelineErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn publish_forwards_campaign_data() {
        let h = harness(Some("# M")).await;
        let data = json!({"event_type": "newsletter", "marketing_channel": "email"});
        let event = h.service.publish(&shop(), &data).await.expect("published");
        assert_eq!(event.id, "1001");
        assert_eq!(h.commerce.events(), vec![data]);
    }

    #[tokio::test]
    async fn publish_rejections_are_transport_errors() {
        let h = harness(Some("# M")).await;
        h.commerce.reject_events();
        let err = h
            .service
            .publish(&shop(), &json!({"event_type": "bogus"}))
            .await
            .expect_err("rejected");
        assert_eq!(err.kind(), PipelineErrorKind::Transport);
        assert!(err.detail().starts_with("Failed to publish campaign to Shopify."));

        let err = h.service.publish(&shop(), &json!([])).await.expect_err("not an object");
        assert_eq!(err.kind(), PipelineErrorKind::InvalidInput);
    }
}
