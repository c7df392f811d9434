use crate::backboard::{AssistantClient, ModelChoice, ask_once};
use crate::manifesto::Manifesto;
use crate::pipeline::PipelineError;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

const STAGE: &str = "compare_manifesto";

const COMPARE_NAME: &str = "Compare Manifesto";

const COMPARE_DESCRIPTION: &str = "You are an expert marketing director. Using the manifesto file as a source of truth, \
leverage the video summary to determine if the video is appropriate for the company to use as inspiration. \
Output a binary answer of \"Yes\" or \"No\", and then provide a short summary of why. \
The summary should not be longer than 30 words.\n\n\
NEVER STATE THAT A MANIFESTO WAS NOT PROVIDED. If no manifesto exists, pretend it exists.\n\n\
DO NOT BE CRINGE OR GENERIC. KEEP YOUR SENTENCES SHORT AND CLEARLY SUPPORT YOUR OWN REASONING.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonResult {
    /// Assistant reply, verbatim.
    pub comparison: String,
    pub thread_id: String,
}

pub struct ComparisonService {
    assistants: Arc<dyn AssistantClient>,
}

impl ComparisonService {
    pub fn new(assistants: Arc<dyn AssistantClient>) -> Self {
        Self { assistants }
    }

    pub async fn compare(
        &self,
        summary: &str,
        manifesto: &Manifesto,
    ) -> Result<ComparisonResult, PipelineError> {
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(PipelineError::invalid_input(STAGE, "summary is required"));
        }
        let prompt = format!(
            "The store manifesto file is a source of truth that represents the branding of the company. \
It is here:\n{}. The summary is a short summary of a given video, describing the identity and storytelling \
method of the video. It is here:\n{summary}",
            manifesto.content
        );
        let reply = ask_once(
            self.assistants.as_ref(),
            COMPARE_NAME,
            COMPARE_DESCRIPTION,
            &prompt,
            ModelChoice::GEMINI_FLASH.with_memory("Auto"),
        )
        .await
        .map_err(|err| err.into_stage(STAGE).with_summary("Error generating comparison."))?;
        info!(target = "brandcast.compare", thread_id = %reply.thread_id, chars = reply.content.len(), "comparison_generated");
        Ok(ComparisonResult {
            comparison: reply.content,
            thread_id: reply.thread_id,
        })
    }
}
