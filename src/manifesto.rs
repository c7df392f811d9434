use crate::artifacts::write_atomic;
use crate::backboard::{AssistantClient, ModelChoice, ask_once};
use crate::pipeline::PipelineError;
use crate::shopify::store::DEFAULT_PRODUCT_LIMIT;
use crate::shopify::{CommerceClient, ShopCredentials};
use serde::Serialize;
use std::{
    io,
    path::PathBuf,
    sync::{Arc, PoisonError, RwLock},
};
use tokio::sync::Mutex;
use tracing::{info, warn};

pub const DEFAULT_MANIFESTO_PATH: &str = "MANIFESTO.md";

const GENERATOR_NAME: &str = "Manifesto Generator";

const GENERATOR_DESCRIPTION: &str = "You are an expert manifesto generator. Create a compelling and unique manifesto \
based on the store data provided. The manifesto should reflect the brand's values, mission and vision in a concise \
and engaging manner. Format it in markdown and keep it shorter than 100 words.\n\n\
DO NOT BE CRINGE OR GENERIC. MAKE IT UNIQUE TO THE STORE AND THE VISION OF WHAT IT REPRESENTS.";

const GENERATION_FAILED: &str = "Error generating manifesto.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestoStatus {
    Absent,
    Generating,
    Present,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifesto {
    pub content: String,
}

struct Snapshot {
    status: ManifestoStatus,
    content: Option<String>,
}

/// The store's brand manifesto: generated once from store data, then served
/// unchanged from disk.
pub struct ManifestoService {
    path: PathBuf,
    commerce: Arc<dyn CommerceClient>,
    assistants: Arc<dyn AssistantClient>,
    product_limit: usize,
    snapshot: RwLock<Snapshot>,
    // Held for the whole generation; late callers wait here and then find
    // the manifesto present.
    generation: Mutex<()>,
}

impl ManifestoService {
    pub async fn open(
        path: PathBuf,
        commerce: Arc<dyn CommerceClient>,
        assistants: Arc<dyn AssistantClient>,
    ) -> Result<Self, PipelineError> {
        let content = read_existing(&path)
            .await
            .map_err(|err| PipelineError::internal("load_manifesto", err.to_string()))?;
        let status = if content.is_some() {
            ManifestoStatus::Present
        } else {
            ManifestoStatus::Absent
        };
        info!(target = "brandcast.manifesto", path = %path.display(), ?status, "manifesto_opened");
        Ok(Self {
            path,
            commerce,
            assistants,
            product_limit: DEFAULT_PRODUCT_LIMIT,
            snapshot: RwLock::new(Snapshot { status, content }),
            generation: Mutex::new(()),
        })
    }

    pub fn status(&self) -> ManifestoStatus {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .status
    }

    /// Current manifesto, if one exists. A file placed on disk after startup
    /// is picked up here.
    pub async fn view(&self) -> Result<Option<Manifesto>, PipelineError> {
        if let Some(content) = self.cached() {
            return Ok(Some(Manifesto { content }));
        }
        if self.status() == ManifestoStatus::Generating {
            return Ok(None);
        }
        let loaded = read_existing(&self.path)
            .await
            .map_err(|err| PipelineError::internal("load_manifesto", err.to_string()))?;
        Ok(loaded.map(|content| {
            self.mark_present(content.clone());
            Manifesto { content }
        }))
    }

    /// Returns the existing manifesto or generates one from the store. An
    /// existing manifesto is never regenerated.
    pub async fn get_or_create(
        &self,
        shop: &ShopCredentials,
    ) -> Result<Manifesto, PipelineError> {
        if let Some(existing) = self.view().await? {
            return Ok(existing);
        }
        let _turn = self.generation.lock().await;
        if let Some(existing) = self.view().await? {
            return Ok(existing);
        }

        let guard = GeneratingGuard::enter(&self.snapshot);
        let snapshot = self
            .commerce
            .scan_store(shop, self.product_limit)
            .await
            .map_err(|err| err.into_stage("scan_store"))?;
        info!(
            target = "brandcast.manifesto",
            shop = %shop.shop_domain,
            products = snapshot.products.len(),
            "store_scanned"
        );

        let prompt = format!(
            "Generate a MANIFESTO.md for the following store data:\n{}. Send me just the MD content.",
            snapshot.to_prompt_text()
        );
        let reply = ask_once(
            self.assistants.as_ref(),
            GENERATOR_NAME,
            GENERATOR_DESCRIPTION,
            &prompt,
            ModelChoice::GEMINI_FLASH,
        )
        .await
        .map_err(|err| err.into_stage("generate_manifesto").with_summary(GENERATION_FAILED))?;
        if reply.content.trim().is_empty() {
            return Err(PipelineError::transport(
                "generate_manifesto",
                "assistant returned an empty reply",
            )
            .with_summary(GENERATION_FAILED));
        }

        write_atomic(&self.path, &reply.content).await.map_err(|err| {
            warn!(target = "brandcast.manifesto", path = %self.path.display(), error = %err, "manifesto_write_failed");
            PipelineError::internal("persist_manifesto", err.to_string())
        })?;
        guard.finish(reply.content.clone());
        info!(
            target = "brandcast.manifesto",
            path = %self.path.display(),
            bytes = reply.content.len(),
            "manifesto_generated"
        );
        Ok(Manifesto {
            content: reply.content,
        })
    }

    fn cached(&self) -> Option<String> {
        let snapshot = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        match snapshot.status {
            ManifestoStatus::Present => snapshot.content.clone(),
            _ => None,
        }
    }

    fn mark_present(&self, content: String) {
        let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        snapshot.status = ManifestoStatus::Present;
        snapshot.content = Some(content);
    }
}

/// Flips the status to `Generating` and back to `Absent` unless the
/// generation finished. Covers early returns and dropped futures alike.
struct GeneratingGuard<'a> {
    snapshot: &'a RwLock<Snapshot>,
    finished: bool,
}

impl<'a> GeneratingGuard<'a> {
    fn enter(snapshot: &'a RwLock<Snapshot>) -> Self {
        snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .status = ManifestoStatus::Generating;
        Self {
            snapshot,
            finished: false,
        }
    }

    fn finish(mut self, content: String) {
        self.finished = true;
        let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        snapshot.status = ManifestoStatus::Present;
        snapshot.content = Some(content);
    }
}

impl Drop for GeneratingGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
            if snapshot.status == ManifestoStatus::Generating {
                snapshot.status = ManifestoStatus::Absent;
            }
        }
    }
}

async fn read_existing(path: &std::path::Path) -> io::Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}
