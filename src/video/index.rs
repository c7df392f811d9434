use crate::pipeline::PipelineError;
use crate::twelvelabs::{TwelveLabsError, VideoAnalysisClient};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tokio::{sync::OnceCell, time::Instant};
use tracing::{info, warn};

const STAGE: &str = "resolve_index";

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

struct CacheSlot {
    cell: Arc<OnceCell<String>>,
    created_at: Instant,
}

/// Get-or-create for named indexes, memoized per name.
///
/// Concurrent first callers share one lookup through the slot's `OnceCell`;
/// failures leave the slot empty so the next caller retries. Slots expire
/// after `ttl` so a deleted remote index is eventually re-resolved.
///
/// There is no cross-process lock: two processes creating the same index at
/// once rely on the remote conflict response.
pub struct IndexResolver {
    client: Arc<dyn VideoAnalysisClient>,
    ttl: Duration,
    slots: Mutex<HashMap<String, CacheSlot>>,
}

impl IndexResolver {
    pub fn new(client: Arc<dyn VideoAnalysisClient>, ttl: Duration) -> Self {
        Self {
            client,
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub async fn resolve_or_create(&self, name: &str) -> Result<String, PipelineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PipelineError::invalid_input(STAGE, "index name is empty"));
        }
        let cell = self.slot(name);
        let id = cell.get_or_try_init(|| self.lookup_or_create(name)).await?;
        Ok(id.clone())
    }

    /// Drops the memoized id for `name`.
    pub fn invalidate(&self, name: &str) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name.trim());
    }

    fn slot(&self, name: &str) -> Arc<OnceCell<String>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get(name) {
            if slot.created_at.elapsed() < self.ttl {
                return slot.cell.clone();
            }
        }
        let cell = Arc::new(OnceCell::new());
        slots.insert(
            name.to_string(),
            CacheSlot {
                cell: cell.clone(),
                created_at: Instant::now(),
            },
        );
        cell
    }

    async fn lookup_or_create(&self, name: &str) -> Result<String, PipelineError> {
        match self.find(name).await {
            Ok(Some(id)) => {
                info!(target = "brandcast.index", index_id = %id, index_name = name, "index_reused");
                return Ok(id);
            }
            Ok(None) => {}
            Err(err) => {
                warn!(target = "brandcast.index", error = %err, index_name = name, "index_list_failed_continuing");
            }
        }

        match self.client.create_index(name).await {
            Ok(index) => {
                info!(target = "brandcast.index", index_id = %index.id, index_name = name, "index_created");
                Ok(index.id)
            }
            Err(TwelveLabsError::Conflict(detail)) => {
                warn!(target = "brandcast.index", index_name = name, "index_create_conflict_relisting");
                match self.find(name).await.map_err(|err| err.into_stage(STAGE))? {
                    Some(id) => {
                        info!(target = "brandcast.index", index_id = %id, index_name = name, "index_resolved_after_conflict");
                        Ok(id)
                    }
                    None => Err(PipelineError::conflict(
                        STAGE,
                        format!("index `{name}` reported as existing but not listed: {detail}"),
                    )),
                }
            }
            Err(err) => Err(err.into_stage(STAGE)),
        }
    }

    async fn find(&self, name: &str) -> Result<Option<String>, TwelveLabsError> {
        Ok(self
            .client
            .list_indexes()
            .await?
            .into_iter()
            .find(|index| index.name == name)
            .map(|index| index.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineErrorKind;
    use crate::video::testing::FakeVideoClient;

    fn resolver(client: &Arc<FakeVideoClient>) -> IndexResolver {
        IndexResolver::new(client.clone(), DEFAULT_CACHE_TTL)
    }

    #[tokio::test]
    async fn existing_index_is_returned_without_create() {
        let client = Arc::new(FakeVideoClient::with_indexes(&[("idx1", "video-analysis-index")]));
        let id = resolver(&client)
            .resolve_or_create("video-analysis-index")
            .await
            .expect("resolve");
        assert_eq!(id, "idx1");
        assert_eq!(client.create_index_calls(), 0);
    }

    #[tokio::test]
    async fn repeated_calls_return_same_id_and_create_once() {
        let client = Arc::new(FakeVideoClient::default());
        let resolver = resolver(&client);
        let first = resolver.resolve_or_create("video-analysis-index").await.unwrap();
        let second = resolver.resolve_or_create("video-analysis-index").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(client.create_index_calls(), 1);
        assert_eq!(client.list_calls(), 1);
    }

    #[tokio::test]
    async fn concurrent_first_callers_share_one_lookup() {
        let client = Arc::new(FakeVideoClient::default());
        let resolver = Arc::new(resolver(&client));
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let resolver = resolver.clone();
                tokio::spawn(async move { resolver.resolve_or_create("shared").await })
            })
            .collect();
        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(client.create_index_calls(), 1);
    }

    #[tokio::test]
    async fn conflict_is_recovered_by_relisting() {
        let client = Arc::new(FakeVideoClient::default());
        client.conflict_on_create(Some(("idx-raced", "video-analysis-index")));
        let id = resolver(&client)
            .resolve_or_create("video-analysis-index")
            .await
            .expect("recovered");
        assert_eq!(id, "idx-raced");
        assert_eq!(client.create_index_calls(), 1);
        assert_eq!(client.list_calls(), 2);
    }

    #[tokio::test]
    async fn conflict_without_listing_propagates() {
        let client = Arc::new(FakeVideoClient::default());
        client.conflict_on_create(None);
        let err = resolver(&client)
            .resolve_or_create("video-analysis-index")
            .await
            .expect_err("inconsistent remote state");
        assert_eq!(err.kind(), PipelineErrorKind::Conflict);
        assert_eq!(err.stage(), "resolve_index");
    }

    #[tokio::test]
    async fn list_failure_still_attempts_create() {
        let client = Arc::new(FakeVideoClient::default());
        client.fail_next_lists(1);
        let id = resolver(&client).resolve_or_create("fresh").await.expect("created");
        assert!(id.starts_with("idx-"));
        assert_eq!(client.create_index_calls(), 1);
    }

    #[tokio::test]
    async fn failures_are_not_memoized() {
        let client = Arc::new(FakeVideoClient::default());
        client.fail_next_creates(1);
        let resolver = resolver(&client);
        assert!(resolver.resolve_or_create("flaky").await.is_err());
        let id = resolver.resolve_or_create("flaky").await.expect("second attempt");
        assert!(!id.is_empty());
        assert_eq!(client.create_index_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_slots_are_resolved_again() {
        let client = Arc::new(FakeVideoClient::with_indexes(&[("idx1", "video-analysis-index")]));
        let resolver = IndexResolver::new(client.clone(), Duration::from_secs(60));
        resolver.resolve_or_create("video-analysis-index").await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        resolver.resolve_or_create("video-analysis-index").await.unwrap();
        assert_eq!(client.list_calls(), 2);
    }
}
