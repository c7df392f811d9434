use redis::AsyncCommands;
use serde::{Serialize, de::DeserializeOwned};
use std::{collections::HashMap, time::Duration};
use tokio::{sync::Mutex, time::Instant};
use tracing::warn;

pub async fn redis_get<T: DeserializeOwned>(client: &redis::Client, key: &str) -> Option<T> {
    let mut conn = match client.get_multiplexed_async_connection().await {
        Ok(c) => c,
        Err(err) => {
            warn!(target = "brandcast.idempotency", error = %err, "redis_unavailable");
            return None;
        }
    };
    let s: Option<String> = conn.get(key).await.ok();
    s.and_then(|v| serde_json::from_str(&v).ok())
}

pub async fn redis_set<T: Serialize>(client: &redis::Client, key: &str, value: &T, ttl_secs: u64) {
    if let Ok(mut conn) = client.get_multiplexed_async_connection().await {
        if let Ok(json) = serde_json::to_string(value) {
            let _: Result<(), _> = conn.set_ex(key, json, ttl_secs).await;
        }
    }
}

/// Replays responses keyed by `Idempotency-Key`. Redis backs it when
/// configured; otherwise entries live in process memory until `ttl` passes.
pub struct IdempotencyStore {
    redis: Option<redis::Client>,
    local: Mutex<HashMap<String, (Instant, String)>>,
    ttl: Duration,
    namespace: &'static str,
}

impl IdempotencyStore {
    pub fn new(redis: Option<redis::Client>, ttl: Duration, namespace: &'static str) -> Self {
        Self {
            redis,
            local: Mutex::new(HashMap::new()),
            ttl,
            namespace,
        }
    }

    pub fn from_env(namespace: &'static str) -> Self {
        let redis = crate::config::env_string("REDIS_URL").and_then(|url| match redis::Client::open(url) {
            Ok(client) => Some(client),
            Err(err) => {
                warn!(target = "brandcast.idempotency", error = %err, "redis_url_invalid");
                None
            }
        });
        let ttl = crate::config::env_parse::<u64>("IDEMPOTENCY_TTL_SECS")
            .filter(|v| *v > 0)
            .unwrap_or(3600);
        Self::new(redis, Duration::from_secs(ttl), namespace)
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key.trim())
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let key = self.scoped(key);
        if let Some(client) = &self.redis {
            return redis_get(client, &key).await;
        }
        let mut local = self.local.lock().await;
        match local.get(&key) {
            Some((stored_at, _)) if stored_at.elapsed() >= self.ttl => {
                local.remove(&key);
                None
            }
            Some((_, json)) => serde_json::from_str(json).ok(),
            None => None,
        }
    }

    pub async fn put<T: Serialize>(&self, key: &str, value: &T) {
        let key = self.scoped(key);
        if let Some(client) = &self.redis {
            redis_set(client, &key, value, self.ttl.as_secs()).await;
            return;
        }
        if let Ok(json) = serde_json::to_string(value) {
            let mut local = self.local.lock().await;
            let ttl = self.ttl;
            local.retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
            local.insert(key, (Instant::now(), json));
        }
    }

    #[cfg(test)]
    async fn local_len(&self) -> usize {
        self.local.lock().await.len()
    }
}
