//! In-memory store for unit tests.

use super::{CommerceClient, MarketingEvent, ShopCredentials, ShopifyError, StoreSnapshot};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Mutex;

#[derive(Default)]
struct FakeState {
    snapshot: Option<StoreSnapshot>,
    scan_calls: u32,
    events: Vec<Value>,
    reject_events: bool,
}

/// Without a snapshot every scan answers HTTP 401.
#[derive(Default)]
pub struct FakeCommerce {
    state: Mutex<FakeState>,
}

impl FakeCommerce {
    pub fn with_snapshot(snapshot: StoreSnapshot) -> Self {
        let fake = Self::default();
        fake.state.lock().unwrap().snapshot = Some(snapshot);
        fake
    }

    pub fn reject_events(&self) {
        self.state.lock().unwrap().reject_events = true;
    }

    pub fn scan_calls(&self) -> u32 {
        self.state.lock().unwrap().scan_calls
    }

    pub fn events(&self) -> Vec<Value> {
        self.state.lock().unwrap().events.clone()
    }
}

#[async_trait]
impl CommerceClient for FakeCommerce {
    async fn scan_store(
        &self,
        shop: &ShopCredentials,
        product_limit: usize,
    ) -> Result<StoreSnapshot, ShopifyError> {
        shop.validate()?;
        let mut state = self.state.lock().unwrap();
        state.scan_calls += 1;
        match &state.snapshot {
            Some(snapshot) => {
                let mut snapshot = snapshot.clone();
                snapshot.products.truncate(product_limit);
                Ok(snapshot)
            }
            None => Err(ShopifyError::Status {
                status: 401,
                body: "[API] Invalid API key or access token".into(),
            }),
        }
    }

    async fn create_marketing_event(
        &self,
        shop: &ShopCredentials,
        event: &Value,
    ) -> Result<MarketingEvent, ShopifyError> {
        shop.validate()?;
        let mut state = self.state.lock().unwrap();
        if state.reject_events {
            return Err(ShopifyError::Status {
                status: 422,
                body: "{\"errors\":{\"event_type\":[\"is invalid\"]}}".into(),
            });
        }
        state.events.push(event.clone());
        let id = format!("{}", 1000 + state.events.len());
        let mut raw = event.clone();
        if let Value::Object(map) = &mut raw {
            map.insert("id".into(), json!(id));
        }
        Ok(MarketingEvent { id, raw })
    }
}
