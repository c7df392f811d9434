pub mod client;
pub mod marketing;
pub mod store;
#[cfg(test)]
pub mod testing;

use crate::pipeline::PipelineError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub use client::{ShopifyClient, ShopifyConfig};
pub use marketing::MarketingEvent;
pub use store::{ProductSummary, StoreSnapshot};

#[derive(Debug, Error)]
pub enum ShopifyError {
    #[error("invalid shop credentials: {0}")]
    InvalidCredentials(&'static str),
    #[error("http error: {0}")]
    Http(String),
    #[error("Shopify API error: HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("graphql errors: {0}")]
    GraphQl(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ShopifyError {
    pub fn into_stage(self, stage: &'static str) -> PipelineError {
        match self {
            Self::InvalidCredentials(_) => PipelineError::invalid_input(stage, self.to_string()),
            _ => PipelineError::transport(stage, self.to_string()),
        }
    }
}

/// Per-request store credentials handed over by the embedded admin app.
#[derive(Debug, Clone, Deserialize)]
pub struct ShopCredentials {
    pub shop_domain: String,
    pub access_token: String,
}

impl ShopCredentials {
    pub fn validate(&self) -> Result<(), ShopifyError> {
        let domain = self.shop_domain.trim();
        if domain.is_empty() {
            return Err(ShopifyError::InvalidCredentials("shop_domain is empty"));
        }
        if domain.contains('/') || domain.contains(char::is_whitespace) {
            return Err(ShopifyError::InvalidCredentials(
                "shop_domain must be a bare host name",
            ));
        }
        if self.access_token.trim().is_empty() {
            return Err(ShopifyError::InvalidCredentials("access_token is empty"));
        }
        Ok(())
    }
}

#[async_trait]
pub trait CommerceClient: Send + Sync {
    /// Shop description plus the first `product_limit` products.
    async fn scan_store(
        &self,
        shop: &ShopCredentials,
        product_limit: usize,
    ) -> Result<StoreSnapshot, ShopifyError>;

    async fn create_marketing_event(
        &self,
        shop: &ShopCredentials,
        event: &Value,
    ) -> Result<MarketingEvent, ShopifyError>;
}
