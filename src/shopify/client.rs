use super::marketing::{MarketingEvent, event_request_body, parse_event_response};
use super::store::{StoreSnapshot, parse_scan_response, scan_request_body};
use super::{CommerceClient, ShopCredentials, ShopifyError};
use crate::http::build_client;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

pub static API_VERSION: Lazy<String> = Lazy::new(|| {
    std::env::var("SHOPIFY_API_VERSION").unwrap_or_else(|_| "2024-01".to_string())
});

#[derive(Debug, Clone)]
pub struct ShopifyConfig {
    pub api_version: String,
    /// Replaces `https://{shop_domain}` when set; used to point the client at
    /// a local stand-in.
    pub origin_override: Option<String>,
}

impl ShopifyConfig {
    pub fn from_env() -> Self {
        Self {
            api_version: API_VERSION.clone(),
            origin_override: None,
        }
    }
}

pub struct ShopifyClient {
    http: Client,
    config: ShopifyConfig,
}

impl ShopifyClient {
    pub fn new(config: ShopifyConfig) -> Self {
        Self {
            http: build_client(),
            config,
        }
    }

    fn admin_url(&self, shop: &ShopCredentials, resource: &str) -> String {
        let origin = match &self.config.origin_override {
            Some(origin) => origin.trim_end_matches('/').to_string(),
            None => format!("https://{}", shop.shop_domain.trim()),
        };
        format!("{origin}/admin/api/{}/{resource}", self.config.api_version)
    }

    async fn post_admin(
        &self,
        shop: &ShopCredentials,
        resource: &str,
        body: &Value,
    ) -> Result<Value, ShopifyError> {
        shop.validate()?;
        let response = self
            .http
            .post(self.admin_url(shop, resource))
            .header("X-Shopify-Access-Token", shop.access_token.trim())
            .json(body)
            .send()
            .await
            .map_err(|err| ShopifyError::Http(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                target = "brandcast.shopify",
                shop = %shop.shop_domain,
                status = status.as_u16(),
                resource,
                "admin_api_error"
            );
            return Err(ShopifyError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|err| ShopifyError::InvalidResponse(err.to_string()))
    }
}

#[async_trait]
impl CommerceClient for ShopifyClient {
    async fn scan_store(
        &self,
        shop: &ShopCredentials,
        product_limit: usize,
    ) -> Result<StoreSnapshot, ShopifyError> {
        let payload = self
            .post_admin(shop, "graphql.json", &scan_request_body(product_limit))
            .await?;
        let snapshot = parse_scan_response(payload)?;
        debug!(
            target = "brandcast.shopify",
            shop = %shop.shop_domain,
            products = snapshot.products.len(),
            "store_scanned"
        );
        Ok(snapshot)
    }

    async fn create_marketing_event(
        &self,
        shop: &ShopCredentials,
        event: &Value,
    ) -> Result<MarketingEvent, ShopifyError> {
        let payload = self
            .post_admin(shop, "marketing_events.json", &event_request_body(event))
            .await?;
        parse_event_response(payload)
    }
}
