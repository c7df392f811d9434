use super::ShopifyError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Number of products sampled for the manifesto prompt.
pub const DEFAULT_PRODUCT_LIMIT: usize = 17;

const STORE_SCAN_QUERY: &str = r#"
query StoreScan($first: Int!) {
    shop { name description }
    products(first: $first) {
        edges { node { title descriptionHtml tags } }
    }
}
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreSnapshot {
    pub shop_name: Option<String>,
    pub description: Option<String>,
    pub products: Vec<ProductSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl StoreSnapshot {
    /// Plain-text digest handed to the manifesto generator. A store with no
    /// products still yields its description.
    pub fn to_prompt_text(&self) -> String {
        let mut lines = Vec::with_capacity(self.products.len() + 2);
        if let Some(name) = self.shop_name.as_deref().filter(|n| !n.trim().is_empty()) {
            lines.push(format!("Shop: {name}"));
        }
        let description = self
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or("No description");
        lines.push(format!("Description: {description}"));
        for product in &self.products {
            lines.push(format!(
                "- Product: {} | Tags: {}",
                product.title,
                product.tags.join(", ")
            ));
        }
        lines.join("\n")
    }
}

pub(super) fn scan_request_body(product_limit: usize) -> Value {
    json!({
        "query": STORE_SCAN_QUERY,
        "variables": { "first": product_limit },
    })
}

pub(super) fn parse_scan_response(payload: Value) -> Result<StoreSnapshot, ShopifyError> {
    let response: GraphQlResponse = serde_json::from_value(payload)
        .map_err(|err| ShopifyError::InvalidResponse(err.to_string()))?;
    let Some(data) = response.data else {
        let message = response
            .errors
            .iter()
            .map(|err| err.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ShopifyError::GraphQl(if message.is_empty() {
            "response carried no data".to_string()
        } else {
            message
        }));
    };
    let (shop_name, description) = data
        .shop
        .map(|shop| (shop.name, shop.description))
        .unwrap_or((None, None));
    let products = data
        .products
        .map(|conn| conn.edges.into_iter().map(|edge| edge.node).collect())
        .unwrap_or_default();
    Ok(StoreSnapshot {
        shop_name,
        description,
        products,
    })
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<ScanData>,
    #[serde(default)]
    errors: Vec<GraphQlErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorEntry {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ScanData {
    #[serde(default)]
    shop: Option<ShopNode>,
    #[serde(default)]
    products: Option<ProductConnection>,
}

#[derive(Debug, Deserialize)]
struct ShopNode {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProductConnection {
    #[serde(default)]
    edges: Vec<ProductEdge>,
}

#[derive(Debug, Deserialize)]
struct ProductEdge {
    node: ProductSummary,
}
