use super::ShopifyError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A marketing event as acknowledged by the store. `raw` keeps every field
/// the platform returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketingEvent {
    pub id: String,
    pub raw: Value,
}

pub(super) fn event_request_body(event: &Value) -> Value {
    json!({ "marketing_event": event })
}

/// Requires `marketing_event.id`; a response without it means the event was
/// not recorded.
pub(super) fn parse_event_response(payload: Value) -> Result<MarketingEvent, ShopifyError> {
    let event = payload
        .get("marketing_event")
        .cloned()
        .ok_or_else(|| ShopifyError::InvalidResponse("missing marketing_event".into()))?;
    let id = match event.get("id") {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => {
            return Err(ShopifyError::InvalidResponse(
                "marketing_event has no id".into(),
            ));
        }
    };
    Ok(MarketingEvent { id, raw: event })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_are_stringified() {
        let event = parse_event_response(json!({
            "marketing_event": {"id": 998730241, "event_type": "ad", "marketing_channel": "social"}
        }))
        .expect("event");
        assert_eq!(event.id, "998730241");
        assert_eq!(event.raw["event_type"], json!("ad"));
    }

    #[test]
    fn missing_id_is_rejected() {
        assert!(parse_event_response(json!({"marketing_event": {}})).is_err());
        assert!(parse_event_response(json!({"errors": "Not Found"})).is_err());
    }
}
