//! Response envelope detection.
//!
//! Providers wrap results differently. [`RESPONSE_SHAPES`] is tried in order
//! and the first matcher that recognises the payload returns the normalized
//! collection of items. New envelopes are new rows, not new branches.

use serde_json::Value;

use crate::lsp::adapter::ORDER_ID_FIELDS;

/// Array fields that hold the result collection directly
const COLLECTION_FIELDS: &[&str] = &["channels", "orders"];
const DATA_FIELD: &str = "data";

pub type ShapeMatcher = fn(&Value) -> Option<Vec<Value>>;

pub struct ResponseShape {
    pub name: &'static str,
    pub matcher: ShapeMatcher,
}

pub static RESPONSE_SHAPES: &[ResponseShape] = &[
    ResponseShape {
        name: "collection_field",
        matcher: match_collection_field,
    },
    ResponseShape {
        name: "bare_array",
        matcher: match_bare_array,
    },
    ResponseShape {
        name: "single_order",
        matcher: match_single_order,
    },
    ResponseShape {
        name: "data_envelope",
        matcher: match_data_envelope,
    },
    ResponseShape {
        name: "whole_payload",
        matcher: match_whole_payload,
    },
];

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPayload {
    /// Name of the matcher that recognised the payload
    pub shape: &'static str,
    pub items: Vec<Value>,
}

pub fn normalize(payload: &Value) -> NormalizedPayload {
    for shape in RESPONSE_SHAPES {
        if let Some(items) = (shape.matcher)(payload) {
            return NormalizedPayload {
                shape: shape.name,
                items,
            };
        }
    }
    // match_whole_payload always matches
    NormalizedPayload {
        shape: "whole_payload",
        items: vec![payload.clone()],
    }
}

fn match_collection_field(payload: &Value) -> Option<Vec<Value>> {
    let object = payload.as_object()?;
    COLLECTION_FIELDS
        .iter()
        .find_map(|field| object.get(*field).and_then(Value::as_array))
        .cloned()
}

fn match_bare_array(payload: &Value) -> Option<Vec<Value>> {
    payload.as_array().cloned()
}

fn match_single_order(payload: &Value) -> Option<Vec<Value>> {
    let object = payload.as_object()?;
    ORDER_ID_FIELDS
        .iter()
        .any(|field| object.get(*field).is_some_and(|v| !v.is_null()))
        .then(|| vec![payload.clone()])
}

fn match_data_envelope(payload: &Value) -> Option<Vec<Value>> {
    let data = payload.as_object()?.get(DATA_FIELD)?;
    if data.is_null() {
        return None;
    }
    Some(normalize(data).items)
}

fn match_whole_payload(payload: &Value) -> Option<Vec<Value>> {
    Some(vec![payload.clone()])
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_orders_field_and_bare_array_agree() {
        let o1 = json!({ "order_id": "o1", "state": "CREATED" });

        let enveloped = normalize(&json!({ "orders": [o1.clone()] }));
        let bare = normalize(&json!([o1.clone()]));

        assert_eq!(enveloped.shape, "collection_field");
        assert_eq!(bare.shape, "bare_array");
        assert_eq!(enveloped.items, bare.items);
    }

    #[test]
    fn test_channels_field() {
        let normalized = normalize(&json!({ "channels": [{ "remote_pubkey": "02aa" }] }));
        assert_eq!(normalized.items.len(), 1);
    }

    #[test]
    fn test_single_order_object() {
        let payload = json!({ "orderId": "o7", "invoice": "lnbc1" });
        let normalized = normalize(&payload);
        assert_eq!(normalized.shape, "single_order");
        assert_eq!(normalized.items, vec![payload]);
    }

    #[test]
    fn test_nested_data_envelope() {
        let payload = json!({ "success": true, "data": { "orders": [{ "id": 1 }] } });
        let normalized = normalize(&payload);
        assert_eq!(normalized.shape, "data_envelope");
        assert_eq!(normalized.items, vec![json!({ "id": 1 })]);
    }

    #[test]
    fn test_collection_field_wins_over_order_id() {
        let payload = json!({ "order_id": "outer", "orders": [{ "order_id": "inner" }] });
        let normalized = normalize(&payload);
        assert_eq!(normalized.items[0]["order_id"], "inner");
    }

    #[test]
    fn test_whole_payload_fallback() {
        let payload = json!({ "invoice": "lnbc1", "total_sats": 10 });
        let normalized = normalize(&payload);
        assert_eq!(normalized.shape, "whole_payload");
        assert_eq!(normalized.items, vec![payload]);
    }
}
