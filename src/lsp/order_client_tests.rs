#![allow(clippy::unwrap_used)]
use std::sync::Arc;

use serde_json::json;

use super::*;
use crate::error::ErrorCategory;
use crate::lsp::adapter::ProviderKind;
use crate::testing::{Scripted, ScriptedTransport};
use crate::types::OrderState;

const NODE_PUBKEY: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
const TXID: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

fn client_with(transport: Arc<ScriptedTransport>, kind: ProviderKind) -> OrderClient {
    OrderClient::new(
        transport,
        ProviderAdapter::for_kind(kind),
        CapabilityResolver::default(),
        Arc::new(LspCache::in_memory()),
        Arc::new(EventBus::new(16)),
    )
}

fn request(channel_size_sats: u64) -> ChannelOrderRequest {
    ChannelOrderRequest {
        channel_size_sats,
        node_public_key: NODE_PUBKEY.to_string(),
        required_confirmations: 0,
        funding_confirm_within_blocks: 6,
        expiry_blocks: 13_140,
        announce_channel: true,
        token: String::new(),
    }
}

#[tokio::test]
async fn test_size_above_max_rejected_before_network() {
    let transport = Arc::new(ScriptedTransport::new());
    let client = client_with(transport.clone(), ProviderKind::Direct);
    let max = client.capabilities().await.max_channel_sats;

    let err = client.create_order(&request(max + 1)).await.unwrap_err();

    assert_eq!(err.category, ErrorCategory::OutOfRange);
    assert!(err.category.is_validation_error());
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_bad_pubkey_rejected_before_network() {
    let transport = Arc::new(ScriptedTransport::new());
    let client = client_with(transport.clone(), ProviderKind::Direct);

    let mut missing = request(500_000);
    missing.node_public_key = String::new();
    let err = client.create_order(&missing).await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::ValidationError);

    let mut short = request(500_000);
    short.node_public_key = "02abcd".to_string();
    let err = client.create_order(&short).await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::ValidationError);

    let mut not_hex = request(500_000);
    not_hex.node_public_key = "zz".repeat(33);
    let err = client.create_order(&not_hex).await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::ValidationError);

    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_create_order_posts_canonical_body() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond_json(
        "/order",
        json!({ "order_id": "o-1", "state": "CREATED", "payment_request": "lnbc1", "total_sats": 1500 }),
    );
    let client = client_with(transport.clone(), ProviderKind::Direct);

    let order = client.create_order(&request(1_000_000)).await.unwrap();

    assert_eq!(order.order_id, "o-1");
    assert_eq!(order.state, OrderState::Created);
    assert_eq!(order.invoice.as_deref(), Some("lnbc1"));
    assert_eq!(order.total_sats, Some(1500));

    let calls = transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, "POST");
    let body = calls[0].body.as_ref().unwrap();
    assert_eq!(body["lsp_balance_sat"], "1000000");
    assert_eq!(body["public_key"], NODE_PUBKEY);
    assert_eq!(body["announce_channel"], true);
}

#[tokio::test]
async fn test_proxy_provider_uses_node_pubkey_field() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond_json("/order", json!({ "data": { "orderId": "p-1" } }));
    let client = client_with(transport.clone(), ProviderKind::Proxy);

    let order = client.create_order(&request(500_000)).await.unwrap();
    assert_eq!(order.order_id, "p-1");

    let body = transport.calls()[0].body.clone().unwrap();
    assert_eq!(body["node_pubkey"], NODE_PUBKEY);
    assert!(body.get("public_key").is_none());
}

#[tokio::test]
async fn test_response_without_order_id_is_parse_error() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond_json("/order", json!({ "message": "accepted" }));
    let client = client_with(transport, ProviderKind::Direct);

    let err = client.create_order(&request(500_000)).await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::ParseError);
    assert!(err.raw_payload().unwrap().contains("accepted"));
}

#[tokio::test]
async fn test_response_with_invoice_but_no_order_id() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond_json("/order", json!({ "payment_request": "lnbc1", "total_sats": 1500 }));
    let client = client_with(transport, ProviderKind::Direct);

    let order = client.create_order(&request(500_000)).await.unwrap();
    assert!(order.order_id.is_empty());
    assert_eq!(order.state, OrderState::Created);
    assert_eq!(order.invoice.as_deref(), Some("lnbc1"));
    assert_eq!(order.total_sats, Some(1500));
}

#[tokio::test]
async fn test_transport_error_surfaces_without_retry() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond("/order", Scripted::Fail(ErrorCategory::TransportError));
    let client = client_with(transport.clone(), ProviderKind::Direct);

    let err = client.create_order(&request(500_000)).await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::TransportError);
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_orders_envelope_and_bare_array_agree() {
    let client = client_with(Arc::new(ScriptedTransport::new()), ProviderKind::Direct);
    let o1 = json!({ "order_id": "o1", "state": "OPEN", "invoice": "lnbc1" });

    let from_envelope = client.parse_orders(&json!({ "orders": [o1.clone()] }));
    let from_array = client.parse_orders(&json!([o1]));

    assert_eq!(from_envelope.len(), 1);
    assert_eq!(from_envelope, from_array);
    assert_eq!(from_envelope[0].state, OrderState::PaymentPending);
}

#[tokio::test]
async fn test_refresh_capabilities_updates_validation_bounds() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond_json(
        "/info",
        json!({
            "min_channel_balance_sat": 150_000,
            "max_channel_balance_sat": 2_000_000,
            "uris": [format!("{NODE_PUBKEY}@lsp.example.com:9735")]
        }),
    );
    let cache = Arc::new(LspCache::in_memory());
    let client = OrderClient::new(
        transport,
        ProviderAdapter::for_kind(ProviderKind::Direct),
        CapabilityResolver::default(),
        cache.clone(),
        Arc::new(EventBus::new(16)),
    );

    let caps = client.refresh_capabilities().await.unwrap();
    assert_eq!(caps.min_channel_sats, 150_000);
    assert!(cache.lsp_pubkeys().await.contains(NODE_PUBKEY));

    let err = client.validate(&request(120_000)).await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::OutOfRange);
    assert!(client.validate(&request(150_000)).await.is_ok());
}

#[tokio::test]
async fn test_failed_capability_refresh_keeps_previous() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond("/info", Scripted::Fail(ErrorCategory::TransportError));
    let client = client_with(transport, ProviderKind::Direct);

    assert!(client.refresh_capabilities().await.is_err());
    assert_eq!(client.capabilities().await, LspCapabilities::default());
}

#[tokio::test]
async fn test_load_cached_capabilities() {
    let cache = Arc::new(LspCache::in_memory());
    let cached = LspCapabilities {
        min_channel_sats: 300_000,
        ..Default::default()
    };
    cache.store_capabilities(&cached).await;

    let client = OrderClient::new(
        Arc::new(ScriptedTransport::new()),
        ProviderAdapter::for_kind(ProviderKind::Direct),
        CapabilityResolver::default(),
        cache,
        Arc::new(EventBus::new(16)),
    );

    assert!(client.load_cached_capabilities().await);
    assert_eq!(client.capabilities().await.min_channel_sats, 300_000);
}

#[tokio::test]
async fn test_fetch_order_without_id_in_response() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond_json(
        "/order/o-9",
        json!({
            "status": "SUCCESS",
            "channelInfo": { "fundingOutpoint": format!("{TXID}:0") }
        }),
    );
    let client = client_with(transport, ProviderKind::Direct);

    let order = client.fetch_order("o-9").await.unwrap();
    assert_eq!(order.order_id, "o-9");
    assert_eq!(order.state, OrderState::Completed);
    assert!(order.funding_outpoint().is_some());
}

#[tokio::test]
async fn test_fetch_order_in_data_envelope() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond_json("/order/o-3", json!({ "data": { "state": "PAID" } }));
    let client = client_with(transport, ProviderKind::Direct);

    let order = client.fetch_order("o-3").await.unwrap();
    assert_eq!(order.state, OrderState::Paid);
}

#[tokio::test]
async fn test_fetch_order_for_other_id_is_parse_error() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond_json("/order/o-1", json!({ "order_id": "someone-else", "state": "PAID" }));
    let client = client_with(transport, ProviderKind::Direct);

    let err = client.fetch_order("o-1").await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::ParseError);
}
