use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::error::{AppError, LspResult};
use crate::events::{EventBus, LspEvent};
use crate::lsp::adapter::{ProviderAdapter, ORDER_ID_FIELDS};
use crate::lsp::cache::LspCache;
use crate::lsp::capabilities::CapabilityResolver;
use crate::lsp::shapes;
use crate::lsp::transport::LspTransport;
use crate::observability::sanitization::{sanitize_node_pubkey, sanitize_token};
use crate::types::{ChannelOrderRequest, LspCapabilities, Order};

/// Length of a hex-encoded compressed secp256k1 public key
const NODE_PUBKEY_HEX_LEN: usize = 66;

/// Submits channel orders and reads their status through one provider
/// adapter. Holds the capabilities orders are validated against.
pub struct OrderClient {
    transport: Arc<dyn LspTransport>,
    adapter: &'static ProviderAdapter,
    resolver: CapabilityResolver,
    capabilities: RwLock<LspCapabilities>,
    cache: Arc<LspCache>,
    event_bus: Arc<EventBus>,
}

impl OrderClient {
    pub fn new(
        transport: Arc<dyn LspTransport>,
        adapter: &'static ProviderAdapter,
        resolver: CapabilityResolver,
        cache: Arc<LspCache>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        // Defaults, adjusted for the configured floor, until the LSP answers
        let initial = resolver.resolve(&Value::Null);
        Self {
            transport,
            adapter,
            resolver,
            capabilities: RwLock::new(initial),
            cache,
            event_bus,
        }
    }

    pub fn adapter(&self) -> &'static ProviderAdapter {
        self.adapter
    }

    pub async fn capabilities(&self) -> LspCapabilities {
        self.capabilities.read().await.clone()
    }

    /// Seed capabilities from the cache. Returns whether anything was loaded.
    pub async fn load_cached_capabilities(&self) -> bool {
        match self.cache.capabilities().await {
            Some(cached) => {
                debug!(
                    min_channel_sats = cached.min_channel_sats,
                    max_channel_sats = cached.max_channel_sats,
                    "Using cached LSP capabilities"
                );
                *self.capabilities.write().await = cached;
                true
            }
            None => false,
        }
    }

    /// Fetch and resolve the provider's capability document. On failure the
    /// previously known capabilities stay in place.
    #[instrument(skip(self), fields(provider = %self.adapter.kind))]
    pub async fn refresh_capabilities(&self) -> LspResult<LspCapabilities> {
        let document = self.transport.get_json(self.adapter.info_path).await?;
        let resolved = self.resolver.resolve(&document);

        *self.capabilities.write().await = resolved.clone();
        self.cache.store_capabilities(&resolved).await;

        self.event_bus
            .publish(LspEvent::CapabilitiesResolved {
                min_channel_sats: resolved.min_channel_sats,
                max_channel_sats: resolved.max_channel_sats,
                fee_rate_percent: resolved.fee_rate_percent,
                timestamp: Utc::now(),
            })
            .await;

        Ok(resolved)
    }

    /// Check a request against the current capabilities without sending it
    pub async fn validate(&self, request: &ChannelOrderRequest) -> LspResult<()> {
        validate_node_pubkey(&request.node_public_key)?;

        let capabilities = self.capabilities.read().await;
        if !capabilities.contains(request.channel_size_sats) {
            return Err(AppError::out_of_range(
                request.channel_size_sats,
                capabilities.min_channel_sats,
                capabilities.max_channel_sats,
            ));
        }
        Ok(())
    }

    /// Submit a channel order. Invalid requests are rejected before any
    /// network call; transport and parse failures are returned as-is.
    #[instrument(
        skip(self, request),
        fields(
            provider = %self.adapter.kind,
            channel_size_sats = request.channel_size_sats,
        )
    )]
    pub async fn create_order(&self, request: &ChannelOrderRequest) -> LspResult<Order> {
        if let Err(e) = self.validate(request).await {
            e.log("create_order");
            return Err(e);
        }

        let body = self.adapter.order_request_body(request);
        info!(
            node_pubkey = %sanitize_node_pubkey(&request.node_public_key),
            announce_channel = request.announce_channel,
            token = %sanitize_token(&request.token),
            "Submitting channel order"
        );

        let payload = self.transport.post_json(self.adapter.order_path, &body).await?;
        let order = self.first_order(&payload)?;

        self.event_bus
            .publish(LspEvent::OrderCreated {
                order: order.clone(),
                channel_size_sats: request.channel_size_sats,
                timestamp: Utc::now(),
            })
            .await;

        Ok(order)
    }

    /// Fetch the current status of one order
    pub async fn fetch_order(&self, order_id: &str) -> LspResult<Order> {
        let path = self.adapter.status_path(order_id);
        let payload = self.transport.get_json(&path).await?;

        // Status responses often omit the id of the order they describe
        shapes::normalize(&payload)
            .items
            .into_iter()
            .filter_map(|item| self.adapter.parse_order(&with_order_id(item, order_id)))
            .find(|order| order.order_id == order_id)
            .ok_or_else(|| {
                AppError::parse_error(
                    format!("Status response does not describe order {}", order_id),
                    payload.to_string(),
                )
            })
    }

    /// Normalize any supported envelope into canonical orders
    pub fn parse_orders(&self, payload: &Value) -> Vec<Order> {
        let normalized = shapes::normalize(payload);
        let total = normalized.items.len();
        let orders: Vec<Order> = normalized
            .items
            .iter()
            .filter_map(|item| self.adapter.parse_order(item))
            .collect();

        if orders.len() != total {
            warn!(
                shape = normalized.shape,
                total,
                parsed = orders.len(),
                "Skipped response items without an order id"
            );
        }
        orders
    }

    /// First order in a creation response. A response without an order id
    /// is still usable when it carries the invoice to pay.
    fn first_order(&self, payload: &Value) -> LspResult<Order> {
        if let Some(order) = self.parse_orders(payload).into_iter().next() {
            return Ok(order);
        }

        let unidentified = shapes::normalize(payload)
            .items
            .iter()
            .find_map(|item| self.adapter.parse_unidentified_order(item));
        match unidentified {
            Some(order) => {
                warn!("Order response has an invoice but no order id, status cannot be polled");
                Ok(order)
            }
            None => {
                let error = AppError::parse_error(
                    "Order response contains neither an order id nor an invoice",
                    payload.to_string(),
                );
                error.log("create_order");
                Err(error)
            }
        }
    }
}

fn with_order_id(mut item: Value, order_id: &str) -> Value {
    if let Some(object) = item.as_object_mut() {
        let has_id = ORDER_ID_FIELDS
            .iter()
            .any(|field| object.get(*field).is_some_and(|v| !v.is_null()));
        if !has_id {
            object.insert("order_id".to_string(), Value::String(order_id.to_string()));
        }
    }
    item
}

/// Node public keys must be 66 hex characters
pub fn validate_node_pubkey(pubkey: &str) -> LspResult<()> {
    if pubkey.trim().is_empty() {
        return Err(AppError::validation_error("Node public key is required"));
    }
    if pubkey.len() != NODE_PUBKEY_HEX_LEN || hex::decode(pubkey).is_err() {
        return Err(AppError::validation_error(format!(
            "Node public key must be {} hex characters",
            NODE_PUBKEY_HEX_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "order_client_tests.rs"]
mod tests;
