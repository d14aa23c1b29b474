use std::sync::Arc;

use anyhow::Result;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::LspResult;
use crate::events::handlers::LoggingEventHandler;
use crate::events::EventBus;
use crate::lsp::{
    CapabilityResolver, HttpTransport, LspCache, LspTransport, OrderClient, ProviderAdapter,
};
use crate::services::{
    reconcile, ChannelListPoller, ChannelPollerConfig, OrderPollerConfig, OrderStatusPoller,
    OrderViewModel, TransportChannelSource,
};
use crate::types::{ChannelOrderRequest, LspCapabilities, Order};

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;

/// Every service of the client, wired from one [`Config`]
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub event_bus: Arc<EventBus>,
    pub cache: Arc<LspCache>,
    pub order_client: Arc<OrderClient>,
    pub order_poller: Arc<OrderStatusPoller>,
    pub channel_poller: Arc<ChannelListPoller>,
    /// Result of the last creation call, shown until the first status poll
    created_order: Arc<RwLock<Option<Order>>>,
}

impl AppState {
    /// Build the services. `config.data_dir` holds the capability cache;
    /// without it the cache lives in memory only.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let provider = config.provider_kind()?;

        let event_bus = Arc::new(EventBus::new(config.event_bus_capacity));
        event_bus
            .register_handler(Arc::new(LoggingEventHandler::new(false)))
            .await;

        let cache = Arc::new(match (config.cache_enabled, config.data_dir.as_deref()) {
            (true, Some(dir)) => LspCache::open(dir),
            _ => LspCache::in_memory(),
        });

        let lsp_transport: Arc<dyn LspTransport> = Arc::new(HttpTransport::new(&config.lsp_url)?);
        let backend_transport: Arc<dyn LspTransport> = if config.backend_url.is_some() {
            Arc::new(HttpTransport::new(config.backend_base_url())?)
        } else {
            lsp_transport.clone()
        };

        let order_client = Arc::new(OrderClient::new(
            lsp_transport,
            ProviderAdapter::for_kind(provider),
            CapabilityResolver::new(
                config.min_channel_floor_sats,
                Some(config.default_channel_size_sats),
            ),
            cache.clone(),
            event_bus.clone(),
        ));

        let order_poller = Arc::new(OrderStatusPoller::new(
            order_client.clone(),
            event_bus.clone(),
            OrderPollerConfig {
                poll_interval: config.order_poll_interval(),
            },
        ));

        let channel_poller = Arc::new(ChannelListPoller::new(
            Arc::new(TransportChannelSource::new(
                backend_transport,
                config.channels_path.clone(),
            )),
            cache.clone(),
            event_bus.clone(),
            ChannelPollerConfig {
                poll_interval: config.channel_poll_interval(),
                lsp_uris: config.lsp_uris.clone(),
            },
        ));

        info!(
            provider = %provider,
            lsp_url = %config.lsp_url,
            cache_enabled = config.cache_enabled,
            "Application state initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            event_bus,
            cache,
            order_client,
            order_poller,
            channel_poller,
            created_order: Arc::new(RwLock::new(None)),
        })
    }

    /// Seed capabilities from the cache, then ask the LSP. A failed refresh
    /// keeps whatever was cached.
    pub async fn load_capabilities(&self) -> LspCapabilities {
        self.order_client.load_cached_capabilities().await;
        match self.order_client.refresh_capabilities().await {
            Ok(capabilities) => capabilities,
            Err(e) => {
                warn!(
                    error_code = e.category.error_code(),
                    error = %e.message,
                    "Failed to refresh LSP capabilities, using last known"
                );
                self.order_client.capabilities().await
            }
        }
    }

    /// Order request for `node_public_key` with the configured defaults.
    /// `None` arguments fall back to the `[order-defaults]` table.
    pub fn order_request(
        &self,
        channel_size_sats: u64,
        node_public_key: impl Into<String>,
        token: Option<String>,
        announce_channel: Option<bool>,
    ) -> ChannelOrderRequest {
        let defaults = &self.config.order_defaults;
        ChannelOrderRequest {
            channel_size_sats,
            node_public_key: node_public_key.into(),
            required_confirmations: defaults.required_channel_confirmations,
            funding_confirm_within_blocks: defaults.funding_confirms_within_blocks,
            expiry_blocks: defaults.channel_expiry_blocks,
            announce_channel: announce_channel.unwrap_or(defaults.announce_channel),
            token: token.unwrap_or_else(|| defaults.token.clone()),
        }
    }

    /// Create an order and start polling its status. An order the LSP did
    /// not give an id is kept for display but not polled.
    pub async fn place_order(&self, request: &ChannelOrderRequest) -> LspResult<Order> {
        let order = self.order_client.create_order(request).await?;
        *self.created_order.write().await = Some(order.clone());
        if order.order_id.is_empty() {
            warn!("Order has no id, skipping status polling");
            self.order_poller.stop().await;
        } else {
            self.order_poller.start(order.clone()).await?;
        }
        Ok(order)
    }

    /// Resume polling an order created earlier
    pub async fn watch_order(&self, order_id: &str) -> LspResult<Order> {
        let order = self.order_client.fetch_order(order_id).await?;
        *self.created_order.write().await = None;
        self.order_poller.start(order.clone()).await?;
        Ok(order)
    }

    /// Current merged view of the order and the LSP channels
    pub async fn view_model(&self) -> OrderViewModel {
        let created = self.created_order.read().await.clone();
        let latest = self.order_poller.current_order().await;
        let channels = self.channel_poller.latest().await;
        reconcile(created.as_ref(), latest.as_ref(), &channels)
    }

    pub async fn start_services(&self) {
        if self.channel_poller.start().await {
            info!("Channel list poller started successfully");
        }
    }

    pub async fn stop_services(&self) {
        self.order_poller.stop().await;
        self.channel_poller.stop().await;
        info!("Pollers stopped");
    }
}
