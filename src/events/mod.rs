use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::types::{ChannelRecord, Order, OrderState};

pub mod handlers;

/// Messages published by the order client and the pollers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LspEvent {
    CapabilitiesResolved {
        min_channel_sats: u64,
        max_channel_sats: u64,
        fee_rate_percent: f64,
        timestamp: DateTime<Utc>,
    },
    OrderCreated {
        order: Order,
        channel_size_sats: u64,
        timestamp: DateTime<Utc>,
    },
    OrderStatusUpdated {
        order: Order,
        previous_state: OrderState,
        timestamp: DateTime<Utc>,
    },
    OrderCompleted {
        order: Order,
        timestamp: DateTime<Utc>,
    },
    OrderFailed {
        order: Order,
        timestamp: DateTime<Utc>,
    },
    PollFailed {
        poller: String,
        order_id: Option<String>,
        error_code: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    ChannelsRefreshed {
        channels: Vec<ChannelRecord>,
        dropped: usize,
        timestamp: DateTime<Utc>,
    },
}

impl LspEvent {
    /// Generate a unique event ID
    pub fn event_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            LspEvent::CapabilitiesResolved { timestamp, .. } => *timestamp,
            LspEvent::OrderCreated { timestamp, .. } => *timestamp,
            LspEvent::OrderStatusUpdated { timestamp, .. } => *timestamp,
            LspEvent::OrderCompleted { timestamp, .. } => *timestamp,
            LspEvent::OrderFailed { timestamp, .. } => *timestamp,
            LspEvent::PollFailed { timestamp, .. } => *timestamp,
            LspEvent::ChannelsRefreshed { timestamp, .. } => *timestamp,
        }
    }

    /// Order this event is about, if any
    pub fn order(&self) -> Option<&Order> {
        match self {
            LspEvent::OrderCreated { order, .. }
            | LspEvent::OrderStatusUpdated { order, .. }
            | LspEvent::OrderCompleted { order, .. }
            | LspEvent::OrderFailed { order, .. } => Some(order),
            _ => None,
        }
    }

    pub fn order_id(&self) -> Option<&str> {
        match self {
            LspEvent::PollFailed { order_id, .. } => order_id.as_deref(),
            other => other.order().map(|order| order.order_id.as_str()),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            LspEvent::CapabilitiesResolved { .. } => "capabilities_resolved",
            LspEvent::OrderCreated { .. } => "order_created",
            LspEvent::OrderStatusUpdated { .. } => "order_status_updated",
            LspEvent::OrderCompleted { .. } => "order_completed",
            LspEvent::OrderFailed { .. } => "order_failed",
            LspEvent::PollFailed { .. } => "poll_failed",
            LspEvent::ChannelsRefreshed { .. } => "channels_refreshed",
        }
    }
}

/// Trait for handling events asynchronously
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: LspEvent) -> anyhow::Result<()>;

    /// Get the name of this handler for identification
    fn name(&self) -> &str;

    /// Critical handlers are awaited before `publish` returns; the rest run
    /// in the background
    fn is_critical(&self) -> bool {
        false
    }
}

/// Delivers events to an explicit list of registered handlers and to
/// receivers obtained from [`EventBus::subscribe`]
pub struct EventBus {
    sender: broadcast::Sender<LspEvent>,
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
    max_capacity: usize,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("max_capacity", &self.max_capacity)
            .field(
                "handlers_count",
                &self.handlers.try_read().map(|h| h.len()).unwrap_or(0),
            )
            .finish()
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            handlers: Arc::new(RwLock::new(Vec::new())),
            max_capacity: capacity,
        }
    }

    pub async fn register_handler(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        let handler_name = handler.name().to_string();
        handlers.push(handler);
        info!(
            handler_name = %handler_name,
            total_handlers = handlers.len(),
            "Event handler registered successfully"
        );
    }

    pub async fn publish(&self, event: LspEvent) {
        let event_id = event.event_id();
        let event_type = event.event_type();

        debug!(
            event_id = %event_id,
            event_type = %event_type,
            order_id = ?event.order_id(),
            "Publishing event"
        );

        match self.sender.send(event.clone()) {
            Ok(subscriber_count) => {
                debug!(
                    event_id = %event_id,
                    event_type = %event_type,
                    subscriber_count = subscriber_count,
                    "Event broadcast to subscribers"
                );
            }
            Err(broadcast::error::SendError(_)) => {
                // No active receivers, this is not an error
                debug!(
                    event_id = %event_id,
                    event_type = %event_type,
                    "Event published but no active subscribers"
                );
            }
        }

        let handlers = self.handlers.read().await;
        let mut critical_handler_futures = Vec::new();

        for handler in handlers.iter() {
            let handler_clone = handler.clone();
            let event_clone = event.clone();
            let event_id_clone = event_id.clone();

            let task = async move {
                let handler_name = handler_clone.name();
                if let Err(e) = handler_clone.handle(event_clone).await {
                    error!(
                        event_id = %event_id_clone,
                        handler_name = %handler_name,
                        error = ?e,
                        "Event handler failed"
                    );
                }
            };

            if handler.is_critical() {
                critical_handler_futures.push(task);
            } else {
                tokio::spawn(task);
            }
        }

        for future in critical_handler_futures {
            future.await;
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LspEvent> {
        self.sender.subscribe()
    }

    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }

    pub async fn stats(&self) -> EventBusStats {
        let handlers = self.handlers.read().await;
        EventBusStats {
            capacity: self.max_capacity,
            handler_count: handlers.len(),
            critical_handler_count: handlers.iter().filter(|h| h.is_critical()).count(),
            subscriber_count: self.sender.receiver_count(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBusStats {
    pub capacity: usize,
    pub handler_count: usize,
    pub critical_handler_count: usize,
    pub subscriber_count: usize,
}

#[cfg(test)]
mod tests;
