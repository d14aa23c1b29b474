use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{EventHandler, LspEvent};
use crate::observability::sanitization::sanitize_invoice;

/// Event handler that logs all events with appropriate levels and sanitization
pub struct LoggingEventHandler {
    include_debug_events: bool,
}

impl LoggingEventHandler {
    pub fn new(include_debug_events: bool) -> Self {
        Self {
            include_debug_events,
        }
    }
}

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn handle(&self, event: LspEvent) -> anyhow::Result<()> {
        match event {
            LspEvent::CapabilitiesResolved {
                min_channel_sats,
                max_channel_sats,
                fee_rate_percent,
                timestamp,
            } => {
                info!(
                    event_type = "capabilities_resolved",
                    min_channel_sats,
                    max_channel_sats,
                    fee_rate_percent,
                    timestamp = %timestamp,
                    "LSP capabilities resolved"
                );
            }
            LspEvent::OrderCreated {
                order,
                channel_size_sats,
                timestamp,
            } => {
                info!(
                    event_type = "order_created",
                    order_id = %order.order_id,
                    state = %order.state,
                    channel_size_sats,
                    total_sats = ?order.total_sats,
                    invoice = %sanitize_invoice(order.invoice.as_deref().unwrap_or_default()),
                    timestamp = %timestamp,
                    "Channel order created"
                );
            }
            LspEvent::OrderStatusUpdated {
                order,
                previous_state,
                timestamp,
            } => {
                if order.state != previous_state {
                    info!(
                        event_type = "order_status_updated",
                        order_id = %order.order_id,
                        previous_state = %previous_state,
                        state = %order.state,
                        timestamp = %timestamp,
                        "Order state changed"
                    );
                } else if self.include_debug_events {
                    debug!(
                        event_type = "order_status_updated",
                        order_id = %order.order_id,
                        state = %order.state,
                        timestamp = %timestamp,
                        "Order state unchanged"
                    );
                }
            }
            LspEvent::OrderCompleted { order, timestamp } => {
                info!(
                    event_type = "order_completed",
                    order_id = %order.order_id,
                    funding_outpoint = ?order.funding_outpoint(),
                    timestamp = %timestamp,
                    "Channel order completed"
                );
            }
            LspEvent::OrderFailed { order, timestamp } => {
                warn!(
                    event_type = "order_failed",
                    order_id = %order.order_id,
                    timestamp = %timestamp,
                    "LSP reported the order as failed"
                );
            }
            LspEvent::PollFailed {
                poller,
                order_id,
                error_code,
                message,
                timestamp,
            } => {
                warn!(
                    event_type = "poll_failed",
                    poller = %poller,
                    order_id = ?order_id,
                    error_code = %error_code,
                    message = %message,
                    timestamp = %timestamp,
                    "Poll failed, will try again on the next tick"
                );
            }
            LspEvent::ChannelsRefreshed {
                channels,
                dropped,
                timestamp,
            } => {
                if self.include_debug_events {
                    debug!(
                        event_type = "channels_refreshed",
                        lsp_channels = channels.len(),
                        dropped,
                        timestamp = %timestamp,
                        "Channel list refreshed"
                    );
                }
            }
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}
