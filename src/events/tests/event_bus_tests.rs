#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::time::{timeout, Duration};

    use crate::events::*;
    use crate::types::{Order, OrderState};

    struct TestEventHandler {
        name: String,
        call_count: Arc<AtomicUsize>,
        should_fail: bool,
        critical: bool,
    }

    impl TestEventHandler {
        fn new(name: &str, call_count: Arc<AtomicUsize>) -> Self {
            Self {
                name: name.to_string(),
                call_count,
                should_fail: false,
                critical: false,
            }
        }
    }

    #[async_trait]
    impl EventHandler for TestEventHandler {
        async fn handle(&self, _event: LspEvent) -> anyhow::Result<()> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if self.should_fail {
                anyhow::bail!("Test handler failure");
            }
            Ok(())
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn is_critical(&self) -> bool {
            self.critical
        }
    }

    fn order(state: OrderState) -> Order {
        Order {
            order_id: "order-1".to_string(),
            state,
            invoice: Some("lnbc10u1test".to_string()),
            total_sats: Some(1_000),
            channel_info: None,
        }
    }

    #[tokio::test]
    async fn test_event_bus_creation() {
        let event_bus = EventBus::new(100);
        let stats = event_bus.stats().await;
        assert_eq!(stats.capacity, 100);
        assert_eq!(stats.handler_count, 0);
        assert_eq!(stats.critical_handler_count, 0);
        assert_eq!(stats.subscriber_count, 0);
    }

    #[tokio::test]
    async fn test_handler_registration() {
        let event_bus = EventBus::new(100);
        let handler = Arc::new(TestEventHandler::new(
            "test_handler",
            Arc::new(AtomicUsize::new(0)),
        ));

        event_bus.register_handler(handler).await;

        assert_eq!(event_bus.handler_count().await, 1);
    }

    #[tokio::test]
    async fn test_critical_handler_runs_before_publish_returns() {
        let event_bus = EventBus::new(100);
        let call_count = Arc::new(AtomicUsize::new(0));

        let mut handler = TestEventHandler::new("critical", call_count.clone());
        handler.critical = true;
        event_bus.register_handler(Arc::new(handler)).await;

        event_bus
            .publish(LspEvent::OrderCreated {
                order: order(OrderState::Created),
                channel_size_sats: 500_000,
                timestamp: Utc::now(),
            })
            .await;

        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_failure_doesnt_affect_others() {
        let event_bus = EventBus::new(100);
        let call_count1 = Arc::new(AtomicUsize::new(0));
        let call_count2 = Arc::new(AtomicUsize::new(0));

        let mut failing_handler = TestEventHandler::new("failing_handler", call_count1.clone());
        failing_handler.should_fail = true;
        let working_handler = TestEventHandler::new("working_handler", call_count2.clone());

        event_bus.register_handler(Arc::new(failing_handler)).await;
        event_bus.register_handler(Arc::new(working_handler)).await;

        event_bus
            .publish(LspEvent::OrderFailed {
                order: order(OrderState::Failed),
                timestamp: Utc::now(),
            })
            .await;

        // Give some time for the background tasks to complete
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(call_count1.load(Ordering::SeqCst), 1);
        assert_eq!(call_count2.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_broadcast_subscription() {
        let event_bus = EventBus::new(100);
        let mut receiver = event_bus.subscribe();

        let event = LspEvent::OrderStatusUpdated {
            order: order(OrderState::Paid),
            previous_state: OrderState::PaymentPending,
            timestamp: Utc::now(),
        };
        event_bus.publish(event.clone()).await;

        let received_event = match timeout(Duration::from_millis(100), receiver.recv()).await {
            Ok(Ok(event)) => event,
            Ok(Err(e)) => panic!("Failed to receive event: {}", e),
            Err(_) => panic!("Timeout waiting for event"),
        };

        assert_eq!(received_event, event);
    }

    #[test]
    fn test_event_metadata() {
        let event = LspEvent::OrderCompleted {
            order: order(OrderState::Completed),
            timestamp: Utc::now(),
        };

        assert_eq!(event.event_type(), "order_completed");
        assert_eq!(event.order_id(), Some("order-1"));
        assert!(!event.event_id().is_empty());

        let poll_failed = LspEvent::PollFailed {
            poller: "channel_list".to_string(),
            order_id: None,
            error_code: "TRANSPORT_ERROR".to_string(),
            message: "HTTP 502".to_string(),
            timestamp: Utc::now(),
        };
        assert_eq!(poll_failed.order_id(), None);
        assert!(poll_failed.order().is_none());
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = LspEvent::ChannelsRefreshed {
            channels: Vec::new(),
            dropped: 2,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "channels_refreshed");
        assert_eq!(json["dropped"], 2);
    }
}
