use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::error::{AppError, LspResult};
use crate::events::{EventBus, LspEvent};
use crate::lsp::OrderClient;
use crate::types::{Order, OrderState};

pub const ORDER_POLLER_NAME: &str = "order_status";

/// Configuration for the order status poller
#[derive(Debug, Clone)]
pub struct OrderPollerConfig {
    /// Time between status fetches (default: 5 seconds)
    pub poll_interval: Duration,
}

impl Default for OrderPollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Publication gate of one polling run. `true` once the run is stopped; a
/// tick holds the lock from its cancellation check through its last publish.
type PublishGate = Arc<Mutex<bool>>;

struct ActivePoll {
    order_id: String,
    generation: u64,
    shutdown_tx: broadcast::Sender<()>,
    gate: PublishGate,
}

/// Polls the status of one order until it reaches a terminal state.
///
/// Ticks of a run are strictly sequential. Once [`OrderStatusPoller::stop`]
/// returns, the run publishes nothing more, even if a status fetch was in
/// flight when it was called.
pub struct OrderStatusPoller {
    client: Arc<OrderClient>,
    event_bus: Arc<EventBus>,
    config: OrderPollerConfig,
    current: Arc<RwLock<Option<Order>>>,
    active: Arc<Mutex<Option<ActivePoll>>>,
    generation: AtomicU64,
}

impl OrderStatusPoller {
    pub fn new(
        client: Arc<OrderClient>,
        event_bus: Arc<EventBus>,
        config: OrderPollerConfig,
    ) -> Self {
        Self {
            client,
            event_bus,
            config,
            current: Arc::new(RwLock::new(None)),
            active: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
        }
    }

    /// Latest known status of the polled order
    pub async fn current_order(&self) -> Option<Order> {
        self.current.read().await.clone()
    }

    pub async fn active_order_id(&self) -> Option<String> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|active| active.order_id.clone())
    }

    pub async fn is_running(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Start polling `order`. Returns `Ok(false)` without starting a second
    /// timer when the same order is already being polled, or when the order
    /// is already terminal. Polling a different order stops the previous run.
    #[instrument(skip(self, order), fields(order_id = %order.order_id))]
    pub async fn start(&self, order: Order) -> LspResult<bool> {
        if order.order_id.is_empty() {
            return Err(AppError::validation_error("Cannot poll an order without an id"));
        }

        if let Some(active_id) = self.active_order_id().await {
            if active_id == order.order_id {
                debug!("Order status poller already running");
                return Ok(false);
            }
            self.stop().await;
        }

        let terminal = order.is_terminal();
        *self.current.write().await = Some(order.clone());
        if terminal {
            debug!(state = %order.state, "Order already terminal, not polling");
            return Ok(false);
        }

        // Subscribed before spawning so a stop issued before the task first
        // runs is not lost. The task holds no sender: dropping the poller
        // closes the channel and ends the run.
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let gate: PublishGate = Arc::new(Mutex::new(false));
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let replaced = {
            let mut active = self.active.lock().await;
            // A concurrent start for the same order may have won the race
            if active
                .as_ref()
                .is_some_and(|existing| existing.order_id == order.order_id)
            {
                return Ok(false);
            }
            active.replace(ActivePoll {
                order_id: order.order_id.clone(),
                generation,
                shutdown_tx,
                gate: gate.clone(),
            })
        };
        if let Some(previous) = replaced {
            previous.shutdown().await;
        }

        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            state = %order.state,
            "Starting order status poller"
        );

        let run = PollRun {
            order_id: order.order_id,
            generation,
            client: self.client.clone(),
            event_bus: self.event_bus.clone(),
            current: self.current.clone(),
            active: Arc::downgrade(&self.active),
            gate,
        };
        let poll_interval = self.config.poll_interval;

        tokio::spawn(async move {
            let mut poll_timer = interval(poll_interval);
            poll_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        debug!(order_id = %run.order_id, "Order status poller received shutdown signal");
                        break;
                    }
                    _ = poll_timer.tick() => {
                        if run.tick().await.is_break() {
                            break;
                        }
                    }
                }
            }

            info!(order_id = %run.order_id, "Order status poller stopped");
        });

        Ok(true)
    }

    /// Stop polling. Safe to call any number of times.
    pub async fn stop(&self) {
        let previous = self.active.lock().await.take();
        if let Some(previous) = previous {
            previous.shutdown().await;
        }
    }
}

impl ActivePoll {
    /// Must not be called with the `active` slot locked: a tick holding the
    /// gate may be waiting for that slot.
    async fn shutdown(self) {
        *self.gate.lock().await = true;
        let _ = self.shutdown_tx.send(());
        debug!(order_id = %self.order_id, "Order status poller stop requested");
    }
}

/// State captured by the spawned polling task
struct PollRun {
    order_id: String,
    generation: u64,
    client: Arc<OrderClient>,
    event_bus: Arc<EventBus>,
    current: Arc<RwLock<Option<Order>>>,
    active: Weak<Mutex<Option<ActivePoll>>>,
    gate: PublishGate,
}

impl PollRun {
    async fn tick(&self) -> ControlFlow<()> {
        if *self.gate.lock().await || self.active.strong_count() == 0 {
            return ControlFlow::Break(());
        }

        let fetched = self.client.fetch_order(&self.order_id).await;

        let mut stopped = self.gate.lock().await;
        if *stopped {
            debug!(order_id = %self.order_id, "Discarding status fetched after stop");
            return ControlFlow::Break(());
        }

        let order = match fetched {
            Ok(order) => order,
            Err(e) => {
                warn!(
                    order_id = %self.order_id,
                    error_code = e.category.error_code(),
                    error = %e.message,
                    "Order status poll failed"
                );
                self.event_bus
                    .publish(LspEvent::PollFailed {
                        poller: ORDER_POLLER_NAME.to_string(),
                        order_id: Some(self.order_id.clone()),
                        error_code: e.category.error_code().to_string(),
                        message: e.message,
                        timestamp: Utc::now(),
                    })
                    .await;
                return ControlFlow::Continue(());
            }
        };

        let previous_state = {
            let mut current = self.current.write().await;
            let previous_state = current.as_ref().map(|o| o.state).unwrap_or(order.state);
            if !previous_state.can_transition_to(order.state) {
                warn!(
                    order_id = %self.order_id,
                    previous_state = %previous_state,
                    reported_state = %order.state,
                    "Ignoring status update after terminal state"
                );
                return ControlFlow::Break(());
            }
            *current = Some(order.clone());
            previous_state
        };

        if previous_state != order.state {
            info!(
                order_id = %self.order_id,
                previous_state = %previous_state,
                state = %order.state,
                "Order state changed"
            );
        }

        self.event_bus
            .publish(LspEvent::OrderStatusUpdated {
                order: order.clone(),
                previous_state,
                timestamp: Utc::now(),
            })
            .await;

        if !order.is_terminal() {
            return ControlFlow::Continue(());
        }

        let terminal_event = if order.state == OrderState::Completed {
            LspEvent::OrderCompleted {
                order,
                timestamp: Utc::now(),
            }
        } else {
            LspEvent::OrderFailed {
                order,
                timestamp: Utc::now(),
            }
        };
        self.event_bus.publish(terminal_event).await;

        // Self-stop: only clear the slot if it still belongs to this run
        *stopped = true;
        if let Some(active) = self.active.upgrade() {
            let mut active = active.lock().await;
            if active.as_ref().is_some_and(|a| a.generation == self.generation) {
                *active = None;
            }
        }
        ControlFlow::Break(())
    }
}
