use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{AppError, LspResult};
use crate::events::{EventBus, LspEvent};
use crate::lsp::adapter::parse_channel_record;
use crate::lsp::shapes;
use crate::lsp::{LspCache, LspTransport};
use crate::types::{pubkey_from_uri, ChannelRecord};

pub const CHANNEL_POLLER_NAME: &str = "channel_list";

/// Where the list of open channels comes from
#[async_trait]
pub trait ChannelSource: Send + Sync {
    async fn fetch_channels(&self) -> LspResult<Value>;
}

/// Channel list served by the node backend's refresh endpoint
pub struct TransportChannelSource {
    transport: Arc<dyn LspTransport>,
    path: String,
}

impl TransportChannelSource {
    pub fn new(transport: Arc<dyn LspTransport>, path: impl Into<String>) -> Self {
        Self {
            transport,
            path: path.into(),
        }
    }
}

#[async_trait]
impl ChannelSource for TransportChannelSource {
    async fn fetch_channels(&self) -> LspResult<Value> {
        self.transport.post_json(&self.path, &json!({})).await
    }
}

#[derive(Debug, Clone)]
pub struct ChannelPollerConfig {
    /// Time between channel list refreshes (default: 5 seconds)
    pub poll_interval: Duration,
    /// Connection URIs or bare keys of LSP nodes known up front
    pub lsp_uris: Vec<String>,
}

impl Default for ChannelPollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            lsp_uris: Vec::new(),
        }
    }
}

/// `true` once a polling run is stopped. Refreshes started by that run hold
/// the lock from their cancellation check through their last publish.
type RunGate = Arc<Mutex<bool>>;

struct ActiveRun {
    shutdown_tx: broadcast::Sender<()>,
    gate: RunGate,
}

/// Periodically refreshes the open channel list and keeps only channels
/// opened with a known LSP node. At most one fetch is outstanding at a time.
pub struct ChannelListPoller {
    source: Arc<dyn ChannelSource>,
    cache: Arc<LspCache>,
    event_bus: Arc<EventBus>,
    config: ChannelPollerConfig,
    in_flight: AtomicBool,
    latest: RwLock<Vec<ChannelRecord>>,
    active: Mutex<Option<ActiveRun>>,
}

/// Clears the in-flight flag when a refresh finishes, however it finishes
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ChannelListPoller {
    pub fn new(
        source: Arc<dyn ChannelSource>,
        cache: Arc<LspCache>,
        event_bus: Arc<EventBus>,
        config: ChannelPollerConfig,
    ) -> Self {
        Self {
            source,
            cache,
            event_bus,
            config,
            in_flight: AtomicBool::new(false),
            latest: RwLock::new(Vec::new()),
            active: Mutex::new(None),
        }
    }

    /// Channels kept by the last successful refresh
    pub async fn latest(&self) -> Vec<ChannelRecord> {
        self.latest.read().await.clone()
    }

    /// Keys every channel is matched against: configured URIs plus every LSP
    /// key seen in capability documents so far
    pub async fn known_lsp_pubkeys(&self) -> BTreeSet<String> {
        let mut keys = self.cache.lsp_pubkeys().await;
        keys.extend(
            self.config
                .lsp_uris
                .iter()
                .filter_map(|uri| pubkey_from_uri(uri)),
        );
        keys
    }

    /// Fetch the channel list once. Returns `Ok(None)` without fetching when
    /// another refresh is still outstanding.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> LspResult<Option<Vec<ChannelRecord>>> {
        self.refresh_gated(None).await
    }

    /// Refresh on behalf of a polling run. Results and failures that arrive
    /// after the run was stopped are dropped.
    async fn refresh_for_run(&self, gate: &RunGate) {
        if *gate.lock().await {
            return;
        }
        if let Err(e) = self.refresh_gated(Some(gate)).await {
            let stopped = gate.lock().await;
            if !*stopped {
                self.report_failure(&e).await;
            }
        }
    }

    async fn refresh_gated(
        &self,
        gate: Option<&RunGate>,
    ) -> LspResult<Option<Vec<ChannelRecord>>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Channel refresh already in flight, skipping");
            return Ok(None);
        }
        let _guard = InFlightGuard(&self.in_flight);

        let fetched = self.source.fetch_channels().await;

        let stopped = match gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };
        if stopped.as_ref().is_some_and(|stopped| **stopped) {
            debug!("Discarding channel list fetched after stop");
            return Ok(None);
        }

        let payload = fetched?;
        let normalized = shapes::normalize(&payload);
        let known = self.known_lsp_pubkeys().await;

        let parsed: Vec<ChannelRecord> = normalized
            .items
            .iter()
            .filter_map(parse_channel_record)
            .collect();
        let total = parsed.len();
        let channels: Vec<ChannelRecord> = parsed
            .into_iter()
            .filter(|channel| is_lsp_channel(channel, &known))
            .collect();
        let dropped = total - channels.len();

        debug!(
            shape = normalized.shape,
            total,
            kept = channels.len(),
            known_lsp_keys = known.len(),
            "Channel list refreshed"
        );

        *self.latest.write().await = channels.clone();

        self.event_bus
            .publish(LspEvent::ChannelsRefreshed {
                channels: channels.clone(),
                dropped,
                timestamp: Utc::now(),
            })
            .await;

        Ok(Some(channels))
    }

    pub async fn is_running(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Start refreshing on a fixed interval. Returns `false` if already
    /// running.
    pub async fn start(self: &Arc<Self>) -> bool {
        let mut active = self.active.lock().await;
        if active.is_some() {
            debug!("Channel list poller already running");
            return false;
        }
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let gate: RunGate = Arc::new(Mutex::new(false));
        *active = Some(ActiveRun {
            shutdown_tx,
            gate: gate.clone(),
        });

        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            configured_lsp_uris = self.config.lsp_uris.len(),
            "Starting channel list poller"
        );

        let poller = Arc::downgrade(self);
        let poll_interval = self.config.poll_interval;

        tokio::spawn(async move {
            let mut refresh_timer = interval(poll_interval);
            refresh_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        debug!("Channel list poller received shutdown signal");
                        break;
                    }
                    _ = refresh_timer.tick() => {
                        let Some(poller) = poller.upgrade() else {
                            break;
                        };
                        // Ticks never wait on a slow fetch; the in-flight flag drops overlaps
                        let gate = gate.clone();
                        tokio::spawn(async move {
                            poller.refresh_for_run(&gate).await;
                        });
                    }
                }
            }

            info!("Channel list poller stopped");
        });

        true
    }

    /// Stop the interval. Safe to call any number of times. A fetch already
    /// in flight completes, but its result is neither stored nor published.
    pub async fn stop(&self) {
        let previous = self.active.lock().await.take();
        if let Some(previous) = previous {
            *previous.gate.lock().await = true;
            let _ = previous.shutdown_tx.send(());
        }
    }

    async fn report_failure(&self, e: &AppError) {
        if e.category.is_retryable() {
            warn!(error_code = e.category.error_code(), error = %e.message, "Channel refresh failed");
        } else {
            error!(error_code = e.category.error_code(), error = %e.message, "Channel refresh failed");
        }
        self.event_bus
            .publish(LspEvent::PollFailed {
                poller: CHANNEL_POLLER_NAME.to_string(),
                order_id: None,
                error_code: e.category.error_code().to_string(),
                message: e.message.clone(),
                timestamp: Utc::now(),
            })
            .await;
    }
}

fn is_lsp_channel(channel: &ChannelRecord, known: &BTreeSet<String>) -> bool {
    known
        .iter()
        .any(|key| !key.is_empty() && channel.remote_pubkey.starts_with(key.as_str()))
}
