use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use linkmap_pipeline::ProbeNotifier;
use linkmap_store::{LinkStore, ProbeEvent};

use crate::wire::ProbeMessage;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

struct Sink {
    id: Uuid,
    tx: mpsc::UnboundedSender<ProbeMessage>,
}

#[derive(Default)]
struct SinkMap {
    by_user: HashMap<i64, Vec<Sink>>,
}

/// The set of active probe subscriptions, per user. Writes to any one
/// sink are serialized by its channel; pushes snapshot the sink list so
/// a slow consumer blocks only itself.
pub struct ProbeHub {
    store: LinkStore,
    sinks: Mutex<SinkMap>,
    heartbeat_interval: Duration,
}

impl ProbeHub {
    pub fn new(store: LinkStore) -> Self {
        Self {
            store,
            sinks: Mutex::new(SinkMap::default()),
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }

    /// Shorter heartbeat for tests.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Register a new subscription for a user. Any probe events still
    /// `pending` are replayed onto the new sink immediately, in creation
    /// order, and marked `sent`.
    pub async fn subscribe(self: &Arc<Self>, user_id: i64) -> Result<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink_id = Uuid::new_v4();

        {
            let mut map = self.sinks.lock().expect("hub mutex");
            map.by_user.entry(user_id).or_default().push(Sink {
                id: sink_id,
                tx: tx.clone(),
            });
        }
        info!(user_id, sink = %sink_id, "probe subscribed");

        // Pending replay. Failures here only mean the sink closed already.
        let pending = self.store.list_pending_probe_events(user_id).await?;
        for event in &pending {
            if tx.send(ProbeMessage::scrape_request(event)).is_ok() {
                self.store.mark_probe_event_sent(event.id).await?;
            }
        }
        if !pending.is_empty() {
            info!(user_id, replayed = pending.len(), "pending probe events replayed");
        }

        // Heartbeat until the receiver goes away.
        let heartbeat_tx = tx.clone();
        let interval = self.heartbeat_interval;
        let heartbeat = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick is immediate; skip it
            loop {
                ticker.tick().await;
                if heartbeat_tx.send(ProbeMessage::ping()).is_err() {
                    break;
                }
            }
        });

        Ok(Subscription {
            rx,
            _guard: SubscriptionGuard {
                hub: self.clone(),
                user_id,
                sink_id,
                heartbeat,
            },
        })
    }

    /// Broadcast a message to every active sink of a user. No
    /// acknowledgement and no retries here — retransmission is the
    /// pending-replay on reconnect.
    pub fn push(&self, user_id: i64, message: ProbeMessage) -> usize {
        let senders: Vec<mpsc::UnboundedSender<ProbeMessage>> = {
            let map = self.sinks.lock().expect("hub mutex");
            map.by_user
                .get(&user_id)
                .map(|sinks| sinks.iter().map(|s| s.tx.clone()).collect())
                .unwrap_or_default()
        };

        let mut delivered = 0;
        for tx in senders {
            if tx.send(message.clone()).is_ok() {
                delivered += 1;
            }
        }
        debug!(user_id, delivered, event = message.event_type, "probe push");
        delivered
    }

    /// Number of live subscriptions for a user.
    pub fn subscriber_count(&self, user_id: i64) -> usize {
        let map = self.sinks.lock().expect("hub mutex");
        map.by_user.get(&user_id).map(|s| s.len()).unwrap_or(0)
    }

    fn remove_sink(&self, user_id: i64, sink_id: Uuid) {
        let mut map = self.sinks.lock().expect("hub mutex");
        if let Some(sinks) = map.by_user.get_mut(&user_id) {
            sinks.retain(|s| s.id != sink_id);
            if sinks.is_empty() {
                map.by_user.remove(&user_id);
            }
        }
        info!(user_id, sink = %sink_id, "probe unsubscribed");
    }
}

/// A live subscription. Dropping it unsubscribes the sink and stops its
/// heartbeat.
pub struct Subscription {
    pub rx: mpsc::UnboundedReceiver<ProbeMessage>,
    _guard: SubscriptionGuard,
}

struct SubscriptionGuard {
    hub: Arc<ProbeHub>,
    user_id: i64,
    sink_id: Uuid,
    heartbeat: tokio::task::JoinHandle<()>,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.heartbeat.abort();
        self.hub.remove_sink(self.user_id, self.sink_id);
    }
}

#[async_trait]
impl ProbeNotifier for ProbeHub {
    async fn push_scrape_request(&self, event: &ProbeEvent) -> Result<()> {
        let delivered = self.push(event.user_id, ProbeMessage::scrape_request(event));
        if delivered > 0 {
            // Delivered live; reconnect replay must not resend it.
            self.store.mark_probe_event_sent(event.id).await?;
        } else {
            warn!(
                event_id = %event.id,
                user_id = event.user_id,
                "no active probe subscription, event stays pending"
            );
        }
        Ok(())
    }
}
