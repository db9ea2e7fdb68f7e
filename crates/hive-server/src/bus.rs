//! Event bus — best-effort, at-most-once delivery of coordinator
//! notifications to subscribed sessions.
//!
//! Each subscriber owns a dedicated bounded queue (capacity 50). Direct
//! sends and broadcast snapshots take the subscriber table's read lock;
//! subscribe/unsubscribe/stop take the write side. Broadcasts are funneled
//! through one bounded relay queue (capacity 100) drained by a single
//! background worker, which decouples producers from fan-out cost: the
//! observable broadcast order is relay entry order, not real-time issue
//! order.
//!
//! Nothing here blocks on a slow subscriber. A full queue means the event
//! is dropped, counted, and logged — never retried.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use hive_core::{CoreEvent, HiveError, SessionId};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Capacity of each subscriber's dedicated event queue.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 50;

/// Capacity of the internal broadcast relay queue.
pub const RELAY_QUEUE_CAPACITY: usize = 100;

/// Delivery failure for a direct send.
#[derive(Debug, Error)]
pub enum BusError {
    /// No queue is mapped for this session.
    #[error("plugin not found or not subscribed: {0}")]
    NotSubscribed(SessionId),

    /// The session's queue is full; the event was dropped.
    #[error("event queue full for {0}")]
    ChannelFull(SessionId),
}

impl From<BusError> for HiveError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::NotSubscribed(id) => Self::NotSubscribed(id),
            BusError::ChannelFull(id) => Self::ChannelFull(id),
        }
    }
}

/// In-process publish/subscribe hub for coordinator → plugin notifications.
pub struct EventBus {
    subscribers: RwLock<HashMap<SessionId, mpsc::Sender<CoreEvent>>>,
    relay_tx: Mutex<Option<mpsc::Sender<CoreEvent>>>,
    relay_rx: Mutex<Option<mpsc::Receiver<CoreEvent>>>,
    relay_dropped: AtomicU64,
}

impl EventBus {
    /// Create a bus. The relay worker is not running until [`start`] is
    /// called.
    ///
    /// [`start`]: EventBus::start
    #[must_use]
    pub fn new() -> Self {
        let (relay_tx, relay_rx) = mpsc::channel(RELAY_QUEUE_CAPACITY);
        Self {
            subscribers: RwLock::new(HashMap::new()),
            relay_tx: Mutex::new(Some(relay_tx)),
            relay_rx: Mutex::new(Some(relay_rx)),
            relay_dropped: AtomicU64::new(0),
        }
    }

    /// Spawn the single relay worker that drains the broadcast queue.
    ///
    /// Call at most once. The worker exits when [`stop`] closes the relay,
    /// after draining whatever was already enqueued.
    ///
    /// [`stop`]: EventBus::stop
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let Some(mut rx) = self.relay_rx.lock().take() else {
            warn!("event bus relay worker already started");
            return tokio::spawn(async {});
        };
        let bus = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                bus.fan_out(&event).await;
            }
            debug!("event bus relay closed");
        })
    }

    /// Create (or atomically replace) the queue for a session.
    ///
    /// Replacing happens entirely under the exclusive lock: the previous
    /// sender is dropped, so the abandoned queue closes and its reader sees
    /// "session terminated" instead of silently starving.
    pub async fn subscribe(&self, id: &SessionId) -> mpsc::Receiver<CoreEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let mut subs = self.subscribers.write().await;
        if subs.insert(id.clone(), tx).is_some() {
            debug!(session_id = %id, "subscription replaced; previous queue closed");
        } else {
            debug!(session_id = %id, "plugin subscribed to events");
        }
        rx
    }

    /// Close and remove a session's queue.
    pub async fn unsubscribe(&self, id: &SessionId) {
        let mut subs = self.subscribers.write().await;
        if subs.remove(id).is_some() {
            debug!(session_id = %id, "plugin unsubscribed from events");
        }
    }

    /// Enqueue an event for one session without blocking.
    ///
    /// Success means enqueued, not delivered or acknowledged.
    pub async fn send_direct(&self, id: &SessionId, event: CoreEvent) -> Result<(), BusError> {
        let subs = self.subscribers.read().await;
        let Some(tx) = subs.get(id) else {
            return Err(BusError::NotSubscribed(id.clone()));
        };
        match tx.try_send(event) {
            Ok(()) => {
                debug!(session_id = %id, "event sent directly");
                Ok(())
            }
            Err(TrySendError::Full(event)) => {
                warn!(session_id = %id, event_type = %event.event_type, "event queue full, dropping");
                Err(BusError::ChannelFull(id.clone()))
            }
            Err(TrySendError::Closed(_)) => Err(BusError::NotSubscribed(id.clone())),
        }
    }

    /// Enqueue a broadcast onto the relay.
    ///
    /// The relay worker fans it out to every session subscribed when the
    /// snapshot is taken. Relay overflow (or a stopped bus) drops the event,
    /// increments [`relay_dropped`](EventBus::relay_dropped), and logs.
    pub fn broadcast(&self, event: CoreEvent) {
        let guard = self.relay_tx.lock();
        let Some(tx) = guard.as_ref() else {
            let _ = self.relay_dropped.fetch_add(1, Ordering::Relaxed);
            warn!(event_type = %event.event_type, "event bus stopped, dropping broadcast");
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event) | TrySendError::Closed(event)) => {
                let _ = self.relay_dropped.fetch_add(1, Ordering::Relaxed);
                warn!(event_type = %event.event_type, "broadcast relay full, dropping event");
            }
        }
    }

    /// Deliver one broadcast to a point-in-time snapshot of subscribers.
    ///
    /// Per-subscriber failures are logged individually and never abort the
    /// rest; partial delivery is the normal case.
    async fn fan_out(&self, event: &CoreEvent) {
        let snapshot: Vec<(SessionId, mpsc::Sender<CoreEvent>)> = {
            let subs = self.subscribers.read().await;
            subs.iter().map(|(id, tx)| (id.clone(), tx.clone())).collect()
        };

        let recipients = snapshot.len();
        let mut delivered = 0usize;
        for (id, tx) in snapshot {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(session_id = %id, event_type = %event.event_type, "broadcast event dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(session_id = %id, "broadcast skipped closed queue");
                }
            }
        }
        debug!(event_type = %event.event_type, delivered, recipients, "broadcast sent");
    }

    /// Close every remaining subscriber queue and the relay.
    ///
    /// Must be invoked at most once; concurrent subscribe/stop is excluded
    /// by the caller's discipline. Broadcasts already on the relay are still
    /// drained by the worker before it exits.
    pub async fn stop(&self) {
        let _ = self.relay_tx.lock().take();
        let mut subs = self.subscribers.write().await;
        subs.clear();
        debug!("event bus stopped");
    }

    /// Broadcasts dropped because the relay was full or stopped.
    #[must_use]
    pub fn relay_dropped(&self) -> u64 {
        self.relay_dropped.load(Ordering::Relaxed)
    }

    /// Number of currently subscribed sessions.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use hive_core::EventType;

    use super::*;

    fn event(data: &str) -> CoreEvent {
        CoreEvent::new(EventType::StatusQuery, data)
    }

    #[tokio::test]
    async fn send_direct_to_unsubscribed_fails() {
        let bus = EventBus::new();
        let err = bus
            .send_direct(&SessionId::from("inst-1"), event("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::NotSubscribed(_)));
    }

    #[tokio::test]
    async fn send_direct_after_unsubscribe_fails_again() {
        let bus = EventBus::new();
        let id = SessionId::from("inst-1");
        let _rx = bus.subscribe(&id).await;
        bus.send_direct(&id, event("x")).await.unwrap();
        bus.unsubscribe(&id).await;
        let err = bus.send_direct(&id, event("y")).await.unwrap_err();
        assert!(matches!(err, BusError::NotSubscribed(_)));
    }

    #[tokio::test]
    async fn queue_capacity_is_fifty() {
        let bus = EventBus::new();
        let id = SessionId::from("inst-1");
        let _rx = bus.subscribe(&id).await;

        for i in 0..SUBSCRIBER_QUEUE_CAPACITY {
            bus.send_direct(&id, event(&format!("{i}"))).await.unwrap();
        }
        let err = bus.send_direct(&id, event("overflow")).await.unwrap_err();
        assert!(matches!(err, BusError::ChannelFull(_)));
    }

    #[tokio::test]
    async fn direct_events_arrive_in_order() {
        let bus = EventBus::new();
        let id = SessionId::from("inst-1");
        let mut rx = bus.subscribe(&id).await;
        for i in 0..5 {
            bus.send_direct(&id, event(&format!("{i}"))).await.unwrap();
        }
        for i in 0..5 {
            assert_eq!(rx.recv().await.unwrap().data, format!("{i}"));
        }
    }

    #[tokio::test]
    async fn resubscribe_closes_previous_queue() {
        let bus = EventBus::new();
        let id = SessionId::from("inst-1");
        let mut old_rx = bus.subscribe(&id).await;
        let mut new_rx = bus.subscribe(&id).await;

        // Old queue is closed, not silently leaked.
        assert!(old_rx.recv().await.is_none());
        assert_eq!(bus.subscriber_count().await, 1);

        bus.send_direct(&id, event("fresh")).await.unwrap();
        assert_eq!(new_rx.recv().await.unwrap().data, "fresh");
    }

    #[tokio::test]
    async fn broadcast_reaches_all_subscribed_at_call_time() {
        let bus = Arc::new(EventBus::new());
        let _worker = bus.start();

        let mut rx_a = bus.subscribe(&SessionId::from("inst-a")).await;
        let mut rx_b = bus.subscribe(&SessionId::from("inst-b")).await;

        bus.broadcast(event("hello"));

        assert_eq!(rx_a.recv().await.unwrap().data, "hello");
        assert_eq!(rx_b.recv().await.unwrap().data, "hello");

        // A session subscribed after the fan-out completed sees nothing.
        let mut rx_late = bus.subscribe(&SessionId::from("inst-late")).await;
        assert!(rx_late.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcasts_preserve_relay_entry_order() {
        let bus = Arc::new(EventBus::new());
        let _worker = bus.start();
        let mut rx = bus.subscribe(&SessionId::from("inst-1")).await;

        for i in 0..10 {
            bus.broadcast(event(&format!("{i}")));
        }
        for i in 0..10 {
            assert_eq!(rx.recv().await.unwrap().data, format!("{i}"));
        }
    }

    #[tokio::test]
    async fn broadcast_skips_full_queue_but_delivers_to_others() {
        let bus = Arc::new(EventBus::new());
        let _worker = bus.start();

        let slow = SessionId::from("inst-slow");
        let _slow_rx = bus.subscribe(&slow).await;
        for _ in 0..SUBSCRIBER_QUEUE_CAPACITY {
            bus.send_direct(&slow, event("fill")).await.unwrap();
        }

        let mut healthy_rx = bus.subscribe(&SessionId::from("inst-healthy")).await;
        bus.broadcast(event("news"));
        assert_eq!(healthy_rx.recv().await.unwrap().data, "news");
    }

    #[tokio::test]
    async fn relay_overflow_drops_with_counter() {
        // Worker deliberately not started, so the relay backs up.
        let bus = EventBus::new();
        for i in 0..RELAY_QUEUE_CAPACITY {
            bus.broadcast(event(&format!("{i}")));
        }
        assert_eq!(bus.relay_dropped(), 0);
        bus.broadcast(event("overflow"));
        assert_eq!(bus.relay_dropped(), 1);
    }

    #[tokio::test]
    async fn stop_closes_subscriber_queues_and_relay() {
        let bus = Arc::new(EventBus::new());
        let worker = bus.start();
        let id = SessionId::from("inst-1");
        let mut rx = bus.subscribe(&id).await;

        bus.stop().await;

        assert!(rx.recv().await.is_none());
        let err = bus.send_direct(&id, event("x")).await.unwrap_err();
        assert!(matches!(err, BusError::NotSubscribed(_)));

        // Worker exits once the relay sender is gone.
        worker.await.unwrap();

        bus.broadcast(event("after stop"));
        assert_eq!(bus.relay_dropped(), 1);
    }

    #[tokio::test]
    async fn bus_error_converts_to_hive_error() {
        let id = SessionId::from("inst-1");
        let err: HiveError = BusError::ChannelFull(id.clone()).into();
        assert_eq!(err.code(), "CHANNEL_FULL");
        let err: HiveError = BusError::NotSubscribed(id).into();
        assert_eq!(err.code(), "NOT_SUBSCRIBED");
    }
}
