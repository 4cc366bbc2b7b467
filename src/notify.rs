//!
//! beacon change notifier
//! ----------------------
//! In-process fanout of mutation events to currently-connected observers.
//! The notifier is an explicit registry created at startup and passed by
//! reference to whatever publishes or manages subscriptions; each
//! subscriber is a bounded channel whose receive end is owned by the
//! connection handler that registered it.
//!
//! Delivery is fire-and-forget and best-effort per subscriber: publish
//! never awaits a consumer, a full queue drops the event for that
//! subscriber only (drop-newest), and a closed channel unregisters the
//! subscriber. There is no replay: a subscriber only observes events
//! published while it is registered.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Per-subscriber queue capacity when Settings does not override it.
pub const DEFAULT_SUBSCRIBER_QUEUE: usize = 64;

/// One published event as delivered to subscribers. Built fresh per
/// publish call and never retained.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Event {
    pub event: String,
    pub data: Value,
}

/// The receive end of one registered subscriber. Owned by the connection
/// handler; the registry keeps only the matching sender.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Event>,
}

impl Subscription {
    pub fn id(&self) -> u64 { self.id }

    pub async fn recv(&mut self) -> Option<Event> { self.rx.recv().await }

    pub fn try_recv(&mut self) -> Option<Event> { self.rx.try_recv().ok() }
}

pub struct ChangeNotifier {
    subscribers: Mutex<HashMap<u64, mpsc::Sender<Event>>>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

impl ChangeNotifier {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register a new subscriber and hand back its receive end.
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        self.subscribers.lock().insert(id, tx);
        debug!(target: "beacon::notify", "subscribe id={id}");
        Subscription { id, rx }
    }

    /// Remove a subscriber. Idempotent: unknown or already-removed ids are
    /// a no-op.
    pub fn unsubscribe(&self, id: u64) {
        if self.subscribers.lock().remove(&id).is_some() {
            debug!(target: "beacon::notify", "unsubscribe id={id}");
        }
    }

    pub fn subscriber_count(&self) -> usize { self.subscribers.lock().len() }

    /// Deliver `{event, data}` to every subscriber registered at the moment
    /// of the call; returns how many received it. Sends are non-blocking
    /// try_sends performed under the registry lock, so a completed
    /// unsubscribe is never delivered to afterwards and a slow consumer
    /// never gates the rest. A full queue loses this event for that
    /// subscriber only; a closed channel is pruned.
    pub fn publish(&self, event: &str, data: Value) -> usize {
        let evt = Event { event: event.to_string(), data };
        let mut delivered = 0usize;
        let mut dropped = 0usize;
        let mut closed: Vec<u64> = Vec::new();

        let mut subs = self.subscribers.lock();
        for (id, tx) in subs.iter() {
            match tx.try_send(evt.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    dropped += 1;
                    warn!(target: "beacon::notify", "subscriber {id} queue full, dropping '{}'", evt.event);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
            }
        }
        for id in closed {
            subs.remove(&id);
            debug!(target: "beacon::notify", "pruned closed subscriber {id}");
        }
        drop(subs);

        debug!(target: "beacon::notify", "publish '{event}' delivered={delivered} dropped={dropped}");
        delivered
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self { Self::new(DEFAULT_SUBSCRIBER_QUEUE) }
}
