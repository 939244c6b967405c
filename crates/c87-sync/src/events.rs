//! In-process event bus
//!
//! Typed publish/subscribe keyed by [`Topic`]. Dispatch is synchronous:
//! every current subscriber of a topic runs, in subscription order, before
//! [`EventBus::publish`] returns. A subscriber that errors or panics is
//! logged and skipped; the publisher never sees it.
//!
//! Async consumers that do not need in-order synchronous delivery can
//! [`tap`](EventBus::tap) the bus for a broadcast receiver of every event.

use crate::mutation::MutationKind;
use crate::notifier::Notification;
use c87_api_client::{TokenAmount, VotePolarity};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Event names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    BalanceChanged,
    RewardPending,
    Voted,
    Unlocked,
    Boosted,
    MutationFailed,
    TagFilterChanged,
    WatchlistChanged,
    WatchlistSaved,
    FeedUpdated,
    Notification,
}

/// Events exchanged between sync components
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    /// Session balance changed (optimistic patch, reconciliation or seed)
    BalanceChanged { balance: TokenAmount },
    /// Transient reward indicator while a vote is in flight
    RewardPending { target: u64, estimate: TokenAmount },
    /// Vote confirmed with the server-reported reward
    Voted {
        target: u64,
        polarity: VotePolarity,
        reward: TokenAmount,
    },
    /// Content became readable
    Unlocked { target: u64 },
    Boosted { target: Option<u64> },
    /// Mutation rolled back
    MutationFailed {
        kind: MutationKind,
        target: Option<u64>,
        reason: String,
    },
    /// Active trend tag selection changed
    TagFilterChanged { tag: Option<String> },
    /// Local watchlist changed (optimistic edit, reconciliation or rollback)
    WatchlistChanged { coins: Vec<String> },
    /// Server accepted a watchlist edit
    WatchlistSaved { coins: Vec<String> },
    /// Feed view changed
    FeedUpdated { visible: usize, reached_end: bool },
    Notification(Notification),
}

impl SyncEvent {
    pub fn topic(&self) -> Topic {
        match self {
            SyncEvent::BalanceChanged { .. } => Topic::BalanceChanged,
            SyncEvent::RewardPending { .. } => Topic::RewardPending,
            SyncEvent::Voted { .. } => Topic::Voted,
            SyncEvent::Unlocked { .. } => Topic::Unlocked,
            SyncEvent::Boosted { .. } => Topic::Boosted,
            SyncEvent::MutationFailed { .. } => Topic::MutationFailed,
            SyncEvent::TagFilterChanged { .. } => Topic::TagFilterChanged,
            SyncEvent::WatchlistChanged { .. } => Topic::WatchlistChanged,
            SyncEvent::WatchlistSaved { .. } => Topic::WatchlistSaved,
            SyncEvent::FeedUpdated { .. } => Topic::FeedUpdated,
            SyncEvent::Notification(_) => Topic::Notification,
        }
    }
}

/// Error a subscriber may report; it is logged and otherwise ignored
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

type Handler = Arc<dyn Fn(&SyncEvent) -> Result<(), HandlerError> + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    topic: Topic,
    handler: Handler,
}

struct BusInner {
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
    tap_tx: broadcast::Sender<SyncEvent>,
}

/// Cloneable handle to a shared bus
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tap_tx, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(BusInner {
                subscriptions: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                tap_tx,
            }),
        }
    }

    fn subscriptions(&self) -> MutexGuard<'_, Vec<Subscription>> {
        // Handlers never run under this lock, so poisoning cannot leave it inconsistent
        self.inner
            .subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a handler for one topic
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&SyncEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions().push(Subscription {
            id,
            topic,
            handler: Arc::new(handler),
        });
        debug!("Subscribed {:?} to {:?}", id, topic);
        id
    }

    /// Remove a handler; returns false if it was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscriptions();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.subscriptions().iter().filter(|s| s.topic == topic).count()
    }

    /// Receiver of every published event, for async consumers
    pub fn tap(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.tap_tx.subscribe()
    }

    /// Deliver `event` to every current subscriber of its topic.
    ///
    /// Returns the number of subscribers that handled it without error.
    pub fn publish(&self, event: SyncEvent) -> usize {
        let topic = event.topic();

        // Snapshot so handlers can subscribe or publish re-entrantly
        let handlers: Vec<(SubscriptionId, Handler)> = self
            .subscriptions()
            .iter()
            .filter(|s| s.topic == topic)
            .map(|s| (s.id, Arc::clone(&s.handler)))
            .collect();

        let mut delivered = 0;
        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => warn!("Subscriber {:?} failed on {:?}: {}", id, topic, e),
                Err(_) => warn!("Subscriber {:?} panicked on {:?}", id, topic),
            }
        }

        // No receivers is not an error
        let _ = self.inner.tap_tx.send(event);
        delivered
    }
}
