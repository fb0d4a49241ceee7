//! Listener delivery.
//!
//! Every subscriber owns a bounded `mpsc` queue. Publishing never waits: if a
//! subscriber's queue is full the event is dropped for that subscriber only,
//! and a subscriber whose receiver is gone is removed.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use yardcrane_core::{AlarmId, ItemId, JobId, OrderId, SessionId, ShipmentId};

/// Something that happened in the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CraneEvent {
    /// A transport job was handed to the crane.
    JobStarted {
        /// The job.
        job_id: JobId,
        /// The item being moved.
        item_id: ItemId,
    },
    /// A transport job finished.
    JobCompleted {
        /// The job.
        job_id: JobId,
        /// The item that was moved.
        item_id: ItemId,
        /// Set when the move happened but recording it failed.
        error_message: Option<String>,
    },
    /// A transport job ran out of retries.
    JobFailed {
        /// The job.
        job_id: JobId,
        /// Last failure reason.
        error_message: String,
    },
    /// Free-form operator message.
    Status {
        /// The message.
        message: String,
    },
    /// One item of a loading session was put into the loading zone.
    LoadingProgress {
        /// The session.
        session_id: SessionId,
        /// The item that was loaded.
        item_id: ItemId,
        /// Items loaded so far.
        loaded: usize,
        /// Items still planned.
        remaining: usize,
    },
    /// A loading session finished.
    LoadingCompleted {
        /// The session.
        session_id: SessionId,
        /// The order the session was loading for.
        order_id: OrderId,
        /// The shipment created, if any.
        shipment_id: Option<ShipmentId>,
        /// Number of items loaded.
        loaded: usize,
    },
    /// A safety alarm changed.
    Alarm {
        /// The alarm.
        alarm_id: AlarmId,
        /// Hazard input code.
        code: u16,
        /// Alarm text.
        text: String,
        /// What happened.
        change: AlarmChange,
    },
}

/// Kind of change reported by [`CraneEvent::Alarm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmChange {
    /// The hazard input opened.
    Raised,
    /// The hazard input closed.
    Cleared,
    /// An operator acknowledged the alarm.
    Acknowledged,
    /// The alarm is cleared and acknowledged and no longer active.
    Removed,
}

/// Discriminant of [`CraneEvent`], used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// [`CraneEvent::JobStarted`]
    JobStarted,
    /// [`CraneEvent::JobCompleted`]
    JobCompleted,
    /// [`CraneEvent::JobFailed`]
    JobFailed,
    /// [`CraneEvent::Status`]
    Status,
    /// [`CraneEvent::LoadingProgress`]
    LoadingProgress,
    /// [`CraneEvent::LoadingCompleted`]
    LoadingCompleted,
    /// [`CraneEvent::Alarm`]
    Alarm,
}

impl CraneEvent {
    /// Get the kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::JobStarted { .. } => EventKind::JobStarted,
            Self::JobCompleted { .. } => EventKind::JobCompleted,
            Self::JobFailed { .. } => EventKind::JobFailed,
            Self::Status { .. } => EventKind::Status,
            Self::LoadingProgress { .. } => EventKind::LoadingProgress,
            Self::LoadingCompleted { .. } => EventKind::LoadingCompleted,
            Self::Alarm { .. } => EventKind::Alarm,
        }
    }

    /// Create a status message event.
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
        }
    }
}

/// Which events a subscriber wants.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    kinds: Option<HashSet<EventKind>>,
}

impl EventFilter {
    /// Receive every event.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Receive only the given kinds.
    #[must_use]
    pub fn only(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            kinds: Some(kinds.into_iter().collect()),
        }
    }

    /// Returns true if the event passes this filter.
    #[must_use]
    pub fn matches(&self, event: &CraneEvent) -> bool {
        self.kinds
            .as_ref()
            .map_or(true, |kinds| kinds.contains(&event.kind()))
    }
}

/// Handle identifying a subscription.
pub type SubscriptionId = u64;

/// A live subscription.
#[derive(Debug)]
pub struct Subscription {
    /// Token for [`EventBus::unsubscribe`].
    pub id: SubscriptionId,
    /// Events in publication order.
    pub receiver: mpsc::Receiver<CraneEvent>,
}

struct Subscriber {
    filter: EventFilter,
    tx: mpsc::Sender<CraneEvent>,
}

/// Fan-out of [`CraneEvent`]s to subscribers.
pub struct EventBus {
    capacity: usize,
    next_id: AtomicU64,
    dropped: AtomicU64,
    subscribers: Mutex<HashMap<SubscriptionId, Subscriber>>,
}

impl EventBus {
    /// Create a bus whose subscriber queues hold `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
            dropped: AtomicU64::new(0),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Register a subscriber.
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, receiver) = mpsc::channel(self.capacity);
        self.subscribers.lock().insert(id, Subscriber { filter, tx });
        debug!(subscription_id = id, "Listener subscribed");
        Subscription { id, receiver }
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.subscribers.lock().remove(&id).is_some();
        if removed {
            debug!(subscription_id = id, "Listener unsubscribed");
        }
        removed
    }

    /// Deliver an event to every matching subscriber without waiting.
    pub fn publish(&self, event: CraneEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|id, subscriber| {
            if !subscriber.filter.matches(&event) {
                return !subscriber.tx.is_closed();
            }
            match subscriber.tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(subscription_id = id, kind = ?event.kind(), "Listener queue full, event dropped");
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(subscription_id = id, "Listener gone, removing");
                    false
                }
            }
        });
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Total events dropped because a subscriber's queue was full.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
