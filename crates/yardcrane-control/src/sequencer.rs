//! Loading sequencer.
//!
//! A loading session moves a planned list of items, one by one, from their
//! yard slots to the loading zone. When the plan is exhausted a single
//! shipment is created for everything that was loaded and the session ends.
//!
//! Only one session exists at a time. The sequencer holds the device lease
//! from its first dispatch until the session completes or is aborted.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};
use yardcrane_core::{ItemId, OrderId, SessionId, ShipmentId};
use yardcrane_store::Store;

use crate::collaborators::ShipmentService;
use crate::config::SequencerConfig;
use crate::driver::{MotionCommand, MotionDriver};
use crate::error::{ControlError, Result};
use crate::events::{CraneEvent, EventBus};
use crate::interlock::SafetyInterlock;
use crate::lease::{DeviceLease, LeaseHolder};

/// Items to load for an order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoadingPlan {
    /// Order being delivered.
    pub order_id: OrderId,
    /// Shipment destination. Defaults to the order's destination.
    #[serde(default)]
    pub destination: Option<String>,
    /// Items in loading order.
    pub items: Vec<ItemId>,
}

/// Snapshot of the active session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadingProgress {
    /// The session.
    pub session_id: SessionId,
    /// Order being delivered.
    pub order_id: OrderId,
    /// Items still to load, in order. Includes the item in transit.
    pub planned: Vec<ItemId>,
    /// Items already in the loading zone.
    pub loaded: Vec<ItemId>,
    /// Item currently on the crane.
    pub in_transit: Option<ItemId>,
    /// When the session started.
    pub started_at: DateTime<Utc>,
}

/// What a sequencer tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickOutcome {
    /// No session is active.
    NoSession,
    /// A door alarm forbids motion.
    Blocked,
    /// Waiting for the crane or the lease to become free.
    Waiting,
    /// An item was sent to the loading zone.
    Dispatched(ItemId),
    /// Letting the crane pick up the command.
    Settling,
    /// The crane has the item.
    InTransit,
    /// An item reached the loading zone.
    Loaded(ItemId),
    /// The session finished.
    Completed(Option<ShipmentId>),
    /// The session was abandoned.
    Aborted,
}

/// Per-session context, created by `start_session` and destroyed on
/// completion or abort.
struct LoadingSession {
    session_id: SessionId,
    order_id: OrderId,
    destination: String,
    planned: VecDeque<ItemId>,
    loaded: Vec<ItemId>,
    command_sent: bool,
    job_started: bool,
    settle_ticks: u32,
    started_at: DateTime<Utc>,
}

impl LoadingSession {
    fn clear_bookkeeping(&mut self) {
        self.command_sent = false;
        self.job_started = false;
        self.settle_ticks = 0;
    }

    fn progress(&self) -> LoadingProgress {
        LoadingProgress {
            session_id: self.session_id,
            order_id: self.order_id,
            planned: self.planned.iter().copied().collect(),
            loaded: self.loaded.clone(),
            in_transit: if self.command_sent {
                self.planned.front().copied()
            } else {
                None
            },
            started_at: self.started_at,
        }
    }
}

/// Drives loading sessions.
pub struct LoadingSequencer {
    config: SequencerConfig,
    store: Arc<dyn Store>,
    driver: Arc<dyn MotionDriver>,
    interlock: Arc<SafetyInterlock>,
    lease: Arc<DeviceLease>,
    shipments: Arc<dyn ShipmentService>,
    events: Arc<EventBus>,
    session: Mutex<Option<LoadingSession>>,
}

impl LoadingSequencer {
    /// Create a sequencer.
    #[must_use]
    pub fn new(
        config: SequencerConfig,
        store: Arc<dyn Store>,
        driver: Arc<dyn MotionDriver>,
        interlock: Arc<SafetyInterlock>,
        lease: Arc<DeviceLease>,
        shipments: Arc<dyn ShipmentService>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            store,
            driver,
            interlock,
            lease,
            shipments,
            events,
            session: Mutex::new(None),
        }
    }

    /// Start a loading session.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::SessionActive` if a session is running and
    /// `ControlError::Resolution` if the order is unknown.
    pub fn start_session(&self, plan: LoadingPlan) -> Result<SessionId> {
        let mut session = self.session.lock();
        if session.is_some() {
            return Err(ControlError::SessionActive);
        }

        let order = self
            .store
            .get_order(&plan.order_id)?
            .ok_or_else(|| ControlError::Resolution(format!("order {} not found", plan.order_id)))?;

        let session_id = SessionId::generate();
        info!(
            session_id = %session_id,
            order_id = %plan.order_id,
            items = plan.items.len(),
            "Loading session started"
        );
        *session = Some(LoadingSession {
            session_id,
            order_id: plan.order_id,
            destination: plan.destination.unwrap_or(order.destination),
            planned: plan.items.into(),
            loaded: Vec::new(),
            command_sent: false,
            job_started: false,
            settle_ticks: 0,
            started_at: Utc::now(),
        });
        Ok(session_id)
    }

    /// Abandon the active session. Items already loaded stay loaded.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::NoSession` if no session is running.
    pub fn abort_session(&self) -> Result<SessionId> {
        let mut session = self.session.lock();
        let active = session.take().ok_or(ControlError::NoSession)?;
        self.end_aborted(&active, "aborted by operator");
        Ok(active.session_id)
    }

    /// Snapshot of the active session.
    #[must_use]
    pub fn progress(&self) -> Option<LoadingProgress> {
        self.session.lock().as_ref().map(LoadingSession::progress)
    }

    /// Returns true if a session is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Advance the active session by one step.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails while completing the session.
    pub fn tick(&self) -> Result<TickOutcome> {
        self.interlock.poll();

        let mut guard = self.session.lock();
        let Some(session) = guard.as_mut() else {
            return Ok(TickOutcome::NoSession);
        };

        if !self.interlock.is_operation_allowed() {
            trace!(session_id = %session.session_id, "Interlock active, loading held");
            return Ok(TickOutcome::Blocked);
        }

        if session.planned.is_empty() && !session.command_sent {
            let Some(finished) = guard.take() else {
                return Ok(TickOutcome::NoSession);
            };
            return Ok(TickOutcome::Completed(self.complete(finished)));
        }

        if session.command_sent {
            return Ok(self.track(session));
        }

        match self.dispatch_next(session) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if let Some(failed) = guard.take() {
                    self.end_aborted(&failed, &e.to_string());
                }
                Ok(TickOutcome::Aborted)
            }
        }
    }

    fn track(&self, session: &mut LoadingSession) -> TickOutcome {
        if session.settle_ticks < self.config.settle_ticks {
            session.settle_ticks += 1;
            return TickOutcome::Settling;
        }

        let status = self.driver.status();
        if !session.job_started {
            if !status.is_idle() {
                session.job_started = true;
            }
            return TickOutcome::InTransit;
        }
        if !status.is_parked() {
            return TickOutcome::InTransit;
        }

        let Some(item_id) = session.planned.pop_front() else {
            session.clear_bookkeeping();
            return TickOutcome::Waiting;
        };
        if let Err(e) = self.store.relocate_item(&item_id, None) {
            // The item is in the loading zone whatever the store says
            error!(
                session_id = %session.session_id,
                item_id = %item_id,
                error = %e,
                "Item loaded but location update failed"
            );
            self.events.publish(CraneEvent::status(format!(
                "Item {item_id} loaded but location update failed: {e}"
            )));
        }
        session.loaded.push(item_id);
        session.clear_bookkeeping();

        info!(
            session_id = %session.session_id,
            item_id = %item_id,
            loaded = session.loaded.len(),
            remaining = session.planned.len(),
            "Item loaded"
        );
        self.events.publish(CraneEvent::LoadingProgress {
            session_id: session.session_id,
            item_id,
            loaded: session.loaded.len(),
            remaining: session.planned.len(),
        });
        TickOutcome::Loaded(item_id)
    }

    fn dispatch_next(&self, session: &mut LoadingSession) -> Result<TickOutcome> {
        let Some(&item_id) = session.planned.front() else {
            return Ok(TickOutcome::Waiting);
        };
        if !self.driver.is_connected() || !self.driver.status().is_parked() {
            trace!(session_id = %session.session_id, "Crane not ready for loading");
            return Ok(TickOutcome::Waiting);
        }
        if self.lease.claim(LeaseHolder::Loading).is_err() {
            trace!(session_id = %session.session_id, "Crane leased to the scheduler");
            return Ok(TickOutcome::Waiting);
        }

        let item = self
            .store
            .get_item(&item_id)?
            .ok_or_else(|| ControlError::Resolution(format!("item {item_id} not found")))?;
        let slot = item
            .location
            .ok_or_else(|| ControlError::Resolution(format!("item {item_id} is not in the yard")))?;
        let source = self
            .store
            .get_location(&slot)?
            .ok_or_else(|| ControlError::Resolution(format!("location {slot} not found")))?;

        let command = MotionCommand::transport(source.position, self.config.drop_position, item.dimensions);
        match self.driver.submit(command) {
            Ok(()) => {}
            Err(ControlError::DriverBusy) => return Ok(TickOutcome::Waiting),
            Err(e) => return Err(e),
        }

        session.command_sent = true;
        session.job_started = false;
        session.settle_ticks = 0;
        debug!(session_id = %session.session_id, item_id = %item_id, "Item sent to loading zone");
        Ok(TickOutcome::Dispatched(item_id))
    }

    fn complete(&self, session: LoadingSession) -> Option<ShipmentId> {
        self.lease.release(LeaseHolder::Loading);

        if session.loaded.is_empty() {
            info!(session_id = %session.session_id, "Loading session finished with nothing loaded");
            self.events.publish(CraneEvent::status(format!(
                "Loading session {} finished without loading any items",
                session.session_id
            )));
            return None;
        }

        let shipment_id = match self
            .shipments
            .create_shipment(&session.order_id, &session.destination, &session.loaded)
        {
            Ok(shipment) => {
                let count = u32::try_from(session.loaded.len()).unwrap_or(u32::MAX);
                if let Err(e) = self.store.add_delivered_quantity(&session.order_id, count) {
                    error!(
                        order_id = %session.order_id,
                        error = %e,
                        "Failed to update delivered quantity"
                    );
                }
                info!(
                    session_id = %session.session_id,
                    shipment_id = %shipment.shipment_id,
                    items = session.loaded.len(),
                    "Loading session completed"
                );
                Some(shipment.shipment_id)
            }
            Err(e) => {
                error!(session_id = %session.session_id, error = %e, "Shipment creation failed");
                None
            }
        };

        self.events.publish(CraneEvent::LoadingCompleted {
            session_id: session.session_id,
            order_id: session.order_id,
            shipment_id,
            loaded: session.loaded.len(),
        });
        shipment_id
    }

    fn end_aborted(&self, session: &LoadingSession, reason: &str) {
        if session.command_sent {
            self.driver.abort();
        }
        self.lease.release(LeaseHolder::Loading);
        warn!(
            session_id = %session.session_id,
            loaded = session.loaded.len(),
            remaining = session.planned.len(),
            reason,
            "Loading session aborted"
        );
        self.events.publish(CraneEvent::status(format!(
            "Loading session {} aborted: {reason}",
            session.session_id
        )));
    }
}
