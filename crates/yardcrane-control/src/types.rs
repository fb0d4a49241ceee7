//! Request and response types for crane supervisor operations.

use serde::{Deserialize, Serialize};
use yardcrane_core::{ItemId, LocationId};
use yardcrane_store::NewJob;

use crate::driver::MotionState;
use crate::interlock::SafetyAlarm;
use crate::lease::LeaseHolder;
use crate::scheduler::CurrentJob;
use crate::sequencer::LoadingProgress;
use crate::token::ControlToken;

/// Request to queue a transport job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueJobRequest {
    /// Item to move.
    pub item_id: ItemId,
    /// Slot the item is in.
    pub source: LocationId,
    /// Slot the item goes to.
    pub destination: LocationId,
    /// Higher runs first.
    #[serde(default)]
    pub priority: i32,
}

impl EnqueueJobRequest {
    /// Create a request with default priority.
    #[must_use]
    pub const fn new(item_id: ItemId, source: LocationId, destination: LocationId) -> Self {
        Self {
            item_id,
            source,
            destination,
            priority: 0,
        }
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl From<EnqueueJobRequest> for NewJob {
    fn from(request: EnqueueJobRequest) -> Self {
        Self {
            item_id: request.item_id,
            source: request.source,
            destination: request.destination,
            priority: request.priority,
        }
    }
}

/// Overall supervisor status.
#[derive(Debug, Clone, Serialize)]
pub struct CraneStatus {
    /// Latest crane snapshot.
    pub motion: MotionState,
    /// Device link is up.
    pub connected: bool,
    /// The driver is a simulation.
    pub simulated: bool,
    /// No door alarm is active.
    pub operation_allowed: bool,
    /// Queue is drained automatically.
    pub auto_processing: bool,
    /// Number of jobs waiting.
    pub pending_jobs: usize,
    /// Job on the crane.
    pub current_job: Option<CurrentJob>,
    /// Dispatcher holding the crane.
    pub lease: Option<LeaseHolder>,
    /// Manual control token.
    pub token: Option<ControlToken>,
    /// Active safety alarms.
    pub alarms: Vec<SafetyAlarm>,
    /// Active loading session.
    pub loading: Option<LoadingProgress>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_request_defaults_priority() {
        let request: EnqueueJobRequest =
            serde_json::from_str(r#"{ "item_id": 4, "source": 1, "destination": 2 }"#).unwrap();
        assert_eq!(request.priority, 0);

        let job: NewJob = request.with_priority(7).into();
        assert_eq!(job.item_id, ItemId::new(4));
        assert_eq!(job.priority, 7);
    }
}
