//! Device lease shared by the dispatchers.
//!
//! The scheduler and the loading sequencer both drive the same crane. Before
//! submitting a command a dispatcher claims the lease, and it keeps the lease
//! until its work on the device is finished or aborted. The safety interlock
//! does not take the lease: it may pause the crane whoever holds it.

use std::fmt;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::error::{ControlError, Result};

/// A component allowed to dispatch crane commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseHolder {
    /// The transport job scheduler.
    Scheduler,
    /// The loading sequencer.
    Loading,
}

impl fmt::Display for LeaseHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduler => f.write_str("scheduler"),
            Self::Loading => f.write_str("loading"),
        }
    }
}

/// Result of a lease operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseResult {
    /// Lease acquired (or already held by the caller).
    Acquired,
    /// Lease released.
    Released,
    /// Rejected because another dispatcher holds the lease.
    Rejected {
        /// Who holds the lease.
        held_by: LeaseHolder,
    },
    /// Nobody held the lease; release ignored.
    NotHeld,
}

/// Exclusive right to dispatch commands to the crane.
#[derive(Debug, Default)]
pub struct DeviceLease {
    holder: Mutex<Option<LeaseHolder>>,
}

impl DeviceLease {
    /// Create a free lease.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to acquire the lease.
    pub fn try_acquire(&self, holder: LeaseHolder) -> LeaseResult {
        let mut current = self.holder.lock();
        match *current {
            Some(held_by) if held_by != holder => LeaseResult::Rejected { held_by },
            Some(_) => LeaseResult::Acquired,
            None => {
                *current = Some(holder);
                debug!(holder = %holder, "Device lease acquired");
                LeaseResult::Acquired
            }
        }
    }

    /// Acquire the lease or fail with the current owner.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::DeviceHeld` if another dispatcher holds the lease.
    pub fn claim(&self, holder: LeaseHolder) -> Result<()> {
        match self.try_acquire(holder) {
            LeaseResult::Rejected { held_by } => Err(ControlError::DeviceHeld {
                held_by: held_by.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Release the lease. Only the owner can release it.
    pub fn release(&self, holder: LeaseHolder) -> LeaseResult {
        let mut current = self.holder.lock();
        match *current {
            Some(held_by) if held_by == holder => {
                *current = None;
                debug!(holder = %holder, "Device lease released");
                LeaseResult::Released
            }
            Some(held_by) => LeaseResult::Rejected { held_by },
            None => LeaseResult::NotHeld,
        }
    }

    /// Current owner of the lease.
    #[must_use]
    pub fn holder(&self) -> Option<LeaseHolder> {
        *self.holder.lock()
    }

    /// Returns true if `holder` may dispatch now.
    #[must_use]
    pub fn is_available_to(&self, holder: LeaseHolder) -> bool {
        self.holder().map_or(true, |current| current == holder)
    }
}
