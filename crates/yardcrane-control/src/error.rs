//! Error types for the crane supervisor.
//!
//! Control-token denial is not an error: it is reported through
//! [`ControlResult`](crate::token::ControlResult).

use thiserror::Error;
use yardcrane_core::{HolderId, JobId};
use yardcrane_store::JobStatus;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur in crane supervisor operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The motion driver is still executing a command.
    #[error("motion driver is busy")]
    DriverBusy,

    /// The motion driver cannot be reached.
    #[error("motion driver is not connected")]
    DriverUnavailable,

    /// Location or item data needed to build a command is missing.
    #[error("cannot resolve command: {0}")]
    Resolution(String),

    /// The requested job status transition is not valid.
    #[error("invalid status transition for job {job_id}: cannot transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// The job being transitioned.
        job_id: JobId,
        /// The current status.
        from: JobStatus,
        /// The requested target status.
        to: JobStatus,
    },

    /// The requested job was not found.
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// A loading session is already running.
    #[error("a loading session is already active")]
    SessionActive,

    /// No loading session is running.
    #[error("no loading session is active")]
    NoSession,

    /// The device is leased to another dispatcher.
    #[error("device is held by {held_by}")]
    DeviceHeld {
        /// Current owner of the device lease.
        held_by: String,
    },

    /// A manual command came from a workstation without the control token.
    #[error("{0} does not hold the control token")]
    NotTokenHolder(HolderId),

    /// A door alarm forbids motion.
    #[error("motion is blocked by an active safety alarm")]
    InterlockActive,

    /// Shipment creation failed.
    #[error("shipment error: {0}")]
    Shipment(String),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] yardcrane_store::StoreError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::DriverBusy
                | Self::DriverUnavailable
                | Self::DeviceHeld { .. }
                | Self::Resolution(_)
                | Self::Store(_)
                | Self::Internal(_)
        )
    }

    /// Returns true if a dispatch failing with this error consumes one of the
    /// job's retry attempts.
    ///
    /// A busy or leased device is not the job's fault; the job simply waits
    /// for the next poll.
    #[must_use]
    pub const fn counts_against_retry_budget(&self) -> bool {
        !matches!(self, Self::DriverBusy | Self::DeviceHeld { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_does_not_consume_retries() {
        assert!(ControlError::DriverBusy.is_retriable());
        assert!(!ControlError::DriverBusy.counts_against_retry_budget());
        assert!(!ControlError::DeviceHeld {
            held_by: "loading".into()
        }
        .counts_against_retry_budget());
    }

    #[test]
    fn resolution_consumes_retries() {
        let err = ControlError::Resolution("item 4 not found".into());
        assert!(err.is_retriable());
        assert!(err.counts_against_retry_budget());
    }

    #[test]
    fn session_errors_are_not_retriable() {
        assert!(!ControlError::SessionActive.is_retriable());
        assert!(!ControlError::NoSession.is_retriable());
        assert!(!ControlError::Config("bad".into()).is_retriable());
        assert!(!ControlError::InterlockActive.is_retriable());
    }

    #[test]
    fn transition_message() {
        let err = ControlError::InvalidTransition {
            job_id: JobId::new(7),
            from: JobStatus::Completed,
            to: JobStatus::Pending,
        };
        assert_eq!(
            err.to_string(),
            "invalid status transition for job 7: cannot transition from Completed to Pending"
        );
    }
}
