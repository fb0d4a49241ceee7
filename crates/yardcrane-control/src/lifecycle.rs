//! Transport job lifecycle state machine.
//!
//! The scheduler is the only writer of job status. Every status change it
//! makes is checked here first.
//!
//! # State Machine
//!
//! ```text
//!     ┌──────────┐  (dispatch)   ┌──────────────┐
//!     │ Pending  │──────────────▶│  InProgress  │
//!     └──────────┘◀──────────────└──────────────┘
//!        │   ▲       (retry)       │          │
//!        │   │                     │ (failed) │ (item loaded)
//!        │   └─ (retry)            ▼          ▼
//!        │                   ┌──────────┐  ┌──────────────┐
//!        └──────────────────▶│  Failed  │  │   PickedUp   │
//!            (failed)        └──────────┘  └──────┬───────┘
//!                                                 │ (crane idle)
//!                                                 ▼
//!                                          ┌──────────────┐
//!                                          │  Completed   │
//!                                          └──────────────┘
//!
//!   Pending, InProgress, PickedUp ──(abort)──▶ Cancelled
//! ```

use yardcrane_core::JobId;
use yardcrane_store::JobStatus;

use crate::error::{ControlError, Result};

/// Validates a status transition and returns the target status if valid.
///
/// # Errors
///
/// Returns `ControlError::InvalidTransition` if the transition is not allowed.
pub fn validate_transition(job_id: &JobId, from: JobStatus, to: JobStatus) -> Result<JobStatus> {
    if is_valid_transition(from, to) {
        Ok(to)
    } else {
        Err(ControlError::InvalidTransition {
            job_id: *job_id,
            from,
            to,
        })
    }
}

/// Check if a status transition is valid according to the state machine.
#[must_use]
pub const fn is_valid_transition(from: JobStatus, to: JobStatus) -> bool {
    use JobStatus::{Cancelled, Completed, Failed, InProgress, Pending, PickedUp};

    matches!(
        (from, to),
        // Dispatch, or a failed attempt that stays queued with a new message
        (Pending, InProgress | Pending)
            // A failed attempt is requeued or gives up
            | (Pending | InProgress, Failed)
            | (InProgress, Pending)
            | (InProgress, PickedUp)
            | (PickedUp, Completed)
            | (Pending | InProgress | PickedUp, Cancelled)
    )
}

/// Returns the list of valid target statuses from the given status.
#[must_use]
pub fn valid_transitions_from(status: JobStatus) -> Vec<JobStatus> {
    use JobStatus::{Cancelled, Completed, Failed, InProgress, Pending, PickedUp};

    match status {
        Pending => vec![Pending, InProgress, Failed, Cancelled],
        InProgress => vec![Pending, PickedUp, Failed, Cancelled],
        PickedUp => vec![Completed, Cancelled],
        Completed | Failed | Cancelled => vec![],
    }
}

/// Returns true if the job will never be dispatched again.
#[must_use]
pub const fn is_terminal(status: JobStatus) -> bool {
    matches!(
        status,
        JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
    )
}

/// Returns true if the job currently occupies the crane.
#[must_use]
pub const fn is_in_flight(status: JobStatus) -> bool {
    matches!(status, JobStatus::InProgress | JobStatus::PickedUp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_path_is_valid() {
        use JobStatus::*;

        assert!(is_valid_transition(Pending, InProgress));
        assert!(is_valid_transition(InProgress, PickedUp));
        assert!(is_valid_transition(PickedUp, Completed));
    }

    #[test]
    fn skipping_or_reversing_is_invalid() {
        use JobStatus::*;

        // Can't complete without being picked up
        assert!(!is_valid_transition(InProgress, Completed));
        assert!(!is_valid_transition(Pending, Completed));
        // Once loaded, the job can't go back to the queue
        assert!(!is_valid_transition(PickedUp, Pending));
        // Terminal statuses are final
        assert!(!is_valid_transition(Failed, Pending));
        assert!(!is_valid_transition(Completed, Cancelled));
        assert!(!is_valid_transition(Cancelled, InProgress));
    }

    #[test]
    fn validate_transition_err() {
        let job_id = JobId::new(3);
        let result = validate_transition(&job_id, JobStatus::Completed, JobStatus::Pending);

        match result {
            Err(ControlError::InvalidTransition { job_id: id, from, to }) => {
                assert_eq!(id, job_id);
                assert_eq!(from, JobStatus::Completed);
                assert_eq!(to, JobStatus::Pending);
            }
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
    }

    #[test]
    fn transitions_from_agree_with_predicate() {
        use JobStatus::*;

        for from in [Pending, InProgress, PickedUp, Completed, Failed, Cancelled] {
            for to in [Pending, InProgress, PickedUp, Completed, Failed, Cancelled] {
                assert_eq!(
                    valid_transitions_from(from).contains(&to),
                    is_valid_transition(from, to),
                    "{from:?} -> {to:?}"
                );
            }
        }
    }

    #[test]
    fn terminal_and_in_flight() {
        assert!(is_terminal(JobStatus::Failed));
        assert!(is_terminal(JobStatus::Cancelled));
        assert!(!is_terminal(JobStatus::PickedUp));
        assert!(is_in_flight(JobStatus::InProgress));
        assert!(is_in_flight(JobStatus::PickedUp));
        assert!(!is_in_flight(JobStatus::Pending));
    }
}
