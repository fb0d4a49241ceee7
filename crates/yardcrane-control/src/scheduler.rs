//! Transport job scheduler.
//!
//! The scheduler drains the pending job queue one job at a time. Each
//! [`poll`](JobScheduler::poll) either dispatches the best pending job to the
//! crane or explains why it did not. Completion is tracked separately by
//! feeding driver snapshots to
//! [`on_driver_status`](JobScheduler::on_driver_status).
//!
//! Dispatch failures are retried up to `max_retries` times. A busy or leased
//! crane is not a failure: the job simply waits for the next poll.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, trace, warn};
use yardcrane_core::{ItemId, JobId, LocationId};
use yardcrane_store::{JobStatus, NewJob, Store, TransportJob};

use crate::config::SchedulerConfig;
use crate::driver::{JobState, MotionCommand, MotionDriver, MotionState};
use crate::error::{ControlError, Result};
use crate::events::{CraneEvent, EventBus};
use crate::interlock::SafetyInterlock;
use crate::lease::{DeviceLease, LeaseHolder};
use crate::lifecycle;

/// What a scheduler poll did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollOutcome {
    /// Auto-processing is switched off.
    Disabled,
    /// A job is already on the crane.
    JobInFlight(JobId),
    /// The device link is down.
    DriverUnavailable,
    /// The crane is executing a command.
    DriverBusy,
    /// A door alarm forbids motion.
    InterlockBlocked,
    /// The loading sequencer holds the crane.
    DeviceHeld,
    /// Nothing is pending.
    QueueEmpty,
    /// A job was handed to the crane.
    Dispatched(JobId),
    /// Dispatch failed and the job went back to the queue.
    Requeued(JobId),
    /// Dispatch failed for the last time.
    Failed(JobId),
}

/// The job currently on the crane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CurrentJob {
    /// The job.
    pub job_id: JobId,
    /// The item being moved.
    pub item_id: ItemId,
    /// Where the item is going.
    pub destination: LocationId,
}

/// Drains the transport job queue.
pub struct JobScheduler {
    config: SchedulerConfig,
    store: Arc<dyn Store>,
    driver: Arc<dyn MotionDriver>,
    interlock: Arc<SafetyInterlock>,
    lease: Arc<DeviceLease>,
    events: Arc<EventBus>,
    auto_processing: AtomicBool,
    current: Mutex<Option<CurrentJob>>,
}

impl JobScheduler {
    /// Create a scheduler.
    #[must_use]
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn Store>,
        driver: Arc<dyn MotionDriver>,
        interlock: Arc<SafetyInterlock>,
        lease: Arc<DeviceLease>,
        events: Arc<EventBus>,
    ) -> Self {
        let auto_processing = AtomicBool::new(config.auto_processing);
        Self {
            config,
            store,
            driver,
            interlock,
            lease,
            events,
            auto_processing,
            current: Mutex::new(None),
        }
    }

    // =========================================================================
    // Queue
    // =========================================================================

    /// Add a job to the queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the job.
    pub fn enqueue(&self, job: NewJob) -> Result<TransportJob> {
        let job = self.store.insert_job(job)?;
        info!(
            job_id = %job.job_id,
            item_id = %job.item_id,
            source = %job.source,
            destination = %job.destination,
            priority = job.priority,
            "Enqueued transport job"
        );
        Ok(job)
    }

    /// Cancel a job that has not been dispatched yet.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::JobNotFound` if the job doesn't exist and
    /// `ControlError::InvalidTransition` if it is no longer pending.
    pub fn cancel_job(&self, job_id: &JobId) -> Result<TransportJob> {
        let job = self
            .store
            .get_job(job_id)?
            .ok_or(ControlError::JobNotFound(*job_id))?;
        if job.status != JobStatus::Pending {
            return Err(ControlError::InvalidTransition {
                job_id: *job_id,
                from: job.status,
                to: JobStatus::Cancelled,
            });
        }

        self.store
            .update_job_status(job_id, JobStatus::Cancelled, Some("cancelled by operator".into()))?;
        info!(job_id = %job_id, "Cancelled pending job");
        self.store
            .get_job(job_id)?
            .ok_or(ControlError::JobNotFound(*job_id))
    }

    /// Switch automatic queue processing on or off.
    pub fn set_auto_processing(&self, enabled: bool) {
        let previous = self.auto_processing.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            info!(enabled, "Auto-processing changed");
            self.events.publish(CraneEvent::status(if enabled {
                "Automatic job processing enabled"
            } else {
                "Automatic job processing disabled"
            }));
        }
    }

    /// Returns true if the queue is drained automatically.
    #[must_use]
    pub fn is_auto_processing(&self) -> bool {
        self.auto_processing.load(Ordering::SeqCst)
    }

    /// The job currently on the crane.
    #[must_use]
    pub fn current_job(&self) -> Option<CurrentJob> {
        *self.current.lock()
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Dispatch the best pending job if the crane can take it.
    ///
    /// # Errors
    ///
    /// Returns an error if the job store fails.
    pub fn poll(&self) -> Result<PollOutcome> {
        self.interlock.poll();

        let mut current = self.current.lock();
        if !self.is_auto_processing() {
            trace!("Auto-processing disabled, skipping poll");
            return Ok(PollOutcome::Disabled);
        }
        if let Some(job) = current.as_ref() {
            trace!(job_id = %job.job_id, "Job in flight, skipping poll");
            return Ok(PollOutcome::JobInFlight(job.job_id));
        }
        if !self.driver.is_connected() {
            debug!("Driver unavailable, skipping poll");
            return Ok(PollOutcome::DriverUnavailable);
        }
        if !self.driver.status().is_idle() {
            trace!("Driver busy, skipping poll");
            return Ok(PollOutcome::DriverBusy);
        }
        if !self.interlock.is_operation_allowed() {
            debug!("Interlock active, skipping poll");
            return Ok(PollOutcome::InterlockBlocked);
        }
        if !self.lease.is_available_to(LeaseHolder::Scheduler) {
            trace!("Crane leased to another dispatcher, skipping poll");
            return Ok(PollOutcome::DeviceHeld);
        }

        let Some(job) = self.store.find_pending()?.into_iter().next() else {
            return Ok(PollOutcome::QueueEmpty);
        };

        self.dispatch(&mut current, &job)
    }

    fn dispatch(&self, current: &mut Option<CurrentJob>, job: &TransportJob) -> Result<PollOutcome> {
        let command = match self.resolve(job) {
            Ok(command) => command,
            Err(e) => return self.dispatch_failed(job, JobStatus::Pending, &e),
        };

        if self.lease.claim(LeaseHolder::Scheduler).is_err() {
            return Ok(PollOutcome::DeviceHeld);
        }

        lifecycle::validate_transition(&job.job_id, job.status, JobStatus::InProgress)?;
        self.store
            .update_job_status(&job.job_id, JobStatus::InProgress, None)?;

        match self.driver.submit(command) {
            Ok(()) => {
                *current = Some(CurrentJob {
                    job_id: job.job_id,
                    item_id: job.item_id,
                    destination: job.destination,
                });
                info!(
                    job_id = %job.job_id,
                    item_id = %job.item_id,
                    retry_count = job.retry_count,
                    "Dispatched transport job"
                );
                self.events.publish(CraneEvent::JobStarted {
                    job_id: job.job_id,
                    item_id: job.item_id,
                });
                Ok(PollOutcome::Dispatched(job.job_id))
            }
            Err(e) => {
                self.lease.release(LeaseHolder::Scheduler);
                if e.counts_against_retry_budget() {
                    self.dispatch_failed(job, JobStatus::InProgress, &e)
                } else {
                    debug!(job_id = %job.job_id, error = %e, "Crane refused job, returning it to the queue");
                    self.store.update_job_status(
                        &job.job_id,
                        JobStatus::Pending,
                        job.error_message.clone(),
                    )?;
                    Ok(PollOutcome::DriverBusy)
                }
            }
        }
    }

    /// Build the motion command for a job from yard data.
    fn resolve(&self, job: &TransportJob) -> Result<MotionCommand> {
        let item = self
            .store
            .get_item(&job.item_id)?
            .ok_or_else(|| ControlError::Resolution(format!("item {} not found", job.item_id)))?;
        let source = self
            .store
            .get_location(&job.source)?
            .ok_or_else(|| ControlError::Resolution(format!("location {} not found", job.source)))?;
        let destination = self.store.get_location(&job.destination)?.ok_or_else(|| {
            ControlError::Resolution(format!("location {} not found", job.destination))
        })?;

        let long_item = item.dimensions.length > self.config.long_item_threshold;
        let mut release = destination.position;
        if long_item {
            release.x += self.config.long_item_offset_x;
        }

        Ok(MotionCommand::transport(source.position, release, item.dimensions).with_long_item(long_item))
    }

    fn dispatch_failed(&self, job: &TransportJob, from: JobStatus, cause: &ControlError) -> Result<PollOutcome> {
        let retry_count = self.store.increment_retry_count(&job.job_id)?;
        let message = cause.to_string();

        if retry_count < self.config.max_retries {
            lifecycle::validate_transition(&job.job_id, from, JobStatus::Pending)?;
            self.store
                .update_job_status(&job.job_id, JobStatus::Pending, Some(message.clone()))?;
            warn!(
                job_id = %job.job_id,
                retry_count,
                max_retries = self.config.max_retries,
                error = %message,
                "Dispatch failed, job requeued"
            );
            Ok(PollOutcome::Requeued(job.job_id))
        } else {
            lifecycle::validate_transition(&job.job_id, from, JobStatus::Failed)?;
            self.store
                .update_job_status(&job.job_id, JobStatus::Failed, Some(message.clone()))?;
            error!(job_id = %job.job_id, retry_count, error = %message, "Transport job failed");
            self.events.publish(CraneEvent::JobFailed {
                job_id: job.job_id,
                error_message: message,
            });
            Ok(PollOutcome::Failed(job.job_id))
        }
    }

    // =========================================================================
    // Completion
    // =========================================================================

    /// Advance the current job from a driver snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the job store fails.
    pub fn on_driver_status(&self, status: &MotionState) -> Result<()> {
        let mut current = self.current.lock();
        let Some(active) = *current else {
            return Ok(());
        };

        let Some(job) = self.store.get_job(&active.job_id)? else {
            warn!(job_id = %active.job_id, "Current job vanished from the store");
            *current = None;
            self.lease.release(LeaseHolder::Scheduler);
            return Ok(());
        };

        match job.status {
            JobStatus::InProgress if matches!(status.job_state, JobState::Loaded | JobState::Dropped) => {
                lifecycle::validate_transition(&job.job_id, job.status, JobStatus::PickedUp)?;
                self.store
                    .update_job_status(&job.job_id, JobStatus::PickedUp, None)?;
                info!(job_id = %job.job_id, item_id = %job.item_id, "Item picked up");
            }
            // A snapshot taken before the dispatch also looks parked
            JobStatus::InProgress if status.is_parked() && self.driver.status().is_parked() => {
                *current = None;
                self.lease.release(LeaseHolder::Scheduler);
                let cause = ControlError::Internal("crane returned to idle before pickup".into());
                self.dispatch_failed(&job, JobStatus::InProgress, &cause)?;
            }
            JobStatus::PickedUp if status.is_parked() => {
                *current = None;
                self.complete(&active, &job)?;
                self.lease.release(LeaseHolder::Scheduler);
            }
            _ => {}
        }
        Ok(())
    }

    fn complete(&self, active: &CurrentJob, job: &TransportJob) -> Result<()> {
        // The item has physically moved; a bookkeeping failure does not undo that
        let error_message = match self.store.relocate_item(&active.item_id, Some(active.destination)) {
            Ok(()) => None,
            Err(e) => {
                error!(
                    job_id = %job.job_id,
                    item_id = %active.item_id,
                    destination = %active.destination,
                    error = %e,
                    "Item moved but location update failed"
                );
                let message = format!("item moved but location update failed: {e}");
                self.events.publish(CraneEvent::status(format!("Job {}: {message}", job.job_id)));
                Some(message)
            }
        };

        lifecycle::validate_transition(&job.job_id, job.status, JobStatus::Completed)?;
        self.store
            .update_job_status(&job.job_id, JobStatus::Completed, error_message.clone())?;
        info!(job_id = %job.job_id, item_id = %job.item_id, "Transport job completed");
        self.events.publish(CraneEvent::JobCompleted {
            job_id: job.job_id,
            item_id: job.item_id,
            error_message,
        });
        Ok(())
    }

    /// Abort the job on the crane and cancel it.
    ///
    /// Returns the cancelled job, or `None` if nothing was in flight.
    ///
    /// # Errors
    ///
    /// Returns an error if the job store fails.
    pub fn abort_current_order(&self) -> Result<Option<JobId>> {
        let mut current = self.current.lock();
        let Some(active) = current.take() else {
            return Ok(None);
        };

        self.driver.abort();
        self.lease.release(LeaseHolder::Scheduler);

        if let Some(job) = self.store.get_job(&active.job_id)? {
            lifecycle::validate_transition(&job.job_id, job.status, JobStatus::Cancelled)?;
            self.store.update_job_status(
                &job.job_id,
                JobStatus::Cancelled,
                Some("aborted by operator".into()),
            )?;
        }
        warn!(job_id = %active.job_id, "Aborted current transport job");
        self.events
            .publish(CraneEvent::status(format!("Job {} aborted", active.job_id)));
        Ok(Some(active.job_id))
    }
}

#[cfg(test)]
mod tests {
    use yardcrane_core::Position;
    use yardcrane_store::StoreError;

    use super::*;
    use crate::events::{EventFilter, EventKind};
    use crate::testing::{Yard, SLOT_A, SLOT_B, SLOT_FULL};

    fn scheduler(yard: &Yard) -> JobScheduler {
        JobScheduler::new(
            SchedulerConfig::default(),
            yard.store.clone(),
            yard.driver.clone(),
            yard.interlock.clone(),
            yard.lease.clone(),
            yard.events.clone(),
        )
    }

    fn job(item_id: ItemId, destination: LocationId, priority: i32) -> NewJob {
        NewJob {
            item_id,
            source: SLOT_A,
            destination,
            priority,
        }
    }

    /// Run the crane to the end of its command, feeding every snapshot to
    /// the scheduler.
    fn run_job(yard: &Yard, scheduler: &JobScheduler) {
        yard.tick_until(
            |status| scheduler.on_driver_status(status).unwrap(),
            |_| scheduler.current_job().is_none(),
        );
    }

    #[test]
    fn dispatches_highest_priority_then_lowest_id() {
        let yard = Yard::new();
        let scheduler = scheduler(&yard);
        let low = scheduler.enqueue(job(yard.add_item(10, 3_000), SLOT_B, 1)).unwrap();
        let first = scheduler.enqueue(job(yard.add_item(11, 3_000), SLOT_B, 5)).unwrap();
        let second = scheduler.enqueue(job(yard.add_item(12, 3_000), SLOT_B, 5)).unwrap();

        assert_eq!(scheduler.poll().unwrap(), PollOutcome::Dispatched(first.job_id));
        run_job(&yard, &scheduler);
        assert_eq!(scheduler.poll().unwrap(), PollOutcome::Dispatched(second.job_id));
        run_job(&yard, &scheduler);
        assert_eq!(scheduler.poll().unwrap(), PollOutcome::Dispatched(low.job_id));
    }

    #[test]
    fn full_job_lifecycle() {
        let yard = Yard::new();
        let scheduler = scheduler(&yard);
        let mut events = yard.events.subscribe(EventFilter::all());
        let item = yard.add_item(10, 3_000);
        let queued = scheduler.enqueue(job(item, SLOT_B, 0)).unwrap();

        assert_eq!(scheduler.poll().unwrap(), PollOutcome::Dispatched(queued.job_id));
        assert_eq!(yard.lease.holder(), Some(LeaseHolder::Scheduler));
        assert_eq!(
            yard.store.get_job(&queued.job_id).unwrap().unwrap().status,
            JobStatus::InProgress
        );

        let mut seen = vec![JobStatus::InProgress];
        yard.tick_until(
            |status| {
                scheduler.on_driver_status(status).unwrap();
                let job_status = yard.store.get_job(&queued.job_id).unwrap().unwrap().status;
                if seen.last() != Some(&job_status) {
                    seen.push(job_status);
                }
            },
            |_| scheduler.current_job().is_none(),
        );

        assert_eq!(
            seen,
            vec![JobStatus::InProgress, JobStatus::PickedUp, JobStatus::Completed]
        );
        assert_eq!(yard.store.get_item(&item).unwrap().unwrap().location, Some(SLOT_B));
        assert_eq!(yard.lease.holder(), None);

        assert!(matches!(
            events.receiver.try_recv().unwrap(),
            CraneEvent::JobStarted { job_id, .. } if job_id == queued.job_id
        ));
        assert!(matches!(
            events.receiver.try_recv().unwrap(),
            CraneEvent::JobCompleted { job_id, error_message: None, .. } if job_id == queued.job_id
        ));
    }

    #[test]
    fn long_items_shift_the_release_point() {
        let yard = Yard::new();
        let scheduler = scheduler(&yard);
        scheduler.enqueue(job(yard.add_item(10, 8_000), SLOT_B, 0)).unwrap();

        scheduler.poll().unwrap();

        let command = yard.driver.status().command.unwrap();
        assert!(command.long_item);
        assert_eq!(command.pickup, Position::new(0, 0, 1_000));
        assert_eq!(command.release, Position::new(1_500, 1_000, 2_000));
    }

    #[test]
    fn short_items_use_the_slot_position() {
        let yard = Yard::new();
        let scheduler = scheduler(&yard);
        scheduler.enqueue(job(yard.add_item(10, 6_000), SLOT_B, 0)).unwrap();

        scheduler.poll().unwrap();

        let command = yard.driver.status().command.unwrap();
        assert!(!command.long_item);
        assert_eq!(command.release, Position::new(1_000, 1_000, 2_000));
    }

    #[test]
    fn resolution_failures_exhaust_retries() {
        let yard = Yard::new();
        let scheduler = scheduler(&yard);
        let mut failures = yard.events.subscribe(EventFilter::only([EventKind::JobFailed]));
        let queued = scheduler.enqueue(job(ItemId::new(404), SLOT_B, 0)).unwrap();

        assert_eq!(scheduler.poll().unwrap(), PollOutcome::Requeued(queued.job_id));
        assert_eq!(scheduler.poll().unwrap(), PollOutcome::Requeued(queued.job_id));
        let after_two = yard.store.get_job(&queued.job_id).unwrap().unwrap();
        assert_eq!(after_two.status, JobStatus::Pending);
        assert_eq!(after_two.retry_count, 2);
        assert_eq!(
            after_two.error_message.as_deref(),
            Some("cannot resolve command: item 404 not found")
        );

        assert_eq!(scheduler.poll().unwrap(), PollOutcome::Failed(queued.job_id));
        let failed = yard.store.get_job(&queued.job_id).unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.retry_count, 3);
        assert!(failed.error_message.is_some());

        // Never dispatched again
        assert_eq!(scheduler.poll().unwrap(), PollOutcome::QueueEmpty);
        assert!(yard.driver.status().is_idle());
        assert!(matches!(
            failures.receiver.try_recv().unwrap(),
            CraneEvent::JobFailed { job_id, .. } if job_id == queued.job_id
        ));
    }

    #[test]
    fn skips_while_disabled() {
        let yard = Yard::new();
        let scheduler = scheduler(&yard);
        scheduler.set_auto_processing(false);
        scheduler.enqueue(job(yard.add_item(10, 3_000), SLOT_B, 0)).unwrap();

        assert_eq!(scheduler.poll().unwrap(), PollOutcome::Disabled);
        scheduler.set_auto_processing(true);
        assert!(matches!(scheduler.poll().unwrap(), PollOutcome::Dispatched(_)));
    }

    #[test]
    fn skips_while_interlock_blocks() {
        let yard = Yard::new();
        let scheduler = scheduler(&yard);
        let queued = scheduler.enqueue(job(yard.add_item(10, 3_000), SLOT_B, 0)).unwrap();

        yard.driver.set_hazard_input(1, true);
        assert_eq!(scheduler.poll().unwrap(), PollOutcome::InterlockBlocked);

        let job = yard.store.get_job(&queued.job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 0);
    }

    #[test]
    fn skips_while_driver_busy_or_unreachable() {
        let yard = Yard::new();
        let scheduler = scheduler(&yard);
        scheduler.enqueue(job(yard.add_item(10, 3_000), SLOT_B, 0)).unwrap();

        yard.driver.set_connected(false);
        assert_eq!(scheduler.poll().unwrap(), PollOutcome::DriverUnavailable);
        yard.driver.set_connected(true);

        yard.driver
            .submit(MotionCommand::transport(
                Position::new(0, 0, 0),
                Position::new(0, 0, 0),
                yardcrane_core::Dimensions::default(),
            ))
            .unwrap();
        assert_eq!(scheduler.poll().unwrap(), PollOutcome::DriverBusy);
    }

    #[test]
    fn skips_while_loading_holds_the_crane() {
        let yard = Yard::new();
        let scheduler = scheduler(&yard);
        let queued = scheduler.enqueue(job(yard.add_item(10, 3_000), SLOT_B, 0)).unwrap();

        yard.lease.try_acquire(LeaseHolder::Loading);
        assert_eq!(scheduler.poll().unwrap(), PollOutcome::DeviceHeld);
        assert_eq!(
            yard.store.get_job(&queued.job_id).unwrap().unwrap().retry_count,
            0
        );
    }

    #[test]
    fn only_one_job_in_flight() {
        let yard = Yard::new();
        let scheduler = scheduler(&yard);
        let first = scheduler.enqueue(job(yard.add_item(10, 3_000), SLOT_B, 0)).unwrap();
        scheduler.enqueue(job(yard.add_item(11, 3_000), SLOT_B, 0)).unwrap();

        scheduler.poll().unwrap();
        assert_eq!(scheduler.poll().unwrap(), PollOutcome::JobInFlight(first.job_id));
    }

    #[test]
    fn relocation_failure_still_completes() {
        let yard = Yard::new();
        let scheduler = scheduler(&yard);
        let mut status_events = yard.events.subscribe(EventFilter::only([EventKind::Status]));
        let item = yard.add_item(10, 3_000);
        let queued = scheduler.enqueue(job(item, SLOT_FULL, 0)).unwrap();

        scheduler.poll().unwrap();
        run_job(&yard, &scheduler);

        let done = yard.store.get_job(&queued.job_id).unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done
            .error_message
            .as_deref()
            .is_some_and(|m| m.starts_with("item moved but location update failed")));
        // The store still has the item where it was
        assert_eq!(yard.store.get_item(&item).unwrap().unwrap().location, Some(SLOT_A));
        assert!(matches!(
            status_events.receiver.try_recv().unwrap(),
            CraneEvent::Status { .. }
        ));
        assert!(matches!(
            yard.store.relocate_item(&item, Some(SLOT_FULL)),
            Err(StoreError::LocationFull { .. })
        ));
    }

    #[test]
    fn abort_cancels_current_job() {
        let yard = Yard::new();
        let scheduler = scheduler(&yard);
        let queued = scheduler.enqueue(job(yard.add_item(10, 3_000), SLOT_B, 0)).unwrap();
        scheduler.poll().unwrap();
        for _ in 0..5 {
            yard.driver.tick();
        }

        assert_eq!(scheduler.abort_current_order().unwrap(), Some(queued.job_id));

        assert_eq!(
            yard.store.get_job(&queued.job_id).unwrap().unwrap().status,
            JobStatus::Cancelled
        );
        assert!(yard.driver.status().is_parked());
        assert!(scheduler.current_job().is_none());
        assert_eq!(yard.lease.holder(), None);
        assert_eq!(scheduler.abort_current_order().unwrap(), None);
    }

    #[test]
    fn cancel_only_pending_jobs() {
        let yard = Yard::new();
        let scheduler = scheduler(&yard);
        let running = scheduler.enqueue(job(yard.add_item(10, 3_000), SLOT_B, 9)).unwrap();
        let waiting = scheduler.enqueue(job(yard.add_item(11, 3_000), SLOT_B, 0)).unwrap();
        scheduler.poll().unwrap();

        let cancelled = scheduler.cancel_job(&waiting.job_id).unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);

        assert!(matches!(
            scheduler.cancel_job(&running.job_id),
            Err(ControlError::InvalidTransition { from: JobStatus::InProgress, .. })
        ));
        assert!(matches!(
            scheduler.cancel_job(&JobId::new(999)),
            Err(ControlError::JobNotFound(_))
        ));
    }

    #[test]
    fn snapshot_from_before_dispatch_is_ignored() {
        let yard = Yard::new();
        let scheduler = scheduler(&yard);
        let queued = scheduler.enqueue(job(yard.add_item(10, 3_000), SLOT_B, 0)).unwrap();
        let before = yard.driver.status();
        scheduler.poll().unwrap();

        scheduler.on_driver_status(&before).unwrap();

        let job = yard.store.get_job(&queued.job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::InProgress);
        assert_eq!(job.retry_count, 0);
        assert!(scheduler.current_job().is_some());
    }

    #[test]
    fn external_abort_is_a_dispatch_failure() {
        let yard = Yard::new();
        let scheduler = scheduler(&yard);
        let queued = scheduler.enqueue(job(yard.add_item(10, 3_000), SLOT_B, 0)).unwrap();
        scheduler.poll().unwrap();
        yard.driver.tick();

        yard.driver.abort();
        scheduler.on_driver_status(&yard.driver.status()).unwrap();

        let job = yard.store.get_job(&queued.job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 1);
        assert!(scheduler.current_job().is_none());
        assert_eq!(yard.lease.holder(), None);
    }
}
