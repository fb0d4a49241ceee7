//! Crane supervisor service implementation.
//!
//! This module provides the `CraneControl` trait and `CraneControlService`
//! implementation, the single entry point external callers use to queue work,
//! take manual control, handle alarms, run loading sessions and observe the
//! crane.

use async_trait::async_trait;
use tracing::info;
use yardcrane_core::{AlarmId, HolderId, JobId, OperatorId, SessionId};
use yardcrane_store::{JobStatus, TransportJob};

use crate::driver::MotionCommand;
use crate::error::{ControlError, Result};
use crate::events::{EventFilter, Subscription, SubscriptionId};
use crate::interlock::SafetyAlarm;
use crate::lease::LeaseHolder;
use crate::runtime::Crane;
use crate::sequencer::{LoadingPlan, LoadingProgress};
use crate::token::{ControlResult, ControlToken};
use crate::types::{CraneStatus, EnqueueJobRequest};

/// Trait defining the crane supervisor operations.
#[async_trait]
pub trait CraneControl: Send + Sync {
    // =========================================================================
    // Job Operations
    // =========================================================================

    /// Queue a transport job.
    async fn enqueue_job(&self, request: EnqueueJobRequest) -> Result<TransportJob>;

    /// Get a job by ID.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::JobNotFound` if the job doesn't exist.
    async fn get_job(&self, job_id: &JobId) -> Result<TransportJob>;

    /// List jobs with a given status.
    async fn list_jobs(&self, status: JobStatus) -> Result<Vec<TransportJob>>;

    /// Cancel a job that is still pending.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidTransition` if the job was already dispatched.
    async fn cancel_job(&self, job_id: &JobId) -> Result<TransportJob>;

    /// Abort the job on the crane. Returns the cancelled job, if any.
    async fn abort_current_order(&self) -> Result<Option<JobId>>;

    /// Switch automatic queue processing on or off.
    async fn set_auto_processing(&self, enabled: bool);

    // =========================================================================
    // Manual Control
    // =========================================================================

    /// Request the manual control token.
    async fn request_control(&self, holder: &HolderId, user: &OperatorId) -> ControlResult;

    /// Release the manual control token.
    async fn release_control(&self, holder: &HolderId) -> bool;

    /// Release the manual control token whoever holds it.
    async fn force_release_control(&self) -> Option<ControlToken>;

    /// Keep the manual control token alive.
    async fn heartbeat(&self, holder: &HolderId) -> bool;

    /// Send a command on behalf of the token holder.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::NotTokenHolder` without the token,
    /// `ControlError::InterlockActive` while a door alarm is active,
    /// `ControlError::DeviceHeld` while a dispatcher holds the crane, and
    /// any error from the driver.
    async fn manual_command(&self, holder: &HolderId, command: MotionCommand) -> Result<()>;

    // =========================================================================
    // Alarms
    // =========================================================================

    /// Active safety alarms.
    async fn active_alarms(&self) -> Vec<SafetyAlarm>;

    /// Acknowledge one alarm.
    async fn acknowledge_alarm(&self, alarm_id: AlarmId) -> bool;

    /// Acknowledge every alarm.
    async fn acknowledge_all_alarms(&self) -> usize;

    // =========================================================================
    // Loading
    // =========================================================================

    /// Start a loading session.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::SessionActive` if one is already running.
    async fn start_loading(&self, plan: LoadingPlan) -> Result<SessionId>;

    /// Abort the loading session.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::NoSession` if none is running.
    async fn abort_loading(&self) -> Result<SessionId>;

    /// Progress of the loading session.
    async fn loading_progress(&self) -> Option<LoadingProgress>;

    // =========================================================================
    // Operational
    // =========================================================================

    /// Overall supervisor status.
    async fn status(&self) -> Result<CraneStatus>;

    /// Subscribe to events.
    async fn subscribe(&self, filter: EventFilter) -> Subscription;

    /// Cancel a subscription.
    async fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// The main crane supervisor service implementation.
#[derive(Clone)]
pub struct CraneControlService {
    crane: Crane,
}

impl CraneControlService {
    /// Create a service over wired components.
    #[must_use]
    pub const fn new(crane: Crane) -> Self {
        Self { crane }
    }

    /// Get the underlying components.
    #[must_use]
    pub const fn crane(&self) -> &Crane {
        &self.crane
    }
}

#[async_trait]
impl CraneControl for CraneControlService {
    // =========================================================================
    // Job Operations
    // =========================================================================

    async fn enqueue_job(&self, request: EnqueueJobRequest) -> Result<TransportJob> {
        self.crane.scheduler.enqueue(request.into())
    }

    async fn get_job(&self, job_id: &JobId) -> Result<TransportJob> {
        self.crane
            .store
            .get_job(job_id)?
            .ok_or(ControlError::JobNotFound(*job_id))
    }

    async fn list_jobs(&self, status: JobStatus) -> Result<Vec<TransportJob>> {
        Ok(self.crane.store.list_jobs_by_status(status)?)
    }

    async fn cancel_job(&self, job_id: &JobId) -> Result<TransportJob> {
        self.crane.scheduler.cancel_job(job_id)
    }

    async fn abort_current_order(&self) -> Result<Option<JobId>> {
        self.crane.scheduler.abort_current_order()
    }

    async fn set_auto_processing(&self, enabled: bool) {
        self.crane.scheduler.set_auto_processing(enabled);
    }

    // =========================================================================
    // Manual Control
    // =========================================================================

    async fn request_control(&self, holder: &HolderId, user: &OperatorId) -> ControlResult {
        self.crane.tokens.request_control(holder, user)
    }

    async fn release_control(&self, holder: &HolderId) -> bool {
        self.crane.tokens.release(holder)
    }

    async fn force_release_control(&self) -> Option<ControlToken> {
        self.crane.tokens.force_release()
    }

    async fn heartbeat(&self, holder: &HolderId) -> bool {
        self.crane.tokens.heartbeat(holder)
    }

    async fn manual_command(&self, holder: &HolderId, command: MotionCommand) -> Result<()> {
        if !self.crane.tokens.heartbeat(holder) {
            return Err(ControlError::NotTokenHolder(holder.clone()));
        }
        if command.abort {
            return self.manual_abort(holder);
        }

        self.crane.interlock.poll();
        if !self.crane.interlock.is_operation_allowed() {
            return Err(ControlError::InterlockActive);
        }
        if let Some(held_by) = self.crane.lease.holder() {
            return Err(ControlError::DeviceHeld {
                held_by: held_by.to_string(),
            });
        }

        self.crane.driver.submit(command.manual())?;
        info!(holder = %holder, "Manual command submitted");
        Ok(())
    }

    // =========================================================================
    // Alarms
    // =========================================================================

    async fn active_alarms(&self) -> Vec<SafetyAlarm> {
        self.crane.interlock.active_alarms()
    }

    async fn acknowledge_alarm(&self, alarm_id: AlarmId) -> bool {
        self.crane.interlock.acknowledge(alarm_id)
    }

    async fn acknowledge_all_alarms(&self) -> usize {
        self.crane.interlock.acknowledge_all()
    }

    // =========================================================================
    // Loading
    // =========================================================================

    async fn start_loading(&self, plan: LoadingPlan) -> Result<SessionId> {
        self.crane.sequencer.start_session(plan)
    }

    async fn abort_loading(&self) -> Result<SessionId> {
        self.crane.sequencer.abort_session()
    }

    async fn loading_progress(&self) -> Option<LoadingProgress> {
        self.crane.sequencer.progress()
    }

    // =========================================================================
    // Operational
    // =========================================================================

    async fn status(&self) -> Result<CraneStatus> {
        let crane = &self.crane;
        Ok(CraneStatus {
            motion: crane.driver.status(),
            connected: crane.driver.is_connected(),
            simulated: crane.driver.is_simulated(),
            operation_allowed: crane.interlock.is_operation_allowed(),
            auto_processing: crane.scheduler.is_auto_processing(),
            pending_jobs: crane.store.find_pending()?.len(),
            current_job: crane.scheduler.current_job(),
            lease: crane.lease.holder(),
            token: crane.tokens.current(),
            alarms: crane.interlock.active_alarms(),
            loading: crane.sequencer.progress(),
        })
    }

    async fn subscribe(&self, filter: EventFilter) -> Subscription {
        self.crane.events.subscribe(filter)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.crane.events.unsubscribe(id)
    }
}

impl CraneControlService {
    /// Stop the crane. Work a dispatcher owns is ended through that
    /// dispatcher so it is never reported as finished.
    fn manual_abort(&self, holder: &HolderId) -> Result<()> {
        match self.crane.lease.holder() {
            Some(LeaseHolder::Scheduler) => {
                if let Some(job_id) = self.crane.scheduler.abort_current_order()? {
                    info!(holder = %holder, job_id = %job_id, "Manual abort cancelled transport job");
                }
            }
            Some(LeaseHolder::Loading) => match self.crane.sequencer.abort_session() {
                Ok(session_id) => {
                    info!(holder = %holder, session_id = %session_id, "Manual abort ended loading session");
                }
                Err(ControlError::NoSession) => {}
                Err(e) => return Err(e),
            },
            None => {}
        }

        if !self.crane.driver.status().is_idle() {
            self.crane.driver.abort();
        }
        info!(holder = %holder, "Manual abort");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use yardcrane_core::{Dimensions, ItemId, Position};
    use yardcrane_store::Store;

    use super::*;
    use crate::collaborators::{AllowAll, StoreShipmentService};
    use crate::config::CraneConfig;
    use crate::driver::{DeviceMode, JobState, MotionDriver, MotionState, SimulatedDriver};
    use crate::testing::{fast_driver, Yard, ORDER, SLOT_A, SLOT_B};

    fn setup() -> (CraneControlService, Arc<SimulatedDriver>, Yard) {
        let yard = Yard::new();
        let config = CraneConfig {
            driver: fast_driver(),
            ..CraneConfig::default()
        };
        let driver = Arc::new(SimulatedDriver::new(config.driver.clone()).with_hazard_inputs(1..=5));
        let crane = Crane::new(
            config,
            yard.store.clone(),
            driver.clone(),
            Arc::new(AllowAll),
            Arc::new(StoreShipmentService::new(yard.store.clone())),
        );
        (CraneControlService::new(crane), driver, yard)
    }

    fn holder(name: &str) -> HolderId {
        HolderId::new(name).unwrap()
    }

    fn nudge() -> MotionCommand {
        MotionCommand::transport(
            Position::new(0, 0, 1_000),
            Position::new(500, 0, 1_000),
            Dimensions::default(),
        )
    }

    #[tokio::test]
    async fn enqueue_and_cancel() {
        let (service, _, yard) = setup();
        let item = yard.add_item(10, 3_000);

        let job = service
            .enqueue_job(EnqueueJobRequest::new(item, SLOT_A, SLOT_B).with_priority(2))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(service.list_jobs(JobStatus::Pending).await.unwrap().len(), 1);

        let cancelled = service.cancel_job(&job.job_id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert_eq!(service.get_job(&job.job_id).await.unwrap().status, JobStatus::Cancelled);
        assert!(matches!(
            service.get_job(&JobId::new(500)).await,
            Err(ControlError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn manual_command_requires_token() {
        let (service, driver, _) = setup();

        let result = service.manual_command(&holder("cab"), nudge()).await;
        assert!(matches!(result, Err(ControlError::NotTokenHolder(_))));

        let operator = OperatorId::new("ana").unwrap();
        assert_eq!(
            service.request_control(&holder("cab"), &operator).await,
            ControlResult::Granted
        );
        service.manual_command(&holder("cab"), nudge()).await.unwrap();
        assert!(!driver.status().is_idle());
        assert_eq!(driver.status().device_mode, DeviceMode::Manual);

        service
            .manual_command(&holder("cab"), MotionCommand::abort())
            .await
            .unwrap();
        assert!(driver.status().is_idle());
    }

    #[tokio::test]
    async fn manual_command_respects_interlock_and_lease() {
        let (service, driver, _) = setup();
        let operator = OperatorId::new("ana").unwrap();
        service.request_control(&holder("cab"), &operator).await;

        driver.set_hazard_input(1, true);
        assert!(matches!(
            service.manual_command(&holder("cab"), nudge()).await,
            Err(ControlError::InterlockActive)
        ));
        driver.set_hazard_input(1, false);
        service.acknowledge_all_alarms().await;

        service.crane().lease.try_acquire(LeaseHolder::Loading);
        assert!(matches!(
            service.manual_command(&holder("cab"), nudge()).await,
            Err(ControlError::DeviceHeld { .. })
        ));
    }

    /// Tick the service's crane until `done` holds, feeding the scheduler.
    fn drive_until(service: &CraneControlService, driver: &SimulatedDriver, done: impl Fn(&MotionState) -> bool) {
        for _ in 0..1_000 {
            driver.tick();
            let status = driver.status();
            service.crane().scheduler.on_driver_status(&status).unwrap();
            if done(&status) {
                return;
            }
        }
        panic!("crane did not reach the expected state");
    }

    #[tokio::test]
    async fn manual_abort_cancels_picked_up_job() {
        let (service, driver, yard) = setup();
        let item = yard.add_item(10, 3_000);
        let operator = OperatorId::new("ana").unwrap();
        service.request_control(&holder("cab"), &operator).await;

        let job = service
            .enqueue_job(EnqueueJobRequest::new(item, SLOT_A, SLOT_B))
            .await
            .unwrap();
        service.crane().scheduler.poll().unwrap();
        drive_until(&service, &driver, |status| status.job_state == JobState::Loaded);
        assert_eq!(service.get_job(&job.job_id).await.unwrap().status, JobStatus::PickedUp);

        service
            .manual_command(&holder("cab"), MotionCommand::abort())
            .await
            .unwrap();
        service.crane().scheduler.on_driver_status(&driver.status()).unwrap();

        let job = service.get_job(&job.job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(yard.store.get_item(&item).unwrap().unwrap().location, Some(SLOT_A));
        assert!(service.crane().scheduler.current_job().is_none());
        assert_eq!(service.crane().lease.holder(), None);
        assert!(driver.status().is_idle());
    }

    #[tokio::test]
    async fn manual_abort_ends_loading_session() {
        let (service, driver, yard) = setup();
        let item = yard.add_item(10, 3_000);
        let operator = OperatorId::new("ana").unwrap();
        service.request_control(&holder("cab"), &operator).await;

        service
            .start_loading(LoadingPlan {
                order_id: ORDER,
                destination: None,
                items: vec![item],
            })
            .await
            .unwrap();
        let sequencer = &service.crane().sequencer;
        sequencer.tick().unwrap();
        assert_eq!(service.crane().lease.holder(), Some(LeaseHolder::Loading));
        for _ in 0..5 {
            driver.tick();
            sequencer.tick().unwrap();
        }

        service
            .manual_command(&holder("cab"), MotionCommand::abort())
            .await
            .unwrap();
        for _ in 0..20 {
            sequencer.tick().unwrap();
        }

        assert!(service.loading_progress().await.is_none());
        assert_eq!(yard.store.get_item(&item).unwrap().unwrap().location, Some(SLOT_A));
        assert_eq!(service.crane().lease.holder(), None);
        assert!(driver.status().is_idle());
    }

    #[tokio::test]
    async fn status_reports_components() {
        let (service, _, yard) = setup();
        let item = yard.add_item(10, 3_000);
        service
            .enqueue_job(EnqueueJobRequest::new(item, SLOT_A, SLOT_B))
            .await
            .unwrap();
        service
            .start_loading(LoadingPlan {
                order_id: ORDER,
                destination: None,
                items: vec![ItemId::new(99)],
            })
            .await
            .unwrap();

        let status = service.status().await.unwrap();
        assert!(status.connected);
        assert!(status.simulated);
        assert!(status.operation_allowed);
        assert_eq!(status.pending_jobs, 1);
        assert!(status.loading.is_some());
        assert!(status.token.is_none());

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["motion"]["job_state"], "idle");
        assert_eq!(json["pending_jobs"], 1);

        service.abort_loading().await.unwrap();
        assert!(service.loading_progress().await.is_none());
    }

    #[tokio::test]
    async fn subscriptions() {
        let (service, _, _yard) = setup();
        let mut sub = service.subscribe(EventFilter::all()).await;

        service.set_auto_processing(false).await;
        assert!(matches!(sub.receiver.recv().await, Some(crate::events::CraneEvent::Status { .. })));

        assert!(service.unsubscribe(sub.id).await);
        assert!(!service.unsubscribe(sub.id).await);
    }

    #[tokio::test]
    async fn token_round_trip() {
        let (service, _, _) = setup();
        let operator = OperatorId::new("ana").unwrap();
        service.request_control(&holder("cab"), &operator).await;

        assert!(service.heartbeat(&holder("cab")).await);
        assert!(!service.heartbeat(&holder("office")).await);
        assert!(!service.release_control(&holder("office")).await);
        assert!(service.force_release_control().await.is_some());
        assert!(!service.release_control(&holder("cab")).await);
    }

    #[tokio::test]
    async fn store_is_shared() {
        let (service, _, yard) = setup();
        let item = yard.add_item(10, 3_000);
        let job = service
            .enqueue_job(EnqueueJobRequest::new(item, SLOT_A, SLOT_B))
            .await
            .unwrap();
        assert!(yard.store.get_job(&job.job_id).unwrap().is_some());
    }
}
