//! Component wiring and periodic tasks.
//!
//! [`Crane`] builds the five components around one driver and one store.
//! [`CraneRuntime`] drives them: every periodic activity runs in its own task
//! with its own shutdown handle, and [`CraneRuntime::shutdown`] stops them all.
//!
//! | Task              | Period                 | Work                                   |
//! |-------------------|------------------------|----------------------------------------|
//! | `driver-tick`     | `driver.tick_millis`   | advance the driver, publish snapshots  |
//! | `token-sweep`     | `token.sweep_seconds`  | release an inactive control token      |
//! | `scheduler-poll`  | `scheduler.poll_seconds` | dispatch the next pending job        |
//! | `status-observer` | on snapshot change     | interlock edges, job completion        |
//! | `sequencer-tick`  | `sequencer.tick_millis` | advance the loading session           |

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};
use yardcrane_store::Store;

use crate::collaborators::{Authorizer, ShipmentService};
use crate::config::CraneConfig;
use crate::driver::{MotionDriver, MotionState};
use crate::events::EventBus;
use crate::interlock::SafetyInterlock;
use crate::lease::DeviceLease;
use crate::scheduler::{JobScheduler, PollOutcome};
use crate::sequencer::LoadingSequencer;
use crate::token::TokenManager;

/// The supervisor's components, wired together.
#[derive(Clone)]
pub struct Crane {
    /// Configuration the components were built from.
    pub config: Arc<CraneConfig>,
    /// Job queue and yard records.
    pub store: Arc<dyn Store>,
    /// The crane.
    pub driver: Arc<dyn MotionDriver>,
    /// Listener delivery.
    pub events: Arc<EventBus>,
    /// Dispatch exclusion between scheduler and sequencer.
    pub lease: Arc<DeviceLease>,
    /// Manual control token.
    pub tokens: Arc<TokenManager>,
    /// Door interlock.
    pub interlock: Arc<SafetyInterlock>,
    /// Transport job scheduler.
    pub scheduler: Arc<JobScheduler>,
    /// Loading sequencer.
    pub sequencer: Arc<LoadingSequencer>,
}

impl Crane {
    /// Build every component.
    #[must_use]
    pub fn new(
        config: CraneConfig,
        store: Arc<dyn Store>,
        driver: Arc<dyn MotionDriver>,
        authorizer: Arc<dyn Authorizer>,
        shipments: Arc<dyn ShipmentService>,
    ) -> Self {
        let events = Arc::new(EventBus::new(config.events.queue_capacity));
        let lease = Arc::new(DeviceLease::new());
        let tokens = Arc::new(TokenManager::new(&config.token, authorizer));
        let interlock = Arc::new(SafetyInterlock::new(
            config.interlock.clone(),
            Arc::clone(&driver),
            Arc::clone(&events),
        ));
        let scheduler = Arc::new(JobScheduler::new(
            config.scheduler.clone(),
            Arc::clone(&store),
            Arc::clone(&driver),
            Arc::clone(&interlock),
            Arc::clone(&lease),
            Arc::clone(&events),
        ));
        let sequencer = Arc::new(LoadingSequencer::new(
            config.sequencer.clone(),
            Arc::clone(&store),
            Arc::clone(&driver),
            Arc::clone(&interlock),
            Arc::clone(&lease),
            shipments,
            Arc::clone(&events),
        ));

        Self {
            config: Arc::new(config),
            store,
            driver,
            events,
            lease,
            tokens,
            interlock,
            scheduler,
            sequencer,
        }
    }
}

/// A spawned task with its own shutdown handle.
pub struct PeriodicTask {
    name: &'static str,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Run `work` every `period` until stopped.
    pub fn spawn<F>(name: &'static str, period: Duration, mut work: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        Self::spawn_with(name, move |mut shutdown| async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => work(),
                    _ = &mut shutdown => break,
                }
            }
        })
    }

    /// Run a task that watches `shutdown` itself.
    pub fn spawn_with<F, Fut>(name: &'static str, task: F) -> Self
    where
        F: FnOnce(oneshot::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown, rx) = oneshot::channel();
        let handle = tokio::spawn(task(rx));
        debug!(task = name, "Started task");
        Self {
            name,
            shutdown,
            handle,
        }
    }

    /// Name of the task.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the task to stop and wait for it.
    pub async fn stop(self) {
        // The receiver is gone if the task already ended
        let _ = self.shutdown.send(());
        if let Err(e) = self.handle.await {
            warn!(task = self.name, error = %e, "Task ended abnormally");
        } else {
            debug!(task = self.name, "Stopped task");
        }
    }
}

/// The running supervisor.
pub struct CraneRuntime {
    crane: Crane,
    status: watch::Receiver<MotionState>,
    tasks: Vec<PeriodicTask>,
}

impl CraneRuntime {
    /// Start every periodic task. Must be called inside a Tokio runtime.
    #[must_use]
    pub fn start(crane: Crane) -> Self {
        let config = Arc::clone(&crane.config);
        let (status_tx, status) = watch::channel(crane.driver.status());
        let mut tasks = Vec::with_capacity(5);

        let driver = Arc::clone(&crane.driver);
        tasks.push(PeriodicTask::spawn("driver-tick", config.driver.tick_period(), move || {
            driver.tick();
            let snapshot = driver.status();
            status_tx.send_if_modified(|current| {
                if *current == snapshot {
                    false
                } else {
                    *current = snapshot;
                    true
                }
            });
        }));

        let tokens = Arc::clone(&crane.tokens);
        tasks.push(PeriodicTask::spawn("token-sweep", config.token.sweep_period(), move || {
            tokens.sweep();
        }));

        let scheduler = Arc::clone(&crane.scheduler);
        tasks.push(PeriodicTask::spawn("scheduler-poll", config.scheduler.poll_period(), move || {
            match scheduler.poll() {
                Ok(PollOutcome::Dispatched(job_id)) => debug!(job_id = %job_id, "Scheduler poll dispatched"),
                Ok(outcome) => trace!(outcome = ?outcome, "Scheduler poll"),
                Err(e) if e.is_retriable() => warn!(error = %e, "Scheduler poll failed, retrying next period"),
                Err(e) => error!(error = %e, "Scheduler poll failed"),
            }
        }));

        let scheduler = Arc::clone(&crane.scheduler);
        let interlock = Arc::clone(&crane.interlock);
        let mut observed = status.clone();
        tasks.push(PeriodicTask::spawn_with("status-observer", move |mut shutdown| async move {
            loop {
                tokio::select! {
                    changed = observed.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = observed.borrow_and_update().clone();
                        interlock.poll();
                        if let Err(e) = scheduler.on_driver_status(&snapshot) {
                            error!(error = %e, "Failed to track job progress");
                        }
                    }
                    _ = &mut shutdown => break,
                }
            }
        }));

        let sequencer = Arc::clone(&crane.sequencer);
        tasks.push(PeriodicTask::spawn("sequencer-tick", config.sequencer.tick_period(), move || {
            match sequencer.tick() {
                Ok(_) => {}
                Err(e) if e.is_retriable() => warn!(error = %e, "Loading tick failed, retrying next period"),
                Err(e) => error!(error = %e, "Loading tick failed"),
            }
        }));

        info!(
            simulated = crane.driver.is_simulated(),
            tasks = tasks.len(),
            "Crane supervisor started"
        );
        Self {
            crane,
            status,
            tasks,
        }
    }

    /// The components driven by this runtime.
    #[must_use]
    pub const fn crane(&self) -> &Crane {
        &self.crane
    }

    /// Receiver of driver snapshots, updated on every change.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<MotionState> {
        self.status.clone()
    }

    /// Names of the running tasks.
    #[must_use]
    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(PeriodicTask::name).collect()
    }

    /// Stop every task and wait for them to finish.
    pub async fn shutdown(self) {
        info!("Stopping crane supervisor");
        futures::future::join_all(self.tasks.into_iter().map(PeriodicTask::stop)).await;
        info!("Crane supervisor stopped");
    }
}
