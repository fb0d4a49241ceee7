//! Supervisor for a storage-yard overhead crane.
//!
//! This crate drives one crane through a [`MotionDriver`], drains a queue of
//! transport jobs, runs loading sessions for outgoing orders, arbitrates
//! manual control between workstations and pauses the crane whenever a door
//! of the fenced area opens.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    HTTP status surface                      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    CraneControlService                      │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │    Job      │ │  Loading    │ │  Token / Interlock  │    │
//! │  │  Scheduler  │ │  Sequencer  │ │                     │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────┐
//!        │  Store   │   │  Device  │   │  Motion  │
//!        │ (memory) │   │  Lease   │   │  Driver  │
//!        └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use yardcrane_control::{
//!     AllowAll, Crane, CraneConfig, CraneControl, CraneControlService, CraneRuntime,
//!     EnqueueJobRequest, SimulatedDriver, StoreShipmentService,
//! };
//! use yardcrane_core::{ItemId, LocationId};
//! use yardcrane_store::MemoryStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CraneConfig::load()?;
//! let store = Arc::new(MemoryStore::new());
//! let driver = Arc::new(SimulatedDriver::new(config.driver.clone()));
//!
//! let crane = Crane::new(
//!     config,
//!     store.clone(),
//!     driver,
//!     Arc::new(AllowAll),
//!     Arc::new(StoreShipmentService::new(store)),
//! );
//! let runtime = CraneRuntime::start(crane.clone());
//! let control = CraneControlService::new(crane);
//!
//! let request = EnqueueJobRequest::new(ItemId::new(1), LocationId::new(1), LocationId::new(2));
//! let job = control.enqueue_job(request).await?;
//! println!("Queued job {}", job.job_id);
//!
//! runtime.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Job Lifecycle
//!
//! - `Pending` → `InProgress` (dispatched), `Failed` or `Cancelled`
//! - `InProgress` → `PickedUp`, `Pending` (retry), `Failed` or `Cancelled`
//! - `PickedUp` → `Completed` or `Cancelled`
//!
//! See the [`lifecycle`] module for transition validation helpers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod collaborators;
pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod interlock;
pub mod lease;
pub mod lifecycle;
pub mod runtime;
pub mod scheduler;
pub mod sequencer;
pub mod service;
pub mod token;
pub mod types;

#[cfg(test)]
mod testing;

pub use collaborators::{AllowAll, AllowList, Authorizer, ShipmentService, StoreShipmentService};
pub use config::CraneConfig;
pub use driver::{MotionCommand, MotionDriver, MotionState, SimulatedDriver};
pub use error::{ControlError, Result};
pub use events::{CraneEvent, EventBus, EventFilter, EventKind, Subscription};
pub use interlock::{SafetyAlarm, SafetyInterlock};
pub use lease::{DeviceLease, LeaseHolder};
pub use runtime::{Crane, CraneRuntime};
pub use scheduler::JobScheduler;
pub use sequencer::{LoadingPlan, LoadingProgress, LoadingSequencer};
pub use service::{CraneControl, CraneControlService};
pub use token::{ControlResult, ControlToken, TokenManager};
pub use types::{CraneStatus, EnqueueJobRequest};

// Re-export commonly used types from dependencies for convenience
pub use yardcrane_core::{HolderId, ItemId, JobId, LocationId, OperatorId, OrderId, SessionId};
pub use yardcrane_store::{JobStatus, MemoryStore, TransportJob};
