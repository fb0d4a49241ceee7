//! Core types and utilities for yardcrane.
//!
//! This crate provides the foundational types used throughout the crane supervisor:
//!
//! - **Identifiers**: Strongly-typed IDs for jobs, items, locations, orders,
//!   shipments, alarms, control-token holders and loading sessions
//! - **Geometry**: Crane-space positions, per-axis travel steps, bounds and
//!   item dimensions
//! - **Error types**: Common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use yardcrane_core::{AxisStep, HolderId, JobId, Position};
//!
//! let holder = HolderId::new("workstation-1").unwrap();
//! let job = JobId::new(17);
//!
//! let here = Position::new(0, 0, 1000);
//! let next = here.approach(Position::new(1000, 0, 1000), AxisStep::new(200, 200, 80));
//! assert_eq!(next.x, 200);
//! # let _ = (holder, job);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod geometry;
pub mod ids;

pub use error::{CoreError, Result};
pub use geometry::{AxisStep, Bounds, Dimensions, Position};
pub use ids::{
    AlarmId, HolderId, IdError, ItemId, JobId, LocationId, OperatorId, OrderId, SessionId,
    ShipmentId,
};
