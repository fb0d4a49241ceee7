//! Common error types for yardcrane.
//!
//! This module provides shared error types that are used across multiple crates.

use crate::ids::{ItemId, JobId, LocationId, OrderId};
use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur throughout the yardcrane system.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A transport job with the specified ID was not found.
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// An item with the specified ID was not found.
    #[error("item not found: {0}")]
    ItemNotFound(ItemId),

    /// A location with the specified ID was not found.
    #[error("location not found: {0}")]
    LocationNotFound(LocationId),

    /// An order with the specified ID was not found.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::ids::IdError),
}
