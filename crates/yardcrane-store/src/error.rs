//! Error types for the storage layer.

use thiserror::Error;
use yardcrane_core::{CoreError, LocationId};

/// A result type using `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested record was not found.
    #[error(transparent)]
    NotFound(#[from] CoreError),

    /// The target location has no free slot.
    #[error("location {location} is full (capacity {capacity})")]
    LocationFull {
        /// The location that rejected the item.
        location: LocationId,
        /// Its configured capacity.
        capacity: u32,
    },

    /// The backing database rejected the operation.
    #[error("database error: {0}")]
    Database(String),
}
