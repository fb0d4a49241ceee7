//! Storage layer for yardcrane.
//!
//! The crane supervisor does not own persistence. This crate defines the
//! [`Store`] contract it relies on (the job queue, location and item lookup,
//! orders and shipments) and ships [`MemoryStore`], an in-process
//! implementation used by the demo binary and the test suites.
//!
//! # Indexes
//!
//! `MemoryStore` keeps the following views consistent on every write:
//!
//! - `jobs`: primary job records, keyed by `job_id`
//! - `pending`: ordered index of pending jobs (priority descending, id ascending)
//! - `items_by_location`: occupancy of every location, used for capacity checks
//!
//! # Example
//!
//! ```
//! use yardcrane_store::{MemoryStore, NewJob, Store};
//! use yardcrane_core::{ItemId, LocationId};
//!
//! let store = MemoryStore::new();
//! let job = store
//!     .insert_job(NewJob {
//!         item_id: ItemId::new(1),
//!         source: LocationId::new(10),
//!         destination: LocationId::new(20),
//!         priority: 5,
//!     })
//!     .unwrap();
//!
//! let pending = store.find_pending().unwrap();
//! assert_eq!(pending[0].job_id, job.job_id);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod types;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use types::{Item, JobStatus, Location, NewJob, Order, Shipment, TransportJob};

use yardcrane_core::{ItemId, JobId, LocationId, OrderId, ShipmentId};

/// The storage trait defining all operations the crane supervisor needs.
///
/// Implementations must be safe to share between the periodic control tasks.
pub trait Store: Send + Sync {
    // =========================================================================
    // Job Operations
    // =========================================================================

    /// Insert a new job in `Pending` status and return the stored record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn insert_job(&self, job: NewJob) -> Result<TransportJob>;

    /// Get a job by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_job(&self, job_id: &JobId) -> Result<Option<TransportJob>>;

    /// List pending jobs ordered by priority (descending), then id (ascending).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_pending(&self) -> Result<Vec<TransportJob>>;

    /// List all jobs with a given status, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_jobs_by_status(&self, status: JobStatus) -> Result<Vec<TransportJob>>;

    /// Update a job's status and error message.
    ///
    /// Also maintains the pending index and the start/finish timestamps.
    /// Transition legality is the caller's concern.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the job doesn't exist.
    fn update_job_status(
        &self,
        job_id: &JobId,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<()>;

    /// Increment a job's retry counter and return the new value.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the job doesn't exist.
    fn increment_retry_count(&self, job_id: &JobId) -> Result<u32>;

    // =========================================================================
    // Yard Operations
    // =========================================================================

    /// Insert or update a location record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_location(&self, location: &Location) -> Result<()>;

    /// Get a location by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_location(&self, location_id: &LocationId) -> Result<Option<Location>>;

    /// Insert or update an item record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_item(&self, item: &Item) -> Result<()>;

    /// Get an item by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_item(&self, item_id: &ItemId) -> Result<Option<Item>>;

    /// Move an item to another location, or out of the yard with `None`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the item or target location doesn't
    /// exist, and `StoreError::LocationFull` if the target has no free slot.
    fn relocate_item(&self, item_id: &ItemId, to: Option<LocationId>) -> Result<()>;

    /// List the items currently stored at a location.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn items_at(&self, location_id: &LocationId) -> Result<Vec<ItemId>>;

    // =========================================================================
    // Order & Shipment Operations
    // =========================================================================

    /// Insert or update an order record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_order(&self, order: &Order) -> Result<()>;

    /// Get an order by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_order(&self, order_id: &OrderId) -> Result<Option<Order>>;

    /// Add to an order's delivered quantity and return the new total.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the order doesn't exist.
    fn add_delivered_quantity(&self, order_id: &OrderId, quantity: u32) -> Result<u32>;

    /// Record a shipment and return it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the order doesn't exist.
    fn insert_shipment(
        &self,
        order_id: &OrderId,
        destination: &str,
        items: &[ItemId],
    ) -> Result<Shipment>;

    /// Get a shipment by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_shipment(&self, shipment_id: &ShipmentId) -> Result<Option<Shipment>>;
}
