//! Domain types stored by the yard store.
//!
//! These types represent the persisted state of transport jobs, yard
//! locations, items, orders and shipments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use yardcrane_core::{Dimensions, ItemId, JobId, LocationId, OrderId, Position, ShipmentId};

/// A transport job record: one pickup-and-place move of a single item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportJob {
    /// Unique identifier for the job.
    pub job_id: JobId,
    /// Item to move.
    pub item_id: ItemId,
    /// Location the item is picked up from.
    pub source: LocationId,
    /// Location the item is released at.
    pub destination: LocationId,
    /// Higher values are dispatched first.
    pub priority: i32,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Number of failed dispatch attempts so far.
    pub retry_count: u32,
    /// Reason for the last failure, kept after the job goes terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
    /// When the job was last handed to the crane.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

/// Fields supplied by the caller when a job is enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJob {
    /// Item to move.
    pub item_id: ItemId,
    /// Pickup location.
    pub source: LocationId,
    /// Drop location.
    pub destination: LocationId,
    /// Dispatch priority.
    #[serde(default)]
    pub priority: i32,
}

/// Lifecycle states for a transport job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum JobStatus {
    /// Waiting in the queue.
    Pending = 1,
    /// Command submitted to the crane.
    InProgress = 2,
    /// The crane has lifted the item.
    PickedUp = 3,
    /// Item released at the destination and relocated in the store.
    Completed = 4,
    /// Retries exhausted.
    Failed = 5,
    /// Aborted by an operator.
    Cancelled = 6,
}

impl JobStatus {
    /// Convert the status to its numeric representation.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Try to convert a numeric value to a `JobStatus`.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Pending),
            2 => Some(Self::InProgress),
            3 => Some(Self::PickedUp),
            4 => Some(Self::Completed),
            5 => Some(Self::Failed),
            6 => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// A storage slot in the yard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Unique identifier for the location.
    pub location_id: LocationId,
    /// Human-readable name, e.g. "A-03".
    pub name: String,
    /// Crane coordinates of the slot. `z` is the stack base height.
    pub position: Position,
    /// Maximum number of items the slot holds.
    pub capacity: u32,
}

/// A physical item tracked by the yard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Unique identifier for the item.
    pub item_id: ItemId,
    /// External reference, e.g. the heat or ingot number.
    pub reference: String,
    /// Physical dimensions used to build motion commands.
    pub dimensions: Dimensions,
    /// Current slot, or `None` once the item has left the yard.
    pub location: Option<LocationId>,
}

/// An order that a loading session delivers against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Unique identifier for the order.
    pub order_id: OrderId,
    /// Customer or order reference.
    pub reference: String,
    /// Where the shipment is going.
    pub destination: String,
    /// Number of items ordered.
    pub quantity_ordered: u32,
    /// Number of items shipped so far.
    pub quantity_delivered: u32,
}

/// A shipment created when a loading session completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    /// Unique identifier for the shipment.
    pub shipment_id: ShipmentId,
    /// Order the shipment was loaded for.
    pub order_id: OrderId,
    /// Shipment destination.
    pub destination: String,
    /// Items on the shipment, in loading order.
    pub items: Vec<ItemId>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}
