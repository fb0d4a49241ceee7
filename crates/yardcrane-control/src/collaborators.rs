//! Interfaces to systems outside the supervisor.

use std::collections::HashSet;
use std::sync::Arc;

use yardcrane_core::{HolderId, ItemId, OrderId};
use yardcrane_store::{Shipment, Store};

use crate::error::{ControlError, Result};

/// Decides which workstations may take manual control.
pub trait Authorizer: Send + Sync {
    /// Returns true if `holder` may hold the control token.
    fn is_permitted(&self, holder: &HolderId) -> bool;
}

/// Permits every holder.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn is_permitted(&self, _holder: &HolderId) -> bool {
        true
    }
}

/// Permits a fixed set of holders.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    holders: HashSet<HolderId>,
}

impl AllowList {
    /// Create an allow list.
    #[must_use]
    pub fn new(holders: impl IntoIterator<Item = HolderId>) -> Self {
        Self {
            holders: holders.into_iter().collect(),
        }
    }
}

impl Authorizer for AllowList {
    fn is_permitted(&self, holder: &HolderId) -> bool {
        self.holders.contains(holder)
    }
}

/// Creates the outgoing shipment at the end of a loading session.
pub trait ShipmentService: Send + Sync {
    /// Create a shipment for `order_id` holding `items`.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Shipment` if the shipment cannot be recorded.
    fn create_shipment(
        &self,
        order_id: &OrderId,
        destination: &str,
        items: &[ItemId],
    ) -> Result<Shipment>;
}

/// Records shipments in the supervisor's [`Store`].
pub struct StoreShipmentService {
    store: Arc<dyn Store>,
}

impl StoreShipmentService {
    /// Create a shipment service backed by `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

impl ShipmentService for StoreShipmentService {
    fn create_shipment(
        &self,
        order_id: &OrderId,
        destination: &str,
        items: &[ItemId],
    ) -> Result<Shipment> {
        self.store
            .insert_shipment(order_id, destination, items)
            .map_err(|e| ControlError::Shipment(e.to_string()))
    }
}
