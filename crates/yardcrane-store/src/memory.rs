//! In-memory storage implementation.
//!
//! This module provides the `MemoryStore` implementation of the `Store` trait.
//! All tables live behind a single lock so every write updates the record and
//! its indexes atomically.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use parking_lot::RwLock;
use yardcrane_core::{CoreError, ItemId, JobId, LocationId, OrderId, ShipmentId};

use crate::error::{Result, StoreError};
use crate::types::{Item, JobStatus, Location, NewJob, Order, Shipment, TransportJob};
use crate::Store;

/// Sort key of the pending index: highest priority first, then oldest id.
type PendingKey = (Reverse<i32>, JobId);

#[derive(Debug, Default)]
struct Tables {
    jobs: HashMap<JobId, TransportJob>,
    pending: BTreeSet<PendingKey>,
    locations: HashMap<LocationId, Location>,
    items: HashMap<ItemId, Item>,
    items_by_location: HashMap<LocationId, BTreeSet<ItemId>>,
    orders: HashMap<OrderId, Order>,
    shipments: HashMap<ShipmentId, Shipment>,
    last_job_id: u64,
    last_shipment_id: u64,
}

impl Tables {
    fn job_mut(&mut self, job_id: &JobId) -> Result<&mut TransportJob> {
        self.jobs
            .get_mut(job_id)
            .ok_or(StoreError::NotFound(CoreError::JobNotFound(*job_id)))
    }

    fn index_item(&mut self, item_id: ItemId, from: Option<LocationId>, to: Option<LocationId>) {
        if let Some(old) = from {
            if let Some(slot) = self.items_by_location.get_mut(&old) {
                slot.remove(&item_id);
            }
        }
        if let Some(new) = to {
            self.items_by_location.entry(new).or_default().insert(item_id);
        }
    }
}

/// In-process implementation of [`Store`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    // =========================================================================
    // Job Operations
    // =========================================================================

    fn insert_job(&self, job: NewJob) -> Result<TransportJob> {
        let mut tables = self.tables.write();
        tables.last_job_id += 1;
        let job_id = JobId::new(tables.last_job_id);
        let now = Utc::now();

        let record = TransportJob {
            job_id,
            item_id: job.item_id,
            source: job.source,
            destination: job.destination,
            priority: job.priority,
            status: JobStatus::Pending,
            retry_count: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        };

        tables.pending.insert((Reverse(record.priority), job_id));
        tables.jobs.insert(job_id, record.clone());
        Ok(record)
    }

    fn get_job(&self, job_id: &JobId) -> Result<Option<TransportJob>> {
        Ok(self.tables.read().jobs.get(job_id).cloned())
    }

    fn find_pending(&self) -> Result<Vec<TransportJob>> {
        let tables = self.tables.read();
        Ok(tables
            .pending
            .iter()
            .filter_map(|(_, id)| tables.jobs.get(id).cloned())
            .collect())
    }

    fn list_jobs_by_status(&self, status: JobStatus) -> Result<Vec<TransportJob>> {
        let tables = self.tables.read();
        let mut jobs: Vec<_> = tables
            .jobs
            .values()
            .filter(|job| job.status == status)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.job_id);
        Ok(jobs)
    }

    fn update_job_status(
        &self,
        job_id: &JobId,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<()> {
        let mut tables = self.tables.write();
        let job = tables.job_mut(job_id)?;
        let old_status = job.status;
        let key = (Reverse(job.priority), *job_id);
        let now = Utc::now();

        job.status = status;
        job.error_message = error_message;
        job.updated_at = now;
        match status {
            JobStatus::InProgress => job.started_at = Some(now),
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => {
                job.finished_at = Some(now);
            }
            JobStatus::Pending | JobStatus::PickedUp => {}
        }

        // Keep the pending index in step with the record
        if old_status == JobStatus::Pending && status != JobStatus::Pending {
            tables.pending.remove(&key);
        } else if status == JobStatus::Pending {
            tables.pending.insert(key);
        }

        Ok(())
    }

    fn increment_retry_count(&self, job_id: &JobId) -> Result<u32> {
        let mut tables = self.tables.write();
        let job = tables.job_mut(job_id)?;
        job.retry_count += 1;
        job.updated_at = Utc::now();
        Ok(job.retry_count)
    }

    // =========================================================================
    // Yard Operations
    // =========================================================================

    fn put_location(&self, location: &Location) -> Result<()> {
        self.tables
            .write()
            .locations
            .insert(location.location_id, location.clone());
        Ok(())
    }

    fn get_location(&self, location_id: &LocationId) -> Result<Option<Location>> {
        Ok(self.tables.read().locations.get(location_id).cloned())
    }

    fn put_item(&self, item: &Item) -> Result<()> {
        let mut tables = self.tables.write();
        let previous = tables.items.get(&item.item_id).and_then(|i| i.location);
        tables.index_item(item.item_id, previous, item.location);
        tables.items.insert(item.item_id, item.clone());
        Ok(())
    }

    fn get_item(&self, item_id: &ItemId) -> Result<Option<Item>> {
        Ok(self.tables.read().items.get(item_id).cloned())
    }

    fn relocate_item(&self, item_id: &ItemId, to: Option<LocationId>) -> Result<()> {
        let mut tables = self.tables.write();
        let from = tables
            .items
            .get(item_id)
            .ok_or(StoreError::NotFound(CoreError::ItemNotFound(*item_id)))?
            .location;

        if from == to {
            return Ok(());
        }

        if let Some(target) = to {
            let capacity = tables
                .locations
                .get(&target)
                .ok_or(StoreError::NotFound(CoreError::LocationNotFound(target)))?
                .capacity;
            let occupied = tables
                .items_by_location
                .get(&target)
                .map_or(0, BTreeSet::len);
            if occupied >= capacity as usize {
                return Err(StoreError::LocationFull {
                    location: target,
                    capacity,
                });
            }
        }

        tables.index_item(*item_id, from, to);
        if let Some(item) = tables.items.get_mut(item_id) {
            item.location = to;
        }

        tracing::debug!(item_id = %item_id, from = ?from, to = ?to, "Relocated item");
        Ok(())
    }

    fn items_at(&self, location_id: &LocationId) -> Result<Vec<ItemId>> {
        Ok(self
            .tables
            .read()
            .items_by_location
            .get(location_id)
            .map(|slot| slot.iter().copied().collect())
            .unwrap_or_default())
    }

    // =========================================================================
    // Order & Shipment Operations
    // =========================================================================

    fn put_order(&self, order: &Order) -> Result<()> {
        self.tables
            .write()
            .orders
            .insert(order.order_id, order.clone());
        Ok(())
    }

    fn get_order(&self, order_id: &OrderId) -> Result<Option<Order>> {
        Ok(self.tables.read().orders.get(order_id).cloned())
    }

    fn add_delivered_quantity(&self, order_id: &OrderId, quantity: u32) -> Result<u32> {
        let mut tables = self.tables.write();
        let order = tables
            .orders
            .get_mut(order_id)
            .ok_or(StoreError::NotFound(CoreError::OrderNotFound(*order_id)))?;
        order.quantity_delivered = order.quantity_delivered.saturating_add(quantity);
        Ok(order.quantity_delivered)
    }

    fn insert_shipment(
        &self,
        order_id: &OrderId,
        destination: &str,
        items: &[ItemId],
    ) -> Result<Shipment> {
        let mut tables = self.tables.write();
        if !tables.orders.contains_key(order_id) {
            return Err(StoreError::NotFound(CoreError::OrderNotFound(*order_id)));
        }

        tables.last_shipment_id += 1;
        let shipment = Shipment {
            shipment_id: ShipmentId::new(tables.last_shipment_id),
            order_id: *order_id,
            destination: destination.to_string(),
            items: items.to_vec(),
            created_at: Utc::now(),
        };
        tables
            .shipments
            .insert(shipment.shipment_id, shipment.clone());
        Ok(shipment)
    }

    fn get_shipment(&self, shipment_id: &ShipmentId) -> Result<Option<Shipment>> {
        Ok(self.tables.read().shipments.get(shipment_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yardcrane_core::{Dimensions, Position};

    fn new_job(item: u64, priority: i32) -> NewJob {
        NewJob {
            item_id: ItemId::new(item),
            source: LocationId::new(1),
            destination: LocationId::new(2),
            priority,
        }
    }

    fn location(id: u64, capacity: u32) -> Location {
        Location {
            location_id: LocationId::new(id),
            name: format!("L-{id}"),
            position: Position::new(0, 0, 0),
            capacity,
        }
    }

    fn item(id: u64, at: Option<u64>) -> Item {
        Item {
            item_id: ItemId::new(id),
            reference: format!("ING-{id}"),
            dimensions: Dimensions::new(4000, 500, 200, 1200),
            location: at.map(LocationId::new),
        }
    }

    #[test]
    fn job_ids_are_sequential() {
        let store = MemoryStore::new();
        let a = store.insert_job(new_job(1, 0)).unwrap();
        let b = store.insert_job(new_job(2, 0)).unwrap();
        assert_eq!(a.job_id, JobId::new(1));
        assert_eq!(b.job_id, JobId::new(2));
        assert_eq!(a.status, JobStatus::Pending);
    }

    #[test]
    fn pending_ordered_by_priority_then_id() {
        let store = MemoryStore::new();
        let low = store.insert_job(new_job(1, 1)).unwrap();
        let high_a = store.insert_job(new_job(2, 9)).unwrap();
        let high_b = store.insert_job(new_job(3, 9)).unwrap();

        let order: Vec<_> = store
            .find_pending()
            .unwrap()
            .into_iter()
            .map(|j| j.job_id)
            .collect();
        assert_eq!(order, vec![high_a.job_id, high_b.job_id, low.job_id]);
    }

    #[test]
    fn pending_index_updated_on_status_change() {
        let store = MemoryStore::new();
        let job = store.insert_job(new_job(1, 0)).unwrap();

        store
            .update_job_status(&job.job_id, JobStatus::InProgress, None)
            .unwrap();
        assert!(store.find_pending().unwrap().is_empty());

        let stored = store.get_job(&job.job_id).unwrap().unwrap();
        assert!(stored.started_at.is_some());

        // Requeue after a failed dispatch
        store
            .update_job_status(&job.job_id, JobStatus::Pending, Some("boom".into()))
            .unwrap();
        let pending = store.find_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn terminal_status_sets_finished_at() {
        let store = MemoryStore::new();
        let job = store.insert_job(new_job(1, 0)).unwrap();
        store
            .update_job_status(&job.job_id, JobStatus::Failed, Some("gone".into()))
            .unwrap();

        let stored = store.get_job(&job.job_id).unwrap().unwrap();
        assert!(stored.finished_at.is_some());
        assert_eq!(
            store.list_jobs_by_status(JobStatus::Failed).unwrap().len(),
            1
        );
    }

    #[test]
    fn update_missing_job_is_not_found() {
        let store = MemoryStore::new();
        let result = store.update_job_status(&JobId::new(99), JobStatus::Pending, None);
        assert!(matches!(
            result,
            Err(StoreError::NotFound(CoreError::JobNotFound(_)))
        ));
    }

    #[test]
    fn retry_count_increments() {
        let store = MemoryStore::new();
        let job = store.insert_job(new_job(1, 0)).unwrap();
        assert_eq!(store.increment_retry_count(&job.job_id).unwrap(), 1);
        assert_eq!(store.increment_retry_count(&job.job_id).unwrap(), 2);
    }

    #[test]
    fn relocate_respects_capacity() {
        let store = MemoryStore::new();
        store.put_location(&location(1, 5)).unwrap();
        store.put_location(&location(2, 1)).unwrap();
        store.put_item(&item(10, Some(1))).unwrap();
        store.put_item(&item(11, Some(1))).unwrap();

        store.relocate_item(&ItemId::new(10), Some(LocationId::new(2))).unwrap();
        assert_eq!(store.items_at(&LocationId::new(2)).unwrap(), vec![ItemId::new(10)]);
        assert_eq!(store.items_at(&LocationId::new(1)).unwrap(), vec![ItemId::new(11)]);

        let full = store.relocate_item(&ItemId::new(11), Some(LocationId::new(2)));
        assert!(matches!(full, Err(StoreError::LocationFull { capacity: 1, .. })));
    }

    #[test]
    fn relocate_out_of_yard() {
        let store = MemoryStore::new();
        store.put_location(&location(1, 5)).unwrap();
        store.put_item(&item(10, Some(1))).unwrap();

        store.relocate_item(&ItemId::new(10), None).unwrap();
        assert!(store.items_at(&LocationId::new(1)).unwrap().is_empty());
        assert_eq!(store.get_item(&ItemId::new(10)).unwrap().unwrap().location, None);
    }

    #[test]
    fn relocate_to_unknown_location_fails() {
        let store = MemoryStore::new();
        store.put_item(&item(10, None)).unwrap();
        let result = store.relocate_item(&ItemId::new(10), Some(LocationId::new(7)));
        assert!(matches!(
            result,
            Err(StoreError::NotFound(CoreError::LocationNotFound(_)))
        ));
    }

    #[test]
    fn shipments_and_delivered_quantity() {
        let store = MemoryStore::new();
        store
            .put_order(&Order {
                order_id: OrderId::new(1),
                reference: "PO-1".into(),
                destination: "Dock 3".into(),
                quantity_ordered: 4,
                quantity_delivered: 0,
            })
            .unwrap();

        let shipment = store
            .insert_shipment(&OrderId::new(1), "Dock 3", &[ItemId::new(1), ItemId::new(2)])
            .unwrap();
        assert_eq!(shipment.items.len(), 2);
        assert_eq!(
            store.get_shipment(&shipment.shipment_id).unwrap().unwrap(),
            shipment
        );
        assert_eq!(store.add_delivered_quantity(&OrderId::new(1), 2).unwrap(), 2);

        assert!(store
            .insert_shipment(&OrderId::new(2), "Nowhere", &[])
            .is_err());
    }
}
