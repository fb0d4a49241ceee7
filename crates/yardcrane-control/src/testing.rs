//! Shared fixtures for unit tests.

use std::sync::Arc;

use yardcrane_core::{AxisStep, Bounds, Dimensions, ItemId, LocationId, OrderId, Position};
use yardcrane_store::{Item, Location, MemoryStore, Order, Store};

use crate::config::{DriverConfig, InterlockConfig};
use crate::driver::{MotionDriver, MotionState, SimulatedDriver};
use crate::events::EventBus;
use crate::interlock::SafetyInterlock;
use crate::lease::DeviceLease;

pub const SLOT_A: LocationId = LocationId::new(1);
pub const SLOT_B: LocationId = LocationId::new(2);
pub const SLOT_FULL: LocationId = LocationId::new(3);
pub const ORDER: OrderId = OrderId::new(1);

/// A small yard with a fast simulated crane.
pub struct Yard {
    pub store: Arc<MemoryStore>,
    pub driver: Arc<SimulatedDriver>,
    pub events: Arc<EventBus>,
    pub interlock: Arc<SafetyInterlock>,
    pub lease: Arc<DeviceLease>,
}

impl Yard {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        for (id, name, position, capacity) in [
            (SLOT_A, "A-01", Position::new(0, 0, 1_000), 10),
            (SLOT_B, "B-01", Position::new(1_000, 1_000, 2_000), 10),
            (SLOT_FULL, "C-01", Position::new(3_000, 0, 1_000), 1),
        ] {
            store
                .put_location(&Location {
                    location_id: id,
                    name: name.into(),
                    position,
                    capacity,
                })
                .unwrap();
        }
        store
            .put_item(&Item {
                item_id: ItemId::new(99),
                reference: "FILLER".into(),
                dimensions: Dimensions::new(4_000, 500, 200, 1_000),
                location: Some(SLOT_FULL),
            })
            .unwrap();
        store
            .put_order(&Order {
                order_id: ORDER,
                reference: "SO-1".into(),
                destination: "Dock 1".into(),
                quantity_ordered: 5,
                quantity_delivered: 0,
            })
            .unwrap();

        let driver = Arc::new(SimulatedDriver::new(fast_driver()).with_hazard_inputs(1..=5));
        let events = Arc::new(EventBus::new(256));
        let interlock = Arc::new(SafetyInterlock::new(
            InterlockConfig::default(),
            driver.clone(),
            events.clone(),
        ));

        Self {
            store,
            driver,
            events,
            interlock,
            lease: Arc::new(DeviceLease::new()),
        }
    }

    /// Store an item of the given length in slot A.
    pub fn add_item(&self, id: u64, length: u32) -> ItemId {
        let item_id = ItemId::new(id);
        self.store
            .put_item(&Item {
                item_id,
                reference: format!("INGOT-{id}"),
                dimensions: Dimensions::new(length, 500, 200, 1_500),
                location: Some(SLOT_A),
            })
            .unwrap();
        item_id
    }

    /// Tick the crane until `done` holds, observing every snapshot.
    pub fn tick_until(&self, mut observe: impl FnMut(&MotionState), done: impl Fn(&MotionState) -> bool) {
        for _ in 0..1_000 {
            self.driver.tick();
            let status = self.driver.status();
            observe(&status);
            if done(&status) {
                return;
            }
        }
        panic!("crane did not reach the expected state");
    }
}

/// Driver settings that finish a command in a few dozen ticks.
pub fn fast_driver() -> DriverConfig {
    DriverConfig {
        step: AxisStep::new(1_000, 1_000, 500),
        travel_height: 3_000,
        move_dwell_ticks: 1,
        grab_dwell_ticks: 1,
        release_dwell_ticks: 1,
        home: Position::new(0, 0, 3_000),
        park_bounds: Bounds::new(Position::new(0, 0, 0), Position::new(40_000, 12_000, 3_000)),
        ..DriverConfig::default()
    }
}
