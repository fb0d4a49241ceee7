//! Door and gate safety interlock.
//!
//! The interlock watches the hazard inputs reported by the motion driver.
//! Opening a door raises an alarm and pauses the crane immediately. The
//! crane is resumed only once every door alarm is both cleared (the door is
//! closed again) and acknowledged by an operator. While any door alarm is
//! active, neither dispatcher may issue commands.
//!
//! Inputs are sampled by [`SafetyInterlock::poll`], which the dispatchers call
//! before every decision.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};
use yardcrane_core::AlarmId;

use crate::config::InterlockConfig;
use crate::driver::MotionDriver;
use crate::events::{AlarmChange, CraneEvent, EventBus};

/// Code used for the device link alarm.
pub const DEVICE_LINK_CODE: u16 = 0;

/// What raised an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmCategory {
    /// A door or gate is open. Blocks all dispatch.
    Door,
    /// The device link is down. Informational.
    Device,
}

/// A safety alarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafetyAlarm {
    /// Unique identifier.
    pub alarm_id: AlarmId,
    /// What raised the alarm.
    pub category: AlarmCategory,
    /// Hazard input code.
    pub code: u16,
    /// Operator-facing text.
    pub text: String,
    /// Number of times the input was raised while the alarm was active.
    pub count: u32,
    /// First time the alarm was raised.
    pub raised_at: DateTime<Utc>,
    /// An operator has seen the alarm.
    pub acknowledged: bool,
    /// When it was acknowledged.
    pub acknowledged_at: Option<DateTime<Utc>>,
    /// The condition has gone away.
    pub cleared: bool,
    /// When the condition went away.
    pub cleared_at: Option<DateTime<Utc>>,
}

impl SafetyAlarm {
    fn is_resolved(&self) -> bool {
        self.cleared && self.acknowledged
    }
}

#[derive(Default)]
struct InterlockState {
    alarms: BTreeMap<AlarmId, SafetyAlarm>,
    by_code: HashMap<(AlarmCategory, u16), AlarmId>,
    inputs: HashMap<u16, bool>,
    link_down: bool,
    last_alarm_id: u64,
    paused_by_interlock: bool,
}

impl InterlockState {
    fn blocks_dispatch(&self) -> bool {
        self.alarms
            .values()
            .any(|alarm| alarm.category == AlarmCategory::Door)
    }

    fn raise(&mut self, category: AlarmCategory, code: u16, text: String, now: DateTime<Utc>) -> SafetyAlarm {
        let existing = self.by_code.get(&(category, code)).copied();
        if let Some(alarm) = existing.and_then(|id| self.alarms.get_mut(&id)) {
            alarm.count += 1;
            alarm.cleared = false;
            alarm.cleared_at = None;
            alarm.acknowledged = false;
            alarm.acknowledged_at = None;
            return alarm.clone();
        }

        self.last_alarm_id += 1;
        let alarm = SafetyAlarm {
            alarm_id: AlarmId::new(self.last_alarm_id),
            category,
            code,
            text,
            count: 1,
            raised_at: now,
            acknowledged: false,
            acknowledged_at: None,
            cleared: false,
            cleared_at: None,
        };
        self.by_code.insert((category, code), alarm.alarm_id);
        self.alarms.insert(alarm.alarm_id, alarm.clone());
        alarm
    }

    fn clear(&mut self, category: AlarmCategory, code: u16, now: DateTime<Utc>) -> Option<SafetyAlarm> {
        let id = self.by_code.get(&(category, code)).copied()?;
        let alarm = self.alarms.get_mut(&id)?;
        alarm.cleared = true;
        alarm.cleared_at = Some(now);
        Some(alarm.clone())
    }

    fn remove_resolved(&mut self) -> Vec<SafetyAlarm> {
        let resolved: Vec<AlarmId> = self
            .alarms
            .values()
            .filter(|alarm| alarm.is_resolved())
            .map(|alarm| alarm.alarm_id)
            .collect();
        resolved
            .into_iter()
            .filter_map(|id| {
                let alarm = self.alarms.remove(&id)?;
                self.by_code.remove(&(alarm.category, alarm.code));
                Some(alarm)
            })
            .collect()
    }
}

/// Monitors hazard inputs and gates dispatch.
pub struct SafetyInterlock {
    config: InterlockConfig,
    driver: Arc<dyn MotionDriver>,
    events: Arc<EventBus>,
    state: Mutex<InterlockState>,
}

impl SafetyInterlock {
    /// Create an interlock for `driver`.
    #[must_use]
    pub fn new(config: InterlockConfig, driver: Arc<dyn MotionDriver>, events: Arc<EventBus>) -> Self {
        Self {
            config,
            driver,
            events,
            state: Mutex::new(InterlockState::default()),
        }
    }

    /// Sample the hazard inputs and react to edges.
    pub fn poll(&self) {
        let now = Utc::now();
        let mut notifications = Vec::new();

        {
            // Sampled under the lock so concurrent polls apply edges in order
            let mut state = self.state.lock();
            let status = self.driver.status();
            let connected = self.driver.is_connected();

            for input in &status.hazard_inputs {
                let was_open = state.inputs.insert(input.code, input.open).unwrap_or(false);
                match (was_open, input.open) {
                    (false, true) => {
                        let text = format!("{} open", self.config.label(input.code));
                        let alarm = state.raise(AlarmCategory::Door, input.code, text, now);
                        self.driver.pause();
                        state.paused_by_interlock = true;
                        warn!(
                            alarm_id = %alarm.alarm_id,
                            code = input.code,
                            count = alarm.count,
                            "Hazard input opened, crane paused"
                        );
                        notifications.push((alarm, AlarmChange::Raised));
                    }
                    (true, false) => {
                        if let Some(alarm) = state.clear(AlarmCategory::Door, input.code, now) {
                            info!(alarm_id = %alarm.alarm_id, code = input.code, "Hazard input closed");
                            notifications.push((alarm, AlarmChange::Cleared));
                        }
                    }
                    _ => {}
                }
            }

            if !connected && !state.link_down {
                state.link_down = true;
                let alarm = state.raise(
                    AlarmCategory::Device,
                    DEVICE_LINK_CODE,
                    "Device link lost".to_string(),
                    now,
                );
                warn!(alarm_id = %alarm.alarm_id, "Device link lost");
                notifications.push((alarm, AlarmChange::Raised));
            } else if connected && state.link_down {
                state.link_down = false;
                if let Some(alarm) = state.clear(AlarmCategory::Device, DEVICE_LINK_CODE, now) {
                    info!(alarm_id = %alarm.alarm_id, "Device link restored");
                    notifications.push((alarm, AlarmChange::Cleared));
                }
            }

            self.reevaluate(&mut state, &mut notifications);
        }

        self.notify(notifications);
    }

    /// Acknowledge one alarm. Returns false if no such alarm is active.
    pub fn acknowledge(&self, alarm_id: AlarmId) -> bool {
        let now = Utc::now();
        let mut notifications = Vec::new();
        let found = {
            let mut state = self.state.lock();
            let found = match state.alarms.get_mut(&alarm_id) {
                Some(alarm) => {
                    if !alarm.acknowledged {
                        alarm.acknowledged = true;
                        alarm.acknowledged_at = Some(now);
                        info!(alarm_id = %alarm_id, code = alarm.code, "Alarm acknowledged");
                        notifications.push((alarm.clone(), AlarmChange::Acknowledged));
                    }
                    true
                }
                None => false,
            };
            self.reevaluate(&mut state, &mut notifications);
            found
        };
        self.notify(notifications);
        found
    }

    /// Acknowledge every active alarm. Returns how many were newly acknowledged.
    pub fn acknowledge_all(&self) -> usize {
        let now = Utc::now();
        let mut notifications = Vec::new();
        {
            let mut state = self.state.lock();
            for alarm in state.alarms.values_mut().filter(|alarm| !alarm.acknowledged) {
                alarm.acknowledged = true;
                alarm.acknowledged_at = Some(now);
                notifications.push((alarm.clone(), AlarmChange::Acknowledged));
            }
            info!(count = notifications.len(), "All alarms acknowledged");
            self.reevaluate(&mut state, &mut notifications);
        }
        let acknowledged = notifications
            .iter()
            .filter(|(_, change)| *change == AlarmChange::Acknowledged)
            .count();
        self.notify(notifications);
        acknowledged
    }

    /// Returns true if no door alarm is active.
    #[must_use]
    pub fn is_operation_allowed(&self) -> bool {
        !self.state.lock().blocks_dispatch()
    }

    /// Snapshot of the active alarms, oldest first.
    #[must_use]
    pub fn active_alarms(&self) -> Vec<SafetyAlarm> {
        self.state.lock().alarms.values().cloned().collect()
    }

    fn reevaluate(&self, state: &mut InterlockState, notifications: &mut Vec<(SafetyAlarm, AlarmChange)>) {
        for alarm in state.remove_resolved() {
            info!(alarm_id = %alarm.alarm_id, code = alarm.code, "Alarm resolved");
            notifications.push((alarm, AlarmChange::Removed));
        }

        if state.paused_by_interlock && !state.blocks_dispatch() {
            state.paused_by_interlock = false;
            self.driver.resume();
            info!("All door alarms resolved, crane resumed");
        }
    }

    fn notify(&self, notifications: Vec<(SafetyAlarm, AlarmChange)>) {
        for (alarm, change) in notifications {
            self.events.publish(CraneEvent::Alarm {
                alarm_id: alarm.alarm_id,
                code: alarm.code,
                text: alarm.text,
                change,
            });
        }
    }
}
