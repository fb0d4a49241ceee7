//! In-process crane simulation.

use parking_lot::Mutex;
use tracing::{debug, info};
use yardcrane_core::Position;

use super::{DeviceMode, GripperState, HazardInput, JobState, MotionCommand, MotionDriver, MotionState, WorkPhase};
use crate::config::DriverConfig;
use crate::error::{ControlError, Result};

/// A simulated crane.
///
/// Each [`tick`](MotionDriver::tick) moves the hook toward the goal of the
/// current phase by at most one [`AxisStep`](yardcrane_core::AxisStep). A
/// phase completes once its goal is reached and it has dwelt for the
/// configured number of ticks.
pub struct SimulatedDriver {
    config: DriverConfig,
    inner: Mutex<Simulation>,
}

struct Simulation {
    state: MotionState,
    ticks_in_phase: u32,
    connected: bool,
}

impl SimulatedDriver {
    /// Create a simulated crane parked at the configured home position.
    #[must_use]
    pub fn new(config: DriverConfig) -> Self {
        let state = MotionState::idle_at(config.park_bounds.clamp(config.home));
        Self {
            config,
            inner: Mutex::new(Simulation {
                state,
                ticks_in_phase: 0,
                connected: true,
            }),
        }
    }

    /// Register hazard inputs, all initially closed.
    #[must_use]
    pub fn with_hazard_inputs(self, codes: impl IntoIterator<Item = u16>) -> Self {
        {
            let mut sim = self.inner.lock();
            sim.state.hazard_inputs = codes
                .into_iter()
                .map(|code| HazardInput { code, open: false })
                .collect();
        }
        self
    }

    /// Open or close a door sensor.
    pub fn set_hazard_input(&self, code: u16, open: bool) {
        let mut sim = self.inner.lock();
        match sim.state.hazard_inputs.iter_mut().find(|h| h.code == code) {
            Some(input) => input.open = open,
            None => sim.state.hazard_inputs.push(HazardInput { code, open }),
        }
        debug!(code, open, "Simulated hazard input changed");
    }

    /// Simulate loss or recovery of the device link.
    pub fn set_connected(&self, connected: bool) {
        self.inner.lock().connected = connected;
        info!(connected, "Simulated device link changed");
    }

    fn goal(&self, phase: WorkPhase, command: &MotionCommand) -> Option<Position> {
        let travel = self.config.travel_height;
        match phase {
            WorkPhase::MoveToPickup | WorkPhase::LiftingItem => Some(command.pickup.with_z(travel)),
            WorkPhase::LoweringToPickup => Some(command.pickup),
            WorkPhase::MoveToDestination => Some(command.release.with_z(travel)),
            WorkPhase::LoweringToDrop => Some(command.release),
            WorkPhase::LiftingEmpty => Some(self.config.park_bounds.clamp(command.release.with_z(travel))),
            WorkPhase::Idle | WorkPhase::Grabbing | WorkPhase::ReleaseItem => None,
        }
    }

    fn dwell(&self, phase: WorkPhase) -> u32 {
        match phase {
            WorkPhase::Grabbing => self.config.grab_dwell_ticks,
            WorkPhase::ReleaseItem => self.config.release_dwell_ticks,
            _ => self.config.move_dwell_ticks,
        }
    }

    fn enter(sim: &mut Simulation, phase: WorkPhase) {
        sim.state.phase = phase;
        sim.ticks_in_phase = 0;
        match phase {
            WorkPhase::Grabbing => sim.state.gripper = GripperState::Closed,
            WorkPhase::LiftingItem => sim.state.job_state = JobState::Loaded,
            WorkPhase::ReleaseItem => sim.state.job_state = JobState::Dropped,
            WorkPhase::Idle => {
                if sim.state.gripper == GripperState::Open {
                    sim.state.job_state = JobState::Idle;
                    sim.state.device_mode = DeviceMode::Automatic;
                    sim.state.command = None;
                }
            }
            _ => {}
        }
        debug!(phase = ?phase, job_state = ?sim.state.job_state, "Simulated crane entered phase");
    }
}

impl MotionDriver for SimulatedDriver {
    fn submit(&self, command: MotionCommand) -> Result<()> {
        if command.abort {
            self.abort();
            return Ok(());
        }

        let mut sim = self.inner.lock();
        if !sim.connected {
            return Err(ControlError::DriverUnavailable);
        }
        if sim.state.job_state != JobState::Idle {
            return Err(ControlError::DriverBusy);
        }

        debug!(
            pickup = ?command.pickup,
            release = ?command.release,
            manual = command.manual,
            "Simulated crane accepted command"
        );
        sim.state.device_mode = if command.manual {
            DeviceMode::Manual
        } else {
            DeviceMode::Automatic
        };
        sim.state.command = Some(command);
        sim.state.job_state = JobState::Started;
        sim.state.phase = WorkPhase::Idle;
        sim.ticks_in_phase = 0;
        Ok(())
    }

    fn status(&self) -> MotionState {
        self.inner.lock().state.clone()
    }

    fn abort(&self) {
        let mut sim = self.inner.lock();
        sim.state.command = None;
        sim.state.phase = WorkPhase::Idle;
        sim.state.job_state = JobState::Idle;
        sim.state.gripper = GripperState::Open;
        sim.state.device_mode = DeviceMode::Automatic;
        sim.ticks_in_phase = 0;
        info!(position = ?sim.state.position, "Simulated crane aborted");
    }

    fn pause(&self) {
        self.inner.lock().state.paused = true;
    }

    fn resume(&self) {
        self.inner.lock().state.paused = false;
    }

    fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }

    fn is_simulated(&self) -> bool {
        true
    }

    fn tick(&self) {
        let mut sim = self.inner.lock();
        if sim.state.paused || !sim.connected {
            return;
        }
        let Some(command) = sim.state.command.clone() else {
            return;
        };

        let phase = sim.state.phase;
        if phase == WorkPhase::Idle {
            if sim.state.job_state == JobState::Started {
                Self::enter(&mut sim, WorkPhase::MoveToPickup);
            }
            return;
        }

        if let Some(goal) = self.goal(phase, &command) {
            sim.state.position = sim.state.position.approach(goal, self.config.step);
        }
        sim.ticks_in_phase += 1;

        let at_goal = self
            .goal(phase, &command)
            .map_or(true, |goal| sim.state.position == goal);
        if !at_goal || sim.ticks_in_phase < self.dwell(phase) {
            return;
        }

        match phase {
            WorkPhase::Grabbing => sim.state.gripper = GripperState::Loaded,
            WorkPhase::ReleaseItem => sim.state.gripper = GripperState::Open,
            _ => {}
        }
        Self::enter(&mut sim, phase.next());
    }
}
