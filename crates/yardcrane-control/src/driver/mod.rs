//! Motion driver contract.
//!
//! A driver executes one [`MotionCommand`] at a time and exposes its progress
//! through [`MotionState`] snapshots. The supervisor never receives pushed
//! updates: it polls [`MotionDriver::status`].
//!
//! # Work phases
//!
//! ```text
//! Idle → MoveToPickup → LoweringToPickup → Grabbing → LiftingItem
//!      → MoveToDestination → LoweringToDrop → ReleaseItem → LiftingEmpty → Idle
//! ```

mod simulator;

pub use simulator::SimulatedDriver;

use serde::{Deserialize, Serialize};
use yardcrane_core::{Dimensions, Position};

use crate::error::Result;

/// State of the crane's gripper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GripperState {
    /// Open and empty.
    Open,
    /// Closing on an item.
    Closed,
    /// Holding an item.
    Loaded,
}

/// Coarse progress of the active command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// No command; a new one may be submitted.
    Idle,
    /// A command was accepted and has not picked anything up yet.
    Started,
    /// The item is on the hook.
    Loaded,
    /// The item has been put down.
    Dropped,
}

/// Fine-grained step within the active command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkPhase {
    /// Waiting for a command or for the next tick.
    Idle,
    /// Travelling above the pickup slot.
    MoveToPickup,
    /// Lowering onto the item.
    LoweringToPickup,
    /// Closing the gripper.
    Grabbing,
    /// Raising the item to travel height.
    LiftingItem,
    /// Travelling above the release slot.
    MoveToDestination,
    /// Lowering the item.
    LoweringToDrop,
    /// Opening the gripper.
    ReleaseItem,
    /// Raising the empty gripper to the park envelope.
    LiftingEmpty,
}

impl WorkPhase {
    /// The phase that follows this one in a full command.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Idle => Self::MoveToPickup,
            Self::MoveToPickup => Self::LoweringToPickup,
            Self::LoweringToPickup => Self::Grabbing,
            Self::Grabbing => Self::LiftingItem,
            Self::LiftingItem => Self::MoveToDestination,
            Self::MoveToDestination => Self::LoweringToDrop,
            Self::LoweringToDrop => Self::ReleaseItem,
            Self::ReleaseItem => Self::LiftingEmpty,
            Self::LiftingEmpty => Self::Idle,
        }
    }
}

/// Operating mode reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceMode {
    /// The supervisor is in charge.
    Automatic,
    /// An operator drives the crane from the cab.
    Manual,
}

/// Snapshot of one hazard input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HazardInput {
    /// Stable sensor code.
    pub code: u16,
    /// Whether the door or gate is open.
    pub open: bool,
}

/// A pickup-and-release order for the crane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionCommand {
    /// Where the item is picked up.
    pub pickup: Position,
    /// Where the item is put down.
    pub release: Position,
    /// Size and weight of the item.
    pub dimensions: Dimensions,
    /// The item needs lateral clearance.
    pub long_item: bool,
    /// The item is rotated while travelling.
    pub rotate: bool,
    /// Abort whatever the crane is doing instead of moving.
    pub abort: bool,
    /// Issued by an operator rather than a dispatcher.
    #[serde(default)]
    pub manual: bool,
}

impl MotionCommand {
    /// Create a move command.
    #[must_use]
    pub const fn transport(pickup: Position, release: Position, dimensions: Dimensions) -> Self {
        Self {
            pickup,
            release,
            dimensions,
            long_item: false,
            rotate: false,
            abort: false,
            manual: false,
        }
    }

    /// Create an abort command.
    #[must_use]
    pub fn abort() -> Self {
        Self {
            pickup: Position::default(),
            release: Position::default(),
            dimensions: Dimensions::default(),
            long_item: false,
            rotate: false,
            abort: true,
            manual: false,
        }
    }

    /// Mark the item as long.
    #[must_use]
    pub const fn with_long_item(mut self, long_item: bool) -> Self {
        self.long_item = long_item;
        self
    }

    /// Mark the command as issued by an operator.
    #[must_use]
    pub const fn manual(mut self) -> Self {
        self.manual = true;
        self
    }
}

/// Snapshot of the crane, produced by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionState {
    /// Current hook position.
    pub position: Position,
    /// Gripper state.
    pub gripper: GripperState,
    /// Progress of the active command.
    pub job_state: JobState,
    /// Step within the active command.
    pub phase: WorkPhase,
    /// Reported operating mode.
    pub device_mode: DeviceMode,
    /// Tick progression is frozen.
    pub paused: bool,
    /// Door and gate sensors.
    pub hazard_inputs: Vec<HazardInput>,
    /// The command being executed.
    pub command: Option<MotionCommand>,
}

impl MotionState {
    /// Create an idle snapshot at the given position.
    #[must_use]
    pub const fn idle_at(position: Position) -> Self {
        Self {
            position,
            gripper: GripperState::Open,
            job_state: JobState::Idle,
            phase: WorkPhase::Idle,
            device_mode: DeviceMode::Automatic,
            paused: false,
            hazard_inputs: Vec::new(),
            command: None,
        }
    }

    /// Returns true if the driver will accept a new command.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.job_state == JobState::Idle
    }

    /// Returns true if the crane has finished its command and parked.
    #[must_use]
    pub fn is_parked(&self) -> bool {
        self.job_state == JobState::Idle && self.phase == WorkPhase::Idle
    }
}

/// Interface to the crane, real or simulated.
///
/// Implementations are shared between the scheduler, the loading sequencer,
/// and the safety interlock, so every method takes `&self`.
pub trait MotionDriver: Send + Sync {
    /// Submit a command.
    ///
    /// A command with the abort flag set aborts the active command instead
    /// and is always accepted.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::DriverBusy` if a command is still active (the
    /// state is left untouched), or `ControlError::DriverUnavailable` if the
    /// device is not connected.
    fn submit(&self, command: MotionCommand) -> Result<()>;

    /// Take a snapshot of the crane state.
    fn status(&self) -> MotionState;

    /// Drop the active command and return to idle immediately.
    fn abort(&self);

    /// Freeze command progression.
    fn pause(&self);

    /// Unfreeze command progression.
    fn resume(&self);

    /// Returns true if the device link is up.
    fn is_connected(&self) -> bool;

    /// Returns true if this driver is a simulation.
    fn is_simulated(&self) -> bool;

    /// Advance the driver by one period.
    ///
    /// Real adapters are driven by the device and ignore this.
    fn tick(&self) {}
}
