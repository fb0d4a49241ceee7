//! Supervisor configuration.
//!
//! One immutable [`CraneConfig`] is built at startup and handed to every
//! component. Values come from built-in defaults, an optional JSON file named by
//! `YARDCRANE_CONFIG`, and finally individual `YARDCRANE_*` environment
//! overrides.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use yardcrane_core::{AxisStep, Bounds, Position};

use crate::error::{ControlError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CraneConfig {
    /// Motion driver settings.
    pub driver: DriverConfig,
    /// Access token settings.
    pub token: TokenConfig,
    /// Hazard input settings.
    pub interlock: InterlockConfig,
    /// Transport job scheduler settings.
    pub scheduler: SchedulerConfig,
    /// Loading sequencer settings.
    pub sequencer: SequencerConfig,
    /// Listener delivery settings.
    pub events: EventConfig,
}

/// Motion driver (and simulator) configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Tick period in milliseconds.
    pub tick_millis: u64,
    /// Maximum travel per tick on each axis.
    pub step: AxisStep,
    /// Hoist height used while travelling between slots.
    pub travel_height: i32,
    /// Ticks a movement phase dwells at its goal before completing.
    pub move_dwell_ticks: u32,
    /// Ticks the gripper needs to close on an item.
    pub grab_dwell_ticks: u32,
    /// Ticks the gripper needs to open.
    pub release_dwell_ticks: u32,
    /// Position of the crane at startup.
    pub home: Position,
    /// Envelope the crane is parked inside after a job.
    pub park_bounds: Bounds,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_millis: 100,
            step: AxisStep::new(200, 200, 80),
            travel_height: 6_000,
            move_dwell_ticks: 1,
            grab_dwell_ticks: 5,
            release_dwell_ticks: 5,
            home: Position::new(0, 0, 6_000),
            park_bounds: Bounds::new(Position::new(0, 0, 0), Position::new(40_000, 12_000, 6_000)),
        }
    }
}

impl DriverConfig {
    /// Get the tick period as a `Duration`.
    #[must_use]
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }
}

/// Access token configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Inactivity after which the token is released.
    pub timeout_seconds: u64,
    /// Period of the timeout sweep.
    pub sweep_seconds: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 300, // 5 minutes
            sweep_seconds: 30,
        }
    }
}

impl TokenConfig {
    /// Get the sweep period as a `Duration`.
    #[must_use]
    pub fn sweep_period(&self) -> Duration {
        Duration::from_secs(self.sweep_seconds)
    }
}

/// One monitored door or gate sensor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HazardInputConfig {
    /// Stable code reported by the device.
    pub code: u16,
    /// Operator-facing label.
    pub label: String,
}

/// Safety interlock configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InterlockConfig {
    /// Monitored hazard inputs.
    pub hazard_inputs: Vec<HazardInputConfig>,
}

impl Default for InterlockConfig {
    fn default() -> Self {
        Self {
            hazard_inputs: (1..=5)
                .map(|code| HazardInputConfig {
                    code,
                    label: format!("Door {code}"),
                })
                .collect(),
        }
    }
}

impl InterlockConfig {
    /// Look up the label of a hazard input.
    #[must_use]
    pub fn label(&self, code: u16) -> String {
        self.hazard_inputs
            .iter()
            .find(|input| input.code == code)
            .map_or_else(|| format!("Hazard input {code}"), |input| input.label.clone())
    }
}

/// Transport job scheduler configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Poll period in seconds.
    pub poll_seconds: u64,
    /// Failed dispatch attempts before a job is failed for good.
    pub max_retries: u32,
    /// Items longer than this need lateral clearance at the destination.
    pub long_item_threshold: u32,
    /// X offset applied to the release point of long items.
    pub long_item_offset_x: i32,
    /// Whether the queue is drained automatically after startup.
    pub auto_processing: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_seconds: 2,
            max_retries: 3,
            long_item_threshold: 6_000,
            long_item_offset_x: 500,
            auto_processing: true,
        }
    }
}

impl SchedulerConfig {
    /// Get the poll period as a `Duration`.
    #[must_use]
    pub fn poll_period(&self) -> Duration {
        Duration::from_secs(self.poll_seconds)
    }
}

/// Loading sequencer configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Tick period in milliseconds.
    pub tick_millis: u64,
    /// Ticks to wait after dispatch before sampling the driver.
    pub settle_ticks: u32,
    /// Release point in the loading zone.
    pub drop_position: Position,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            tick_millis: 500,
            settle_ticks: 2,
            drop_position: Position::new(36_000, 2_000, 1_500),
        }
    }
}

impl SequencerConfig {
    /// Get the tick period as a `Duration`.
    #[must_use]
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }
}

/// Listener delivery configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Events buffered per subscriber before new ones are dropped.
    pub queue_capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { queue_capacity: 64 }
    }
}

impl CraneConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Config` if the document is malformed or holds
    /// values the supervisor cannot run with.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| ControlError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Config` if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ControlError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    /// Build the default configuration with environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Load configuration for the service binary.
    ///
    /// Reads the file named by `YARDCRANE_CONFIG` if set, then applies
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Config` if the configuration file or the
    /// overridden values are invalid.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("YARDCRANE_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Check values that would stall or crash the supervisor.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Config` naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        fn require(ok: bool, message: &str) -> Result<()> {
            if ok {
                Ok(())
            } else {
                Err(ControlError::Config(message.to_string()))
            }
        }

        let step = self.driver.step;
        require(self.driver.tick_millis > 0, "driver.tick_millis must be positive")?;
        require(
            step.x > 0 && step.y > 0 && step.z > 0,
            "driver.step must be positive on every axis",
        )?;
        require(
            self.driver.park_bounds.is_ordered(),
            "driver.park_bounds min must not exceed max",
        )?;
        require(self.token.timeout_seconds > 0, "token.timeout_seconds must be positive")?;
        require(
            i64::try_from(self.token.timeout_seconds)
                .ok()
                .and_then(chrono::Duration::try_seconds)
                .is_some(),
            "token.timeout_seconds is out of range",
        )?;
        require(self.token.sweep_seconds > 0, "token.sweep_seconds must be positive")?;
        require(self.scheduler.poll_seconds > 0, "scheduler.poll_seconds must be positive")?;
        require(self.sequencer.tick_millis > 0, "sequencer.tick_millis must be positive")?;
        require(self.events.queue_capacity > 0, "events.queue_capacity must be positive")
    }

    /// Apply environment variable overrides.
    ///
    /// Supported environment variables:
    /// - `YARDCRANE_DRIVER_TICK_MS`: driver tick period
    /// - `YARDCRANE_TOKEN_TIMEOUT_SECS`: control token inactivity timeout
    /// - `YARDCRANE_SCHEDULER_POLL_SECS`: scheduler poll period
    /// - `YARDCRANE_MAX_RETRIES`: dispatch attempts per job
    /// - `YARDCRANE_AUTO_PROCESSING`: `true`/`false`
    /// - `YARDCRANE_SEQUENCER_TICK_MS`: loading sequencer tick period
    /// - `YARDCRANE_SETTLE_TICKS`: loading settle ticks
    /// - `YARDCRANE_EVENT_QUEUE`: per-subscriber event queue capacity
    pub fn apply_env(&mut self) {
        if let Some(n) = env_parse("YARDCRANE_DRIVER_TICK_MS") {
            self.driver.tick_millis = n;
        }
        if let Some(n) = env_parse("YARDCRANE_TOKEN_TIMEOUT_SECS") {
            self.token.timeout_seconds = n;
        }
        if let Some(n) = env_parse("YARDCRANE_SCHEDULER_POLL_SECS") {
            self.scheduler.poll_seconds = n;
        }
        if let Some(n) = env_parse("YARDCRANE_MAX_RETRIES") {
            self.scheduler.max_retries = n;
        }
        if let Some(flag) = env_parse("YARDCRANE_AUTO_PROCESSING") {
            self.scheduler.auto_processing = flag;
        }
        if let Some(n) = env_parse("YARDCRANE_SEQUENCER_TICK_MS") {
            self.sequencer.tick_millis = n;
        }
        if let Some(n) = env_parse("YARDCRANE_SETTLE_TICKS") {
            self.sequencer.settle_ticks = n;
        }
        if let Some(n) = env_parse("YARDCRANE_EVENT_QUEUE") {
            self.events.queue_capacity = n;
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let value = std::env::var(key).ok()?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(key, value = %value, "Ignoring unparsable environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CraneConfig::default();
        assert_eq!(config.driver.tick_period(), Duration::from_millis(100));
        assert_eq!(config.token.timeout_seconds, 300);
        assert_eq!(config.token.sweep_period(), Duration::from_secs(30));
        assert_eq!(config.scheduler.poll_period(), Duration::from_secs(2));
        assert_eq!(config.scheduler.max_retries, 3);
        assert_eq!(config.sequencer.tick_period(), Duration::from_millis(500));
        assert_eq!(config.interlock.hazard_inputs.len(), 5);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = CraneConfig::from_json(
            r#"{ "scheduler": { "max_retries": 5 }, "token": { "timeout_seconds": 60 } }"#,
        )
        .unwrap();
        assert_eq!(config.scheduler.max_retries, 5);
        assert_eq!(config.scheduler.poll_seconds, 2);
        assert_eq!(config.token.timeout_seconds, 60);
        assert_eq!(config.driver.step, AxisStep::new(200, 200, 80));
    }

    #[test]
    fn malformed_json_is_config_error() {
        let result = CraneConfig::from_json("{ not json");
        assert!(matches!(result, Err(ControlError::Config(_))));
    }

    #[test]
    fn defaults_are_valid() {
        CraneConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_periods_are_rejected() {
        for json in [
            r#"{ "driver": { "tick_millis": 0 } }"#,
            r#"{ "token": { "sweep_seconds": 0 } }"#,
            r#"{ "token": { "timeout_seconds": 0 } }"#,
            r#"{ "scheduler": { "poll_seconds": 0 } }"#,
            r#"{ "sequencer": { "tick_millis": 0 } }"#,
            r#"{ "events": { "queue_capacity": 0 } }"#,
        ] {
            let result = CraneConfig::from_json(json);
            assert!(matches!(result, Err(ControlError::Config(_))), "{json} accepted");
        }
    }

    #[test]
    fn huge_token_timeout_is_rejected() {
        let json = format!(r#"{{ "token": {{ "timeout_seconds": {} }} }}"#, u64::MAX);
        assert!(matches!(CraneConfig::from_json(&json), Err(ControlError::Config(_))));
    }

    #[test]
    fn inverted_park_bounds_are_rejected() {
        let mut config = CraneConfig::default();
        config.driver.park_bounds = Bounds::new(Position::new(10_000, 0, 0), Position::new(0, 5_000, 3_000));
        assert!(matches!(config.validate(), Err(ControlError::Config(_))));

        config.driver.park_bounds = Bounds::new(Position::new(0, 0, 0), Position::new(10_000, 5_000, 3_000));
        config.driver.step = AxisStep::new(200, 0, 80);
        assert!(matches!(config.validate(), Err(ControlError::Config(_))));
    }

    #[test]
    fn hazard_labels() {
        let config = InterlockConfig::default();
        assert_eq!(config.label(2), "Door 2");
        assert_eq!(config.label(42), "Hazard input 42");
    }
}
