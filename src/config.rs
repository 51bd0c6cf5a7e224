// Defaults, topics, axis wiring, and the runtime-mutable arm configuration
use std::time::Duration;

use thiserror::Error;

use crate::messages::{Axis, ConfigUpdate};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 20;

// Zenoh topics
pub const TOPIC_CMD_POSE: &str = "arm/cmd/pose"; // partial pose updates
pub const TOPIC_CMD_RESET: &str = "arm/cmd/reset"; // drive back to zero
pub const TOPIC_CMD_CONFIG: &str = "arm/cmd/config"; // feedrate, port, ...
pub const TOPIC_CMD_LINK: &str = "arm/cmd/link"; // "connect" / "disconnect"
pub const TOPIC_CMD_STATE: &str = "arm/cmd/state"; // ask for the current pose
pub const TOPIC_STATE_POSE: &str = "arm/state/pose"; // pose + per-axis outcomes
pub const TOPIC_HEALTH: &str = "arm/state/health"; // health status
pub const TOPIC_ERROR: &str = "arm/state/error"; // rejected requests

// Serial port for the G-code firmware board
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUDRATE: u32 = 115_200;

// Long enough to cover M400 on a full move
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

// Enable hardware motor control (set to false for simulation/testing)
pub const DEFAULT_HARDWARE_ENABLED: bool = true;

pub const DEFAULT_FEEDRATE: u32 = 10_000;
pub const FEEDRATE_MIN: u32 = 1_000;
pub const FEEDRATE_MAX: u32 = 500_000;

/// Motor assigned to each logical axis
pub const AXIS_MOTORS: [(Axis, &str); 4] = [
    (Axis::Rotate, "M1"),
    (Axis::Extend, "M2"),
    (Axis::Elevate, "M3"),
    (Axis::Pinch, "M4"),
];

/// Firmware axis letter driving each motor
pub const MOTOR_LETTERS: [(&str, char); 4] = [("M1", 'X'), ("M2", 'Y'), ("M3", 'Z'), ("M4", 'E')];

/// Unit-to-step scale factors, one per axis.
///
/// Carried through configuration and the axis bindings, but motion uses a
/// fixed step magnitude (see `motor::translator::STEP_MAGNITUDE`).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StepsPerUnit {
    pub rotate: f64,
    pub extend: f64,
    pub elevate: f64,
    pub pinch: f64,
}

impl Default for StepsPerUnit {
    fn default() -> Self {
        Self {
            rotate: 80.0,
            extend: 80.0,
            elevate: 400.0,
            pinch: 93.0,
        }
    }
}

impl StepsPerUnit {
    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Rotate => self.rotate,
            Axis::Extend => self.extend,
            Axis::Elevate => self.elevate,
            Axis::Pinch => self.pinch,
        }
    }

    pub fn set(&mut self, axis: Axis, value: f64) {
        match axis {
            Axis::Rotate => self.rotate = value,
            Axis::Extend => self.extend = value,
            Axis::Elevate => self.elevate = value,
            Axis::Pinch => self.pinch = value,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Feedrate {value} out of range ({min}..={max})")]
    FeedrateOutOfRange { value: u32, min: u32, max: u32 },

    #[error("Serial port path must not be empty")]
    EmptyPort,

    #[error("Invalid steps-per-unit for {axis}: {value}")]
    InvalidStepsPerUnit { axis: Axis, value: f64 },
}

/// Mutable arm settings, owned by the controller
#[derive(Debug, Clone, PartialEq)]
pub struct ArmConfig {
    pub port: String,
    pub baudrate: u32,
    pub response_timeout: Duration,
    pub feedrate: u32,
    pub hardware_enabled: bool,
    pub steps_per_unit: StepsPerUnit,
}

impl Default for ArmConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baudrate: DEFAULT_BAUDRATE,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            feedrate: DEFAULT_FEEDRATE,
            hardware_enabled: DEFAULT_HARDWARE_ENABLED,
            steps_per_unit: StepsPerUnit::default(),
        }
    }
}

pub fn validate_feedrate(value: u32) -> Result<u32, ConfigError> {
    if (FEEDRATE_MIN..=FEEDRATE_MAX).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::FeedrateOutOfRange {
            value,
            min: FEEDRATE_MIN,
            max: FEEDRATE_MAX,
        })
    }
}

pub fn validate_port(port: &str) -> Result<(), ConfigError> {
    if port.trim().is_empty() {
        return Err(ConfigError::EmptyPort);
    }
    Ok(())
}

pub fn validate_steps_per_unit(axis: Axis, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidStepsPerUnit { axis, value })
    }
}

impl ConfigUpdate {
    /// Check every field without applying anything
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(feedrate) = self.feedrate {
            validate_feedrate(feedrate)?;
        }
        if let Some(ref port) = self.port {
            validate_port(port)?;
        }
        if let Some(ref steps) = self.steps_per_unit {
            for axis in Axis::ALL {
                if let Some(value) = steps.get(axis) {
                    validate_steps_per_unit(axis, value)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::StepsPerUnitUpdate;

    #[test]
    fn test_feedrate_bounds_inclusive() {
        assert_eq!(validate_feedrate(FEEDRATE_MIN), Ok(FEEDRATE_MIN));
        assert_eq!(validate_feedrate(FEEDRATE_MAX), Ok(FEEDRATE_MAX));
        assert_eq!(
            validate_feedrate(999),
            Err(ConfigError::FeedrateOutOfRange {
                value: 999,
                min: 1_000,
                max: 500_000
            })
        );
        assert!(validate_feedrate(500_001).is_err());
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ArmConfig::default();
        assert!(validate_feedrate(config.feedrate).is_ok());
        assert!(validate_port(&config.port).is_ok());
        for axis in Axis::ALL {
            assert!(validate_steps_per_unit(axis, config.steps_per_unit.get(axis)).is_ok());
        }
    }

    #[test]
    fn test_update_rejects_any_bad_field() {
        let update = ConfigUpdate {
            feedrate: Some(20_000),
            port: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(update.validate(), Err(ConfigError::EmptyPort));

        let update = ConfigUpdate {
            steps_per_unit: Some(StepsPerUnitUpdate {
                pinch: Some(-1.0),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(matches!(
            update.validate(),
            Err(ConfigError::InvalidStepsPerUnit {
                axis: Axis::Pinch,
                ..
            })
        ));
    }
}
