// Arm controller: owns the serial session, axis bindings, current pose and settings
//
// There is exactly one of these per process. The runtime loop owns it and
// applies requests one at a time, so a transition never interleaves with
// another one on the serial link.

use std::time::Duration;
use tracing::info;

use crate::config::{self, ArmConfig, ConfigError, AXIS_MOTORS, MOTOR_LETTERS};
use crate::messages::{Axis, ConfigUpdate, Pose, PoseUpdate, TransitionReport};
use crate::motor::translator::{self, AxisBindings, BindingError};
use crate::motor::transport::{SerialOpener, Transport};

pub struct Controller {
    config: ArmConfig,
    transport: Transport,
    bindings: AxisBindings,
    pose: Pose,
}

impl Controller {
    /// Controller talking to a real serial device
    pub fn new(config: ArmConfig) -> Result<Self, BindingError> {
        let transport = Transport::new(Box::new(SerialOpener), &config);
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: ArmConfig, transport: Transport) -> Result<Self, BindingError> {
        let bindings = AxisBindings::new(&AXIS_MOTORS, &MOTOR_LETTERS, &config.steps_per_unit)?;
        Ok(Self {
            config,
            transport,
            bindings,
            pose: Pose::ZERO,
        })
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn config(&self) -> &ArmConfig {
        &self.config
    }

    pub fn bindings(&self) -> &AxisBindings {
        &self.bindings
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Drive the arm from `old` to `new` without touching the stored pose
    pub fn apply_transition(&mut self, old: &Pose, new: &Pose) -> TransitionReport {
        translator::apply_transition(
            &mut self.transport,
            &self.bindings,
            self.config.feedrate,
            old,
            new,
        )
    }

    /// Merge `update` onto the current pose, move there, and keep it as current.
    ///
    /// The new pose is committed even when some axes failed to move.
    pub fn set_pose(&mut self, update: &PoseUpdate) -> TransitionReport {
        let old = self.pose;
        let new = old.merged(update);
        let report = self.apply_transition(&old, &new);
        self.pose = new;
        info!("Robot state updated: {:?}", self.pose);
        report
    }

    /// Move back to the all-zero pose
    pub fn reset(&mut self) -> TransitionReport {
        let old = self.pose;
        let report = self.apply_transition(&old, &Pose::ZERO);
        self.pose = Pose::ZERO;
        info!("Robot reset to default position");
        report
    }

    pub fn connect(&mut self) -> bool {
        self.transport.connect()
    }

    pub fn disconnect(&mut self) {
        self.transport.disconnect();
    }

    /// Switch serial device; an open session on the old one is closed
    pub fn set_port(&mut self, port: &str) -> Result<(), ConfigError> {
        config::validate_port(port)?;
        self.transport.set_address(port);
        self.config.port = port.to_string();
        Ok(())
    }

    pub fn set_feedrate(&mut self, feedrate: u32) -> Result<(), ConfigError> {
        self.config.feedrate = config::validate_feedrate(feedrate)?;
        Ok(())
    }

    pub fn set_hardware_enabled(&mut self, enabled: bool) {
        if enabled != self.config.hardware_enabled {
            info!("Hardware control {}", if enabled { "enabled" } else { "disabled" });
        }
        self.transport.set_enabled(enabled);
        self.config.hardware_enabled = enabled;
    }

    pub fn set_response_timeout(&mut self, timeout: Duration) {
        self.transport.set_timeout(timeout);
        self.config.response_timeout = timeout;
    }

    pub fn set_steps_per_unit(&mut self, axis: Axis, value: f64) -> Result<(), ConfigError> {
        let value = config::validate_steps_per_unit(axis, value)?;
        self.config.steps_per_unit.set(axis, value);
        self.bindings.set_steps_per_unit(axis, value);
        Ok(())
    }

    /// Apply a batch of settings; nothing changes if any of them is invalid
    pub fn apply_config(&mut self, update: &ConfigUpdate) -> Result<(), ConfigError> {
        update.validate()?;

        if let Some(ref port) = update.port {
            self.set_port(port)?;
        }
        if let Some(feedrate) = update.feedrate {
            self.set_feedrate(feedrate)?;
        }
        if let Some(enabled) = update.hardware_enabled {
            self.set_hardware_enabled(enabled);
        }
        if let Some(ms) = update.response_timeout_ms {
            self.set_response_timeout(Duration::from_millis(ms));
        }
        if let Some(ref steps) = update.steps_per_unit {
            for axis in Axis::ALL {
                if let Some(value) = steps.get(axis) {
                    self.set_steps_per_unit(axis, value)?;
                }
            }
        }
        Ok(())
    }
}
