// Message types exchanged with clients over the request surface

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical arm axes, in the order moves are issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Rotate,
    Extend,
    Elevate,
    Pinch,
}

impl Axis {
    pub const ALL: [Axis; 4] = [Axis::Rotate, Axis::Extend, Axis::Elevate, Axis::Pinch];

    pub fn name(self) -> &'static str {
        match self {
            Axis::Rotate => "rotate",
            Axis::Extend => "extend",
            Axis::Elevate => "elevate",
            Axis::Pinch => "pinch",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Target position of the arm. Rotation/elevation in degrees, extension/pinch in percent.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub rotate: f64,
    pub extend: f64,
    pub elevate: f64,
    pub pinch: f64,
}

impl Pose {
    pub const ZERO: Pose = Pose {
        rotate: 0.0,
        extend: 0.0,
        elevate: 0.0,
        pinch: 0.0,
    };

    pub fn new(rotate: f64, extend: f64, elevate: f64, pinch: f64) -> Self {
        Self {
            rotate,
            extend,
            elevate,
            pinch,
        }
    }

    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Rotate => self.rotate,
            Axis::Extend => self.extend,
            Axis::Elevate => self.elevate,
            Axis::Pinch => self.pinch,
        }
    }

    /// Returns a new pose with the given fields replaced
    pub fn merged(&self, update: &PoseUpdate) -> Pose {
        Pose {
            rotate: update.rotate.unwrap_or(self.rotate),
            extend: update.extend.unwrap_or(self.extend),
            elevate: update.elevate.unwrap_or(self.elevate),
            pinch: update.pinch.unwrap_or(self.pinch),
        }
    }
}

// Partial pose from a client; missing fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseUpdate {
    #[serde(default)]
    pub rotate: Option<f64>,
    #[serde(default)]
    pub extend: Option<f64>,
    #[serde(default)]
    pub elevate: Option<f64>,
    #[serde(default)]
    pub pinch: Option<f64>,
}

impl From<Pose> for PoseUpdate {
    fn from(pose: Pose) -> Self {
        Self {
            rotate: Some(pose.rotate),
            extend: Some(pose.extend),
            elevate: Some(pose.elevate),
            pinch: Some(pose.pinch),
        }
    }
}

/// Result of driving one axis during a transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AxisOutcome {
    /// No delta, nothing sent
    Unchanged,
    /// Hardware control disabled
    Skipped,
    Succeeded { steps: i32 },
    Failed { reason: String },
}

impl AxisOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, AxisOutcome::Failed { .. })
    }
}

impl fmt::Display for AxisOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisOutcome::Unchanged => f.write_str("unchanged"),
            AxisOutcome::Skipped => f.write_str("skipped"),
            AxisOutcome::Succeeded { steps } => write!(f, "succeeded ({} steps)", steps),
            AxisOutcome::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisReport {
    pub axis: Axis,
    #[serde(flatten)]
    pub outcome: AxisOutcome,
}

/// Per-axis outcomes of one transition, in move order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitionReport {
    pub axes: Vec<AxisReport>,
}

impl TransitionReport {
    pub fn push(&mut self, axis: Axis, outcome: AxisOutcome) {
        self.axes.push(AxisReport { axis, outcome });
    }

    pub fn outcome(&self, axis: Axis) -> Option<&AxisOutcome> {
        self.axes.iter().find(|r| r.axis == axis).map(|r| &r.outcome)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AxisReport> {
        self.axes.iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepsPerUnitUpdate {
    #[serde(default)]
    pub rotate: Option<f64>,
    #[serde(default)]
    pub extend: Option<f64>,
    #[serde(default)]
    pub elevate: Option<f64>,
    #[serde(default)]
    pub pinch: Option<f64>,
}

impl StepsPerUnitUpdate {
    pub fn get(&self, axis: Axis) -> Option<f64> {
        match axis {
            Axis::Rotate => self.rotate,
            Axis::Extend => self.extend,
            Axis::Elevate => self.elevate,
            Axis::Pinch => self.pinch,
        }
    }
}

// Runtime configuration change; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default)]
    pub feedrate: Option<u32>,
    #[serde(default)]
    pub hardware_enabled: Option<bool>,
    #[serde(default)]
    pub response_timeout_ms: Option<u64>,
    #[serde(default)]
    pub steps_per_unit: Option<StepsPerUnitUpdate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkCommand {
    Connect,
    Disconnect,
}

/// Published after every pose change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateReply {
    pub status: ReplyStatus,
    pub state: Pose,
    #[serde(default)]
    pub outcomes: TransitionReport,
}

/// Health status published by runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReply {
    pub status: ReplyStatus,
    pub message: String,
    pub connected: bool,
    pub hardware_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReply {
    pub status: ReplyStatus,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Success,
    Healthy,
    Error,
}
