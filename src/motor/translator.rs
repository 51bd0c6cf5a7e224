// Pose transition -> per-axis relative motor moves
//
// Every changed axis gets the same scripted G-code sequence:
//   G91                      relative positioning
//   M211 S0                  software endstops off
//   G92 X0 Y0 Z0 E0          zero all axis counters
//   G1 <letter><steps> F<f>  the move itself
//   M400                     wait for motion to finish

use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::transport::Transport;
use crate::config::StepsPerUnit;
use crate::messages::{Axis, AxisOutcome, Pose, TransitionReport};

/// Steps issued for any nonzero change, regardless of its size
pub const STEP_MAGNITUDE: i32 = 1750;

#[derive(Debug, Error, PartialEq)]
pub enum BindingError {
    #[error("Motor {motor} has no axis letter configured")]
    UnknownAxisBinding { motor: String },

    #[error("No motor assigned to axis {axis}")]
    MissingAxis { axis: Axis },
}

/// Which motor and firmware letter drive a logical axis
#[derive(Debug, Clone, PartialEq)]
pub struct AxisBinding {
    pub axis: Axis,
    pub motor: String,
    pub letter: char,
    /// Exposed for clients; moves use `STEP_MAGNITUDE` instead
    pub steps_per_unit: f64,
}

/// Bindings for all four axes, in `Axis::ALL` order
#[derive(Debug, Clone, PartialEq)]
pub struct AxisBindings {
    bindings: Vec<AxisBinding>,
}

impl AxisBindings {
    /// Resolve axis -> motor -> letter for every axis
    pub fn new(
        axis_motors: &[(Axis, &str)],
        motor_letters: &[(&str, char)],
        steps_per_unit: &StepsPerUnit,
    ) -> Result<Self, BindingError> {
        let mut bindings = Vec::with_capacity(Axis::ALL.len());

        for axis in Axis::ALL {
            let motor = axis_motors
                .iter()
                .find(|(a, _)| *a == axis)
                .map(|(_, m)| *m)
                .ok_or(BindingError::MissingAxis { axis })?;

            let letter = motor_letters
                .iter()
                .find(|(m, _)| *m == motor)
                .map(|(_, l)| l.to_ascii_uppercase())
                .ok_or_else(|| BindingError::UnknownAxisBinding {
                    motor: motor.to_string(),
                })?;

            bindings.push(AxisBinding {
                axis,
                motor: motor.to_string(),
                letter,
                steps_per_unit: steps_per_unit.get(axis),
            });
        }

        Ok(Self { bindings })
    }

    pub fn get(&self, axis: Axis) -> &AxisBinding {
        &self.bindings[axis_index(axis)]
    }

    pub fn set_steps_per_unit(&mut self, axis: Axis, value: f64) {
        self.bindings[axis_index(axis)].steps_per_unit = value;
    }

    pub fn iter(&self) -> impl Iterator<Item = &AxisBinding> {
        self.bindings.iter()
    }
}

fn axis_index(axis: Axis) -> usize {
    match axis {
        Axis::Rotate => 0,
        Axis::Extend => 1,
        Axis::Elevate => 2,
        Axis::Pinch => 3,
    }
}

/// One relative move for one motor
#[derive(Debug, Clone, PartialEq)]
pub struct MoveCommand {
    pub motor: String,
    pub letter: char,
    pub steps: i32,
    pub feedrate: u32,
}

impl fmt::Display for MoveCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G1 {}{} F{}", self.letter, self.steps, self.feedrate)
    }
}

/// `G92` line zeroing every bound axis, moving axis first
pub fn zero_counters(moving: char, bindings: &AxisBindings) -> String {
    let mut line = format!("G92 {}0", moving);
    for binding in bindings.iter().filter(|b| b.letter != moving) {
        line.push(' ');
        line.push(binding.letter);
        line.push('0');
    }
    line
}

/// Fixed-magnitude step count with the sign of `new - old`
pub fn compute_step_delta(old: f64, new: f64) -> i32 {
    let delta = new - old;
    if delta > 0.0 {
        STEP_MAGNITUDE
    } else if delta < 0.0 {
        -STEP_MAGNITUDE
    } else {
        0
    }
}

/// Drive every changed axis from `old` to `new`.
///
/// Never fails as a whole: each axis gets its own outcome and a failure on
/// one axis does not stop the others from being attempted.
pub fn apply_transition(
    transport: &mut Transport,
    bindings: &AxisBindings,
    feedrate: u32,
    old: &Pose,
    new: &Pose,
) -> TransitionReport {
    let mut report = TransitionReport::default();

    for axis in Axis::ALL {
        let steps = compute_step_delta(old.get(axis), new.get(axis));

        let outcome = if steps == 0 {
            AxisOutcome::Unchanged
        } else if !transport.is_enabled() {
            AxisOutcome::Skipped
        } else {
            let binding = bindings.get(axis);
            let cmd = MoveCommand {
                motor: binding.motor.clone(),
                letter: binding.letter,
                steps,
                feedrate,
            };
            drive_axis(transport, bindings, &cmd)
        };

        match &outcome {
            AxisOutcome::Unchanged => debug!("{}: unchanged", axis),
            AxisOutcome::Skipped => info!("{}: skipped, hardware control disabled", axis),
            AxisOutcome::Succeeded { steps } => info!("{}: moved {} steps", axis, steps),
            AxisOutcome::Failed { reason } => warn!("{}: move failed: {}", axis, reason),
        }
        report.push(axis, outcome);
    }

    report
}

fn drive_axis(transport: &mut Transport, bindings: &AxisBindings, cmd: &MoveCommand) -> AxisOutcome {
    if !transport.is_connected() && !transport.connect() {
        return AxisOutcome::Failed {
            reason: "not connected".to_string(),
        };
    }

    debug!("Moving {} ({}) by {} steps", cmd.motor, cmd.letter, cmd.steps);
    let sequence = [
        "G91".to_string(),
        "M211 S0".to_string(),
        zero_counters(cmd.letter, bindings),
        cmd.to_string(),
        "M400".to_string(),
    ];

    for line in &sequence {
        if !transport.send_line(line) {
            return AxisOutcome::Failed {
                reason: format!("`{}` not acknowledged", line),
            };
        }
    }

    AxisOutcome::Succeeded { steps: cmd.steps }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ArmConfig, AXIS_MOTORS, MOTOR_LETTERS};
    use crate::motor::transport::mock::{self, opened, written};

    fn bindings() -> AxisBindings {
        AxisBindings::new(&AXIS_MOTORS, &MOTOR_LETTERS, &StepsPerUnit::default()).unwrap()
    }

    #[test]
    fn test_step_delta_is_fixed_magnitude() {
        assert_eq!(compute_step_delta(0.0, 0.0), 0);
        assert_eq!(compute_step_delta(12.5, 12.5), 0);
        assert_eq!(compute_step_delta(0.0, 0.1), 1750);
        assert_eq!(compute_step_delta(0.0, 180.0), 1750);
        assert_eq!(compute_step_delta(90.0, 0.0), -1750);
        assert_eq!(compute_step_delta(-10.0, -90.0), -1750);
    }

    #[test]
    fn test_step_delta_sign_matches_delta() {
        let values = [-180.0, -45.5, -1.0, 0.0, 0.25, 50.0, 100.0];
        for &old in &values {
            for &new in &values {
                let steps = compute_step_delta(old, new);
                if old == new {
                    assert_eq!(steps, 0);
                } else {
                    assert_eq!(steps.abs(), STEP_MAGNITUDE);
                    assert_eq!(steps > 0, new > old, "old={} new={}", old, new);
                }
            }
        }
    }

    #[test]
    fn test_default_bindings() {
        let all = bindings();
        let letters: Vec<(Axis, &str, char)> = all
            .iter()
            .map(|b| (b.axis, b.motor.as_str(), b.letter))
            .collect();
        assert_eq!(
            letters,
            vec![
                (Axis::Rotate, "M1", 'X'),
                (Axis::Extend, "M2", 'Y'),
                (Axis::Elevate, "M3", 'Z'),
                (Axis::Pinch, "M4", 'E'),
            ]
        );
        assert_eq!(all.get(Axis::Elevate).steps_per_unit, 400.0);
    }

    #[test]
    fn test_motor_without_letter_is_rejected() {
        let letters = [("M1", 'X'), ("M2", 'Y'), ("M3", 'Z')];
        let err = AxisBindings::new(&AXIS_MOTORS, &letters, &StepsPerUnit::default()).unwrap_err();
        assert_eq!(
            err,
            BindingError::UnknownAxisBinding {
                motor: "M4".to_string()
            }
        );
    }

    #[test]
    fn test_axis_without_motor_is_rejected() {
        let motors = [(Axis::Rotate, "M1"), (Axis::Extend, "M2"), (Axis::Pinch, "M4")];
        let err = AxisBindings::new(&motors, &MOTOR_LETTERS, &StepsPerUnit::default()).unwrap_err();
        assert_eq!(err, BindingError::MissingAxis { axis: Axis::Elevate });
    }

    #[test]
    fn test_gcode_rendering() {
        let b = bindings();
        assert_eq!(zero_counters('X', &b), "G92 X0 Y0 Z0 E0");
        assert_eq!(zero_counters('Z', &b), "G92 Z0 X0 Y0 E0");

        let cmd = MoveCommand {
            motor: "M4".to_string(),
            letter: 'E',
            steps: -1750,
            feedrate: 10_000,
        };
        assert_eq!(cmd.to_string(), "G1 E-1750 F10000");
    }

    #[test]
    fn test_single_axis_sends_full_sequence() {
        let wire = mock::wire();
        let mut transport = mock::transport(&wire, &mock::test_config());

        let old = Pose::ZERO;
        let new = Pose::new(0.0, 30.0, 0.0, 0.0);
        let report = apply_transition(&mut transport, &bindings(), 10_000, &old, &new);

        assert_eq!(
            written(&wire),
            vec!["G91", "M211 S0", "G92 Y0 X0 Z0 E0", "G1 Y1750 F10000", "M400"]
        );
        assert_eq!(report.outcome(Axis::Rotate), Some(&AxisOutcome::Unchanged));
        assert_eq!(
            report.outcome(Axis::Extend),
            Some(&AxisOutcome::Succeeded { steps: 1750 })
        );
        assert_eq!(report.outcome(Axis::Pinch), Some(&AxisOutcome::Unchanged));
    }

    #[test]
    fn test_axes_driven_in_fixed_order() {
        let wire = mock::wire();
        let mut transport = mock::transport(&wire, &mock::test_config());

        let old = Pose::new(10.0, 10.0, 10.0, 10.0);
        let new = Pose::new(0.0, 20.0, 0.0, 20.0);
        apply_transition(&mut transport, &bindings(), 5_000, &old, &new);

        let moves: Vec<String> = written(&wire)
            .into_iter()
            .filter(|l| l.starts_with("G1 "))
            .collect();
        assert_eq!(
            moves,
            vec!["G1 X-1750 F5000", "G1 Y1750 F5000", "G1 Z-1750 F5000", "G1 E1750 F5000"]
        );
        assert_eq!(written(&wire).len(), 20);
    }

    #[test]
    fn test_no_delta_sends_nothing_and_never_connects() {
        let wire = mock::wire();
        let mut transport = mock::transport(&wire, &mock::test_config());

        let pose = Pose::new(45.0, 10.0, -5.0, 50.0);
        for _ in 0..3 {
            let report = apply_transition(&mut transport, &bindings(), 10_000, &pose, &pose);
            assert!(report.iter().all(|r| r.outcome == AxisOutcome::Unchanged));
        }
        assert!(written(&wire).is_empty());
        assert!(opened(&wire).is_empty());
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_disabled_skips_changed_axes() {
        let wire = mock::wire();
        let config = ArmConfig {
            hardware_enabled: false,
            ..mock::test_config()
        };
        let mut transport = mock::transport(&wire, &config);

        let old = Pose::ZERO;
        let new = Pose::new(90.0, 0.0, 15.0, 0.0);
        let report = apply_transition(&mut transport, &bindings(), 10_000, &old, &new);

        assert_eq!(report.outcome(Axis::Rotate), Some(&AxisOutcome::Skipped));
        assert_eq!(report.outcome(Axis::Extend), Some(&AxisOutcome::Unchanged));
        assert_eq!(report.outcome(Axis::Elevate), Some(&AxisOutcome::Skipped));
        assert!(written(&wire).is_empty());
        assert!(opened(&wire).is_empty());
    }

    #[test]
    fn test_unacknowledged_move_fails_only_that_axis() {
        let wire = mock::wire();
        wire.lock().unwrap().silent = vec!["G1 Y".to_string()];
        let mut transport = mock::transport(&wire, &mock::test_config());

        let old = Pose::ZERO;
        let new = Pose::new(10.0, 10.0, 10.0, 0.0);
        let report = apply_transition(&mut transport, &bindings(), 10_000, &old, &new);

        assert_eq!(
            report.outcome(Axis::Rotate),
            Some(&AxisOutcome::Succeeded { steps: 1750 })
        );
        assert!(report.outcome(Axis::Extend).unwrap().is_failed());
        assert_eq!(
            report.outcome(Axis::Elevate),
            Some(&AxisOutcome::Succeeded { steps: 1750 })
        );

        // the failed axis stops right after its G1, no M400 for it
        let lines = written(&wire);
        let g1_y = lines.iter().position(|l| l == "G1 Y1750 F10000").unwrap();
        assert_eq!(lines[g1_y + 1], "G91");
    }

    #[test]
    fn test_open_failure_fails_each_changed_axis() {
        let wire = mock::wire();
        wire.lock().unwrap().fail_open = true;
        let mut transport = mock::transport(&wire, &mock::test_config());

        let report = apply_transition(
            &mut transport,
            &bindings(),
            10_000,
            &Pose::ZERO,
            &Pose::new(1.0, 0.0, 0.0, 1.0),
        );

        let not_connected = AxisOutcome::Failed {
            reason: "not connected".to_string(),
        };
        assert_eq!(report.outcome(Axis::Rotate), Some(&not_connected));
        assert_eq!(report.outcome(Axis::Pinch), Some(&not_connected));
        assert!(written(&wire).is_empty());
    }

    #[test]
    fn test_lost_link_reconnects_for_next_axis() {
        let wire = mock::wire();
        wire.lock().unwrap().write_error = Some("M211".to_string());
        let mut transport = mock::transport(&wire, &mock::test_config());

        let report = apply_transition(
            &mut transport,
            &bindings(),
            10_000,
            &Pose::ZERO,
            &Pose::new(1.0, 1.0, 0.0, 0.0),
        );

        assert!(report.outcome(Axis::Rotate).unwrap().is_failed());
        assert!(report.outcome(Axis::Extend).unwrap().is_failed());
        assert_eq!(opened(&wire).len(), 2);
    }
}
