// Motor control module for the four-axis arm
//
// Provides:
// - Line-oriented serial transport with ack waits and timeouts
// - Pose transition -> scripted G-code moves per axis

pub mod translator;
pub mod transport;

pub use translator::{
    apply_transition, compute_step_delta, AxisBinding, AxisBindings, BindingError, MoveCommand,
    STEP_MAGNITUDE,
};
pub use transport::{LinePort, PortOpener, SerialOpener, Transport, TransportError};
