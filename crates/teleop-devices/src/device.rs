//! The capability interface every device variant conforms to.

use crate::{DeviceKind, ResetKind, Result, TeleopStep};
use nalgebra::UnitQuaternion;

/// What the environment hands the device layer each control tick: the
/// current absolute orientations of the tool frame and the robot root.
/// Delta devices rotate their command through these; leader arms ignore
/// them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobotObservation {
    pub frame_orientation: UnitQuaternion<f32>,
    pub root_orientation: UnitQuaternion<f32>,
}

impl Default for RobotObservation {
    fn default() -> Self {
        Self {
            frame_orientation: UnitQuaternion::identity(),
            root_orientation: UnitQuaternion::identity(),
        }
    }
}

/// A teleoperation input device driven by the owning control loop.
///
/// `advance` is called once per control step and never blocks on operator
/// input; the only blocking inside it is the hardware round trip of leader
/// arms. `Ok(None)` is the no-command sentinel meaning the device has never
/// been started.
pub trait TeleopDevice {
    fn kind(&self) -> DeviceKind;

    /// Whether the operator has started the session.
    fn started(&self) -> bool;

    /// Compute this step's output. Not-started and reset-pending are part
    /// of the normal return contract, not errors.
    fn advance(&mut self, observation: &RobotObservation) -> Result<Option<TeleopStep>>;

    /// Clear accumulated input state.
    fn reset(&mut self);

    /// Register a hook fired synchronously when the given reset variant is
    /// requested (e.g. to record an episode outcome).
    fn add_reset_hook(&mut self, kind: ResetKind, hook: Box<dyn FnMut() + Send>);
}
