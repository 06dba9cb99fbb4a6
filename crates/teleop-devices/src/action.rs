//! The action/command data model shared by every device variant.
//!
//! Keyboard and gamepad devices emit a [`DeltaAction`]; leader arms emit an
//! absolute [`JointState`]. The two result shapes are kept as explicit
//! variants of [`DeviceCommand`] so the control loop must handle both.

use crate::limits::LimitReport;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{AddAssign, SubAssign};

/// Which hardware variant produced a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Keyboard,
    Gamepad,
    So101Leader,
    BiSo101Leader,
}

impl DeviceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceKind::Keyboard => "keyboard",
            DeviceKind::Gamepad => "gamepad",
            DeviceKind::So101Leader => "so101_leader",
            DeviceKind::BiSo101Leader => "bi_so101_leader",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which reset variant the operator requested.
///
/// `Failure` is the plain reset key (`R`), `Success` additionally marks the
/// episode as successful (`N`). Hooks registered for a variant fire when it
/// is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetKind {
    Failure,
    Success,
}

/// Per-axis input scaling. The three groups are independent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sensitivity {
    pub pos: f32,
    pub rot: f32,
    pub joint: f32,
}

impl Sensitivity {
    /// Standard scaling multiplied by a single operator-chosen factor.
    pub fn scaled(factor: f32) -> Self {
        Self {
            pos: 0.01 * factor,
            rot: 0.15 * factor,
            joint: 0.15 * factor,
        }
    }
}

impl Default for Sensitivity {
    fn default() -> Self {
        Self::scaled(1.0)
    }
}

/// Per-step incremental command: translation (3), Euler XYZ rotation (3),
/// and two extra actuated channels (shoulder-pan delta, gripper delta).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeltaAction(pub [f32; 8]);

impl DeltaAction {
    pub const LEN: usize = 8;
    pub const ZERO: Self = Self([0.0; 8]);

    pub fn translation(&self) -> Vector3<f32> {
        Vector3::new(self.0[0], self.0[1], self.0[2])
    }

    pub fn rotation(&self) -> Vector3<f32> {
        Vector3::new(self.0[3], self.0[4], self.0[5])
    }

    pub fn extras(&self) -> [f32; 2] {
        [self.0[6], self.0[7]]
    }

    pub fn from_parts(translation: Vector3<f32>, rotation: Vector3<f32>, extras: [f32; 2]) -> Self {
        Self([
            translation.x,
            translation.y,
            translation.z,
            rotation.x,
            rotation.y,
            rotation.z,
            extras[0],
            extras[1],
        ])
    }

    pub fn as_array(&self) -> &[f32; 8] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }
}

impl Default for DeltaAction {
    fn default() -> Self {
        Self::ZERO
    }
}

impl AddAssign for DeltaAction {
    fn add_assign(&mut self, rhs: Self) {
        for (slot, v) in self.0.iter_mut().zip(rhs.0) {
            *slot += v;
        }
    }
}

impl SubAssign for DeltaAction {
    fn sub_assign(&mut self, rhs: Self) {
        for (slot, v) in self.0.iter_mut().zip(rhs.0) {
            *slot -= v;
        }
    }
}

/// Named motion primitives shared by the keyboard bindings and the gamepad
/// mapping rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeleopAction {
    Forward,
    Backward,
    Left,
    Right,
    Up,
    Down,
    RotateUp,
    RotateDown,
    RotateLeft,
    RotateRight,
    GripperOpen,
    GripperClose,
}

impl TeleopAction {
    /// Fixed unit contribution of this action, scaled by the sensitivity
    /// group it belongs to. Signs follow the gripper-frame convention of the
    /// arm: forward is −z, up is +x.
    pub fn delta(self, s: &Sensitivity) -> DeltaAction {
        let mut out = [0.0f32; 8];
        match self {
            TeleopAction::Forward => out[2] = -s.pos,
            TeleopAction::Backward => out[2] = s.pos,
            TeleopAction::Left => out[6] = -s.joint,
            TeleopAction::Right => out[6] = s.joint,
            TeleopAction::Up => out[0] = s.pos,
            TeleopAction::Down => out[0] = -s.pos,
            TeleopAction::RotateUp => out[4] = -s.rot,
            TeleopAction::RotateDown => out[4] = s.rot,
            TeleopAction::RotateLeft => out[5] = s.rot,
            TeleopAction::RotateRight => out[5] = -s.rot,
            TeleopAction::GripperOpen => out[7] = s.joint,
            TeleopAction::GripperClose => out[7] = -s.joint,
        }
        DeltaAction(out)
    }
}

/// Absolute joint positions in motor declaration order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JointState(pub Vec<(String, f32)>);

impl JointState {
    pub fn get(&self, joint: &str) -> Option<f32> {
        self.0
            .iter()
            .find(|(name, _)| name == joint)
            .map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, f32)> + '_ {
        self.0.iter()
    }
}

impl FromIterator<(String, f32)> for JointState {
    fn from_iter<I: IntoIterator<Item = (String, f32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The two result shapes a device can produce, tagged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCommand {
    /// Frame-transformed incremental command (keyboard, gamepad).
    Delta(DeltaAction),
    /// Absolute joint state of a single leader arm.
    Joints(JointState),
    /// Absolute joint states of a bimanual pair.
    BimanualJoints { left: JointState, right: JointState },
}

/// Motion payload handed to the control loop on a running step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPayload {
    pub source: DeviceKind,
    pub command: DeviceCommand,
    /// Present for leader devices, absent for delta devices.
    pub motor_limits: Option<LimitReport>,
}

/// Per-step device output. `advance()` returns `None` while the device has
/// never been started, so "not yet engaged" stays distinguishable from
/// "engaged, no motion".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeleopStep {
    /// A reset was requested; no motion is emitted this step.
    Reset(ResetKind),
    Command(CommandPayload),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_release_is_exact_inverse() {
        let s = Sensitivity::default();
        let mut accum = DeltaAction::ZERO;
        accum += TeleopAction::Forward.delta(&s);
        accum += TeleopAction::GripperOpen.delta(&s);
        accum -= TeleopAction::Forward.delta(&s);
        accum -= TeleopAction::GripperOpen.delta(&s);
        assert_eq!(accum, DeltaAction::ZERO);
    }

    #[test]
    fn test_release_order_does_not_matter() {
        let s = Sensitivity::scaled(2.0);
        let mut a = DeltaAction::ZERO;
        let mut b = DeltaAction::ZERO;
        for action in [TeleopAction::Up, TeleopAction::RotateLeft, TeleopAction::Right] {
            a += action.delta(&s);
            b += action.delta(&s);
        }
        a -= TeleopAction::Up.delta(&s);
        a -= TeleopAction::RotateLeft.delta(&s);
        b -= TeleopAction::RotateLeft.delta(&s);
        b -= TeleopAction::Up.delta(&s);
        assert_eq!(a, b);
    }

    #[test]
    fn test_forward_moves_negative_z() {
        let s = Sensitivity::default();
        let delta = TeleopAction::Forward.delta(&s);
        assert_eq!(delta.0[2], -0.01);
        assert_eq!(delta.0[0], 0.0);
        assert_eq!(delta.0[1], 0.0);
        assert_eq!(delta.rotation(), Vector3::zeros());
    }

    #[test]
    fn test_sensitivity_groups_are_independent() {
        let s = Sensitivity::scaled(1.0);
        assert_eq!(TeleopAction::Up.delta(&s).0[0], 0.01);
        assert_eq!(TeleopAction::RotateDown.delta(&s).0[4], 0.15);
        assert_eq!(TeleopAction::Left.delta(&s).0[6], -0.15);
    }

    #[test]
    fn test_step_payload_serializes() {
        let step = TeleopStep::Command(CommandPayload {
            source: DeviceKind::Keyboard,
            command: DeviceCommand::Delta(DeltaAction::ZERO),
            motor_limits: None,
        });
        let json = serde_json::to_string(&step).unwrap();
        let back: TeleopStep = serde_json::from_str(&json).unwrap();
        assert_eq!(back, step);
    }
}
