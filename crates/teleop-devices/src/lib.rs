//! teleop-devices: operator input devices for arm teleoperation
//!
//! Each device variant turns low-level operator input (keyboard, gamepad,
//! or a physical leader arm) into a per-step command for a robot control
//! loop: either a frame-transformed delta pose or an absolute joint state.
//! Devices share one lifecycle contract: the control loop calls
//! [`TeleopDevice::advance`] once per tick, receives `None` until the
//! operator starts the session, a [`TeleopStep::Reset`] exactly once per
//! requested reset, and a [`TeleopStep::Command`] otherwise. Nothing runs
//! outside that call except the key listener threads, which only mutate
//! mutex-guarded accumulators.

mod error;
pub use error::{DeviceError, Result};

mod action;
pub use action::{
    CommandPayload, DeltaAction, DeviceCommand, DeviceKind, JointState, ResetKind, Sensitivity,
    TeleopAction, TeleopStep,
};

mod limits;
pub use limits::{
    bi_arm_joint_names, so101_follower_limits, LimitReport, MotorLimits, SINGLE_ARM_JOINT_NAMES,
};

mod session;
mod hotkey;

mod transform;
pub use transform::{delta_to_root_frame, rotvec_to_euler, ROTVEC_EPS};

mod device;
pub use device::{RobotObservation, TeleopDevice};

mod keyboard;
pub use keyboard::{KeyBindings, KeyboardConfig, KeyboardDevice};

mod gamepad;
pub use gamepad::{ControllerSnapshot, GamepadConfig, GamepadDevice, GamepadMapping, XBOX_MAPPING};

mod leader;
pub use leader::{default_calibration_dir, so101_leader_motors, LeaderConfig, So101Leader};

mod bimanual;
pub use bimanual::{BiSo101Leader, BimanualConfig};
