//! Keyboard teleoperation with a latched accumulator.
//!
//! Press adds the bound action's delta into the accumulator, release
//! subtracts the identical vector, so the accumulator is a linear sum and
//! any press/release pair nets to zero regardless of interleaving. The
//! accumulator persists across steps until an opposing key event arrives
//! (unlike the gamepad, which rebuilds from zero every step).

use crate::hotkey::KeyListener;
use crate::session::{Gate, Session};
use crate::transform::delta_to_root_frame;
use crate::{
    CommandPayload, DeltaAction, DeviceCommand, DeviceError, DeviceKind, ResetKind, Result,
    RobotObservation, Sensitivity, TeleopAction, TeleopDevice, TeleopStep,
};
use rdev::Key;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Key-to-action table. Immutable once the device is built.
#[derive(Debug, Clone)]
pub struct KeyBindings(pub Vec<(Key, TeleopAction)>);

impl Default for KeyBindings {
    fn default() -> Self {
        Self(vec![
            (Key::KeyW, TeleopAction::Forward),
            (Key::KeyS, TeleopAction::Backward),
            (Key::KeyA, TeleopAction::Left),
            (Key::KeyD, TeleopAction::Right),
            (Key::KeyQ, TeleopAction::Up),
            (Key::KeyE, TeleopAction::Down),
            (Key::KeyK, TeleopAction::RotateUp),
            (Key::KeyI, TeleopAction::RotateDown),
            (Key::KeyJ, TeleopAction::RotateLeft),
            (Key::KeyL, TeleopAction::RotateRight),
            (Key::KeyU, TeleopAction::GripperOpen),
            (Key::KeyO, TeleopAction::GripperClose),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct KeyboardConfig {
    pub sensitivity: f32,
    pub bindings: KeyBindings,
    /// Log the control summary at construction.
    pub verbose: bool,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            sensitivity: 1.0,
            bindings: KeyBindings::default(),
            verbose: true,
        }
    }
}

#[derive(Default)]
struct KeyboardShared {
    accum: DeltaAction,
    /// Keys currently down, to filter OS auto-repeat presses.
    held: HashSet<Key>,
}

#[derive(Clone)]
struct KeyboardCore {
    session: Session,
    shared: Arc<Mutex<KeyboardShared>>,
    table: Arc<HashMap<Key, DeltaAction>>,
}

impl KeyboardCore {
    fn handle(&self, key: Key, pressed: bool) {
        if pressed {
            self.session.handle_key(key);
        }
        if let Some(delta) = self.table.get(&key) {
            if let Ok(mut shared) = self.shared.lock() {
                if pressed {
                    if shared.held.insert(key) {
                        shared.accum += *delta;
                    }
                } else if shared.held.remove(&key) {
                    shared.accum -= *delta;
                }
            }
        }
    }
}

/// Keyboard device for single-arm SE(3) control.
pub struct KeyboardDevice {
    core: KeyboardCore,
    _listener: KeyListener,
}

impl KeyboardDevice {
    pub fn new(config: KeyboardConfig) -> Self {
        let sensitivity = Sensitivity::scaled(config.sensitivity);
        let table: HashMap<Key, DeltaAction> = config
            .bindings
            .0
            .iter()
            .map(|(key, action)| (*key, action.delta(&sensitivity)))
            .collect();
        let core = KeyboardCore {
            session: Session::new(),
            shared: Arc::new(Mutex::new(KeyboardShared::default())),
            table: Arc::new(table),
        };
        let listener = {
            let core = core.clone();
            KeyListener::spawn(move |key, pressed| core.handle(key, pressed))
        };
        let device = Self {
            core,
            _listener: listener,
        };
        if config.verbose {
            info!("{device}");
        }
        device
    }

    /// Feed one key edge directly, bypassing the OS hook (tests, replays).
    pub(crate) fn handle_key(&self, key: Key, pressed: bool) {
        self.core.handle(key, pressed);
    }

    fn accumulator(&self) -> Result<DeltaAction> {
        self.core
            .shared
            .lock()
            .map(|shared| shared.accum)
            .map_err(|_| DeviceError::PoisonedLock)
    }
}

impl fmt::Display for KeyboardDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Keyboard controller for single-arm SE(3) control")?;
        writeln!(f, "  start control: B, reset: R, reset and mark success: N")?;
        writeln!(f, "  forward/backward: W/S, left/right: A/D, up/down: Q/E")?;
        writeln!(f, "  pitch: K/I, yaw: J/L, gripper open/close: U/O")
    }
}

impl TeleopDevice for KeyboardDevice {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Keyboard
    }

    fn started(&self) -> bool {
        self.core.session.started()
    }

    fn advance(&mut self, observation: &RobotObservation) -> Result<Option<TeleopStep>> {
        match self.core.session.poll_gate()? {
            Gate::NotStarted => Ok(None),
            Gate::Reset(kind) => Ok(Some(TeleopStep::Reset(kind))),
            Gate::Running => {
                let delta = delta_to_root_frame(
                    &self.accumulator()?,
                    &observation.frame_orientation,
                    &observation.root_orientation,
                );
                Ok(Some(TeleopStep::Command(CommandPayload {
                    source: DeviceKind::Keyboard,
                    command: DeviceCommand::Delta(delta),
                    motor_limits: None,
                })))
            }
        }
    }

    fn reset(&mut self) {
        if let Ok(mut shared) = self.core.shared.lock() {
            shared.accum = DeltaAction::ZERO;
        }
    }

    fn add_reset_hook(&mut self, kind: ResetKind, hook: Box<dyn FnMut() + Send>) {
        self.core.session.register_hook(kind, hook);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_device() -> KeyboardDevice {
        KeyboardDevice::new(KeyboardConfig {
            verbose: false,
            ..KeyboardConfig::default()
        })
    }

    fn command_delta(step: Option<TeleopStep>) -> DeltaAction {
        match step {
            Some(TeleopStep::Command(payload)) => match payload.command {
                DeviceCommand::Delta(delta) => delta,
                other => panic!("unexpected command: {other:?}"),
            },
            other => panic!("expected command step, got {other:?}"),
        }
    }

    #[test]
    fn test_sentinel_before_start() {
        let mut device = quiet_device();
        device.handle_key(Key::KeyW, true);
        assert!(device.advance(&RobotObservation::default()).unwrap().is_none());
    }

    #[test]
    fn test_press_then_release_across_steps() {
        let mut device = quiet_device();
        let obs = RobotObservation::default();
        device.handle_key(Key::KeyB, true);

        device.handle_key(Key::KeyW, true);
        let first = command_delta(device.advance(&obs).unwrap());
        assert_eq!(first.0[2], -0.01);
        assert!(first.0.iter().enumerate().all(|(i, v)| i == 2 || *v == 0.0));

        device.handle_key(Key::KeyW, false);
        let second = command_delta(device.advance(&obs).unwrap());
        assert_eq!(second, DeltaAction::ZERO);
    }

    #[test]
    fn test_accumulator_is_latched_between_steps() {
        let mut device = quiet_device();
        let obs = RobotObservation::default();
        device.handle_key(Key::KeyB, true);
        device.handle_key(Key::KeyU, true);
        let first = command_delta(device.advance(&obs).unwrap());
        let second = command_delta(device.advance(&obs).unwrap());
        assert_eq!(first, second);
        assert_eq!(first.0[7], 0.15);
    }

    #[test]
    fn test_interleaved_release_order() {
        let mut device = quiet_device();
        let obs = RobotObservation::default();
        device.handle_key(Key::KeyB, true);
        device.handle_key(Key::KeyW, true);
        device.handle_key(Key::KeyA, true);
        // Release in the opposite order they were pressed.
        device.handle_key(Key::KeyW, false);
        device.handle_key(Key::KeyA, false);
        assert_eq!(command_delta(device.advance(&obs).unwrap()), DeltaAction::ZERO);
    }

    #[test]
    fn test_auto_repeat_press_counted_once() {
        let mut device = quiet_device();
        let obs = RobotObservation::default();
        device.handle_key(Key::KeyB, true);
        device.handle_key(Key::KeyQ, true);
        device.handle_key(Key::KeyQ, true);
        device.handle_key(Key::KeyQ, true);
        let delta = command_delta(device.advance(&obs).unwrap());
        assert_eq!(delta.0[0], 0.01);
        device.handle_key(Key::KeyQ, false);
        assert_eq!(command_delta(device.advance(&obs).unwrap()), DeltaAction::ZERO);
    }

    #[test]
    fn test_reset_key_emits_reset_step_once() {
        let mut device = quiet_device();
        let obs = RobotObservation::default();
        device.handle_key(Key::KeyB, true);
        device.handle_key(Key::KeyR, true);
        assert_eq!(
            device.advance(&obs).unwrap(),
            Some(TeleopStep::Reset(ResetKind::Failure))
        );
        assert!(device.advance(&obs).unwrap().is_none());
    }

    #[test]
    fn test_reset_zeroes_accumulator() {
        let mut device = quiet_device();
        let obs = RobotObservation::default();
        device.handle_key(Key::KeyB, true);
        device.handle_key(Key::KeyS, true);
        device.reset();
        assert_eq!(command_delta(device.advance(&obs).unwrap()), DeltaAction::ZERO);
    }
}
