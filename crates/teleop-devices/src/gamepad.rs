//! Gamepad teleoperation with an instantaneous accumulator.
//!
//! Every step drains the event queue (contents discarded, only current
//! state matters), captures a fresh [`ControllerSnapshot`] and rebuilds the
//! delta from zero: holding a stick produces output only while held.

use crate::hotkey::KeyListener;
use crate::session::{Gate, Session};
use crate::transform::delta_to_root_frame;
use crate::{
    CommandPayload, DeltaAction, DeviceCommand, DeviceError, DeviceKind, ResetKind, Result,
    RobotObservation, Sensitivity, TeleopAction, TeleopDevice, TeleopStep,
};
use gilrs::{Axis, Button, GamepadId, Gilrs};
use std::collections::HashMap;
use std::fmt;
use tracing::info;

/// Index layout of a supported controller family. The connected pad's name
/// is matched case-insensitively against `family`.
#[derive(Debug, Clone, Copy)]
pub struct GamepadMapping {
    pub family: &'static str,
    pub buttons: &'static [(&'static str, usize)],
    pub axes: &'static [(&'static str, usize)],
    pub hats: &'static [(&'static str, (i8, i8))],
}

/// Xbox-family layout. Axis conventions follow the family's raw report:
/// stick Y is positive when pulled back, triggers rest at −1 and reach +1
/// fully pressed.
pub const XBOX_MAPPING: GamepadMapping = GamepadMapping {
    family: "xbox",
    buttons: &[
        ("A", 0),
        ("B", 1),
        ("X", 2),
        ("Y", 3),
        ("LB", 4),
        ("RB", 5),
        ("L", 9),
        ("R", 10),
    ],
    axes: &[
        ("L_X", 0),
        ("L_Y", 1),
        ("LT", 2),
        ("R_X", 3),
        ("R_Y", 4),
        ("RT", 5),
    ],
    hats: &[
        ("UP", (0, 1)),
        ("DOWN", (0, -1)),
        ("LEFT", (-1, 0)),
        ("RIGHT", (1, 0)),
    ],
};

impl GamepadMapping {
    fn button_index(&self, control: &str) -> Option<usize> {
        self.buttons
            .iter()
            .find(|(name, _)| *name == control)
            .map(|(_, idx)| *idx)
    }

    fn axis_index(&self, control: &str) -> Option<usize> {
        self.axes
            .iter()
            .find(|(name, _)| *name == control)
            .map(|(_, idx)| *idx)
    }

    fn hat_direction(&self, control: &str) -> Option<(i8, i8)> {
        self.hats
            .iter()
            .find(|(name, _)| *name == control)
            .map(|(_, dir)| *dir)
    }
}

/// Immutable per-poll capture of the controller state.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSnapshot {
    pub buttons: Vec<bool>,
    pub axes: Vec<f32>,
    pub hats: Vec<(i8, i8)>,
}

impl ControllerSnapshot {
    /// Resolve whether `control` is active and positively-signed.
    ///
    /// Buttons are always active with the pressed state as sign; axes are
    /// active when nonzero after the deadzone, with `> 0` as sign (reverse
    /// inverts it); hats are active when deflected, with equality to the
    /// mapped direction as sign.
    pub fn lookup(
        &self,
        mapping: &GamepadMapping,
        control: &str,
        reverse: bool,
    ) -> Result<(bool, bool)> {
        if let Some(idx) = mapping.button_index(control) {
            let pressed = self.buttons.get(idx).copied().unwrap_or(false);
            Ok((true, pressed))
        } else if let Some(idx) = mapping.axis_index(control) {
            let value = self.axes.get(idx).copied().unwrap_or(0.0);
            let positive = value > 0.0;
            Ok((value != 0.0, if reverse { !positive } else { positive }))
        } else if let Some(direction) = mapping.hat_direction(control) {
            let hat = self.hats.first().copied().unwrap_or((0, 0));
            Ok((hat != (0, 0), hat == direction))
        } else {
            Err(DeviceError::UnknownMappingKey(control.to_string()))
        }
    }
}

/// Strict-threshold deadzone: a reading survives only if its magnitude
/// exceeds `deadzone`.
pub(crate) fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() > deadzone {
        value
    } else {
        0.0
    }
}

/// Fixed `(action, control, reverse)` rows evaluated in order each step.
const INPUT_ROWS: [(TeleopAction, &str, bool); 12] = [
    (TeleopAction::Forward, "L_Y", true),
    (TeleopAction::Backward, "L_Y", false),
    (TeleopAction::Left, "L_X", true),
    (TeleopAction::Right, "L_X", false),
    (TeleopAction::Up, "R_Y", true),
    (TeleopAction::Down, "R_Y", false),
    (TeleopAction::RotateUp, "LB", false),
    (TeleopAction::RotateDown, "LT", false),
    (TeleopAction::RotateLeft, "R_X", true),
    (TeleopAction::RotateRight, "R_X", false),
    (TeleopAction::GripperOpen, "RT", false),
    (TeleopAction::GripperClose, "RB", false),
];

fn accumulate(
    snapshot: &ControllerSnapshot,
    mapping: &GamepadMapping,
    table: &HashMap<TeleopAction, DeltaAction>,
) -> Result<DeltaAction> {
    let mut accum = DeltaAction::ZERO;
    for (action, control, reverse) in INPUT_ROWS {
        let (active, positive) = snapshot.lookup(mapping, control, reverse)?;
        if active && positive {
            if let Some(delta) = table.get(&action) {
                accum += *delta;
            }
        }
    }
    Ok(accum)
}

#[derive(Debug, Clone)]
pub struct GamepadConfig {
    pub sensitivity: f32,
    pub deadzone: f32,
    pub mapping: GamepadMapping,
    pub verbose: bool,
}

impl Default for GamepadConfig {
    fn default() -> Self {
        Self {
            sensitivity: 1.0,
            deadzone: 0.5,
            mapping: XBOX_MAPPING,
            verbose: true,
        }
    }
}

/// Gamepad device for single-arm SE(3) control.
pub struct GamepadDevice {
    session: Session,
    _listener: KeyListener,
    gilrs: Gilrs,
    pad: GamepadId,
    mapping: GamepadMapping,
    deadzone: f32,
    table: HashMap<TeleopAction, DeltaAction>,
}

/// gilrs buttons in xbox-family index order (indices 6..=8 are back, start
/// and guide, unused by the mapping rows but present in the snapshot).
const SNAPSHOT_BUTTONS: [Button; 11] = [
    Button::South,
    Button::East,
    Button::West,
    Button::North,
    Button::LeftTrigger,
    Button::RightTrigger,
    Button::Select,
    Button::Start,
    Button::Mode,
    Button::LeftThumb,
    Button::RightThumb,
];

impl GamepadDevice {
    /// Fails fast when no pad is connected or the connected pad is not of
    /// the mapped family.
    pub fn new(config: GamepadConfig) -> Result<Self> {
        let gilrs = Gilrs::new()
            .map_err(|e| DeviceError::HardwareAbsent(format!("gamepad subsystem: {e}")))?;
        let (pad, name) = gilrs
            .gamepads()
            .next()
            .map(|(id, pad)| (id, pad.name().to_string()))
            .ok_or_else(|| {
                DeviceError::HardwareAbsent(
                    "no gamepad detected; connect a gamepad and try again".to_string(),
                )
            })?;
        if !name.to_lowercase().contains(config.mapping.family) {
            return Err(DeviceError::UnsupportedHardware(format!(
                "{name}: only {} family pads are supported",
                config.mapping.family
            )));
        }

        let sensitivity = Sensitivity::scaled(config.sensitivity);
        let table = INPUT_ROWS
            .iter()
            .map(|(action, _, _)| (*action, action.delta(&sensitivity)))
            .collect();
        let session = Session::new();
        let listener = {
            let session = session.clone();
            KeyListener::spawn(move |key, pressed| {
                if pressed {
                    session.handle_key(key);
                }
            })
        };
        let device = Self {
            session,
            _listener: listener,
            gilrs,
            pad,
            mapping: config.mapping,
            deadzone: config.deadzone,
            table,
        };
        if config.verbose {
            info!(pad = %name, "{device}");
        }
        Ok(device)
    }

    /// Drain pending events and capture the current state.
    fn snapshot(&mut self) -> ControllerSnapshot {
        while self.gilrs.next_event().is_some() {}
        let pad = self.gilrs.gamepad(self.pad);
        let buttons = SNAPSHOT_BUTTONS
            .iter()
            .map(|button| pad.is_pressed(*button))
            .collect();
        // gilrs reports stick up as positive; the family table expects the
        // raw down-positive report, so Y axes are negated. Triggers come
        // back 0..1 and are widened to the rest-at-minus-one convention.
        let trigger = |button: Button| {
            let raw = pad.button_data(button).map_or(0.0, |d| d.value());
            raw * 2.0 - 1.0
        };
        let axes = vec![
            apply_deadzone(pad.value(Axis::LeftStickX), self.deadzone),
            apply_deadzone(-pad.value(Axis::LeftStickY), self.deadzone),
            apply_deadzone(trigger(Button::LeftTrigger2), self.deadzone),
            apply_deadzone(pad.value(Axis::RightStickX), self.deadzone),
            apply_deadzone(-pad.value(Axis::RightStickY), self.deadzone),
            apply_deadzone(trigger(Button::RightTrigger2), self.deadzone),
        ];
        let hat_x = pad.is_pressed(Button::DPadRight) as i8 - pad.is_pressed(Button::DPadLeft) as i8;
        let hat_y = pad.is_pressed(Button::DPadUp) as i8 - pad.is_pressed(Button::DPadDown) as i8;
        ControllerSnapshot {
            buttons,
            axes,
            hats: vec![(hat_x, hat_y)],
        }
    }
}

impl fmt::Display for GamepadDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Gamepad controller for single-arm SE(3) control")?;
        writeln!(f, "  start control: B, reset: R, reset and mark success: N")?;
        writeln!(f, "  forward/backward: left stick Y, left/right: left stick X")?;
        writeln!(f, "  up/down: right stick Y, yaw: right stick X")?;
        writeln!(f, "  pitch: LB/LT, gripper open/close: RT/RB")
    }
}

impl TeleopDevice for GamepadDevice {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Gamepad
    }

    fn started(&self) -> bool {
        self.session.started()
    }

    fn advance(&mut self, observation: &RobotObservation) -> Result<Option<TeleopStep>> {
        match self.session.poll_gate()? {
            Gate::NotStarted => Ok(None),
            Gate::Reset(kind) => Ok(Some(TeleopStep::Reset(kind))),
            Gate::Running => {
                let snapshot = self.snapshot();
                let delta = accumulate(&snapshot, &self.mapping, &self.table)?;
                let delta = delta_to_root_frame(
                    &delta,
                    &observation.frame_orientation,
                    &observation.root_orientation,
                );
                Ok(Some(TeleopStep::Command(CommandPayload {
                    source: DeviceKind::Gamepad,
                    command: DeviceCommand::Delta(delta),
                    motor_limits: None,
                })))
            }
        }
    }

    fn reset(&mut self) {
        // Nothing latched: the accumulator is rebuilt from the snapshot
        // every step.
    }

    fn add_reset_hook(&mut self, kind: ResetKind, hook: Box<dyn FnMut() + Send>) {
        self.session.register_hook(kind, hook);
    }
}
