//! Two leader arms composed into one logical device.
//!
//! The composite owns both children, silences their individual key
//! listeners and is the single source of start/reset signals. State and
//! limits are merged under `left`/`right` keys.

use crate::hotkey::KeyListener;
use crate::leader::So101Leader;
use crate::limits::LimitReport;
use crate::session::{Gate, Session};
use crate::{
    CommandPayload, DeviceCommand, DeviceKind, ResetKind, Result, RobotObservation, TeleopDevice,
    TeleopStep,
};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct BimanualConfig {
    pub left_port: String,
    pub right_port: String,
    pub calibration_dir: PathBuf,
    pub recalibrate: bool,
}

impl Default for BimanualConfig {
    fn default() -> Self {
        Self {
            left_port: "/dev/ttyACM0".to_string(),
            right_port: "/dev/ttyACM1".to_string(),
            calibration_dir: crate::leader::default_calibration_dir(),
            recalibrate: false,
        }
    }
}

/// Bimanual SO-101 leader pair.
pub struct BiSo101Leader {
    left: So101Leader,
    right: So101Leader,
    session: Session,
    _listener: KeyListener,
}

impl BiSo101Leader {
    /// Construct both arms against real hardware, with distinct ports and
    /// calibration file names.
    #[cfg(feature = "serial")]
    pub fn new(config: BimanualConfig) -> Result<Self> {
        use crate::leader::LeaderConfig;
        use tracing::info;

        info!(port = %config.left_port, "connecting left SO-101 leader");
        let left = So101Leader::new(LeaderConfig {
            port: config.left_port.clone(),
            calibration_dir: config.calibration_dir.clone(),
            calibration_file: "left_so101_leader.json".to_string(),
            recalibrate: config.recalibrate,
            verbose: false,
        })?;
        info!(port = %config.right_port, "connecting right SO-101 leader");
        let right = So101Leader::new(LeaderConfig {
            port: config.right_port.clone(),
            calibration_dir: config.calibration_dir,
            calibration_file: "right_so101_leader.json".to_string(),
            recalibrate: config.recalibrate,
            verbose: false,
        })?;
        Ok(Self::from_devices(left, right))
    }

    /// Compose two already-constructed leaders. Their own listeners are
    /// detached immediately.
    pub fn from_devices(left: So101Leader, right: So101Leader) -> Self {
        left.detach_listener();
        right.detach_listener();
        let session = Session::new();
        let listener = {
            let session = session.clone();
            KeyListener::spawn(move |key, pressed| {
                if pressed {
                    session.handle_key(key);
                }
            })
        };
        Self {
            left,
            right,
            session,
            _listener: listener,
        }
    }

    pub fn disconnect(&mut self) -> Result<()> {
        self.left.disconnect()?;
        self.right.disconnect()
    }
}

impl fmt::Display for BiSo101Leader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Bimanual SO-101 leader device for SE(3) control")?;
        writeln!(f, "  start control: B, reset: R, reset and mark success: N")?;
        writeln!(f, "  move both leader arms to drive the followers")
    }
}

impl TeleopDevice for BiSo101Leader {
    fn kind(&self) -> DeviceKind {
        DeviceKind::BiSo101Leader
    }

    fn started(&self) -> bool {
        self.session.started()
    }

    fn advance(&mut self, _observation: &RobotObservation) -> Result<Option<TeleopStep>> {
        match self.session.poll_gate()? {
            Gate::NotStarted => Ok(None),
            Gate::Reset(kind) => Ok(Some(TeleopStep::Reset(kind))),
            Gate::Running => {
                let left = self.left.joint_state()?;
                let right = self.right.joint_state()?;
                Ok(Some(TeleopStep::Command(CommandPayload {
                    source: DeviceKind::BiSo101Leader,
                    command: DeviceCommand::BimanualJoints { left, right },
                    motor_limits: Some(LimitReport::Bimanual {
                        left: self.left.motor_limits().clone(),
                        right: self.right.motor_limits().clone(),
                    }),
                })))
            }
        }
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }

    fn add_reset_hook(&mut self, kind: ResetKind, hook: Box<dyn FnMut() + Send>) {
        self.session.register_hook(kind, hook);
    }
}
