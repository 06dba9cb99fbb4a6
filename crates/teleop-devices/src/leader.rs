//! SO-101 leader arm: an absolute-state device over the Feetech bus.
//!
//! Unlike the keyboard and gamepad, a leader arm does not accumulate
//! deltas; each step performs a blocking read of every joint's present
//! position and reports it as an absolute `JointState`. That read is the
//! dominant latency source of the control loop.

use crate::hotkey::KeyListener;
use crate::limits::{so101_follower_limits, LimitReport, MotorLimits};
use crate::session::{Gate, Session};
use crate::{
    CommandPayload, DeviceCommand, DeviceError, DeviceKind, JointState, ResetKind, Result,
    RobotObservation, TeleopDevice, TeleopStep, SINGLE_ARM_JOINT_NAMES,
};
use servo_feetech::{FeetechBus, Motor, NormMode, ServoModel};
use std::fmt;
use std::path::PathBuf;
use tracing::info;

/// Calibration files live here unless the caller overrides the directory.
pub fn default_calibration_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("teleop")
        .join("calibration")
}

#[derive(Debug, Clone)]
pub struct LeaderConfig {
    pub port: String,
    pub calibration_dir: PathBuf,
    /// File name the calibration persists under; distinct per physical arm.
    pub calibration_file: String,
    /// Force the interactive calibration procedure even if a file exists.
    pub recalibrate: bool,
    pub verbose: bool,
}

impl Default for LeaderConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            calibration_dir: default_calibration_dir(),
            calibration_file: "so101_leader.json".to_string(),
            recalibrate: false,
            verbose: true,
        }
    }
}

/// The six STS3215 motors of an SO-101 leader, in bus order.
pub fn so101_leader_motors() -> Vec<(String, Motor)> {
    SINGLE_ARM_JOINT_NAMES
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let norm = if *name == "gripper" {
                NormMode::Range0To100
            } else {
                NormMode::RangeM100To100
            };
            (
                (*name).to_string(),
                Motor::new(index as u8 + 1, ServoModel::Sts3215, norm),
            )
        })
        .collect()
}

/// SO-101 leader device.
pub struct So101Leader {
    session: Session,
    listener: KeyListener,
    bus: FeetechBus,
    limits: MotorLimits,
}

impl So101Leader {
    /// Construct against real hardware. Runs the interactive calibration
    /// procedure first when no calibration file exists for the configured
    /// name (or when recalibration is forced), then connects and configures
    /// the bus.
    #[cfg(feature = "serial")]
    pub fn new(config: LeaderConfig) -> Result<Self> {
        let store = servo_feetech::CalibrationStore::new(&config.calibration_dir);
        if config.recalibrate || !store.exists(&config.calibration_file) {
            Self::calibrate(&config)?;
        }
        let calibration = store.load(&config.calibration_file)?;
        let mut bus = FeetechBus::new(&config.port, so101_leader_motors(), Some(calibration.clone()));
        bus.connect()?;
        let mut device = Self::with_bus(bus, config.verbose)?;
        device.bus.write_calibration(&calibration)?;
        Ok(device)
    }

    /// Wrap an already-connected bus (injected transports, tests). Pushes
    /// the configure writes but not the calibration, which the bus may
    /// already carry.
    pub fn with_bus(bus: FeetechBus, verbose: bool) -> Result<Self> {
        if !bus.is_connected() {
            return Err(DeviceError::NotConnected);
        }
        let session = Session::new();
        let listener = {
            let session = session.clone();
            KeyListener::spawn(move |key, pressed| {
                if pressed {
                    session.handle_key(key);
                }
            })
        };
        let mut device = Self {
            session,
            listener,
            bus,
            limits: so101_follower_limits(),
        };
        device.configure()?;
        if verbose {
            info!("{device}");
        }
        Ok(device)
    }

    /// Run the operator-guided calibration procedure and persist the
    /// result, overwriting any prior file of the same name. Blocking and
    /// interactive; never called from the step loop.
    #[cfg(feature = "serial")]
    pub fn calibrate(config: &LeaderConfig) -> Result<servo_feetech::CalibrationSet> {
        use servo_feetech::{CalibrationSet, CalibrationStore, MotorCalibration};
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let store = CalibrationStore::new(&config.calibration_dir);
        let mut bus = FeetechBus::new(&config.port, so101_leader_motors(), None);
        bus.connect()?;
        info!(port = %config.port, "running SO-101 leader calibration");
        bus.disable_torque()?;
        bus.set_position_mode()?;

        prompt_enter("Move the arm to the middle of its range of motion and press ENTER...")?;
        let homings = bus.set_half_turn_homings()?;

        println!("Move every joint through its full range of motion.");
        println!("Recording positions; press ENTER to stop...");
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        std::thread::spawn(move || {
            let mut line = String::new();
            let _ = std::io::stdin().read_line(&mut line);
            flag.store(true, Ordering::Relaxed);
        });
        let (mins, maxes) = bus.record_ranges_of_motion(&stop)?;

        let mut set = CalibrationSet::default();
        for (name, motor) in so101_leader_motors() {
            set.insert(
                name.clone(),
                MotorCalibration {
                    id: motor.id,
                    drive_mode: 0,
                    homing_offset: find_reading(&homings, &name)?,
                    range_min: find_reading(&mins, &name)?,
                    range_max: find_reading(&maxes, &name)?,
                },
            );
        }
        bus.write_calibration(&set)?;
        store.save(&config.calibration_file, &set)?;
        bus.disconnect()?;
        Ok(set)
    }

    /// Connect protocol: torque off (the leader is moved by hand), then the
    /// per-joint configure and operating-mode writes.
    fn configure(&mut self) -> Result<()> {
        self.bus.disable_torque()?;
        self.bus.configure_motors()?;
        self.bus.set_position_mode()?;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.bus.is_connected()
    }

    #[cfg(feature = "serial")]
    pub fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(DeviceError::AlreadyConnected);
        }
        self.bus.connect()?;
        self.configure()
    }

    pub fn disconnect(&mut self) -> Result<()> {
        if !self.is_connected() {
            return Err(DeviceError::NotConnected);
        }
        self.bus.disconnect()?;
        info!("SO-101 leader disconnected");
        Ok(())
    }

    pub fn motor_limits(&self) -> &MotorLimits {
        &self.limits
    }

    /// Suppress this device's own key listener (the bimanual composite is
    /// then the single source of start/reset signals).
    pub(crate) fn detach_listener(&self) {
        self.listener.detach();
    }

    /// Blocking read of every joint's present position, normalized.
    pub(crate) fn joint_state(&mut self) -> Result<JointState> {
        Ok(self.bus.sync_read_normalized()?.into_iter().collect())
    }
}

impl fmt::Display for So101Leader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SO-101 leader device for SE(3) control")?;
        writeln!(f, "  start control: B, reset: R, reset and mark success: N")?;
        writeln!(f, "  move the leader arm to drive the follower")?;
        writeln!(
            f,
            "  if the follower drifts out of sync, rerun with recalibration forced"
        )
    }
}

impl TeleopDevice for So101Leader {
    fn kind(&self) -> DeviceKind {
        DeviceKind::So101Leader
    }

    fn started(&self) -> bool {
        self.session.started()
    }

    fn advance(&mut self, _observation: &RobotObservation) -> Result<Option<TeleopStep>> {
        match self.session.poll_gate()? {
            Gate::NotStarted => Ok(None),
            Gate::Reset(kind) => Ok(Some(TeleopStep::Reset(kind))),
            Gate::Running => {
                let joints = self.joint_state()?;
                Ok(Some(TeleopStep::Command(CommandPayload {
                    source: DeviceKind::So101Leader,
                    command: DeviceCommand::Joints(joints),
                    motor_limits: Some(LimitReport::Single(self.limits.clone())),
                })))
            }
        }
    }

    fn reset(&mut self) {
        // Absolute-state device: nothing accumulates between steps.
    }

    fn add_reset_hook(&mut self, kind: ResetKind, hook: Box<dyn FnMut() + Send>) {
        self.session.register_hook(kind, hook);
    }
}

#[cfg(feature = "serial")]
fn prompt_enter(message: &str) -> Result<()> {
    use std::io::Write;
    print!("{message}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(())
}

#[cfg(feature = "serial")]
fn find_reading(readings: &[(String, i32)], name: &str) -> Result<i32> {
    readings
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| *v)
        .ok_or_else(|| DeviceError::Servo(servo_feetech::ServoError::UnknownMotor(name.to_string())))
}

#[cfg(all(test, feature = "mock"))]
pub(crate) mod test_support {
    use super::*;
    use servo_feetech::{CalibrationSet, MockLink, MockTap, MotorCalibration};

    pub fn status_reply(id: u8, params: &[u8]) -> Vec<u8> {
        let mut raw = vec![0xFF, 0xFF, id, params.len() as u8 + 2, 0x00];
        raw.extend_from_slice(params);
        let sum: u32 = raw[2..].iter().map(|b| *b as u32).sum();
        raw.push(!(sum as u8));
        raw
    }

    pub fn uniform_calibration() -> CalibrationSet {
        let mut set = CalibrationSet::default();
        for (name, motor) in so101_leader_motors() {
            set.insert(
                name,
                MotorCalibration {
                    id: motor.id,
                    drive_mode: 0,
                    homing_offset: 0,
                    range_min: 1000,
                    range_max: 3000,
                },
            );
        }
        set
    }

    /// A leader over a scripted mock link, with handshake and configure
    /// acks already consumed.
    pub fn mock_leader() -> (So101Leader, MockTap) {
        let mut bus = FeetechBus::new(
            "mock0",
            so101_leader_motors(),
            Some(uniform_calibration()),
        );
        let link = MockLink::new();
        let tap = link.tap();
        for id in 1..=6u8 {
            link.push_reply(&status_reply(id, &[]));
        }
        bus.attach(Box::new(link)).unwrap();
        // Acks for the five configure write rounds (torque, return delay,
        // max accel, accel, operating mode), one per motor each.
        for _ in 0..5 {
            for id in 1..=6u8 {
                tap.push_reply(&status_reply(id, &[]));
            }
        }
        let leader = So101Leader::with_bus(bus, false).unwrap();
        (leader, tap)
    }

    /// Queue position replies putting every joint at raw `position`.
    pub fn push_positions(tap: &MockTap, position: u16) {
        for id in 1..=6u8 {
            tap.push_reply(&status_reply(id, &position.to_le_bytes()));
        }
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_sentinel_before_start_performs_no_bus_traffic() {
        let (mut leader, tap) = mock_leader();
        let before = tap.sent().len();
        assert!(leader.advance(&RobotObservation::default()).unwrap().is_none());
        assert_eq!(tap.sent().len(), before);
    }

    #[test]
    fn test_advance_reads_absolute_joint_state() {
        let (mut leader, tap) = mock_leader();
        leader.session.begin();
        push_positions(&tap, 2000); // midpoint of every calibrated range
        let step = leader.advance(&RobotObservation::default()).unwrap();
        match step {
            Some(TeleopStep::Command(payload)) => {
                assert_eq!(payload.source, DeviceKind::So101Leader);
                assert!(matches!(payload.motor_limits, Some(LimitReport::Single(_))));
                match payload.command {
                    DeviceCommand::Joints(joints) => {
                        assert_eq!(joints.len(), 6);
                        assert_eq!(joints.0[0].0, "shoulder_pan");
                        assert!((joints.get("elbow_flex").unwrap() - 0.0).abs() < 1e-4);
                        // Gripper normalizes onto 0..100, so the midpoint
                        // reads 50.
                        assert!((joints.get("gripper").unwrap() - 50.0).abs() < 1e-4);
                    }
                    other => panic!("expected joint state, got {other:?}"),
                }
            }
            other => panic!("expected command step, got {other:?}"),
        }
    }

    #[test]
    fn test_reset_step_skips_hardware_read() {
        let (mut leader, tap) = mock_leader();
        leader.session.begin();
        leader.session.request_reset(ResetKind::Success);
        let before = tap.sent().len();
        assert_eq!(
            leader.advance(&RobotObservation::default()).unwrap(),
            Some(TeleopStep::Reset(ResetKind::Success))
        );
        assert_eq!(tap.sent().len(), before);
    }

    #[test]
    fn test_disconnect_contract() {
        let (mut leader, _tap) = mock_leader();
        assert!(leader.is_connected());
        leader.disconnect().unwrap();
        assert!(matches!(
            leader.disconnect(),
            Err(DeviceError::NotConnected)
        ));
    }

    #[test]
    fn test_with_bus_rejects_disconnected_bus() {
        let bus = FeetechBus::new("mock0", so101_leader_motors(), None);
        assert!(matches!(
            So101Leader::with_bus(bus, false),
            Err(DeviceError::NotConnected)
        ));
    }
}
