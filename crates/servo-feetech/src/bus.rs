//! Blocking motor bus for one STS servo chain.
//!
//! All operations are synchronous round trips on the serial link; the caller
//! stalls for the duration of the exchange. The bus holds the link only
//! while connected, and dropping the bus (or calling [`FeetechBus::disconnect`])
//! releases the underlying handle.

use crate::protocol::{instruction_packet, parse_status_packet, Instruction, StatusPacket, BROADCAST_ID};
use crate::registers::OPERATING_MODE_POSITION;
use crate::{
    decode_sign_magnitude, encode_sign_magnitude, CalibrationSet, Encoding, Register, Result,
    ServoError, ServoLink, STS_HALF_TURN,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Servo model on the chain. Determines encoder resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServoModel {
    Sts3215,
    Scs0009,
}

impl ServoModel {
    pub fn resolution(self) -> u32 {
        match self {
            ServoModel::Sts3215 => 4096,
            ServoModel::Scs0009 => 1024,
        }
    }
}

/// How a motor's calibrated range maps onto the normalized output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormMode {
    /// Calibrated min..max onto −100..100 (arm joints).
    RangeM100To100,
    /// Calibrated min..max onto 0..100 (gripper).
    Range0To100,
}

/// One motor slot on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Motor {
    pub id: u8,
    pub model: ServoModel,
    pub norm: NormMode,
}

impl Motor {
    pub fn new(id: u8, model: ServoModel, norm: NormMode) -> Self {
        Self { id, model, norm }
    }
}

pub struct FeetechBus {
    port: String,
    motors: Vec<(String, Motor)>,
    calibration: Option<CalibrationSet>,
    link: Option<Box<dyn ServoLink>>,
}

impl FeetechBus {
    pub fn new(
        port: impl Into<String>,
        motors: Vec<(String, Motor)>,
        calibration: Option<CalibrationSet>,
    ) -> Self {
        Self {
            port: port.into(),
            motors,
            calibration,
            link: None,
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn motor_names(&self) -> Vec<String> {
        self.motors.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Open the configured serial port and attach to the chain.
    #[cfg(feature = "serial")]
    pub fn connect(&mut self) -> Result<()> {
        let link = crate::SerialLink::open(&self.port)?;
        self.attach(Box::new(link))
    }

    /// Attach an already-open transport, verifying every configured motor
    /// answers a ping.
    pub fn attach(&mut self, mut link: Box<dyn ServoLink>) -> Result<()> {
        if self.is_connected() {
            return Err(ServoError::AlreadyConnected);
        }
        link.drain()?;
        self.link = Some(link);
        let ids: Vec<u8> = self.motors.iter().map(|(_, m)| m.id).collect();
        for id in ids {
            if let Err(e) = self.ping(id) {
                // Release the link before reporting so a failed attach
                // leaves the bus disconnected.
                self.link = None;
                warn!(id, error = %e, "servo did not answer ping");
                return Err(ServoError::PingFailed(id));
            }
        }
        info!(port = %self.port, motors = self.motors.len(), "servo bus connected");
        Ok(())
    }

    pub fn disconnect(&mut self) -> Result<()> {
        if self.link.take().is_none() {
            return Err(ServoError::NotConnected);
        }
        info!(port = %self.port, "servo bus disconnected");
        Ok(())
    }

    pub fn ping(&mut self, id: u8) -> Result<()> {
        let packet = instruction_packet(id, Instruction::Ping, &[]);
        self.link_mut()?.transmit(&packet)?;
        let status = self.read_status()?;
        if status.id != id {
            return Err(ServoError::InvalidPacket("ping answered by wrong id"));
        }
        Ok(())
    }

    /// Write a register value to one motor and wait for its acknowledgement.
    pub fn write(&mut self, register: Register, motor: &str, value: i32) -> Result<()> {
        let id = self.motor_id(motor)?;
        let mut params = vec![register.address()];
        params.extend_from_slice(&encode_value(register, value));
        let packet = instruction_packet(id, Instruction::Write, &params);
        debug!(motor, register = ?register, value, "bus write");
        self.link_mut()?.transmit(&packet)?;
        self.read_status()?;
        Ok(())
    }

    /// Read one register from one motor.
    pub fn read(&mut self, register: Register, motor: &str) -> Result<i32> {
        let id = self.motor_id(motor)?;
        let packet = instruction_packet(
            id,
            Instruction::Read,
            &[register.address(), register.width()],
        );
        self.link_mut()?.transmit(&packet)?;
        let status = self.read_status()?;
        decode_params(register, &status)
    }

    /// Read one register from every motor in declaration order with a single
    /// sync-read instruction. Returns raw (unnormalized) values.
    pub fn sync_read(&mut self, register: Register) -> Result<Vec<(String, i32)>> {
        let roster: Vec<(String, u8)> = self
            .motors
            .iter()
            .map(|(name, m)| (name.clone(), m.id))
            .collect();
        let mut params = vec![register.address(), register.width()];
        params.extend(roster.iter().map(|(_, id)| *id));
        let packet = instruction_packet(BROADCAST_ID, Instruction::SyncRead, &params);
        self.link_mut()?.transmit(&packet)?;

        let mut out = Vec::with_capacity(roster.len());
        for (name, id) in roster {
            let status = self.read_status()?;
            if status.id != id {
                return Err(ServoError::InvalidPacket("sync read reply out of order"));
            }
            out.push((name, decode_params(register, &status)?));
        }
        Ok(out)
    }

    /// Present positions for all motors, normalized through the calibrated
    /// ranges. This is the per-step blocking read of a leader arm.
    pub fn sync_read_normalized(&mut self) -> Result<Vec<(String, f32)>> {
        let raw = self.sync_read(Register::PresentPosition)?;
        raw.into_iter()
            .map(|(name, value)| {
                let normalized = self.normalize(&name, value)?;
                Ok((name, normalized))
            })
            .collect()
    }

    pub fn enable_torque(&mut self) -> Result<()> {
        self.write_all(Register::TorqueEnable, 1)
    }

    pub fn disable_torque(&mut self) -> Result<()> {
        self.write_all(Register::TorqueEnable, 0)
    }

    /// One-time configure writes pushed on every connect: answer immediately
    /// and lift the factory acceleration caps.
    pub fn configure_motors(&mut self) -> Result<()> {
        self.write_all(Register::ReturnDelayTime, 0)?;
        self.write_all(Register::MaximumAcceleration, 254)?;
        self.write_all(Register::Acceleration, 254)
    }

    pub fn set_position_mode(&mut self) -> Result<()> {
        self.write_all(Register::OperatingMode, OPERATING_MODE_POSITION)
    }

    /// Push a calibration to the servos (homing offsets and position limits)
    /// and adopt it for normalization.
    pub fn write_calibration(&mut self, set: &CalibrationSet) -> Result<()> {
        let names = self.motor_names();
        for name in names {
            let record = set
                .get(&name)
                .ok_or_else(|| ServoError::UnknownMotor(name.clone()))?
                .clone();
            self.write(Register::HomingOffset, &name, record.homing_offset)?;
            self.write(Register::MinPositionLimit, &name, record.range_min)?;
            self.write(Register::MaxPositionLimit, &name, record.range_max)?;
        }
        self.calibration = Some(set.clone());
        Ok(())
    }

    /// Record the half-turn homing offset of every motor.
    ///
    /// The arm must already be held at the middle of its range. Offsets are
    /// cleared first so the captured positions are raw encoder readings.
    pub fn set_half_turn_homings(&mut self) -> Result<Vec<(String, i32)>> {
        let names = self.motor_names();
        for name in &names {
            self.write(Register::HomingOffset, name, 0)?;
        }
        let mut offsets = Vec::with_capacity(names.len());
        for name in &names {
            let present = self.read(Register::PresentPosition, name)?;
            let offset = present - STS_HALF_TURN;
            self.write(Register::HomingOffset, name, offset)?;
            offsets.push((name.clone(), offset));
        }
        info!("homing offsets recorded");
        Ok(offsets)
    }

    /// Continuously sample positions until `stop` is raised, tracking the
    /// min and max seen per motor. Blocks for the whole sweep.
    pub fn record_ranges_of_motion(
        &mut self,
        stop: &AtomicBool,
    ) -> Result<(Vec<(String, i32)>, Vec<(String, i32)>)> {
        let first = self.sync_read(Register::PresentPosition)?;
        let mut mins = first.clone();
        let mut maxes = first;
        while !stop.load(Ordering::Relaxed) {
            let sample = self.sync_read(Register::PresentPosition)?;
            for (slot, (_, value)) in mins.iter_mut().zip(sample.iter()) {
                slot.1 = slot.1.min(*value);
            }
            for (slot, (_, value)) in maxes.iter_mut().zip(sample.iter()) {
                slot.1 = slot.1.max(*value);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        info!("ranges of motion recorded");
        Ok((mins, maxes))
    }

    /// Map a raw position onto the motor's normalized range.
    pub fn normalize(&self, motor: &str, raw: i32) -> Result<f32> {
        let (_, slot) = self
            .motors
            .iter()
            .find(|(name, _)| name == motor)
            .ok_or_else(|| ServoError::UnknownMotor(motor.to_string()))?;
        let record = self
            .calibration
            .as_ref()
            .and_then(|c| c.get(motor))
            .ok_or_else(|| ServoError::Calibration(format!("no calibration for {motor}")))?;
        let span = record.range_max - record.range_min;
        if span <= 0 {
            return Err(ServoError::Calibration(format!(
                "empty calibrated range for {motor}"
            )));
        }
        let fraction = (raw - record.range_min) as f32 / span as f32;
        Ok(match slot.norm {
            NormMode::RangeM100To100 => fraction * 200.0 - 100.0,
            NormMode::Range0To100 => fraction * 100.0,
        })
    }

    fn motor_id(&self, motor: &str) -> Result<u8> {
        self.motors
            .iter()
            .find(|(name, _)| name == motor)
            .map(|(_, m)| m.id)
            .ok_or_else(|| ServoError::UnknownMotor(motor.to_string()))
    }

    fn write_all(&mut self, register: Register, value: i32) -> Result<()> {
        let names = self.motor_names();
        for name in names {
            self.write(register, &name, value)?;
        }
        Ok(())
    }

    fn link_mut(&mut self) -> Result<&mut Box<dyn ServoLink>> {
        self.link.as_mut().ok_or(ServoError::NotConnected)
    }

    fn read_status(&mut self) -> Result<StatusPacket> {
        let link = self.link_mut()?;
        let mut head = [0u8; 4];
        link.receive(&mut head)?;
        let length = head[3] as usize;
        let mut tail = vec![0u8; length];
        link.receive(&mut tail)?;
        let mut raw = head.to_vec();
        raw.extend(tail);
        let status = parse_status_packet(&raw)?;
        if status.error != 0 {
            warn!(id = status.id, flags = status.error, "servo fault flags set");
            return Err(ServoError::ServoFault {
                id: status.id,
                flags: status.error,
            });
        }
        Ok(status)
    }
}

fn encode_value(register: Register, value: i32) -> Vec<u8> {
    let raw = match register.encoding() {
        Encoding::Unsigned => value as u16,
        Encoding::SignMagnitude(bit) => encode_sign_magnitude(value, bit),
    };
    if register.width() == 1 {
        vec![raw as u8]
    } else {
        raw.to_le_bytes().to_vec()
    }
}

fn decode_params(register: Register, status: &StatusPacket) -> Result<i32> {
    let raw = match (register.width(), status.params.as_slice()) {
        (1, [b]) => *b as u16,
        (2, [lo, hi]) => u16::from_le_bytes([*lo, *hi]),
        _ => return Err(ServoError::InvalidPacket("unexpected parameter count")),
    };
    Ok(match register.encoding() {
        Encoding::Unsigned => raw as i32,
        Encoding::SignMagnitude(bit) => decode_sign_magnitude(raw, bit),
    })
}

impl Drop for FeetechBus {
    fn drop(&mut self) {
        // Dropping the link closes the port; nothing on the wire to undo.
        self.link = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MockLink, MotorCalibration};

    fn status_reply(id: u8, params: &[u8]) -> Vec<u8> {
        let mut raw = vec![0xFF, 0xFF, id, params.len() as u8 + 2, 0x00];
        raw.extend_from_slice(params);
        let sum: u32 = raw[2..].iter().map(|b| *b as u32).sum();
        raw.push(!(sum as u8));
        raw
    }

    fn two_motor_bus() -> FeetechBus {
        let motors = vec![
            (
                "shoulder_pan".to_string(),
                Motor::new(1, ServoModel::Sts3215, NormMode::RangeM100To100),
            ),
            (
                "gripper".to_string(),
                Motor::new(2, ServoModel::Sts3215, NormMode::Range0To100),
            ),
        ];
        let mut calibration = CalibrationSet::default();
        calibration.insert(
            "shoulder_pan",
            MotorCalibration {
                id: 1,
                drive_mode: 0,
                homing_offset: 0,
                range_min: 1000,
                range_max: 3000,
            },
        );
        calibration.insert(
            "gripper",
            MotorCalibration {
                id: 2,
                drive_mode: 0,
                homing_offset: 0,
                range_min: 2000,
                range_max: 2400,
            },
        );
        FeetechBus::new("mock0", motors, Some(calibration))
    }

    fn attached(bus: &mut FeetechBus) -> crate::mock::MockTap {
        let link = MockLink::new();
        let tap = link.tap();
        link.push_reply(&status_reply(1, &[]));
        link.push_reply(&status_reply(2, &[]));
        bus.attach(Box::new(link)).unwrap();
        tap
    }

    #[test]
    fn test_attach_pings_every_motor() {
        let mut bus = two_motor_bus();
        let tap = attached(&mut bus);
        let sent = tap.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], instruction_packet(1, Instruction::Ping, &[]));
        assert_eq!(sent[1], instruction_packet(2, Instruction::Ping, &[]));
        assert!(bus.is_connected());
    }

    #[test]
    fn test_attach_twice_is_already_connected() {
        let mut bus = two_motor_bus();
        attached(&mut bus);
        let another = MockLink::new();
        assert!(matches!(
            bus.attach(Box::new(another)),
            Err(ServoError::AlreadyConnected)
        ));
    }

    #[test]
    fn test_failed_ping_leaves_bus_disconnected() {
        let mut bus = two_motor_bus();
        let link = MockLink::new();
        link.push_reply(&status_reply(1, &[]));
        // No reply for id 2.
        assert!(matches!(
            bus.attach(Box::new(link)),
            Err(ServoError::PingFailed(2))
        ));
        assert!(!bus.is_connected());
    }

    #[test]
    fn test_operations_require_connection() {
        let mut bus = two_motor_bus();
        assert!(matches!(
            bus.sync_read(Register::PresentPosition),
            Err(ServoError::NotConnected)
        ));
        assert!(matches!(bus.disconnect(), Err(ServoError::NotConnected)));
    }

    #[test]
    fn test_sync_read_normalized_maps_calibrated_range() {
        let mut bus = two_motor_bus();
        let tap = attached(&mut bus);
        // shoulder_pan at range max, gripper at range midpoint.
        tap.push_reply(&status_reply(1, &3000u16.to_le_bytes()));
        tap.push_reply(&status_reply(2, &2200u16.to_le_bytes()));
        let positions = bus.sync_read_normalized().unwrap();
        assert_eq!(positions[0].0, "shoulder_pan");
        assert!((positions[0].1 - 100.0).abs() < 1e-4);
        assert_eq!(positions[1].0, "gripper");
        assert!((positions[1].1 - 50.0).abs() < 1e-4);
    }

    #[test]
    fn test_sync_read_sends_single_instruction() {
        let mut bus = two_motor_bus();
        let tap = attached(&mut bus);
        tap.push_reply(&status_reply(1, &[0, 0]));
        tap.push_reply(&status_reply(2, &[0, 0]));
        bus.sync_read(Register::PresentPosition).unwrap();
        let sent = tap.sent();
        // Two pings from attach, then exactly one sync-read packet.
        assert_eq!(sent.len(), 3);
        assert_eq!(
            sent[2],
            instruction_packet(BROADCAST_ID, Instruction::SyncRead, &[56, 2, 1, 2])
        );
    }

    #[test]
    fn test_write_encodes_homing_offset_sign_magnitude() {
        let mut bus = two_motor_bus();
        let tap = attached(&mut bus);
        tap.push_reply(&status_reply(1, &[]));
        bus.write(Register::HomingOffset, "shoulder_pan", -100).unwrap();
        let sent = tap.sent();
        let expected_raw = encode_sign_magnitude(-100, 11).to_le_bytes();
        assert_eq!(
            sent[2],
            instruction_packet(
                1,
                Instruction::Write,
                &[31, expected_raw[0], expected_raw[1]]
            )
        );
    }

    #[test]
    fn test_servo_fault_flags_propagate() {
        let mut bus = two_motor_bus();
        let tap = attached(&mut bus);
        let mut raw = vec![0xFF, 0xFF, 0x01, 0x02, 0x24];
        let sum: u32 = raw[2..].iter().map(|b| *b as u32).sum();
        raw.push(!(sum as u8));
        tap.push_reply(&raw);
        assert!(matches!(
            bus.read(Register::PresentPosition, "shoulder_pan"),
            Err(ServoError::ServoFault { id: 1, flags: 0x24 })
        ));
    }

    #[test]
    fn test_half_turn_homing_offsets() {
        let mut bus = two_motor_bus();
        let tap = attached(&mut bus);
        // Clear-offset acks.
        tap.push_reply(&status_reply(1, &[]));
        tap.push_reply(&status_reply(2, &[]));
        // Present positions, then write acks, interleaved per motor.
        tap.push_reply(&status_reply(1, &2147u16.to_le_bytes()));
        tap.push_reply(&status_reply(1, &[]));
        tap.push_reply(&status_reply(2, &1947u16.to_le_bytes()));
        tap.push_reply(&status_reply(2, &[]));
        let offsets = bus.set_half_turn_homings().unwrap();
        assert_eq!(offsets[0], ("shoulder_pan".to_string(), 100));
        assert_eq!(offsets[1], ("gripper".to_string(), -100));
    }

    #[test]
    fn test_normalize_rejects_empty_range() {
        let motors = vec![(
            "j".to_string(),
            Motor::new(1, ServoModel::Sts3215, NormMode::RangeM100To100),
        )];
        let mut calibration = CalibrationSet::default();
        calibration.insert(
            "j",
            MotorCalibration {
                id: 1,
                drive_mode: 0,
                homing_offset: 0,
                range_min: 500,
                range_max: 500,
            },
        );
        let bus = FeetechBus::new("mock0", motors, Some(calibration));
        assert!(bus.normalize("j", 500).is_err());
    }
}
