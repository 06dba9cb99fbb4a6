//! servo-feetech: serial bus access to Feetech STS-series servos
//!
//! This crate speaks the half-duplex instruction/status protocol used by
//! STS3215 bus servos (the motors in SO-100/SO-101 leader arms). It provides
//! the wire codec, a register table, a blocking `FeetechBus` with a
//! connect/disconnect lifecycle, and per-motor calibration records with JSON
//! persistence. The default build enables a `mock` transport so binaries and
//! tests compile on any host without hardware; the `serial` feature adds a
//! `serialport`-backed transport.

mod error;
pub use error::{Result, ServoError};

mod protocol;
pub use protocol::{
    decode_sign_magnitude, encode_sign_magnitude, instruction_packet, parse_status_packet,
    Instruction, StatusPacket,
};

mod registers;
pub use registers::{Encoding, Register};

mod link;
pub use link::ServoLink;

#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "mock")]
pub use mock::{MockLink, MockTap};

#[cfg(feature = "serial")]
mod serial;
#[cfg(feature = "serial")]
pub use serial::SerialLink;

mod bus;
pub use bus::{FeetechBus, Motor, NormMode, ServoModel};

mod calibration;
pub use calibration::{CalibrationSet, CalibrationStore, MotorCalibration};

/// Encoder resolution of an STS3215 (ticks per revolution).
pub const STS_RESOLUTION: u32 = 4096;

/// Raw encoder reading at the half-turn position, used as the homing target.
pub const STS_HALF_TURN: i32 = (STS_RESOLUTION as i32 - 1) / 2;

/// Default baud rate for an STS servo chain.
pub const STS_BAUD_RATE: u32 = 1_000_000;
