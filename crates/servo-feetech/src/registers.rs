//! STS3215 control-table registers used by this crate.

/// How a register's raw bits map to a signed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Plain unsigned little-endian.
    Unsigned,
    /// Sign-magnitude with the sign stored in the given bit.
    SignMagnitude(u8),
}

/// Control-table entries addressed by the bus operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    ReturnDelayTime,
    MinPositionLimit,
    MaxPositionLimit,
    HomingOffset,
    OperatingMode,
    TorqueEnable,
    Acceleration,
    GoalPosition,
    PresentPosition,
    MaximumAcceleration,
}

impl Register {
    /// Control-table address.
    pub fn address(self) -> u8 {
        match self {
            Register::ReturnDelayTime => 7,
            Register::MinPositionLimit => 9,
            Register::MaxPositionLimit => 11,
            Register::HomingOffset => 31,
            Register::OperatingMode => 33,
            Register::TorqueEnable => 40,
            Register::Acceleration => 41,
            Register::GoalPosition => 42,
            Register::PresentPosition => 56,
            Register::MaximumAcceleration => 85,
        }
    }

    /// Width in bytes (1 or 2).
    pub fn width(self) -> u8 {
        match self {
            Register::ReturnDelayTime
            | Register::OperatingMode
            | Register::TorqueEnable
            | Register::Acceleration => 1,
            Register::MinPositionLimit
            | Register::MaxPositionLimit
            | Register::HomingOffset
            | Register::GoalPosition
            | Register::PresentPosition
            | Register::MaximumAcceleration => 2,
        }
    }

    pub fn encoding(self) -> Encoding {
        match self {
            // Offsets and positions can run negative once homed.
            Register::HomingOffset => Encoding::SignMagnitude(11),
            Register::PresentPosition | Register::GoalPosition => Encoding::SignMagnitude(15),
            _ => Encoding::Unsigned,
        }
    }
}

/// Position control mode value for `Register::OperatingMode`.
pub const OPERATING_MODE_POSITION: i32 = 0;
