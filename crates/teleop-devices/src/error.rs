use servo_feetech::ServoError;
use thiserror::Error;

pub type Result<T, E = DeviceError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device is not connected")]
    NotConnected,
    #[error("device is already connected")]
    AlreadyConnected,
    #[error("input hardware absent: {0}")]
    HardwareAbsent(String),
    #[error("unsupported input hardware: {0}")]
    UnsupportedHardware(String),
    #[error("unknown mapping key: {0}")]
    UnknownMappingKey(String),
    #[error("input state lock poisoned (listener thread panicked)")]
    PoisonedLock,
    #[error("I/O error: {0}")]
    Io(String),
    #[error(transparent)]
    Servo(#[from] ServoError),
}

impl From<std::io::Error> for DeviceError {
    fn from(e: std::io::Error) -> Self {
        DeviceError::Io(e.to_string())
    }
}
