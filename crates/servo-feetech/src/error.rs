use thiserror::Error;

pub type Result<T, E = ServoError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServoError {
    #[error("bus is not connected")]
    NotConnected,
    #[error("bus is already connected")]
    AlreadyConnected,
    #[error("no servo answered ping on id {0}")]
    PingFailed(u8),
    #[error("unknown motor: {0}")]
    UnknownMotor(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("timeout waiting for servo reply")]
    Timeout,
    #[error("malformed status packet: {0}")]
    InvalidPacket(&'static str),
    #[error("servo {id} reported hardware error flags 0x{flags:02X}")]
    ServoFault { id: u8, flags: u8 },
    #[error("calibration file error: {0}")]
    Calibration(String),
}

impl From<std::io::Error> for ServoError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::TimedOut {
            ServoError::Timeout
        } else {
            ServoError::Io(e.to_string())
        }
    }
}
