use crate::{Result, ServoError, ServoLink, STS_BAUD_RATE};
use serialport::{ClearBuffer, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;

/// `serialport`-backed transport (USB-serial adapter on the servo chain).
pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    /// Open `path` at the standard STS baud rate.
    pub fn open(path: &str) -> Result<Self> {
        let port = serialport::new(path, STS_BAUD_RATE)
            .timeout(Duration::from_millis(200))
            .open()
            .map_err(|e| ServoError::Io(format!("{path}: {e}")))?;
        Ok(Self { port })
    }
}

impl ServoLink for SerialLink {
    fn transmit(&mut self, bytes: &[u8]) -> Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<()> {
        self.port.read_exact(buf)?;
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|e| ServoError::Io(e.to_string()))
    }
}
