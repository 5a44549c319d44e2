//! RS-232/USB transport backed by the `serialport` crate.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};
use xystage_traits::{Connector, SerialLink};

use crate::error::HwError;
use crate::util::read_frame_with_timeout;

/// Per-read timeout handed to the OS driver; the frame deadline is enforced
/// separately so a slow device cannot stall a read forever.
const READ_SLICE: Duration = Duration::from_millis(20);

pub struct SerialPortLink {
    port: Box<dyn SerialPort>,
}

impl SerialPortLink {
    /// Open `port` as 8N1 at `baud_rate`.
    pub fn open(port: &str, baud_rate: u32) -> Result<Self, HwError> {
        let port = serialport::new(port, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(READ_SLICE)
            .open()
            .map_err(|e| HwError::Open(format!("{port}: {e}")))?;
        Ok(Self { port })
    }
}

impl SerialLink for SerialPortLink {
    fn write_all(&mut self, frame: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.port.write_all(frame).map_err(HwError::Io)?;
        self.port.flush().map_err(HwError::Io)?;
        Ok(())
    }

    fn read_until(
        &mut self,
        terminator: u8,
        timeout: Duration,
    ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
        let port = &mut self.port;
        let frame = read_frame_with_timeout(|buf| port.read(buf), terminator, timeout)?;
        Ok(frame)
    }

    fn clear_input(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|e| HwError::Serial(e.to_string()))?;
        Ok(())
    }
}

/// Opens real serial ports.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialPortConnector;

impl Connector for SerialPortConnector {
    fn open(
        &self,
        port: &str,
        baud_rate: u32,
        _timeout: Duration,
    ) -> Result<Box<dyn SerialLink>, Box<dyn std::error::Error + Send + Sync>> {
        let link = SerialPortLink::open(port, baud_rate)?;
        tracing::info!(port, baud_rate, "serial port opened");
        Ok(Box::new(link))
    }
}
