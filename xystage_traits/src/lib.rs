pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Byte-level serial channel to a stage controller.
///
/// Framing lives above this trait; implementations only move bytes.
pub trait SerialLink: Send {
    fn write_all(&mut self, frame: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Read bytes up to and including `terminator`, or fail once `timeout` elapses.
    fn read_until(
        &mut self,
        terminator: u8,
        timeout: std::time::Duration,
    ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>>;

    /// Discard unread input (stale replies from an aborted exchange).
    fn clear_input(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

/// Opens serial links by port name.
pub trait Connector: Send + Sync {
    fn open(
        &self,
        port: &str,
        baud_rate: u32,
        timeout: std::time::Duration,
    ) -> Result<Box<dyn SerialLink>, Box<dyn std::error::Error + Send + Sync>>;
}
