//! Serial transports for the XY stage controller.
//!
//! - `sim`: an in-process model of a DS102-class controller, used by the CLI
//!   when built without the `hardware` feature and by the test suites.
//! - `serial`: a real RS-232/USB transport on top of the `serialport` crate.
pub mod error;
pub mod sim;
pub mod util;

#[cfg(feature = "hardware")]
pub mod serial;

pub use error::HwError;
pub use sim::{SimDevice, SimulatedConnector, SimulatedLink};

#[cfg(feature = "hardware")]
pub use serial::{SerialPortConnector, SerialPortLink};
