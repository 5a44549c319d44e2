use std::io::ErrorKind;
use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Pull bytes from `read` until `terminator` is seen or `timeout` expires.
///
/// `read` follows `std::io::Read::read` semantics. `TimedOut`, `WouldBlock`
/// and `Interrupted` are treated as "nothing yet" and retried until the
/// deadline; a zero-length read means the peer closed the link.
/// The returned frame includes the terminator.
pub fn read_frame_with_timeout(
    mut read: impl FnMut(&mut [u8]) -> std::io::Result<usize>,
    terminator: u8,
    timeout: Duration,
) -> Result<Vec<u8>> {
    let deadline = Instant::now() + timeout;
    let mut frame = Vec::with_capacity(32);
    let mut byte = [0u8; 1];
    loop {
        match read(&mut byte) {
            Ok(0) => return Err(HwError::Closed),
            Ok(_) => {
                frame.push(byte[0]);
                if byte[0] == terminator {
                    return Ok(frame);
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) => {}
            Err(e) => return Err(HwError::Io(e)),
        }
        if Instant::now() >= deadline {
            return Err(HwError::Timeout);
        }
    }
}
