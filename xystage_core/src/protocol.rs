//! DS102 ASCII command dialect.
//!
//! Commands are CR-terminated ASCII lines and every command yields exactly one
//! CR-terminated reply. A reply of the form `E` + two digits is a device error.

use std::fmt;

use crate::error::StageError;

/// Line terminator on both directions of the wire.
pub const TERMINATOR: u8 = b'\r';

/// Bits of the `MOTIONA?` reply that belong to the two driven axes.
pub const AXIS_MASK: u32 = 0b11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    pub const BOTH: [Axis; 2] = [Axis::X, Axis::Y];

    /// Controller axis number (1-based).
    pub fn number(self) -> u8 {
        match self {
            Axis::X => 1,
            Axis::Y => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Identify,
    SelectAxis(Axis),
    OriginType(u32),
    SelectSpeed(u32),
    /// Mechanical origin return on the selected axis.
    OriginReturn,
    DriveAbsolute(f64),
    SetPosition(f64),
    SetHomePosition(f64),
    QueryPosition,
    MotionAll,
    /// Immediate stop of every axis.
    EmergencyStop,
}

impl Command {
    /// Wire bytes including the terminator.
    pub fn frame(&self) -> Vec<u8> {
        let mut out = self.to_string().into_bytes();
        out.push(TERMINATOR);
        out
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Identify => f.write_str("*IDN?"),
            Command::SelectAxis(axis) => write!(f, "AXI{}", axis.number()),
            Command::OriginType(t) => write!(f, ":MEMSW0 {t}"),
            Command::SelectSpeed(t) => write!(f, ":SELSP {t}"),
            Command::OriginReturn => f.write_str(":GO 2"),
            Command::DriveAbsolute(v) => write!(f, ":GOABS {}", format_value(*v)),
            Command::SetPosition(v) => write!(f, ":POS {}", format_value(*v)),
            Command::SetHomePosition(v) => write!(f, ":HOMEP {}", format_value(*v)),
            Command::QueryPosition => f.write_str(":POS?"),
            Command::MotionAll => f.write_str("MOTIONA?"),
            Command::EmergencyStop => f.write_str("STOP_0"),
        }
    }
}

/// Shortest decimal rendering of `v` with no trailing zeros (`3`, `12.5`, `-2.24`).
pub fn format_value(v: f64) -> String {
    if v == 0.0 {
        // collapses -0.0 as well
        return "0".to_string();
    }
    format!("{v}")
}

/// Human meaning of a device error code.
pub fn device_error_message(code: &str) -> &'static str {
    match code {
        "E00" => "stage not connected or sensor logic setting error",
        "E01" => "axis is in motion",
        "E02" => "limit detected",
        "E03" => "emergency detected",
        "E20" => "command rule error",
        "E21" => "unsent delimiter",
        "E22" => "setting range error",
        "E40" => "communication error",
        "E41" => "flash write error",
        _ => "unknown device error",
    }
}

fn is_device_error(line: &str) -> bool {
    let b = line.as_bytes();
    b.len() == 3 && b[0] == b'E' && b[1].is_ascii_digit() && b[2].is_ascii_digit()
}

/// Turn raw reply bytes into a trimmed text line.
pub fn decode_line(raw: &[u8]) -> Result<String, StageError> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| StageError::Protocol(format!("non-ASCII reply {raw:02X?}")))?;
    Ok(text.trim().to_string())
}

/// Reject device error replies; pass every other line through.
pub fn check_reply(line: &str) -> Result<&str, StageError> {
    if is_device_error(line) {
        return Err(StageError::Device {
            code: line.to_string(),
            message: device_error_message(line),
        });
    }
    Ok(line)
}

/// Parse a `:POS?` reply.
pub fn parse_position(line: &str) -> Result<f64, StageError> {
    match line.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(StageError::Protocol(format!("unparsable position reply {line:?}"))),
    }
}

/// Parse a `MOTIONA?` reply into the axis-busy bitmask.
pub fn parse_motion_mask(line: &str) -> Result<u32, StageError> {
    line.parse::<u32>()
        .map_err(|_| StageError::Protocol(format!("unparsable motion reply {line:?}")))
}
