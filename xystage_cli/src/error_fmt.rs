//! Human-readable error descriptions and structured JSON error formatting.

use xystage_core::{BuildError, GeometryError, StageError, WellPosition};

/// Find the typed stage error inside a report, lifting geometry errors.
fn stage_error(err: &eyre::Report) -> Option<StageError> {
    if let Some(se) = err.downcast_ref::<StageError>() {
        return Some(se.clone());
    }
    err.downcast_ref::<GeometryError>()
        .map(|ge| StageError::from(ge.clone()))
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingConnector => {
                "What happened: No serial connector was provided to the stage controller.\nHow to fix: This is a wiring bug in the front-end; please report it.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid controller settings ({msg}).\nHow to fix: Check [motion] and [limits] in the config, then rerun."
            ),
        };
    }

    if let Some(se) = stage_error(err) {
        return match &se {
            StageError::InvalidWell { label, reason } => format!(
                "What happened: Well {label:?} is not on this plate ({reason}).\nHow to fix: Use a label like A1 within the configured rows and columns (see `xystage wells`)."
            ),
            StageError::InvalidPosition(p) => format!(
                "What happened: Unknown in-well position {p:?}.\nHow to fix: Use one of {}.",
                WellPosition::names()
            ),
            StageError::Range { x, y } => format!(
                "What happened: Target ({x}, {y}) lies outside the soft travel limits.\nHow to fix: Pick a target inside [limits] or widen them in the config."
            ),
            StageError::NotReady(state) => format!(
                "What happened: The stage is {state} and cannot move.\nLikely causes: Homing did not complete.\nHow to fix: Check the stage for obstructions and run `xystage home`."
            ),
            StageError::NotConnected => {
                "What happened: The stage is not connected.\nHow to fix: Check [serial] port and cabling.".to_string()
            }
            StageError::Busy => {
                "What happened: Another motion is still in progress.\nHow to fix: Wait for it to finish or stop it first.".to_string()
            }
            StageError::Connection(msg) => format!(
                "What happened: Could not connect to the stage controller ({msg}).\nLikely causes: Wrong port name, controller powered off, or baud rate mismatch.\nHow to fix: Verify serial.port and serial.baud_rate in the config and that the controller is on."
            ),
            StageError::NoResponse => {
                "What happened: The controller stopped answering.\nLikely causes: Cable unplugged or controller reset.\nHow to fix: Check the link, then reconnect; raise serial.response_timeout_ms if replies are slow.".to_string()
            }
            StageError::MotionTimeout(d) => format!(
                "What happened: Motion did not finish within {} ms.\nLikely causes: Mechanical obstruction or a limit switch.\nHow to fix: Inspect the stage; raise motion.motion_timeout_ms for long moves.",
                d.as_millis()
            ),
            StageError::HomingFailed(msg) => format!(
                "What happened: Homing failed ({msg}).\nLikely causes: Emergency stop engaged or sensor wiring.\nHow to fix: Release the emergency stop, check sensors, then run `xystage home`."
            ),
            StageError::Aborted => {
                "What happened: Motion was aborted by a stop request.\nHow to fix: Position is now unknown; query it or move again.".to_string()
            }
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("visit plan csv must have headers") {
        return "Invalid headers in visit plan CSV. Expected 'well,position[,dwell_ms]'.".to_string();
    }

    if lower.starts_with("invalid configuration") {
        let detail = err.source().map(|s| s.to_string()).unwrap_or_default();
        return format!(
            "What happened: Configuration is invalid ({detail}).\nHow to fix: Edit the TOML config and try again."
        );
    }

    if lower.contains("config") && lower.contains("read") {
        return format!(
            "What happened: Could not read the config file.\nHow to fix: Pass --config FILE or create etc/xystage.toml. Original: {msg}"
        );
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable name for the JSON `reason` field.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    match stage_error(err) {
        Some(StageError::InvalidWell { .. }) => "InvalidWell",
        Some(StageError::InvalidPosition(_)) => "InvalidPosition",
        Some(StageError::Range { .. }) => "Range",
        Some(StageError::NotReady(_)) => "NotReady",
        Some(StageError::NotConnected) => "NotConnected",
        Some(StageError::Busy) => "Busy",
        Some(StageError::Connection(_)) => "Connection",
        Some(StageError::NoResponse) => "NoResponse",
        Some(StageError::MotionTimeout(_)) => "MotionTimeout",
        Some(StageError::HomingFailed(_)) => "HomingFailed",
        Some(StageError::Aborted) => "Aborted",
        Some(StageError::Device { .. }) => "Device",
        Some(StageError::Protocol(_)) => "Protocol",
        Some(StageError::Link(_)) => "Link",
        Some(StageError::InvalidConfig(_)) => "InvalidConfig",
        None => "Error",
    }
}

/// Map stage errors to stable exit codes; everything else returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match stage_error(err) {
        Some(StageError::InvalidWell { .. } | StageError::InvalidPosition(_)) => 3,
        Some(StageError::NotReady(_) | StageError::NotConnected) => 4,
        Some(StageError::Busy) => 5,
        Some(StageError::Range { .. }) => 6,
        Some(StageError::MotionTimeout(_)) => 7,
        Some(StageError::Connection(_) | StageError::NoResponse) => 8,
        Some(StageError::Aborted) => 9,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
