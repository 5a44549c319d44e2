#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and visit-plan parsing for the XY stage positioner.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Visit-plan CSV loader enforces headers and rejects empty plans.
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SerialCfg {
    /// OS port name, e.g. "/dev/ttyUSB0" or "COM3"
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Max wait for one reply line from the controller (ms)
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

fn default_baud_rate() -> u32 {
    38_400
}

fn default_response_timeout_ms() -> u64 {
    1_000
}

/// Standard plate layouts selectable by name.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlatePreset {
    #[serde(rename = "24")]
    Wells24,
    #[default]
    #[serde(rename = "96")]
    Wells96,
    #[serde(rename = "384")]
    Wells384,
}

/// Plate geometry. Explicit fields override the chosen preset. Without a
/// preset, either no geometry field is given (96-well default) or all are.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct PlateCfg {
    pub preset: Option<PlatePreset>,
    pub rows: Option<u32>,
    pub cols: Option<u32>,
    pub well_spacing_x: Option<f64>,
    pub well_spacing_y: Option<f64>,
    pub well_diameter: Option<f64>,
    /// Absolute X of the A1 center (mm)
    pub origin_x: f64,
    /// Absolute Y of the A1 center (mm)
    pub origin_y: f64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MotionCfg {
    pub motion_timeout_ms: u64,
    pub homing_timeout_ms: u64,
    /// Interval between motion-status polls while waiting (ms)
    pub poll_interval_ms: u64,
    /// Controller origin-return type (MEMSW0) applied before homing
    pub origin_type: u32,
    /// Controller speed table used for homing
    pub speed_table: u32,
}

impl Default for MotionCfg {
    fn default() -> Self {
        Self {
            motion_timeout_ms: 30_000,
            homing_timeout_ms: 60_000,
            poll_interval_ms: 100,
            origin_type: 3,
            speed_table: 8,
        }
    }
}

/// Soft travel limits. Off unless `enabled = true`.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct LimitsCfg {
    pub enabled: bool,
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub serial: SerialCfg,
    #[serde(default)]
    pub plate: PlateCfg,
    #[serde(default)]
    pub motion: MotionCfg,
    #[serde(default)]
    pub limits: LimitsCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Serial
        if self.serial.port.trim().is_empty() {
            eyre::bail!("serial.port must not be empty");
        }
        if self.serial.baud_rate == 0 {
            eyre::bail!("serial.baud_rate must be > 0");
        }
        if self.serial.response_timeout_ms == 0 {
            eyre::bail!("serial.response_timeout_ms must be >= 1");
        }

        // Plate
        self.plate.validate()?;

        // Motion
        if self.motion.poll_interval_ms == 0 {
            eyre::bail!("motion.poll_interval_ms must be >= 1");
        }
        if self.motion.motion_timeout_ms < self.motion.poll_interval_ms {
            eyre::bail!("motion.motion_timeout_ms must be >= motion.poll_interval_ms");
        }
        if self.motion.homing_timeout_ms < self.motion.poll_interval_ms {
            eyre::bail!("motion.homing_timeout_ms must be >= motion.poll_interval_ms");
        }
        if self.motion.origin_type > 12 {
            eyre::bail!("motion.origin_type must be in [0, 12]");
        }
        if self.motion.speed_table > 9 {
            eyre::bail!("motion.speed_table must be in [0, 9]");
        }

        // Limits (only checked when active)
        if self.limits.enabled {
            let l = &self.limits;
            if ![l.x_min, l.x_max, l.y_min, l.y_max]
                .iter()
                .all(|v| v.is_finite())
            {
                eyre::bail!("limits.* must be finite numbers");
            }
            if l.x_min >= l.x_max {
                eyre::bail!("limits.x_min must be < limits.x_max");
            }
            if l.y_min >= l.y_max {
                eyre::bail!("limits.y_min must be < limits.y_max");
            }
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}

impl PlateCfg {
    /// True when any geometry field is set explicitly.
    pub fn has_explicit_geometry(&self) -> bool {
        self.rows.is_some()
            || self.cols.is_some()
            || self.well_spacing_x.is_some()
            || self.well_spacing_y.is_some()
            || self.well_diameter.is_some()
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // No preset and no geometry at all means the 96-well default.
        if self.preset.is_none() && self.has_explicit_geometry() {
            let missing = [
                ("rows", self.rows.is_none()),
                ("cols", self.cols.is_none()),
                ("well_spacing_x", self.well_spacing_x.is_none()),
                ("well_spacing_y", self.well_spacing_y.is_none()),
                ("well_diameter", self.well_diameter.is_none()),
            ];
            if let Some((key, _)) = missing.iter().find(|(_, m)| *m) {
                eyre::bail!("plate.{key} is required when plate.preset is not set");
            }
        }
        if self.rows == Some(0) {
            eyre::bail!("plate.rows must be >= 1");
        }
        if self.cols == Some(0) {
            eyre::bail!("plate.cols must be >= 1");
        }
        for (key, v) in [
            ("well_spacing_x", self.well_spacing_x),
            ("well_spacing_y", self.well_spacing_y),
            ("well_diameter", self.well_diameter),
        ] {
            if let Some(v) = v
                && !(v.is_finite() && v > 0.0)
            {
                eyre::bail!("plate.{key} must be a positive number");
            }
        }
        if !(self.origin_x.is_finite() && self.origin_y.is_finite()) {
            eyre::bail!("plate.origin_x/origin_y must be finite");
        }
        Ok(())
    }
}

/// One stop in a visit plan.
///
/// Expected headers:
/// well,position[,dwell_ms]
///
/// Example:
/// well,position,dwell_ms
/// A1,center,500
/// B3,top_left,0
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct VisitRow {
    pub well: String,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub dwell_ms: Option<u64>,
}

pub fn load_visit_plan(path: &std::path::Path) -> eyre::Result<Vec<VisitRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open visit plan {:?}: {}", path, e))?;

    // Enforce headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    let accepted: [&[&str]; 2] = [&["well", "position"], &["well", "position", "dwell_ms"]];
    if !accepted.iter().any(|exp| *exp == actual.as_slice()) {
        eyre::bail!(
            "visit plan CSV must have headers 'well,position[,dwell_ms]', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<VisitRow>().enumerate() {
        match rec {
            Ok(mut row) => {
                if row.well.is_empty() {
                    eyre::bail!("visit plan row {}: empty well label", idx + 2);
                }
                if row.position.as_deref() == Some("") {
                    row.position = None;
                }
                rows.push(row);
            }
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }
    if rows.is_empty() {
        eyre::bail!("visit plan {:?} has no rows", path);
    }
    Ok(rows)
}
