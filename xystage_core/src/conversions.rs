//! Bridges from `xystage_config` types to `xystage_core` types.

use std::time::Duration;

use crate::config::{HomingCfg, StageTimeouts, TravelLimits};
use crate::controller::StageControllerBuilder;
use crate::error::StageError;
use crate::geometry::{PlateConfig, WellPosition};
use crate::service::Visit;

// ── Plate ────────────────────────────────────────────────────────────────────

impl From<xystage_config::PlatePreset> for PlateConfig {
    fn from(p: xystage_config::PlatePreset) -> Self {
        match p {
            xystage_config::PlatePreset::Wells24 => PlateConfig::STANDARD_24_WELL,
            xystage_config::PlatePreset::Wells96 => PlateConfig::STANDARD_96_WELL,
            xystage_config::PlatePreset::Wells384 => PlateConfig::STANDARD_384_WELL,
        }
    }
}

/// Explicit fields override the preset (96-well when none is named).
impl From<&xystage_config::PlateCfg> for PlateConfig {
    fn from(c: &xystage_config::PlateCfg) -> Self {
        let base = PlateConfig::from(c.preset.unwrap_or_default());
        Self {
            rows: c.rows.unwrap_or(base.rows),
            cols: c.cols.unwrap_or(base.cols),
            well_spacing_x: c.well_spacing_x.unwrap_or(base.well_spacing_x),
            well_spacing_y: c.well_spacing_y.unwrap_or(base.well_spacing_y),
            well_diameter: c.well_diameter.unwrap_or(base.well_diameter),
            origin_x: c.origin_x,
            origin_y: c.origin_y,
        }
    }
}

// ── Controller ───────────────────────────────────────────────────────────────

impl From<&xystage_config::Config> for StageTimeouts {
    fn from(c: &xystage_config::Config) -> Self {
        Self {
            response: Duration::from_millis(c.serial.response_timeout_ms),
            motion: Duration::from_millis(c.motion.motion_timeout_ms),
            homing: Duration::from_millis(c.motion.homing_timeout_ms),
            poll_interval: Duration::from_millis(c.motion.poll_interval_ms),
        }
    }
}

impl From<&xystage_config::MotionCfg> for HomingCfg {
    fn from(c: &xystage_config::MotionCfg) -> Self {
        Self {
            origin_type: c.origin_type,
            speed_table: c.speed_table,
        }
    }
}

impl TravelLimits {
    /// `None` unless the config enables soft limits.
    pub fn from_config(c: &xystage_config::LimitsCfg) -> Option<Self> {
        c.enabled.then_some(Self {
            x_min: c.x_min,
            x_max: c.x_max,
            y_min: c.y_min,
            y_max: c.y_max,
        })
    }
}

impl StageControllerBuilder {
    /// Apply timeouts, homing settings and limits from a loaded config.
    pub fn with_config(self, cfg: &xystage_config::Config) -> Self {
        self.with_timeouts(StageTimeouts::from(cfg))
            .with_homing(HomingCfg::from(&cfg.motion))
            .with_limits(TravelLimits::from_config(&cfg.limits))
    }
}

// ── Visit plan ───────────────────────────────────────────────────────────────

impl TryFrom<&xystage_config::VisitRow> for Visit {
    type Error = StageError;

    fn try_from(row: &xystage_config::VisitRow) -> Result<Self, Self::Error> {
        let position = match row.position.as_deref() {
            Some(p) => p.parse::<WellPosition>()?,
            None => WellPosition::Center,
        };
        Ok(Self {
            well: row.well.clone(),
            position,
            dwell: Duration::from_millis(row.dwell_ms.unwrap_or(0)),
        })
    }
}
