//! Runtime configuration for the stage controller.
//!
//! These are separate from the TOML-deserialized config in `xystage_config`;
//! see `conversions` for the bridge.

use std::time::Duration;

/// Bounds on every blocking wait the controller performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    /// Max wait for one reply line.
    pub response: Duration,
    /// Max wait for an absolute move to finish.
    pub motion: Duration,
    /// Max wait for origin return on both axes.
    pub homing: Duration,
    /// Pause between `MOTIONA?` polls.
    pub poll_interval: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            response: Duration::from_millis(1_000),
            motion: Duration::from_millis(30_000),
            homing: Duration::from_millis(60_000),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Controller settings applied before the origin return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HomingCfg {
    /// `:MEMSW0` origin-return type.
    pub origin_type: u32,
    /// `:SELSP` speed table.
    pub speed_table: u32,
}

impl Default for HomingCfg {
    fn default() -> Self {
        Self {
            origin_type: 3,
            speed_table: 8,
        }
    }
}

/// Closed rectangle of permitted targets (mm).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TravelLimits {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl TravelLimits {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        (self.x_min..=self.x_max).contains(&x) && (self.y_min..=self.y_max).contains(&y)
    }

    pub(crate) fn is_well_formed(&self) -> bool {
        self.x_min < self.x_max && self.y_min < self.y_max
    }
}
