//! Transport-agnostic facade over one plate geometry and one stage.
//!
//! Every operation a front-end exposes maps onto exactly one method here;
//! front-ends only translate arguments and render results.

use std::sync::Arc;
use std::time::Duration;

use crate::controller::{StageController, StageState, StopAck};
use crate::error::{Result, StageError};
use crate::geometry::{PlateConfig, PlateGeometry, WellId, WellPosition, Wells, Xy};
use crate::util::as_millis_u64;

/// Live position, annotated with the well it lies in (if any).
#[derive(Debug, Clone, PartialEq)]
pub struct PositionReport {
    pub x: f64,
    pub y: f64,
    pub well: Option<String>,
}

/// A completed move to a well.
#[derive(Debug, Clone, PartialEq)]
pub struct WellMove {
    pub well: WellId,
    pub position: WellPosition,
    pub target: Xy,
}

/// One stop of a visit plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Visit {
    pub well: String,
    pub position: WellPosition,
    /// Time to stay at the target before moving on.
    pub dwell: Duration,
}

#[derive(Debug)]
pub struct StageService {
    geometry: PlateGeometry,
    stage: StageController,
}

impl StageService {
    pub fn new(geometry: PlateGeometry, stage: StageController) -> Self {
        Self { geometry, stage }
    }

    pub fn geometry(&self) -> &PlateGeometry {
        &self.geometry
    }

    pub fn stage(&self) -> &StageController {
        &self.stage
    }

    /// Connect (or reconnect) and home.
    pub fn configure_connection(&self, port: &str, baud_rate: u32) -> Result<StageState> {
        self.stage.connect(port, baud_rate)
    }

    /// Resolve the well first; a bad label never reaches the wire.
    pub fn move_to_well(&self, label: &str, position: WellPosition) -> Result<WellMove> {
        let cfg = self.geometry.config();
        let well = cfg.parse_well(label)?;
        let target = cfg.locate(&well, position);
        tracing::info!(well = %well, %position, x = target.x, y = target.y, "move to well");
        let target = self.stage.move_to(target.x, target.y)?;
        Ok(WellMove {
            well,
            position,
            target,
        })
    }

    pub fn move_to_xy(&self, x: f64, y: f64) -> Result<Xy> {
        self.stage.move_to(x, y)
    }

    pub fn get_position(&self) -> Result<PositionReport> {
        let p = self.stage.get_position()?;
        Ok(PositionReport {
            x: p.x,
            y: p.y,
            well: self.geometry.well_at(p.x, p.y).map(|w| w.to_string()),
        })
    }

    pub fn home(&self) -> Result<StageState> {
        self.stage.home()?;
        Ok(self.stage.status().state)
    }

    pub fn stop(&self) -> StopAck {
        self.stage.stop()
    }

    pub fn list_wells(&self) -> Wells {
        self.geometry.list_wells()
    }

    pub fn get_plate_config(&self) -> Arc<PlateConfig> {
        self.geometry.config()
    }

    pub fn set_plate_config(&self, config: PlateConfig) -> Result<Arc<PlateConfig>> {
        self.geometry.reconfigure(config)?;
        Ok(self.geometry.config())
    }

    pub fn calibrate_origin(&self, x: f64, y: f64) -> Xy {
        self.geometry.set_origin(x, y)
    }

    /// Make the live stage position the A1 origin.
    pub fn calibrate_origin_here(&self) -> Result<Xy> {
        let p = self.stage.get_position()?;
        Ok(self.geometry.set_origin(p.x, p.y))
    }

    /// Coordinates a `move_to_well` would target, without moving.
    pub fn resolve(&self, label: &str, position: WellPosition) -> Result<Xy> {
        Ok(self.geometry.resolve(label, position)?)
    }

    /// Visit each stop in order, dwelling at each. Stops at the first error.
    ///
    /// `on_arrive` runs after each completed move with the stop index.
    /// A `stop()` issued during a dwell ends the plan with `Aborted`.
    pub fn visit(
        &self,
        plan: &[Visit],
        mut on_arrive: impl FnMut(usize, &WellMove),
    ) -> Result<Vec<WellMove>> {
        let cfg = self.geometry.config();
        for v in plan {
            cfg.parse_well(&v.well)?;
        }
        let epoch = self.stage.stop_epoch();
        let mut done = Vec::with_capacity(plan.len());
        for (i, v) in plan.iter().enumerate() {
            let m = self.move_to_well(&v.well, v.position)?;
            on_arrive(i, &m);
            self.dwell(v.dwell, epoch)?;
            done.push(m);
        }
        Ok(done)
    }

    /// Wait out `total` in poll-interval slices so a stop cuts it short.
    fn dwell(&self, total: Duration, epoch: u64) -> Result<()> {
        let clock = self.stage.clock();
        let slice = self.stage.timeouts().poll_interval;
        let start = clock.now();
        loop {
            if self.stage.stop_epoch() != epoch {
                tracing::info!(dwell_ms = as_millis_u64(total), "dwell cut short by stop");
                return Err(StageError::Aborted);
            }
            let waited = clock.now().saturating_duration_since(start);
            let left = total.saturating_sub(waited);
            if left.is_zero() {
                return Ok(());
            }
            clock.sleep(left.min(slice));
        }
    }

    pub fn shutdown(&self) {
        self.stage.disconnect();
    }
}
