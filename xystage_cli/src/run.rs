//! Command execution: config mapping, stage assembly, result rendering.

use std::sync::Arc;

use eyre::WrapErr;
use serde_json::json;
use xystage_config::Config;
use xystage_core::{
    PlateConfig, PlateGeometry, StageController, StageService, StageState, StopAck, Visit,
    WellPosition, Xy,
};
use xystage_traits::Connector;

use crate::cli::Commands;
use crate::interrupt::StopOnInterrupt;

/// Output sink honouring `--json`.
struct Out {
    json: bool,
}

impl Out {
    fn emit(&self, value: serde_json::Value, text: impl FnOnce() -> String) {
        if self.json {
            println!("{value}");
        } else {
            println!("{}", text());
        }
    }
}

pub fn execute(cmd: &Commands, cfg: &Config, json: bool) -> eyre::Result<()> {
    let out = Out { json };
    let geometry = PlateGeometry::new(PlateConfig::from(&cfg.plate))?;

    match cmd {
        Commands::Wells => {
            let labels: Vec<String> = geometry.list_wells().map(|w| w.to_string()).collect();
            if json {
                println!("{}", json!({ "plate": geometry.config().name(), "wells": labels }));
            } else {
                for label in labels {
                    println!("{label}");
                }
            }
            return Ok(());
        }
        Commands::Resolve { well, position } => {
            let p = geometry.resolve(well, *position)?;
            out.emit(well_json(well, *position, p), || {
                format!("{well} {position}: x={:.3} y={:.3}", p.x, p.y)
            });
            return Ok(());
        }
        _ => {}
    }

    let svc = Arc::new(StageService::new(geometry, build_controller(cfg)?));
    let _interrupt = StopOnInterrupt::arm(Arc::clone(&svc))?;
    let result = with_connection(&svc, cfg, cmd, &out);
    svc.shutdown();
    result
}

fn with_connection(svc: &StageService, cfg: &Config, cmd: &Commands, out: &Out) -> eyre::Result<()> {
    let state = svc.configure_connection(&cfg.serial.port, cfg.serial.baud_rate)?;
    tracing::info!(port = %cfg.serial.port, %state, "stage connection configured");

    match cmd {
        Commands::MoveWell { well, position } => {
            let m = svc.move_to_well(well, *position)?;
            out.emit(well_json(&m.well.to_string(), m.position, m.target), || {
                format!("at {} {}: x={:.3} y={:.3}", m.well, m.position, m.target.x, m.target.y)
            });
        }
        Commands::MoveXy { x, y } => {
            let p = svc.move_to_xy(*x, *y)?;
            out.emit(json!({ "x": p.x, "y": p.y }), || format!("at x={:.3} y={:.3}", p.x, p.y));
        }
        Commands::Position => {
            let r = svc.get_position()?;
            out.emit(json!({ "x": r.x, "y": r.y, "well": r.well }), || {
                let well = r.well.as_deref().unwrap_or("-");
                format!("x={:.3} y={:.3} well={well}", r.x, r.y)
            });
        }
        Commands::Home => {
            // connect already homed; a faulted connect retries so the error surfaces
            let state = if state == StageState::Ready { state } else { svc.home()? };
            out.emit(json!({ "state": state.as_str() }), || format!("stage {state}"));
        }
        Commands::Stop => {
            let ack = svc.stop();
            let text = match &ack {
                StopAck::Sent => "stop sent".to_string(),
                StopAck::NotConnected => "not connected".to_string(),
                StopAck::Unconfirmed(why) => format!("stop unconfirmed: {why}"),
            };
            out.emit(json!({ "stop": text, "confirmed": ack.is_sent() }), || text.clone());
        }
        Commands::Visit { plan } => {
            let rows = xystage_config::load_visit_plan(plan)?;
            let visits = rows
                .iter()
                .enumerate()
                .map(|(i, row)| {
                    Visit::try_from(row).wrap_err_with(|| format!("visit plan row {}", i + 2))
                })
                .collect::<eyre::Result<Vec<_>>>()?;
            let done = svc.visit(&visits, |i, m| {
                out.emit(
                    json!({ "stop": i + 1, "well": m.well.to_string(), "position": m.position.as_str(), "x": m.target.x, "y": m.target.y }),
                    || format!("[{}/{}] {} {}: x={:.3} y={:.3}", i + 1, visits.len(), m.well, m.position, m.target.x, m.target.y),
                );
            })?;
            tracing::info!(stops = done.len(), "visit plan complete");
        }
        Commands::SelfCheck => {
            let status = svc.stage().status();
            let identity = status.identity.clone().unwrap_or_default();
            out.emit(
                json!({ "ok": status.homed, "state": status.state.as_str(), "identity": identity, "plate": svc.get_plate_config().name() }),
                || format!("OK: {identity} ({})", status.state),
            );
            if !status.homed {
                eyre::bail!(
                    "self-check failed: stage {}{}",
                    status.state,
                    status.fault.map(|f| format!(" ({f})")).unwrap_or_default()
                );
            }
        }
        Commands::Wells | Commands::Resolve { .. } => {}
    }
    Ok(())
}

fn well_json(well: &str, position: WellPosition, p: Xy) -> serde_json::Value {
    json!({ "well": well, "position": position.as_str(), "x": p.x, "y": p.y })
}

fn build_controller(cfg: &Config) -> eyre::Result<StageController> {
    let controller = StageController::builder()
        .with_config(cfg)
        .with_boxed_connector(make_connector())
        .build()?;
    Ok(controller)
}

#[cfg(feature = "hardware")]
fn make_connector() -> Box<dyn Connector> {
    Box::new(xystage_hardware::SerialPortConnector)
}

/// Simulated controller; `XYSTAGE_TEST_SIM_*` variables inject faults for tests.
#[cfg(not(feature = "hardware"))]
fn make_connector() -> Box<dyn Connector> {
    use xystage_hardware::{SimDevice, SimulatedConnector};

    if std::env::var_os("XYSTAGE_TEST_SIM_NO_PORT").is_some() {
        return Box::new(SimulatedConnector::unavailable());
    }
    let mut dev = SimDevice::new();
    if std::env::var_os("XYSTAGE_TEST_SIM_SILENT").is_some() {
        dev = dev.silent();
    }
    if let Ok(code) = std::env::var("XYSTAGE_TEST_SIM_FAIL_HOMING") {
        dev = dev.failing_homing(&code);
    }
    Box::new(SimulatedConnector::new(dev))
}
