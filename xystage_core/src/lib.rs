#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core positioning logic for an XY stage over a multi-well plate.
//!
//! Hardware is reached only through `xystage_traits::Connector` and
//! `xystage_traits::SerialLink`, so everything here runs against the
//! simulated controller in tests.
//!
//! ## Architecture
//!
//! - **Geometry**: well labels and intra-well positions to stage
//!   coordinates, with an atomically swappable plate config (`geometry`)
//! - **Protocol**: DS102 ASCII command encoding and reply parsing (`protocol`)
//! - **Controller**: connection lifecycle, homing, moves and emergency stop
//!   (`controller`)
//! - **Service**: the operation set a front-end exposes (`service`)
//!
//! ## Coordinates
//!
//! Millimetres in the stage frame. Column index grows along +X and row index
//! along +Y; "top" of a well points toward row A.

pub mod config;
pub mod controller;
pub mod conversions;
pub mod error;
pub mod geometry;
pub mod hw_error;
pub mod protocol;
pub mod service;
pub mod util;

pub use config::{HomingCfg, StageTimeouts, TravelLimits};
pub use controller::{StageController, StageControllerBuilder, StageState, StageStatus, StopAck};
pub use error::{BuildError, GeometryError, Result, StageError};
pub use geometry::{
    EDGE_OFFSET_FRACTION, PlateConfig, PlateGeometry, WellId, WellPosition, Wells, Xy,
};
pub use service::{PositionReport, StageService, Visit, WellMove};
