use std::time::Duration;

use thiserror::Error;

use crate::controller::StageState;

/// Failures surfaced by the stage controller and the service facade.
///
/// Every variant is a local, recoverable condition. Communication failures
/// (`NoResponse`, `Protocol`, `Link`) additionally move a connected
/// controller to `Faulted`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StageError {
    #[error("invalid well {label:?}: {reason}")]
    InvalidWell { label: String, reason: String },
    #[error("invalid position {0:?}; expected one of {list}", list = crate::geometry::WellPosition::names())]
    InvalidPosition(String),
    #[error("target ({x}, {y}) is outside the travel limits")]
    Range { x: f64, y: f64 },
    #[error("stage not ready (state: {0})")]
    NotReady(StageState),
    #[error("stage not connected")]
    NotConnected,
    #[error("stage busy: a motion is already in flight")]
    Busy,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("device not responding")]
    NoResponse,
    #[error("motion did not complete within {0:?}")]
    MotionTimeout(Duration),
    #[error("homing failed: {0}")]
    HomingFailed(String),
    #[error("motion aborted by stop")]
    Aborted,
    #[error("device error {code}: {message}")]
    Device { code: String, message: &'static str },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("serial link error: {0}")]
    Link(String),
    #[error("invalid plate configuration: {0}")]
    InvalidConfig(String),
}

impl StageError {
    /// True for transport-level failures that leave the link in an unknown state.
    pub fn is_comm_failure(&self) -> bool {
        matches!(
            self,
            StageError::NoResponse | StageError::Protocol(_) | StageError::Link(_)
        )
    }
}

/// Failures from plate-geometry resolution and reconfiguration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("invalid well {label:?}: {reason}")]
    InvalidWell { label: String, reason: String },
    #[error("invalid position {0:?}")]
    InvalidPosition(String),
    #[error("invalid plate configuration: {0}")]
    InvalidConfig(String),
}

impl From<GeometryError> for StageError {
    fn from(e: GeometryError) -> Self {
        match e {
            GeometryError::InvalidWell { label, reason } => StageError::InvalidWell { label, reason },
            GeometryError::InvalidPosition(p) => StageError::InvalidPosition(p),
            GeometryError::InvalidConfig(msg) => StageError::InvalidConfig(msg),
        }
    }
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing connector")]
    MissingConnector,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = std::result::Result<T, StageError>;
