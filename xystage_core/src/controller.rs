//! Serial stage controller: connection lifecycle, homing, motion and stop.
//!
//! ## Lifecycle
//!
//! ```text
//! Disconnected -> Connecting -> ConnectedUnhomed -> Ready
//!                                      \              |
//!                                       `-> Faulted <-'
//! ```
//!
//! `move_to` is only accepted in `Ready`. Homing failures and transport
//! corruption move a connected controller to `Faulted`; `home()` or a fresh
//! `connect()` recovers.
//!
//! ## Concurrency
//!
//! All methods take `&self`. One mutex serializes wire exchanges; a move
//! releases it between status polls so `stop` and `get_position` can
//! interleave. `stop` raises a priority gate that holds back ordinary
//! operations until it owns the wire. At most one move or homing run is in
//! flight; a second one fails with `Busy` instead of queueing.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use xystage_traits::{Clock, Connector, MonotonicClock, SerialLink};

use crate::config::{HomingCfg, StageTimeouts, TravelLimits};
use crate::error::{BuildError, Result, StageError};
use crate::geometry::Xy;
use crate::hw_error::map_hw_error;
use crate::protocol::{self, AXIS_MASK, Axis, Command, TERMINATOR};
use crate::util::{as_millis_u64, lock};

type Link = Box<dyn SerialLink>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Disconnected,
    Connecting,
    ConnectedUnhomed,
    Ready,
    Faulted,
}

impl StageState {
    /// True for every state that holds an open, identified link.
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            StageState::ConnectedUnhomed | StageState::Ready | StageState::Faulted
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StageState::Disconnected => "disconnected",
            StageState::Connecting => "connecting",
            StageState::ConnectedUnhomed => "connected_unhomed",
            StageState::Ready => "ready",
            StageState::Faulted => "faulted",
        }
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time snapshot of the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct StageStatus {
    pub state: StageState,
    pub connected: bool,
    pub homed: bool,
    /// Last known position; `None` after stop, timeout, fault or before homing.
    pub position: Option<Xy>,
    pub port: Option<String>,
    /// Handshake reply of the current connection.
    pub identity: Option<String>,
    /// Reason for the most recent transition to `Faulted`.
    pub fault: Option<String>,
}

impl Default for StageStatus {
    fn default() -> Self {
        Self {
            state: StageState::Disconnected,
            connected: false,
            homed: false,
            position: None,
            port: None,
            identity: None,
            fault: None,
        }
    }
}

impl StageStatus {
    fn enter(&mut self, state: StageState) {
        self.state = state;
        self.connected = state.is_connected();
        self.homed = state == StageState::Ready;
    }
}

/// Outcome of an emergency stop request. Stop itself never fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopAck {
    /// `STOP_0` was sent and acknowledged.
    Sent,
    /// No link was open; nothing to stop.
    NotConnected,
    /// The stop went out but the device did not confirm it.
    Unconfirmed(String),
}

impl StopAck {
    pub fn is_sent(&self) -> bool {
        matches!(self, StopAck::Sent)
    }
}

/// Gives `stop` first claim on the wire.
///
/// Ordinary callers wait here while a stop is pending; the stopper lowers the
/// gate once it holds the wire lock.
#[derive(Debug, Default)]
struct PriorityGate {
    pending: Mutex<usize>,
    cleared: Condvar,
}

impl PriorityGate {
    fn wait_clear(&self) {
        let mut pending = lock(&self.pending);
        while *pending > 0 {
            pending = self
                .cleared
                .wait(pending)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    fn raise(&self) -> PriorityClaim<'_> {
        *lock(&self.pending) += 1;
        PriorityClaim { gate: self }
    }
}

struct PriorityClaim<'a> {
    gate: &'a PriorityGate,
}

impl Drop for PriorityClaim<'_> {
    fn drop(&mut self) {
        let mut pending = lock(&self.gate.pending);
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.gate.cleared.notify_all();
        }
    }
}

/// Clears the in-flight flag when a move or homing run ends.
struct MotionGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for MotionGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct StageController {
    connector: Box<dyn Connector>,
    clock: Arc<dyn Clock + Send + Sync>,
    timeouts: StageTimeouts,
    homing: HomingCfg,
    limits: Option<TravelLimits>,
    wire: Mutex<Option<Link>>,
    gate: PriorityGate,
    status: Mutex<StageStatus>,
    motion_in_flight: AtomicBool,
    // bumped by every stop; movers compare against the value they started with
    stop_epoch: AtomicU64,
}

impl fmt::Debug for StageController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageController")
            .field("status", &self.status())
            .field("timeouts", &self.timeouts)
            .field("homing", &self.homing)
            .field("limits", &self.limits)
            .field("motion_in_flight", &self.is_moving())
            .finish_non_exhaustive()
    }
}

impl StageController {
    pub fn builder() -> StageControllerBuilder {
        StageControllerBuilder::default()
    }

    pub fn status(&self) -> StageStatus {
        lock(&self.status).clone()
    }

    pub fn identity(&self) -> Option<String> {
        lock(&self.status).identity.clone()
    }

    /// True while a move or homing run owns the motion slot.
    pub fn is_moving(&self) -> bool {
        self.motion_in_flight.load(Ordering::Acquire)
    }

    pub fn timeouts(&self) -> &StageTimeouts {
        &self.timeouts
    }

    pub fn limits(&self) -> Option<&TravelLimits> {
        self.limits.as_ref()
    }

    pub(crate) fn clock(&self) -> &(dyn Clock + Send + Sync) {
        self.clock.as_ref()
    }

    pub(crate) fn stop_epoch(&self) -> u64 {
        self.stop_epoch.load(Ordering::Acquire)
    }

    /// Open `port`, identify the controller and home both axes.
    ///
    /// Any previous link is released first. Returns `Ready` on success. A
    /// homing failure still returns `Ok(Faulted)`: the link stays open and
    /// the reason is recorded in [`StageStatus::fault`].
    pub fn connect(&self, port: &str, baud_rate: u32) -> Result<StageState> {
        // Held through homing: no move may reach the new link before it is homed.
        let _motion = self.begin_motion()?;
        {
            let mut wire = self.wire();
            if wire.take().is_some() {
                tracing::info!("releasing previous link");
            }
            self.update(|s| {
                s.enter(StageState::Connecting);
                s.port = Some(port.to_string());
                s.identity = None;
                s.position = None;
                s.fault = None;
            });
            tracing::info!(port, baud_rate, "connecting");

            let identity = match self.open_and_identify(&mut wire, port, baud_rate) {
                Ok(identity) => identity,
                Err(e) => {
                    *wire = None;
                    self.update(|s| {
                        s.enter(StageState::Disconnected);
                        s.port = None;
                    });
                    tracing::warn!(port, error = %e, "connection failed");
                    return Err(e);
                }
            };
            tracing::info!(port, identity = %identity, "stage connected");
            self.update(|s| {
                s.enter(StageState::ConnectedUnhomed);
                s.identity = Some(identity);
            });
        }

        match self.home_claimed() {
            Ok(()) => Ok(StageState::Ready),
            Err(e) => {
                tracing::warn!(error = %e, "stage connected but not homed");
                Ok(self.status().state)
            }
        }
    }

    fn open_and_identify(
        &self,
        wire: &mut Option<Link>,
        port: &str,
        baud_rate: u32,
    ) -> Result<String> {
        let link = self
            .connector
            .open(port, baud_rate, self.timeouts.response)
            .map_err(|e| StageError::Connection(e.to_string()))?;
        *wire = Some(link);
        self.transact(wire, &Command::Identify)
            .map_err(|e| StageError::Connection(format!("{port}: handshake failed: {e}")))
    }

    /// Run origin return on both axes and zero the position counters.
    pub fn home(&self) -> Result<()> {
        if !self.status().state.is_connected() {
            return Err(StageError::NotConnected);
        }
        let _motion = self.begin_motion()?;
        self.home_claimed()
    }

    /// Homing body; the caller owns the motion slot.
    fn home_claimed(&self) -> Result<()> {
        let epoch = self.stop_epoch();
        self.update(|s| s.position = None);
        tracing::info!(
            origin_type = self.homing.origin_type,
            speed_table = self.homing.speed_table,
            "homing"
        );

        let result = self
            .run_homing(epoch)
            .and_then(|()| self.commit_homed(epoch));
        match &result {
            Ok(()) => tracing::info!("stage homed"),
            Err(e) => {
                self.update(|s| {
                    if s.state.is_connected() {
                        s.enter(StageState::Faulted);
                        s.position = None;
                        s.fault = Some(e.to_string());
                    }
                });
                tracing::error!(error = %e, "homing failed");
            }
        }
        result
    }

    /// Enter `Ready` unless the link went away or a stop landed meanwhile.
    fn commit_homed(&self, epoch: u64) -> Result<()> {
        let mut s = lock(&self.status);
        if !s.state.is_connected() {
            return Err(StageError::NotConnected);
        }
        self.stopped_since(epoch)?;
        s.enter(StageState::Ready);
        s.position = Some(Xy::default());
        s.fault = None;
        Ok(())
    }

    fn run_homing(&self, epoch: u64) -> Result<()> {
        let as_homing = |e: StageError| match e {
            StageError::Device { .. } => StageError::HomingFailed(e.to_string()),
            other => other,
        };
        {
            let mut wire = self.wire();
            self.stopped_since(epoch)?;
            for axis in Axis::BOTH {
                for cmd in [
                    Command::SelectAxis(axis),
                    Command::OriginType(self.homing.origin_type),
                    Command::SelectSpeed(self.homing.speed_table),
                    Command::OriginReturn,
                ] {
                    self.transact(&mut wire, &cmd).map_err(as_homing)?;
                }
            }
        }
        self.wait_until_idle(self.timeouts.homing, epoch)?;
        let mut wire = self.wire();
        for axis in Axis::BOTH {
            for cmd in [
                Command::SelectAxis(axis),
                Command::SetPosition(0.0),
                Command::SetHomePosition(0.0),
            ] {
                self.transact(&mut wire, &cmd).map_err(as_homing)?;
            }
        }
        Ok(())
    }

    /// Drive both axes to the absolute target and wait for completion.
    pub fn move_to(&self, x: f64, y: f64) -> Result<Xy> {
        let state = self.status().state;
        if state != StageState::Ready {
            return Err(StageError::NotReady(state));
        }
        let outside = self.limits.is_some_and(|l| !l.contains(x, y));
        if outside || !(x.is_finite() && y.is_finite()) {
            return Err(StageError::Range { x, y });
        }
        let _motion = self.begin_motion()?;
        let epoch = self.stop_epoch();
        let target = Xy::new(x, y);
        tracing::info!(x, y, "move start");

        match self.run_move(target, epoch) {
            Ok(()) => {
                self.update(|s| s.position = Some(target));
                tracing::info!(x, y, "move complete");
                Ok(target)
            }
            Err(e) => {
                self.after_failure(&e);
                Err(e)
            }
        }
    }

    fn run_move(&self, target: Xy, epoch: u64) -> Result<()> {
        {
            let mut wire = self.wire();
            self.stopped_since(epoch)?;
            // a disconnect or reconnect may have landed since the caller's check
            let state = self.status().state;
            if state != StageState::Ready {
                return Err(StageError::NotReady(state));
            }
            for cmd in [
                Command::SelectAxis(Axis::X),
                Command::DriveAbsolute(target.x),
                Command::SelectAxis(Axis::Y),
                Command::DriveAbsolute(target.y),
            ] {
                self.transact(&mut wire, &cmd)?;
            }
        }
        self.wait_until_idle(self.timeouts.motion, epoch)
    }

    /// Emergency-stop both axes, ahead of any queued exchange.
    pub fn stop(&self) -> StopAck {
        if self.status().state == StageState::Disconnected {
            return StopAck::NotConnected;
        }
        self.stop_epoch.fetch_add(1, Ordering::AcqRel);
        let sent = {
            let mut wire = {
                let _claim = self.gate.raise();
                lock(&self.wire)
            };
            self.transact(&mut wire, &Command::EmergencyStop)
        };
        self.update(|s| s.position = None);
        match sent {
            Ok(_) => {
                tracing::warn!("emergency stop sent");
                StopAck::Sent
            }
            Err(e) => {
                tracing::error!(error = %e, "emergency stop not confirmed");
                StopAck::Unconfirmed(e.to_string())
            }
        }
    }

    /// Query both axis counters and refresh the cached position.
    pub fn get_position(&self) -> Result<Xy> {
        if !self.status().state.is_connected() {
            return Err(StageError::NotConnected);
        }
        let result = {
            let mut wire = self.wire();
            self.query_position(&mut wire)
        };
        match result {
            Ok(p) => {
                self.update(|s| {
                    if s.state.is_connected() {
                        s.position = Some(p);
                    }
                });
                Ok(p)
            }
            Err(e) => {
                self.after_failure(&e);
                Err(e)
            }
        }
    }

    fn query_position(&self, wire: &mut Option<Link>) -> Result<Xy> {
        let mut v = [0.0; 2];
        for (slot, axis) in v.iter_mut().zip(Axis::BOTH) {
            self.transact(wire, &Command::SelectAxis(axis))?;
            let line = self.transact(wire, &Command::QueryPosition)?;
            *slot = protocol::parse_position(&line)?;
        }
        Ok(Xy::new(v[0], v[1]))
    }

    /// Release the link. Safe to call in any state, any number of times.
    pub fn disconnect(&self) {
        if self.is_moving() {
            let _ = self.stop();
        }
        let released = self.wire().take().is_some();
        self.update(|s| {
            s.enter(StageState::Disconnected);
            s.port = None;
            s.identity = None;
            s.position = None;
            s.fault = None;
        });
        if released {
            tracing::info!("stage disconnected");
        }
    }

    fn begin_motion(&self) -> Result<MotionGuard<'_>> {
        self.motion_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| StageError::Busy)?;
        Ok(MotionGuard {
            flag: &self.motion_in_flight,
        })
    }

    fn stopped_since(&self, epoch: u64) -> Result<()> {
        if self.stop_epoch() == epoch {
            Ok(())
        } else {
            Err(StageError::Aborted)
        }
    }

    /// Poll `MOTIONA?` until both axes are idle, a stop lands, or `timeout` passes.
    fn wait_until_idle(&self, timeout: Duration, epoch: u64) -> Result<()> {
        let start = self.clock.now();
        let mut polls: u64 = 0;
        loop {
            let mask = {
                let mut wire = self.wire();
                self.stopped_since(epoch)?;
                let line = self.transact(&mut wire, &Command::MotionAll)?;
                protocol::parse_motion_mask(&line)?
            };
            self.stopped_since(epoch)?;
            polls += 1;
            if mask & AXIS_MASK == 0 {
                tracing::debug!(polls, elapsed_ms = self.clock.ms_since(start), "axes idle");
                return Ok(());
            }
            if self.clock.now().saturating_duration_since(start) >= timeout {
                tracing::warn!(polls, timeout_ms = as_millis_u64(timeout), "motion timed out");
                return Err(StageError::MotionTimeout(timeout));
            }
            self.clock.sleep(self.timeouts.poll_interval);
        }
    }

    fn after_failure(&self, e: &StageError) {
        let comm = e.is_comm_failure();
        self.update(|s| {
            s.position = None;
            if comm && s.state.is_connected() {
                s.enter(StageState::Faulted);
                s.fault = Some(e.to_string());
            }
        });
        if comm {
            tracing::error!(error = %e, "communication failure, stage faulted");
        } else {
            tracing::warn!(error = %e, "stage operation failed");
        }
    }

    /// Ordinary wire access: waits out any pending stop first.
    fn wire(&self) -> MutexGuard<'_, Option<Link>> {
        self.gate.wait_clear();
        lock(&self.wire)
    }

    /// One command, one reply line.
    fn transact(&self, wire: &mut Option<Link>, cmd: &Command) -> Result<String> {
        let link = wire.as_mut().ok_or(StageError::NotConnected)?;
        link.clear_input().map_err(|e| map_hw_error(&*e))?;
        link.write_all(&cmd.frame()).map_err(|e| map_hw_error(&*e))?;
        let raw = link
            .read_until(TERMINATOR, self.timeouts.response)
            .map_err(|e| map_hw_error(&*e))?;
        let line = protocol::decode_line(&raw)?;
        tracing::debug!(cmd = %cmd, reply = %line, "serial exchange");
        protocol::check_reply(&line)?;
        Ok(line)
    }

    fn update(&self, f: impl FnOnce(&mut StageStatus)) {
        f(&mut lock(&self.status));
    }
}

#[derive(Default)]
pub struct StageControllerBuilder {
    connector: Option<Box<dyn Connector>>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    timeouts: StageTimeouts,
    homing: HomingCfg,
    limits: Option<TravelLimits>,
}

impl StageControllerBuilder {
    pub fn with_connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Box::new(connector));
        self
    }

    /// Same as `with_connector` for a connector chosen at runtime.
    pub fn with_boxed_connector(mut self, connector: Box<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn with_timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_homing(mut self, homing: HomingCfg) -> Self {
        self.homing = homing;
        self
    }

    /// Soft travel limits; `None` disables them.
    pub fn with_limits(mut self, limits: impl Into<Option<TravelLimits>>) -> Self {
        self.limits = limits.into();
        self
    }

    pub fn build(self) -> std::result::Result<StageController, BuildError> {
        let connector = self.connector.ok_or(BuildError::MissingConnector)?;
        if self.timeouts.poll_interval.is_zero() {
            return Err(BuildError::InvalidConfig("poll_interval must be > 0"));
        }
        if self.timeouts.response.is_zero() {
            return Err(BuildError::InvalidConfig("response timeout must be > 0"));
        }
        if self.limits.is_some_and(|l| !l.is_well_formed()) {
            return Err(BuildError::InvalidConfig("travel limits must satisfy min < max"));
        }
        Ok(StageController {
            connector,
            clock: self.clock.unwrap_or_else(|| Arc::new(MonotonicClock::new())),
            timeouts: self.timeouts,
            homing: self.homing,
            limits: self.limits,
            wire: Mutex::new(None),
            gate: PriorityGate::default(),
            status: Mutex::new(StageStatus::default()),
            motion_in_flight: AtomicBool::new(false),
            stop_epoch: AtomicU64::new(0),
        })
    }
}
