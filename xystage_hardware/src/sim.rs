//! Simulated DS102-class two-axis controller.
//!
//! The model speaks the same CR-terminated ASCII dialect as the hardware and
//! answers every command with exactly one line. Motion is poll-driven rather
//! than time-driven: an axis that starts moving reports "in motion" for
//! `settle_polls` consecutive `MOTIONA?` queries and then lands on its target.
//! This keeps tests deterministic regardless of the clock in use.
//!
//! Fault knobs (`silent`, `stuck`, `garbled_motion`, `failing_homing`) let
//! tests drive the controller into each error path.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use xystage_traits::{Connector, SerialLink};

use crate::error::HwError;

const ACK: &str = "OK";
const CR: u8 = b'\r';
const AXES: usize = 2;

#[derive(Debug, Clone, Default)]
struct AxisModel {
    position: f64,
    home: f64,
    target: Option<f64>,
    remaining_polls: u32,
    origin_type: u32,
    speed_table: u32,
}

#[derive(Debug)]
struct DeviceState {
    identity: String,
    selected: usize,
    axes: [AxisModel; AXES],
    settle_polls: u32,
    stuck: bool,
    silent: bool,
    garbled_motion: bool,
    homing_error: Option<String>,
    history: Vec<String>,
    opened: Option<(String, u32)>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            identity: "DS102 SIM Ver2.00".to_string(),
            selected: 0,
            axes: Default::default(),
            settle_polls: 3,
            stuck: false,
            silent: false,
            garbled_motion: false,
            homing_error: None,
            history: Vec::new(),
            opened: None,
        }
    }
}

impl DeviceState {
    fn execute(&mut self, cmd: &str) -> String {
        let (op, arg) = match cmd.split_once(' ') {
            Some((op, arg)) => (op, Some(arg.trim())),
            None => (cmd, None),
        };
        match (op, arg) {
            ("*IDN?", None) => self.identity.clone(),
            (op, None) if op.starts_with("AXI") => match op[3..].parse::<usize>() {
                Ok(n) if (1..=AXES).contains(&n) => {
                    self.selected = n - 1;
                    ACK.to_string()
                }
                _ => "E22".to_string(),
            },
            (":MEMSW0", Some(v)) => match v.parse::<u32>() {
                Ok(t) if t <= 12 => {
                    self.axes[self.selected].origin_type = t;
                    ACK.to_string()
                }
                _ => "E22".to_string(),
            },
            (":SELSP", Some(v)) => match v.parse::<u32>() {
                Ok(t) if t <= 9 => {
                    self.axes[self.selected].speed_table = t;
                    ACK.to_string()
                }
                _ => "E22".to_string(),
            },
            (":GO", Some(mode)) => {
                if let Some(code) = &self.homing_error {
                    return code.clone();
                }
                let target = match mode {
                    "2" => 0.0,
                    "3" => self.axes[self.selected].home,
                    _ => return "E22".to_string(),
                };
                self.start_motion(target)
            }
            (":GOABS", Some(v)) => match v.parse::<f64>() {
                Ok(target) if target.is_finite() => self.start_motion(target),
                _ => "E22".to_string(),
            },
            (":POS", Some(v)) => {
                let axis = &mut self.axes[self.selected];
                if axis.target.is_some() {
                    return "E01".to_string();
                }
                match v.parse::<f64>() {
                    Ok(p) => {
                        axis.position = p;
                        ACK.to_string()
                    }
                    Err(_) => "E22".to_string(),
                }
            }
            (":HOMEP", Some(v)) => match v.parse::<f64>() {
                Ok(p) => {
                    self.axes[self.selected].home = p;
                    ACK.to_string()
                }
                Err(_) => "E22".to_string(),
            },
            (":POS?", None) => format!("{}", self.axes[self.selected].position),
            ("MOTIONA?", None) => {
                if self.garbled_motion {
                    return "#?".to_string();
                }
                self.tick();
                self.motion_mask().to_string()
            }
            (op, None) if op.starts_with("STOP_") => match &op[5..] {
                "0" | "1" => {
                    for axis in &mut self.axes {
                        axis.target = None;
                        axis.remaining_polls = 0;
                    }
                    ACK.to_string()
                }
                _ => "E22".to_string(),
            },
            _ => "E20".to_string(),
        }
    }

    fn start_motion(&mut self, target: f64) -> String {
        let settle = self.settle_polls;
        let axis = &mut self.axes[self.selected];
        if axis.target.is_some() {
            return "E01".to_string();
        }
        if settle == 0 && !self.stuck {
            axis.position = target;
        } else {
            axis.target = Some(target);
            axis.remaining_polls = settle;
        }
        ACK.to_string()
    }

    fn tick(&mut self) {
        if self.stuck {
            return;
        }
        for axis in &mut self.axes {
            if let Some(target) = axis.target {
                axis.remaining_polls = axis.remaining_polls.saturating_sub(1);
                if axis.remaining_polls == 0 {
                    axis.position = target;
                    axis.target = None;
                }
            }
        }
    }

    fn motion_mask(&self) -> u32 {
        self.axes
            .iter()
            .enumerate()
            .filter(|(_, a)| a.target.is_some())
            .fold(0, |mask, (i, _)| mask | (1 << i))
    }
}

/// Shared handle to one simulated controller. Clones observe the same device.
#[derive(Debug, Clone, Default)]
pub struct SimDevice {
    inner: Arc<Mutex<DeviceState>>,
}

impl SimDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `MOTIONA?` polls a started motion takes to finish (0 = instant).
    pub fn with_settle_polls(self, polls: u32) -> Self {
        self.state().settle_polls = polls;
        self
    }

    /// Device that accepts the port open but never answers.
    pub fn silent(self) -> Self {
        self.set_silent(true);
        self
    }

    /// Motions start but never complete until a stop arrives.
    pub fn stuck(self) -> Self {
        self.set_stuck(true);
        self
    }

    /// `MOTIONA?` answers with an unparsable reply.
    pub fn garbled_motion(self) -> Self {
        self.state().garbled_motion = true;
        self
    }

    /// Origin-return drives answer with the given device error code.
    pub fn failing_homing(self, code: &str) -> Self {
        self.state().homing_error = Some(code.to_string());
        self
    }

    pub fn set_silent(&self, silent: bool) {
        self.state().silent = silent;
    }

    pub fn set_stuck(&self, stuck: bool) {
        self.state().stuck = stuck;
    }

    pub fn clear_homing_error(&self) {
        self.state().homing_error = None;
    }

    /// Every command received so far, without terminators.
    pub fn history(&self) -> Vec<String> {
        self.state().history.clone()
    }

    /// Current position of axis `n` (1 = X, 2 = Y).
    pub fn position(&self, n: usize) -> f64 {
        self.state()
            .axes
            .get(n.wrapping_sub(1))
            .map(|a| a.position)
            .unwrap_or(0.0)
    }

    pub fn is_moving(&self) -> bool {
        self.state().motion_mask() != 0
    }

    /// Port and baud rate of the most recent successful open.
    pub fn opened(&self) -> Option<(String, u32)> {
        self.state().opened.clone()
    }

    /// Handle one command line; `None` when the device stays silent.
    pub fn handle(&self, cmd: &str) -> Option<String> {
        let mut s = self.state();
        s.history.push(cmd.to_string());
        if s.silent {
            return None;
        }
        let reply = s.execute(cmd);
        tracing::trace!(cmd, reply = %reply, "sim device");
        Some(reply)
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-memory link to a `SimDevice`.
pub struct SimulatedLink {
    device: SimDevice,
    inbox: Vec<u8>,
    outbox: VecDeque<u8>,
}

impl SimulatedLink {
    pub fn new(device: SimDevice) -> Self {
        Self {
            device,
            inbox: Vec::new(),
            outbox: VecDeque::new(),
        }
    }
}

impl SerialLink for SimulatedLink {
    fn write_all(&mut self, frame: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.inbox.extend_from_slice(frame);
        while let Some(end) = self.inbox.iter().position(|b| *b == CR) {
            let line: Vec<u8> = self.inbox.drain(..=end).collect();
            let cmd = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
            if let Some(reply) = self.device.handle(cmd.trim()) {
                self.outbox.extend(reply.as_bytes());
                self.outbox.push_back(CR);
            }
        }
        Ok(())
    }

    fn read_until(
        &mut self,
        terminator: u8,
        _timeout: Duration,
    ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
        match self.outbox.iter().position(|b| *b == terminator) {
            Some(end) => Ok(self.outbox.drain(..=end).collect()),
            None => Err(Box::new(HwError::Timeout)),
        }
    }

    fn clear_input(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.outbox.clear();
        Ok(())
    }
}

/// Connector that hands out links to a single simulated device.
#[derive(Debug, Clone)]
pub struct SimulatedConnector {
    device: SimDevice,
    available: bool,
}

impl SimulatedConnector {
    pub fn new(device: SimDevice) -> Self {
        Self {
            device,
            available: true,
        }
    }

    /// Connector whose port never opens.
    pub fn unavailable() -> Self {
        Self {
            device: SimDevice::new(),
            available: false,
        }
    }

    pub fn device(&self) -> &SimDevice {
        &self.device
    }
}

impl Connector for SimulatedConnector {
    fn open(
        &self,
        port: &str,
        baud_rate: u32,
        _timeout: Duration,
    ) -> Result<Box<dyn SerialLink>, Box<dyn std::error::Error + Send + Sync>> {
        if !self.available {
            return Err(Box::new(HwError::Open(format!("{port}: no such device"))));
        }
        self.device.state().opened = Some((port.to_string(), baud_rate));
        tracing::debug!(port, baud_rate, "simulated port opened");
        Ok(Box::new(SimulatedLink::new(self.device.clone())))
    }
}
