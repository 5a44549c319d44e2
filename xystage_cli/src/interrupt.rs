//! Ctrl-C → emergency stop.
//!
//! The signal handler only posts to a channel; a watcher thread owns the
//! service handle and issues the stop, so no stage work runs in signal
//! context.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel as xch;
use xystage_core::StageService;

/// Watches for Ctrl-C while alive. Dropping it ends the watcher.
pub struct StopOnInterrupt {
    done: Option<xch::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StopOnInterrupt {
    pub fn arm(svc: Arc<StageService>) -> eyre::Result<Self> {
        let (sig_tx, sig_rx) = xch::bounded::<()>(1);
        let (done_tx, done_rx) = xch::bounded::<()>(0);
        ctrlc::set_handler(move || {
            let _ = sig_tx.try_send(());
        })
        .map_err(|e| eyre::eyre!("install Ctrl-C handler: {e}"))?;

        let handle = thread::spawn(move || {
            xch::select! {
                recv(sig_rx) -> msg => {
                    if msg.is_ok() {
                        tracing::warn!("interrupt received, stopping stage");
                        let ack = svc.stop();
                        tracing::warn!(?ack, "emergency stop issued");
                    }
                }
                recv(done_rx) -> _ => {}
            }
        });
        Ok(Self {
            done: Some(done_tx),
            handle: Some(handle),
        })
    }
}

impl Drop for StopOnInterrupt {
    fn drop(&mut self) {
        // closing the channel wakes the watcher
        drop(self.done.take());
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}
