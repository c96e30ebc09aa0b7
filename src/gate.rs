// Initialization gate
// One-shot readiness signal shared by the registry and every event handler
// that may run before the registry is populated
//
// Numan Thabit 2025 Nov

use crate::errors::{MetricsError, Result};
use tokio::sync::watch;

/// Opens exactly once; any number of tasks may wait on it.
#[derive(Debug)]
pub struct InitGate {
    tx: watch::Sender<bool>,
}

impl Default for InitGate {
    fn default() -> Self {
        Self::new()
    }
}

impl InitGate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Signal readiness. A second call fails with `AlreadyInitialized`.
    pub fn open(&self) -> Result<()> {
        let mut opened = false;
        self.tx.send_if_modified(|ready| {
            if *ready {
                return false;
            }
            *ready = true;
            opened = true;
            true
        });
        if opened {
            Ok(())
        } else {
            Err(MetricsError::AlreadyInitialized)
        }
    }

    pub fn is_open(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the gate is open. Returns immediately if it already is.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // the sender lives in `self`, so the channel cannot close while we wait
        let _ = rx.wait_for(|ready| *ready).await;
    }
}
