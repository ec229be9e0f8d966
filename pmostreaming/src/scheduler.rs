use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use tracing::{debug, info, warn};

use crate::errors::StreamingError;
use crate::manager::StreamingManager;
use crate::model::SessionStatus;

/// Periodically asks every playing device for its progress.
///
/// Runs with a fixed delay between ticks on the `streaming-status` thread.
pub struct StatusPollingScheduler {
    stop_tx: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl StatusPollingScheduler {
    /// Starts polling every `interval_seconds`; zero or less disables it.
    pub fn start(
        manager: Arc<StreamingManager>,
        interval_seconds: i64,
    ) -> Result<Self, StreamingError> {
        if interval_seconds <= 0 {
            info!(interval_seconds, "Status polling disabled");
            return Ok(Self::disabled());
        }

        let interval = Duration::from_secs(interval_seconds.unsigned_abs());
        let (stop_tx, stop_rx) = bounded::<()>(0);

        let handle = thread::Builder::new()
            .name("streaming-status".into())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => poll_playing_sessions(&manager),
                        _ => break,
                    }
                }
                debug!("Status polling thread exiting");
            })
            .map_err(|err| StreamingError::WorkerPool(err.to_string()))?;

        info!(interval_seconds, "Status polling started");
        Ok(Self {
            stop_tx: Mutex::new(Some(stop_tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn disabled() -> Self {
        Self {
            stop_tx: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Stops the thread and waits for it. Idempotent.
    pub fn stop(&self) {
        drop(
            self.stop_tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Drop for StatusPollingScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One polling pass over the current sessions.
///
/// Sessions whose device disappeared meanwhile are skipped.
pub fn poll_playing_sessions(manager: &StreamingManager) {
    for session in manager.sessions() {
        if session.status != SessionStatus::Playing {
            continue;
        }

        let device = match manager.get_device(&session.device_id) {
            Ok(device) => device,
            Err(err) => {
                debug!(
                    device = %session.device_id,
                    error = %err,
                    "Skipping status of removed device"
                );
                continue;
            }
        };

        match manager.streamer_for(&device) {
            Ok(streamer) => streamer.update_status(device),
            Err(err) => {
                warn!(device = %session.device_id, error = %err, "Skipping status poll");
            }
        }
    }
}
