use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::debug;

use crate::errors::StreamingError;
use crate::model::{DeviceId, SessionStatus, StreamingSession};

type SessionCell = Arc<Mutex<StreamingSession>>;

/// Playback sessions, one per device.
///
/// Each record has its own lock so the event handler and the status
/// scheduler only contend on the same device.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<DeviceId, SessionCell>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or overwrites the session of `device_id`.
    pub fn init_session(
        &self,
        device_id: &DeviceId,
        content_url: &str,
        content_name: &str,
    ) -> StreamingSession {
        let session = StreamingSession::new(device_id.clone(), content_url, content_name);
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device_id.clone(), Arc::new(Mutex::new(session.clone())));
        debug!(device = %device_id, url = content_url, "Session initialized");
        session
    }

    fn cell(&self, device_id: &DeviceId) -> Result<SessionCell, StreamingError> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device_id)
            .cloned()
            .ok_or_else(|| StreamingError::unknown_session(device_id))
    }

    pub fn get_session(&self, device_id: &DeviceId) -> Result<StreamingSession, StreamingError> {
        let cell = self.cell(device_id)?;
        let session = cell.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(session.clone())
    }

    pub fn update_status(
        &self,
        device_id: &DeviceId,
        status: SessionStatus,
    ) -> Result<(), StreamingError> {
        let cell = self.cell(device_id)?;
        let mut session = cell.lock().unwrap_or_else(PoisonError::into_inner);
        session.status = status;
        Ok(())
    }

    /// Records progress reported by the device.
    ///
    /// Once a duration is known, reaching it (or the device reporting no
    /// duration anymore) ends playback.
    pub fn update_position(
        &self,
        device_id: &DeviceId,
        position: u64,
        duration: u64,
    ) -> Result<(), StreamingError> {
        let cell = self.cell(device_id)?;
        let mut session = cell.lock().unwrap_or_else(PoisonError::into_inner);
        if session.duration > 0 && (position >= duration || duration == 0) {
            debug!(device = %device_id, position, duration, "Playback reached end of content");
            session.status = SessionStatus::Waiting;
        }
        session.position = position;
        session.duration = duration;
        Ok(())
    }

    pub fn remove_device(&self, device_id: &DeviceId) -> bool {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(device_id)
            .is_some()
    }

    /// Snapshot of every session.
    pub fn sessions(&self) -> Vec<StreamingSession> {
        let cells: Vec<SessionCell> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        cells
            .iter()
            .map(|cell| cell.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .collect()
    }
}
