use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, info, warn};

use crate::errors::StreamingError;
use crate::events::StreamingEventBus;
use crate::model::{
    ContentMetadata, Device, DeviceId, DeviceType, EventOutcome, SessionStatus, StreamingEvent,
    StreamingEventType, StreamingSession,
};
use crate::registry::DeviceRegistry;
use crate::session::SessionRegistry;
use crate::streamer::DeviceStreamer;

/// One streamer per device family.
#[derive(Default, Clone)]
pub struct StreamerTable {
    streamers: HashMap<DeviceType, Arc<dyn DeviceStreamer>>,
}

impl StreamerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `streamer` for the family it reports, replacing any previous one.
    pub fn register(&mut self, streamer: Arc<dyn DeviceStreamer>) {
        self.streamers.insert(streamer.device_type(), streamer);
    }

    pub fn with(mut self, streamer: Arc<dyn DeviceStreamer>) -> Self {
        self.register(streamer);
        self
    }

    pub fn get(&self, device_type: DeviceType) -> Result<Arc<dyn DeviceStreamer>, StreamingError> {
        self.streamers
            .get(&device_type)
            .cloned()
            .ok_or_else(|| StreamingError::unsupported_device_type(device_type))
    }

    pub fn supports(&self, device_type: DeviceType) -> bool {
        self.streamers.contains_key(&device_type)
    }
}

/// Entry point for playback control.
///
/// Commands are routed to the streamer of the device's family; session state
/// follows from the events those streamers publish, applied on the
/// `streaming-events` thread.
pub struct StreamingManager {
    devices: Arc<DeviceRegistry>,
    sessions: Arc<SessionRegistry>,
    streamers: StreamerTable,
}

impl StreamingManager {
    pub fn new(
        devices: Arc<DeviceRegistry>,
        sessions: Arc<SessionRegistry>,
        streamers: StreamerTable,
    ) -> Self {
        Self {
            devices,
            sessions,
            streamers,
        }
    }

    /// Applies every event published on `bus` to the session registry.
    ///
    /// The thread ends once every publisher of the bus is gone.
    pub fn listen(&self, bus: &StreamingEventBus) -> Result<(), StreamingError> {
        let rx = bus.subscribe();
        let sessions = Arc::clone(&self.sessions);

        thread::Builder::new()
            .name("streaming-events".into())
            .spawn(move || {
                for event in rx.iter() {
                    apply_event(&sessions, &event);
                }
                debug!("Streaming event channel closed, handler exiting");
            })
            .map(|_| ())
            .map_err(|err| StreamingError::WorkerPool(err.to_string()))
    }

    pub fn handle_event(&self, event: &StreamingEvent) {
        apply_event(&self.sessions, event);
    }

    pub fn device_registry(&self) -> &Arc<DeviceRegistry> {
        &self.devices
    }

    pub fn session_registry(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn add_device(&self, device: Device) -> Arc<Device> {
        info!(
            device = %device.id(),
            name = device.name(),
            kind = %device.device_type(),
            host = device.host_address(),
            "Add device"
        );
        self.devices.add_device(device)
    }

    /// Forgets the device and its session. Returns whether it was known.
    pub fn remove_device(&self, id: &DeviceId) -> bool {
        if self.devices.remove_device(id) {
            info!(device = %id, "Remove device");
            self.sessions.remove_device(id);
            true
        } else {
            false
        }
    }

    pub fn find_devices(&self, host_address: &str) -> Vec<Arc<Device>> {
        self.devices.find_by_host_address(host_address)
    }

    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.devices()
    }

    pub fn get_device(&self, id: &DeviceId) -> Result<Arc<Device>, StreamingError> {
        self.devices.get_device(id)
    }

    pub fn get_session(&self, id: &DeviceId) -> Result<StreamingSession, StreamingError> {
        self.sessions.get_session(id)
    }

    pub fn sessions(&self) -> Vec<StreamingSession> {
        self.sessions.sessions()
    }

    pub(crate) fn streamer_for(
        &self,
        device: &Device,
    ) -> Result<Arc<dyn DeviceStreamer>, StreamingError> {
        self.streamers.get(device.device_type()).inspect_err(|err| {
            error!(device = %device.id(), error = %err, "No streamer for device");
        })
    }

    /// Starts `content_url` on the device.
    ///
    /// The session is created before the device confirms; it turns PLAYING
    /// when the PLAY event arrives.
    pub fn play(
        &self,
        id: &DeviceId,
        content_url: &str,
        metadata: &ContentMetadata,
    ) -> Result<(), StreamingError> {
        let device = self.devices.get_device(id)?;
        let streamer = self.streamer_for(&device)?;
        self.sessions.init_session(id, content_url, &metadata.name);
        debug!(device = %id, url = content_url, "Play");
        streamer.play(device, content_url, metadata);
        Ok(())
    }

    pub fn stop(&self, id: &DeviceId) -> Result<(), StreamingError> {
        let device = self.devices.get_device(id)?;
        self.streamer_for(&device)?.stop(device);
        Ok(())
    }

    pub fn pause(&self, id: &DeviceId) -> Result<(), StreamingError> {
        let device = self.devices.get_device(id)?;
        self.streamer_for(&device)?.pause(device);
        Ok(())
    }

    pub fn resume(&self, id: &DeviceId) -> Result<(), StreamingError> {
        let device = self.devices.get_device(id)?;
        self.streamer_for(&device)?.resume(device);
        Ok(())
    }
}

fn apply_event(sessions: &SessionRegistry, event: &StreamingEvent) {
    let id = &event.device_id;
    let progress = match &event.outcome {
        EventOutcome::Success { progress } => *progress,
        EventOutcome::Failure { message } => {
            error!(kind = %event.kind, device = %id, error = %message, "Streaming command failed");
            return;
        }
    };

    let result = match event.kind {
        StreamingEventType::Play | StreamingEventType::Resume => {
            sessions.update_status(id, SessionStatus::Playing)
        }
        StreamingEventType::Stop => sessions.update_status(id, SessionStatus::Waiting),
        StreamingEventType::Pause => sessions.update_status(id, SessionStatus::Paused),
        StreamingEventType::Status => match progress {
            Some((duration, position)) => sessions.update_position(id, position, duration),
            None => Ok(()),
        },
    };

    match result {
        Ok(()) => debug!(kind = %event.kind, device = %id, "Session updated"),
        Err(err) if err.is_unknown_entry() => {
            warn!(
                kind = %event.kind,
                device = %id,
                error = %err,
                "Event for a removed session ignored"
            );
        }
        Err(err) => error!(kind = %event.kind, device = %id, error = %err, "Cannot apply event"),
    }
}
