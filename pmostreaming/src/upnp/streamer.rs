use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::StreamingError;
use crate::events::StreamingEventBus;
use crate::model::{ContentMetadata, Device, DeviceType, StreamingEventType};
use crate::pool::DeviceWorkQueue;
use crate::streamer::DeviceStreamer;
use crate::upnp::avtransport::{AvTransport, TransportState};
use crate::upnp::didl::build_didl_metadata;

/// What an exchange tells the event bus once it completed.
enum Completion {
    Success,
    Progress { duration: u64, position: u64 },
    /// The renderer reports that nothing is playing.
    Stopped,
    Silent,
}

/// Drives renderers through AVTransport on a worker pool.
///
/// Exchanges for one renderer are queued per device; a status poll is
/// skipped while another one still waits for the same renderer.
#[derive(Clone)]
pub struct UpnpStreamer {
    queue: Arc<DeviceWorkQueue>,
    events: StreamingEventBus,
}

impl UpnpStreamer {
    pub fn new(pool_size: usize, events: StreamingEventBus) -> Result<Self, StreamingError> {
        let queue = DeviceWorkQueue::new("upnp-streamer", pool_size)
            .map_err(|err| StreamingError::WorkerPool(err.to_string()))?;
        Ok(Self::with_queue(Arc::new(queue), events))
    }

    pub fn with_queue(queue: Arc<DeviceWorkQueue>, events: StreamingEventBus) -> Self {
        Self { queue, events }
    }

    fn submit<F>(&self, device: Arc<Device>, kind: StreamingEventType, exchange: F)
    where
        F: FnOnce(&dyn AvTransport) -> Result<Completion, StreamingError> + Send + 'static,
    {
        let events = self.events.clone();
        let target = Arc::clone(&device);

        let job = move || {
            let result = match target.upnp_connection() {
                Some(connection) => {
                    let _serialized = connection.lock_commands();
                    exchange(connection.transport())
                }
                None => Err(StreamingError::wrong_device_type(target.id(), DeviceType::Upnp)),
            };

            match result {
                Ok(Completion::Success) => events.send_success(kind, target.id()),
                Ok(Completion::Progress { duration, position }) => {
                    events.send_status(target.id(), duration, position)
                }
                Ok(Completion::Stopped) => {
                    debug!(device = %target.id(), "Renderer is not playing anymore");
                    events.send_success(StreamingEventType::Stop, target.id())
                }
                Ok(Completion::Silent) => {}
                Err(err) => {
                    warn!(device = %target.id(), kind = %kind, error = %err, "UPnP command failed");
                    events.send_failure(kind, target.id(), err.to_string())
                }
            }
        };

        let submitted = if kind == StreamingEventType::Status {
            self.queue.execute_status_poll(device.id(), job).map(|_| ())
        } else {
            self.queue.execute(device.id(), job)
        };
        if let Err(err) = submitted {
            self.events.send_failure(kind, device.id(), err.to_string());
        }
    }
}

fn set_uri_and_play(
    transport: &dyn AvTransport,
    url: &str,
    metadata: &str,
) -> Result<(), StreamingError> {
    transport.set_av_transport_uri(url, metadata)?;
    transport.play()
}

fn play_exchange(
    transport: &dyn AvTransport,
    url: &str,
    metadata: &str,
) -> Result<Completion, StreamingError> {
    let media = transport.get_media_info()?;
    match media.current_uri.as_deref() {
        None => set_uri_and_play(transport, url, metadata)?,
        Some(current) if current == url => transport.play()?,
        Some(_) => {
            let info = transport.get_transport_info()?;
            if info.current_transport_state.is_active() {
                transport.stop()?;
            }
            set_uri_and_play(transport, url, metadata)?;
        }
    }
    Ok(Completion::Success)
}

fn status_exchange(transport: &dyn AvTransport) -> Result<Completion, StreamingError> {
    let info = transport.get_transport_info()?;
    match info.current_transport_state {
        TransportState::Playing | TransportState::PausedPlayback => {
            let position = transport.get_position_info()?;
            Ok(Completion::Progress {
                duration: position.track_duration,
                position: position.rel_time,
            })
        }
        TransportState::Transitioning => Ok(Completion::Silent),
        _ => Ok(Completion::Stopped),
    }
}

impl DeviceStreamer for UpnpStreamer {
    fn device_type(&self) -> DeviceType {
        DeviceType::Upnp
    }

    fn play(&self, device: Arc<Device>, content_url: &str, metadata: &ContentMetadata) {
        let url = content_url.to_string();
        let didl = build_didl_metadata(content_url, metadata);
        self.submit(device, StreamingEventType::Play, move |transport| {
            play_exchange(transport, &url, &didl)
        });
    }

    fn stop(&self, device: Arc<Device>) {
        self.submit(device, StreamingEventType::Stop, |transport| {
            transport.stop().map(|_| Completion::Success)
        });
    }

    fn pause(&self, device: Arc<Device>) {
        self.submit(device, StreamingEventType::Pause, |transport| {
            transport.pause().map(|_| Completion::Success)
        });
    }

    fn resume(&self, device: Arc<Device>) {
        self.submit(device, StreamingEventType::Resume, |transport| {
            transport.play().map(|_| Completion::Success)
        });
    }

    fn update_status(&self, device: Arc<Device>) {
        self.submit(device, StreamingEventType::Status, status_exchange);
    }
}
