use std::sync::Arc;

use tracing::{debug, info};

use crate::airplay::command::AirplayCommand;
use crate::airplay::control_point::ControlPoint;
use crate::airplay::response::CommandResponse;
use crate::events::StreamingEventBus;
use crate::model::{ContentMetadata, Device, DeviceType, StreamingEventType};
use crate::streamer::DeviceStreamer;

const DURATION_KEY: &str = "duration";
const POSITION_KEY: &str = "position";

#[derive(Clone)]
pub struct AirplayStreamer {
    control_point: Arc<dyn ControlPoint>,
    events: StreamingEventBus,
}

impl AirplayStreamer {
    pub fn new(control_point: Arc<dyn ControlPoint>, events: StreamingEventBus) -> Self {
        Self {
            control_point,
            events,
        }
    }

    /// Jumps to `position` seconds. Completion is reported as a STATUS event
    /// without progress.
    pub fn seek(&self, device: Arc<Device>, position: f64) {
        self.send(device, StreamingEventType::Status, AirplayCommand::seek(position));
    }

    fn send(&self, device: Arc<Device>, kind: StreamingEventType, command: AirplayCommand) {
        let streamer = self.clone();
        let target = Arc::clone(&device);
        let polls_status = matches!(command, AirplayCommand::Status);

        self.control_point.execute(
            device,
            command,
            Box::new(move |result| match result {
                Ok(response) if polls_status => streamer.handle_status(target, &response),
                Ok(_) => streamer.events.send_success(kind, target.id()),
                Err(err) => streamer.events.send_failure(kind, target.id(), err.to_string()),
            }),
        );
    }

    fn handle_status(&self, device: Arc<Device>, response: &CommandResponse) {
        if response.content_parameters().is_empty() {
            debug!(device = %device.id(), "AirPlay status without parameters");
            return;
        }

        let duration = response.seconds_parameter(DURATION_KEY);
        let position = response.seconds_parameter(POSITION_KEY);
        self.events.send_status(device.id(), duration, position);

        if duration > 0 && position >= duration {
            info!(device = %device.id(), duration, position, "End of content reached, stopping");
            self.stop(device);
        }
    }
}

impl DeviceStreamer for AirplayStreamer {
    fn device_type(&self) -> DeviceType {
        DeviceType::Airplay
    }

    fn play(&self, device: Arc<Device>, content_url: &str, _metadata: &ContentMetadata) {
        self.send(
            device,
            StreamingEventType::Play,
            AirplayCommand::play(content_url, 0.0),
        );
    }

    fn stop(&self, device: Arc<Device>) {
        self.send(device, StreamingEventType::Stop, AirplayCommand::Stop);
    }

    fn pause(&self, device: Arc<Device>) {
        self.send(device, StreamingEventType::Pause, AirplayCommand::rate(0.0));
    }

    fn resume(&self, device: Arc<Device>) {
        self.send(device, StreamingEventType::Resume, AirplayCommand::rate(1.0));
    }

    fn update_status(&self, device: Arc<Device>) {
        self.send(device, StreamingEventType::Status, AirplayCommand::Status);
    }
}
