use std::sync::Arc;

use crate::model::{ContentMetadata, Device, DeviceType};

/// Drives one device family.
///
/// Operations return immediately: the outcome of each exchange is published
/// as a [`crate::model::StreamingEvent`] once the device answered, failures
/// included.
pub trait DeviceStreamer: Send + Sync {
    fn device_type(&self) -> DeviceType;

    fn play(&self, device: Arc<Device>, content_url: &str, metadata: &ContentMetadata);

    fn stop(&self, device: Arc<Device>);

    fn pause(&self, device: Arc<Device>);

    fn resume(&self, device: Arc<Device>);

    /// Asks the device for its progress; success carries `(duration, position)`.
    fn update_status(&self, device: Arc<Device>);
}
