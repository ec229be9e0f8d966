use thiserror::Error;

use crate::model::{DeviceId, DeviceType};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamingError {
    #[error("Unknown device: {0}")]
    UnknownDevice(String),
    #[error("Unknown session: {0}")]
    UnknownSession(String),
    #[error("No streamer registered for device type {0}")]
    UnsupportedDeviceType(String),
    #[error("Device {0} is not a {1} device")]
    WrongDeviceType(String, String),
    // Raw IO text, forwarded as-is in failure events
    #[error("{0}")]
    Transport(String),
    #[error("{message}")]
    CommandRejected { code: u16, message: String },
    #[error("{0}")]
    ParsingError(String),
    #[error("Missing {0} element in SOAP body")]
    UpnpMissingReturnValue(String),
    #[error("Soap Error: Upnp action call {0}")]
    SoapAction(String),
    #[error("{0} returned UPnP error {1}: {2} (HTTP status {3})")]
    SoapUpnpError(String, u32, String, u16),
    #[error("{0} failed with HTTP status {1} and body: {2}")]
    SoapActionWrongBody(String, u16, String),
    #[error("Soap Error: No envelope for action {0}")]
    SoapNoEnvelope(String),
    #[error("Worker pool error: {0}")]
    WorkerPool(String),
}

impl StreamingError {
    pub fn unknown_device(id: &DeviceId) -> Self {
        StreamingError::UnknownDevice(id.0.clone())
    }

    pub fn unknown_session(id: &DeviceId) -> Self {
        StreamingError::UnknownSession(id.0.clone())
    }

    pub fn unsupported_device_type(device_type: DeviceType) -> Self {
        StreamingError::UnsupportedDeviceType(device_type.to_string())
    }

    pub fn wrong_device_type(id: &DeviceId, expected: DeviceType) -> Self {
        StreamingError::WrongDeviceType(id.0.clone(), expected.to_string())
    }

    pub fn transport(err: impl std::fmt::Display) -> Self {
        StreamingError::Transport(err.to_string())
    }

    pub fn upnp_missing_return_value(value: &str) -> Self {
        StreamingError::UpnpMissingReturnValue(value.to_string())
    }

    /// True for lookups that raced a device or session removal.
    pub fn is_unknown_entry(&self) -> bool {
        matches!(
            self,
            StreamingError::UnknownDevice(_) | StreamingError::UnknownSession(_)
        )
    }
}
