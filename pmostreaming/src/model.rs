use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::airplay::{AirplayConnection, AirplayFeatures};
use crate::upnp::{AvTransport, UpnpConnection};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Upnp,
    Airplay,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Upnp => f.write_str("UPnP"),
            DeviceType::Airplay => f.write_str("AirPlay"),
        }
    }
}

/// Kinds of content a device can render.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceFeatures {
    pub video: bool,
    pub audio: bool,
    pub image: bool,
    pub slideshow: bool,
}

impl DeviceFeatures {
    pub fn all() -> Self {
        Self {
            video: true,
            audio: true,
            image: true,
            slideshow: true,
        }
    }

    /// Derives features from a renderer's sink MIME types.
    ///
    /// `*` or `*/*` means the renderer accepts anything.
    pub fn from_mime_types<S: AsRef<str>>(mime_types: &[S]) -> Self {
        let mut features = DeviceFeatures::default();
        for mime in mime_types {
            let mime = mime.as_ref().trim().to_ascii_lowercase();
            if mime == "*" || mime == "*/*" {
                return DeviceFeatures::all();
            }
            if mime.starts_with("video/") {
                features.video = true;
            } else if mime.starts_with("audio/") {
                features.audio = true;
            } else if mime.starts_with("image/") {
                features.image = true;
                features.slideshow = true;
            }
        }
        features
    }
}

/// Per-family connection handle owned by a [`Device`].
pub enum DeviceConnection {
    Upnp(UpnpConnection),
    Airplay(AirplayConnection),
}

impl DeviceConnection {
    pub fn device_type(&self) -> DeviceType {
        match self {
            DeviceConnection::Upnp(_) => DeviceType::Upnp,
            DeviceConnection::Airplay(_) => DeviceType::Airplay,
        }
    }

    pub fn close(&self) {
        match self {
            DeviceConnection::Upnp(conn) => conn.close(),
            DeviceConnection::Airplay(conn) => conn.close(),
        }
    }
}

impl fmt::Debug for DeviceConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceConnection::Upnp(conn) => f
                .debug_struct("Upnp")
                .field("control_url", &conn.control_url())
                .finish(),
            DeviceConnection::Airplay(conn) => f
                .debug_struct("Airplay")
                .field("address", &conn.address())
                .field("open", &conn.is_open())
                .finish(),
        }
    }
}

/// A playback device known to the server.
#[derive(Debug)]
pub struct Device {
    id: DeviceId,
    name: String,
    host_address: String,
    port: Option<u16>,
    supported_mime_types: Vec<String>,
    features: DeviceFeatures,
    connection: DeviceConnection,
}

impl Device {
    pub fn upnp(
        id: DeviceId,
        name: impl Into<String>,
        host_address: impl Into<String>,
        supported_mime_types: Vec<String>,
        transport: Arc<dyn AvTransport>,
    ) -> Self {
        let features = DeviceFeatures::from_mime_types(&supported_mime_types);
        Self {
            id,
            name: name.into(),
            host_address: host_address.into(),
            port: None,
            supported_mime_types,
            features,
            connection: DeviceConnection::Upnp(UpnpConnection::new(transport)),
        }
    }

    /// `features` is the raw hexadecimal mask from the receiver's mDNS TXT record.
    pub fn airplay(
        id: DeviceId,
        name: impl Into<String>,
        host_address: impl Into<String>,
        port: u16,
        features: Option<&str>,
        socket_timeout: Duration,
    ) -> Self {
        let host_address = host_address.into();
        let connection = AirplayConnection::new(host_address.clone(), port, socket_timeout);
        Self {
            id,
            name: name.into(),
            host_address,
            port: Some(port),
            supported_mime_types: Vec::new(),
            features: AirplayFeatures::parse(features).device_features(),
            connection: DeviceConnection::Airplay(connection),
        }
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host_address(&self) -> &str {
        &self.host_address
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn device_type(&self) -> DeviceType {
        self.connection.device_type()
    }

    /// Empty when the device did not advertise its content types.
    pub fn supported_mime_types(&self) -> &[String] {
        &self.supported_mime_types
    }

    pub fn features(&self) -> DeviceFeatures {
        self.features
    }

    pub fn connection(&self) -> &DeviceConnection {
        &self.connection
    }

    pub fn airplay_connection(&self) -> Option<&AirplayConnection> {
        match &self.connection {
            DeviceConnection::Airplay(conn) => Some(conn),
            _ => None,
        }
    }

    pub fn upnp_connection(&self) -> Option<&UpnpConnection> {
        match &self.connection {
            DeviceConnection::Upnp(conn) => Some(conn),
            _ => None,
        }
    }

    /// Releases the connection handle.
    pub fn close(&self) {
        self.connection.close();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Waiting,
    Playing,
    Paused,
}

/// Playback state of one device.
///
/// `duration` and `position` are whole seconds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamingSession {
    pub device_id: DeviceId,
    pub content_url: String,
    pub content_name: String,
    pub status: SessionStatus,
    pub duration: u64,
    pub position: u64,
}

impl StreamingSession {
    pub fn new(device_id: DeviceId, content_url: &str, content_name: &str) -> Self {
        Self {
            device_id,
            content_url: content_url.to_string(),
            content_name: content_name.to_string(),
            status: SessionStatus::Waiting,
            duration: 0,
            position: 0,
        }
    }
}

/// Content description handed over by the media catalog.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContentMetadata {
    pub id: String,
    pub parent_id: String,
    pub name: String,
    pub mime_type: String,
    pub size: Option<u64>,
}

impl ContentMetadata {
    pub fn new(
        id: impl Into<String>,
        parent_id: impl Into<String>,
        name: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.into(),
            name: name.into(),
            mime_type: mime_type.into(),
            size: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamingEventType {
    Play,
    Stop,
    Pause,
    Resume,
    Status,
}

impl fmt::Display for StreamingEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StreamingEventType::Play => "PLAY",
            StreamingEventType::Stop => "STOP",
            StreamingEventType::Pause => "PAUSE",
            StreamingEventType::Resume => "RESUME",
            StreamingEventType::Status => "STATUS",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventOutcome {
    /// `progress` is `(duration, position)` in whole seconds.
    Success { progress: Option<(u64, u64)> },
    Failure { message: String },
}

/// Outcome of a command sent to a device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamingEvent {
    pub kind: StreamingEventType,
    pub device_id: DeviceId,
    pub outcome: EventOutcome,
}

impl StreamingEvent {
    pub fn success(kind: StreamingEventType, device_id: DeviceId) -> Self {
        Self {
            kind,
            device_id,
            outcome: EventOutcome::Success { progress: None },
        }
    }

    pub fn status(device_id: DeviceId, duration: u64, position: u64) -> Self {
        Self {
            kind: StreamingEventType::Status,
            device_id,
            outcome: EventOutcome::Success {
                progress: Some((duration, position)),
            },
        }
    }

    pub fn failure(
        kind: StreamingEventType,
        device_id: DeviceId,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            device_id,
            outcome: EventOutcome::Failure {
                message: message.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, EventOutcome::Success { .. })
    }
}
