//! Device and session layer of the PMOMusic media server.
//!
//! Keeps the registry of renderers (UPnP/DLNA and AirPlay), one streaming
//! session per renderer, and drives playback through a per-family
//! [`DeviceStreamer`]. Streamers report back through a [`StreamingEventBus`];
//! the [`StreamingManager`] folds those events into session state and the
//! [`StatusPollingScheduler`] refreshes progress of playing sessions.

mod events;
mod pool;

pub mod airplay;
pub mod config;
pub mod errors;
pub mod manager;
pub mod model;
pub mod registry;
pub mod scheduler;
pub mod service;
pub mod session;
pub mod streamer;
pub mod upnp;

pub use airplay::{
    AirplayCommand, AirplayConnection, AirplayFeatures, AirplayStreamer, AsyncControlPoint,
    CommandCallback, CommandResponse, ControlPoint, SyncControlPoint,
};
pub use config::StreamingConfig;
pub use errors::StreamingError;
pub use events::StreamingEventBus;
pub use manager::{StreamerTable, StreamingManager};
pub use model::{
    ContentMetadata, Device, DeviceConnection, DeviceFeatures, DeviceId, DeviceType,
    EventOutcome, SessionStatus, StreamingEvent, StreamingEventType, StreamingSession,
};
pub use pool::{DeviceWorkQueue, WorkerPool};
pub use registry::DeviceRegistry;
pub use scheduler::StatusPollingScheduler;
pub use service::StreamingService;
pub use session::SessionRegistry;
pub use streamer::DeviceStreamer;
pub use upnp::{AvTransport, AvTransportClient, UpnpConnection, UpnpStreamer};
