//! AirPlay receivers: wire codec, control socket and streamer.

pub mod command;
pub mod connection;
pub mod control_point;
pub mod features;
pub mod response;
pub mod streamer;

pub use command::{AirplayCommand, CommandMethod};
pub use connection::{AirplayConnection, DEFAULT_AIRPLAY_PORT, DEFAULT_SOCKET_TIMEOUT};
pub use control_point::{AsyncControlPoint, CommandCallback, ControlPoint, SyncControlPoint};
pub use features::AirplayFeatures;
pub use response::{CONTENT_TYPE_PARAMETERS, CommandResponse};
pub use streamer::AirplayStreamer;
