use std::time::Duration;

use anyhow::Result;
use pmoconfig::Config;

use crate::airplay::DEFAULT_SOCKET_TIMEOUT;
use crate::airplay::control_point::DEFAULT_POOL_SIZE;

/// Settings of the streaming layer, read once at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamingConfig {
    /// Zero or less disables status polling.
    pub status_update_delay_seconds: i64,
    pub upnp_enabled: bool,
    pub upnp_http_timeout: Duration,
    pub upnp_worker_pool_size: usize,
    pub airplay_enabled: bool,
    pub airplay_socket_timeout: Duration,
    pub airplay_worker_pool_size: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            status_update_delay_seconds: 3,
            upnp_enabled: true,
            upnp_http_timeout: Duration::from_secs(10),
            upnp_worker_pool_size: DEFAULT_POOL_SIZE,
            airplay_enabled: true,
            airplay_socket_timeout: DEFAULT_SOCKET_TIMEOUT,
            airplay_worker_pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl StreamingConfig {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            status_update_delay_seconds: config.get_status_update_delay_seconds()?,
            upnp_enabled: config.get_upnp_enabled()?,
            upnp_http_timeout: seconds(config.get_upnp_http_timeout_seconds()?),
            upnp_worker_pool_size: config.get_upnp_worker_pool_size()?.max(1),
            airplay_enabled: config.get_airplay_enabled()?,
            airplay_socket_timeout: seconds(config.get_airplay_socket_timeout_seconds()?),
            airplay_worker_pool_size: config.get_airplay_worker_pool_size()?.max(1),
        })
    }

    /// Reads the process-wide PMOMusic configuration.
    pub fn from_global_config() -> Result<Self> {
        Self::from_config(&pmoconfig::get_config())
    }
}

// A zero timeout would block forever on the socket
fn seconds(value: usize) -> Duration {
    Duration::from_secs(value.max(1) as u64)
}
