use std::sync::Arc;

use tracing::info;

use crate::airplay::{AirplayStreamer, AsyncControlPoint};
use crate::config::StreamingConfig;
use crate::errors::StreamingError;
use crate::events::StreamingEventBus;
use crate::manager::{StreamerTable, StreamingManager};
use crate::model::{Device, DeviceId};
use crate::registry::DeviceRegistry;
use crate::scheduler::StatusPollingScheduler;
use crate::session::SessionRegistry;
use crate::upnp::{AVTRANSPORT_SERVICE_TYPE, AvTransportClient, UpnpStreamer};

/// The wired streaming layer: bus, registries, streamers, event handler and
/// status polling.
pub struct StreamingService {
    config: StreamingConfig,
    events: StreamingEventBus,
    manager: Arc<StreamingManager>,
    scheduler: StatusPollingScheduler,
}

impl StreamingService {
    pub fn start(config: StreamingConfig) -> Result<Self, StreamingError> {
        let events = StreamingEventBus::new();
        let mut streamers = StreamerTable::new();

        if config.airplay_enabled {
            let control_point = AsyncControlPoint::new(config.airplay_worker_pool_size)?;
            streamers.register(Arc::new(AirplayStreamer::new(
                Arc::new(control_point),
                events.clone(),
            )));
        }
        if config.upnp_enabled {
            streamers.register(Arc::new(UpnpStreamer::new(
                config.upnp_worker_pool_size,
                events.clone(),
            )?));
        }

        let manager = Arc::new(StreamingManager::new(
            Arc::new(DeviceRegistry::new()),
            Arc::new(SessionRegistry::new()),
            streamers,
        ));
        manager.listen(&events)?;

        let scheduler = StatusPollingScheduler::start(
            Arc::clone(&manager),
            config.status_update_delay_seconds,
        )?;

        info!(
            airplay = config.airplay_enabled,
            upnp = config.upnp_enabled,
            status_delay = config.status_update_delay_seconds,
            "Streaming service started"
        );

        Ok(Self {
            config,
            events,
            manager,
            scheduler,
        })
    }

    pub fn manager(&self) -> &Arc<StreamingManager> {
        &self.manager
    }

    pub fn events(&self) -> &StreamingEventBus {
        &self.events
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// An AirPlay device using the configured socket timeout.
    pub fn airplay_device(
        &self,
        id: DeviceId,
        name: &str,
        host_address: &str,
        port: u16,
        features: Option<&str>,
    ) -> Device {
        Device::airplay(
            id,
            name,
            host_address,
            port,
            features,
            self.config.airplay_socket_timeout,
        )
    }

    /// A UPnP renderer reached through its AVTransport control URL.
    pub fn upnp_device(
        &self,
        id: DeviceId,
        name: &str,
        host_address: &str,
        control_url: &str,
        supported_mime_types: Vec<String>,
    ) -> Device {
        let transport = AvTransportClient::new(
            control_url,
            AVTRANSPORT_SERVICE_TYPE,
            self.config.upnp_http_timeout,
        );
        Device::upnp(id, name, host_address, supported_mime_types, Arc::new(transport))
    }

    /// Stops status polling and closes every device connection.
    pub fn shutdown(&self) {
        self.scheduler.stop();
        for device in self.manager.devices() {
            self.manager.remove_device(device.id());
        }
        info!("Streaming service stopped");
    }
}
