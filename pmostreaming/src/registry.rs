use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::errors::StreamingError;
use crate::model::{Device, DeviceId};

/// Devices currently reachable on the network, keyed by id.
///
/// Written by discovery listeners, read by request handlers and the
/// status scheduler.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<DeviceId, Arc<Device>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the device with the same id.
    ///
    /// A replaced device is not closed: its connection stays open until the
    /// last in-flight command drops it.
    pub fn add_device(&self, device: Device) -> Arc<Device> {
        let device = Arc::new(device);
        let previous = self
            .devices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device.id().clone(), Arc::clone(&device));

        if previous.is_some() {
            warn!(
                device = %device.id(),
                "Device replaced without closing its previous connection"
            );
        } else {
            debug!(device = %device.id(), name = device.name(), "Device registered");
        }
        device
    }

    /// Closes and forgets the device. Returns whether it was known.
    pub fn remove_device(&self, id: &DeviceId) -> bool {
        let removed = self
            .devices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);

        match removed {
            Some(device) => {
                device.close();
                true
            }
            None => false,
        }
    }

    pub fn get_device(&self, id: &DeviceId) -> Result<Arc<Device>, StreamingError> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| StreamingError::unknown_device(id))
    }

    /// Devices whose stored host address equals `host_address` exactly.
    pub fn find_by_host_address(&self, host_address: &str) -> Vec<Arc<Device>> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|device| device.host_address() == host_address)
            .cloned()
            .collect()
    }

    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DeviceType;
    use crate::upnp::testing::FakeTransport;

    fn upnp_device(id: &str, host: &str, transport: &Arc<FakeTransport>) -> Device {
        Device::upnp(
            DeviceId::new(id),
            format!("Renderer {id}"),
            host,
            vec!["audio/mpeg".to_string()],
            transport.clone(),
        )
    }

    #[test]
    fn add_then_get_returns_the_device() {
        let registry = DeviceRegistry::new();
        let transport = FakeTransport::new();
        registry.add_device(upnp_device("r1", "10.0.0.2", &transport));

        let device = registry.get_device(&DeviceId::new("r1")).unwrap();
        assert_eq!(device.device_type(), DeviceType::Upnp);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_closes_exactly_once_and_forgets() {
        let registry = DeviceRegistry::new();
        let transport = FakeTransport::new();
        registry.add_device(upnp_device("r1", "10.0.0.2", &transport));

        assert!(registry.remove_device(&DeviceId::new("r1")));
        assert!(!registry.remove_device(&DeviceId::new("r1")));
        assert_eq!(transport.release_count(), 1);

        let err = registry.get_device(&DeviceId::new("r1")).unwrap_err();
        assert_eq!(err, StreamingError::UnknownDevice("r1".to_string()));
    }

    #[test]
    fn unknown_device_lookup_fails() {
        let registry = DeviceRegistry::new();
        assert!(matches!(
            registry.get_device(&DeviceId::new("ghost")),
            Err(StreamingError::UnknownDevice(id)) if id == "ghost"
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn replacing_a_device_does_not_close_the_old_one() {
        let registry = DeviceRegistry::new();
        let first = FakeTransport::new();
        let second = FakeTransport::new();
        registry.add_device(upnp_device("r1", "10.0.0.2", &first));
        registry.add_device(upnp_device("r1", "10.0.0.3", &second));

        assert_eq!(first.release_count(), 0);
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get_device(&DeviceId::new("r1")).unwrap().host_address(),
            "10.0.0.3"
        );
    }

    #[test]
    fn find_by_host_address_is_an_exact_match() {
        let registry = DeviceRegistry::new();
        let transport = FakeTransport::new();
        registry.add_device(upnp_device("a", "10.0.0.2", &transport));
        registry.add_device(upnp_device("b", "10.0.0.2", &transport));
        registry.add_device(upnp_device("c", "10.0.0.20", &transport));

        let mut found: Vec<String> = registry
            .find_by_host_address("10.0.0.2")
            .iter()
            .map(|d| d.id().0.clone())
            .collect();
        found.sort();

        assert_eq!(found, vec!["a".to_string(), "b".to_string()]);
        assert!(registry.find_by_host_address("10.0.0").is_empty());
        assert_eq!(registry.devices().len(), 3);
    }
}
