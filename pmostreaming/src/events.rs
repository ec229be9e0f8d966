use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::trace;

use crate::model::{DeviceId, StreamingEvent, StreamingEventType};

/// Fan-out of [`StreamingEvent`]s to every live subscriber.
///
/// Each subscriber owns its channel. Events published from different threads
/// carry no ordering guarantee between them.
#[derive(Clone, Default)]
pub struct StreamingEventBus {
    subscribers: Arc<Mutex<Vec<Sender<StreamingEvent>>>>,
}

impl StreamingEventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> Receiver<StreamingEvent> {
        let (tx, rx) = unbounded::<StreamingEvent>();
        {
            let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
            subscribers.push(tx);
        }
        rx
    }

    /// Subscribers whose receiver was dropped are pruned here.
    pub fn broadcast(&self, event: StreamingEvent) {
        trace!(device = %event.device_id, kind = %event.kind, "Publishing streaming event");
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub(crate) fn send_success(&self, kind: StreamingEventType, device_id: &DeviceId) {
        self.broadcast(StreamingEvent::success(kind, device_id.clone()));
    }

    pub(crate) fn send_status(&self, device_id: &DeviceId, duration: u64, position: u64) {
        self.broadcast(StreamingEvent::status(device_id.clone(), duration, position));
    }

    pub(crate) fn send_failure(
        &self,
        kind: StreamingEventType,
        device_id: &DeviceId,
        message: impl Into<String>,
    ) {
        self.broadcast(StreamingEvent::failure(kind, device_id.clone(), message));
    }
}
