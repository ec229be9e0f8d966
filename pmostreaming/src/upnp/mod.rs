//! UPnP / DLNA renderers driven through AVTransport:1.

pub mod avtransport;
pub mod didl;
pub mod soap;
pub mod streamer;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use avtransport::{
    AVTRANSPORT_SERVICE_TYPE, AvTransport, AvTransportClient, MediaInfo, PositionInfo,
    TransportInfo, TransportState,
};
pub use didl::build_didl_metadata;
pub use soap::invoke_upnp_action;
pub use streamer::UpnpStreamer;

/// Connection handle of a UPnP renderer.
///
/// Multi-action exchanges (query, stop, set URI, play) hold the command
/// lock so two commands to one renderer never interleave.
pub struct UpnpConnection {
    transport: Arc<dyn AvTransport>,
    command_lock: Mutex<()>,
}

impl UpnpConnection {
    pub fn new(transport: Arc<dyn AvTransport>) -> Self {
        Self {
            transport,
            command_lock: Mutex::new(()),
        }
    }

    pub fn transport(&self) -> &dyn AvTransport {
        self.transport.as_ref()
    }

    pub fn control_url(&self) -> &str {
        self.transport.control_url()
    }

    pub(crate) fn lock_commands(&self) -> MutexGuard<'_, ()> {
        self.command_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn close(&self) {
        self.transport.release();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crossbeam_channel::{Receiver, Sender, bounded};

    use super::avtransport::{AvTransport, MediaInfo, PositionInfo, TransportInfo, TransportState};
    use crate::errors::StreamingError;

    /// In-memory renderer recording every action it receives.
    pub(crate) struct FakeTransport {
        current_uri: Mutex<Option<String>>,
        state: Mutex<TransportState>,
        progress: Mutex<(u64, u64)>,
        calls: Mutex<Vec<String>>,
        failing_action: Mutex<Option<&'static str>>,
        gate: Mutex<Option<Receiver<()>>>,
        released: AtomicUsize,
    }

    impl FakeTransport {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                current_uri: Mutex::new(None),
                state: Mutex::new(TransportState::NoMediaPresent),
                progress: Mutex::new((0, 0)),
                calls: Mutex::new(Vec::new()),
                failing_action: Mutex::new(None),
                gate: Mutex::new(None),
                released: AtomicUsize::new(0),
            })
        }

        pub(crate) fn set_current_uri(&self, uri: &str) {
            *self.current_uri.lock().unwrap() = Some(uri.to_string());
        }

        pub(crate) fn set_state(&self, state: TransportState) {
            *self.state.lock().unwrap() = state;
        }

        /// `(track_duration, rel_time)` in seconds.
        pub(crate) fn set_progress(&self, duration: u64, position: u64) {
            *self.progress.lock().unwrap() = (duration, position);
        }

        pub(crate) fn fail_on(&self, action: &'static str) {
            *self.failing_action.lock().unwrap() = Some(action);
        }

        /// Every action blocks until the returned sender is dropped.
        pub(crate) fn hold_actions(&self) -> Sender<()> {
            let (tx, rx) = bounded(0);
            *self.gate.lock().unwrap() = Some(rx);
            tx
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub(crate) fn release_count(&self) -> usize {
            self.released.load(Ordering::SeqCst)
        }

        fn record(&self, action: &'static str) -> Result<(), StreamingError> {
            let gate = self.gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                let _ = gate.recv_timeout(Duration::from_secs(5));
            }
            self.calls.lock().unwrap().push(action.to_string());
            if *self.failing_action.lock().unwrap() == Some(action) {
                return Err(StreamingError::SoapUpnpError(
                    action.to_string(),
                    701,
                    "Transition not available".to_string(),
                    500,
                ));
            }
            Ok(())
        }
    }

    impl AvTransport for FakeTransport {
        fn control_url(&self) -> &str {
            "http://fake/AVTransport/control"
        }

        fn get_media_info(&self) -> Result<MediaInfo, StreamingError> {
            self.record("GetMediaInfo")?;
            Ok(MediaInfo {
                current_uri: self.current_uri.lock().unwrap().clone(),
                media_duration: self.progress.lock().unwrap().0,
            })
        }

        fn get_transport_info(&self) -> Result<TransportInfo, StreamingError> {
            self.record("GetTransportInfo")?;
            Ok(TransportInfo {
                current_transport_state: self.state.lock().unwrap().clone(),
                current_transport_status: "OK".to_string(),
                current_speed: "1".to_string(),
            })
        }

        fn get_position_info(&self) -> Result<PositionInfo, StreamingError> {
            self.record("GetPositionInfo")?;
            let (track_duration, rel_time) = *self.progress.lock().unwrap();
            Ok(PositionInfo {
                track_duration,
                rel_time,
                track_uri: self.current_uri.lock().unwrap().clone(),
            })
        }

        fn set_av_transport_uri(&self, uri: &str, _metadata: &str) -> Result<(), StreamingError> {
            self.record("SetAVTransportURI")?;
            self.set_current_uri(uri);
            self.set_state(TransportState::Stopped);
            Ok(())
        }

        fn play(&self) -> Result<(), StreamingError> {
            self.record("Play")?;
            self.set_state(TransportState::Playing);
            Ok(())
        }

        fn stop(&self) -> Result<(), StreamingError> {
            self.record("Stop")?;
            self.set_state(TransportState::Stopped);
            Ok(())
        }

        fn pause(&self) -> Result<(), StreamingError> {
            self.record("Pause")?;
            self.set_state(TransportState::PausedPlayback);
            Ok(())
        }

        fn release(&self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}
