use std::sync::Arc;

use tracing::{debug, error};

use crate::airplay::command::AirplayCommand;
use crate::airplay::response::CommandResponse;
use crate::errors::StreamingError;
use crate::model::{Device, DeviceType};
use crate::pool::DeviceWorkQueue;

pub const DEFAULT_POOL_SIZE: usize = 4;

pub type CommandCallback =
    Box<dyn FnOnce(Result<CommandResponse, StreamingError>) + Send + 'static>;

/// Executes AirPlay exchanges and reports their outcome to a callback.
///
/// Errors never surface from `execute` itself: they reach `on_complete`.
pub trait ControlPoint: Send + Sync {
    fn execute(&self, device: Arc<Device>, command: AirplayCommand, on_complete: CommandCallback);
}

/// One exchange on the device's control socket. Non-200 replies are errors.
pub fn run_command(
    device: &Device,
    command: &AirplayCommand,
) -> Result<CommandResponse, StreamingError> {
    let connection = device
        .airplay_connection()
        .ok_or_else(|| StreamingError::wrong_device_type(device.id(), DeviceType::Airplay))?;

    let response = connection.exchange(command)?;
    debug!(
        device = %device.id(),
        command = command.name(),
        code = response.code(),
        "AirPlay response"
    );

    if response.is_success() {
        Ok(response)
    } else {
        Err(StreamingError::CommandRejected {
            code: response.code(),
            message: response.message().unwrap_or_default().to_string(),
        })
    }
}

/// Runs the exchange on the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct SyncControlPoint;

impl SyncControlPoint {
    pub fn new() -> Self {
        Self
    }
}

impl ControlPoint for SyncControlPoint {
    fn execute(&self, device: Arc<Device>, command: AirplayCommand, on_complete: CommandCallback) {
        let result = run_command(&device, &command);
        on_complete(result);
    }
}

/// Hands exchanges to a fixed pool so a slow receiver cannot stall callers.
///
/// Commands for one receiver are queued behind each other rather than
/// parked on its socket, and a status poll is skipped while another one
/// still waits for the same receiver.
pub struct AsyncControlPoint {
    queue: DeviceWorkQueue,
}

impl AsyncControlPoint {
    pub fn new(pool_size: usize) -> Result<Self, StreamingError> {
        let queue = DeviceWorkQueue::new("airplay-cp", pool_size)
            .map_err(|err| StreamingError::WorkerPool(err.to_string()))?;
        Ok(Self { queue })
    }

    pub fn pool_size(&self) -> usize {
        self.queue.size()
    }
}

impl ControlPoint for AsyncControlPoint {
    fn execute(&self, device: Arc<Device>, command: AirplayCommand, on_complete: CommandCallback) {
        let device_id = device.id().clone();
        let status_poll = matches!(command, AirplayCommand::Status);
        let job = move || {
            let result = run_command(&device, &command);
            on_complete(result);
        };

        let submitted = if status_poll {
            self.queue.execute_status_poll(&device_id, job).map(|_| ())
        } else {
            self.queue.execute(&device_id, job)
        };
        if let Err(err) = submitted {
            error!(device = %device_id, error = %err, "AirPlay command dropped");
        }
    }
}
