use std::collections::{HashMap, VecDeque};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, unbounded};
use tracing::{debug, error};

use crate::errors::StreamingError;
use crate::model::DeviceId;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of named worker threads draining a shared job queue.
///
/// Dropping the pool lets queued jobs finish, then joins the workers.
pub struct WorkerPool {
    name: String,
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(name: &str, size: usize) -> io::Result<Self> {
        let size = size.max(1);
        let (sender, receiver) = unbounded::<Job>();

        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let receiver = receiver.clone();
            let thread_name = format!("{name}-{index}");
            let handle = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || {
                    for job in receiver.iter() {
                        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                            error!(worker = %thread_name, "Job panicked");
                        }
                    }
                    debug!(worker = %thread_name, "Worker exiting");
                })?;
            workers.push(handle);
        }

        Ok(Self {
            name: name.to_string(),
            sender: Some(sender),
            workers,
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn execute<F>(&self, job: F) -> Result<(), StreamingError>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| StreamingError::WorkerPool(format!("{} is shut down", self.name)))?;
        sender
            .send(Box::new(job))
            .map_err(|_| StreamingError::WorkerPool(format!("{} has no live worker", self.name)))
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        drop(self.sender.take());
        let current = thread::current().id();
        for handle in self.workers.drain(..) {
            // A job may hold the last reference to its own pool.
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }
    }
}

struct QueuedJob {
    status_poll: bool,
    job: Job,
}

type DeviceQueues = Arc<Mutex<HashMap<DeviceId, VecDeque<QueuedJob>>>>;

/// Runs device exchanges on a [`WorkerPool`], one device at a time.
///
/// Jobs for a device wait in that device's queue instead of a worker, so a
/// receiver that never answers holds at most one worker. A device has an
/// entry in the map while one worker drains its queue.
pub struct DeviceWorkQueue {
    pool: WorkerPool,
    queues: DeviceQueues,
}

impl DeviceWorkQueue {
    pub fn new(name: &str, size: usize) -> io::Result<Self> {
        Ok(Self {
            pool: WorkerPool::new(name, size)?,
            queues: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn size(&self) -> usize {
        self.pool.size()
    }

    /// Number of jobs waiting behind the running one for `device`.
    pub fn pending(&self, device: &DeviceId) -> usize {
        lock_queues(&self.queues).get(device).map_or(0, VecDeque::len)
    }

    /// Runs `job` once the jobs already queued for `device` are done.
    pub fn execute<F>(&self, device: &DeviceId, job: F) -> Result<(), StreamingError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(device, false, Box::new(job)).map(|_| ())
    }

    /// Like [`execute`](Self::execute), but `job` is dropped when a status
    /// poll already waits for `device`. Returns whether it was queued.
    pub fn execute_status_poll<F>(&self, device: &DeviceId, job: F) -> Result<bool, StreamingError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(device, true, Box::new(job))
    }

    fn enqueue(
        &self,
        device: &DeviceId,
        status_poll: bool,
        job: Job,
    ) -> Result<bool, StreamingError> {
        let first = QueuedJob { status_poll, job };
        {
            let mut queues = lock_queues(&self.queues);
            if let Some(queue) = queues.get_mut(device) {
                if status_poll && queue.iter().any(|queued| queued.status_poll) {
                    debug!(device = %device, "Status poll already queued, skipped");
                    return Ok(false);
                }
                queue.push_back(first);
                return Ok(true);
            }
            queues.insert(device.clone(), VecDeque::new());
        }

        let queues = Arc::clone(&self.queues);
        let id = device.clone();
        self.pool
            .execute(move || drain(&queues, &id, first))
            .inspect_err(|_| {
                lock_queues(&self.queues).remove(device);
            })?;
        Ok(true)
    }
}

fn lock_queues(queues: &DeviceQueues) -> MutexGuard<'_, HashMap<DeviceId, VecDeque<QueuedJob>>> {
    queues.lock().unwrap_or_else(PoisonError::into_inner)
}

// Jobs run without the map lock held: they may queue follow-up work for
// the same device.
fn drain(queues: &DeviceQueues, device: &DeviceId, first: QueuedJob) {
    let mut next = first;
    loop {
        if panic::catch_unwind(AssertUnwindSafe(next.job)).is_err() {
            error!(device = %device, "Device job panicked");
        }

        let mut guard = lock_queues(queues);
        match guard.get_mut(device).and_then(VecDeque::pop_front) {
            Some(job) => next = job,
            None => {
                guard.remove(device);
                return;
            }
        }
    }
}
