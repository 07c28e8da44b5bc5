//! Serial worker queue for deferred scheduling work.

use crate::error::Result;
use crossbeam_channel::{unbounded, Sender};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, error, trace};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Task {
    generation: u64,
    job: Job,
}

#[derive(Default)]
struct Shared {
    generation: AtomicU64,
    pending: Mutex<usize>,
    idle: Condvar,
}

impl Shared {
    fn finish_one(&self) {
        let mut pending = self.pending.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.idle.notify_all();
        }
    }
}

/// Runs submitted jobs one at a time, in submission order, on a dedicated
/// thread.
///
/// [`cancel_all`](Self::cancel_all) discards every job submitted before it
/// without running it; a job already running is allowed to finish.
pub(crate) struct SerialQueue {
    sender: Option<Sender<Task>>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
}

impl SerialQueue {
    pub(crate) fn new(thread_name: &str) -> Result<Self> {
        let (sender, receiver) = unbounded::<Task>();
        let shared = Arc::new(Shared::default());

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                for task in receiver {
                    if task.generation == worker_shared.generation.load(Ordering::Acquire) {
                        (task.job)();
                    } else {
                        trace!("Skipping cancelled scheduling task");
                    }
                    worker_shared.finish_one();
                }
            })?;
        let worker_id = worker.thread().id();

        Ok(Self {
            sender: Some(sender),
            shared,
            worker: Some(worker),
            worker_id,
        })
    }

    /// Queue `job` behind everything already submitted.
    pub(crate) fn submit(&self, job: impl FnOnce() + Send + 'static) {
        let Some(sender) = &self.sender else {
            return;
        };

        *self.shared.pending.lock() += 1;
        let task = Task {
            generation: self.shared.generation.load(Ordering::Acquire),
            job: Box::new(job),
        };
        if sender.send(task).is_err() {
            error!("Scheduling worker has exited, dropping task");
            self.shared.finish_one();
        }
    }

    /// Discard every job not yet started.
    pub(crate) fn cancel_all(&self) {
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(generation, "Cancelled pending scheduling tasks");
    }

    /// Block until no job is queued or running.
    ///
    /// Returns immediately when called from a job, which would otherwise
    /// wait on itself.
    pub(crate) fn wait_until_idle(&self) {
        if thread::current().id() == self.worker_id {
            return;
        }
        let mut pending = self.shared.pending.lock();
        while *pending > 0 {
            self.shared.idle.wait(&mut pending);
        }
    }

    /// Number of jobs queued or running.
    pub(crate) fn pending(&self) -> usize {
        *self.shared.pending.lock()
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        self.cancel_all();
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.thread().id() != thread::current().id() && worker.join().is_err() {
                error!("Scheduling worker panicked");
            }
        }
    }
}
