use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use textpool_core::{ModelConfig, ModelRunner};

use crate::error::{SubmitError, TransportError};
use crate::slot::ModelSlot;

pub const WORKER_NAME_PREFIX: &str = "http";

/// Everything a job can touch while it runs: the worker's name, its model
/// slot and the shared model configuration.
pub struct WorkerContext<R> {
    pub name: String,
    pub slot: ModelSlot<R>,
    pub model: Arc<ModelConfig>,
}

/// Work submitted to the pool.
pub trait Job<R>: Send + 'static {
    fn run(self: Box<Self>, worker: &mut WorkerContext<R>);

    /// Called instead of `run` when the pool refuses the job.
    fn reject(self: Box<Self>, _reason: SubmitError) {}
}

impl<R, F> Job<R> for F
where
    F: FnOnce(&mut WorkerContext<R>) + Send + 'static,
{
    fn run(self: Box<Self>, worker: &mut WorkerContext<R>) {
        (*self)(worker)
    }
}

pub type BoxedJob<R> = Box<dyn Job<R>>;

/// A fixed set of named worker threads fed from one shared queue.
///
/// Each worker owns a [`ModelSlot`] for its whole lifetime, so a runner is
/// never shared between threads and never needs a lock. Workers run one job
/// at a time.
pub struct WorkerPool<R> {
    sender: Option<Sender<BoxedJob<R>>>,
    workers: Vec<Worker>,
    capacity: usize,
    _runner: PhantomData<fn() -> R>,
}

struct Worker {
    name: String,
    thread: Option<JoinHandle<()>>,
}

impl<R: ModelRunner> WorkerPool<R> {
    /// Spawns `size` workers named `http-0`, `http-1`, ...
    ///
    /// `capacity` bounds the submission queue; `0` leaves it unbounded.
    pub fn new(size: usize, capacity: usize, model: Arc<ModelConfig>) -> Result<Self, TransportError> {
        if size == 0 {
            return Err(TransportError::NoWorkers);
        }

        let (sender, receiver) = if capacity == 0 {
            crossbeam_channel::unbounded()
        } else {
            crossbeam_channel::bounded(capacity)
        };

        let mut pool = Self {
            sender: Some(sender),
            workers: Vec::with_capacity(size),
            capacity,
            _runner: PhantomData,
        };

        for id in 0..size {
            let name = format!("{WORKER_NAME_PREFIX}-{id}");
            let receiver = receiver.clone();
            let model = Arc::clone(&model);
            let thread_name = name.clone();

            // On error the partially built pool is dropped, which joins the
            // workers spawned so far.
            let thread = std::thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop::<R>(thread_name, receiver, model))
                .map_err(|source| TransportError::Spawn {
                    name: name.clone(),
                    source,
                })?;

            pool.workers.push(Worker {
                name,
                thread: Some(thread),
            });
        }

        Ok(pool)
    }

    /// Enqueues a job without blocking. A refused job has `reject` called
    /// before the error is returned.
    pub fn submit(&self, job: BoxedJob<R>) -> Result<(), SubmitError> {
        let Some(sender) = self.sender.as_ref() else {
            job.reject(SubmitError::Closed);
            return Err(SubmitError::Closed);
        };

        let (job, reason) = match sender.try_send(job) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(job)) => (job, SubmitError::Saturated),
            Err(TrySendError::Disconnected(job)) => (job, SubmitError::Closed),
        };
        job.reject(reason);
        Err(reason)
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue capacity; `0` means unbounded.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs waiting for a worker.
    pub fn queued(&self) -> usize {
        self.sender.as_ref().map_or(0, Sender::len)
    }

    pub fn worker_names(&self) -> impl Iterator<Item = &str> {
        self.workers.iter().map(|w| w.name.as_str())
    }
}

impl<R> WorkerPool<R> {
    /// Closes the queue, lets workers drain what is already queued, and
    /// joins them.
    pub fn shutdown(&mut self) {
        drop(self.sender.take());
        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    tracing::error!("Worker {} exited abnormally", worker.name);
                }
            }
        }
    }
}

impl<R> Drop for WorkerPool<R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop<R: ModelRunner>(name: String, receiver: Receiver<BoxedJob<R>>, model: Arc<ModelConfig>) {
    tracing::debug!("Worker {name} started");
    let mut ctx = WorkerContext {
        name,
        slot: ModelSlot::new(),
        model,
    };

    // `recv` fails once the pool dropped its sender and the queue is empty.
    while let Ok(job) = receiver.recv() {
        let run = std::panic::catch_unwind(AssertUnwindSafe(|| job.run(&mut ctx)));
        if run.is_err() {
            tracing::error!("Job panicked on worker {}", ctx.name);
        }
    }

    tracing::debug!("Worker {} disconnected; shutting down", ctx.name);
}
