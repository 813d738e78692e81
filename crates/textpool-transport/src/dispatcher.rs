use std::sync::Arc;

use chrono::Utc;
use textpool_core::{ModelConfig, ModelRunner};

use crate::access_log::AccessLog;
use crate::error::SubmitError;
use crate::pool::{Job, WorkerContext, WorkerPool};
use crate::task::{deliver, Exchange, Reply, RequestTask, ResponseWriter};

/// Worker name printed in the access log for requests the pool refused.
pub const DISPATCHER_NAME: &str = "dispatcher";

/// Entry point from the transport: wraps each exchange in a [`RequestTask`]
/// and hands it to the pool. Never runs a model itself.
pub struct Dispatcher<R> {
    pool: WorkerPool<R>,
    model: Arc<ModelConfig>,
    access_log: AccessLog,
}

impl<R: ModelRunner> Dispatcher<R> {
    pub fn new(pool: WorkerPool<R>, model: Arc<ModelConfig>, access_log: AccessLog) -> Self {
        Self {
            pool,
            model,
            access_log,
        }
    }

    /// Submits the exchange and returns immediately. A refused exchange is
    /// answered with 503 on the calling thread.
    pub fn dispatch(&self, exchange: Exchange, writer: Box<dyn ResponseWriter>) -> Result<(), SubmitError> {
        let task = RequestTask::new(exchange, writer, Arc::clone(&self.model), self.access_log.clone());
        let result = self.pool.submit(Box::new(task));
        if let Err(SubmitError::Saturated) = result {
            tracing::warn!("Submission queue full ({} queued)", self.pool.queued());
        }
        result
    }

    pub fn pool(&self) -> &WorkerPool<R> {
        &self.pool
    }

    pub fn into_pool(self) -> WorkerPool<R> {
        self.pool
    }
}

impl<R: ModelRunner> Job<R> for RequestTask {
    fn run(self: Box<Self>, worker: &mut WorkerContext<R>) {
        (*self).execute(worker);
    }

    fn reject(self: Box<Self>, reason: SubmitError) {
        let (exchange, writer, access_log) = self.into_parts();
        tracing::warn!("Refusing {} {}: {reason}", exchange.info.method, exchange.info.path);
        deliver(Reply::busy(), Utc::now(), writer, &access_log, DISPATCHER_NAME, &exchange.info);
    }
}
