pub mod access_log;
pub mod dispatcher;
pub mod error;
pub mod pool;
pub mod server;
pub mod slot;
pub mod task;

pub use access_log::{AccessLog, AccessSink, MemorySink, StdoutSink};
pub use dispatcher::Dispatcher;
pub use error::{SubmitError, TransportError};
pub use pool::{Job, WorkerContext, WorkerPool};
pub use server::TextpoolServer;
pub use slot::ModelSlot;
pub use task::{Exchange, OneshotWriter, Reply, RequestInfo, RequestTask, ResponseWriter};
