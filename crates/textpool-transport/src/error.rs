/// Failures that stop the server from starting or serving.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unable to bind {addr}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("worker pool needs at least one thread")]
    NoWorkers,

    #[error("unable to spawn worker thread {name}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Why the pool refused a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("submission queue is full")]
    Saturated,

    #[error("worker pool is shut down")]
    Closed,
}
