use std::path::PathBuf;

/// Startup configuration failures. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unable to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("listen address is not set (use `listen` or CRF_HTTP_LISTEN)")]
    MissingListen,

    #[error("unable to determine {what} to listen to from listen = {value:?}")]
    InvalidListen { what: &'static str, value: String },

    #[error("number of threads is not set (use `threads` or CRF_NUMBER_OF_THREADS)")]
    MissingThreads,

    #[error("number of threads must be a positive integer, got {0:?}")]
    InvalidThreads(String),

    #[error("queue capacity must be a non-negative integer, got {0:?}")]
    InvalidQueueCapacity(String),

    #[error("extractor model path does not exist at path: {}", .0.display())]
    ModelNotFound(PathBuf),
}

/// Failures raised by a model runner, while loading or while running.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("unable to read model {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to parse model {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid model: {0}")]
    Invalid(String),

    #[error("model invocation failed: {0}")]
    Invocation(String),
}
