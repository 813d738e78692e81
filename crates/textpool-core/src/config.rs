use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_HTTP_PORT: u16 = 8441;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Model used when no path is configured (relative to the workspace root).
pub const TEST_MODEL_PATH: &str = "tests/fixtures/extractor_model.toml";

pub const ENV_LISTEN: &str = "CRF_HTTP_LISTEN";
pub const ENV_THREADS: &str = "CRF_NUMBER_OF_THREADS";
pub const ENV_MODEL_PATH: &str = "CRF_EXTRACTOR_MODEL_PATH";
pub const ENV_QUEUE_CAPACITY: &str = "CRF_QUEUE_CAPACITY";

/// Settings as they appear in the TOML file, before validation.
///
/// Numeric settings are kept as strings so that the environment overrides
/// and the file go through the same validation.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct RawConfig {
    pub listen: Option<String>,
    #[serde(deserialize_with = "de_number_or_string")]
    pub threads: Option<String>,
    pub model_path: Option<PathBuf>,
    #[serde(deserialize_with = "de_number_or_string")]
    pub queue_capacity: Option<String>,
}

fn de_number_or_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(i64),
        Text(String),
    }

    Ok(Option::<NumberOrString>::deserialize(deserializer)?.map(|v| match v {
        NumberOrString::Number(n) => n.to_string(),
        NumberOrString::Text(s) => s,
    }))
}

impl RawConfig {
    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Applies environment overrides. `lookup` is `std::env::var` in
    /// production and a map lookup in tests.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_LISTEN) {
            self.listen = Some(v);
        }
        if let Some(v) = lookup(ENV_THREADS) {
            self.threads = Some(v);
        }
        if let Some(v) = lookup(ENV_MODEL_PATH) {
            self.model_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup(ENV_QUEUE_CAPACITY) {
            self.queue_capacity = Some(v);
        }
        self
    }

    /// Validates every setting. Nothing is started until this succeeds.
    pub fn resolve(self) -> Result<ServerConfig, ConfigError> {
        let (host, port) = parse_listen(self.listen.as_deref())?;
        let threads = parse_threads(self.threads.as_deref())?;

        let queue_capacity = match self.queue_capacity.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_QUEUE_CAPACITY,
            Some(v) => v
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidQueueCapacity(v.to_string()))?,
        };

        let model_path = match self.model_path {
            Some(path) => path,
            None => {
                warn_test_model();
                PathBuf::from(TEST_MODEL_PATH)
            }
        };
        if !model_path.is_file() {
            return Err(ConfigError::ModelNotFound(model_path));
        }

        Ok(ServerConfig {
            host,
            port,
            threads,
            queue_capacity,
            model: Arc::new(ModelConfig::new(model_path)),
        })
    }
}

fn parse_listen(listen: Option<&str>) -> Result<(String, u16), ConfigError> {
    let listen = listen.ok_or(ConfigError::MissingListen)?.trim();
    let listen = if listen.is_empty() { "0.0.0.0:8441" } else { listen };

    // A bracketed IPv6 literal without a port ends in `]`.
    let split = if listen.ends_with(']') { None } else { listen.rsplit_once(':') };
    let (host, port) = match split {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .ok()
                .filter(|p| *p >= 1)
                .ok_or_else(|| ConfigError::InvalidListen {
                    what: "port",
                    value: listen.to_string(),
                })?;
            (host, port)
        }
        None => (listen, DEFAULT_HTTP_PORT),
    };

    if host.is_empty() {
        return Err(ConfigError::InvalidListen {
            what: "host",
            value: listen.to_string(),
        });
    }
    Ok((host.to_string(), port))
}

fn parse_threads(threads: Option<&str>) -> Result<usize, ConfigError> {
    let threads = threads.map(str::trim).filter(|t| !t.is_empty());
    let threads = threads.ok_or(ConfigError::MissingThreads)?;
    match threads.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(ConfigError::InvalidThreads(threads.to_string())),
    }
}

fn warn_test_model() {
    tracing::warn!(
        "no model path was provided, so the test extractor model located at \
         {TEST_MODEL_PATH} will be used. Unless this server is being started \
         from a test, this might not be what you want. Set `model_path` in the \
         config file or {ENV_MODEL_PATH}=path/to/model.toml"
    );
}

/// Identifies the model every worker loads. Immutable for the process
/// lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    path: PathBuf,
}

impl ModelConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Validated server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub threads: usize,
    pub queue_capacity: usize,
    pub model: Arc<ModelConfig>,
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
