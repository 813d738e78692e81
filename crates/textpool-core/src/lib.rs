pub mod config;
pub mod error;
pub mod lexicon;
pub mod model;

pub use config::{ModelConfig, RawConfig, ServerConfig};
pub use error::{ConfigError, ModelError};
pub use lexicon::{Extraction, LexiconModel};
pub use model::ModelRunner;

/// Value of the `Server` response header.
pub const SERVER_IDENTIFIER: &str = "CRFUtils/1.0";
