use std::path::PathBuf;

use textpool_core::{LexiconModel, RawConfig};
use textpool_transport::server::ctrl_c;
use textpool_transport::{AccessLog, TextpoolServer};
use tracing_subscriber::EnvFilter;

const ENV_CONFIG: &str = "TEXTPOOL_CONFIG";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Config file from the first argument, else TEXTPOOL_CONFIG, else none.
    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os(ENV_CONFIG).map(PathBuf::from));

    let raw = match &config_path {
        Some(path) => RawConfig::from_file(path)?,
        None => RawConfig::default(),
    };

    let config = match raw.with_env(|key| std::env::var(key).ok()).resolve() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            return Err(e.into());
        }
    };

    tracing::info!("Will listen to {}", config.listen_addr());
    tracing::info!("Will spawn {} threads", config.threads);
    tracing::info!("Will use extractor model located at {}", config.model.path().display());

    let server = TextpoolServer::<LexiconModel>::bind(&config, AccessLog::stdout()).await?;
    let addr = server.local_addr()?;
    tracing::info!("Make POST requests to {addr} with the text you want to run the model against");

    server.serve(ctrl_c()).await?;
    Ok(())
}
