//! Sitewatch server binary

use sitewatch_server::{Config, SitewatchServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Configuration first; logging depends on it
    let config = match Config::load() {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            eprintln!("Using default configuration");
            None
        }
    };
    let loaded = config.is_some();
    let config = config.unwrap_or_default();

    common::logging::init_with_format(config.logging.format.as_deref(), config.log_level());

    tracing::info!("Sitewatch server starting");
    if !loaded {
        tracing::warn!("Using default configuration");
    }

    SitewatchServer::new(config).run().await
}
