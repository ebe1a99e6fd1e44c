//! Standalone entry point for the SOC case-enrichment API.
//!
//! This crate is a thin wrapper around `soc-api` so deployments get a
//! runnable binary without pulling deployment concerns into the library
//! crate.

use anyhow::Result;
use soc_api::{ServerConfig, SocApiServer};

#[tokio::main]
async fn main() -> Result<()> {
    soc_api::server::init_tracing();

    tracing::info!("starting SOC case-enrichment API");

    // Railway/Heroku-style platforms inject $PORT; honor it if SOC_PORT isn't set.
    if let Ok(port) = std::env::var("PORT") {
        if std::env::var("SOC_PORT").is_err() {
            tracing::info!(port, "mapping PORT to SOC_PORT");
            std::env::set_var("SOC_PORT", port);
        }
    }

    let config = ServerConfig::from_env();
    let server = SocApiServer::new(config)
        .await
        .map_err(|e| anyhow::anyhow!("server init failed: {e}"))?;

    server.run().await.map_err(|e| anyhow::anyhow!("server error: {e}"))?;

    Ok(())
}
