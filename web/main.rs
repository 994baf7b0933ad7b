use clap::Parser;
use imgreg::prelude::*;
use std::{error::Error, sync::Arc};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::parse();

    let state = AppState {
        registry: config.open_registry().await?,
        schemas: Arc::new(config.schema_provider()?),
        storage: Arc::new(config.storage()),
        base_url: config.public_base_url(),
        max_upload_size: config.max_upload_size,
    };

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!(addr = %config.bind, "registry listening");
    axum::serve(listener, router(state)).await?;

    Ok(())
}
