use std::sync::Arc;

use anyhow::Context as _;
use dotenvy::dotenv;
use tracing::info;

mod audiostream;
mod blob;
mod config;
mod context;
mod error;
mod http;
mod recording;
mod speakers;
mod store;
mod transcription;

use config::Config;
use context::AppContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env().context("Failed to load configuration")?;
    let bind_addr = config.bind_addr.clone();

    let ctx = AppContext::new(config)
        .await
        .context("Failed to initialize application")?;
    info!("document and media stores initialized");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;
    info!("listening on {bind_addr}");

    axum::serve(listener, http::router(Arc::new(ctx)))
        .await
        .context("Server exited with an error")?;
    Ok(())
}
