//! # Guitar Transcription API
//!
//! HTTP front end for `fretboard-core`: accepts a media URL, transcribes a
//! clip of its audio and answers with fretboard positions.
//!
//! ## Architecture
//! - **Runtime**: Tokio, one blocking task per transcription request
//! - **Routing**: axum with permissive or configured CORS
//! - **Logging**: tracing, filtered through `RUST_LOG`

mod api;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use api::AppState;
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,tower_http=warn".into());
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_target(false))
        .init();

    let config = Config::parse();
    info!(
        detector = ?config.detector,
        tuning = config.tuning.tuning().name(),
        max_duration = config.max_duration,
        "starting {} v{}",
        api::SERVICE_NAME,
        api::VERSION
    );

    let state = AppState::new(config.build_transcriber());
    let app = api::router(state, config.cors_layer()?);

    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Guitar Transcription API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    Ok(())
}
