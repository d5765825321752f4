// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity-Weather tool server
//!
//! Serves the weather correlation tools over HTTP or stdio.

use activity_weather::{
    config::{Config, Transport},
    services::Pipeline,
    tools::ToolRouter,
    AppState,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging on stderr
    init_logging();

    let config = Config::from_env()?;
    tracing::info!(config = ?config, "Starting Activity-Weather");

    let pipeline = Arc::new(Pipeline::from_config(&config)?);
    let shutdown = CancellationToken::new();
    let tools = ToolRouter::new(pipeline).with_shutdown(shutdown.clone());

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown requested");
                shutdown.cancel();
            }
        }
    });

    match config.transport {
        Transport::Stdio => {
            tracing::info!("Serving tools on stdio");
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            tokio::select! {
                result = activity_weather::stdio::serve(&tools, stdin, tokio::io::stdout()) => result?,
                _ = shutdown.cancelled() => {}
            }
        }
        Transport::Http => {
            let port = config.port;
            let state = Arc::new(AppState { config, tools });
            let app = activity_weather::routes::create_router(state);

            let addr = format!("0.0.0.0:{}", port);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!(addr = %addr, "Server listening");

            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await?;
        }
    }

    Ok(())
}

/// Initialize structured JSON logging. Output goes to stderr so stdout
/// stays free for the stdio transport.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,activity_weather=debug"));

    tracing_subscriber::registry().with(filter).with(format).init();
}
