use anyhow::{Context, Result};
use image_remix::config::Config;
use image_remix::model::GeminiClient;
use image_remix::server::{self, AppState};
use image_remix::storage::Storage;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "image_remix=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    let storage = Storage::init(&config.upload_dir, &config.output_dir)
        .await
        .context("Failed to create storage directories")?;

    let model = GeminiClient::new(
        config.api_key.clone(),
        config.model.clone(),
        config.base_url.clone(),
        config.timeout,
    )
    .context("Failed to build Gemini client")?;

    let bind_addr = config.bind_addr;
    let model_name = config.model.clone();
    let state = Arc::new(AppState::new(Arc::new(model), storage, config));
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    info!("Server running on http://{} using {}", bind_addr, model_name);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
