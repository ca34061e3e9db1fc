//! PDF Text Extractor - turns PDFs landing in a bucket into plain-text objects
//! using Cloud Vision document text detection.

mod auth;
mod clients;
mod config;
mod error;
mod event;
mod extractor;
mod ocr;
mod server;
mod storage;

use clients::{ClientProvider, GoogleClientFactory};
use config::{ResultBucket, Settings};
use extractor::Extractor;
use server::AppState;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_text_extractor=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;
    let port = settings.port;
    info!(
        "Vision endpoint: {}, storage endpoint: {}",
        settings.vision_endpoint, settings.storage_endpoint
    );

    // Clients are built lazily by the first PDF event.
    let extractor = Extractor::new(
        ClientProvider::new(GoogleClientFactory::new(settings)),
        ResultBucket::FromEnv,
    );

    let app = server::router(AppState {
        extractor: Arc::new(extractor),
    });

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
