//! Process-wide OCR and storage clients.
//!
//! [`ClientProvider`] builds both clients through a [`ClientFactory`] the first
//! time an invocation needs them and hands out the same `Arc`s afterwards.
//! Concurrent first callers wait on a single initialization.

use crate::auth::TokenSource;
use crate::config::Settings;
use crate::ocr::vision::VisionClient;
use crate::ocr::OcrClient;
use crate::storage::gcs::GcsClient;
use crate::storage::StorageClient;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

/// Initialized client handles, immutable once built.
#[derive(Clone)]
pub struct Clients {
    pub ocr: Arc<dyn OcrClient>,
    pub storage: Arc<dyn StorageClient>,
}

/// Builds the external clients.
#[async_trait::async_trait]
pub trait ClientFactory: Send + Sync {
    async fn create(&self) -> Result<Clients>;
}

pub struct ClientProvider {
    factory: Box<dyn ClientFactory>,
    clients: OnceCell<Clients>,
}

impl ClientProvider {
    pub fn new(factory: impl ClientFactory + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            clients: OnceCell::new(),
        }
    }

    /// Initialized clients, building them on first use. A failed build is not
    /// cached; the next call tries again.
    pub async fn get(&self) -> Result<&Clients> {
        self.clients
            .get_or_try_init(|| async {
                let clients = self.factory.create().await?;
                info!(
                    "Initialized clients (ocr={}, storage={})",
                    clients.ocr.name(),
                    clients.storage.name()
                );
                Ok::<_, anyhow::Error>(clients)
            })
            .await
    }

    pub fn is_initialized(&self) -> bool {
        self.clients.initialized()
    }
}

/// Cloud Vision + Cloud Storage clients sharing one HTTP client and token source.
pub struct GoogleClientFactory {
    settings: Settings,
}

impl GoogleClientFactory {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }
}

#[async_trait::async_trait]
impl ClientFactory for GoogleClientFactory {
    async fn create(&self) -> Result<Clients> {
        let tokens = match (&self.settings.access_token, &self.settings.credentials_path) {
            (Some(token), _) => TokenSource::fixed(token.clone()),
            (None, Some(path)) => TokenSource::from_key_file(path)?,
            (None, None) => TokenSource::metadata(&self.settings.metadata_host),
        };
        let http = reqwest::Client::builder().build()?;

        Ok(Clients {
            ocr: Arc::new(VisionClient::new(
                self.settings.vision_endpoint.clone(),
                http.clone(),
                tokens.clone(),
            )),
            storage: Arc::new(GcsClient::new(
                self.settings.storage_endpoint.clone(),
                http,
                tokens,
            )),
        })
    }
}
