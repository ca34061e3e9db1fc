//! Cloud Storage client using the JSON API media upload.

use super::{ObjectTarget, ObjectWriter, StorageClient};
use crate::auth::TokenSource;
use anyhow::{Context, Result};
use tracing::{debug, info};

#[derive(Clone)]
pub struct GcsClient {
    endpoint: String,
    client: reqwest::Client,
    tokens: TokenSource,
}

impl GcsClient {
    pub fn new(endpoint: impl Into<String>, client: reqwest::Client, tokens: TokenSource) -> Self {
        Self {
            endpoint: endpoint.into(),
            client,
            tokens,
        }
    }

    async fn upload(&self, target: &ObjectTarget, body: Vec<u8>) -> Result<()> {
        let token = self
            .tokens
            .access_token(&self.client)
            .await
            .context("Failed to obtain access token for Cloud Storage")?;

        let url = format!("{}/upload/storage/v1/b/{}/o", self.endpoint, target.bucket);
        let size = body.len();

        let resp = self
            .client
            .post(&url)
            .query(&[("uploadType", "media"), ("name", target.name.as_str())])
            .bearer_auth(&token)
            .header(reqwest::header::CONTENT_TYPE, &target.content_type)
            .body(body)
            .send()
            .await
            .with_context(|| format!("Upload of gs://{}/{} failed", target.bucket, target.name))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Cloud Storage upload error ({}): {}", status, text);
        }

        info!(
            "GcsClient: wrote gs://{}/{} ({} bytes)",
            target.bucket, target.name, size
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl StorageClient for GcsClient {
    fn name(&self) -> &str {
        "gcs"
    }

    async fn writer(&self, target: &ObjectTarget) -> Result<Box<dyn ObjectWriter>> {
        Ok(Box::new(GcsObjectWriter {
            client: self.clone(),
            target: target.clone(),
            buffer: Vec::new(),
            closed: false,
        }))
    }
}

/// Buffers the body and uploads it in one request on close.
pub struct GcsObjectWriter {
    client: GcsClient,
    target: ObjectTarget,
    buffer: Vec<u8>,
    closed: bool,
}

#[async_trait::async_trait]
impl ObjectWriter for GcsObjectWriter {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let mut writer = self;
        writer.closed = true;
        let body = std::mem::take(&mut writer.buffer);
        writer.client.upload(&writer.target, body).await
    }
}

impl Drop for GcsObjectWriter {
    fn drop(&mut self) {
        if !self.closed {
            debug!(
                "GcsObjectWriter: discarding {} unflushed bytes for gs://{}/{}",
                self.buffer.len(),
                self.target.bucket,
                self.target.name
            );
        }
    }
}
