//! Cloud Vision OCR client (synchronous `files:annotate`).

use super::{FileAnnotation, OcrClient, OcrRequest, OcrResult, PageAnnotation};
use crate::auth::TokenSource;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub struct VisionClient {
    endpoint: String,
    client: reqwest::Client,
    tokens: TokenSource,
}

impl VisionClient {
    pub fn new(endpoint: impl Into<String>, client: reqwest::Client, tokens: TokenSource) -> Self {
        Self {
            endpoint: endpoint.into(),
            client,
            tokens,
        }
    }
}

// ── Vision API request/response types ───────────────────────────────────────

#[derive(Serialize)]
struct BatchAnnotateFilesRequest {
    requests: Vec<AnnotateFileRequest>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateFileRequest {
    input_config: InputConfig,
    features: Vec<FeatureSpec>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InputConfig {
    gcs_source: GcsSource,
    mime_type: String,
}

#[derive(Serialize)]
struct GcsSource {
    uri: String,
}

#[derive(Serialize)]
struct FeatureSpec {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct BatchAnnotateFilesResponse {
    #[serde(default)]
    responses: Vec<AnnotateFileResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateFileResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
    #[serde(default)]
    total_pages: Option<u32>,
    #[serde(default)]
    error: Option<Status>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    #[serde(default)]
    full_text_annotation: Option<TextAnnotation>,
    #[serde(default)]
    context: Option<ImageContext>,
    #[serde(default)]
    error: Option<Status>,
}

#[derive(Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageContext {
    #[serde(default)]
    page_number: Option<u32>,
}

#[derive(Deserialize)]
struct Status {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

impl Status {
    fn describe(&self) -> String {
        format!("code {}: {}", self.code, self.message)
    }
}

impl From<&OcrRequest> for BatchAnnotateFilesRequest {
    fn from(request: &OcrRequest) -> Self {
        Self {
            requests: vec![AnnotateFileRequest {
                input_config: InputConfig {
                    gcs_source: GcsSource {
                        uri: request.source_uri.clone(),
                    },
                    mime_type: request.mime_type.clone(),
                },
                features: vec![FeatureSpec {
                    kind: request.feature.as_str(),
                }],
            }],
        }
    }
}

impl From<BatchAnnotateFilesResponse> for OcrResult {
    fn from(batch: BatchAnnotateFilesResponse) -> Self {
        let responses = batch
            .responses
            .into_iter()
            .map(|file| FileAnnotation {
                pages: file
                    .responses
                    .into_iter()
                    .map(|page| PageAnnotation {
                        full_text: page.full_text_annotation.map(|a| a.text),
                        page_number: page.context.and_then(|c| c.page_number),
                        error: page.error.map(|e| e.describe()),
                    })
                    .collect(),
                total_pages: file.total_pages,
                error: file.error.map(|e| e.describe()),
            })
            .collect();
        OcrResult { responses }
    }
}

// ── Client implementation ───────────────────────────────────────────────────

#[async_trait::async_trait]
impl OcrClient for VisionClient {
    fn name(&self) -> &str {
        "cloud_vision"
    }

    async fn annotate_file(&self, request: &OcrRequest) -> anyhow::Result<OcrResult> {
        let token = self
            .tokens
            .access_token(&self.client)
            .await
            .context("Failed to obtain access token for Vision API")?;

        let body = BatchAnnotateFilesRequest::from(request);

        info!("VisionClient: annotating {}", request.source_uri);

        let resp = self
            .client
            .post(format!("{}/v1/files:annotate", self.endpoint))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .context("Vision files:annotate request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Vision API error ({}): {}", status, text);
        }

        let raw_text = resp.text().await?;
        debug!(
            "VisionClient: raw response ({} bytes): {}",
            raw_text.len(),
            raw_text.chars().take(500).collect::<String>()
        );
        let batch: BatchAnnotateFilesResponse =
            serde_json::from_str(&raw_text).context("Failed to parse Vision response")?;

        Ok(batch.into())
    }
}
