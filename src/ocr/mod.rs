//! OCR client abstraction.
//!
//! Defines the [`OcrClient`] trait and the request/result types the extractor
//! works with, so the Cloud Vision backend can be swapped for a fake in tests.

pub mod vision;

/// Document MIME type sent with every request.
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Detection feature requested from the OCR backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    DocumentTextDetection,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::DocumentTextDetection => "DOCUMENT_TEXT_DETECTION",
        }
    }
}

/// Single-file annotation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrRequest {
    pub source_uri: String,
    pub feature: Feature,
    pub mime_type: String,
}

impl OcrRequest {
    /// Document text detection for the PDF at `source_uri`.
    pub fn pdf_text(source_uri: impl Into<String>) -> Self {
        Self {
            source_uri: source_uri.into(),
            feature: Feature::DocumentTextDetection,
            mime_type: PDF_MIME_TYPE.to_string(),
        }
    }
}

/// Annotation for one page of the file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageAnnotation {
    /// `None` when the backend found no text on the page.
    pub full_text: Option<String>,
    pub page_number: Option<u32>,
    pub error: Option<String>,
}

/// Per-file response: page annotations in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileAnnotation {
    pub pages: Vec<PageAnnotation>,
    pub total_pages: Option<u32>,
    pub error: Option<String>,
}

/// Everything one OCR call returned, one entry per requested file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrResult {
    pub responses: Vec<FileAnnotation>,
}

/// Async trait implemented by each OCR backend.
#[async_trait::async_trait]
pub trait OcrClient: Send + Sync {
    fn name(&self) -> &str;
    async fn annotate_file(&self, request: &OcrRequest) -> anyhow::Result<OcrResult>;
}
