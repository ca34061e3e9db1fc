//! PDF text extraction: storage event in, OCR text object out.

use crate::clients::ClientProvider;
use crate::config::{ResultBucket, RESULT_BUCKET_VAR};
use crate::error::ExtractorError;
use crate::event::{StorageChangeEvent, PDF_SUFFIX};
use crate::ocr::{FileAnnotation, OcrRequest};
use crate::storage::{ObjectTarget, StorageClient, TEXT_CONTENT_TYPE};
use serde::Serialize;
use tracing::{debug, info};

const TEXT_SUFFIX: &str = ".txt";

/// The text artifact written for one source PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultObject {
    pub bucket: String,
    pub name: String,
    pub content_type: String,
    pub body: String,
}

impl ResultObject {
    pub fn new(bucket: impl Into<String>, source_name: &str, body: String) -> Self {
        Self {
            bucket: bucket.into(),
            name: result_object_name(source_name),
            content_type: TEXT_CONTENT_TYPE.to_string(),
            body,
        }
    }

    fn target(&self) -> ObjectTarget {
        ObjectTarget {
            bucket: self.bucket.clone(),
            name: self.name.clone(),
            content_type: self.content_type.clone(),
        }
    }
}

/// What a successful invocation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Not a PDF; nothing was touched.
    Skipped,
    Written {
        bucket: String,
        name: String,
        bytes: usize,
    },
}

/// Replace the first `.pdf` in `source_name` with `.txt`.
pub fn result_object_name(source_name: &str) -> String {
    source_name.replacen(PDF_SUFFIX, TEXT_SUFFIX, 1)
}

/// Page texts of one file response, in order, with no separator.
pub fn concatenate_text(file: &FileAnnotation) -> String {
    file.pages
        .iter()
        .filter_map(|page| page.full_text.as_deref())
        .collect()
}

/// Handles storage change events for the lifetime of the process.
pub struct Extractor {
    clients: ClientProvider,
    result_bucket: ResultBucket,
}

impl Extractor {
    pub fn new(clients: ClientProvider, result_bucket: ResultBucket) -> Self {
        Self {
            clients,
            result_bucket,
        }
    }

    pub async fn handle(&self, event: &StorageChangeEvent) -> Result<Outcome, ExtractorError> {
        info!("Bucket: {}", event.bucket);
        info!("File: {}", event.name);
        if let Some(size) = event.size_bytes() {
            debug!("Object size: {} bytes", size);
        }

        if !event.is_pdf() {
            debug!("Skipping {}: not a PDF", event.name);
            return Ok(Outcome::Skipped);
        }

        if !self.clients.is_initialized() {
            debug!("First PDF event in this process, initializing clients");
        }
        let clients = self
            .clients
            .get()
            .await
            .map_err(ExtractorError::Initialization)?;

        let result_bucket = self.result_bucket.resolve();
        if result_bucket.is_empty() {
            return Err(ExtractorError::Configuration(format!(
                "{} is empty",
                RESULT_BUCKET_VAR
            )));
        }

        info!("Searching text in {}", event.name);

        let request = OcrRequest::pdf_text(event.source_uri());
        let result = clients
            .ocr
            .annotate_file(&request)
            .await
            .map_err(ExtractorError::OcrInvocation)?;

        // One file was requested, so only the first response is ours.
        let file = result
            .responses
            .into_iter()
            .next()
            .ok_or_else(|| ExtractorError::EmptyOcrResponse(request.source_uri.clone()))?;
        check_annotation(&request.source_uri, &file)?;

        let text = concatenate_text(&file);
        debug!(
            "Extracted {} chars from {} of {:?} pages of {}",
            text.chars().count(),
            file.pages.len(),
            file.total_pages,
            event.name
        );

        let object = ResultObject::new(result_bucket, &event.name, text);
        write_result(clients.storage.as_ref(), &object)
            .await
            .map_err(ExtractorError::Write)?;

        info!("Wrote text of {} to gs://{}/{}", event.name, object.bucket, object.name);
        Ok(Outcome::Written {
            bucket: object.bucket,
            name: object.name,
            bytes: object.body.len(),
        })
    }
}

/// Reject file or page level errors so partial text is never written.
fn check_annotation(source_uri: &str, file: &FileAnnotation) -> Result<(), ExtractorError> {
    if let Some(error) = &file.error {
        return Err(ExtractorError::OcrInvocation(anyhow::anyhow!(
            "{} could not be annotated: {}",
            source_uri,
            error
        )));
    }
    if let Some((index, error)) = file
        .pages
        .iter()
        .enumerate()
        .find_map(|(i, page)| page.error.as_ref().map(|e| (i, e)))
    {
        let page = file.pages[index].page_number.unwrap_or(index as u32 + 1);
        return Err(ExtractorError::OcrInvocation(anyhow::anyhow!(
            "{} page {} could not be annotated: {}",
            source_uri,
            page,
            error
        )));
    }
    Ok(())
}

/// Write `object` through a fresh writer. An early return drops the writer
/// unclosed, discarding the buffered body.
async fn write_result(storage: &dyn StorageClient, object: &ResultObject) -> anyhow::Result<()> {
    let mut writer = storage.writer(&object.target()).await?;
    writer.write(object.body.as_bytes()).await?;
    writer.close().await
}
