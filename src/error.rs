use thiserror::Error;

/// Failure of a single extraction invocation. None of these are retried here;
/// the trigger infrastructure owns retry policy.
#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("client initialization failed: {0:#}")]
    Initialization(anyhow::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("OCR invocation failed: {0:#}")]
    OcrInvocation(anyhow::Error),

    /// The OCR call succeeded but returned no per-file response.
    #[error("OCR invocation returned no responses for {0}")]
    EmptyOcrResponse(String),

    #[error("writing result failed: {0:#}")]
    Write(anyhow::Error),
}

impl ExtractorError {
    /// True for the OCR failure kinds, including an empty response.
    pub fn is_ocr_failure(&self) -> bool {
        matches!(self, Self::OcrInvocation(_) | Self::EmptyOcrResponse(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_display_keeps_cause_chain() {
        let cause: anyhow::Result<()> =
            Err(anyhow::anyhow!("403 Forbidden")).context("Vision request rejected");
        let err = ExtractorError::OcrInvocation(cause.unwrap_err());
        assert_eq!(
            err.to_string(),
            "OCR invocation failed: Vision request rejected: 403 Forbidden"
        );
    }

    #[test]
    fn test_ocr_failure_kinds() {
        assert!(ExtractorError::EmptyOcrResponse("gs://b/a.pdf".into()).is_ocr_failure());
        assert!(ExtractorError::OcrInvocation(anyhow::anyhow!("boom")).is_ocr_failure());
        assert!(!ExtractorError::Configuration("x".into()).is_ocr_failure());
    }
}
