//! Storage change notification payloads.
//!
//! [`StorageChangeEvent`] mirrors the object resource GCS attaches to
//! finalize/metadata-update notifications. It arrives either directly as the
//! request body (CloudEvents binary mode) or base64-encoded inside a Pub/Sub
//! push envelope; [`TriggerPayload`] accepts both.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Suffix an object name must carry to be processed.
pub const PDF_SUFFIX: &str = ".pdf";

/// A value from the free-form object metadata map. Primitives get their own
/// variants; anything nested is kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Other(serde_json::Value),
}

/// Treat an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerEncryption {
    #[serde(default, deserialize_with = "null_as_default")]
    pub encryption_algorithm: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub key_sha256: String,
}

/// Notification describing a created or updated object. Only `bucket` and
/// `name` are required; every other field falls back to its default when
/// missing or null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageChangeEvent {
    pub bucket: String,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub self_link: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub generation: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metageneration: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content_type: String,
    #[serde(default)]
    pub time_created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub temporary_hold: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub event_based_hold: bool,
    #[serde(default)]
    pub retention_expiration_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub storage_class: String,
    #[serde(default)]
    pub time_storage_class_updated: Option<DateTime<Utc>>,
    /// Object size in bytes, as the decimal string GCS sends.
    #[serde(default, deserialize_with = "null_as_default")]
    pub size: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub md5_hash: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub media_link: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content_encoding: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content_disposition: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cache_control: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: HashMap<String, MetadataValue>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub crc32c: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub component_count: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub etag: String,
    #[serde(default)]
    pub customer_encryption: Option<CustomerEncryption>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub kms_key_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub resource_state: String,
}

impl StorageChangeEvent {
    /// Minimal event carrying only the fields the extractor consumes.
    pub fn new(bucket: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Case-sensitive check for the `.pdf` suffix.
    pub fn is_pdf(&self) -> bool {
        self.name.ends_with(PDF_SUFFIX)
    }

    /// `gs://` URI of the object this event describes.
    pub fn source_uri(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.name)
    }

    /// Parsed object size, if GCS sent one.
    pub fn size_bytes(&self) -> Option<u64> {
        self.size.parse().ok()
    }
}

/// Pub/Sub push delivery wrapper.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushEnvelope {
    pub message: PushMessage,
    #[serde(default)]
    pub subscription: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    /// Base64-encoded object resource JSON.
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default, alias = "message_id")]
    pub message_id: String,
}

/// Any request body the HTTP host accepts as a trigger.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TriggerPayload {
    PubSub(PushEnvelope),
    Object(StorageChangeEvent),
}

impl TriggerPayload {
    /// Decode into the storage event, plus the delivery id when the payload carries one.
    pub fn into_event(self) -> Result<(StorageChangeEvent, Option<String>)> {
        match self {
            TriggerPayload::Object(event) => Ok((event, None)),
            TriggerPayload::PubSub(envelope) => {
                debug!(
                    "Pub/Sub delivery from {:?} (event type {:?})",
                    envelope.subscription,
                    envelope.message.attributes.get("eventType")
                );
                let raw = BASE64
                    .decode(envelope.message.data.as_bytes())
                    .context("Pub/Sub message data is not valid base64")?;
                let event: StorageChangeEvent = serde_json::from_slice(&raw)
                    .context("Pub/Sub message data is not a storage object")?;
                let id = Some(envelope.message.message_id).filter(|id| !id.is_empty());
                Ok((event, id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OBJECT_JSON: &str = r#"{
        "kind": "storage#object",
        "id": "uploads/scan.pdf/1700000000000000",
        "name": "scan.pdf",
        "bucket": "uploads",
        "generation": "1700000000000000",
        "metageneration": "1",
        "contentType": "application/pdf",
        "timeCreated": "2024-03-01T10:15:00.123Z",
        "updated": "2024-03-01T10:15:00.123Z",
        "storageClass": "STANDARD",
        "size": "48213",
        "md5Hash": "XrY7u+Ae7tCTyyK7j1rNww==",
        "crc32c": "yZRlqg==",
        "etag": "CICA4ND6/IIDEAE=",
        "metadata": {
            "uploader": "scanner-3",
            "pages": 4,
            "duplex": true,
            "batch": null
        }
    }"#;

    #[test]
    fn test_parse_object_resource() {
        let event: StorageChangeEvent = serde_json::from_str(OBJECT_JSON).unwrap();
        assert_eq!(event.bucket, "uploads");
        assert_eq!(event.name, "scan.pdf");
        assert_eq!(event.content_type, "application/pdf");
        assert_eq!(event.size_bytes(), Some(48213));
        assert!(event.time_created.is_some());
        assert!(event.customer_encryption.is_none());

        assert_eq!(
            event.metadata.get("uploader"),
            Some(&MetadataValue::String("scanner-3".to_string()))
        );
        assert_eq!(event.metadata.get("duplex"), Some(&MetadataValue::Bool(true)));
        assert_eq!(event.metadata.get("batch"), Some(&MetadataValue::Null));
        assert!(matches!(
            event.metadata.get("pages"),
            Some(MetadataValue::Number(n)) if n.as_u64() == Some(4)
        ));
    }

    #[test]
    fn test_nulls_fall_back_to_defaults() {
        let event: StorageChangeEvent = serde_json::from_str(
            r#"{
                "bucket": "b",
                "name": "a.pdf",
                "contentType": null,
                "size": null,
                "temporaryHold": null,
                "componentCount": null,
                "metadata": null,
                "customerEncryption": {"encryptionAlgorithm": null}
            }"#,
        )
        .unwrap();
        assert!(event.is_pdf());
        assert_eq!(event.content_type, "");
        assert_eq!(event.size_bytes(), None);
        assert!(!event.temporary_hold);
        assert_eq!(event.component_count, 0);
        assert!(event.metadata.is_empty());
        assert_eq!(event.customer_encryption, Some(CustomerEncryption::default()));
    }

    #[test]
    fn test_nested_metadata_is_kept() {
        let event: StorageChangeEvent = serde_json::from_str(
            r#"{"bucket": "b", "name": "a.pdf", "metadata": {"k": {"x": 1}, "tags": ["a", "b"]}}"#,
        )
        .unwrap();
        assert_eq!(
            event.metadata.get("k"),
            Some(&MetadataValue::Other(serde_json::json!({"x": 1})))
        );
        assert_eq!(
            event.metadata.get("tags"),
            Some(&MetadataValue::Other(serde_json::json!(["a", "b"])))
        );
    }

    #[test]
    fn test_new_uses_defaults() {
        let event = StorageChangeEvent::new("b", "doc.pdf");
        assert_eq!(event.bucket, "b");
        assert_eq!(event.name, "doc.pdf");
        assert!(event.metadata.is_empty());
        assert!(event.time_created.is_none());
    }

    #[test]
    fn test_missing_name_rejected() {
        let result: Result<StorageChangeEvent, _> =
            serde_json::from_str(r#"{"bucket": "uploads"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_pdf_suffix_is_case_sensitive() {
        assert!(StorageChangeEvent::new("b", "doc.pdf").is_pdf());
        assert!(!StorageChangeEvent::new("b", "doc.PDF").is_pdf());
        assert!(!StorageChangeEvent::new("b", "doc.pdf.txt").is_pdf());
        assert!(!StorageChangeEvent::new("b", "").is_pdf());
    }

    #[test]
    fn test_source_uri() {
        let event = StorageChangeEvent::new("b", "reports/doc.pdf");
        assert_eq!(event.source_uri(), "gs://b/reports/doc.pdf");
    }

    #[test]
    fn test_payload_raw_object() {
        let payload: TriggerPayload = serde_json::from_str(OBJECT_JSON).unwrap();
        let (event, id) = payload.into_event().unwrap();
        assert_eq!(event.name, "scan.pdf");
        assert!(id.is_none());
    }

    #[test]
    fn test_payload_pubsub_envelope() {
        let body = serde_json::json!({
            "message": {
                "data": BASE64.encode(OBJECT_JSON),
                "attributes": {"eventType": "OBJECT_FINALIZE"},
                "messageId": "9876"
            },
            "subscription": "projects/p/subscriptions/ocr"
        });
        let payload: TriggerPayload = serde_json::from_value(body).unwrap();
        let (event, id) = payload.into_event().unwrap();
        assert_eq!(event.bucket, "uploads");
        assert_eq!(id.as_deref(), Some("9876"));
    }

    #[test]
    fn test_payload_pubsub_bad_data() {
        let body = serde_json::json!({"message": {"data": "%%%"}});
        let payload: TriggerPayload = serde_json::from_value(body).unwrap();
        assert!(payload.into_event().is_err());
    }
}
