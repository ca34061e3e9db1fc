//! Object storage abstraction.
//!
//! A [`StorageClient`] hands out [`ObjectWriter`]s. Data written to a writer is
//! only persisted by [`ObjectWriter::close`]; dropping a writer without closing
//! it discards whatever was buffered, so an aborted write never leaves a
//! partial object behind.

pub mod gcs;

/// Content type of every result object.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=\"utf-8\"";

/// Destination of a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectTarget {
    pub bucket: String,
    pub name: String,
    pub content_type: String,
}

#[async_trait::async_trait]
pub trait StorageClient: Send + Sync {
    fn name(&self) -> &str;
    /// Open a writer for `target`. Nothing is persisted until it is closed.
    async fn writer(&self, target: &ObjectTarget) -> anyhow::Result<Box<dyn ObjectWriter>>;
}

#[async_trait::async_trait]
pub trait ObjectWriter: Send {
    async fn write(&mut self, data: &[u8]) -> anyhow::Result<()>;
    /// Flush and persist everything written so far.
    async fn close(self: Box<Self>) -> anyhow::Result<()>;
}
