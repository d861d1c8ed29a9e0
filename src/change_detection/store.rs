// ABOUTME: Storage abstraction for the change-detection watermark blob
// ABOUTME: Implemented by the local file store and the S3 object store

use anyhow::Result;
use async_trait::async_trait;

/// Persists the single text blob holding the last successful check date.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Human readable location for log messages.
    fn location(&self) -> String;

    /// Blob contents, or `None` if nothing has been stored yet.
    async fn read(&self) -> Result<Option<String>>;

    async fn write(&self, contents: &str) -> Result<()>;
}
