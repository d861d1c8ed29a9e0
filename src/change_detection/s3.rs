// ABOUTME: S3 object watermark store for change detection
// ABOUTME: Keeps the last-checked date in a well-known object key

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;

use super::store::WatermarkStore;

/// Keeps the watermark in an object storage blob.
pub struct S3WatermarkStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    key: String,
}

impl S3WatermarkStore {
    /// Create a store using credentials and region from the AWS environment.
    pub async fn new(bucket: &str, key: &str) -> Result<Self> {
        let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let client = aws_sdk_s3::Client::new(&sdk_config);
        Ok(Self::from_client(client, bucket, key))
    }

    pub fn from_client(client: aws_sdk_s3::Client, bucket: &str, key: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}

#[async_trait]
impl WatermarkStore for S3WatermarkStore {
    fn location(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }

    async fn read(&self) -> Result<Option<String>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .send()
            .await;

        let output = match response {
            Ok(output) => output,
            Err(err) => {
                if err
                    .as_service_error()
                    .map(|service_err| service_err.is_no_such_key())
                    .unwrap_or(false)
                {
                    return Ok(None);
                }
                return Err(err)
                    .with_context(|| format!("Failed to fetch watermark from {}", self.location()));
            }
        };

        let bytes = output
            .body
            .collect()
            .await
            .with_context(|| format!("Failed to read watermark body from {}", self.location()))?
            .into_bytes();

        let contents = String::from_utf8(bytes.to_vec())
            .with_context(|| format!("Watermark at {} is not UTF-8", self.location()))?;

        Ok(Some(contents))
    }

    async fn write(&self, contents: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .body(ByteStream::from(contents.as_bytes().to_vec()))
            .send()
            .await
            .with_context(|| format!("Failed to store watermark at {}", self.location()))?;

        Ok(())
    }
}
