use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

use super::{BlobHandle, StorageGateway, StorageScope};
use crate::acquire::ClientContext;
use crate::Result;

/// S3-backed storage gateway.
///
/// Keys are laid out as `{prefix}{scope_dir}/{key}` inside a single bucket.
pub struct S3Storage {
    client: S3Client,
    bucket: String,
    key_prefix: String,
}

impl S3Storage {
    pub async fn new(region: String, bucket: String, key_prefix: Option<String>) -> Self {
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region))
            .load()
            .await;

        Self {
            client: S3Client::new(&aws_config),
            bucket,
            key_prefix: key_prefix.unwrap_or_default(),
        }
    }

    fn object_key(&self, key: &str, scope: StorageScope) -> String {
        format!("{}{}/{}", self.key_prefix, scope.dir_name(), key)
    }
}

#[async_trait]
impl StorageGateway for S3Storage {
    async fn store(
        &self,
        key: &str,
        scope: StorageScope,
        source: &Path,
        mime_type: &str,
        ctx: &ClientContext,
    ) -> Result<()> {
        let object_key = self.object_key(key, scope);
        tracing::debug!("[{}] uploading s3://{}/{}", ctx, self.bucket, object_key);

        let body = ByteStream::from_path(source)
            .await
            .with_context(|| format!("failed to read {} for upload", source.display()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .body(body)
            .content_type(mime_type)
            .send()
            .await
            .with_context(|| format!("failed to upload s3://{}/{}", self.bucket, object_key))?;

        Ok(())
    }

    async fn provide(
        &self,
        key: &str,
        scope: StorageScope,
        _ctx: &ClientContext,
    ) -> Option<BlobHandle> {
        let object_key = self.object_key(key, scope);

        self.client
            .head_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await
            .ok()?;

        Some(BlobHandle {
            key: key.to_string(),
            scope,
            location: format!("s3://{}/{}", self.bucket, object_key),
        })
    }
}
