use std::path::Path;

use async_trait::async_trait;

use crate::acquire::ClientContext;
use crate::Result;

pub mod local;
pub mod s3;

pub use local::LocalStorage;
pub use s3::S3Storage;

/// Namespace a blob is stored under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageScope {
    Audio,
    Log,
}

impl StorageScope {
    pub fn dir_name(&self) -> &'static str {
        match self {
            StorageScope::Audio => "audio",
            StorageScope::Log => "logs",
        }
    }
}

/// Locator for a durably stored blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHandle {
    pub key: String,
    pub scope: StorageScope,
    pub location: String,
}

/// Durable blob store consumed by the acquisition pipeline.
///
/// Treated as idempotent: storing the same key twice overwrites, and `provide`
/// reports whatever is currently durable.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageGateway: Send + Sync {
    async fn store(
        &self,
        key: &str,
        scope: StorageScope,
        source: &Path,
        mime_type: &str,
        ctx: &ClientContext,
    ) -> Result<()>;

    async fn provide(&self, key: &str, scope: StorageScope, ctx: &ClientContext)
        -> Option<BlobHandle>;
}

/// MIME type for a target audio format; unknown formats fall back to audio/mpeg.
pub fn mime_for(format: &str) -> &'static str {
    match format.to_ascii_lowercase().as_str() {
        "m4a" => "audio/m4a",
        "aac" => "audio/aac",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        _ => "audio/mpeg",
    }
}
