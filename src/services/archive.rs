use crate::models::ArchiveLocator;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
enum ArchiveError {
    #[error("cannot read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("upload of {key} failed: {reason}")]
    Upload { key: String, reason: String },

    #[error("upload of {key} timed out after {}s", .after.as_secs())]
    Timeout { key: String, after: Duration },
}

/// Durable archive for originals and results.
///
/// Failures never surface as errors: they are logged and reported as `None`
/// so one broken upload degrades a single item instead of a whole request.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    async fn archive(&self, local_path: &Path, folder: &str) -> Option<ArchiveLocator>;
}

/// `{folder}/{unique}_{base name}`, unique per call.
pub fn archive_key(folder: &str, local_path: &Path) -> String {
    let base = local_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    format!(
        "{}/{}_{}",
        folder.trim_matches('/'),
        Uuid::new_v4().simple(),
        base
    )
}

pub struct S3Archive {
    client: Client,
    bucket: String,
    timeout: Duration,
}

impl S3Archive {
    pub fn new(client: Client, bucket: String, timeout: Duration) -> Self {
        Self {
            client,
            bucket,
            timeout,
        }
    }

    pub fn locator(&self, key: &str) -> ArchiveLocator {
        format!("s3://{}/{}", self.bucket, key)
    }

    async fn put(&self, local_path: &Path, key: &str) -> Result<(), ArchiveError> {
        let content_type = infer::get_from_path(local_path)
            .ok()
            .flatten()
            .map(|t| t.mime_type())
            .unwrap_or("application/octet-stream");

        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| ArchiveError::Read {
                path: local_path.display().to_string(),
                reason: e.to_string(),
            })?;

        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send();

        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ArchiveError::Upload {
                key: key.to_string(),
                reason: format!("{}", aws_sdk_s3::error::DisplayErrorContext(&e)),
            }),
            Err(_) => Err(ArchiveError::Timeout {
                key: key.to_string(),
                after: self.timeout,
            }),
        }
    }
}

#[async_trait]
impl ArchiveStore for S3Archive {
    async fn archive(&self, local_path: &Path, folder: &str) -> Option<ArchiveLocator> {
        let key = archive_key(folder, local_path);
        match self.put(local_path, &key).await {
            Ok(()) => {
                let locator = self.locator(&key);
                tracing::info!("🗄️  Archived {}", locator);
                Some(locator)
            }
            Err(e) => {
                tracing::error!("❌ Archive failed (bucket={}): {}", self.bucket, e);
                None
            }
        }
    }
}
