use crate::config::StorageConfig;
use crate::services::archive::{ArchiveStore, S3Archive};
use aws_sdk_s3::config::{Credentials, Region};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub async fn setup_storage(config: &StorageConfig, timeout: Duration) -> Arc<dyn ArchiveStore> {
    info!(
        "☁️  S3 Archive: bucket '{}' in {}{}",
        config.bucket,
        config.region,
        config
            .endpoint
            .as_deref()
            .map(|e| format!(" via {}", e))
            .unwrap_or_default()
    );

    let mut loader = aws_config::from_env()
        .region(Region::new(config.region.clone()))
        .credentials_provider(Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "static",
        ));
    if let Some(endpoint) = &config.endpoint {
        loader = loader.endpoint_url(endpoint);
    }
    let aws_config = loader.load().await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(config.endpoint.is_some())
        .build();
    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);

    // Archive failures are per-item, so an unreachable bucket is only a warning here.
    match s3_client.head_bucket().bucket(&config.bucket).send().await {
        Ok(_) => info!("✅ Bucket '{}' is reachable", config.bucket),
        Err(e) => warn!(
            "⚠️  Bucket '{}' not reachable at startup: {}",
            config.bucket,
            aws_sdk_s3::error::DisplayErrorContext(&e)
        ),
    }

    Arc::new(S3Archive::new(s3_client, config.bucket.clone(), timeout))
}
