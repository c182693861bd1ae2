pub mod remote;
pub mod storage;

use crate::config::AppConfig;
use crate::services::pipeline::Pipeline;
use std::sync::Arc;

/// Builds the production pipeline: Cloudinary for transforms, reqwest for
/// fetching results, S3 for the archive.
pub async fn setup_pipeline(config: &AppConfig) -> anyhow::Result<Arc<Pipeline>> {
    let http = remote::setup_http_client()?;
    let transformer = remote::setup_transformer(http.clone(), &config.cloudinary);
    let fetcher = remote::setup_fetcher(http);
    let archive = storage::setup_storage(&config.storage, config.pipeline.network_timeout).await;

    tokio::fs::create_dir_all(&config.pipeline.temp_dir).await?;

    Ok(Arc::new(Pipeline::new(
        transformer,
        fetcher,
        archive,
        config.pipeline.clone(),
    )))
}
