use crate::config::CloudinaryConfig;
use crate::services::fetcher::{HttpFetcher, ResultFetcher};
use crate::services::transform::{CloudinaryTransformer, RemoteTransformer};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub fn setup_http_client() -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

pub fn setup_transformer(
    http: reqwest::Client,
    config: &CloudinaryConfig,
) -> Arc<dyn RemoteTransformer> {
    info!(
        "🎨 Transform provider: cloud '{}' (api {}, delivery {})",
        config.cloud_name, config.api_base, config.delivery_base
    );
    Arc::new(CloudinaryTransformer::new(http, config.clone()))
}

pub fn setup_fetcher(http: reqwest::Client) -> Arc<dyn ResultFetcher> {
    Arc::new(HttpFetcher::new(http))
}
