use crate::services::error::PipelineError;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::path::Path;

/// Retrieves a transformed image into local scratch space.
#[async_trait]
pub trait ResultFetcher: Send + Sync {
    /// Returns `Ok(true)` once the bytes are written to `dest`, `Ok(false)`
    /// when the provider answered with anything other than 200 (nothing is
    /// written in that case). Transport faults are errors.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<bool, PipelineError>;
}

pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ResultFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<bool, PipelineError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::Fetch(e.to_string()))?;

        if response.status() != StatusCode::OK {
            tracing::warn!("⚠️  Transformed image not available ({}): {}", response.status(), url);
            return Ok(false);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::Fetch(e.to_string()))?;
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| PipelineError::local_io("fetch", dest, e))?;

        tracing::debug!("⬇️  Fetched {} bytes into {}", bytes.len(), dest.display());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::StatusCode as AxumStatus, routing::get};

    async fn serve() -> String {
        let app = Router::new()
            .route("/ok.png", get(|| async { vec![1u8, 2, 3, 4] }))
            .route("/missing.png", get(|| async { AxumStatus::NOT_FOUND }))
            .route("/accepted.png", get(|| async { (AxumStatus::ACCEPTED, "later") }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_fetch_writes_bytes_on_200() {
        let base = serve().await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.png");

        let fetched = HttpFetcher::new(reqwest::Client::new())
            .fetch(&format!("{}/ok.png", base), &dest)
            .await
            .unwrap();

        assert!(fetched);
        assert_eq!(std::fs::read(&dest).unwrap(), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_fetch_miss_is_not_an_error() {
        let base = serve().await;
        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new(reqwest::Client::new());

        for path in ["missing.png", "accepted.png"] {
            let dest = dir.path().join(path);
            let fetched = fetcher
                .fetch(&format!("{}/{}", base, path), &dest)
                .await
                .unwrap();
            assert!(!fetched);
            assert!(!dest.exists());
        }
    }

    #[tokio::test]
    async fn test_unwritable_destination_is_a_fetch_fault() {
        let base = serve().await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("gone").join("out.png");

        let err = HttpFetcher::new(reqwest::Client::new())
            .fetch(&format!("{}/ok.png", base), &dest)
            .await
            .unwrap_err();

        assert_eq!(err.stage(), "fetch");
        assert!(matches!(err, PipelineError::LocalIo { .. }));
        assert!(err.to_string().contains("out.png"));
    }

    #[tokio::test]
    async fn test_transport_fault_is_an_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dir = tempfile::tempdir().unwrap();
        let err = HttpFetcher::new(reqwest::Client::new())
            .fetch(&format!("http://{}/x.png", addr), &dir.path().join("x.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Fetch(_)));
    }
}
