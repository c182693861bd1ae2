use std::time::Duration;
use thiserror::Error;

/// Faults that end one item's pipeline run early.
///
/// Recoverable conditions (a fetch miss, a failed archive upload) are not
/// errors; they are carried in the item's outcome instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to write upload to scratch space: {0}")]
    Ingest(#[from] std::io::Error),

    #[error("{stage} could not access local file {}: {source}", .path.display())]
    LocalIo {
        stage: &'static str,
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("remote store failed: {0}")]
    RemoteStore(String),

    #[error("remote store rejected with status {status}: {body}")]
    RemoteRejected { status: u16, body: String },

    #[error("fetching transformed image failed: {0}")]
    Fetch(String),

    #[error("{stage} timed out after {}s", .after.as_secs())]
    Timeout { stage: &'static str, after: Duration },

    #[error("item task aborted: {0}")]
    Task(String),

    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    #[error("invalid upload: {0}")]
    InvalidUpload(String),
}

impl PipelineError {
    pub fn local_io(
        stage: &'static str,
        path: &std::path::Path,
        source: std::io::Error,
    ) -> Self {
        PipelineError::LocalIo {
            stage,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Pipeline stage the fault is attributed to.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Ingest(_) | PipelineError::InvalidUpload(_) => "ingest",
            PipelineError::RemoteStore(_) | PipelineError::RemoteRejected { .. } => "remote_store",
            PipelineError::Fetch(_) => "fetch",
            PipelineError::Timeout { stage, .. } | PipelineError::LocalIo { stage, .. } => *stage,
            PipelineError::Task(_) => "task",
            PipelineError::InvalidBatch(_) => "batch",
        }
    }
}

/// Runs a network-bound future under a deadline, mapping expiry to [`PipelineError::Timeout`].
pub async fn with_deadline<T, F>(
    stage: &'static str,
    after: Duration,
    fut: F,
) -> Result<T, PipelineError>
where
    F: std::future::Future<Output = Result<T, PipelineError>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(res) => res,
        Err(_) => Err(PipelineError::Timeout { stage, after }),
    }
}
