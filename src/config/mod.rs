use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Allowance for multipart boundaries and part headers around one file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Credentials and endpoints for the remote transformation provider.
#[derive(Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Base URL of the upload API (default: "https://api.cloudinary.com")
    pub api_base: String,
    /// Base URL transformed images are served from (default: "https://res.cloudinary.com")
    pub delivery_base: String,
}

impl fmt::Debug for CloudinaryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudinaryConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("delivery_base", &self.delivery_base)
            .finish()
    }
}

/// Object storage the originals and results are archived to.
#[derive(Clone)]
pub struct StorageConfig {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub bucket: String,
    /// Custom S3-compatible endpoint (e.g. MinIO). Uses path-style addressing when set.
    pub endpoint: Option<String>,
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Shared scratch directory for uploads and fetched results (default: "temp")
    pub temp_dir: PathBuf,

    /// Concurrent pipelines per batch request (default: 5)
    pub batch_concurrency: usize,

    /// Upper bound a caller may raise the batch concurrency to (default: 16)
    pub max_batch_concurrency: usize,

    /// Bound on each store/fetch/archive call (default: 60s)
    pub network_timeout: Duration,

    /// Maximum size of a single uploaded image in bytes (default: 20 MB)
    pub max_file_size: usize,

    /// Maximum number of files in one batch request (default: 50)
    pub max_batch_files: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("temp"),
            batch_concurrency: 5,
            max_batch_concurrency: 16,
            network_timeout: Duration::from_secs(60),
            max_file_size: 20 * 1024 * 1024, // 20 MB
            max_batch_files: 50,
        }
    }
}

impl PipelineConfig {
    /// Clamps a caller-requested concurrency into the allowed range.
    pub fn effective_concurrency(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.batch_concurrency)
            .clamp(1, self.max_batch_concurrency.max(1))
    }

    /// Body limit for a single-image request: one file plus multipart framing.
    pub fn single_request_limit(&self) -> usize {
        self.max_file_size.saturating_add(MULTIPART_OVERHEAD)
    }

    /// Body limit for a request carrying up to `max_batch_files` images plus multipart overhead.
    pub fn request_body_limit(&self) -> usize {
        self.max_file_size
            .saturating_mul(self.max_batch_files)
            .saturating_add(10 * 1024 * 1024)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub cloudinary: CloudinaryConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    /// Required values that are absent or blank abort loading.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| -> Result<String, ConfigError> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(key))
        };
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let default = PipelineConfig::default();

        let cloudinary = CloudinaryConfig {
            cloud_name: required("CLOUD_NAME")?,
            api_key: required("CLOUD_API_KEY")?,
            api_secret: required("CLOUD_API_SECRET")?,
            api_base: optional("CLOUDINARY_API_BASE")
                .unwrap_or_else(|| "https://api.cloudinary.com".to_string()),
            delivery_base: optional("CLOUDINARY_DELIVERY_BASE")
                .unwrap_or_else(|| "https://res.cloudinary.com".to_string()),
        };

        let storage = StorageConfig {
            access_key: required("AWS_ACCESS_KEY_ID")?,
            secret_key: required("AWS_SECRET_ACCESS_KEY")?,
            region: required("AWS_REGION")?,
            bucket: required("S3_BUCKET")?,
            endpoint: optional("S3_ENDPOINT"),
        };

        let pipeline = PipelineConfig {
            temp_dir: optional("TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.temp_dir),

            batch_concurrency: optional("BATCH_CONCURRENCY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.batch_concurrency),

            max_batch_concurrency: optional("MAX_BATCH_CONCURRENCY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_batch_concurrency),

            network_timeout: optional("NETWORK_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.network_timeout),

            max_file_size: optional("MAX_FILE_SIZE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            max_batch_files: optional("MAX_BATCH_FILES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_batch_files),
        };

        if pipeline.batch_concurrency == 0 {
            return Err(ConfigError::Invalid {
                var: "BATCH_CONCURRENCY",
                reason: "must be at least 1".to_string(),
            });
        }
        if pipeline.max_batch_concurrency < pipeline.batch_concurrency {
            return Err(ConfigError::Invalid {
                var: "MAX_BATCH_CONCURRENCY",
                reason: format!(
                    "must not be below BATCH_CONCURRENCY ({})",
                    pipeline.batch_concurrency
                ),
            });
        }
        if pipeline.network_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: "NETWORK_TIMEOUT_SECS",
                reason: "must be at least 1 second".to_string(),
            });
        }

        Ok(Self {
            cloudinary,
            storage,
            pipeline,
        })
    }
}
