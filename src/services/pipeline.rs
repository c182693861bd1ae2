use crate::config::PipelineConfig;
use crate::models::{
    ArchiveLocator, EffectKind, ItemOutcome, ItemStatus, TransformResult, UploadedImage, WorkItem,
};
use crate::services::archive::ArchiveStore;
use crate::services::error::{PipelineError, with_deadline};
use crate::services::fetcher::ResultFetcher;
use crate::services::transform::RemoteTransformer;
use crate::utils::validation::validate_upload;
use std::sync::Arc;
use tracing::{Instrument, field};

pub const INPUT_FOLDER: &str = "input";
pub const OUTPUT_FOLDER: &str = "output";

/// Result of a pipeline run that got past the fatal stages.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub input_file_name: String,
    pub effect: EffectKind,
    pub transform: TransformResult,
    pub s3_input_url: Option<ArchiveLocator>,
    pub s3_output_url: Option<ArchiveLocator>,
}

impl ProcessedImage {
    pub fn status(&self) -> ItemStatus {
        if self.transform.fetched {
            ItemStatus::Success
        } else {
            ItemStatus::Failed
        }
    }

    pub fn into_outcome(self, index: usize) -> ItemOutcome {
        ItemOutcome {
            index,
            status: self.status(),
            input_file_name: self.input_file_name,
            effect: self.effect,
            cloudinary_url: Some(self.transform.url),
            s3_input_url: self.s3_input_url,
            s3_output_url: self.s3_output_url,
            error: None,
        }
    }
}

/// Upload → remote transform → fetch result → archive both sides, for one image.
pub struct Pipeline {
    transformer: Arc<dyn RemoteTransformer>,
    fetcher: Arc<dyn ResultFetcher>,
    archive: Arc<dyn ArchiveStore>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        transformer: Arc<dyn RemoteTransformer>,
        fetcher: Arc<dyn ResultFetcher>,
        archive: Arc<dyn ArchiveStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            transformer,
            fetcher,
            archive,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the full pipeline. Errors are the fatal stages only; fetch misses
    /// and archive failures are reported through the returned value.
    pub async fn run(
        &self,
        upload: &UploadedImage,
        effect: EffectKind,
    ) -> Result<ProcessedImage, PipelineError> {
        let span = tracing::info_span!(
            "pipeline",
            effect = %effect,
            file = %upload.file_name,
            item_id = field::Empty,
        );
        self.run_item(upload, effect).instrument(span).await
    }

    /// Like [`Pipeline::run`], but folds fatal faults into an `error` outcome.
    pub async fn process(
        &self,
        index: usize,
        upload: &UploadedImage,
        effect: EffectKind,
    ) -> ItemOutcome {
        match self.run(upload, effect).await {
            Ok(processed) => processed.into_outcome(index),
            Err(e) => {
                tracing::error!(
                    "❌ {} failed at {} for '{}': {}",
                    effect,
                    e.stage(),
                    upload.file_name,
                    e
                );
                ItemOutcome::errored(index, upload.file_name.clone(), effect, e.to_string())
            }
        }
    }

    async fn run_item(
        &self,
        upload: &UploadedImage,
        effect: EffectKind,
    ) -> Result<ProcessedImage, PipelineError> {
        let file_name = validate_upload(upload, self.config.max_file_size)
            .map_err(|e| PipelineError::InvalidUpload(e.to_string()))?;
        let timeout = self.config.network_timeout;

        // Ingest
        tokio::fs::create_dir_all(&self.config.temp_dir).await?;
        let item = WorkItem::new(&self.config.temp_dir, &file_name, effect)?;
        tracing::Span::current().record("item_id", item.id.as_str());
        tokio::fs::write(item.input_path(), &upload.bytes).await?;

        // Remote store
        let asset = with_deadline(
            "remote_store",
            timeout,
            self.transformer.store(item.input_path(), effect, &item.id),
        )
        .await?;
        tracing::info!("☁️  Stored {} remotely as {}", item.file_name, asset.public_id);

        // Transform
        let url = self.transformer.transform_url(effect, &item.id);

        // Fetch
        let fetched = with_deadline(
            "fetch",
            timeout,
            self.fetcher.fetch(&url, item.output_path()),
        )
        .await?;
        if !fetched {
            tracing::warn!("⚠️  No transformed image for {} at {}", item.file_name, url);
        }

        // Archive both sides independently
        let s3_input_url = self.archive.archive(item.input_path(), INPUT_FOLDER).await;
        let s3_output_url = if fetched {
            self.archive.archive(item.output_path(), OUTPUT_FOLDER).await
        } else {
            None
        };

        tracing::info!(
            "✅ {} processed {} (fetched={}, input archived={}, output archived={})",
            effect,
            item.file_name,
            fetched,
            s3_input_url.is_some(),
            s3_output_url.is_some()
        );

        Ok(ProcessedImage {
            input_file_name: upload.file_name.clone(),
            effect,
            transform: TransformResult { url, fetched },
            s3_input_url,
            s3_output_url,
        })
    }
}
