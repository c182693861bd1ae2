use crate::models::{EffectKind, ItemOutcome, ItemStatus, UploadedImage};
use crate::services::error::PipelineError;
use crate::services::pipeline::Pipeline;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::info;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errored: usize,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[ItemOutcome]) -> Self {
        outcomes.iter().fold(
            Self {
                total: outcomes.len(),
                ..Self::default()
            },
            |mut acc, o| {
                match o.status {
                    ItemStatus::Success => acc.succeeded += 1,
                    ItemStatus::Failed => acc.failed += 1,
                    ItemStatus::Error => acc.errored += 1,
                }
                acc
            },
        )
    }
}

/// Runs the pipeline over every upload with at most `concurrency_limit`
/// items in flight.
///
/// Outcomes come back in input order, one per upload. Item faults (including
/// a panicking item task) become `error` outcomes; only an undispatchable
/// batch fails the call.
pub async fn run_batch(
    pipeline: Arc<Pipeline>,
    uploads: Vec<UploadedImage>,
    effect: EffectKind,
    concurrency_limit: usize,
) -> Result<Vec<ItemOutcome>, PipelineError> {
    if uploads.is_empty() {
        return Err(PipelineError::InvalidBatch("no files submitted".to_string()));
    }
    if concurrency_limit == 0 {
        return Err(PipelineError::InvalidBatch(
            "concurrency limit must be at least 1".to_string(),
        ));
    }

    let total = uploads.len();
    info!(
        "📦 Batch of {} images for {} (concurrency {})",
        total, effect, concurrency_limit
    );

    let semaphore = Arc::new(Semaphore::new(concurrency_limit));
    let mut names = Vec::with_capacity(total);
    let mut task_index = HashMap::with_capacity(total);
    // Dropping the set aborts items still queued or running.
    let mut tasks = JoinSet::new();

    for (index, upload) in uploads.into_iter().enumerate() {
        names.push(upload.file_name.clone());
        let semaphore = semaphore.clone();
        let pipeline = pipeline.clone();

        let handle = tasks.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    return ItemOutcome::errored(
                        index,
                        upload.file_name,
                        effect,
                        PipelineError::Task(e.to_string()).to_string(),
                    );
                }
            };
            pipeline.process(index, &upload, effect).await
        });
        task_index.insert(handle.id(), index);
    }

    let mut slots: Vec<Option<ItemOutcome>> = vec![None; total];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => {
                let index = outcome.index;
                slots[index] = Some(outcome);
            }
            Err(e) => {
                let Some(&index) = task_index.get(&e.id()) else {
                    tracing::error!("❌ Unknown item task aborted: {}", e);
                    continue;
                };
                let name = names[index].clone();
                tracing::error!("❌ Item task {} ('{}') aborted: {}", index, name, e);
                slots[index] = Some(ItemOutcome::errored(
                    index,
                    name,
                    effect,
                    PipelineError::Task(e.to_string()).to_string(),
                ));
            }
        }
    }

    let outcomes: Vec<ItemOutcome> = slots
        .into_iter()
        .zip(names)
        .enumerate()
        .map(|(index, (slot, name))| {
            slot.unwrap_or_else(|| {
                ItemOutcome::errored(
                    index,
                    name,
                    effect,
                    PipelineError::Task("ended without an outcome".to_string()).to_string(),
                )
            })
        })
        .collect();

    let summary = BatchSummary::from_outcomes(&outcomes);
    info!(
        "📦 Batch finished: {} succeeded, {} failed, {} errored",
        summary.succeeded, summary.failed, summary.errored
    );

    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::models::ArchiveLocator;
    use crate::services::archive::ArchiveStore;
    use crate::services::fetcher::ResultFetcher;
    use crate::services::transform::{RemoteAsset, RemoteTransformer};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts concurrent `store` calls and fails or panics for chosen file names.
    #[derive(Default)]
    struct GaugedTransformer {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        finished: AtomicUsize,
        delay_ms: u64,
    }

    #[async_trait]
    impl RemoteTransformer for GaugedTransformer {
        async fn store(
            &self,
            local_path: &Path,
            _effect: EffectKind,
            id: &str,
        ) -> Result<RemoteAsset, PipelineError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.finished.fetch_add(1, Ordering::SeqCst);

            let name = local_path.file_name().unwrap().to_string_lossy();
            if name.ends_with("broken.png") {
                return Err(PipelineError::RemoteStore("provider refused".into()));
            }
            if name.ends_with("panic.png") {
                panic!("provider client bug");
            }
            Ok(RemoteAsset {
                public_id: id.to_string(),
            })
        }

        fn transform_url(&self, _effect: EffectKind, id: &str) -> String {
            format!("https://cdn.test/{}.png", id)
        }
    }

    /// Serves results for every id except those whose scratch name marks them missing.
    struct SelectiveFetcher;

    #[async_trait]
    impl ResultFetcher for SelectiveFetcher {
        async fn fetch(&self, _url: &str, dest: &Path) -> Result<bool, PipelineError> {
            if dest.to_string_lossy().ends_with("missing.png") {
                return Ok(false);
            }
            tokio::fs::write(dest, b"png").await?;
            Ok(true)
        }
    }

    struct OkArchive;

    #[async_trait]
    impl ArchiveStore for OkArchive {
        async fn archive(&self, _local_path: &Path, folder: &str) -> Option<ArchiveLocator> {
            Some(format!("s3://test/{}", folder))
        }
    }

    fn pipeline(transformer: Arc<GaugedTransformer>, dir: &Path) -> Arc<Pipeline> {
        Arc::new(Pipeline::new(
            transformer,
            Arc::new(SelectiveFetcher),
            Arc::new(OkArchive),
            PipelineConfig {
                temp_dir: dir.to_path_buf(),
                ..PipelineConfig::default()
            },
        ))
    }

    fn uploads(names: &[&str]) -> Vec<UploadedImage> {
        names
            .iter()
            .map(|n| UploadedImage::new(*n, b"bytes".to_vec()))
            .collect()
    }

    #[tokio::test]
    async fn test_concurrency_cap_is_respected() {
        let dir = tempfile::tempdir().unwrap();
        let transformer = Arc::new(GaugedTransformer {
            delay_ms: 50,
            ..Default::default()
        });
        let names: Vec<String> = (0..12).map(|i| format!("img{}.png", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();

        let outcomes = run_batch(
            pipeline(transformer.clone(), dir.path()),
            uploads(&refs),
            EffectKind::AddShadow,
            3,
        )
        .await
        .unwrap();

        assert_eq!(outcomes.len(), 12);
        assert!(outcomes.iter().all(|o| o.is_success()));
        assert_eq!(transformer.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_one_outcome_per_item_in_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let transformer = Arc::new(GaugedTransformer::default());
        let names = ["a.png", "b-missing.png", "c-broken.png", "d.png"];

        let outcomes = run_batch(
            pipeline(transformer, dir.path()),
            uploads(&names),
            EffectKind::BackgroundRemoval,
            2,
        )
        .await
        .unwrap();

        let got: Vec<(usize, &str, ItemStatus)> = outcomes
            .iter()
            .map(|o| (o.index, o.input_file_name.as_str(), o.status))
            .collect();
        assert_eq!(
            got,
            vec![
                (0, "a.png", ItemStatus::Success),
                (1, "b-missing.png", ItemStatus::Failed),
                (2, "c-broken.png", ItemStatus::Error),
                (3, "d.png", ItemStatus::Success),
            ]
        );
        assert!(outcomes[2].error.as_deref().unwrap().contains("provider refused"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_panicking_item_does_not_sink_batch() {
        let dir = tempfile::tempdir().unwrap();
        let transformer = Arc::new(GaugedTransformer::default());

        let outcomes = run_batch(
            pipeline(transformer, dir.path()),
            uploads(&["ok.png", "panic.png", "also-ok.png"]),
            EffectKind::ContentAwareResize,
            5,
        )
        .await
        .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].status, ItemStatus::Success);
        assert_eq!(outcomes[1].status, ItemStatus::Error);
        assert_eq!(outcomes[1].input_file_name, "panic.png");
        assert_eq!(outcomes[2].status, ItemStatus::Success);
    }

    #[tokio::test]
    async fn test_dropped_batch_stops_its_items() {
        let dir = tempfile::tempdir().unwrap();
        let transformer = Arc::new(GaugedTransformer {
            delay_ms: 200,
            ..Default::default()
        });

        let batch = run_batch(
            pipeline(transformer.clone(), dir.path()),
            uploads(&["a.png", "b.png", "c.png"]),
            EffectKind::AddShadow,
            1,
        );
        assert!(
            tokio::time::timeout(Duration::from_millis(50), batch)
                .await
                .is_err()
        );

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(transformer.finished.load(Ordering::SeqCst), 0);
        assert_eq!(transformer.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_undispatchable_batch_fails() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(Arc::new(GaugedTransformer::default()), dir.path());

        let empty = run_batch(p.clone(), Vec::new(), EffectKind::AddShadow, 5).await;
        assert!(matches!(empty, Err(PipelineError::InvalidBatch(_))));

        let zero = run_batch(p, uploads(&["a.png"]), EffectKind::AddShadow, 0).await;
        assert!(matches!(zero, Err(PipelineError::InvalidBatch(_))));
    }

    #[test]
    fn test_summary_counts() {
        let mut ok = ItemOutcome::errored(0, "a", EffectKind::AddShadow, "x");
        ok.status = ItemStatus::Success;
        ok.error = None;
        let outcomes = vec![
            ok,
            ItemOutcome::errored(1, "b", EffectKind::AddShadow, "x"),
            ItemOutcome::errored(2, "c", EffectKind::AddShadow, "x"),
        ];
        assert_eq!(
            BatchSummary::from_outcomes(&outcomes),
            BatchSummary {
                total: 3,
                succeeded: 1,
                failed: 0,
                errored: 2,
            }
        );
    }
}
