use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use utoipa::ToSchema;
use uuid::Uuid;

/// The remote transformation requested for an uploaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    BackgroundRemoval,
    ContentAwareResize,
    AddShadow,
}

impl EffectKind {
    pub const ALL: [EffectKind; 3] = [
        EffectKind::BackgroundRemoval,
        EffectKind::ContentAwareResize,
        EffectKind::AddShadow,
    ];

    /// Folder on the transformation provider that originals for this effect are stored under.
    pub fn remote_folder(&self) -> &'static str {
        match self {
            EffectKind::BackgroundRemoval => "background_removed",
            EffectKind::ContentAwareResize => "content_aware",
            EffectKind::AddShadow => "bg_shadow_test",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EffectKind::BackgroundRemoval => "background_removal",
            EffectKind::ContentAwareResize => "content_aware_resize",
            EffectKind::AddShadow => "add_shadow",
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw bytes of one uploaded file, owned by the request for its lifetime.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadedImage {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }
}

/// One uploaded image travelling through one effect.
///
/// The scratch files live in the shared temp directory under names prefixed
/// with the item id, and are removed when the item is dropped.
#[derive(Debug)]
pub struct WorkItem {
    pub id: String,
    pub file_name: String,
    pub effect: EffectKind,
    input: TempPath,
    output: TempPath,
}

impl WorkItem {
    pub fn new(temp_dir: &Path, file_name: &str, effect: EffectKind) -> io::Result<Self> {
        let id = Uuid::new_v4().simple().to_string();
        let input = TempPath::try_from_path(temp_dir.join(format!("{}_{}", id, file_name)))?;
        let output =
            TempPath::try_from_path(temp_dir.join(format!("{}_output_{}", id, file_name)))?;

        Ok(Self {
            id,
            file_name: file_name.to_string(),
            effect,
            input,
            output,
        })
    }

    pub fn input_path(&self) -> &Path {
        &self.input
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    pub fn scratch_paths(&self) -> [PathBuf; 2] {
        [self.input.to_path_buf(), self.output.to_path_buf()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformResult {
    pub url: String,
    pub fetched: bool,
}

/// Opaque reference to an archived object, e.g. `s3://bucket/input/...`.
pub type ArchiveLocator = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Success,
    Failed,
    Error,
}

/// Per-item result reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ItemOutcome {
    /// Position of the file in the submitted request.
    pub index: usize,
    pub input_file_name: String,
    pub effect: EffectKind,
    pub status: ItemStatus,
    pub cloudinary_url: Option<String>,
    #[schema(value_type = Option<String>)]
    pub s3_input_url: Option<ArchiveLocator>,
    #[schema(value_type = Option<String>)]
    pub s3_output_url: Option<ArchiveLocator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemOutcome {
    pub fn errored(
        index: usize,
        file_name: impl Into<String>,
        effect: EffectKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            index,
            input_file_name: file_name.into(),
            effect,
            status: ItemStatus::Error,
            cloudinary_url: None,
            s3_input_url: None,
            s3_output_url: None,
            error: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ItemStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_item_paths_are_namespaced_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let a = WorkItem::new(dir.path(), "cat.jpg", EffectKind::AddShadow).unwrap();
        let b = WorkItem::new(dir.path(), "cat.jpg", EffectKind::AddShadow).unwrap();

        assert_ne!(a.id, b.id);
        assert_ne!(a.input_path(), b.input_path());
        assert_ne!(a.output_path(), b.output_path());
        assert!(
            a.input_path()
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(&a.id)
        );
    }

    #[test]
    fn test_work_item_removes_scratch_files_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let item = WorkItem::new(dir.path(), "dog.png", EffectKind::BackgroundRemoval).unwrap();
        std::fs::write(item.input_path(), b"in").unwrap();
        std::fs::write(item.output_path(), b"out").unwrap();
        let paths = item.scratch_paths();

        drop(item);

        for path in paths {
            assert!(!path.exists(), "{} should be removed", path.display());
        }
    }

    #[test]
    fn test_relative_temp_dir_is_accepted() {
        let item = WorkItem::new(Path::new("temp"), "a.png", EffectKind::AddShadow).unwrap();
        assert!(item.input_path().ends_with(format!("temp/{}_a.png", item.id)));
        assert!(
            item.output_path()
                .ends_with(format!("temp/{}_output_a.png", item.id))
        );
    }

    #[test]
    fn test_drop_without_output_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let item = WorkItem::new(dir.path(), "x.png", EffectKind::ContentAwareResize).unwrap();
        std::fs::write(item.input_path(), b"in").unwrap();
        drop(item);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_outcome_serialization_shape() {
        let outcome = ItemOutcome::errored(2, "a.png", EffectKind::AddShadow, "boom");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["effect"], "add_shadow");
        assert_eq!(json["input_file_name"], "a.png");
        assert!(json["s3_output_url"].is_null());
        assert_eq!(json["error"], "boom");
    }
}
