use crate::config::CloudinaryConfig;
use crate::models::EffectKind;
use crate::services::error::PipelineError;
use async_trait::async_trait;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Characters escaped in the transformation segment of a delivery URL.
const TRANSFORMATION_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Acknowledgement returned by the provider for a stored original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAsset {
    pub public_id: String,
}

/// Client for the remote image-transformation provider.
#[async_trait]
pub trait RemoteTransformer: Send + Sync {
    /// Uploads the local file under `{effect folder}/{id}`.
    async fn store(
        &self,
        local_path: &Path,
        effect: EffectKind,
        id: &str,
    ) -> Result<RemoteAsset, PipelineError>;

    /// Builds the public URL of the transformed image. No network access.
    fn transform_url(&self, effect: EffectKind, id: &str) -> String;
}

/// Transformation parameters for an effect, as `(key, value)` URL components.
pub fn transformation_components(effect: EffectKind) -> Vec<(&'static str, String)> {
    let mut components = match effect {
        EffectKind::BackgroundRemoval => vec![
            ("c", "fill".to_string()),
            ("e", "background_removal".to_string()),
            ("f", "png".to_string()),
        ],
        EffectKind::ContentAwareResize => vec![
            ("w", "1080".to_string()),
            ("h", "1440".to_string()),
            ("c", "pad".to_string()),
            ("g", "west".to_string()),
            ("b", "gen_fill:prompt_a simple studio floor".to_string()),
        ],
        EffectKind::AddShadow => vec![(
            "e",
            "dropshadow:azimuth_90;elevation_10;spread_0".to_string(),
        )],
    };
    components.sort_by(|a, b| a.0.cmp(b.0));
    components
}

pub fn transformation_string(effect: EffectKind) -> String {
    let joined = transformation_components(effect)
        .into_iter()
        .map(|(k, v)| format!("{}_{}", k, v))
        .collect::<Vec<_>>()
        .join(",");
    utf8_percent_encode(&joined, TRANSFORMATION_ESCAPE).to_string()
}

/// Signs upload parameters: sorted `key=value` pairs joined by `&`, followed by the secret.
pub fn sign_params(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Deserialize)]
struct UploadResponse {
    public_id: String,
}

pub struct CloudinaryTransformer {
    http: reqwest::Client,
    config: CloudinaryConfig,
}

impl CloudinaryTransformer {
    pub fn new(http: reqwest::Client, config: CloudinaryConfig) -> Self {
        Self { http, config }
    }

    /// Text fields of a signed upload. The digest follows the account's
    /// signature algorithm setting, which must be SHA-256.
    fn upload_fields(
        &self,
        effect: EffectKind,
        id: &str,
        timestamp: String,
    ) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("folder", effect.remote_folder().to_string()),
            ("public_id", id.to_string()),
            ("timestamp", timestamp),
        ];
        let signature = sign_params(&fields, &self.config.api_secret);
        fields.push(("api_key", self.config.api_key.clone()));
        fields.push(("signature", signature));
        fields
    }

    fn upload_endpoint(&self) -> String {
        format!(
            "{}/v1_1/{}/image/upload",
            self.config.api_base.trim_end_matches('/'),
            self.config.cloud_name
        )
    }
}

#[async_trait]
impl RemoteTransformer for CloudinaryTransformer {
    async fn store(
        &self,
        local_path: &Path,
        effect: EffectKind,
        id: &str,
    ) -> Result<RemoteAsset, PipelineError> {
        let data = tokio::fs::read(local_path)
            .await
            .map_err(|e| PipelineError::local_io("remote_store", local_path, e))?;
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();

        let timestamp = chrono::Utc::now().timestamp().to_string();
        let mut form = reqwest::multipart::Form::new().part(
            "file",
            reqwest::multipart::Part::bytes(data).file_name(file_name),
        );
        for (key, value) in self.upload_fields(effect, id, timestamp) {
            form = form.text(key, value);
        }

        let response = self
            .http
            .post(self.upload_endpoint())
            .multipart(form)
            .send()
            .await
            .map_err(|e| PipelineError::RemoteStore(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::RemoteRejected {
                status: status.as_u16(),
                body,
            });
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::RemoteStore(format!("unreadable response: {}", e)))?;

        tracing::debug!("☁️  Stored original as {}", uploaded.public_id);
        Ok(RemoteAsset {
            public_id: uploaded.public_id,
        })
    }

    fn transform_url(&self, effect: EffectKind, id: &str) -> String {
        format!(
            "{}/{}/image/upload/{}/v1/{}/{}.png",
            self.config.delivery_base.trim_end_matches('/'),
            self.config.cloud_name,
            transformation_string(effect),
            effect.remote_folder(),
            id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transformer() -> CloudinaryTransformer {
        CloudinaryTransformer::new(
            reqwest::Client::new(),
            CloudinaryConfig {
                cloud_name: "demo".to_string(),
                api_key: "key".to_string(),
                api_secret: "secret".to_string(),
                api_base: "https://api.cloudinary.com".to_string(),
                delivery_base: "https://res.cloudinary.com/".to_string(),
            },
        )
    }

    #[test]
    fn test_background_removal_url() {
        let url = transformer().transform_url(EffectKind::BackgroundRemoval, "abc123");
        assert_eq!(
            url,
            "https://res.cloudinary.com/demo/image/upload/c_fill,e_background_removal,f_png/v1/background_removed/abc123.png"
        );
    }

    #[test]
    fn test_content_aware_url_escapes_prompt() {
        let url = transformer().transform_url(EffectKind::ContentAwareResize, "abc123");
        assert_eq!(
            url,
            "https://res.cloudinary.com/demo/image/upload/b_gen_fill:prompt_a%20simple%20studio%20floor,c_pad,g_west,h_1440,w_1080/v1/content_aware/abc123.png"
        );
    }

    #[test]
    fn test_shadow_url() {
        let url = transformer().transform_url(EffectKind::AddShadow, "abc123");
        assert_eq!(
            url,
            "https://res.cloudinary.com/demo/image/upload/e_dropshadow:azimuth_90;elevation_10;spread_0/v1/bg_shadow_test/abc123.png"
        );
    }

    #[test]
    fn test_transform_url_is_deterministic() {
        let t = transformer();
        for effect in EffectKind::ALL {
            assert_eq!(t.transform_url(effect, "same"), t.transform_url(effect, "same"));
        }
    }

    #[test]
    fn test_signature_ignores_param_order() {
        let a = sign_params(
            &[("timestamp", "1".into()), ("folder", "f".into())],
            "secret",
        );
        let b = sign_params(
            &[("folder", "f".into()), ("timestamp", "1".into())],
            "secret",
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let mut hasher = Sha256::new();
        hasher.update(b"folder=f&timestamp=1secret");
        assert_eq!(a, hex::encode(hasher.finalize()));
    }

    #[test]
    fn test_upload_fields_carry_only_signed_params_and_credentials() {
        let fields =
            transformer().upload_fields(EffectKind::AddShadow, "abc123", "1700000000".into());
        let keys: Vec<&str> = fields.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            vec!["folder", "public_id", "timestamp", "api_key", "signature"]
        );

        let expected = sign_params(
            &[
                ("folder", "bg_shadow_test".into()),
                ("public_id", "abc123".into()),
                ("timestamp", "1700000000".into()),
            ],
            "secret",
        );
        assert_eq!(fields[4].1, expected);
        assert_eq!(fields[3].1, "key");
    }

    #[tokio::test]
    async fn test_store_of_missing_file_is_a_remote_store_fault() {
        let dir = tempfile::tempdir().unwrap();
        let err = transformer()
            .store(&dir.path().join("nope.png"), EffectKind::AddShadow, "abc123")
            .await
            .unwrap_err();
        assert_eq!(err.stage(), "remote_store");
        assert!(matches!(err, PipelineError::LocalIo { .. }));
    }

    #[test]
    fn test_upload_endpoint() {
        assert_eq!(
            transformer().upload_endpoint(),
            "https://api.cloudinary.com/v1_1/demo/image/upload"
        );
    }
}
