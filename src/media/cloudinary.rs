use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::info;

use super::{ImageFormat, ImageHost, MediaError, StoredImage};
use crate::config::MediaConfig;

const API_BASE: &str = "https://api.cloudinary.com/v1_1";

/// Cloudinary-compatible image host using signed uploads
pub struct CloudinaryHost {
    cloud_name: String,
    api_key: String,
    api_secret: String,
    folder: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

impl CloudinaryHost {
    pub fn from_config(config: &MediaConfig, client: reqwest::Client) -> Result<Self, MediaError> {
        if !config.has_remote_host() {
            return Err(MediaError::NotConfigured);
        }
        let field = |v: &Option<String>| v.as_deref().unwrap_or_default().trim().to_string();
        Ok(Self {
            cloud_name: field(&config.cloud_name),
            api_key: field(&config.api_key),
            api_secret: field(&config.api_secret),
            folder: config.folder.clone(),
            client,
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/{}/image/{}", API_BASE, self.cloud_name, action)
    }

    /// SHA-256 over the `&`-joined, key-sorted parameters followed by the secret
    fn sign(&self, params: &mut [(&str, String)]) -> String {
        params.sort_by(|a, b| a.0.cmp(b.0));
        let joined = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha256::new();
        hasher.update(joined.as_bytes());
        hasher.update(self.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn signed_form(&self, mut params: Vec<(&'static str, String)>) -> Form {
        let signature = self.sign(&mut params);
        let mut form = Form::new()
            .text("api_key", self.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");
        for (key, value) in params {
            form = form.text(key, value);
        }
        form
    }

    async fn error_from(response: reqwest::Response) -> MediaError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        MediaError::Host { status, body }
    }
}

#[async_trait]
impl ImageHost for CloudinaryHost {
    fn name(&self) -> &'static str {
        "cloudinary"
    }

    async fn upload(&self, data: Bytes, format: ImageFormat) -> Result<StoredImage, MediaError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let file = Part::stream(data)
            .file_name(format!("photo.{}", format.extension()))
            .mime_str(format.content_type())?;
        let form = self
            .signed_form(vec![("folder", self.folder.clone()), ("timestamp", timestamp)])
            .part("file", file);

        let response = self
            .client
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let uploaded: UploadResponse = response.json().await?;
        info!(public_id = %uploaded.public_id, "Uploaded photo to image host");
        Ok(StoredImage {
            url: uploaded.secure_url,
            public_id: uploaded.public_id,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<(), MediaError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let form = self.signed_form(vec![
            ("public_id", public_id.to_string()),
            ("timestamp", timestamp),
        ]);

        let response = self
            .client
            .post(self.endpoint("destroy"))
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let destroyed: DestroyResponse = response.json().await?;
        if destroyed.result != "ok" && destroyed.result != "not found" {
            return Err(MediaError::InvalidReference(format!(
                "{} ({})",
                public_id, destroyed.result
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> CloudinaryHost {
        let config = MediaConfig {
            cloud_name: Some("school".to_string()),
            api_key: Some("key".to_string()),
            api_secret: Some("secret".to_string()),
            ..Default::default()
        };
        CloudinaryHost::from_config(&config, reqwest::Client::new()).unwrap()
    }

    #[test]
    fn test_requires_all_credentials() {
        let config = MediaConfig {
            cloud_name: Some("school".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            CloudinaryHost::from_config(&config, reqwest::Client::new()),
            Err(MediaError::NotConfigured)
        ));
    }

    #[test]
    fn test_signature_is_order_independent() {
        let host = host();
        let mut a = vec![("timestamp", "1700000000".to_string()), ("folder", "f".to_string())];
        let mut b = vec![("folder", "f".to_string()), ("timestamp", "1700000000".to_string())];

        let sig = host.sign(&mut a);
        assert_eq!(sig, host.sign(&mut b));
        assert_eq!(sig.len(), 64);

        let mut expected = Sha256::new();
        expected.update(b"folder=f&timestamp=1700000000secret");
        assert_eq!(sig, hex::encode(expected.finalize()));
    }

    #[test]
    fn test_endpoints() {
        assert_eq!(
            host().endpoint("upload"),
            "https://api.cloudinary.com/v1_1/school/image/upload"
        );
    }
}
