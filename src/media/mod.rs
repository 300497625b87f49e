//! Student photo storage.
//!
//! Photos go to a remote image host when one is configured and to the local
//! uploads directory otherwise, or when the remote upload fails. The stored
//! `public_id` tells later deletes which host owns the image.

mod cloudinary;
mod local;

pub use cloudinary::CloudinaryHost;
pub use local::LocalImageHost;

use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("unsupported image type: {0}")]
    UnsupportedType(String),
    #[error("image is {size} bytes, the limit is {max}")]
    TooLarge { size: usize, max: usize },
    #[error("file content is not a {0} image")]
    ContentMismatch(&'static str),
    #[error("image host not configured")]
    NotConfigured,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("image host returned HTTP {status}: {body}")]
    Host { status: reqwest::StatusCode, body: String },
    #[error("invalid image reference: {0}")]
    InvalidReference(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    /// Map a declared content type to a supported format
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageFormat::Jpeg),
            "image/png" => Some(ImageFormat::Png),
            _ => None,
        }
    }

    /// Detect the format from the file's leading bytes
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(ImageFormat::Png)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Png => "PNG",
        }
    }
}

/// Where an uploaded image ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub url: String,
    pub public_id: String,
}

#[async_trait]
pub trait ImageHost: Send + Sync {
    fn name(&self) -> &'static str;
    async fn upload(&self, data: Bytes, format: ImageFormat) -> Result<StoredImage, MediaError>;
    async fn delete(&self, public_id: &str) -> Result<(), MediaError>;
}

/// Photo storage used by the handlers and the report generators
pub struct PhotoStore {
    remote: Option<Arc<dyn ImageHost>>,
    local: LocalImageHost,
    max_upload_bytes: usize,
    http: reqwest::Client,
}

impl PhotoStore {
    pub fn new(
        remote: Option<Arc<dyn ImageHost>>,
        local: LocalImageHost,
        max_upload_bytes: usize,
        http: reqwest::Client,
    ) -> Self {
        Self {
            remote,
            local,
            max_upload_bytes,
            http,
        }
    }

    pub fn from_config(config: &Config, http: reqwest::Client) -> Self {
        let remote: Option<Arc<dyn ImageHost>> = match CloudinaryHost::from_config(&config.media, http.clone()) {
            Ok(host) => Some(Arc::new(host)),
            Err(MediaError::NotConfigured) => None,
            Err(e) => {
                warn!("Image host disabled: {}", e);
                None
            }
        };
        Self::new(
            remote,
            LocalImageHost::new(config.uploads_dir()),
            config.media.max_upload_bytes,
            http,
        )
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub fn uploads_dir(&self) -> &PathBuf {
        self.local.dir()
    }

    /// Check an upload's declared type, size and content before storing it
    pub fn check_upload(&self, content_type: Option<&str>, data: &[u8]) -> Result<ImageFormat, MediaError> {
        let declared = content_type.unwrap_or("application/octet-stream");
        let format = ImageFormat::from_content_type(declared)
            .ok_or_else(|| MediaError::UnsupportedType(declared.to_string()))?;

        if data.len() > self.max_upload_bytes {
            return Err(MediaError::TooLarge {
                size: data.len(),
                max: self.max_upload_bytes,
            });
        }
        if ImageFormat::sniff(data) != Some(format) {
            return Err(MediaError::ContentMismatch(format.label()));
        }
        Ok(format)
    }

    /// Store an image, falling back to local disk if the remote host fails
    pub async fn store(&self, data: Bytes, format: ImageFormat) -> Result<StoredImage, MediaError> {
        if let Some(remote) = &self.remote {
            match remote.upload(data.clone(), format).await {
                Ok(stored) => return Ok(stored),
                Err(e) => warn!(host = remote.name(), "Photo upload failed, storing locally: {}", e),
            }
        }
        self.local.upload(data, format).await
    }

    /// Delete an image from whichever host owns it. Failures are only logged.
    pub async fn remove(&self, public_id: &str) {
        let result = if LocalImageHost::owns(public_id) {
            self.local.delete(public_id).await
        } else if let Some(remote) = &self.remote {
            remote.delete(public_id).await
        } else {
            Err(MediaError::NotConfigured)
        };

        if let Err(e) = result {
            warn!(public_id, "Failed to delete photo: {}", e);
        }
    }

    /// Load a stored photo for embedding in a report.
    ///
    /// Returns `None` (and logs) on any failure so the report can go on without it.
    pub async fn fetch(&self, url: &str, timeout: Duration) -> Option<(Vec<u8>, ImageFormat)> {
        let data = match self.local.read_url(url).await {
            Some(result) => result.map_err(MediaError::from),
            None => self.fetch_remote(url, timeout).await,
        };

        match data {
            Ok(data) => match ImageFormat::sniff(&data) {
                Some(format) => Some((data, format)),
                None => {
                    warn!(url, "Photo is not a JPEG or PNG image, skipping");
                    None
                }
            },
            Err(e) => {
                warn!(url, "Failed to fetch photo: {}", e);
                None
            }
        }
    }

    async fn fetch_remote(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, MediaError> {
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(MediaError::InvalidReference(url.to_string()));
        }
        debug!(url, "Fetching photo");

        let response = self.http.get(url).timeout(timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::Host {
                status,
                body: String::new(),
            });
        }
        let bytes = response.bytes().await?;
        if bytes.len() > self.max_upload_bytes * 4 {
            return Err(MediaError::TooLarge {
                size: bytes.len(),
                max: self.max_upload_bytes * 4,
            });
        }
        Ok(bytes.to_vec())
    }
}


#[cfg(test)]
mod tests {
    use super::testdata::{JPEG, PNG};
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct BrokenHost {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ImageHost for BrokenHost {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn upload(&self, _data: Bytes, _format: ImageFormat) -> Result<StoredImage, MediaError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(MediaError::NotConfigured)
        }

        async fn delete(&self, _public_id: &str) -> Result<(), MediaError> {
            Err(MediaError::NotConfigured)
        }
    }

    fn photo_store(dir: &std::path::Path, remote: Option<Arc<dyn ImageHost>>) -> PhotoStore {
        PhotoStore::new(remote, LocalImageHost::new(dir.to_path_buf()), 64, reqwest::Client::new())
    }

    #[test]
    fn test_content_type_mapping() {
        assert_eq!(ImageFormat::from_content_type("image/jpeg"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_content_type("IMAGE/PNG; q=1"), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::from_content_type("image/gif"), None);
        assert_eq!(ImageFormat::from_content_type("text/plain"), None);
    }

    #[test]
    fn test_check_upload_rules() {
        let dir = tempfile::tempdir().unwrap();
        let photos = photo_store(dir.path(), None);

        assert_eq!(photos.check_upload(Some("image/jpeg"), JPEG).unwrap(), ImageFormat::Jpeg);
        assert_eq!(photos.check_upload(Some("image/png"), PNG).unwrap(), ImageFormat::Png);

        assert!(matches!(
            photos.check_upload(Some("text/plain"), b"hello"),
            Err(MediaError::UnsupportedType(_))
        ));
        assert!(matches!(
            photos.check_upload(None, JPEG),
            Err(MediaError::UnsupportedType(_))
        ));
        // declared PNG, actually JPEG
        assert!(matches!(
            photos.check_upload(Some("image/png"), JPEG),
            Err(MediaError::ContentMismatch("PNG"))
        ));

        let mut big = JPEG.to_vec();
        big.resize(65, 0);
        assert!(matches!(
            photos.check_upload(Some("image/jpeg"), &big),
            Err(MediaError::TooLarge { size: 65, max: 64 })
        ));
    }

    #[tokio::test]
    async fn test_remote_failure_falls_back_to_local() {
        let dir = tempfile::tempdir().unwrap();
        let broken = Arc::new(BrokenHost {
            calls: AtomicUsize::new(0),
        });
        let photos = photo_store(dir.path(), Some(broken.clone()));

        let stored = photos.store(Bytes::from_static(JPEG), ImageFormat::Jpeg).await.unwrap();
        assert_eq!(broken.calls.load(Ordering::SeqCst), 1);
        assert!(stored.url.starts_with("/uploads/"));
        assert!(stored.public_id.starts_with("local:"));

        let (data, format) = photos.fetch(&stored.url, Duration::from_secs(1)).await.unwrap();
        assert_eq!(data, JPEG);
        assert_eq!(format, ImageFormat::Jpeg);

        photos.remove(&stored.public_id).await;
        assert!(photos.fetch(&stored.url, Duration::from_secs(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_rejects_unknown_references() {
        let dir = tempfile::tempdir().unwrap();
        let photos = photo_store(dir.path(), None);

        assert!(photos.fetch("ftp://example.com/a.jpg", Duration::from_secs(1)).await.is_none());
        assert!(photos.fetch("/uploads/../secret.jpg", Duration::from_secs(1)).await.is_none());
    }
}
