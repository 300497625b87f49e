use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use tracing::info;

use super::{ImageFormat, ImageHost, MediaError, StoredImage};

const URL_PREFIX: &str = "/uploads/";
const ID_PREFIX: &str = "local:";

/// Photos written to the uploads directory and served under `/uploads`
#[derive(Debug, Clone)]
pub struct LocalImageHost {
    dir: PathBuf,
}

impl LocalImageHost {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    pub fn owns(public_id: &str) -> bool {
        public_id.starts_with(ID_PREFIX)
    }

    /// Resolve a generated file name, refusing anything that could leave the directory
    fn path_for(&self, file_name: &str) -> Result<PathBuf, MediaError> {
        let valid = !file_name.is_empty()
            && file_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
            && !file_name.contains("..");
        if !valid {
            return Err(MediaError::InvalidReference(file_name.to_string()));
        }
        Ok(self.dir.join(file_name))
    }

    /// Read a photo by its `/uploads/...` url. `None` if the url is not local.
    pub(super) async fn read_url(&self, url: &str) -> Option<std::io::Result<Vec<u8>>> {
        let file_name = url.strip_prefix(URL_PREFIX)?;
        let path = match self.path_for(file_name) {
            Ok(path) => path,
            Err(e) => {
                return Some(Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    e.to_string(),
                )))
            }
        };
        Some(tokio::fs::read(path).await)
    }
}

#[async_trait]
impl ImageHost for LocalImageHost {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn upload(&self, data: Bytes, format: ImageFormat) -> Result<StoredImage, MediaError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let file_name = format!("{}.{}", uuid::Uuid::new_v4(), format.extension());
        let path = self.path_for(&file_name)?;
        tokio::fs::write(&path, &data).await?;

        info!(path = %path.display(), bytes = data.len(), "Stored photo locally");
        Ok(StoredImage {
            url: format!("{}{}", URL_PREFIX, file_name),
            public_id: format!("{}{}", ID_PREFIX, file_name),
        })
    }

    async fn delete(&self, public_id: &str) -> Result<(), MediaError> {
        let file_name = public_id
            .strip_prefix(ID_PREFIX)
            .ok_or_else(|| MediaError::InvalidReference(public_id.to_string()))?;
        let path = self.path_for(file_name)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
