use std::fs;
use std::path::PathBuf;

use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Local-disk stand-in for the blob store. Objects are content-addressed
/// by sha256 so re-uploading the same image reuses the same key, and the
/// returned locator is an opaque `/static/...` URL served by the HTTP
/// layer.
#[derive(Clone)]
pub struct LocalStorage {
    upload_dir: PathBuf,
}

impl LocalStorage {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let upload_dir = upload_dir.into();
        fs::create_dir_all(&upload_dir)?;
        Ok(Self { upload_dir })
    }

    pub fn store(&self, data: &[u8], file_name: Option<&str>) -> Result<String, StorageError> {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let hash = hex::encode(hasher.finalize());

        let extension = file_name
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or_else(|| "jpg".to_string());

        let object_key = format!("{hash}.{extension}");
        fs::write(self.upload_dir.join(&object_key), data)?;
        Ok(format!("/static/{object_key}"))
    }
}
