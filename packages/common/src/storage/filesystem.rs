use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;

use super::error::MirrorError;
use super::key::validate_key;
use super::traits::ObjectMirror;

/// Filesystem-backed object mirror.
///
/// Objects live at `{base_path}/{key}`. Writes go to `{base_path}/.tmp` first
/// and are renamed into place, so readers never observe a half-written object.
pub struct FilesystemMirror {
    base_path: PathBuf,
    name: String,
}

impl FilesystemMirror {
    /// Create a new filesystem mirror rooted at `base_path`.
    pub async fn new(base_path: PathBuf) -> Result<Self, MirrorError> {
        fs::create_dir_all(&base_path).await?;
        fs::create_dir_all(base_path.join(".tmp")).await?;
        let name = base_path.display().to_string();
        Ok(Self { base_path, name })
    }

    /// Compute the filesystem path for a given key.
    fn object_path(&self, key: &str) -> Result<PathBuf, MirrorError> {
        let key = validate_key(key)?;
        if key.split('/').next() == Some(".tmp") {
            return Err(MirrorError::InvalidKey(format!("{key}: reserved prefix")));
        }
        Ok(self.base_path.join(key))
    }

    /// Path for a temporary file during writes.
    fn temp_path(&self) -> PathBuf {
        self.base_path
            .join(".tmp")
            .join(uuid::Uuid::new_v4().to_string())
    }

    async fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<(), MirrorError> {
        let temp_path = self.temp_path();
        if let Err(e) = fs::write(&temp_path, data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        if let Err(e) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(())
    }
}

#[async_trait]
impl ObjectMirror for FilesystemMirror {
    fn target(&self) -> &str {
        &self.name
    }

    async fn exists(&self, key: &str) -> Result<bool, MirrorError> {
        let path = self.object_path(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>, MirrorError> {
        let path = self.object_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(MirrorError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn store(
        &self,
        data: &[u8],
        key: &str,
        _content_type: Option<&str>,
    ) -> Result<(), MirrorError> {
        let path = self.object_path(key)?;

        // Identical content already under this key: nothing to do.
        if let Ok(existing) = fs::read(&path).await
            && Sha256::digest(&existing) == Sha256::digest(data)
        {
            return Ok(());
        }

        self.write_atomic(&path, data).await
    }

    async fn copy(&self, source: &str, dest: &str) -> Result<(), MirrorError> {
        let data = self.fetch(source).await?;
        let dest_path = self.object_path(dest)?;
        self.write_atomic(&dest_path, &data).await
    }
}
