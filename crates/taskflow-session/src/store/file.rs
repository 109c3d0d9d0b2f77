//! File-backed key-value store.
//!
//! One file per key inside a data directory. Writes land in a temporary
//! sibling, are synced to disk and renamed over the target, so a reader sees
//! either the old value or the new one.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::KeyValueStore;
use crate::error::StoreError;

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(StoreError::Io(format!("invalid store key: {:?}", key)));
        }
        Ok(self.dir.join(key))
    }

    async fn write_atomic(&self, target: &Path, value: &str) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let file_name = target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("value");
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));

        let result = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            restrict_permissions(&tmp).await?;
            file.write_all(value.as_bytes()).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp, target).await
        }
        .await;

        if let Err(e) = result {
            // Leave no temp file behind on any failure path
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        self.write_atomic(&path, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
