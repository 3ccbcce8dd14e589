// src/storage/file.rs
//! Local filesystem storage
//!
//! Writes land in a uniquely named temp file next to the target and are
//! then hard-linked into place. Linking fails if the target exists, which
//! makes it the exclusive-create primitive: concurrent writers never see
//! each other's partial content and never replace a published file.

use super::{ContentReader, PutResult, StorageService, compare_existing, validate_path};
use crate::cancel;
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a storage path below the root, rejecting anything that escapes it
    fn full_path(&self, path: &str) -> Result<PathBuf> {
        validate_path(path)?;
        Ok(self.root.join(path))
    }

    async fn write_exclusive(&self, path: &str, target: &Path, content: &[u8]) -> Result<PutResult> {
        let parent = target
            .parent()
            .ok_or_else(|| Error::InvalidPath(path.to_string()))?;
        tokio::fs::create_dir_all(parent).await?;

        let temp = parent.join(format!(".{}.tmp", Uuid::new_v4()));
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp)
            .await?;
        file.write_all(content).await?;
        file.sync_all().await?;
        drop(file);

        let linked = tokio::fs::hard_link(&temp, target).await;
        if let Err(e) = tokio::fs::remove_file(&temp).await {
            warn!("Failed to remove temp file {}: {}", temp.display(), e);
        }

        match linked {
            Ok(()) => Ok(PutResult::Success),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let existing = tokio::fs::read(target).await?;
                Ok(compare_existing(&existing, content))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl StorageService for FileStorage {
    async fn get(&self, path: &str, cancel: &CancellationToken) -> Result<ContentReader> {
        let full = self.full_path(path)?;
        cancel::run(cancel, async {
            match tokio::fs::File::open(&full).await {
                Ok(file) => Ok(Box::pin(file) as ContentReader),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    let parent_exists = match full.parent() {
                        Some(parent) => tokio::fs::try_exists(parent).await.unwrap_or(false),
                        None => false,
                    };
                    if parent_exists {
                        Err(Error::NotFound(path.to_string()))
                    } else {
                        Err(Error::DirectoryNotFound(path.to_string()))
                    }
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn put(
        &self,
        path: &str,
        content: Bytes,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<PutResult> {
        let full = self.full_path(path)?;
        let result = cancel::run(cancel, self.write_exclusive(path, &full, &content)).await?;
        debug!("Stored {} ({}, {} bytes): {:?}", path, content_type, content.len(), result);
        Ok(result)
    }

    async fn delete(&self, path: &str, cancel: &CancellationToken) -> Result<()> {
        let full = self.full_path(path)?;
        cancel::run(cancel, async {
            match tokio::fs::remove_file(&full).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn download_uri(&self, path: &str, _cancel: &CancellationToken) -> Result<Url> {
        let full = std::path::absolute(self.full_path(path)?)?;
        Url::from_file_path(&full).map_err(|_| Error::InvalidPath(path.to_string()))
    }

    fn name(&self) -> &str {
        "file"
    }
}
