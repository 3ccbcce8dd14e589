// src/storage/database.rs
//! SQLite blob storage
//!
//! Content lives in the `package_contents` table. `INSERT OR IGNORE` on the
//! primary key is the exclusive create; an ignored insert falls through to
//! comparing the stored bytes.

use super::{ContentReader, PutResult, StorageService, compare_existing, validate_path};
use crate::cancel;
use crate::db::SharedConnection;
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{OptionalExtension, params};
use std::io::Cursor;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

pub struct DatabaseStorage {
    conn: SharedConnection,
}

impl DatabaseStorage {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn load(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock();
        let data = conn
            .query_row(
                "SELECT data FROM package_contents WHERE path = ?1",
                [path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(data)
    }
}

#[async_trait]
impl StorageService for DatabaseStorage {
    async fn get(&self, path: &str, cancel: &CancellationToken) -> Result<ContentReader> {
        validate_path(path)?;
        cancel::check(cancel)?;

        match self.load(path)? {
            Some(data) => Ok(Box::pin(Cursor::new(data)) as ContentReader),
            None => Err(Error::NotFound(path.to_string())),
        }
    }

    async fn put(
        &self,
        path: &str,
        content: Bytes,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<PutResult> {
        validate_path(path)?;
        cancel::check(cancel)?;

        let inserted = {
            let conn = self.conn.lock();
            conn.execute(
                "INSERT OR IGNORE INTO package_contents (path, content_type, data) VALUES (?1, ?2, ?3)",
                params![path, content_type, content.as_ref()],
            )?
        };

        let result = if inserted == 1 {
            PutResult::Success
        } else {
            // A concurrent delete may remove the row before it is read back
            let existing = self.load(path)?.unwrap_or_default();
            compare_existing(&existing, &content)
        };

        debug!("Stored {} in database ({} bytes): {:?}", path, content.len(), result);
        Ok(result)
    }

    async fn delete(&self, path: &str, cancel: &CancellationToken) -> Result<()> {
        validate_path(path)?;
        cancel::check(cancel)?;

        let conn = self.conn.lock();
        conn.execute("DELETE FROM package_contents WHERE path = ?1", [path])?;
        Ok(())
    }

    async fn download_uri(&self, path: &str, _cancel: &CancellationToken) -> Result<Url> {
        Err(Error::Unsupported(format!(
            "database storage has no download locator for {}",
            path
        )))
    }

    fn name(&self) -> &str {
        "database"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::storage::read_to_bytes;

    fn storage() -> DatabaseStorage {
        DatabaseStorage::new(db::shared(db::open_in_memory().unwrap()))
    }

    #[tokio::test]
    async fn test_put_get_roundtrip_and_idempotence() {
        let storage = storage();
        let token = CancellationToken::new();
        let path = "packages/a/1.0.0/a.nuspec";

        let first = storage
            .put(path, Bytes::from_static(b"<package/>"), "text/plain", &token)
            .await
            .unwrap();
        let second = storage
            .put(path, Bytes::from_static(b"<package/>"), "text/plain", &token)
            .await
            .unwrap();
        assert_eq!(first, PutResult::Success);
        assert_eq!(second, PutResult::AlreadyExists);

        let stored = read_to_bytes(storage.get(path, &token).await.unwrap()).await.unwrap();
        assert_eq!(stored, Bytes::from_static(b"<package/>"));
    }

    #[tokio::test]
    async fn test_conflict_keeps_original() {
        let storage = storage();
        let token = CancellationToken::new();
        let path = "packages/a/1.0.0/readme";

        storage.put(path, Bytes::from_static(b"X"), "text/markdown", &token).await.unwrap();
        let result = storage
            .put(path, Bytes::from_static(b"Y"), "text/markdown", &token)
            .await
            .unwrap();
        assert_eq!(result, PutResult::Conflict);

        let stored = read_to_bytes(storage.get(path, &token).await.unwrap()).await.unwrap();
        assert_eq!(stored, Bytes::from_static(b"X"));
    }

    #[tokio::test]
    async fn test_missing_and_delete() {
        let storage = storage();
        let token = CancellationToken::new();

        assert!(matches!(
            storage.get("packages/none", &token).await,
            Err(Error::NotFound(_))
        ));
        storage.delete("packages/none", &token).await.unwrap();

        assert!(matches!(
            storage.download_uri("packages/none", &token).await,
            Err(Error::Unsupported(_))
        ));
    }
}
