// src/search/memory.rs

//! In-process search backend
//!
//! Keeps documents in a map keyed by document key, optionally persisted to
//! a JSON snapshot so separate processes see the same index. A byte limit
//! can be set to make oversized batches fail the way remote services do.

use super::{DocumentResult, IndexAction, SearchBackend, SearchDocument, SearchRequest};
use crate::cancel;
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Default)]
pub struct MemorySearchBackend {
    documents: RwLock<BTreeMap<String, SearchDocument>>,
    max_batch_bytes: Option<usize>,
    snapshot: Option<PathBuf>,
    /// Held from serializing a snapshot until it is on disk
    persist_lock: tokio::sync::Mutex<()>,
}

impl MemorySearchBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject batches whose JSON body exceeds `limit` bytes
    pub fn with_max_batch_bytes(mut self, limit: usize) -> Self {
        self.max_batch_bytes = Some(limit);
        self
    }

    /// Load documents from `path` if it exists, and write them back after
    /// every accepted batch
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let documents = match std::fs::read(&path) {
            Ok(data) => serde_json::from_slice(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            documents: RwLock::new(documents),
            max_batch_bytes: None,
            snapshot: Some(path),
            persist_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn document(&self, key: &str) -> Option<SearchDocument> {
        self.documents.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    fn apply(documents: &mut BTreeMap<String, SearchDocument>, action: &IndexAction) -> DocumentResult {
        match action {
            IndexAction::Upload(doc) | IndexAction::MergeOrUpload(doc) => {
                documents.insert(doc.key.clone(), doc.clone());
                DocumentResult::success(&doc.key)
            }
            IndexAction::Merge(update) => match documents.get_mut(&update.key) {
                Some(doc) => {
                    doc.total_downloads = update.total_downloads;
                    doc.downloads_magnitude = update.downloads_magnitude;
                    doc.versions = update.versions.clone();
                    doc.version_downloads = update.version_downloads.clone();
                    DocumentResult::success(&update.key)
                }
                None => DocumentResult::failure(&update.key, "Document not found"),
            },
            IndexAction::Delete { key } => {
                documents.remove(key);
                DocumentResult::success(key)
            }
        }
    }

    async fn persist(&self) -> Result<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };

        // Snapshots reach the file in the order they were taken
        let _guard = self.persist_lock.lock().await;
        let data = serde_json::to_vec(&*self.documents.read())?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, data).await?;
        Ok(())
    }

    fn matches_query(doc: &SearchDocument, query: &str) -> bool {
        if query.is_empty() {
            return true;
        }
        let contains = |field: &str| field.to_lowercase().contains(query);
        contains(&doc.id)
            || contains(&doc.description)
            || doc.title.as_deref().is_some_and(contains)
            || doc.summary.as_deref().is_some_and(contains)
            || doc.tags.iter().any(|t| contains(t))
    }
}

#[async_trait]
impl SearchBackend for MemorySearchBackend {
    async fn submit(&self, actions: &[IndexAction], cancel: &CancellationToken) -> Result<Vec<DocumentResult>> {
        cancel::check(cancel)?;

        if let Some(limit) = self.max_batch_bytes {
            let body = actions.iter().map(|a| a.to_json()).collect::<Result<Vec<_>>>()?;
            let size = serde_json::to_vec(&body)?.len();
            if size > limit {
                debug!("Rejecting batch of {} actions ({} bytes > {})", actions.len(), size, limit);
                return Err(Error::SearchBatchTooLarge(actions.len()));
            }
        }

        let results: Vec<DocumentResult> = {
            let mut documents = self.documents.write();
            actions.iter().map(|a| Self::apply(&mut documents, a)).collect()
        };

        self.persist().await?;
        Ok(results)
    }

    async fn search(&self, request: &SearchRequest, cancel: &CancellationToken) -> Result<Vec<SearchDocument>> {
        cancel::check(cancel)?;

        let query = request.query.trim().to_lowercase();
        let filters = request.filters.to_string();

        let mut hits: Vec<SearchDocument> = self
            .documents
            .read()
            .values()
            .filter(|doc| doc.search_filters == filters && Self::matches_query(doc, &query))
            .cloned()
            .collect();

        hits.sort_by(|a, b| b.total_downloads.cmp(&a.total_downloads).then_with(|| a.id.cmp(&b.id)));
        Ok(hits.into_iter().skip(request.skip).take(request.take).collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Package, PackageRegistration};
    use crate::search::{IndexActionBuilder, SearchFilters};
    use crate::version::PackageVersion;
    use tempfile::TempDir;

    fn registration(id: &str, versions: &[(&str, i64)]) -> PackageRegistration {
        let packages = versions
            .iter()
            .map(|(v, downloads)| {
                let mut package = Package::new(id, PackageVersion::parse(v).unwrap());
                package.downloads = *downloads;
                package.description = format!("{id} description");
                package
            })
            .collect();
        PackageRegistration::new(id, packages)
    }

    fn request(query: &str, filters: SearchFilters) -> SearchRequest {
        SearchRequest {
            query: query.to_string(),
            filters,
            skip: 0,
            take: 20,
        }
    }

    #[tokio::test]
    async fn test_document_state_machine() {
        let backend = MemorySearchBackend::new();
        let token = CancellationToken::new();
        let reg = registration("MyLib", &[("1.0.0", 1)]);
        let key = IndexActionBuilder::document_key("MyLib", SearchFilters::Default);

        // Merge on an absent document fails
        let results = backend
            .submit(&IndexActionBuilder::update_downloads(&reg), &token)
            .await
            .unwrap();
        assert!(results.iter().all(|r| !r.succeeded));
        assert!(backend.is_empty());

        backend.submit(&IndexActionBuilder::add_package(&reg), &token).await.unwrap();
        assert_eq!(backend.len(), 4);

        let bumped = registration("MyLib", &[("1.0.0", 1234)]);
        backend
            .submit(&IndexActionBuilder::update_downloads(&bumped), &token)
            .await
            .unwrap();
        let doc = backend.document(&key).unwrap();
        assert_eq!(doc.total_downloads, 1234);
        assert_eq!(doc.downloads_magnitude, 4);

        let mut unlisted = registration("MyLib", &[("1.0.0", 1234)]);
        unlisted.packages[0].listed = false;
        backend
            .submit(&IndexActionBuilder::update_package(&unlisted), &token)
            .await
            .unwrap();
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_byte_limit() {
        let backend = MemorySearchBackend::new().with_max_batch_bytes(64);
        let token = CancellationToken::new();
        let actions = IndexActionBuilder::add_package(&registration("MyLib", &[("1.0.0", 0)]));

        let result = backend.submit(&actions, &token).await;
        assert!(matches!(result, Err(Error::SearchBatchTooLarge(4))));

        let small = vec![IndexAction::Delete { key: "k".to_string() }];
        assert!(backend.submit(&small, &token).await.is_ok());
    }

    #[tokio::test]
    async fn test_search_ranks_by_downloads() {
        let backend = MemorySearchBackend::new();
        let token = CancellationToken::new();
        for reg in [
            registration("Alpha.Utils", &[("1.0.0", 5)]),
            registration("Beta.Utils", &[("1.0.0", 50), ("2.0.0-rc", 10)]),
            registration("Gamma", &[("1.0.0", 500)]),
        ] {
            backend.submit(&IndexActionBuilder::add_package(&reg), &token).await.unwrap();
        }

        let hits = backend.search(&request("utils", SearchFilters::Default), &token).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["Beta.Utils", "Alpha.Utils"]);

        let hits = backend
            .search(&request("beta", SearchFilters::IncludePrerelease), &token)
            .await
            .unwrap();
        assert_eq!(hits[0].version, "2.0.0-rc");
        assert_eq!(hits[0].total_downloads, 60);

        let mut paged = request("", SearchFilters::Default);
        paged.skip = 1;
        paged.take = 1;
        let hits = backend.search(&paged, &token).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "Beta.Utils");
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("search").join("index.json");
        let token = CancellationToken::new();

        let backend = MemorySearchBackend::open(&path).unwrap();
        backend
            .submit(&IndexActionBuilder::add_package(&registration("MyLib", &[("1.0.0", 0)])), &token)
            .await
            .unwrap();

        let reopened = MemorySearchBackend::open(&path).unwrap();
        assert_eq!(reopened.len(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submits_leave_latest_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.json");
        let backend = std::sync::Arc::new(MemorySearchBackend::open(&path).unwrap());

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let backend = backend.clone();
                tokio::spawn(async move {
                    let reg = registration(&format!("Package{i}"), &[("1.0.0", 0)]);
                    backend
                        .submit(&IndexActionBuilder::add_package(&reg), &CancellationToken::new())
                        .await
                        .unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(backend.len(), 64);
        let reopened = MemorySearchBackend::open(&path).unwrap();
        assert_eq!(reopened.len(), 64);
    }
}
