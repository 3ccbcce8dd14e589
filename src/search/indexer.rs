// src/search/indexer.rs

//! Keeps the search index in step with the catalog, one package id at a
//! time

use super::{BatchIndexer, IndexAction, IndexActionBuilder, SearchBackend};
use crate::catalog::PackageCatalog;
use crate::error::Result;
use crate::model::PackageRegistration;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct SearchIndexer {
    catalog: Arc<dyn PackageCatalog>,
    batch: BatchIndexer,
}

impl SearchIndexer {
    pub fn new(catalog: Arc<dyn PackageCatalog>, batch: BatchIndexer) -> Self {
        Self { catalog, batch }
    }

    pub fn backend(&self) -> &Arc<dyn SearchBackend> {
        self.batch.backend()
    }

    /// Sync after a version of `id` was added to the catalog
    ///
    /// The first version of an id uploads fresh documents; later versions
    /// rebuild every partition.
    pub async fn index_package(&self, id: &str, cancel: &CancellationToken) -> Result<()> {
        let registration = self.registration(id, cancel).await?;
        let actions = if registration.packages.len() == 1 {
            IndexActionBuilder::add_package(&registration)
        } else {
            IndexActionBuilder::update_package(&registration)
        };
        self.submit(id, actions, cancel).await
    }

    /// Rebuild every partition of `id`, deleting emptied ones
    pub async fn update_package(&self, id: &str, cancel: &CancellationToken) -> Result<()> {
        let registration = self.registration(id, cancel).await?;
        self.submit(id, IndexActionBuilder::update_package(&registration), cancel)
            .await
    }

    /// Push the current download counters of `id`
    pub async fn update_downloads(&self, id: &str, cancel: &CancellationToken) -> Result<()> {
        let registration = self.registration(id, cancel).await?;
        self.submit(id, IndexActionBuilder::update_downloads(&registration), cancel)
            .await
    }

    /// Rebuild the documents of many ids, packed into whole-package batches
    pub async fn reindex(&self, ids: &[String], cancel: &CancellationToken) -> Result<usize> {
        let mut groups = Vec::with_capacity(ids.len());
        for id in ids {
            let registration = self.registration(id, cancel).await?;
            groups.push(IndexActionBuilder::update_package(&registration));
        }

        let actions: usize = groups.iter().map(Vec::len).sum();
        info!("Reindexing {} packages ({} actions)", ids.len(), actions);
        self.batch.index_grouped(groups, cancel).await?;
        Ok(ids.len())
    }

    async fn registration(&self, id: &str, cancel: &CancellationToken) -> Result<PackageRegistration> {
        let packages = self.catalog.find(id, true, cancel).await?;
        Ok(PackageRegistration::new(id, packages))
    }

    async fn submit(&self, id: &str, actions: Vec<IndexAction>, cancel: &CancellationToken) -> Result<()> {
        debug!("Syncing {} search actions for {}", actions.len(), id);
        self.batch.index(&actions, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalog;
    use crate::db;
    use crate::metrics::RegistryMetrics;
    use crate::model::Package;
    use crate::search::{MemorySearchBackend, SearchFilters};
    use crate::version::PackageVersion;

    struct Fixture {
        catalog: Arc<SqliteCatalog>,
        backend: Arc<MemorySearchBackend>,
        indexer: SearchIndexer,
        token: CancellationToken,
    }

    fn fixture() -> Fixture {
        let conn = db::shared(db::open_in_memory().unwrap());
        let catalog = Arc::new(SqliteCatalog::new(conn));
        let backend = Arc::new(MemorySearchBackend::new());
        let batch = BatchIndexer::new(backend.clone(), 1000, Arc::new(RegistryMetrics::new()));
        let indexer = SearchIndexer::new(catalog.clone(), batch);
        Fixture {
            catalog,
            backend,
            indexer,
            token: CancellationToken::new(),
        }
    }

    fn v(s: &str) -> PackageVersion {
        PackageVersion::parse(s).unwrap()
    }

    fn key(filter: SearchFilters) -> String {
        IndexActionBuilder::document_key("MyLib", filter)
    }

    #[tokio::test]
    async fn test_index_first_and_later_versions() {
        let f = fixture();
        f.catalog.add(&Package::new("MyLib", v("1.0.0")), &f.token).await.unwrap();
        f.indexer.index_package("MyLib", &f.token).await.unwrap();
        assert_eq!(f.backend.len(), 4);

        f.catalog.add(&Package::new("MyLib", v("2.0.0-beta")), &f.token).await.unwrap();
        f.indexer.index_package("mylib", &f.token).await.unwrap();

        let default = f.backend.document(&key(SearchFilters::Default)).unwrap();
        assert_eq!(default.versions, ["1.0.0"]);
        let prerelease = f.backend.document(&key(SearchFilters::IncludePrerelease)).unwrap();
        assert_eq!(prerelease.versions, ["1.0.0", "2.0.0-beta"]);
        assert_eq!(prerelease.id, "MyLib");
    }

    #[tokio::test]
    async fn test_unlist_then_update_removes_documents() {
        let f = fixture();
        f.catalog.add(&Package::new("MyLib", v("1.0.0-beta")), &f.token).await.unwrap();
        f.indexer.index_package("MyLib", &f.token).await.unwrap();
        assert_eq!(f.backend.len(), 2);

        f.catalog.unlist("MyLib", &v("1.0.0-beta"), &f.token).await.unwrap();
        f.indexer.update_package("MyLib", &f.token).await.unwrap();
        assert!(f.backend.is_empty());
    }

    #[tokio::test]
    async fn test_update_downloads() {
        let f = fixture();
        f.catalog.add(&Package::new("MyLib", v("1.0.0")), &f.token).await.unwrap();
        f.indexer.index_package("MyLib", &f.token).await.unwrap();

        for _ in 0..12 {
            f.catalog.add_download("MyLib", &v("1.0.0"), &f.token).await.unwrap();
        }
        f.indexer.update_downloads("MyLib", &f.token).await.unwrap();

        let doc = f.backend.document(&key(SearchFilters::Default)).unwrap();
        assert_eq!(doc.total_downloads, 12);
        assert_eq!(doc.downloads_magnitude, 2);
        assert_eq!(doc.version_downloads, ["12"]);
    }

    #[tokio::test]
    async fn test_reindex() {
        let f = fixture();
        for id in ["Alpha", "Beta"] {
            f.catalog.add(&Package::new(id, v("1.0.0")), &f.token).await.unwrap();
        }

        let ids = vec!["Alpha".to_string(), "Beta".to_string()];
        let count = f.indexer.reindex(&ids, &f.token).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(f.backend.len(), 8);
    }
}
