// src/deletion.rs

//! Package deletion and relisting

use crate::catalog::PackageCatalog;
use crate::error::Result;
use crate::search::SearchIndexer;
use crate::storage::PackageStorage;
use crate::version::PackageVersion;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum_macros::{Display, EnumString};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// What deleting a package does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PackageDeletionBehavior {
    /// Hide the version from listings and search; content stays
    #[default]
    Unlist,
    /// Remove the catalog row and every stored blob
    HardDelete,
}

pub struct PackageDeletionService {
    catalog: Arc<dyn PackageCatalog>,
    storage: PackageStorage,
    search: Arc<SearchIndexer>,
    behavior: PackageDeletionBehavior,
}

impl PackageDeletionService {
    pub fn new(
        catalog: Arc<dyn PackageCatalog>,
        storage: PackageStorage,
        search: Arc<SearchIndexer>,
        behavior: PackageDeletionBehavior,
    ) -> Self {
        Self {
            catalog,
            storage,
            search,
            behavior,
        }
    }

    pub fn behavior(&self) -> PackageDeletionBehavior {
        self.behavior
    }

    /// Delete a version according to the configured behavior
    ///
    /// Returns false when the catalog does not know the version.
    pub async fn try_delete(&self, id: &str, version: &PackageVersion, cancel: &CancellationToken) -> Result<bool> {
        let found = match self.behavior {
            PackageDeletionBehavior::Unlist => self.try_unlist(id, version, cancel).await?,
            PackageDeletionBehavior::HardDelete => self.try_hard_delete(id, version, cancel).await?,
        };

        if found {
            self.search.update_package(id, cancel).await?;
        }
        Ok(found)
    }

    /// Make an unlisted version visible again
    pub async fn relist(&self, id: &str, version: &PackageVersion, cancel: &CancellationToken) -> Result<bool> {
        info!("Relisting package {} {}...", id, version);
        if !self.catalog.relist(id, version, cancel).await? {
            warn!("Could not find package {} {}", id, version);
            return Ok(false);
        }

        self.search.update_package(id, cancel).await?;
        info!("Relisted package {} {}", id, version);
        Ok(true)
    }

    async fn try_unlist(&self, id: &str, version: &PackageVersion, cancel: &CancellationToken) -> Result<bool> {
        info!("Unlisting package {} {}...", id, version);
        if !self.catalog.unlist(id, version, cancel).await? {
            warn!("Could not find package {} {}", id, version);
            return Ok(false);
        }

        info!("Unlisted package {} {}", id, version);
        Ok(true)
    }

    async fn try_hard_delete(&self, id: &str, version: &PackageVersion, cancel: &CancellationToken) -> Result<bool> {
        info!("Hard deleting package {} {} from the catalog...", id, version);
        let found = self.catalog.hard_delete(id, version, cancel).await?;
        if !found {
            warn!("Could not find package {} {} in the catalog", id, version);
        }

        // Storage is cleared even without a catalog row so the two agree
        info!("Hard deleting package {} {} from storage...", id, version);
        self.storage.delete(id, version, cancel).await?;
        info!("Hard deleted package {} {} from storage", id, version);

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalog;
    use crate::db;
    use crate::error::Error;
    use crate::metrics::RegistryMetrics;
    use crate::model::Package;
    use crate::search::{BatchIndexer, IndexActionBuilder, MemorySearchBackend, SearchFilters};
    use crate::storage::{FileStorage, StorageService};
    use bytes::Bytes;
    use std::str::FromStr;
    use tempfile::TempDir;

    struct Fixture {
        _temp_dir: TempDir,
        catalog: Arc<SqliteCatalog>,
        files: Arc<FileStorage>,
        backend: Arc<MemorySearchBackend>,
        search: Arc<SearchIndexer>,
        storage: PackageStorage,
        token: CancellationToken,
    }

    fn v(s: &str) -> PackageVersion {
        PackageVersion::parse(s).unwrap()
    }

    async fn fixture() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let catalog = Arc::new(SqliteCatalog::new(db::shared(db::open_in_memory().unwrap())));
        let files = Arc::new(FileStorage::new(temp_dir.path()));
        let backend = Arc::new(MemorySearchBackend::new());
        let batch = BatchIndexer::new(backend.clone(), 1000, Arc::new(RegistryMetrics::new()));
        let search = Arc::new(SearchIndexer::new(catalog.clone(), batch));
        let storage = PackageStorage::new(files.clone());
        let token = CancellationToken::new();

        let package = Package::new("MyLib", v("1.0.0"));
        storage
            .save(
                &package,
                Bytes::from_static(b"archive"),
                Bytes::from_static(b"manifest"),
                None,
                None,
                &token,
            )
            .await
            .unwrap();
        catalog.add(&package, &token).await.unwrap();
        search.index_package("MyLib", &token).await.unwrap();

        Fixture {
            _temp_dir: temp_dir,
            catalog,
            files,
            backend,
            search,
            storage,
            token,
        }
    }

    fn service(f: &Fixture, behavior: PackageDeletionBehavior) -> PackageDeletionService {
        PackageDeletionService::new(f.catalog.clone(), f.storage.clone(), f.search.clone(), behavior)
    }

    #[test]
    fn test_behavior_names() {
        assert_eq!(PackageDeletionBehavior::from_str("hard_delete").unwrap(), PackageDeletionBehavior::HardDelete);
        assert_eq!(PackageDeletionBehavior::Unlist.to_string(), "unlist");
    }

    #[tokio::test]
    async fn test_unlist_keeps_content() {
        let f = fixture().await;
        let service = service(&f, PackageDeletionBehavior::Unlist);

        assert!(service.try_delete("MyLib", &v("1.0.0"), &f.token).await.unwrap());

        let package = f.catalog.find_one("MyLib", &v("1.0.0"), true, &f.token).await.unwrap().unwrap();
        assert!(!package.listed);
        assert!(f.files.get("packages/mylib/1.0.0/mylib.1.0.0.nupkg", &f.token).await.is_ok());
        assert!(f.backend.is_empty());

        assert!(service.relist("MyLib", &v("1.0.0"), &f.token).await.unwrap());
        assert!(f
            .backend
            .document(&IndexActionBuilder::document_key("MyLib", SearchFilters::Default))
            .is_some());
    }

    #[tokio::test]
    async fn test_hard_delete_removes_content() {
        let f = fixture().await;
        let service = service(&f, PackageDeletionBehavior::HardDelete);

        assert!(service.try_delete("MyLib", &v("1.0.0"), &f.token).await.unwrap());
        assert!(!f.catalog.exists("MyLib", &v("1.0.0"), &f.token).await.unwrap());
        assert!(matches!(
            f.files.get("packages/mylib/1.0.0/mylib.1.0.0.nupkg", &f.token).await,
            Err(Error::NotFound(_))
        ));
        assert!(f.backend.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_version() {
        let f = fixture().await;
        for behavior in [PackageDeletionBehavior::Unlist, PackageDeletionBehavior::HardDelete] {
            let service = service(&f, behavior);
            assert!(!service.try_delete("MyLib", &v("9.9.9"), &f.token).await.unwrap());
        }
        assert!(!service(&f, PackageDeletionBehavior::Unlist)
            .relist("Nope", &v("1.0.0"), &f.token)
            .await
            .unwrap());
        assert_eq!(f.backend.len(), 4);
    }
}
