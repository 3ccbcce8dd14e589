// src/registry.rs
//! Registry composition
//!
//! Resolves a validated [`RegistryConfig`] into concrete backends once, at
//! startup. Backend choice goes through enum-keyed factory tables; nothing
//! reads the configuration after `open` returns.

use crate::catalog::{PackageCatalog, SqliteCatalog};
use crate::config::{RegistryConfig, SearchType, StorageType};
use crate::db::{self, SharedConnection};
use crate::deletion::PackageDeletionService;
use crate::indexing::PackageIndexingService;
use crate::metrics::RegistryMetrics;
use crate::mirror::PackageService;
use crate::search::{
    AzureSearchBackend, BatchIndexer, MemorySearchBackend, NullSearchBackend, SearchBackend, SearchIndexer,
};
use crate::storage::{DatabaseStorage, FileStorage, NullStorage, ObjectStorage, PackageStorage, StorageService};
use crate::upstream::{DisabledUpstream, UpstreamClient, V3UpstreamClient};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use url::Url;

type StorageFactory = fn(&RegistryConfig, &SharedConnection) -> Result<Arc<dyn StorageService>>;
type SearchFactory = fn(&RegistryConfig) -> Result<Arc<dyn SearchBackend>>;

const STORAGE_BACKENDS: &[(StorageType, StorageFactory)] = &[
    (StorageType::FileSystem, file_storage),
    (StorageType::Database, database_storage),
    (StorageType::ObjectStore, object_storage),
    (StorageType::Null, null_storage),
];

const SEARCH_BACKENDS: &[(SearchType, SearchFactory)] = &[
    (SearchType::Memory, memory_search),
    (SearchType::Azure, azure_search),
    (SearchType::Null, null_search),
];

fn file_storage(config: &RegistryConfig, _conn: &SharedConnection) -> Result<Arc<dyn StorageService>> {
    Ok(Arc::new(FileStorage::new(&config.storage.path)))
}

fn database_storage(_config: &RegistryConfig, conn: &SharedConnection) -> Result<Arc<dyn StorageService>> {
    Ok(Arc::new(DatabaseStorage::new(conn.clone())))
}

fn object_storage(config: &RegistryConfig, _conn: &SharedConnection) -> Result<Arc<dyn StorageService>> {
    let url = config
        .storage
        .url
        .as_deref()
        .context("storage.url is required for object_store storage")?;
    let url = Url::parse(url).with_context(|| format!("Invalid storage.url: {}", url))?;
    let mut storage = ObjectStorage::from_url(&url)?;

    if let Some(public_url) = &config.storage.public_url {
        let public_url =
            Url::parse(public_url).with_context(|| format!("Invalid storage.public_url: {}", public_url))?;
        storage = storage.with_public_url(public_url);
    }
    Ok(Arc::new(storage))
}

fn null_storage(_config: &RegistryConfig, _conn: &SharedConnection) -> Result<Arc<dyn StorageService>> {
    Ok(Arc::new(NullStorage))
}

fn memory_search(config: &RegistryConfig) -> Result<Arc<dyn SearchBackend>> {
    let mut backend = match &config.search.path {
        Some(path) => MemorySearchBackend::open(path)
            .with_context(|| format!("Failed to load search index: {}", path.display()))?,
        None => MemorySearchBackend::new(),
    };
    if let Some(limit) = config.max_batch_bytes()? {
        backend = backend.with_max_batch_bytes(limit as usize);
    }
    Ok(Arc::new(backend))
}

fn azure_search(config: &RegistryConfig) -> Result<Arc<dyn SearchBackend>> {
    let endpoint = config
        .search
        .endpoint
        .as_deref()
        .context("search.endpoint is required for azure search")?;
    let endpoint = Url::parse(endpoint).with_context(|| format!("Invalid search.endpoint: {}", endpoint))?;
    let api_key = config
        .search
        .api_key
        .as_deref()
        .context("search.api_key is required for azure search")?;

    Ok(Arc::new(AzureSearchBackend::new(
        &endpoint,
        &config.search.index,
        api_key,
        &config.search.api_version,
        config.search_timeout()?,
    )?))
}

fn null_search(_config: &RegistryConfig) -> Result<Arc<dyn SearchBackend>> {
    Ok(Arc::new(NullSearchBackend))
}

fn upstream(config: &RegistryConfig) -> Result<Arc<dyn UpstreamClient>> {
    if !config.mirror.enabled {
        return Ok(Arc::new(DisabledUpstream));
    }

    let source = config
        .mirror
        .package_source
        .as_deref()
        .context("mirror.package_source is required when mirroring is enabled")?;
    let source = Url::parse(source).with_context(|| format!("Invalid mirror.package_source: {}", source))?;
    Ok(Arc::new(V3UpstreamClient::new(source, config.mirror_timeout()?)?))
}

/// Every service of a running registry
pub struct Registry {
    pub catalog: Arc<dyn PackageCatalog>,
    pub storage: PackageStorage,
    pub search: Arc<SearchIndexer>,
    pub indexer: Arc<PackageIndexingService>,
    pub packages: PackageService,
    pub deletion: PackageDeletionService,
    pub metrics: Arc<RegistryMetrics>,
}

impl Registry {
    pub fn open(config: &RegistryConfig) -> Result<Self> {
        config.validate()?;

        let conn = db::open(&config.database.path)
            .with_context(|| format!("Failed to open database: {}", config.database.path.display()))?;
        let conn = db::shared(conn);
        let catalog: Arc<dyn PackageCatalog> = Arc::new(SqliteCatalog::new(conn.clone()));

        let storage_factory = STORAGE_BACKENDS
            .iter()
            .find(|(kind, _)| *kind == config.storage.storage_type)
            .map(|(_, factory)| *factory)
            .context("No storage backend registered for the configured type")?;
        let storage = PackageStorage::new(storage_factory(config, &conn)?);

        let search_factory = SEARCH_BACKENDS
            .iter()
            .find(|(kind, _)| *kind == config.search.search_type)
            .map(|(_, factory)| *factory)
            .context("No search backend registered for the configured type")?;
        let backend = search_factory(config)?;

        let upstream = upstream(config)?;
        let metrics = Arc::new(RegistryMetrics::new());

        info!(
            "Opened registry: {} storage, {} search, {} upstream",
            storage.storage().name(),
            backend.name(),
            upstream.name()
        );

        let batch = BatchIndexer::new(backend, config.search.max_batch_actions, metrics.clone());
        let search = Arc::new(SearchIndexer::new(catalog.clone(), batch));
        let indexer = Arc::new(PackageIndexingService::new(
            catalog.clone(),
            storage.clone(),
            search.clone(),
        ));
        let packages = PackageService::new(
            catalog.clone(),
            upstream,
            indexer.clone(),
            search.clone(),
            metrics.clone(),
        )
        .with_exclusions(config.exclude_patterns()?);
        let deletion = PackageDeletionService::new(
            catalog.clone(),
            storage.clone(),
            search.clone(),
            config.registry.package_deletion_behavior,
        );

        Ok(Self {
            catalog,
            storage,
            search,
            indexer,
            packages,
            deletion,
            metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(temp_dir: &TempDir) -> RegistryConfig {
        let mut config = RegistryConfig::default();
        config.database.path = temp_dir.path().join("nuvault.db");
        config.storage.path = temp_dir.path().to_path_buf();
        config.search.path = Some(temp_dir.path().join("search.json"));
        config
    }

    #[test]
    fn test_every_backend_type_is_registered() {
        for kind in [
            StorageType::FileSystem,
            StorageType::Database,
            StorageType::ObjectStore,
            StorageType::Null,
        ] {
            assert!(STORAGE_BACKENDS.iter().any(|(k, _)| *k == kind));
        }
        for kind in [SearchType::Memory, SearchType::Azure, SearchType::Null] {
            assert!(SEARCH_BACKENDS.iter().any(|(k, _)| *k == kind));
        }
    }

    #[test]
    fn test_open_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let registry = Registry::open(&config(&temp_dir)).unwrap();
        assert_eq!(registry.storage.storage().name(), "file");
        assert_eq!(registry.search.backend().name(), "memory");
        assert!(temp_dir.path().join("nuvault.db").exists());
    }

    #[test]
    fn test_open_database_storage_and_null_search() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = config(&temp_dir);
        config.storage.storage_type = StorageType::Database;
        config.search.search_type = SearchType::Null;

        let registry = Registry::open(&config).unwrap();
        assert_eq!(registry.storage.storage().name(), "database");
        assert_eq!(registry.search.backend().name(), "null");
    }

    #[test]
    fn test_open_memory_object_store() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = config(&temp_dir);
        config.storage.storage_type = StorageType::ObjectStore;
        config.storage.url = Some("memory:///".to_string());

        let registry = Registry::open(&config).unwrap();
        assert_eq!(registry.storage.storage().name(), "object-store");
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = config(&temp_dir);
        config.mirror.enabled = true;
        assert!(Registry::open(&config).is_err());
    }
}
