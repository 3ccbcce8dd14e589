// src/lib.rs

//! NuVault package registry
//!
//! The core of a NuGet-compatible package registry.
//!
//! # Architecture
//!
//! - Content storage: immutable blobs at paths derived from package identity;
//!   a second write succeeds only with identical bytes
//! - Catalog: SQLite index of package metadata and listing state
//! - Mirror: read-through cache that indexes upstream packages on demand
//! - Search: four filter-partitioned documents per package id, synced in
//!   size-adaptive batches

pub mod cancel;
pub mod catalog;
pub mod config;
pub mod db;
pub mod deletion;
mod error;
pub mod indexing;
pub mod metrics;
pub mod mirror;
pub mod model;
pub mod nupkg;
pub mod registry;
pub mod search;
pub mod storage;
pub mod upstream;
pub mod version;

pub use catalog::{AddResult, PackageCatalog, SqliteCatalog};
pub use config::RegistryConfig;
pub use deletion::{PackageDeletionBehavior, PackageDeletionService};
pub use error::{Error, Result};
pub use indexing::{IndexingResult, PackageIndexer, PackageIndexingService};
pub use metrics::{MetricsSnapshot, RegistryMetrics};
pub use mirror::PackageService;
pub use model::{Package, PackageIdentity, PackageRegistration, SemVerLevel};
pub use registry::Registry;
pub use search::{SearchFilters, SearchIndexer};
pub use storage::{BlobKind, PackageStorage, PutResult, StorageService};
pub use version::PackageVersion;
