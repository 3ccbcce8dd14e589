// src/search/document.rs

//! Search documents and the actions that keep them in sync
//!
//! Each package id owns up to four documents, one per [`SearchFilters`]
//! partition. A document aggregates the latest matching version's metadata
//! with every matching version and its download count.

use super::SearchFilters;
use crate::error::Result;
use crate::model::{Package, PackageRegistration};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

/// A complete search document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDocument {
    pub key: String,
    pub id: String,
    /// Full version string of the latest matching version
    pub version: String,
    pub description: String,
    pub authors: Vec<String>,
    pub has_embedded_icon: bool,
    pub icon_url: Option<String>,
    pub license_url: Option<String>,
    pub project_url: Option<String>,
    pub published: DateTime<Utc>,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub title: Option<String>,
    pub total_downloads: i64,
    /// Decimal digit count of `total_downloads`
    pub downloads_magnitude: u32,
    pub versions: Vec<String>,
    pub version_downloads: Vec<String>,
    pub dependencies: Vec<String>,
    pub package_types: Vec<String>,
    pub frameworks: Vec<String>,
    pub search_filters: String,
}

/// The download counters of a document, for partial updates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadsDocument {
    pub key: String,
    pub total_downloads: i64,
    pub downloads_magnitude: u32,
    pub versions: Vec<String>,
    pub version_downloads: Vec<String>,
}

/// One write against the search index
#[derive(Debug, Clone, PartialEq)]
pub enum IndexAction {
    /// Create a document that is known to be absent
    Upload(SearchDocument),
    /// Create or replace a document
    MergeOrUpload(SearchDocument),
    /// Update the download counters of an existing document
    Merge(DownloadsDocument),
    Delete { key: String },
}

impl IndexAction {
    pub fn key(&self) -> &str {
        match self {
            IndexAction::Upload(doc) | IndexAction::MergeOrUpload(doc) => &doc.key,
            IndexAction::Merge(doc) => &doc.key,
            IndexAction::Delete { key } => key,
        }
    }

    /// Action name as search services spell it
    pub fn name(&self) -> &'static str {
        match self {
            IndexAction::Upload(_) => "upload",
            IndexAction::MergeOrUpload(_) => "mergeOrUpload",
            IndexAction::Merge(_) => "merge",
            IndexAction::Delete { .. } => "delete",
        }
    }

    /// The document fields tagged with `@search.action`
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let mut value = match self {
            IndexAction::Upload(doc) | IndexAction::MergeOrUpload(doc) => serde_json::to_value(doc)?,
            IndexAction::Merge(doc) => serde_json::to_value(doc)?,
            IndexAction::Delete { key } => serde_json::json!({ "key": key }),
        };
        if let Some(fields) = value.as_object_mut() {
            fields.insert("@search.action".to_string(), self.name().into());
        }
        Ok(value)
    }
}

/// Turns a package registration into index actions
pub struct IndexActionBuilder;

impl IndexActionBuilder {
    /// Actions for a package id that has no documents yet
    ///
    /// Partitions without a matching version produce nothing.
    pub fn add_package(registration: &PackageRegistration) -> Vec<IndexAction> {
        Self::partitions(registration)
            .filter_map(|(filter, versions)| {
                (!versions.is_empty()).then(|| IndexAction::Upload(Self::full_document(registration, filter, &versions)))
            })
            .collect()
    }

    /// Actions that bring every partition of a package id up to date
    ///
    /// A partition left without matching versions has its document deleted.
    pub fn update_package(registration: &PackageRegistration) -> Vec<IndexAction> {
        Self::partitions(registration)
            .map(|(filter, versions)| {
                if versions.is_empty() {
                    IndexAction::Delete {
                        key: Self::document_key(&registration.package_id, filter),
                    }
                } else {
                    IndexAction::MergeOrUpload(Self::full_document(registration, filter, &versions))
                }
            })
            .collect()
    }

    /// Download counter updates for every non-empty partition
    pub fn update_downloads(registration: &PackageRegistration) -> Vec<IndexAction> {
        Self::partitions(registration)
            .filter(|(_, versions)| !versions.is_empty())
            .map(|(filter, versions)| {
                let (total_downloads, downloads_magnitude) = Self::totals(&versions);
                IndexAction::Merge(DownloadsDocument {
                    key: Self::document_key(&registration.package_id, filter),
                    total_downloads,
                    downloads_magnitude,
                    versions: versions.iter().map(|p| p.version.to_full_string()).collect(),
                    version_downloads: versions.iter().map(|p| p.downloads.to_string()).collect(),
                })
            })
            .collect()
    }

    /// `base64url(lowercase id)` joined with the partition name
    ///
    /// Keys may only hold letters, digits, `_`, `-` and `=`.
    pub fn document_key(package_id: &str, filter: SearchFilters) -> String {
        let encoded = URL_SAFE.encode(package_id.to_lowercase().as_bytes());
        format!("{}-{}", encoded, filter)
    }

    /// Each partition with its matching versions in ascending order
    fn partitions(registration: &PackageRegistration) -> impl Iterator<Item = (SearchFilters, Vec<&Package>)> {
        SearchFilters::iter().map(move |filter| {
            let mut versions: Vec<&Package> = registration.packages.iter().filter(|p| filter.matches(p)).collect();
            versions.sort_by(|a, b| a.version.cmp(&b.version));
            (filter, versions)
        })
    }

    fn totals(versions: &[&Package]) -> (i64, u32) {
        let total: i64 = versions.iter().map(|p| p.downloads).sum();
        (total, total.to_string().len() as u32)
    }

    /// `versions` is non-empty and sorted
    fn full_document(registration: &PackageRegistration, filter: SearchFilters, versions: &[&Package]) -> SearchDocument {
        let latest = versions[versions.len() - 1];
        let (total_downloads, downloads_magnitude) = Self::totals(versions);

        let mut dependencies: Vec<String> = Vec::new();
        for id in latest.dependencies.iter().filter_map(|d| d.id.as_deref()) {
            let id = id.to_lowercase();
            if !dependencies.contains(&id) {
                dependencies.push(id);
            }
        }

        SearchDocument {
            key: Self::document_key(&registration.package_id, filter),
            id: latest.id.clone(),
            version: latest.version.to_full_string(),
            description: latest.description.clone(),
            authors: latest.authors.clone(),
            has_embedded_icon: latest.has_embedded_icon,
            icon_url: latest.icon_url.clone(),
            license_url: latest.license_url.clone(),
            project_url: latest.project_url.clone(),
            published: latest.published,
            summary: latest.summary.clone(),
            tags: latest.tags.clone(),
            title: latest.title.clone(),
            total_downloads,
            downloads_magnitude,
            versions: versions.iter().map(|p| p.version.to_full_string()).collect(),
            version_downloads: versions.iter().map(|p| p.downloads.to_string()).collect(),
            dependencies,
            package_types: latest.package_types.iter().map(|t| t.name.clone()).collect(),
            frameworks: latest.target_frameworks.iter().map(|f| f.to_lowercase()).collect(),
            search_filters: filter.to_string(),
        }
    }
}
