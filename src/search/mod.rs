// src/search/mod.rs

//! Search index synchronization
//!
//! The catalog is authoritative; search documents are derived from it and
//! rebuilt per package id. Writes go through [`BatchIndexer`], which keeps
//! batches bounded and halves them when the backend reports them too large.

mod azure;
mod batch;
mod document;
mod filters;
mod indexer;
mod memory;

pub use azure::{AzureSearchBackend, DEFAULT_API_VERSION};
pub use batch::{BatchIndexer, DEFAULT_MAX_BATCH_ACTIONS};
pub use document::{DownloadsDocument, IndexAction, IndexActionBuilder, SearchDocument};
pub use filters::SearchFilters;
pub use indexer::SearchIndexer;
pub use memory::MemorySearchBackend;

use crate::error::{Error, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Per-document outcome reported by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentResult {
    pub key: String,
    pub succeeded: bool,
    pub error_message: Option<String>,
}

impl DocumentResult {
    pub fn success(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            succeeded: true,
            error_message: None,
        }
    }

    pub fn failure(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            succeeded: false,
            error_message: Some(message.into()),
        }
    }
}

/// A page of search results
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub filters: SearchFilters,
    pub skip: usize,
    pub take: usize,
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Apply a batch of actions
    ///
    /// A batch the backend refuses for its size is reported as
    /// `Error::SearchBatchTooLarge`; an accepted batch yields one result
    /// per action.
    async fn submit(&self, actions: &[IndexAction], cancel: &CancellationToken) -> Result<Vec<DocumentResult>>;

    /// Documents matching `request`, most downloaded first
    async fn search(&self, request: &SearchRequest, cancel: &CancellationToken) -> Result<Vec<SearchDocument>>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// How a submission ended, decided before any retry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Accepted,
    /// The batch should be split and resubmitted
    TooLarge,
    /// Accepted, but these document keys failed
    PartialFailure(Vec<String>),
    Fatal,
}

pub fn classify(result: &Result<Vec<DocumentResult>>) -> BatchOutcome {
    match result {
        Ok(results) => {
            let failed: Vec<String> = results
                .iter()
                .filter(|r| !r.succeeded)
                .map(|r| r.key.clone())
                .collect();
            if failed.is_empty() {
                BatchOutcome::Accepted
            } else {
                BatchOutcome::PartialFailure(failed)
            }
        }
        Err(Error::SearchBatchTooLarge(_)) => BatchOutcome::TooLarge,
        Err(_) => BatchOutcome::Fatal,
    }
}

/// Accepts every action and finds nothing
#[derive(Debug, Default)]
pub struct NullSearchBackend;

#[async_trait]
impl SearchBackend for NullSearchBackend {
    async fn submit(&self, actions: &[IndexAction], _cancel: &CancellationToken) -> Result<Vec<DocumentResult>> {
        Ok(actions.iter().map(|a| DocumentResult::success(a.key())).collect())
    }

    async fn search(&self, _request: &SearchRequest, _cancel: &CancellationToken) -> Result<Vec<SearchDocument>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "null"
    }
}
