// src/search/batch.rs

//! Size-bounded, size-adaptive batch submission

use super::{BatchOutcome, IndexAction, SearchBackend, classify};
use crate::cancel;
use crate::error::{Error, Result};
use crate::metrics::RegistryMetrics;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Most actions a search service accepts in one request
pub const DEFAULT_MAX_BATCH_ACTIONS: usize = 1000;

pub struct BatchIndexer {
    backend: Arc<dyn SearchBackend>,
    max_batch_actions: usize,
    metrics: Arc<RegistryMetrics>,
}

impl BatchIndexer {
    pub fn new(backend: Arc<dyn SearchBackend>, max_batch_actions: usize, metrics: Arc<RegistryMetrics>) -> Self {
        Self {
            backend,
            max_batch_actions: max_batch_actions.max(1),
            metrics,
        }
    }

    pub fn backend(&self) -> &Arc<dyn SearchBackend> {
        &self.backend
    }

    /// Submit one batch of actions
    ///
    /// The batch must fit in `max_batch_actions`. Any document failure
    /// fails the whole call.
    pub async fn index(&self, actions: &[IndexAction], cancel: &CancellationToken) -> Result<()> {
        if actions.is_empty() {
            return Ok(());
        }
        if actions.len() > self.max_batch_actions {
            return Err(Error::SearchBackend(format!(
                "Cannot index more than {} actions at once, got {}",
                self.max_batch_actions,
                actions.len()
            )));
        }
        self.push(actions, cancel).await
    }

    /// Submit the actions of many packages
    ///
    /// Each group holds one package's actions and is never split across
    /// batches unless the backend forces a split.
    pub async fn index_grouped(&self, groups: Vec<Vec<IndexAction>>, cancel: &CancellationToken) -> Result<()> {
        let mut batch: Vec<IndexAction> = Vec::new();

        for group in groups {
            if group.len() > self.max_batch_actions {
                return Err(Error::SearchBackend(format!(
                    "A package produced {} actions, more than the batch limit of {}",
                    group.len(),
                    self.max_batch_actions
                )));
            }
            if batch.len() + group.len() > self.max_batch_actions {
                self.push(&batch, cancel).await?;
                batch.clear();
            }
            batch.extend(group);
        }

        if !batch.is_empty() {
            self.push(&batch, cancel).await?;
        }
        Ok(())
    }

    fn push<'a>(&'a self, batch: &'a [IndexAction], cancel: &'a CancellationToken) -> BoxFuture<'a, Result<()>> {
        async move {
            cancel::check(cancel)?;
            self.metrics.record_search_batch();

            let result = self.backend.submit(batch, cancel).await;
            match classify(&result) {
                BatchOutcome::Accepted => {
                    info!("Pushed batch of {} actions to {} search", batch.len(), self.backend.name());
                    Ok(())
                }
                BatchOutcome::TooLarge if batch.len() > 1 => {
                    let (half_a, half_b) = batch.split_at(batch.len() / 2);
                    warn!(
                        "The request body for a batch of {} was too large. Splitting into two batches of size {} and {}.",
                        batch.len(),
                        half_a.len(),
                        half_b.len()
                    );
                    self.metrics.record_search_batch_split();

                    self.push(half_a, cancel).await?;
                    self.push(half_b, cancel).await
                }
                BatchOutcome::PartialFailure(keys) => {
                    error!(
                        "Search backend failed {} of {} documents: {:?}",
                        keys.len(),
                        batch.len(),
                        keys
                    );
                    Err(Error::SearchPartialFailure {
                        failed: keys.len(),
                        total: batch.len(),
                        keys,
                    })
                }
                BatchOutcome::TooLarge | BatchOutcome::Fatal => {
                    let err = match result {
                        Err(err) => err,
                        Ok(_) => Error::SearchBackend("Unclassified search backend response".to_string()),
                    };
                    error!("Failed to push batch of {} actions: {}", batch.len(), err);
                    Err(err)
                }
            }
        }
        .boxed()
    }
}
