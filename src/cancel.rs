// src/cancel.rs

//! Cancellation helpers
//!
//! Every I/O boundary takes a caller-owned `CancellationToken`. The core
//! never creates tokens of its own.

use crate::error::{Error, Result};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Run `fut` unless `token` fires first
pub async fn run<F, T>(token: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}

/// Fail fast if the token has already fired
pub fn check(token: &CancellationToken) -> Result<()> {
    if token.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}
