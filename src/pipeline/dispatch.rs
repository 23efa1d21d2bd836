//! Bounded-concurrency dispatch of per-page work.
//!
//! [`dispatch`] runs one async unit per item with at most `limit` in flight
//! and returns the results in input order. It is fail-fast: the first error
//! drops the stream, which cancels every unit still running, and is returned
//! as the batch result. [`guarded`] wraps a single unit with a deadline and a
//! cancellation token.

use crate::config::MAX_CONCURRENCY;
use crate::error::DatasheetError;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Run `work` over `items` with at most `limit` units in flight.
///
/// Output position `i` holds the result for input `i`, whatever order the
/// units finished in. An empty input returns an empty output without calling
/// `work`. A cancelled `cancel` token stops the batch with
/// [`DatasheetError::Cancelled`].
///
/// # Errors
/// [`DatasheetError::InvalidConfig`] if `limit` is outside `1..=5`, otherwise
/// the first error any unit returns.
pub async fn dispatch<T, R, F, Fut>(
    items: Vec<T>,
    limit: usize,
    cancel: &CancellationToken,
    work: F,
) -> Result<Vec<R>, DatasheetError>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, DatasheetError>>,
{
    if limit == 0 || limit > MAX_CONCURRENCY {
        return Err(DatasheetError::InvalidConfig(format!(
            "concurrency must be 1–{MAX_CONCURRENCY}, got {limit}"
        )));
    }
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let total = items.len();
    debug!("Dispatching {} units, {} at a time", total, limit);

    let work = &work;
    let batch = stream::iter(items.into_iter().enumerate().map(|(idx, item)| async move {
        work(item).await.map(|r| (idx, r))
    }))
    .buffer_unordered(limit)
    .try_collect::<Vec<(usize, R)>>();

    let mut indexed = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(DatasheetError::Cancelled {
                context: format!("batch of {total} units"),
            });
        }
        result = batch => result?,
    };

    indexed.sort_by_key(|(idx, _)| *idx);
    Ok(indexed.into_iter().map(|(_, r)| r).collect())
}

/// Await `fut` unless `timeout` elapses or `cancel` fires first.
///
/// `context` names the call in the resulting error, e.g. `"page 3 vision call"`.
pub async fn guarded<T, Fut>(
    fut: Fut,
    timeout: Duration,
    cancel: &CancellationToken,
    context: &str,
) -> Result<T, DatasheetError>
where
    Fut: Future<Output = Result<T, DatasheetError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DatasheetError::Cancelled {
            context: context.to_string(),
        }),
        result = tokio::time::timeout(timeout, fut) => match result {
            Ok(inner) => inner,
            Err(_) => Err(DatasheetError::Timeout {
                context: context.to_string(),
                secs: timeout.as_secs(),
            }),
        },
    }
}
