//! Bounded fan-out of blocking work onto tokio's blocking pool.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::SyncError;

/// Default cap on concurrent requests per phase.
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Run `work` for every item with at most `limit` calls in flight, wait for
/// all of them, and return the outputs in input order.
///
/// A task that panics surfaces as [`SyncError::Join`] once every sibling has
/// finished.
pub async fn fan_out<I, O, F>(items: Vec<I>, limit: usize, work: F) -> Result<Vec<O>, SyncError>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> O + Send + Sync + 'static,
{
    let total = items.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let permits = Arc::new(Semaphore::new(limit.max(1)));
    let work = Arc::new(work);
    let mut tasks = JoinSet::new();

    for (index, item) in items.into_iter().enumerate() {
        let permit = Arc::clone(&permits)
            .acquire_owned()
            .await
            .map_err(|err| SyncError::Join(format!("fan-out semaphore closed: {err}")))?;
        let work = Arc::clone(&work);
        tasks.spawn_blocking(move || {
            let _permit = permit;
            (index, work(item))
        });
    }

    let mut slots: Vec<Option<O>> = (0..total).map(|_| None).collect();
    let mut failure = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, output)) => slots[index] = Some(output),
            Err(err) => {
                failure.get_or_insert_with(|| SyncError::Join(err.to_string()));
            }
        }
    }
    if let Some(err) = failure {
        return Err(err);
    }

    Ok(slots.into_iter().flatten().collect())
}
