use std::{future::Future, sync::Arc};

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::error::{RsError, RsResult};

pub mod frames;

pub const DEFAULT_ANALYSIS_CONCURRENCY: usize = 3;
/// Sequential batches publish progress on every n-th item.
pub const PROGRESS_REPORT_INTERVAL: usize = 5;

/// Runs `task` on every item with at most `limit` tasks in flight.
///
/// Results come back in input order, each tagged with its key. A failing or
/// panicking task only affects its own entry: a panic surfaces as `RsError::Join`.
pub async fn bounded_fan_out<K, T, F, Fut>(items: Vec<(K, T)>, limit: usize, task: F) -> Vec<(K, RsResult<Fut::Output>)>
where
    F: Fn(T) -> Fut,
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut keys = Vec::with_capacity(items.len());
    let mut handles = Vec::with_capacity(items.len());
    for (key, item) in items {
        let semaphore = semaphore.clone();
        let work = task(item);
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            work.await
        }));
        keys.push(key);
    }
    let results = join_all(handles).await;
    keys.into_iter()
        .zip(results)
        .map(|(key, result)| (key, result.map_err(RsError::from)))
        .collect()
}

/// Runs a CPU heavy step on the blocking pool and waits for it.
pub async fn run_blocking<F, R>(work: F) -> RsResult<R>
where
    F: FnOnce() -> RsResult<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

pub fn is_report_point(index: usize) -> bool {
    index % PROGRESS_REPORT_INTERVAL == 0
}

/// Maps item `index` of `total` onto `start..=start + span`.
pub fn span_progress(index: usize, total: usize, start: u8, span: u8) -> u8 {
    if total == 0 {
        return start;
    }
    let ratio = (index as f64 / total as f64).clamp(0.0, 1.0);
    start.saturating_add((ratio * span as f64).round() as u8)
}
