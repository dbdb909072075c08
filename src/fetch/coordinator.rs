//! Concurrent Fetch Coordinator
//!
//! Fans a batch of sub-queries out over a bounded worker pool and joins the
//! whole batch before returning:
//!
//! ```text
//! queries ─┬─ task ─ permit ─ execute ─┐
//!          ├─ task ─ permit ─ execute ─┼─ join (deadline) ─ records in query order
//!          └─ task ─ (waits)  ...     ─┘
//! ```
//!
//! Every sub-query owns one slot holding the records of its response. A
//! failed, panicked or unfinished sub-query yields a single ERROR-status
//! record in its slot. The pool and any task still running are torn down when the
//! call returns, on every path.

use super::client::SubQueryExecutor;
use super::error::{FetchError, FetchResult};
use super::subquery::OpenTsdbQuery;
use crate::config::ExecutorConfig;
use crate::model::QueryResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Runs sub-queries in parallel with a bounded number of workers
#[derive(Clone)]
pub struct FetchCoordinator {
    executor: Arc<dyn SubQueryExecutor>,
    pool_size: usize,
    batch_timeout: Option<Duration>,
}

impl FetchCoordinator {
    /// Create a coordinator; a pool of zero workers is rejected
    pub fn new(executor: Arc<dyn SubQueryExecutor>, config: &ExecutorConfig) -> FetchResult<Self> {
        if config.thread_pool_size == 0 {
            return Err(FetchError::InvalidPoolSize(config.thread_pool_size));
        }
        let batch_timeout =
            (config.batch_timeout_secs > 0).then(|| Duration::from_secs(config.batch_timeout_secs));

        Ok(Self {
            executor,
            pool_size: config.thread_pool_size,
            batch_timeout,
        })
    }

    /// Builder method: override the batch deadline
    pub fn with_batch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.batch_timeout = timeout;
        self
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Execute every query and return the records of each, in input order
    pub async fn fetch_all(&self, queries: Vec<OpenTsdbQuery>) -> Vec<QueryResult> {
        if queries.is_empty() {
            return Vec::new();
        }

        tracing::info!(
            queries = queries.len(),
            workers = self.pool_size,
            "Setting up worker pool"
        );
        let pool = Arc::new(Semaphore::new(self.pool_size));
        let mut batch = Batch::default();

        for query in queries {
            let metric = query.metric().to_string();
            let pool = Arc::clone(&pool);
            let executor = Arc::clone(&self.executor);

            let handle = tokio::spawn(async move {
                let _permit = match pool.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return vec![QueryResult::error(query.metric(), "worker pool shut down")];
                    }
                };
                match executor.execute(&query).await {
                    Ok(records) => records,
                    Err(e) => {
                        tracing::error!(metric = %query.metric(), error = %e, "Sub-query failed");
                        vec![QueryResult::error(query.metric(), e.to_string())]
                    }
                }
            });
            batch.tasks.push((metric, handle));
        }

        let deadline = self.batch_timeout.map(|t| Instant::now() + t);
        let mut results = Vec::with_capacity(batch.tasks.len());

        for (metric, handle) in batch.tasks.iter_mut() {
            let joined = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, &mut *handle).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        handle.abort();
                        let e = FetchError::Interrupted(self.batch_timeout.unwrap_or_default());
                        tracing::error!(metric = %metric, error = %e, "Abandoning sub-query");
                        results.push(QueryResult::error(metric.as_str(), e.to_string()));
                        continue;
                    }
                },
                None => handle.await,
            };

            match joined {
                Ok(records) => results.extend(records),
                Err(e) => {
                    tracing::error!(metric = %metric, error = %e, "Sub-query task did not complete");
                    results.push(QueryResult::error(metric.as_str(), e.to_string()));
                }
            }
        }

        pool.close();
        let failed = results.iter().filter(|r| r.is_error()).count();
        tracing::debug!(results = results.len(), failed, "Batch complete");
        results
    }
}

/// Spawned tasks of one batch; aborts whatever is still running when dropped
#[derive(Default)]
struct Batch {
    tasks: Vec<(String, JoinHandle<Vec<QueryResult>>)>,
}

impl Drop for Batch {
    fn drop(&mut self) {
        for (_, handle) in &self.tasks {
            handle.abort();
        }
    }
}
