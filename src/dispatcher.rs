use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{AcquireError, Semaphore};
use tokio::task::JoinSet;

use crate::config::RunConfig;
use crate::executor::{Execute, Outcome};
use crate::progress::ProgressSink;

/// Issues a fixed number of requests in batches of `2 × concurrency`,
/// never running more than `concurrency` of them at once.
///
/// Each batch is awaited in full and handed to the caller before the next
/// one is started, so at most one batch of tasks exists at any time.
pub struct Dispatcher<E> {
    executor: Arc<E>,
    requests: u64,
    concurrency: usize,
}

impl<E: Execute> Dispatcher<E> {
    pub fn new(executor: Arc<E>, requests: u64, concurrency: usize) -> Self {
        Dispatcher {
            executor,
            requests,
            concurrency: concurrency.clamp(1, Semaphore::MAX_PERMITS),
        }
    }

    pub fn from_config(executor: E, config: &RunConfig) -> Self {
        Dispatcher::new(Arc::new(executor), config.requests, config.concurrency)
    }

    fn batch_size(&self) -> usize {
        self.concurrency * 2
    }

    /// Runs every request and returns how many were dispatched.
    ///
    /// `on_batch` receives the outcomes of each batch in completion order.
    pub async fn run<F>(&self, progress: &mut dyn ProgressSink, mut on_batch: F) -> Result<u64>
    where
        F: FnMut(Vec<Outcome>),
    {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut sequences = 1..=self.requests;
        let mut completed = 0u64;

        loop {
            let batch: Vec<u64> = sequences.by_ref().take(self.batch_size()).collect();
            if batch.is_empty() {
                break;
            }

            let outcomes = self.run_batch(batch, &permits).await?;
            completed += outcomes.len() as u64;
            tracing::debug!(completed, total = self.requests, "Batch finished");

            on_batch(outcomes);
            progress.update(completed, self.requests);
        }

        progress.finish();
        Ok(completed)
    }

    /// Dropping the set on an early return aborts whatever is still running.
    async fn run_batch(&self, batch: Vec<u64>, permits: &Arc<Semaphore>) -> Result<Vec<Outcome>> {
        let mut tasks = JoinSet::new();
        for sequence in batch {
            let executor = Arc::clone(&self.executor);
            let permits = Arc::clone(permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await?;
                Ok::<_, AcquireError>(executor.execute(sequence).await)
            });
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .context("worker task failed")?
                .context("worker pool closed")?;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}
