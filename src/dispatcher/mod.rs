//! Bounded notification dispatcher.
//!
//! Announces URLs to the indexing service one at a time. A process gets a fixed
//! number of calls, and consecutive calls are spaced by a minimum interval.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::indexing::IndexingClient;
use crate::models::{DispatchReport, NotificationJob, RateBudget, ServiceAccountCredentials};

#[cfg(test)]
mod tests;

pub struct NotificationDispatcher {
    client: Arc<dyn IndexingClient>,
    // Held for a whole batch: concurrent dispatches run one after another.
    batch: tokio::sync::Mutex<()>,
    // Only ever locked briefly, never across an await.
    budget: Mutex<RateBudget>,
}

impl NotificationDispatcher {
    pub fn new(client: Arc<dyn IndexingClient>, max_calls: u32, min_interval: Duration) -> Self {
        Self {
            client,
            batch: tokio::sync::Mutex::new(()),
            budget: Mutex::new(RateBudget::new(max_calls, min_interval)),
        }
    }

    /// Snapshot of the call budget; does not wait for a running batch.
    pub fn budget(&self) -> RateBudget {
        self.lock_budget().clone()
    }

    fn lock_budget(&self) -> MutexGuard<'_, RateBudget> {
        self.budget.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sends each URL in order until the input or the call budget runs out.
    ///
    /// Failed calls are logged and still consume a slot. URLs beyond the budget
    /// are dropped, not queued.
    pub async fn dispatch(&self, job: &NotificationJob) -> DispatchReport {
        let _batch = self.batch.lock().await;
        let mut report = DispatchReport::default();

        for (i, url) in job.urls.iter().enumerate() {
            let (exhausted, wait, max_calls) = {
                let budget = self.lock_budget();
                (budget.exhausted(), budget.wait_time(Instant::now()), budget.max_calls)
            };
            if exhausted {
                report.skipped = (job.urls.len() - i) as u32;
                tracing::debug!(skipped = report.skipped, max_calls, "indexing budget reached");
                break;
            }

            if let Some(wait) = wait {
                tracing::info!(wait_ms = wait.as_millis() as u64, "waiting before next indexing call");
                sleep(wait).await;
            }

            tracing::info!(url = %url, "indexing");
            self.lock_budget().consume(Instant::now());
            report.attempted += 1;

            match self.client.publish(url, &job.credentials).await {
                Ok(()) => report.succeeded += 1,
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(url = %url, error = %err, "indexing call failed");
                }
            }
        }

        let calls_made = self.budget().calls_made;
        tracing::info!(
            attempted = report.attempted,
            failed = report.failed,
            skipped = report.skipped,
            calls_made,
            "indexing batch finished"
        );
        report
    }

    /// Announces page links, then image links, against the same budget.
    pub async fn announce(
        &self,
        links: Vec<String>,
        images: Vec<String>,
        credentials: &ServiceAccountCredentials,
    ) -> DispatchReport {
        let links = NotificationJob {
            urls: links,
            credentials: credentials.clone(),
        };
        let images = NotificationJob {
            urls: images,
            credentials: credentials.clone(),
        };
        let first = self.dispatch(&links).await;
        let second = self.dispatch(&images).await;
        first.merge(second)
    }
}
