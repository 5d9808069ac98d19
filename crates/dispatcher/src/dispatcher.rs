//! Top-level dispatch loop.
//!
//! Loads the recipient list once, then walks it in fixed-size batches:
//! submit the whole batch, drain it (bounded by the drain timeout), emit a
//! `BatchProcessed` count and move on. Batches never overlap, except for sends
//! left running by a drain timeout. Call [`BatchDispatcher::finish`] before
//! exiting so those sends get a chance to land.

use std::sync::Arc;
use std::time::Duration;

use smartmail_common::error::DispatchError;
use smartmail_common::types::Recipient;
use smartmail_notifier::{MetricsSink, RecipientSource};

use crate::pool::{DrainReport, WorkerPool};

/// Metric emitted after each batch, valued at the batch's recipient count.
pub const BATCH_PROCESSED_METRIC: &str = "BatchProcessed";

/// Totals for a completed run. Per-recipient outcomes are only in the logs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub batches: usize,
    pub recipients: usize,
}

pub struct BatchDispatcher {
    source: Arc<dyn RecipientSource>,
    pool: WorkerPool,
    metrics: Arc<dyn MetricsSink>,
    drain_timeout: Duration,
}

impl BatchDispatcher {
    pub fn new(
        source: Arc<dyn RecipientSource>,
        pool: WorkerPool,
        metrics: Arc<dyn MetricsSink>,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            source,
            pool,
            metrics,
            drain_timeout,
        }
    }

    /// Dispatch to every recipient, `batch_size` at a time.
    ///
    /// Fails only when the batch size is zero or the recipient list cannot be
    /// loaded. Individual send failures are logged and never abort the run.
    pub async fn run(&mut self, batch_size: usize) -> Result<RunSummary, DispatchError> {
        if batch_size == 0 {
            return Err(DispatchError::Config(
                "batch size must be greater than zero".to_string(),
            ));
        }

        let recipients = match self.source.list_recipients().await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load recipients, aborting run");
                return Err(e.into());
            }
        };

        let total_batches = recipients.len().div_ceil(batch_size);
        tracing::info!(
            recipients = recipients.len(),
            batch_size,
            total_batches,
            "Dispatch run started"
        );

        let mut summary = RunSummary::default();
        let mut remaining = recipients.into_iter();

        loop {
            let batch: Vec<Recipient> = remaining.by_ref().take(batch_size).collect();
            if batch.is_empty() {
                break;
            }
            let size = batch.len();

            for recipient in batch {
                self.pool.submit(recipient);
            }
            let report = self.pool.drain(self.drain_timeout).await;

            summary.batches += 1;
            summary.recipients += size;

            tracing::info!(
                batch = summary.batches,
                total_batches,
                size,
                succeeded = report.succeeded,
                failed = report.failed,
                abandoned = report.abandoned,
                "Batch processed"
            );
            self.metrics
                .record_count(BATCH_PROCESSED_METRIC, size as u64, "Count");
        }

        tracing::info!(
            batches = summary.batches,
            recipients = summary.recipients,
            "Dispatch run finished"
        );
        Ok(summary)
    }

    /// Wait up to `grace` for sends that outlived their batch's drain.
    pub async fn finish(&mut self, grace: Duration) -> DrainReport {
        let report = self.pool.shutdown(grace).await;
        tracing::info!(
            outstanding = report.submitted,
            succeeded = report.succeeded,
            failed = report.failed,
            dropped = report.abandoned,
            "Dispatcher finished"
        );
        report
    }
}
