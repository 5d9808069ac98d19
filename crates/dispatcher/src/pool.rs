//! Bounded concurrent send execution.
//!
//! Every submitted recipient becomes its own task. A task:
//! 1. Waits for one of `max_workers` slots
//! 2. Polls the shared rate limiter until it is granted a permit
//! 3. Builds the message and hands it to the [`Sender`]
//!
//! `drain` waits for the tasks submitted since the previous drain, but only up
//! to a timeout. Tasks still running at that point are not cancelled: they
//! finish in the background and keep their worker slot until then. Their
//! results never reach the batch's report. The pool holds on to their handles
//! so `shutdown` can give them a bounded grace period before the process exits.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use smartmail_common::config::DispatchConfig;
use smartmail_common::error::{SendError, TransportError};
use smartmail_common::types::{FailureKind, Message, MessageContent, Recipient};

use crate::rate_limiter::RateLimiter;
use crate::sender::{SendSuccess, Sender};

/// Accounting for one drained batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Still in flight when the drain timed out.
    pub abandoned: usize,
}

impl DrainReport {
    pub fn timed_out(&self) -> bool {
        self.abandoned > 0
    }
}

/// Fixed-width pool of send workers gated by a shared [`RateLimiter`].
pub struct WorkerPool {
    sender: Arc<Sender>,
    limiter: Arc<dyn RateLimiter>,
    content: Arc<MessageContent>,
    workers: Arc<Semaphore>,
    poll_interval: Duration,
    in_flight: Vec<SendHandle>,
    /// Sends left running by a timed-out drain.
    orphaned: Vec<SendHandle>,
}

type SendHandle = JoinHandle<Result<SendSuccess, SendError>>;

impl WorkerPool {
    pub fn new(
        sender: Sender,
        limiter: Arc<dyn RateLimiter>,
        content: MessageContent,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            sender: Arc::new(sender),
            limiter,
            content: Arc::new(content),
            workers: Arc::new(Semaphore::new(config.max_workers.max(1))),
            poll_interval: config.limiter_poll_interval,
            in_flight: Vec::new(),
            orphaned: Vec::new(),
        }
    }

    /// Number of tasks submitted since the last drain.
    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }

    /// Number of sends abandoned by a drain that have not finished yet.
    pub fn orphaned(&self) -> usize {
        self.orphaned.iter().filter(|h| !h.is_finished()).count()
    }

    /// Queue a send to `recipient`. Must be called within a tokio runtime.
    pub fn submit(&mut self, recipient: Recipient) {
        let sender = Arc::clone(&self.sender);
        let limiter = Arc::clone(&self.limiter);
        let content = Arc::clone(&self.content);
        let workers = Arc::clone(&self.workers);
        let poll_interval = self.poll_interval;

        let handle = tokio::spawn(async move {
            let Ok(_slot) = workers.acquire_owned().await else {
                return Err(SendError {
                    kind: FailureKind::Transient,
                    attempts: 0,
                    source: TransportError::transient("worker pool closed"),
                });
            };

            while !limiter.acquire() {
                tokio::time::sleep(poll_interval).await;
            }

            let message = Message::new(&content, recipient);
            let result = sender.send(&message).await;

            match &result {
                Ok(success) => tracing::debug!(
                    message_id = %message.id(),
                    to = message.recipient().address(),
                    attempts = success.attempts,
                    "Message sent"
                ),
                Err(e) => tracing::error!(
                    message_id = %message.id(),
                    to = message.recipient().address(),
                    kind = %e.kind,
                    attempts = e.attempts,
                    error = %e,
                    "Failed to send message"
                ),
            }

            result
        });

        self.in_flight.push(handle);
    }

    /// Wait for submitted work to finish, or for `timeout` to elapse.
    pub async fn drain(&mut self, timeout: Duration) -> DrainReport {
        let mut handles = std::mem::take(&mut self.in_flight);
        let report = join_within(&mut handles, timeout).await;

        if report.timed_out() {
            tracing::warn!(
                timeout_secs = timeout.as_secs_f64(),
                abandoned = report.abandoned,
                "Drain timed out; in-flight sends continue unaccounted"
            );
        }

        self.orphaned.retain(|h| !h.is_finished());
        self.orphaned.append(&mut handles);
        report
    }

    /// Give every send still running, orphaned or not yet drained, up to
    /// `grace` to finish.
    ///
    /// Anything left after that is reported as abandoned and dies with the
    /// runtime.
    pub async fn shutdown(&mut self, grace: Duration) -> DrainReport {
        let mut handles = std::mem::take(&mut self.orphaned);
        handles.retain(|h| !h.is_finished());
        handles.append(&mut self.in_flight);

        let report = join_within(&mut handles, grace).await;
        if report.timed_out() {
            tracing::warn!(
                grace_secs = grace.as_secs_f64(),
                abandoned = report.abandoned,
                "Shutdown grace elapsed; remaining sends will be dropped"
            );
        } else if report.submitted > 0 {
            tracing::info!(
                succeeded = report.succeeded,
                failed = report.failed,
                "Background sends finished before shutdown"
            );
        }
        report
    }
}

/// Await `handles` until all finish or `timeout` elapses. Joined handles are
/// removed, so whatever is left in `handles` afterwards is still running.
async fn join_within(handles: &mut Vec<SendHandle>, timeout: Duration) -> DrainReport {
    let mut report = DrainReport {
        submitted: handles.len(),
        ..DrainReport::default()
    };

    // Timing out drops only the borrow; the tasks keep running.
    let _ = tokio::time::timeout(timeout, async {
        while let Some(handle) = handles.last_mut() {
            let joined = handle.await;
            handles.pop();
            match joined {
                Ok(Ok(_)) => report.succeeded += 1,
                Ok(Err(_)) => report.failed += 1,
                Err(e) => {
                    tracing::error!(error = %e, "Send task did not complete");
                    report.failed += 1;
                }
            }
        }
    })
    .await;

    report.abandoned = handles.len();
    report
}
