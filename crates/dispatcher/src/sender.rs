use std::sync::Arc;
use std::time::Duration;

use smartmail_common::error::SendError;
use smartmail_common::types::{AttemptOutcome, Message};
use smartmail_notifier::Transport;

use crate::retry::{RetryDecision, RetryPolicy};

/// Result of a message that was eventually delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendSuccess {
    /// Attempts made, including the successful one.
    pub attempts: u32,
}

/// One iteration of the retry loop. Lives only until its outcome is logged.
struct SendAttempt<'a> {
    index: u32,
    message: &'a Message,
    outcome: AttemptOutcome,
}

impl<'a> SendAttempt<'a> {
    fn new(index: u32, message: &'a Message) -> Self {
        Self {
            index,
            message,
            outcome: AttemptOutcome::Pending,
        }
    }

    fn record(mut self, outcome: AttemptOutcome) {
        self.outcome = outcome;
        tracing::debug!(
            message_id = %self.message.id(),
            to = self.message.recipient().address(),
            attempt = self.index,
            outcome = %self.outcome,
            "Send attempt finished"
        );
    }
}

/// Sends one message, retrying transient failures per the [`RetryPolicy`].
pub struct Sender {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl Sender {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Deliver `message`, sleeping between attempts as the policy dictates.
    ///
    /// Permanent failures return after one attempt; transient ones return the
    /// last error once attempts run out.
    pub async fn send(&self, message: &Message) -> Result<SendSuccess, SendError> {
        let mut index = 0u32;

        loop {
            let attempt = SendAttempt::new(index, message);

            let err = match self.transport.deliver(message).await {
                Ok(()) => {
                    attempt.record(AttemptOutcome::Success);
                    return Ok(SendSuccess {
                        attempts: index + 1,
                    });
                }
                Err(err) => err,
            };
            attempt.record(err.kind.into());

            match self.policy.decide(index, err.kind) {
                RetryDecision::Retry { delay } => {
                    tracing::warn!(
                        message_id = %message.id(),
                        to = message.recipient().address(),
                        transport = self.transport.name(),
                        attempt = index,
                        delay_ms = whole_millis(delay),
                        error = %err,
                        "Transient send failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    index += 1;
                }
                RetryDecision::GiveUp => {
                    return Err(SendError {
                        kind: err.kind,
                        attempts: index + 1,
                        source: err,
                    });
                }
            }
        }
    }
}

/// Milliseconds for log fields, pinned at `u64::MAX` for saturated delays.
fn whole_millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}
