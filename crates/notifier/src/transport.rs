//! Message transports.
//!
//! A transport performs exactly one delivery attempt and classifies any
//! failure as transient or permanent. Retrying is the caller's business.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;

use smartmail_common::error::TransportError;
use smartmail_common::types::{FailureKind, Message};

/// Delivers a single message.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, message: &Message) -> Result<(), TransportError>;

    /// Human-readable name for logs (e.g., "resend").
    fn name(&self) -> &'static str;
}

/// Email delivery through the Resend HTTP API (`POST /emails`).
pub struct ResendTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct ResendEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

impl ResendTransport {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/emails", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl Transport for ResendTransport {
    async fn deliver(&self, message: &Message) -> Result<(), TransportError> {
        let payload = ResendEmail {
            from: message.sender(),
            to: [message.recipient().address()],
            subject: message.subject(),
            text: message.body(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(TransportError {
            kind: classify_status(status),
            detail: format!("HTTP {status}: {body}"),
        })
    }

    fn name(&self) -> &'static str {
        "resend"
    }
}

/// Map an HTTP error status to a failure classification.
///
/// Timeouts, throttling and server errors are worth retrying; any other
/// client error (bad address, rejected key) is not.
pub fn classify_status(status: StatusCode) -> FailureKind {
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        FailureKind::Transient
    } else {
        FailureKind::Permanent
    }
}

fn classify_request_error(err: reqwest::Error) -> TransportError {
    // A request that cannot even be built will not build next time either.
    if err.is_builder() {
        TransportError::permanent(err.to_string())
    } else {
        TransportError::transient(err.to_string())
    }
}

/// Transport that logs instead of sending. Used when no API key is configured.
#[derive(Debug, Default)]
pub struct DryRunTransport;

impl DryRunTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for DryRunTransport {
    async fn deliver(&self, message: &Message) -> Result<(), TransportError> {
        tracing::info!(
            message_id = %message.id(),
            to = message.recipient().address(),
            subject = message.subject(),
            "Dry run, message not sent"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }
}
