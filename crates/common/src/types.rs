use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ValidationError;

/// Classification of a failed delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Expected to succeed on retry (timeout, throttling).
    Transient,
    /// Will not succeed on retry (invalid recipient, rejected credentials).
    Permanent,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Transient => write!(f, "transient"),
            FailureKind::Permanent => write!(f, "permanent"),
        }
    }
}

/// Outcome of a single send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Pending,
    Success,
    TransientFailure,
    PermanentFailure,
}

impl From<FailureKind> for AttemptOutcome {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::Transient => AttemptOutcome::TransientFailure,
            FailureKind::Permanent => AttemptOutcome::PermanentFailure,
        }
    }
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptOutcome::Pending => write!(f, "pending"),
            AttemptOutcome::Success => write!(f, "success"),
            AttemptOutcome::TransientFailure => write!(f, "transient_failure"),
            AttemptOutcome::PermanentFailure => write!(f, "permanent_failure"),
        }
    }
}

/// A single entry from the recipient list.
///
/// The address is validated non-empty on construction and the record is never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RecipientRecord")]
pub struct Recipient {
    address: String,
    fields: BTreeMap<String, String>,
}

impl Recipient {
    pub fn new(
        address: impl Into<String>,
        fields: BTreeMap<String, String>,
    ) -> Result<Self, ValidationError> {
        let address = address.into().trim().to_string();
        if address.is_empty() {
            return Err(ValidationError::EmptyAddress);
        }
        Ok(Self { address, fields })
    }

    /// Shorthand for a recipient with no personalization fields.
    pub fn with_address(address: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(address, BTreeMap::new())
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}

/// Wire shape of a recipient record, prior to validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipientRecord {
    #[serde(alias = "email")]
    pub address: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl TryFrom<RecipientRecord> for Recipient {
    type Error = ValidationError;

    fn try_from(record: RecipientRecord) -> Result<Self, Self::Error> {
        Recipient::new(record.address, record.fields)
    }
}

/// Content shared by every message of a run.
#[derive(Debug, Clone)]
pub struct MessageContent {
    /// Fixed sender address
    pub from: String,
    pub subject: String,
    /// Plain-text body
    pub body: String,
}

/// A fully formed message addressed to one recipient.
#[derive(Debug, Clone)]
pub struct Message {
    id: Uuid,
    from: String,
    subject: String,
    body: String,
    to: Recipient,
    created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(content: &MessageContent, to: Recipient) -> Self {
        Self {
            id: Uuid::new_v4(),
            from: content.from.clone(),
            subject: content.subject.clone(),
            body: content.body.clone(),
            to,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn sender(&self) -> &str {
        &self.from
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn recipient(&self) -> &Recipient {
        &self.to
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipient_rejects_blank_address() {
        assert_eq!(
            Recipient::with_address("   ").unwrap_err(),
            ValidationError::EmptyAddress
        );
    }

    #[test]
    fn test_recipient_trims_address() {
        let r = Recipient::with_address("  ada@example.com ").unwrap();
        assert_eq!(r.address(), "ada@example.com");
    }

    #[test]
    fn test_recipient_deserialize_email_alias() {
        let r: Recipient = serde_json::from_value(serde_json::json!({
            "email": "ada@example.com",
            "fields": { "name": "Ada" }
        }))
        .unwrap();
        assert_eq!(r.address(), "ada@example.com");
        assert_eq!(r.fields().get("name").map(String::as_str), Some("Ada"));
    }

    #[test]
    fn test_recipient_deserialize_rejects_empty() {
        let result: Result<Recipient, _> =
            serde_json::from_value(serde_json::json!({ "address": "" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_message_copies_content() {
        let content = MessageContent {
            from: "news@example.com".to_string(),
            subject: "Hello".to_string(),
            body: "Body".to_string(),
        };
        let to = Recipient::with_address("ada@example.com").unwrap();
        let msg = Message::new(&content, to.clone());
        assert_eq!(msg.sender(), "news@example.com");
        assert_eq!(msg.subject(), "Hello");
        assert_eq!(msg.body(), "Body");
        assert_eq!(msg.recipient(), &to);
    }

    #[test]
    fn test_attempt_outcome_from_failure_kind() {
        assert_eq!(
            AttemptOutcome::from(FailureKind::Permanent),
            AttemptOutcome::PermanentFailure
        );
        assert_eq!(AttemptOutcome::TransientFailure.to_string(), "transient_failure");
    }
}
