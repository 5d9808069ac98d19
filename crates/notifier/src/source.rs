//! Recipient sources.
//!
//! Both sources read the same document: a JSON array of
//! `{"address": "...", "fields": {...}}` records (`email` is accepted as an
//! alias for `address`). Records with a blank address are skipped.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use smartmail_common::error::DataSourceError;
use smartmail_common::types::{Recipient, RecipientRecord};

/// Returns the full, ordered recipient list for a run.
#[async_trait]
pub trait RecipientSource: Send + Sync {
    async fn list_recipients(&self) -> Result<Vec<Recipient>, DataSourceError>;
}

/// Recipient list stored in a local JSON file.
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RecipientSource for JsonFileSource {
    async fn list_recipients(&self) -> Result<Vec<Recipient>, DataSourceError> {
        let raw = tokio::fs::read(&self.path).await?;
        let recipients = parse_recipients(&raw)?;

        tracing::info!(
            path = %self.path.display(),
            count = recipients.len(),
            "Loaded recipients from file"
        );
        Ok(recipients)
    }
}

/// Recipient list fetched over HTTP(S), e.g. an object storage URL.
pub struct HttpSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl RecipientSource for HttpSource {
    async fn list_recipients(&self) -> Result<Vec<Recipient>, DataSourceError> {
        let raw = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DataSourceError::Http(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| DataSourceError::Http(e.to_string()))?;

        let recipients = parse_recipients(&raw)?;

        tracing::info!(
            url = %self.url,
            count = recipients.len(),
            "Fetched recipients over HTTP"
        );
        Ok(recipients)
    }
}

/// Parse a JSON recipient document, keeping record order.
pub fn parse_recipients(raw: &[u8]) -> Result<Vec<Recipient>, DataSourceError> {
    let records: Vec<RecipientRecord> = serde_json::from_slice(raw)?;

    let mut recipients = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        match Recipient::try_from(record) {
            Ok(r) => recipients.push(r),
            Err(e) => {
                tracing::warn!(index, error = %e, "Skipping invalid recipient record");
            }
        }
    }

    Ok(recipients)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_parse_keeps_order_and_skips_blank() {
        let raw = br#"[
            {"address": "a@example.com"},
            {"address": "   "},
            {"email": "b@example.com", "fields": {"name": "Bea"}}
        ]"#;
        let recipients = parse_recipients(raw).unwrap();
        let addresses: Vec<&str> = recipients.iter().map(|r| r.address()).collect();
        assert_eq!(addresses, vec!["a@example.com", "b@example.com"]);
        assert_eq!(
            recipients[1].fields().get("name").map(String::as_str),
            Some("Bea")
        );
    }

    #[test]
    fn test_parse_malformed_document() {
        let err = parse_recipients(b"{not json").unwrap_err();
        assert!(matches!(err, DataSourceError::Parse(_)));
    }

    #[tokio::test]
    async fn test_json_file_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"address": "x@example.com"}}, {{"address": "y@example.com"}}]"#)
            .unwrap();

        let source = JsonFileSource::new(file.path());
        let recipients = source.list_recipients().await.unwrap();
        assert_eq!(recipients.len(), 2);
        assert_eq!(recipients[0].address(), "x@example.com");
    }

    #[tokio::test]
    async fn test_json_file_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = JsonFileSource::new(dir.path().join("absent.json"));
        let err = source.list_recipients().await.unwrap_err();
        assert!(matches!(err, DataSourceError::Io(_)));
    }

    #[tokio::test]
    async fn test_http_source_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/recipients.json", listener.local_addr().unwrap());
        drop(listener);

        let source = HttpSource::new(url, Duration::from_secs(5)).unwrap();
        let err = source.list_recipients().await.unwrap_err();
        assert!(matches!(err, DataSourceError::Http(_)));
    }
}
