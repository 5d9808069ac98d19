use std::str::FromStr;
use std::time::Duration;

use crate::types::MessageContent;

/// Tuning knobs for the dispatch pipeline.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Recipients per batch (default: 100)
    pub batch_size: usize,

    /// Maximum sends executing concurrently (default: 10)
    pub max_workers: usize,

    /// Token bucket capacity, also the refill rate per second (default: 10)
    pub rate_limit_per_second: f64,

    /// Total attempts per message, including the first (default: 3)
    pub max_attempts: u32,

    /// Base delay for exponential backoff (default: 1s)
    pub backoff_base: Duration,

    /// How long the dispatcher waits for a batch to drain (default: 30s)
    pub drain_timeout: Duration,

    /// Sleep between denied rate limiter acquisitions (default: 50ms)
    pub limiter_poll_interval: Duration,

    /// How long a finished run waits for sends orphaned by drain timeouts (default: 60s)
    pub shutdown_grace: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_workers: 10,
            rate_limit_per_second: 10.0,
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            drain_timeout: Duration::from_secs(30),
            limiter_poll_interval: Duration::from_millis(50),
            shutdown_grace: Duration::from_secs(60),
        }
    }
}

/// SMTP relay settings. Present only when `SMTP_SERVER` is set.
#[derive(Clone)]
pub struct SmtpConfig {
    pub server: String,
    /// Submission port (default: 587)
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Recipient list location: a local JSON file path or an http(s) URL
    pub recipients_source: String,

    /// Sender address, subject and body shared by every message
    pub content: MessageContent,

    /// SMTP relay; takes precedence over Resend when configured
    pub smtp: Option<SmtpConfig>,

    /// Resend API key; when neither this nor SMTP is set the run is a dry run
    pub resend_api_key: Option<String>,

    /// Resend API base URL
    pub resend_api_url: String,

    /// Timeout for outbound HTTP requests (default: 10s)
    pub http_timeout: Duration,

    pub dispatch: DispatchConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("{key} environment variable is required"))
        };

        let body = match (lookup("EMAIL_BODY"), lookup("EMAIL_BODY_FILE")) {
            (Some(body), _) => body,
            (None, Some(path)) => std::fs::read_to_string(&path)
                .map_err(|e| anyhow::anyhow!("EMAIL_BODY_FILE {path} could not be read: {e}"))?,
            (None, None) => {
                anyhow::bail!("EMAIL_BODY or EMAIL_BODY_FILE environment variable is required")
            }
        };

        let defaults = DispatchConfig::default();
        let dispatch = DispatchConfig {
            batch_size: parse_or(&lookup, "BATCH_SIZE", defaults.batch_size)?,
            max_workers: parse_or(&lookup, "MAX_WORKERS", defaults.max_workers)?,
            rate_limit_per_second: parse_or(
                &lookup,
                "RATE_LIMIT_PER_SECOND",
                defaults.rate_limit_per_second,
            )?,
            max_attempts: parse_or(&lookup, "MAX_ATTEMPTS", defaults.max_attempts)?,
            backoff_base: Duration::from_millis(parse_or(&lookup, "BACKOFF_BASE_MS", 1000)?),
            drain_timeout: Duration::from_secs(parse_or(&lookup, "DRAIN_TIMEOUT_SECS", 30)?),
            limiter_poll_interval: Duration::from_millis(parse_or(&lookup, "LIMITER_POLL_MS", 50)?),
            shutdown_grace: Duration::from_secs(parse_or(&lookup, "SHUTDOWN_GRACE_SECS", 60)?),
        };

        if dispatch.batch_size == 0 {
            anyhow::bail!("BATCH_SIZE must be greater than zero");
        }
        if dispatch.max_workers == 0 {
            anyhow::bail!("MAX_WORKERS must be greater than zero");
        }
        if dispatch.max_attempts == 0 {
            anyhow::bail!("MAX_ATTEMPTS must be at least 1");
        }
        if !(dispatch.rate_limit_per_second.is_finite() && dispatch.rate_limit_per_second > 0.0) {
            anyhow::bail!("RATE_LIMIT_PER_SECOND must be a positive number");
        }

        let smtp = match lookup("SMTP_SERVER").filter(|v| !v.trim().is_empty()) {
            Some(server) => Some(SmtpConfig {
                server,
                port: parse_or(&lookup, "SMTP_PORT", 587)?,
                user: required("SMTP_USER")?,
                password: required("SMTP_PASSWORD")?,
            }),
            None => None,
        };

        Ok(Self {
            recipients_source: required("RECIPIENTS_SOURCE")?,
            content: MessageContent {
                from: required("EMAIL_FROM")?,
                subject: required("EMAIL_SUBJECT")?,
                body,
            },
            smtp,
            resend_api_key: lookup("RESEND_API_KEY").filter(|v| !v.is_empty()),
            resend_api_url: lookup("RESEND_API_URL")
                .unwrap_or_else(|| "https://api.resend.com".to_string()),
            http_timeout: Duration::from_secs(parse_or(&lookup, "HTTP_TIMEOUT_SECS", 10)?),
            dispatch,
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> anyhow::Result<T> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{key} must be a valid {}", std::any::type_name::<T>())),
        None => Ok(default),
    }
}
