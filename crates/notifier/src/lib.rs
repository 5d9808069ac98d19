//! Collaborators of the dispatch pipeline.
//!
//! - [`transport`]: delivers one fully formed message (Resend HTTP API or dry run)
//! - [`smtp`]: the same contract over SMTP with STARTTLS and login
//! - [`source`]: loads the ordered recipient list (JSON file or HTTP object)
//! - [`metrics`]: fire-and-forget named counters

pub mod metrics;
pub mod smtp;
pub mod source;
pub mod transport;

pub use metrics::{MetricsSink, TracingMetrics};
pub use smtp::SmtpTransport;
pub use source::{HttpSource, JsonFileSource, RecipientSource};
pub use transport::{DryRunTransport, ResendTransport, Transport};
