//! SMTP delivery: STARTTLS upgrade, login, one plain-text message per call.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::response::Severity;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

use smartmail_common::error::TransportError;
use smartmail_common::types::{FailureKind, Message};

use crate::transport::Transport;

pub struct SmtpTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    pub fn new(mailer: AsyncSmtpTransport<Tokio1Executor>) -> Self {
        Self { mailer }
    }

    /// Relay through `server:port`, upgrading with STARTTLS and
    /// authenticating with `user`/`password` before each session.
    pub fn starttls(
        server: &str,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, smtp::Error> {
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(server)?
            .port(port)
            .credentials(Credentials::new(user.into(), password.into()))
            .timeout(Some(timeout))
            .build();
        Ok(Self::new(mailer))
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn deliver(&self, message: &Message) -> Result<(), TransportError> {
        let email = build_email(message)?;

        self.mailer.send(email).await.map_err(|e| TransportError {
            kind: classify_smtp_error(&e),
            detail: e.to_string(),
        })?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

fn build_email(message: &Message) -> Result<lettre::Message, TransportError> {
    let from: Mailbox = message
        .sender()
        .parse()
        .map_err(|e| TransportError::permanent(format!("invalid sender address: {e}")))?;
    let to: Mailbox = message
        .recipient()
        .address()
        .parse()
        .map_err(|e| TransportError::permanent(format!("invalid recipient address: {e}")))?;

    lettre::Message::builder()
        .message_id(Some(format!("<{}@smartmail>", message.id())))
        .date(message.created_at().into())
        .from(from)
        .to(to)
        .subject(message.subject())
        .header(ContentType::TEXT_PLAIN)
        .body(message.body().to_string())
        .map_err(|e| TransportError::permanent(e.to_string()))
}

/// Map an SMTP reply severity to a failure classification.
///
/// 4xx replies (greylisting, full mailbox, throttling) are worth retrying.
/// 5xx replies, rejected logins included, are final.
pub fn classify_reply(severity: Severity) -> FailureKind {
    match severity {
        Severity::PermanentNegativeCompletion => FailureKind::Permanent,
        _ => FailureKind::Transient,
    }
}

fn classify_smtp_error(err: &smtp::Error) -> FailureKind {
    match err.status() {
        Some(code) => classify_reply(code.severity),
        // Client errors are local misconfiguration, e.g. no usable auth mechanism.
        None if err.is_client() => FailureKind::Permanent,
        // Connection, TLS and timeout failures.
        None => FailureKind::Transient,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use smartmail_common::types::{MessageContent, Recipient};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    use super::*;

    fn make_message(to: &str) -> Message {
        let content = MessageContent {
            from: "news@example.com".to_string(),
            subject: "Launch".to_string(),
            body: "We are live".to_string(),
        };
        Message::new(&content, Recipient::with_address(to).unwrap())
    }

    fn plaintext(port: u16) -> SmtpTransport {
        SmtpTransport::new(
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous("127.0.0.1")
                .port(port)
                .timeout(Some(Duration::from_secs(5)))
                .build(),
        )
    }

    /// Minimal SMTP server for one session. Answers `RCPT` with `rcpt_reply`
    /// and everything else positively. Returns the port and every line received.
    async fn smtp_server(rcpt_reply: &'static str) -> (u16, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&received);

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            let mut lines = BufReader::new(read).lines();
            write.write_all(b"220 localhost ESMTP\r\n").await.unwrap();

            let mut in_data = false;
            while let Ok(Some(line)) = lines.next_line().await {
                log.lock().unwrap().push(line.clone());
                let reply = if in_data {
                    if line != "." {
                        continue;
                    }
                    in_data = false;
                    "250 2.0.0 queued\r\n"
                } else {
                    let verb = line.split([' ', ':']).next().unwrap_or("");
                    match verb.to_ascii_uppercase().as_str() {
                        "EHLO" | "HELO" => "250 localhost\r\n",
                        "RCPT" => rcpt_reply,
                        "DATA" => {
                            in_data = true;
                            "354 end data with <CR><LF>.<CR><LF>\r\n"
                        }
                        "QUIT" => "221 bye\r\n",
                        _ => "250 OK\r\n",
                    }
                };
                if write.write_all(reply.as_bytes()).await.is_err() {
                    break;
                }
            }
        });

        (port, received)
    }

    #[test]
    fn test_classify_reply() {
        assert_eq!(
            classify_reply(Severity::TransientNegativeCompletion),
            FailureKind::Transient
        );
        assert_eq!(
            classify_reply(Severity::PermanentNegativeCompletion),
            FailureKind::Permanent
        );
    }

    #[tokio::test]
    async fn test_smtp_delivers_plain_text() {
        let (port, received) = smtp_server("250 2.1.5 OK\r\n").await;

        plaintext(port)
            .deliver(&make_message("ada@example.com"))
            .await
            .unwrap();

        let lines = received.lock().unwrap().clone();
        assert!(lines.iter().any(|l| l.starts_with("MAIL FROM:<news@example.com>")));
        assert!(lines.iter().any(|l| l.starts_with("RCPT TO:<ada@example.com>")));
        assert!(lines.iter().any(|l| l == "Subject: Launch"));
        assert!(lines.iter().any(|l| l == "We are live"));
    }

    #[tokio::test]
    async fn test_smtp_mailbox_rejection_is_permanent() {
        let (port, _) = smtp_server("550 5.1.1 no such user\r\n").await;

        let err = plaintext(port)
            .deliver(&make_message("ghost@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Permanent);
    }

    #[tokio::test]
    async fn test_smtp_greylisting_is_transient() {
        let (port, _) = smtp_server("451 4.7.1 greylisted, try again later\r\n").await;

        let err = plaintext(port)
            .deliver(&make_message("ada@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Transient);
    }

    #[tokio::test]
    async fn test_smtp_connection_refused_is_transient() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = plaintext(port)
            .deliver(&make_message("ada@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Transient);
    }

    #[tokio::test]
    async fn test_unparsable_recipient_is_permanent() {
        // Fails while building the message, before any connection is made.
        let err = plaintext(1)
            .deliver(&make_message("not an address"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Permanent);
        assert!(err.detail.contains("recipient"));
    }
}
