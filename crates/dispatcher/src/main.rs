//! SmartMail dispatcher binary entrypoint.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use smartmail_common::config::AppConfig;
use smartmail_dispatcher::{BatchDispatcher, RetryPolicy, Sender, TokenBucket, WorkerPool};
use smartmail_notifier::{
    DryRunTransport, HttpSource, JsonFileSource, RecipientSource, ResendTransport,
    SmtpTransport, TracingMetrics, Transport,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("smartmail=info,smartmail_dispatcher=info,smartmail_notifier=info")
        }))
        .json()
        .init();

    tracing::info!("SmartMail dispatcher starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    let source: Arc<dyn RecipientSource> = if config.recipients_source.starts_with("http://")
        || config.recipients_source.starts_with("https://")
    {
        Arc::new(HttpSource::new(
            config.recipients_source.clone(),
            config.http_timeout,
        )?)
    } else {
        Arc::new(JsonFileSource::new(&config.recipients_source))
    };

    let transport: Arc<dyn Transport> = match (&config.smtp, &config.resend_api_key) {
        (Some(smtp), _) => Arc::new(SmtpTransport::starttls(
            &smtp.server,
            smtp.port,
            smtp.user.clone(),
            smtp.password.clone(),
            config.http_timeout,
        )?),
        (None, Some(api_key)) => Arc::new(ResendTransport::new(
            &config.resend_api_url,
            api_key.clone(),
            config.http_timeout,
        )?),
        (None, None) => {
            tracing::warn!("Neither SMTP_SERVER nor RESEND_API_KEY set, running in dry-run mode");
            Arc::new(DryRunTransport::new())
        }
    };

    let transport_name = transport.name();
    let limiter = Arc::new(TokenBucket::new(config.dispatch.rate_limit_per_second)?);
    let sender = Sender::new(transport, RetryPolicy::from_config(&config.dispatch));
    let pool = WorkerPool::new(sender, limiter, config.content.clone(), &config.dispatch);
    let mut dispatcher = BatchDispatcher::new(
        source,
        pool,
        Arc::new(TracingMetrics::new()),
        config.dispatch.drain_timeout,
    );

    tracing::info!(
        source = %config.recipients_source,
        transport = transport_name,
        batch_size = config.dispatch.batch_size,
        max_workers = config.dispatch.max_workers,
        rate_limit_per_second = config.dispatch.rate_limit_per_second,
        "Starting dispatch run"
    );

    // Run with graceful shutdown on Ctrl+C
    let finished = tokio::select! {
        result = dispatcher.run(config.dispatch.batch_size) => Some(result),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping...");
            None
        }
    };

    if let Some(result) = finished {
        match result {
            Ok(summary) => tracing::info!(
                batches = summary.batches,
                recipients = summary.recipients,
                "Dispatch run completed"
            ),
            Err(e) => {
                tracing::error!(error = %e, "Dispatch run aborted");
                return Err(e.into());
            }
        }
        // Sends orphaned by the last drain timeout would die with the runtime.
        dispatcher.finish(config.dispatch.shutdown_grace).await;
    }

    tracing::info!("SmartMail dispatcher stopped.");
    Ok(())
}
