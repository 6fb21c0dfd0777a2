//! Alert sinks for inbound notifications
//!
//! Each buffered notification is forwarded to every configured sink. Sink
//! failures are logged by the channel and never affect connection state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::AlertConfig;
use crate::io::{HttpClient, Method};
use crate::store::Notification;

/// Trait for surfacing a notification outside the buffer
#[async_trait]
pub trait AlertSink: Send + Sync + std::fmt::Debug {
    /// Get the sink type name (e.g. "webhook")
    fn type_name(&self) -> &str;

    /// Surface a single notification
    async fn alert(&self, notification: &Notification) -> crate::Result<()>;
}

/// Sink that emits a structured log record per notification
#[derive(Debug, Default)]
pub struct LogAlertSink;

impl LogAlertSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AlertSink for LogAlertSink {
    fn type_name(&self) -> &str {
        "log"
    }

    async fn alert(&self, notification: &Notification) -> crate::Result<()> {
        tracing::info!(
            ticket_id = %notification.ticket_id,
            priority = %notification.priority,
            status = %notification.status,
            "New ticket notification: {}",
            notification.message
        );
        Ok(())
    }
}

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(15);

/// Sink that POSTs the notification JSON to a configured URL
pub struct WebhookAlertSink {
    url: String,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for WebhookAlertSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookAlertSink")
            .field("url", &self.url)
            .finish()
    }
}

impl WebhookAlertSink {
    pub fn new(url: impl Into<String>, http: Arc<dyn HttpClient>) -> Self {
        let url = url.into();
        tracing::debug!("Created WebhookAlertSink for {}", url);
        Self { url, http }
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    fn type_name(&self) -> &str {
        "webhook"
    }

    async fn alert(&self, notification: &Notification) -> crate::Result<()> {
        let body = serde_json::to_value(notification)?;
        let headers = [(
            "Content-Type".to_string(),
            "application/json".to_string(),
        )];

        tracing::debug!(
            "Posting notification {} for ticket {} to {}",
            notification.id,
            notification.ticket_id,
            self.url
        );

        let response = self
            .http
            .request(Method::Post, &self.url, Some(body), &headers, WEBHOOK_TIMEOUT)
            .await?;

        if !response.is_success() {
            return Err(crate::TmsError::Alert(format!(
                "Webhook {} returned status {}: {}",
                self.url, response.status, response.body
            )));
        }

        Ok(())
    }
}

/// Build the configured alert sinks, sharing one HTTP client
pub fn build_sinks(configs: &[AlertConfig], http: Arc<dyn HttpClient>) -> Vec<Arc<dyn AlertSink>> {
    configs
        .iter()
        .map(|config| -> Arc<dyn AlertSink> {
            match config {
                AlertConfig::Log => Arc::new(LogAlertSink::new()),
                AlertConfig::Webhook { url } => {
                    Arc::new(WebhookAlertSink::new(url.clone(), Arc::clone(&http)))
                }
            }
        })
        .collect()
}
