//! Hand-off of critical alerts to the external notification service.
//!
//! The engine only requests a notification; delivery (push, SMS, paging)
//! belongs to the collaborator behind this trait.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::runtime::Handle;

use crate::models::Alert;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("No async runtime available for webhook delivery")]
    NoRuntime,
    #[error("HTTP client error: {0}")]
    Client(String),
}

pub trait Notifier: Send + Sync {
    fn notify_critical(&self, alert: &Alert) -> Result<(), NotifyError>;
}

/// Default notifier: a structured log line for an external log shipper.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_critical(&self, alert: &Alert) -> Result<(), NotifyError> {
        tracing::warn!(
            alert_id = %alert.id,
            resident_id = %alert.resident_id,
            facility_id = %alert.facility_id,
            category = alert.category.as_str(),
            message = %alert.message,
            "Critical alert raised"
        );
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload<'a> {
    event: &'static str,
    alert: &'a Alert,
}

/// POSTs critical alerts as JSON to a configured URL.
///
/// The request is spawned on the runtime so the ingest path never waits
/// on the network; delivery failures are logged, not retried.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    runtime: Handle,
}

impl WebhookNotifier {
    /// Must be called from within a tokio runtime.
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        let runtime = Handle::try_current().map_err(|_| NotifyError::NoRuntime)?;
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| NotifyError::Client(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            runtime,
        })
    }
}

impl Notifier for WebhookNotifier {
    fn notify_critical(&self, alert: &Alert) -> Result<(), NotifyError> {
        let body = serde_json::to_value(WebhookPayload {
            event: "critical_alert",
            alert,
        })
        .map_err(|e| NotifyError::Client(e.to_string()))?;
        let request = self.client.post(&self.url).json(&body);
        let alert_id = alert.id;

        self.runtime.spawn(async move {
            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::debug!(%alert_id, "Critical alert webhook delivered");
                }
                Ok(resp) => {
                    tracing::warn!(%alert_id, status = %resp.status(), "Critical alert webhook rejected");
                }
                Err(e) => {
                    tracing::warn!(%alert_id, error = %e, "Critical alert webhook failed");
                }
            }
        });
        Ok(())
    }
}
