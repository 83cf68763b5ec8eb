//! Outbound notification seam. Two delivery modes:
//! - fire-and-forget (receipts, password resets): failures are logged and
//!   never surface as request failures
//! - on-demand (a user explicitly asked for "send this document now"):
//!   failures propagate as the request's failure

use async_trait::async_trait;

use crate::errors::{AppError, AppResult};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notifier not configured")]
    NotConfigured,
    #[error("delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Default notifier when SMTP credentials are absent: logs the send and
/// reports success so non-critical flows proceed in development.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_email(&self, to: &str, subject: &str, _body: &str) -> Result<(), NotifyError> {
        tracing::info!(to, subject, "email delivery skipped (notifier not configured)");
        Ok(())
    }
}

/// Fire-and-forget send: log the failure, never fail the caller.
pub async fn send_receipt(notifier: &dyn Notifier, to: &str, subject: &str, body: &str) {
    if let Err(err) = notifier.send_email(to, subject, body).await {
        tracing::error!(to, subject, error = %err, "notification failed");
    }
}

/// Explicitly requested send: a delivery failure is the request's failure.
pub async fn send_now(notifier: &dyn Notifier, to: &str, subject: &str, body: &str) -> AppResult<()> {
    notifier
        .send_email(to, subject, body)
        .await
        .map_err(|err| AppError::upstream(format!("email delivery failed: {err}")))
}
