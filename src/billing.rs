//! Billing provider seam. The engine only ever needs the current status of
//! a subscription reference; everything else (checkout, invoicing, webhook
//! signature mechanics) stays on the provider's side of the boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("billing provider not configured")]
    NotConfigured,
    #[error("billing provider unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Active,
    Trialing,
    Canceled,
    Unknown,
}

impl ProviderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderStatus::Active => "active",
            ProviderStatus::Trialing => "trialing",
            ProviderStatus::Canceled => "canceled",
            ProviderStatus::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "active" => ProviderStatus::Active,
            "trialing" => ProviderStatus::Trialing,
            "canceled" => ProviderStatus::Canceled,
            _ => ProviderStatus::Unknown,
        }
    }
}

#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Current provider-side status for a subscription reference.
    async fn subscription_status(&self, subscription_ref: &str) -> Result<ProviderStatus, BillingError>;
}

/// Stand-in used when no provider credentials are configured. Every lookup
/// fails as not-configured; the subscription engine degrades the record to
/// the free tier instead of surfacing the error on the check path.
pub struct DisabledBilling;

#[async_trait]
impl BillingProvider for DisabledBilling {
    async fn subscription_status(&self, _subscription_ref: &str) -> Result<ProviderStatus, BillingError> {
        tracing::warn!("billing provider not configured - subscription verification disabled");
        Err(BillingError::NotConfigured)
    }
}

/// Asynchronous status-change event from the provider's feed. Signature
/// verification happens upstream; the payload arrives here trusted.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BillingEvent {
    #[schema(example = "customer.subscription.updated")]
    pub event_type: String,
    pub customer_ref: Option<String>,
    pub subscription_ref: String,
    pub status: ProviderStatus,
    /// Present when the provider metadata carries our subject directly.
    pub subject_id: Option<Uuid>,
}
