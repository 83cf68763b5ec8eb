use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::Role;
use crate::errors::AppError;
use crate::events::{Loggable, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Paid,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Paid => "paid",
        }
    }

    /// Unknown tier strings collapse to Free, the non-entitled default.
    pub fn parse(value: &str) -> Self {
        match value {
            "paid" => Tier::Paid,
            _ => Tier::Free,
        }
    }
}

/// One row per (subject, role); updated in place, never hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionRecord {
    pub id: Uuid,
    /// User or organization holding the subscription.
    pub subject_id: Uuid,
    pub role: Role,
    pub tier: Tier,
    /// Provider-reported status: active / trialing / canceled / unknown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub is_trial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_ends_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_customer_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_subscription_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for SubscriptionRecord {
    fn entity_type() -> &'static str { "subscription" }
    fn subject_id(&self) -> Uuid { self.subject_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbSubscriptionRecord {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub role: String,
    pub tier: String,
    pub status: Option<String>,
    pub is_trial: bool,
    pub trial_started_at: Option<DateTime<Utc>>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub billing_customer_ref: Option<String>,
    pub billing_subscription_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbSubscriptionRecord> for SubscriptionRecord {
    type Error = AppError;

    fn try_from(value: DbSubscriptionRecord) -> Result<Self, Self::Error> {
        Ok(SubscriptionRecord {
            id: value.id,
            subject_id: value.subject_id,
            role: Role::parse(&value.role),
            tier: Tier::parse(&value.tier),
            status: value.status,
            is_trial: value.is_trial,
            trial_started_at: value.trial_started_at,
            trial_ends_at: value.trial_ends_at,
            billing_customer_ref: value.billing_customer_ref,
            billing_subscription_ref: value.billing_subscription_ref,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

/// The entitlement-relevant slice of a subscription, carried on the
/// principal so read-path checks need no extra lookup.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionSnapshot {
    pub tier: Tier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub is_trial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_ends_at: Option<DateTime<Utc>>,
}

impl From<&SubscriptionRecord> for SubscriptionSnapshot {
    fn from(record: &SubscriptionRecord) -> Self {
        SubscriptionSnapshot {
            tier: record.tier,
            status: record.status.clone(),
            is_trial: record.is_trial,
            trial_ends_at: record.trial_ends_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StartTrialRequest {
    /// Trial length; bounded by self-service or admin limits.
    pub trial_days: Option<i64>,
}
