//! Subscription and trial engine.
//!
//! Records are keyed by (subject, role) and upserted in place: a subject is
//! a user or an organization, and the same user may hold different
//! subscription states for different roles. Records are never hard-deleted;
//! cancellation is a status transition.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::authz::Role;
use crate::billing::{BillingEvent, BillingProvider, ProviderStatus};
use crate::errors::{AppError, AppResult};
use crate::models::subscription::{DbSubscriptionRecord, SubscriptionRecord, SubscriptionSnapshot, Tier};

// ---------------------------------------------------------------------------
// Role rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct RoleSubscriptionRules {
    /// The role must hold a paid subscription (a live trial counts as
    /// temporarily paid).
    pub requires_paid: bool,
    pub supports_trial: bool,
    pub supports_free_tier: bool,
}

pub fn rules_for(role: Role) -> RoleSubscriptionRules {
    match role {
        // HOA management is a paid product; trials allowed, no permanent
        // free tier.
        Role::Hoa | Role::HoaStaff => RoleSubscriptionRules {
            requires_paid: true,
            supports_trial: true,
            supports_free_tier: false,
        },
        Role::PropertyManager | Role::Contractor | Role::ContractorStaff | Role::Owner => {
            RoleSubscriptionRules {
                requires_paid: false,
                supports_trial: true,
                supports_free_tier: true,
            }
        }
        // Admin roles and the remaining read-only roles need no
        // subscription at all.
        _ => RoleSubscriptionRules {
            requires_paid: false,
            supports_trial: false,
            supports_free_tier: true,
        },
    }
}

/// Strict inequality: a trial ending exactly now is over.
pub fn is_trial_active(trial_ends_at: Option<DateTime<Utc>>) -> bool {
    match trial_ends_at {
        Some(ends_at) => Utc::now() < ends_at,
        None => false,
    }
}

/// Provider statuses under which a paid tier counts as live.
fn provider_status_active(status: Option<&str>) -> bool {
    matches!(status, Some("active") | Some("trialing"))
}

/// Validate a subscription state against the requirements of a role.
/// Returns the denial reason on failure.
pub fn validate_role_subscription(
    role: Role,
    tier: Tier,
    status: Option<&str>,
    is_trial: bool,
    trial_ends_at: Option<DateTime<Utc>>,
) -> Result<(), String> {
    if role.is_admin() {
        return Ok(());
    }

    let rules = rules_for(role);

    if rules.requires_paid {
        if tier == Tier::Free && !is_trial {
            return Err(format!(
                "role '{role}' requires a paid subscription; no free tier is available"
            ));
        }

        if is_trial && !is_trial_active(trial_ends_at) {
            return Err(format!(
                "trial period has expired for role '{role}'; a paid subscription is required"
            ));
        }

        if tier == Tier::Paid && !provider_status_active(status) {
            return Err(format!(
                "paid subscription for role '{role}' is not active (status: {})",
                status.unwrap_or("unknown")
            ));
        }
    }

    if rules.supports_free_tier {
        if tier == Tier::Free {
            return Ok(());
        }

        if !provider_status_active(status) {
            return Err(format!(
                "paid subscription for role '{role}' is not active (status: {})",
                status.unwrap_or("unknown")
            ));
        }
    }

    Ok(())
}

/// Boolean entitlement gate over a principal's cached snapshot. Absent
/// snapshot means the free tier.
pub fn check_active_subscription(role: Role, snapshot: Option<&SubscriptionSnapshot>) -> bool {
    match snapshot {
        Some(s) => validate_role_subscription(
            role,
            s.tier,
            s.status.as_deref(),
            s.is_trial,
            s.trial_ends_at,
        )
        .is_ok(),
        None => validate_role_subscription(role, Tier::Free, None, false, None).is_ok(),
    }
}

// ---------------------------------------------------------------------------
// Trial limits
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct TrialLimits {
    pub min_days: i64,
    pub max_days: i64,
}

/// Admins may grant longer trials than users can self-select.
pub fn trial_limits(admin_granted: bool) -> TrialLimits {
    if admin_granted {
        TrialLimits {
            min_days: env_days("TRIAL_ADMIN_MIN_DAYS", 1),
            max_days: env_days("TRIAL_ADMIN_MAX_DAYS", 90),
        }
    } else {
        TrialLimits {
            min_days: env_days("TRIAL_SELF_SERVICE_MIN_DAYS", 7),
            max_days: env_days("TRIAL_SELF_SERVICE_MAX_DAYS", 30),
        }
    }
}

fn env_days(var: &str, default: i64) -> i64 {
    std::env::var(var)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SubscriptionEngine {
    pool: SqlitePool,
    billing: Arc<dyn BillingProvider>,
}

impl SubscriptionEngine {
    pub fn new(pool: SqlitePool, billing: Arc<dyn BillingProvider>) -> Self {
        Self { pool, billing }
    }

    pub async fn get(&self, subject_id: Uuid, role: Role) -> AppResult<Option<SubscriptionRecord>> {
        let record = sqlx::query_as::<_, DbSubscriptionRecord>(
            "SELECT id, subject_id, role, tier, status, is_trial, trial_started_at, trial_ends_at, billing_customer_ref, billing_subscription_ref, created_at, updated_at \
             FROM subscriptions WHERE subject_id = ? AND role = ?",
        )
        .bind(subject_id)
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await?;

        record.map(SubscriptionRecord::try_from).transpose()
    }

    /// Start a trial for (subject, role). Rejected when the role does not
    /// support trials, a paid subscription is already live, an unexpired
    /// trial exists, or a self-service caller already consumed their trial.
    pub async fn start_trial(
        &self,
        subject_id: Uuid,
        role: Role,
        trial_days: Option<i64>,
        admin_granted: bool,
    ) -> AppResult<SubscriptionRecord> {
        let limits = trial_limits(admin_granted);
        let days = trial_days.unwrap_or(limits.max_days);

        if days < limits.min_days {
            return Err(AppError::bad_request(format!(
                "trial duration must be at least {} days",
                limits.min_days
            )));
        }
        if days > limits.max_days {
            return Err(AppError::bad_request(format!(
                "trial duration cannot exceed {} days",
                limits.max_days
            )));
        }

        if !rules_for(role).supports_trial {
            return Err(AppError::bad_request(format!(
                "role '{role}' does not support free trials"
            )));
        }

        if let Some(existing) = self.get(subject_id, role).await? {
            if existing.tier == Tier::Paid && provider_status_active(existing.status.as_deref()) {
                return Err(AppError::conflict(
                    "subject already holds an active paid subscription",
                ));
            }

            if existing.is_trial && is_trial_active(existing.trial_ends_at) {
                return Err(AppError::conflict(format!(
                    "trial already active for role '{role}'"
                )));
            }

            // A consumed trial is not renewable by self-service; admins may
            // still grant another one.
            if !admin_granted && (existing.is_trial || existing.trial_started_at.is_some()) {
                return Err(AppError::conflict(format!(
                    "a free trial for role '{role}' has already been used"
                )));
            }
        }

        let now = Utc::now();
        let ends_at = now + Duration::days(days);

        let record = self
            .upsert(UpsertSubscription {
                subject_id,
                role,
                tier: Tier::Free,
                status: Some("trialing".to_string()),
                is_trial: true,
                trial_started_at: Some(now),
                trial_ends_at: Some(ends_at),
                billing_customer_ref: None,
                billing_subscription_ref: None,
            })
            .await?;

        tracing::info!(
            subject_id = %subject_id,
            role = %role,
            days,
            trial_ends_at = %ends_at,
            "trial started"
        );

        Ok(record)
    }

    /// Re-verify a record against the billing provider. Provider failure
    /// never fails the caller: the record is downgraded to the free tier
    /// and the discrepancy logged, because a request that merely wants to
    /// check an existing status must not crash on provider downtime.
    pub async fn sync_from_provider(&self, subject_id: Uuid, role: Role) -> AppResult<SubscriptionRecord> {
        let existing = self
            .get(subject_id, role)
            .await?
            .ok_or_else(|| AppError::not_found(format!("no subscription record for role '{role}'")))?;

        // Trial expiry is our own clock, not the provider's.
        let is_trial = existing.is_trial && is_trial_active(existing.trial_ends_at);

        let (tier, status) = match existing.billing_subscription_ref.as_deref() {
            None => (existing.tier, existing.status.clone()),
            Some(subscription_ref) => match self.billing.subscription_status(subscription_ref).await {
                Ok(status @ (ProviderStatus::Active | ProviderStatus::Trialing)) => {
                    (Tier::Paid, Some(status.as_str().to_string()))
                }
                Ok(status) => (Tier::Free, Some(status.as_str().to_string())),
                Err(err) => {
                    tracing::warn!(
                        subject_id = %subject_id,
                        role = %role,
                        error = %err,
                        "billing verification failed; downgrading to free tier"
                    );
                    (Tier::Free, existing.status.clone())
                }
            },
        };

        self.upsert(UpsertSubscription {
            subject_id,
            role,
            tier,
            status,
            is_trial,
            trial_started_at: existing.trial_started_at,
            trial_ends_at: existing.trial_ends_at,
            billing_customer_ref: existing.billing_customer_ref,
            billing_subscription_ref: existing.billing_subscription_ref,
        })
        .await
    }

    /// Apply one provider status-change event, matching the record by its
    /// billing reference. Unknown references are logged and skipped - the
    /// feed may mention subscriptions we never tracked.
    pub async fn apply_provider_event(&self, event: &BillingEvent) -> AppResult<Option<SubscriptionRecord>> {
        let existing = sqlx::query_as::<_, DbSubscriptionRecord>(
            "SELECT id, subject_id, role, tier, status, is_trial, trial_started_at, trial_ends_at, billing_customer_ref, billing_subscription_ref, created_at, updated_at \
             FROM subscriptions WHERE billing_subscription_ref = ?",
        )
        .bind(&event.subscription_ref)
        .fetch_optional(&self.pool)
        .await?;

        let Some(existing) = existing else {
            tracing::warn!(
                subscription_ref = %event.subscription_ref,
                event_type = %event.event_type,
                "billing event for unknown subscription reference"
            );
            return Ok(None);
        };

        let existing: SubscriptionRecord = existing.try_into()?;

        let tier = match event.status {
            ProviderStatus::Active | ProviderStatus::Trialing => Tier::Paid,
            // Canceled/unknown records are kept, downgraded to free.
            ProviderStatus::Canceled | ProviderStatus::Unknown => Tier::Free,
        };

        let record = self
            .upsert(UpsertSubscription {
                subject_id: existing.subject_id,
                role: existing.role,
                tier,
                status: Some(event.status.as_str().to_string()),
                is_trial: existing.is_trial && is_trial_active(existing.trial_ends_at),
                trial_started_at: existing.trial_started_at,
                trial_ends_at: existing.trial_ends_at,
                billing_customer_ref: event.customer_ref.clone().or(existing.billing_customer_ref),
                billing_subscription_ref: Some(event.subscription_ref.clone()),
            })
            .await?;

        Ok(Some(record))
    }

    /// Record a paid checkout completion reported with explicit references.
    pub async fn attach_billing_refs(
        &self,
        subject_id: Uuid,
        role: Role,
        customer_ref: String,
        subscription_ref: String,
        status: ProviderStatus,
    ) -> AppResult<SubscriptionRecord> {
        let existing = self.get(subject_id, role).await?;
        let tier = match status {
            ProviderStatus::Active | ProviderStatus::Trialing => Tier::Paid,
            _ => Tier::Free,
        };

        self.upsert(UpsertSubscription {
            subject_id,
            role,
            tier,
            status: Some(status.as_str().to_string()),
            is_trial: false,
            trial_started_at: existing.as_ref().and_then(|r| r.trial_started_at),
            trial_ends_at: existing.as_ref().and_then(|r| r.trial_ends_at),
            billing_customer_ref: Some(customer_ref),
            billing_subscription_ref: Some(subscription_ref),
        })
        .await
    }

    async fn upsert(&self, data: UpsertSubscription) -> AppResult<SubscriptionRecord> {
        let now = Utc::now();
        let id = Uuid::new_v4();

        // Absent optional fields never clobber what the row already holds,
        // matching provider-feed updates that carry partial state.
        sqlx::query(
            "INSERT INTO subscriptions (id, subject_id, role, tier, status, is_trial, trial_started_at, trial_ends_at, billing_customer_ref, billing_subscription_ref, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(subject_id, role) DO UPDATE SET \
               tier = excluded.tier, \
               status = COALESCE(excluded.status, subscriptions.status), \
               is_trial = excluded.is_trial, \
               trial_started_at = COALESCE(excluded.trial_started_at, subscriptions.trial_started_at), \
               trial_ends_at = COALESCE(excluded.trial_ends_at, subscriptions.trial_ends_at), \
               billing_customer_ref = COALESCE(excluded.billing_customer_ref, subscriptions.billing_customer_ref), \
               billing_subscription_ref = COALESCE(excluded.billing_subscription_ref, subscriptions.billing_subscription_ref), \
               updated_at = excluded.updated_at",
        )
        .bind(id)
        .bind(data.subject_id)
        .bind(data.role.as_str())
        .bind(data.tier.as_str())
        .bind(&data.status)
        .bind(data.is_trial)
        .bind(data.trial_started_at)
        .bind(data.trial_ends_at)
        .bind(&data.billing_customer_ref)
        .bind(&data.billing_subscription_ref)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get(data.subject_id, data.role)
            .await?
            .ok_or_else(|| AppError::internal("subscription upsert returned no row"))
    }
}

struct UpsertSubscription {
    subject_id: Uuid,
    role: Role,
    tier: Tier,
    status: Option<String>,
    is_trial: bool,
    trial_started_at: Option<DateTime<Utc>>,
    trial_ends_at: Option<DateTime<Utc>>,
    billing_customer_ref: Option<String>,
    billing_subscription_ref: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::BillingError;
    use async_trait::async_trait;
    use sqlx::sqlite::SqlitePoolOptions;

    struct StaticBilling(Result<ProviderStatus, ()>);

    #[async_trait]
    impl BillingProvider for StaticBilling {
        async fn subscription_status(&self, _r: &str) -> Result<ProviderStatus, BillingError> {
            self.0.map_err(|_| BillingError::Unavailable("connection refused".into()))
        }
    }

    async fn engine(billing: StaticBilling) -> SubscriptionEngine {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory database");
        sqlx::migrate!().run(&pool).await.expect("migrations");
        SubscriptionEngine::new(pool, Arc::new(billing))
    }

    #[test]
    fn trial_expiry_is_strict() {
        // An end instant captured before the check is already in the past.
        let boundary = Utc::now();
        assert!(!is_trial_active(Some(boundary)));
        assert!(is_trial_active(Some(Utc::now() + Duration::hours(1))));
        assert!(!is_trial_active(Some(Utc::now() - Duration::seconds(1))));
        assert!(!is_trial_active(None));
    }

    #[test]
    fn hoa_requires_paid_but_trial_counts() {
        assert!(!check_active_subscription(Role::Hoa, None));

        let trialing = SubscriptionSnapshot {
            tier: Tier::Free,
            status: Some("trialing".to_string()),
            is_trial: true,
            trial_ends_at: Some(Utc::now() + Duration::days(5)),
        };
        assert!(check_active_subscription(Role::Hoa, Some(&trialing)));

        let expired = SubscriptionSnapshot {
            trial_ends_at: Some(Utc::now() - Duration::days(1)),
            ..trialing
        };
        assert!(!check_active_subscription(Role::Hoa, Some(&expired)));
    }

    #[test]
    fn free_tier_roles_are_entitled_without_any_record() {
        assert!(check_active_subscription(Role::PropertyManager, None));
        assert!(check_active_subscription(Role::Owner, None));
        assert!(check_active_subscription(Role::Admin, None));
    }

    #[test]
    fn paid_tier_must_be_provider_active() {
        let canceled = SubscriptionSnapshot {
            tier: Tier::Paid,
            status: Some("canceled".to_string()),
            is_trial: false,
            trial_ends_at: None,
        };
        assert!(!check_active_subscription(Role::PropertyManager, Some(&canceled)));

        let active = SubscriptionSnapshot {
            status: Some("active".to_string()),
            ..canceled
        };
        assert!(check_active_subscription(Role::PropertyManager, Some(&active)));
    }

    #[tokio::test]
    async fn second_start_trial_is_rejected_without_duplicates() {
        let engine = engine(StaticBilling(Ok(ProviderStatus::Active))).await;
        let subject = Uuid::new_v4();

        let first = engine
            .start_trial(subject, Role::Hoa, Some(14), false)
            .await
            .expect("first trial starts");
        assert!(first.is_trial);
        assert_eq!(first.status.as_deref(), Some("trialing"));

        let err = engine
            .start_trial(subject, Role::Hoa, Some(14), false)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)), "got {err:?}");

        // exactly one record for the pair
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM subscriptions WHERE subject_id = ? AND role = ?")
            .bind(subject)
            .bind(Role::Hoa.as_str())
            .fetch_one(&engine.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn trial_rejected_for_unsupported_role_and_bad_bounds() {
        let engine = engine(StaticBilling(Ok(ProviderStatus::Active))).await;

        let err = engine
            .start_trial(Uuid::new_v4(), Role::Auditor, Some(14), false)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err = engine
            .start_trial(Uuid::new_v4(), Role::Hoa, Some(365), false)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        // admins may grant what self-service cannot
        engine
            .start_trial(Uuid::new_v4(), Role::Hoa, Some(60), true)
            .await
            .expect("admin-granted 60 day trial");
    }

    #[tokio::test]
    async fn provider_failure_downgrades_to_free_instead_of_erroring() {
        let engine = engine(StaticBilling(Err(()))).await;
        let subject = Uuid::new_v4();

        engine
            .attach_billing_refs(
                subject,
                Role::PropertyManager,
                "cus_123".to_string(),
                "sub_456".to_string(),
                ProviderStatus::Active,
            )
            .await
            .unwrap();

        let synced = engine
            .sync_from_provider(subject, Role::PropertyManager)
            .await
            .expect("sync must not fail on provider downtime");
        assert_eq!(synced.tier, Tier::Free);
    }

    #[tokio::test]
    async fn provider_event_updates_matching_record() {
        let engine = engine(StaticBilling(Ok(ProviderStatus::Active))).await;
        let subject = Uuid::new_v4();

        engine
            .attach_billing_refs(
                subject,
                Role::Hoa,
                "cus_1".to_string(),
                "sub_1".to_string(),
                ProviderStatus::Active,
            )
            .await
            .unwrap();

        let event = BillingEvent {
            event_type: "customer.subscription.deleted".to_string(),
            customer_ref: Some("cus_1".to_string()),
            subscription_ref: "sub_1".to_string(),
            status: ProviderStatus::Canceled,
            subject_id: None,
        };

        let updated = engine.apply_provider_event(&event).await.unwrap().expect("record matched");
        assert_eq!(updated.tier, Tier::Free);
        assert_eq!(updated.status.as_deref(), Some("canceled"));

        // unknown refs are skipped, not errors
        let unknown = BillingEvent {
            subscription_ref: "sub_missing".to_string(),
            ..event
        };
        assert!(engine.apply_provider_event(&unknown).await.unwrap().is_none());
    }
}
