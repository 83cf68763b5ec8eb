use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::subscription::{DbSubscriptionRecord, SubscriptionRecord, SubscriptionSnapshot};
use crate::models::user::DbUser;

use super::catalog::Role;

/// The authenticated caller, reconstructed per request from a verified
/// token plus a user lookup. Never persisted by the engine itself.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
    pub permission_overrides: Vec<String>,
    pub pm_company_id: Option<Uuid>,
    pub aoao_organization_id: Option<Uuid>,
    pub contractor_id: Option<Uuid>,
    pub subscription: Option<SubscriptionSnapshot>,
}

impl Principal {
    pub fn with_role(user_id: Uuid, role: Role) -> Self {
        Self {
            user_id,
            role,
            permission_overrides: Vec::new(),
            pm_company_id: None,
            aoao_organization_id: None,
            contractor_id: None,
            subscription: None,
        }
    }

    pub fn with_overrides(mut self, overrides: Vec<String>) -> Self {
        self.permission_overrides = overrides;
        self
    }

    pub fn with_pm_company(mut self, pm_company_id: Uuid) -> Self {
        self.pm_company_id = Some(pm_company_id);
        self
    }

    pub fn with_aoao_organization(mut self, aoao_organization_id: Uuid) -> Self {
        self.aoao_organization_id = Some(aoao_organization_id);
        self
    }

    pub fn with_contractor(mut self, contractor_id: Uuid) -> Self {
        self.contractor_id = Some(contractor_id);
        self
    }

    pub fn with_subscription(mut self, snapshot: SubscriptionSnapshot) -> Self {
        self.subscription = Some(snapshot);
        self
    }

    /// The subject whose subscription gates this principal's features: the
    /// affiliated organization when one exists, the user otherwise.
    pub fn subscription_subject_ids(&self) -> Vec<Uuid> {
        let mut ids = vec![self.user_id];
        if let Some(org) = self.pm_company_id {
            ids.push(org);
        }
        if let Some(org) = self.aoao_organization_id {
            ids.push(org);
        }
        ids
    }

    /// Load the principal for a verified user id: users row plus the
    /// subscription record for the user's current role, if any.
    pub async fn fetch(pool: &SqlitePool, user_id: Uuid) -> AppResult<Self> {
        let db_user = sqlx::query_as::<_, DbUser>(
            "SELECT id, name, email, password_hash, role, permission_overrides, pm_company_id, aoao_organization_id, contractor_id, created_at, updated_at, deleted_at \
             FROM users WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::unauthorized("user no longer exists"))?;

        let user: crate::models::user::User = db_user.try_into()?;

        let mut principal = Principal {
            user_id: user.id,
            role: user.role,
            permission_overrides: user.permission_overrides,
            pm_company_id: user.pm_company_id,
            aoao_organization_id: user.aoao_organization_id,
            contractor_id: user.contractor_id,
            subscription: None,
        };

        // Snapshot the subscription covering this principal, preferring an
        // organization-level record over a personal one.
        for subject_id in [
            principal.pm_company_id,
            principal.aoao_organization_id,
            Some(principal.user_id),
        ]
        .into_iter()
        .flatten()
        {
            let record = sqlx::query_as::<_, DbSubscriptionRecord>(
                "SELECT id, subject_id, role, tier, status, is_trial, trial_started_at, trial_ends_at, billing_customer_ref, billing_subscription_ref, created_at, updated_at \
                 FROM subscriptions WHERE subject_id = ? AND role = ?",
            )
            .bind(subject_id)
            .bind(principal.role.as_str())
            .fetch_optional(pool)
            .await?;

            if let Some(db_record) = record {
                let record: SubscriptionRecord = db_record.try_into()?;
                principal.subscription = Some(SubscriptionSnapshot::from(&record));
                break;
            }
        }

        Ok(principal)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth = AuthUser::from_request_parts(parts, state).await?;
        Principal::fetch(&state.pool, auth.user_id).await
    }
}
