use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{require_role, Principal, Role};
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::models::subscription::{StartTrialRequest, SubscriptionRecord};
use crate::models::user::DbUser;

#[utoipa::path(
    get,
    path = "/subscriptions/me",
    tag = "Subscriptions",
    responses(
        (status = 200, description = "Subscription covering the caller's role", body = SubscriptionRecord),
        (status = 404, description = "No subscription record exists")
    )
)]
pub async fn my_subscription(
    State(state): State<AppState>,
    principal: Principal,
) -> AppResult<Json<SubscriptionRecord>> {
    // Organization-level records take precedence, mirroring how the
    // snapshot is resolved onto the principal.
    for subject_id in [
        principal.pm_company_id,
        principal.aoao_organization_id,
        Some(principal.user_id),
    ]
    .into_iter()
    .flatten()
    {
        if let Some(record) = state.subscriptions.get(subject_id, principal.role).await? {
            return Ok(Json(record));
        }
    }

    Err(AppError::not_found(format!(
        "no subscription record for role '{}'",
        principal.role
    )))
}

#[utoipa::path(
    post,
    path = "/subscriptions/me/start-trial",
    tag = "Subscriptions",
    request_body = StartTrialRequest,
    responses(
        (status = 201, description = "Trial started", body = SubscriptionRecord),
        (status = 400, description = "Role does not support trials or bad duration"),
        (status = 409, description = "Trial already active or already used")
    )
)]
pub async fn start_my_trial(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<StartTrialRequest>,
) -> AppResult<(StatusCode, Json<SubscriptionRecord>)> {
    // Self-service trials are personal; admins grant organization trials.
    let record = state
        .subscriptions
        .start_trial(principal.user_id, principal.role, payload.trial_days, false)
        .await?;

    log_activity(&state.event_bus, "trial_started", Some(principal.user_id), &record);

    Ok((StatusCode::CREATED, Json(record)))
}

#[utoipa::path(
    post,
    path = "/subscriptions/me/sync",
    tag = "Subscriptions",
    responses(
        (status = 200, description = "Record re-verified against the billing provider", body = SubscriptionRecord),
        (status = 404, description = "No subscription record exists")
    )
)]
pub async fn sync_my_subscription(
    State(state): State<AppState>,
    principal: Principal,
) -> AppResult<Json<SubscriptionRecord>> {
    for subject_id in [
        principal.pm_company_id,
        principal.aoao_organization_id,
        Some(principal.user_id),
    ]
    .into_iter()
    .flatten()
    {
        if state.subscriptions.get(subject_id, principal.role).await?.is_some() {
            let record = state
                .subscriptions
                .sync_from_provider(subject_id, principal.role)
                .await?;
            log_activity(&state.event_bus, "synced", Some(principal.user_id), &record);
            return Ok(Json(record));
        }
    }

    Err(AppError::not_found(format!(
        "no subscription record for role '{}'",
        principal.role
    )))
}

#[utoipa::path(
    post,
    path = "/subscriptions/users/{user_id}/start-trial",
    tag = "Subscriptions",
    params(("user_id" = Uuid, Path, description = "Target user id")),
    request_body = StartTrialRequest,
    responses(
        (status = 201, description = "Admin-granted trial started", body = SubscriptionRecord),
        (status = 404, description = "Target user does not exist")
    )
)]
pub async fn admin_start_trial(
    State(state): State<AppState>,
    principal: Principal,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<StartTrialRequest>,
) -> AppResult<(StatusCode, Json<SubscriptionRecord>)> {
    require_role(&principal, &[Role::SuperAdmin, Role::Admin])?;

    // Trial is granted for the role the target currently holds.
    let target_role = fetch_user_role(&state.pool, user_id).await?;

    let record = state
        .subscriptions
        .start_trial(user_id, target_role, payload.trial_days, true)
        .await?;

    log_activity(&state.event_bus, "trial_started", Some(principal.user_id), &record);

    Ok((StatusCode::CREATED, Json(record)))
}

async fn fetch_user_role(pool: &SqlitePool, user_id: Uuid) -> AppResult<Role> {
    let user = sqlx::query_as::<_, DbUser>(
        "SELECT id, name, email, password_hash, role, permission_overrides, pm_company_id, aoao_organization_id, contractor_id, created_at, updated_at, deleted_at \
         FROM users WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found(format!("user {user_id} not found")))?;

    Ok(Role::parse(&user.role))
}
