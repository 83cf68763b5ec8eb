//! Grant administration and the access-request approval workflow.
//!
//! Grants name a subject (user or organization) and a resource (building
//! or unit). Approving a request materializes the grant at the
//! organization level when the requester carries an affiliation, otherwise
//! as a direct user grant.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use sqlx::SqlitePool;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{require_permission, Principal};
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::models::access::{
    AccessGrant, AccessRequest, AccessRequestCreate, DbAccessGrant, DbAccessRequest,
    GrantCreateRequest, RequestStatus, ResourceType, SubjectType,
};
use crate::utils::utc_now;

// =============================================================================
// GRANTS
// =============================================================================

#[utoipa::path(
    get,
    path = "/access/grants",
    tag = "Access",
    responses((status = 200, description = "All access grants", body = [AccessGrant]))
)]
pub async fn list_grants(
    State(state): State<AppState>,
    principal: Principal,
) -> AppResult<Json<Vec<AccessGrant>>> {
    require_permission(&principal, "access:read")?;

    let grants = sqlx::query_as::<_, DbAccessGrant>(
        "SELECT id, subject_type, subject_id, resource_type, resource_id, granted_by, created_at \
         FROM access_grants ORDER BY created_at DESC",
    )
    .fetch_all(&state.pool)
    .await?;

    let grants: Vec<AccessGrant> = grants
        .into_iter()
        .map(AccessGrant::try_from)
        .collect::<Result<_, _>>()?;

    Ok(Json(grants))
}

#[utoipa::path(
    post,
    path = "/access/grants",
    tag = "Access",
    request_body = GrantCreateRequest,
    responses(
        (status = 201, description = "Grant created", body = AccessGrant),
        (status = 404, description = "Subject or resource does not exist"),
        (status = 409, description = "Grant already exists")
    )
)]
pub async fn create_grant(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<GrantCreateRequest>,
) -> AppResult<(StatusCode, Json<AccessGrant>)> {
    require_permission(&principal, "access:write")?;

    ensure_subject_exists(&state.pool, payload.subject_type, payload.subject_id).await?;
    ensure_resource_exists(&state.pool, payload.resource_type, payload.resource_id).await?;

    let existing: i64 = sqlx::query_scalar(
        "SELECT COUNT(1) FROM access_grants WHERE subject_type = ? AND subject_id = ? AND resource_type = ? AND resource_id = ?",
    )
    .bind(payload.subject_type.as_str())
    .bind(payload.subject_id)
    .bind(payload.resource_type.as_str())
    .bind(payload.resource_id)
    .fetch_one(&state.pool)
    .await?;

    if existing > 0 {
        return Err(AppError::conflict("subject already holds this grant"));
    }

    let grant = insert_grant(
        &state.pool,
        payload.subject_type,
        payload.subject_id,
        payload.resource_type,
        payload.resource_id,
        Some(principal.user_id),
    )
    .await?;

    log_activity(&state.event_bus, "created", Some(principal.user_id), &grant);

    Ok((StatusCode::CREATED, Json(grant)))
}

#[utoipa::path(
    delete,
    path = "/access/grants/{id}",
    tag = "Access",
    params(("id" = Uuid, Path, description = "Grant id")),
    responses(
        (status = 204, description = "Grant revoked"),
        (status = 404, description = "Grant does not exist")
    )
)]
pub async fn revoke_grant(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require_permission(&principal, "access:write")?;

    let grant = sqlx::query_as::<_, DbAccessGrant>(
        "SELECT id, subject_type, subject_id, resource_type, resource_id, granted_by, created_at \
         FROM access_grants WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::not_found("grant not found"))?;

    let grant: AccessGrant = grant.try_into()?;

    sqlx::query("DELETE FROM access_grants WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;

    // Drop the cached allow for direct user grants; organization-wide
    // revocations age out with the cache TTL.
    if grant.subject_type == SubjectType::User {
        state
            .resolver
            .invalidate(grant.subject_id, grant.resource_type, grant.resource_id);
    }

    log_activity(&state.event_bus, "revoked", Some(principal.user_id), &grant);

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/access/me",
    tag = "Access",
    responses((status = 200, description = "Grants reaching the caller", body = [AccessGrant]))
)]
pub async fn my_access(
    State(state): State<AppState>,
    principal: Principal,
) -> AppResult<Json<Vec<AccessGrant>>> {
    // Direct grants plus anything held by the caller's organizations.
    let mut subjects: Vec<(&'static str, Uuid)> = vec![("user", principal.user_id)];
    if let Some(pm) = principal.pm_company_id {
        subjects.push(("pm_company", pm));
    }
    if let Some(aoao) = principal.aoao_organization_id {
        subjects.push(("aoao_organization", aoao));
    }

    let mut grants = Vec::new();
    for (subject_type, subject_id) in subjects {
        let rows = sqlx::query_as::<_, DbAccessGrant>(
            "SELECT id, subject_type, subject_id, resource_type, resource_id, granted_by, created_at \
             FROM access_grants WHERE subject_type = ? AND subject_id = ? ORDER BY created_at",
        )
        .bind(subject_type)
        .bind(subject_id)
        .fetch_all(&state.pool)
        .await?;

        for row in rows {
            grants.push(AccessGrant::try_from(row)?);
        }
    }

    Ok(Json(grants))
}

// =============================================================================
// ACCESS REQUESTS
// =============================================================================

#[derive(Debug, Deserialize, IntoParams)]
pub struct RequestListParams {
    /// Filter by status (pending, approved, rejected)
    pub status: Option<String>,
}

#[utoipa::path(
    post,
    path = "/access/requests",
    tag = "Access",
    request_body = AccessRequestCreate,
    responses(
        (status = 201, description = "Request filed", body = AccessRequest),
        (status = 404, description = "Requested resource does not exist")
    )
)]
pub async fn create_request(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<AccessRequestCreate>,
) -> AppResult<(StatusCode, Json<AccessRequest>)> {
    let (resource_id, building_id, unit_id) = match payload.request_type {
        ResourceType::Building => {
            let id = payload
                .building_id
                .ok_or_else(|| AppError::bad_request("building_id is required for building requests"))?;
            (id, Some(id), None)
        }
        ResourceType::Unit => {
            let id = payload
                .unit_id
                .ok_or_else(|| AppError::bad_request("unit_id is required for unit requests"))?;
            (id, None, Some(id))
        }
    };

    ensure_resource_exists(&state.pool, payload.request_type, resource_id).await?;

    // The requester's affiliation rides along so approval can grant at the
    // organization level.
    let (organization_type, organization_id) = if let Some(pm) = principal.pm_company_id {
        (Some(SubjectType::PmCompany), Some(pm))
    } else if let Some(aoao) = principal.aoao_organization_id {
        (Some(SubjectType::AoaoOrganization), Some(aoao))
    } else {
        (None, None)
    };

    let request_id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO access_requests (id, requester_user_id, request_type, building_id, unit_id, organization_type, organization_id, notes, status, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?)",
    )
    .bind(request_id)
    .bind(principal.user_id)
    .bind(payload.request_type.as_str())
    .bind(building_id)
    .bind(unit_id)
    .bind(organization_type.map(|t| t.as_str()))
    .bind(organization_id)
    .bind(&payload.notes)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let request = fetch_request(&state.pool, request_id).await?;
    log_activity(&state.event_bus, "created", Some(principal.user_id), &request);

    tracing::info!(
        requester = %principal.user_id,
        request_type = payload.request_type.as_str(),
        resource = %resource_id,
        "access request filed"
    );

    Ok((StatusCode::CREATED, Json(request)))
}

#[utoipa::path(
    get,
    path = "/access/requests",
    tag = "Access",
    params(RequestListParams),
    responses((status = 200, description = "Access requests", body = [AccessRequest]))
)]
pub async fn list_requests(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<RequestListParams>,
) -> AppResult<Json<Vec<AccessRequest>>> {
    // Admins see every request; everyone else only their own.
    let rows = if principal.role.is_admin() {
        match params.status {
            Some(status) => {
                sqlx::query_as::<_, DbAccessRequest>(
                    "SELECT id, requester_user_id, request_type, building_id, unit_id, organization_type, organization_id, notes, status, decided_by, decided_at, created_at \
                     FROM access_requests WHERE status = ? ORDER BY created_at DESC",
                )
                .bind(status)
                .fetch_all(&state.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, DbAccessRequest>(
                    "SELECT id, requester_user_id, request_type, building_id, unit_id, organization_type, organization_id, notes, status, decided_by, decided_at, created_at \
                     FROM access_requests ORDER BY created_at DESC",
                )
                .fetch_all(&state.pool)
                .await?
            }
        }
    } else {
        sqlx::query_as::<_, DbAccessRequest>(
            "SELECT id, requester_user_id, request_type, building_id, unit_id, organization_type, organization_id, notes, status, decided_by, decided_at, created_at \
             FROM access_requests WHERE requester_user_id = ? ORDER BY created_at DESC",
        )
        .bind(principal.user_id)
        .fetch_all(&state.pool)
        .await?
    };

    let requests: Vec<AccessRequest> = rows
        .into_iter()
        .map(AccessRequest::try_from)
        .collect::<Result<_, _>>()?;

    Ok(Json(requests))
}

#[utoipa::path(
    post,
    path = "/access/requests/{id}/approve",
    tag = "Access",
    params(("id" = Uuid, Path, description = "Request id")),
    responses(
        (status = 200, description = "Request approved, grant created", body = AccessRequest),
        (status = 409, description = "Request already decided")
    )
)]
pub async fn approve_request(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<AccessRequest>> {
    require_permission(&principal, "requests:approve")?;

    let request = fetch_request(&state.pool, id).await?;
    if request.status != RequestStatus::Pending {
        return Err(AppError::conflict("request has already been decided"));
    }

    let resource_id = match request.request_type {
        ResourceType::Building => request.building_id,
        ResourceType::Unit => request.unit_id,
    }
    .ok_or_else(|| AppError::internal("request row is missing its resource id"))?;

    // Organization affiliation at request time decides the grant subject.
    let (subject_type, subject_id) = match (request.organization_type, request.organization_id) {
        (Some(org_type), Some(org_id)) => (org_type, org_id),
        _ => (SubjectType::User, request.requester_user_id),
    };

    let already: i64 = sqlx::query_scalar(
        "SELECT COUNT(1) FROM access_grants WHERE subject_type = ? AND subject_id = ? AND resource_type = ? AND resource_id = ?",
    )
    .bind(subject_type.as_str())
    .bind(subject_id)
    .bind(request.request_type.as_str())
    .bind(resource_id)
    .fetch_one(&state.pool)
    .await?;

    if already == 0 {
        let grant = insert_grant(
            &state.pool,
            subject_type,
            subject_id,
            request.request_type,
            resource_id,
            Some(principal.user_id),
        )
        .await?;
        log_activity(&state.event_bus, "created", Some(principal.user_id), &grant);
    }

    let now = utc_now();
    sqlx::query("UPDATE access_requests SET status = 'approved', decided_by = ?, decided_at = ? WHERE id = ?")
        .bind(principal.user_id)
        .bind(now)
        .bind(id)
        .execute(&state.pool)
        .await?;

    let request = fetch_request(&state.pool, id).await?;
    log_activity(&state.event_bus, "approved", Some(principal.user_id), &request);

    Ok(Json(request))
}

#[utoipa::path(
    post,
    path = "/access/requests/{id}/reject",
    tag = "Access",
    params(("id" = Uuid, Path, description = "Request id")),
    responses(
        (status = 200, description = "Request rejected", body = AccessRequest),
        (status = 409, description = "Request already decided")
    )
)]
pub async fn reject_request(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<AccessRequest>> {
    require_permission(&principal, "requests:approve")?;

    let request = fetch_request(&state.pool, id).await?;
    if request.status != RequestStatus::Pending {
        return Err(AppError::conflict("request has already been decided"));
    }

    let now = utc_now();
    sqlx::query("UPDATE access_requests SET status = 'rejected', decided_by = ?, decided_at = ? WHERE id = ?")
        .bind(principal.user_id)
        .bind(now)
        .bind(id)
        .execute(&state.pool)
        .await?;

    let request = fetch_request(&state.pool, id).await?;
    log_activity(&state.event_bus, "rejected", Some(principal.user_id), &request);

    Ok(Json(request))
}

// =============================================================================
// HELPERS
// =============================================================================

async fn insert_grant(
    pool: &SqlitePool,
    subject_type: SubjectType,
    subject_id: Uuid,
    resource_type: ResourceType,
    resource_id: Uuid,
    granted_by: Option<Uuid>,
) -> AppResult<AccessGrant> {
    let id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO access_grants (id, subject_type, subject_id, resource_type, resource_id, granted_by, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(subject_type.as_str())
    .bind(subject_id)
    .bind(resource_type.as_str())
    .bind(resource_id)
    .bind(granted_by)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(AccessGrant {
        id,
        subject_type,
        subject_id,
        resource_type,
        resource_id,
        granted_by,
        created_at: now,
    })
}

async fn ensure_subject_exists(pool: &SqlitePool, subject_type: SubjectType, subject_id: Uuid) -> AppResult<()> {
    let table = match subject_type {
        SubjectType::User => "users",
        SubjectType::PmCompany => "pm_companies",
        SubjectType::AoaoOrganization => "aoao_organizations",
    };

    let sql = format!("SELECT COUNT(1) FROM {table} WHERE id = ?");
    let count: i64 = sqlx::query_scalar(&sql).bind(subject_id).fetch_one(pool).await?;

    if count == 0 {
        return Err(AppError::not_found(format!(
            "{} {subject_id} not found",
            subject_type.as_str()
        )));
    }

    Ok(())
}

async fn ensure_resource_exists(pool: &SqlitePool, resource_type: ResourceType, resource_id: Uuid) -> AppResult<()> {
    let table = match resource_type {
        ResourceType::Building => "buildings",
        ResourceType::Unit => "units",
    };

    let sql = format!("SELECT COUNT(1) FROM {table} WHERE id = ?");
    let count: i64 = sqlx::query_scalar(&sql).bind(resource_id).fetch_one(pool).await?;

    if count == 0 {
        return Err(AppError::not_found(format!(
            "{} {resource_id} not found",
            resource_type.as_str()
        )));
    }

    Ok(())
}

async fn fetch_request(pool: &SqlitePool, request_id: Uuid) -> AppResult<AccessRequest> {
    let row = sqlx::query_as::<_, DbAccessRequest>(
        "SELECT id, requester_user_id, request_type, building_id, unit_id, organization_type, organization_id, notes, status, decided_by, decided_at, created_at \
         FROM access_requests WHERE id = ?",
    )
    .bind(request_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("access request not found"))?;

    row.try_into()
}
