use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{require_permission, Principal, Role};
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::models::contractor::{Contractor, ContractorCreateRequest, ContractorUpdateRequest, DbContractor};
use crate::utils::{blank_to_none, utc_now};

/// Contractor-role principals may only read their own directory record;
/// everyone else with contractors:read sees the whole directory.
fn ensure_directory_scope(principal: &Principal, contractor_id: Uuid) -> AppResult<()> {
    if matches!(principal.role, Role::Contractor | Role::ContractorStaff) {
        if principal.contractor_id != Some(contractor_id) {
            return Err(AppError::forbidden("contractors may only access their own record"));
        }
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/contractors",
    tag = "Contractors",
    responses((status = 200, description = "Contractor directory", body = [Contractor]))
)]
pub async fn list_contractors(
    State(state): State<AppState>,
    principal: Principal,
) -> AppResult<Json<Vec<Contractor>>> {
    require_permission(&principal, "contractors:read")?;

    // The directory narrows to the caller's own record for contractor roles.
    let contractors = if matches!(principal.role, Role::Contractor | Role::ContractorStaff) {
        match principal.contractor_id {
            Some(own_id) => {
                sqlx::query_as::<_, DbContractor>(
                    "SELECT id, name, email, phone, trade, created_at, updated_at FROM contractors WHERE id = ?",
                )
                .bind(own_id)
                .fetch_all(&state.pool)
                .await?
            }
            None => Vec::new(),
        }
    } else {
        sqlx::query_as::<_, DbContractor>(
            "SELECT id, name, email, phone, trade, created_at, updated_at FROM contractors ORDER BY name",
        )
        .fetch_all(&state.pool)
        .await?
    };

    Ok(Json(contractors.into_iter().map(Contractor::from).collect()))
}

#[utoipa::path(
    post,
    path = "/contractors",
    tag = "Contractors",
    request_body = ContractorCreateRequest,
    responses((status = 201, description = "Contractor added", body = Contractor))
)]
pub async fn create_contractor(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<ContractorCreateRequest>,
) -> AppResult<(StatusCode, Json<Contractor>)> {
    require_permission(&principal, "contractors:write")?;

    let now = utc_now();
    let contractor_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO contractors (id, name, email, phone, trade, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(contractor_id)
    .bind(&payload.name)
    .bind(blank_to_none(payload.email))
    .bind(blank_to_none(payload.phone))
    .bind(blank_to_none(payload.trade))
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let contractor = Contractor::from(fetch_contractor(&state.pool, contractor_id).await?);
    log_activity(&state.event_bus, "created", Some(principal.user_id), &contractor);

    Ok((StatusCode::CREATED, Json(contractor)))
}

#[utoipa::path(
    get,
    path = "/contractors/{id}",
    tag = "Contractors",
    params(("id" = Uuid, Path, description = "Contractor id")),
    responses(
        (status = 200, description = "Contractor detail", body = Contractor),
        (status = 403, description = "Contractors may only read their own record"),
        (status = 404, description = "Contractor does not exist")
    )
)]
pub async fn get_contractor(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Contractor>> {
    require_permission(&principal, "contractors:read")?;
    ensure_directory_scope(&principal, id)?;

    let contractor = Contractor::from(fetch_contractor(&state.pool, id).await?);
    Ok(Json(contractor))
}

#[utoipa::path(
    put,
    path = "/contractors/{id}",
    tag = "Contractors",
    params(("id" = Uuid, Path, description = "Contractor id")),
    request_body = ContractorUpdateRequest,
    responses((status = 200, description = "Contractor updated", body = Contractor))
)]
pub async fn update_contractor(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(payload): Json<ContractorUpdateRequest>,
) -> AppResult<Json<Contractor>> {
    require_permission(&principal, "contractors:write")?;

    let mut contractor = fetch_contractor(&state.pool, id).await?;

    if let Some(name) = payload.name {
        contractor.name = name;
    }
    if payload.email.is_some() {
        contractor.email = blank_to_none(payload.email);
    }
    if payload.phone.is_some() {
        contractor.phone = blank_to_none(payload.phone);
    }
    if payload.trade.is_some() {
        contractor.trade = blank_to_none(payload.trade);
    }

    let now = utc_now();
    sqlx::query("UPDATE contractors SET name = ?, email = ?, phone = ?, trade = ?, updated_at = ? WHERE id = ?")
        .bind(&contractor.name)
        .bind(&contractor.email)
        .bind(&contractor.phone)
        .bind(&contractor.trade)
        .bind(now)
        .bind(id)
        .execute(&state.pool)
        .await?;

    contractor.updated_at = now;
    let contractor = Contractor::from(contractor);
    log_activity(&state.event_bus, "updated", Some(principal.user_id), &contractor);

    Ok(Json(contractor))
}

async fn fetch_contractor(pool: &SqlitePool, contractor_id: Uuid) -> AppResult<DbContractor> {
    sqlx::query_as::<_, DbContractor>(
        "SELECT id, name, email, phone, trade, created_at, updated_at FROM contractors WHERE id = ?",
    )
    .bind(contractor_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("contractor not found"))
}
