use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{require_role, Principal, Role};
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::models::unit::{DbUnit, Unit, UnitCreateRequest, UnitUpdateRequest};
use crate::utils::utc_now;

/// Unit management is restricted to admin and HOA-class roles; read access
/// goes through the grant resolver like any other resource.
const UNIT_MANAGER_ROLES: &[Role] = &[Role::SuperAdmin, Role::Admin, Role::Hoa];

#[utoipa::path(
    get,
    path = "/buildings/{id}/units",
    tag = "Units",
    params(("id" = Uuid, Path, description = "Building id")),
    responses((status = 200, description = "Units in the building", body = [Unit]))
)]
pub async fn list_building_units(
    State(state): State<AppState>,
    principal: Principal,
    Path(building_id): Path<Uuid>,
) -> AppResult<Json<Vec<Unit>>> {
    state.resolver.require_building_access(&principal, building_id).await?;

    let units = sqlx::query_as::<_, DbUnit>(
        "SELECT id, building_id, unit_number, floor, created_at, updated_at FROM units WHERE building_id = ? ORDER BY unit_number",
    )
    .bind(building_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(units.into_iter().map(Unit::from).collect()))
}

#[utoipa::path(
    post,
    path = "/units",
    tag = "Units",
    request_body = UnitCreateRequest,
    responses((status = 201, description = "Unit created", body = Unit))
)]
pub async fn create_unit(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<UnitCreateRequest>,
) -> AppResult<(StatusCode, Json<Unit>)> {
    require_role(&principal, UNIT_MANAGER_ROLES)?;

    // Building must exist before any insert is attempted.
    let exists: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM buildings WHERE id = ?")
        .bind(payload.building_id)
        .fetch_one(&state.pool)
        .await?;
    if exists == 0 {
        return Err(AppError::not_found(format!(
            "building {} not found",
            payload.building_id
        )));
    }

    let now = utc_now();
    let unit_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO units (id, building_id, unit_number, floor, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(unit_id)
    .bind(payload.building_id)
    .bind(&payload.unit_number)
    .bind(payload.floor)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let unit = Unit::from(fetch_unit(&state.pool, unit_id).await?);
    log_activity(&state.event_bus, "created", Some(principal.user_id), &unit);

    Ok((StatusCode::CREATED, Json(unit)))
}

#[utoipa::path(
    get,
    path = "/units/{id}",
    tag = "Units",
    params(("id" = Uuid, Path, description = "Unit id")),
    responses(
        (status = 200, description = "Unit detail", body = Unit),
        (status = 403, description = "No grant reaches this unit"),
        (status = 404, description = "Unit does not exist")
    )
)]
pub async fn get_unit(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Unit>> {
    state.resolver.require_unit_access(&principal, id).await?;

    let unit = Unit::from(fetch_unit(&state.pool, id).await?);
    Ok(Json(unit))
}

#[utoipa::path(
    put,
    path = "/units/{id}",
    tag = "Units",
    params(("id" = Uuid, Path, description = "Unit id")),
    request_body = UnitUpdateRequest,
    responses((status = 200, description = "Unit updated", body = Unit))
)]
pub async fn update_unit(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(payload): Json<UnitUpdateRequest>,
) -> AppResult<Json<Unit>> {
    require_role(&principal, UNIT_MANAGER_ROLES)?;

    let mut unit = fetch_unit(&state.pool, id).await?;

    if let Some(unit_number) = payload.unit_number {
        unit.unit_number = unit_number;
    }
    if payload.floor.is_some() {
        unit.floor = payload.floor;
    }

    let now = utc_now();
    sqlx::query("UPDATE units SET unit_number = ?, floor = ?, updated_at = ? WHERE id = ?")
        .bind(&unit.unit_number)
        .bind(unit.floor)
        .bind(now)
        .bind(id)
        .execute(&state.pool)
        .await?;

    unit.updated_at = now;
    let unit = Unit::from(unit);
    log_activity(&state.event_bus, "updated", Some(principal.user_id), &unit);

    Ok(Json(unit))
}

async fn fetch_unit(pool: &SqlitePool, unit_id: Uuid) -> AppResult<DbUnit> {
    sqlx::query_as::<_, DbUnit>(
        "SELECT id, building_id, unit_number, floor, created_at, updated_at FROM units WHERE id = ?",
    )
    .bind(unit_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("unit not found"))
}
