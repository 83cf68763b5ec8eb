use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{require_permission, Principal};
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::models::building::{Building, BuildingCreateRequest, BuildingUpdateRequest, DbBuilding};
use crate::utils::{blank_to_none, utc_now};

#[utoipa::path(
    get,
    path = "/buildings",
    tag = "Buildings",
    responses((status = 200, description = "List buildings", body = [Building]))
)]
pub async fn list_buildings(
    State(state): State<AppState>,
    principal: Principal,
) -> AppResult<Json<Vec<Building>>> {
    require_permission(&principal, "buildings:read")?;

    let buildings = sqlx::query_as::<_, DbBuilding>(
        "SELECT id, name, address, city, created_at, updated_at FROM buildings ORDER BY name",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(buildings.into_iter().map(Building::from).collect()))
}

#[utoipa::path(
    post,
    path = "/buildings",
    tag = "Buildings",
    request_body = BuildingCreateRequest,
    responses((status = 201, description = "Building created", body = Building))
)]
pub async fn create_building(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<BuildingCreateRequest>,
) -> AppResult<(StatusCode, Json<Building>)> {
    require_permission(&principal, "buildings:write")?;

    let now = utc_now();
    let building_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO buildings (id, name, address, city, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(building_id)
    .bind(&payload.name)
    .bind(blank_to_none(payload.address))
    .bind(blank_to_none(payload.city))
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let building = Building::from(fetch_building(&state.pool, building_id).await?);
    log_activity(&state.event_bus, "created", Some(principal.user_id), &building);

    Ok((StatusCode::CREATED, Json(building)))
}

#[utoipa::path(
    get,
    path = "/buildings/{id}",
    tag = "Buildings",
    params(("id" = Uuid, Path, description = "Building id")),
    responses(
        (status = 200, description = "Building detail", body = Building),
        (status = 403, description = "No grant reaches this building"),
        (status = 404, description = "Building does not exist")
    )
)]
pub async fn get_building(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Building>> {
    require_permission(&principal, "buildings:read")?;
    state.resolver.require_building_access(&principal, id).await?;

    let building = Building::from(fetch_building(&state.pool, id).await?);
    Ok(Json(building))
}

#[utoipa::path(
    put,
    path = "/buildings/{id}",
    tag = "Buildings",
    params(("id" = Uuid, Path, description = "Building id")),
    request_body = BuildingUpdateRequest,
    responses((status = 200, description = "Building updated", body = Building))
)]
pub async fn update_building(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(payload): Json<BuildingUpdateRequest>,
) -> AppResult<Json<Building>> {
    require_permission(&principal, "buildings:write")?;

    let mut building = fetch_building(&state.pool, id).await?;
    let before = Building::from(building.clone());

    if let Some(name) = payload.name {
        building.name = name;
    }
    if payload.address.is_some() {
        building.address = blank_to_none(payload.address);
    }
    if payload.city.is_some() {
        building.city = blank_to_none(payload.city);
    }

    let now = utc_now();
    sqlx::query("UPDATE buildings SET name = ?, address = ?, city = ?, updated_at = ? WHERE id = ?")
        .bind(&building.name)
        .bind(&building.address)
        .bind(&building.city)
        .bind(now)
        .bind(id)
        .execute(&state.pool)
        .await?;

    building.updated_at = now;
    let building = Building::from(building);

    crate::events::log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(principal.user_id),
        &building,
        Some(&before),
        None,
    );

    Ok(Json(building))
}

#[utoipa::path(
    delete,
    path = "/buildings/{id}",
    tag = "Buildings",
    params(("id" = Uuid, Path, description = "Building id")),
    responses((status = 204, description = "Building deleted"))
)]
pub async fn delete_building(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require_permission(&principal, "buildings:write")?;

    let building = Building::from(fetch_building(&state.pool, id).await?);

    let affected = sqlx::query("DELETE FROM buildings WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::not_found("building not found"));
    }

    log_activity(&state.event_bus, "deleted", Some(principal.user_id), &building);

    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_building(pool: &SqlitePool, building_id: Uuid) -> AppResult<DbBuilding> {
    sqlx::query_as::<_, DbBuilding>(
        "SELECT id, name, address, city, created_at, updated_at FROM buildings WHERE id = ?",
    )
    .bind(building_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("building not found"))
}
