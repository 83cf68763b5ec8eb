use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use sqlx::SqlitePool;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{require_permission, require_role, Principal, Role};
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::models::building_event::{
    BuildingEvent, BuildingEventCreateRequest, BuildingEventUpdateRequest, DbBuildingEvent,
};
use crate::utils::utc_now;

#[derive(Debug, Deserialize, IntoParams)]
pub struct EventListParams {
    pub building_id: Option<Uuid>,
    pub limit: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/events",
    tag = "Events",
    params(EventListParams),
    responses((status = 200, description = "List events", body = [BuildingEvent]))
)]
pub async fn list_events(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<EventListParams>,
) -> AppResult<Json<Vec<BuildingEvent>>> {
    require_permission(&principal, "events:read")?;

    let limit = params.limit.unwrap_or(200).clamp(1, 500);

    let events = match params.building_id {
        Some(building_id) => {
            state.resolver.require_building_access(&principal, building_id).await?;
            sqlx::query_as::<_, DbBuildingEvent>(
                "SELECT id, building_id, unit_id, contractor_id, event_type, title, description, event_date, created_by, created_at, updated_at \
                 FROM building_events WHERE building_id = ? ORDER BY created_at DESC LIMIT ?",
            )
            .bind(building_id)
            .bind(limit)
            .fetch_all(&state.pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, DbBuildingEvent>(
                "SELECT id, building_id, unit_id, contractor_id, event_type, title, description, event_date, created_by, created_at, updated_at \
                 FROM building_events ORDER BY created_at DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&state.pool)
            .await?
        }
    };

    Ok(Json(events.into_iter().map(BuildingEvent::from).collect()))
}

#[utoipa::path(
    post,
    path = "/events",
    tag = "Events",
    request_body = BuildingEventCreateRequest,
    responses((status = 201, description = "Event created", body = BuildingEvent))
)]
pub async fn create_event(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<BuildingEventCreateRequest>,
) -> AppResult<(StatusCode, Json<BuildingEvent>)> {
    require_permission(&principal, "events:write")?;
    state
        .resolver
        .require_building_access(&principal, payload.building_id)
        .await?;

    let now = utc_now();
    let event_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO building_events (id, building_id, unit_id, contractor_id, event_type, title, description, event_date, created_by, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(event_id)
    .bind(payload.building_id)
    .bind(payload.unit_id)
    .bind(payload.contractor_id)
    .bind(&payload.event_type)
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(payload.event_date)
    .bind(principal.user_id)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let event = BuildingEvent::from(fetch_event(&state.pool, event_id).await?);
    log_activity(&state.event_bus, "created", Some(principal.user_id), &event);

    Ok((StatusCode::CREATED, Json(event)))
}

#[utoipa::path(
    get,
    path = "/events/{id}",
    tag = "Events",
    params(("id" = Uuid, Path, description = "Event id")),
    responses(
        (status = 200, description = "Event detail", body = BuildingEvent),
        (status = 404, description = "Event does not exist")
    )
)]
pub async fn get_event(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BuildingEvent>> {
    require_permission(&principal, "events:read")?;
    state.resolver.require_event_access(&principal, id).await?;

    let event = BuildingEvent::from(fetch_event(&state.pool, id).await?);
    Ok(Json(event))
}

#[utoipa::path(
    put,
    path = "/events/{id}",
    tag = "Events",
    params(("id" = Uuid, Path, description = "Event id")),
    request_body = BuildingEventUpdateRequest,
    responses((status = 200, description = "Event updated", body = BuildingEvent))
)]
pub async fn update_event(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(payload): Json<BuildingEventUpdateRequest>,
) -> AppResult<Json<BuildingEvent>> {
    require_permission(&principal, "events:write")?;
    state.resolver.require_event_access(&principal, id).await?;

    let mut event = fetch_event(&state.pool, id).await?;

    if let Some(event_type) = payload.event_type {
        event.event_type = event_type;
    }
    if let Some(title) = payload.title {
        event.title = title;
    }
    if payload.description.is_some() {
        event.description = payload.description;
    }
    if payload.event_date.is_some() {
        event.event_date = payload.event_date;
    }
    if payload.contractor_id.is_some() {
        event.contractor_id = payload.contractor_id;
    }

    let now = utc_now();
    sqlx::query(
        "UPDATE building_events SET event_type = ?, title = ?, description = ?, event_date = ?, contractor_id = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&event.event_type)
    .bind(&event.title)
    .bind(&event.description)
    .bind(event.event_date)
    .bind(event.contractor_id)
    .bind(now)
    .bind(id)
    .execute(&state.pool)
    .await?;

    event.updated_at = now;
    let event = BuildingEvent::from(event);
    log_activity(&state.event_bus, "updated", Some(principal.user_id), &event);

    Ok(Json(event))
}

#[utoipa::path(
    delete,
    path = "/events/{id}",
    tag = "Events",
    params(("id" = Uuid, Path, description = "Event id")),
    responses((status = 204, description = "Event deleted"))
)]
pub async fn delete_event(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    // Deleting history is admin-only regardless of building access.
    require_role(&principal, &[Role::SuperAdmin, Role::Admin])?;

    let event = BuildingEvent::from(fetch_event(&state.pool, id).await?);

    sqlx::query("DELETE FROM building_events WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;

    log_activity(&state.event_bus, "deleted", Some(principal.user_id), &event);

    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_event(pool: &SqlitePool, event_id: Uuid) -> AppResult<DbBuildingEvent> {
    sqlx::query_as::<_, DbBuildingEvent>(
        "SELECT id, building_id, unit_id, contractor_id, event_type, title, description, event_date, created_by, created_at, updated_at \
         FROM building_events WHERE id = ?",
    )
    .bind(event_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("event not found"))
}
