use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use sqlx::SqlitePool;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{require_entitlement, require_permission, Principal};
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::models::document::{
    DbDocument, Document, DocumentCreateRequest, DocumentEmailRequest, DocumentUpdateRequest,
};
use crate::notify::send_now;
use crate::utils::utc_now;

#[derive(Debug, Deserialize, IntoParams)]
pub struct DocumentListParams {
    pub building_id: Option<Uuid>,
    pub limit: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/documents",
    tag = "Documents",
    params(DocumentListParams),
    responses((status = 200, description = "List documents", body = [Document]))
)]
pub async fn list_documents(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<DocumentListParams>,
) -> AppResult<Json<Vec<Document>>> {
    require_permission(&principal, "documents:read")?;

    let limit = params.limit.unwrap_or(100).clamp(1, 500);

    let documents = match params.building_id {
        Some(building_id) => {
            state.resolver.require_building_access(&principal, building_id).await?;
            sqlx::query_as::<_, DbDocument>(
                "SELECT id, building_id, unit_id, event_id, title, category, storage_key, uploaded_by, created_at, updated_at \
                 FROM documents WHERE building_id = ? ORDER BY created_at DESC LIMIT ?",
            )
            .bind(building_id)
            .bind(limit)
            .fetch_all(&state.pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, DbDocument>(
                "SELECT id, building_id, unit_id, event_id, title, category, storage_key, uploaded_by, created_at, updated_at \
                 FROM documents ORDER BY created_at DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&state.pool)
            .await?
        }
    };

    Ok(Json(documents.into_iter().map(Document::from).collect()))
}

#[utoipa::path(
    post,
    path = "/documents",
    tag = "Documents",
    request_body = DocumentCreateRequest,
    responses((status = 201, description = "Document registered", body = Document))
)]
pub async fn create_document(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<DocumentCreateRequest>,
) -> AppResult<(StatusCode, Json<Document>)> {
    require_permission(&principal, "documents:write")?;
    state
        .resolver
        .require_building_access(&principal, payload.building_id)
        .await?;

    // An event reference must belong to the same building.
    if let Some(event_id) = payload.event_id {
        let event_building: Option<Uuid> =
            sqlx::query_scalar("SELECT building_id FROM building_events WHERE id = ?")
                .bind(event_id)
                .fetch_optional(&state.pool)
                .await?;
        match event_building {
            None => return Err(AppError::not_found(format!("event {event_id} not found"))),
            Some(b) if b != payload.building_id => {
                return Err(AppError::bad_request("event does not belong to this building"))
            }
            Some(_) => {}
        }
    }

    let now = utc_now();
    let document_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO documents (id, building_id, unit_id, event_id, title, category, storage_key, uploaded_by, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(document_id)
    .bind(payload.building_id)
    .bind(payload.unit_id)
    .bind(payload.event_id)
    .bind(&payload.title)
    .bind(&payload.category)
    .bind(&payload.storage_key)
    .bind(principal.user_id)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let document = Document::from(fetch_document(&state.pool, document_id).await?);
    log_activity(&state.event_bus, "created", Some(principal.user_id), &document);

    Ok((StatusCode::CREATED, Json(document)))
}

#[utoipa::path(
    get,
    path = "/documents/{id}",
    tag = "Documents",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "Document detail", body = Document),
        (status = 404, description = "Document does not exist")
    )
)]
pub async fn get_document(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Document>> {
    require_permission(&principal, "documents:read")?;
    state.resolver.require_document_access(&principal, id).await?;

    let document = Document::from(fetch_document(&state.pool, id).await?);
    Ok(Json(document))
}

#[utoipa::path(
    put,
    path = "/documents/{id}",
    tag = "Documents",
    params(("id" = Uuid, Path, description = "Document id")),
    request_body = DocumentUpdateRequest,
    responses((status = 200, description = "Document updated", body = Document))
)]
pub async fn update_document(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(payload): Json<DocumentUpdateRequest>,
) -> AppResult<Json<Document>> {
    require_permission(&principal, "documents:write")?;
    state.resolver.require_document_access(&principal, id).await?;

    let mut document = fetch_document(&state.pool, id).await?;

    if let Some(title) = payload.title {
        document.title = title;
    }
    if payload.category.is_some() {
        document.category = payload.category;
    }

    let now = utc_now();
    sqlx::query("UPDATE documents SET title = ?, category = ?, updated_at = ? WHERE id = ?")
        .bind(&document.title)
        .bind(&document.category)
        .bind(now)
        .bind(id)
        .execute(&state.pool)
        .await?;

    document.updated_at = now;
    let document = Document::from(document);
    log_activity(&state.event_bus, "updated", Some(principal.user_id), &document);

    Ok(Json(document))
}

#[utoipa::path(
    post,
    path = "/documents/{id}/email",
    tag = "Documents",
    params(("id" = Uuid, Path, description = "Document id")),
    request_body = DocumentEmailRequest,
    responses(
        (status = 200, description = "Document sent"),
        (status = 402, description = "Active subscription required"),
        (status = 502, description = "Delivery failed")
    )
)]
pub async fn email_document(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(payload): Json<DocumentEmailRequest>,
) -> AppResult<Json<Document>> {
    require_permission(&principal, "documents:read")?;
    state.resolver.require_document_access(&principal, id).await?;

    // Sending documents by email is a gated feature.
    require_entitlement(&principal, "documents:email")?;

    let document = Document::from(fetch_document(&state.pool, id).await?);

    let body = match payload.note.as_deref() {
        Some(note) => format!("{note}\n\nDocument: {} ({})", document.title, document.storage_key),
        None => format!("Document: {} ({})", document.title, document.storage_key),
    };

    // Explicitly requested send: a delivery failure fails the request.
    send_now(
        state.notifier.as_ref(),
        &payload.recipient,
        &format!("Document shared: {}", document.title),
        &body,
    )
    .await?;

    log_activity(&state.event_bus, "emailed", Some(principal.user_id), &document);

    Ok(Json(document))
}

async fn fetch_document(pool: &SqlitePool, document_id: Uuid) -> AppResult<DbDocument> {
    sqlx::query_as::<_, DbDocument>(
        "SELECT id, building_id, unit_id, event_id, title, category, storage_key, uploaded_by, created_at, updated_at \
         FROM documents WHERE id = ?",
    )
    .bind(document_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("document not found"))
}
