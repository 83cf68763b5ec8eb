use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::Principal;
use crate::errors::{AppError, AppResult};
use crate::models::message::{DbMessage, Message, SendMessageRequest};
use crate::notify::send_receipt;
use crate::utils::utc_now;

const MESSAGE_MAX_PER_WINDOW: usize = 10;
const MESSAGE_WINDOW: Duration = Duration::from_secs(60);

#[utoipa::path(
    get,
    path = "/messages",
    tag = "Messages",
    responses((status = 200, description = "Inbox for the caller", body = [Message]))
)]
pub async fn list_messages(
    State(state): State<AppState>,
    principal: Principal,
) -> AppResult<Json<Vec<Message>>> {
    let messages = sqlx::query_as::<_, DbMessage>(
        "SELECT id, sender_user_id, recipient_user_id, building_id, subject, body, created_at \
         FROM messages WHERE recipient_user_id = ? OR sender_user_id = ? ORDER BY created_at DESC",
    )
    .bind(principal.user_id)
    .bind(principal.user_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(messages.into_iter().map(Message::from).collect()))
}

#[utoipa::path(
    post,
    path = "/messages",
    tag = "Messages",
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message sent", body = Message),
        (status = 404, description = "Recipient does not exist"),
        (status = 429, description = "Sending too fast")
    )
)]
pub async fn send_message(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<Message>)> {
    // Messaging is a sensitive endpoint: throttled per sender.
    let identifier = format!("msg:{}", principal.user_id);
    state
        .rate_limiter
        .enforce(&identifier, MESSAGE_MAX_PER_WINDOW, MESSAGE_WINDOW)?;

    let recipient_email: Option<String> =
        sqlx::query_scalar("SELECT email FROM users WHERE id = ? AND deleted_at IS NULL")
            .bind(payload.recipient_user_id)
            .fetch_optional(&state.pool)
            .await?;

    let Some(recipient_email) = recipient_email else {
        return Err(AppError::not_found(format!(
            "user {} not found",
            payload.recipient_user_id
        )));
    };

    if let Some(building_id) = payload.building_id {
        state
            .resolver
            .require_building_access(&principal, building_id)
            .await?;
    }

    let message_id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO messages (id, sender_user_id, recipient_user_id, building_id, subject, body, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(message_id)
    .bind(principal.user_id)
    .bind(payload.recipient_user_id)
    .bind(payload.building_id)
    .bind(&payload.subject)
    .bind(&payload.body)
    .bind(now)
    .execute(&state.pool)
    .await?;

    // Email copy is best-effort; the message row is the source of truth.
    send_receipt(
        state.notifier.as_ref(),
        &recipient_email,
        &format!("New message: {}", payload.subject),
        &payload.body,
    )
    .await;

    let message = Message {
        id: message_id,
        sender_user_id: principal.user_id,
        recipient_user_id: payload.recipient_user_id,
        building_id: payload.building_id,
        subject: payload.subject,
        body: payload.body,
        created_at: now,
    };

    Ok((StatusCode::CREATED, Json(message)))
}
