use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::Role;
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::jwt::AuthUser;
use crate::models::user::{AuthResponse, DbUser, LoginRequest, PasswordResetRequest, RegisterRequest, User};
use crate::notify::send_receipt;
use crate::rate_limit::client_identifier;
use crate::utils::{hash_password, utc_now, verify_password};

const LOGIN_MAX_ATTEMPTS: usize = 10;
const LOGIN_WINDOW: Duration = Duration::from_secs(60);
const RESET_MAX_ATTEMPTS: usize = 5;
const RESET_WINDOW: Duration = Duration::from_secs(300);

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    message: String,
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    ensure_email_available(&state.pool, &payload.email).await?;

    // Privileged roles are assigned by an admin, never self-selected.
    let role = match payload.role {
        Some(role) if role.is_self_service() => role,
        Some(role) => {
            return Err(AppError::bad_request(format!(
                "role '{role}' cannot be chosen at registration"
            )))
        }
        None => Role::Owner,
    };

    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();
    let user_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(password_hash)
    .bind(role.as_str())
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let db_user = fetch_user_by_id(&state.pool, user_id).await?;
    let user: User = db_user.try_into()?;
    let token = state.jwt.encode(user.id, user.role.as_str())?;

    log_activity(&state.event_bus, "registered", Some(user.id), &user);

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many attempts")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    // Credential guessing is throttled by origin, before any lookup.
    let identifier = format!("login:{}", client_identifier(&headers, None));
    state
        .rate_limiter
        .enforce(&identifier, LOGIN_MAX_ATTEMPTS, LOGIN_WINDOW)?;

    let db_user = sqlx::query_as::<_, DbUser>(
        "SELECT id, name, email, password_hash, role, permission_overrides, pm_company_id, aoao_organization_id, contractor_id, created_at, updated_at, deleted_at \
         FROM users WHERE email = ? AND deleted_at IS NULL",
    )
    .bind(&payload.email)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    let password_ok = verify_password(&payload.password, &db_user.password_hash)?;
    if !password_ok {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    let user: User = db_user.try_into()?;
    let token = state.jwt.encode(user.id, user.role.as_str())?;

    Ok(Json(AuthResponse { token, user }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses((status = 200, description = "Current user", body = User))
)]
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<User>> {
    let db_user = fetch_user_by_id(&state.pool, auth.user_id).await?;
    let user: User = db_user.try_into()?;
    Ok(Json(user))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    responses((status = 200, description = "Logout acknowledged"))
)]
pub async fn logout(_auth: AuthUser) -> AppResult<Json<MessageResponse>> {
    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/auth/password-reset",
    tag = "Auth",
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Reset email queued if the account exists"),
        (status = 429, description = "Too many attempts")
    )
)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<PasswordResetRequest>,
) -> AppResult<Json<MessageResponse>> {
    let identifier = format!("pwreset:{}", client_identifier(&headers, None));
    state
        .rate_limiter
        .enforce(&identifier, RESET_MAX_ATTEMPTS, RESET_WINDOW)?;

    // The response never reveals whether the account exists; delivery is
    // fire-and-forget.
    let known: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE email = ? AND deleted_at IS NULL")
        .bind(&payload.email)
        .fetch_optional(&state.pool)
        .await?;

    if known.is_some() {
        send_receipt(
            state.notifier.as_ref(),
            &payload.email,
            "Password reset requested",
            "Follow the link in this email to choose a new password.",
        )
        .await;
    }

    Ok(Json(MessageResponse {
        message: "If that account exists, a reset email is on its way".to_string(),
    }))
}

async fn ensure_email_available(pool: &SqlitePool, email: &str) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE email = ? AND deleted_at IS NULL")
        .bind(email)
        .fetch_one(pool)
        .await?;

    if count > 0 {
        return Err(AppError::conflict("email already in use"));
    }

    Ok(())
}

async fn fetch_user_by_id(pool: &SqlitePool, user_id: Uuid) -> AppResult<DbUser> {
    sqlx::query_as::<_, DbUser>(
        "SELECT id, name, email, password_hash, role, permission_overrides, pm_company_id, aoao_organization_id, contractor_id, created_at, updated_at, deleted_at \
         FROM users WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("user not found"))
}
