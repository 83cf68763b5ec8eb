use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use tempfile::tempdir;
use tower::util::ServiceExt;
use uuid::Uuid;

use hale::create_app;
use hale::jwt::JwtConfig;

async fn setup() -> Result<(tempfile::TempDir, SqlitePool, Router)> {
    let dir = tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test_subscriptions.db");
    use sqlx::sqlite::SqliteConnectOptions;
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    )
    .await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool.clone()).await?;

    Ok((dir, pool, app))
}

async fn seed_user(pool: &SqlitePool, role: &str) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role, created_at, updated_at) VALUES (?, ?, ?, 'unused', ?, ?, ?)",
    )
    .bind(id)
    .bind(format!("{role} user"))
    .bind(format!("{id}@example.com"))
    .bind(role)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id)
}

/// Building + document reachable by `user_id` through a direct grant.
async fn seed_document_for(pool: &SqlitePool, user_id: Uuid) -> Result<Uuid> {
    let now = Utc::now();
    let building = Uuid::new_v4();
    sqlx::query("INSERT INTO buildings (id, name, created_at, updated_at) VALUES (?, 'Hale Nui', ?, ?)")
        .bind(building)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

    sqlx::query(
        "INSERT INTO access_grants (id, subject_type, subject_id, resource_type, resource_id, created_at) VALUES (?, 'user', ?, 'building', ?, ?)",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(building)
    .bind(now)
    .execute(pool)
    .await?;

    let document = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO documents (id, building_id, title, storage_key, uploaded_by, created_at, updated_at) \
         VALUES (?, ?, 'House rules', 'docs/house-rules.pdf', ?, ?, ?)",
    )
    .bind(document)
    .bind(building)
    .bind(user_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(document)
}

fn token_for(user_id: Uuid, role: &str) -> String {
    JwtConfig::from_env().expect("jwt config").encode(user_id, role).expect("token")
}

async fn post_json(app: &Router, uri: &str, token: &str, payload: serde_json::Value) -> Result<Response> {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(payload.to_string()))?;
    Ok(app.clone().oneshot(req).await?)
}

#[tokio::test]
async fn gated_email_denied_then_allowed_after_trial() -> Result<()> {
    let (_dir, pool, app) = setup().await?;

    let hoa = seed_user(&pool, "hoa").await?;
    let token = token_for(hoa, "hoa");
    let document = seed_document_for(&pool, hoa).await?;

    // Gated: hoa requires a paid subscription and has none
    let resp = post_json(
        &app,
        &format!("/documents/{document}/email"),
        &token,
        json!({"recipient": "board@example.com"}),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED);
    let bytes = body::to_bytes(resp.into_body(), 1_048_576).await?;
    let payload: serde_json::Value = serde_json::from_slice(&bytes)?;
    assert_eq!(payload["error"], "subscription_required");
    // the current tier rides along for the upgrade prompt
    assert!(payload["message"].as_str().unwrap_or_default().contains("free"));

    // Trial makes the role temporarily active
    let resp = post_json(
        &app,
        "/subscriptions/me/start-trial",
        &token,
        json!({"trial_days": 14}),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = post_json(
        &app,
        &format!("/documents/{document}/email"),
        &token,
        json!({"recipient": "board@example.com"}),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn double_trial_start_is_rejected_without_duplicate_rows() -> Result<()> {
    let (_dir, pool, app) = setup().await?;
    let hoa = seed_user(&pool, "hoa").await?;
    let token = token_for(hoa, "hoa");

    let resp = post_json(&app, "/subscriptions/me/start-trial", &token, json!({})).await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = post_json(&app, "/subscriptions/me/start-trial", &token, json!({})).await?;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let bytes = body::to_bytes(resp.into_body(), 1_048_576).await?;
    let payload: serde_json::Value = serde_json::from_slice(&bytes)?;
    assert!(payload["message"]
        .as_str()
        .unwrap_or_default()
        .contains("already active"));

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM subscriptions WHERE subject_id = ?")
        .bind(hoa)
        .fetch_one(&pool)
        .await?;
    assert_eq!(rows, 1);

    Ok(())
}

#[tokio::test]
async fn trial_duration_bounds_are_enforced() -> Result<()> {
    let (_dir, pool, app) = setup().await?;
    let manager = seed_user(&pool, "property_manager").await?;
    let token = token_for(manager, "property_manager");

    // over the self-service ceiling
    let resp = post_json(
        &app,
        "/subscriptions/me/start-trial",
        &token,
        json!({"trial_days": 365}),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // under the self-service floor
    let resp = post_json(
        &app,
        "/subscriptions/me/start-trial",
        &token,
        json!({"trial_days": 1}),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // admins may grant beyond the self-service ceiling
    let admin = seed_user(&pool, "admin").await?;
    let admin_token = token_for(admin, "admin");
    let resp = post_json(
        &app,
        &format!("/subscriptions/users/{manager}/start-trial"),
        &admin_token,
        json!({"trial_days": 60}),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    Ok(())
}

#[tokio::test]
async fn my_subscription_reports_the_trial_record() -> Result<()> {
    let (_dir, pool, app) = setup().await?;
    let hoa = seed_user(&pool, "hoa").await?;
    let token = token_for(hoa, "hoa");

    // nothing yet
    let req = Request::builder()
        .method("GET")
        .uri("/subscriptions/me")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = post_json(&app, "/subscriptions/me/start-trial", &token, json!({})).await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let req = Request::builder()
        .method("GET")
        .uri("/subscriptions/me")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), 1_048_576).await?;
    let record: serde_json::Value = serde_json::from_slice(&bytes)?;
    assert_eq!(record["is_trial"], true);
    assert_eq!(record["status"], "trialing");
    assert_eq!(record["tier"], "free");

    Ok(())
}

#[tokio::test]
async fn admin_roles_bypass_the_subscription_gate() -> Result<()> {
    let (_dir, pool, app) = setup().await?;

    let admin = seed_user(&pool, "admin").await?;
    let token = token_for(admin, "admin");
    let document = seed_document_for(&pool, admin).await?;

    let resp = post_json(
        &app,
        &format!("/documents/{document}/email"),
        &token,
        json!({"recipient": "board@example.com"}),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    Ok(())
}
