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
    let db_path = dir.path().join("test_billing.db");
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

async fn seed_paid_subscription(pool: &SqlitePool, subject_id: Uuid, role: &str, sub_ref: &str) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO subscriptions (id, subject_id, role, tier, status, is_trial, billing_customer_ref, billing_subscription_ref, created_at, updated_at) \
         VALUES (?, ?, ?, 'paid', 'active', 0, 'cus_test', ?, ?, ?)",
    )
    .bind(Uuid::new_v4())
    .bind(subject_id)
    .bind(role)
    .bind(sub_ref)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

fn token_for(user_id: Uuid, role: &str) -> String {
    JwtConfig::from_env().expect("jwt config").encode(user_id, role).expect("token")
}

#[tokio::test]
async fn webhook_updates_matching_record_and_skips_unknown() -> Result<()> {
    let (_dir, pool, app) = setup().await?;

    let hoa = seed_user(&pool, "hoa").await?;
    seed_paid_subscription(&pool, hoa, "hoa", "sub_live_1").await?;

    // cancellation event downgrades the record, never deletes it
    let event = json!({
        "event_type": "customer.subscription.deleted",
        "customer_ref": "cus_test",
        "subscription_ref": "sub_live_1",
        "status": "canceled",
    });
    let req = Request::builder()
        .method("POST")
        .uri("/billing/webhook")
        .header("content-type", "application/json")
        .body(Body::from(event.to_string()))?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), 1_048_576).await?;
    let ack: serde_json::Value = serde_json::from_slice(&bytes)?;
    assert_eq!(ack["matched"], true);

    let (tier, status): (String, String) =
        sqlx::query_as("SELECT tier, status FROM subscriptions WHERE subject_id = ?")
            .bind(hoa)
            .fetch_one(&pool)
            .await?;
    assert_eq!(tier, "free");
    assert_eq!(status, "canceled");

    // unknown references are acknowledged but not matched
    let unknown = json!({
        "event_type": "customer.subscription.updated",
        "subscription_ref": "sub_never_seen",
        "status": "active",
    });
    let req = Request::builder()
        .method("POST")
        .uri("/billing/webhook")
        .header("content-type", "application/json")
        .body(Body::from(unknown.to_string()))?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), 1_048_576).await?;
    let ack: serde_json::Value = serde_json::from_slice(&bytes)?;
    assert_eq!(ack["matched"], false);

    Ok(())
}

#[tokio::test]
async fn admin_sync_degrades_unverifiable_records_to_free() -> Result<()> {
    let (_dir, pool, app) = setup().await?;

    let manager = seed_user(&pool, "property_manager").await?;
    seed_paid_subscription(&pool, manager, "property_manager", "sub_live_2").await?;

    let admin = seed_user(&pool, "admin").await?;
    let token = token_for(admin, "admin");

    // the default billing collaborator is unconfigured, so verification
    // fails and the record degrades instead of erroring
    let req = Request::builder()
        .method("POST")
        .uri("/admin/sync")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), 1_048_576).await?;
    let outcome: serde_json::Value = serde_json::from_slice(&bytes)?;
    assert_eq!(outcome["outcome"], "completed");
    assert_eq!(outcome["checked"], 1);

    let tier: String = sqlx::query_scalar("SELECT tier FROM subscriptions WHERE subject_id = ?")
        .bind(manager)
        .fetch_one(&pool)
        .await?;
    assert_eq!(tier, "free");

    Ok(())
}

#[tokio::test]
async fn sync_trigger_requires_an_admin() -> Result<()> {
    let (_dir, pool, app) = setup().await?;

    let manager = seed_user(&pool, "property_manager").await?;
    let token = token_for(manager, "property_manager");

    let req = Request::builder()
        .method("POST")
        .uri("/admin/sync")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    Ok(())
}
