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
    let db_path = dir.path().join("test_unit_flow.db");
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

fn token_for(user_id: Uuid, role: &str) -> String {
    JwtConfig::from_env().expect("jwt config").encode(user_id, role).expect("token")
}

/// End-to-end: an owner with no affiliation and no grant cannot see a unit;
/// filing a unit access request and having an admin approve it creates a
/// direct grant, after which the unit is reachable.
#[tokio::test]
async fn owner_unit_request_approval_flow() -> Result<()> {
    let (_dir, pool, app) = setup().await?;

    let now = Utc::now();
    let building = Uuid::new_v4();
    sqlx::query("INSERT INTO buildings (id, name, created_at, updated_at) VALUES (?, 'Hale Moana', ?, ?)")
        .bind(building)
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await?;

    let unit = Uuid::new_v4();
    sqlx::query("INSERT INTO units (id, building_id, unit_number, created_at, updated_at) VALUES (?, ?, '804', ?, ?)")
        .bind(unit)
        .bind(building)
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await?;

    let owner = seed_user(&pool, "owner").await?;
    let owner_token = token_for(owner, "owner");

    // 1. denied: no affiliation, no grant
    let req = Request::builder()
        .method("GET")
        .uri(format!("/units/{unit}"))
        .header("authorization", format!("Bearer {owner_token}"))
        .body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // 2. file a unit access request
    let req = Request::builder()
        .method("POST")
        .uri("/access/requests")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {owner_token}"))
        .body(Body::from(
            json!({"request_type": "unit", "unit_id": unit, "notes": "I own this unit"}).to_string(),
        ))?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let bytes = body::to_bytes(resp.into_body(), 1_048_576).await?;
    let request: serde_json::Value = serde_json::from_slice(&bytes)?;
    let request_id = request["id"].as_str().context("request id")?.to_string();
    assert_eq!(request["status"], "pending");

    // 3. admin approves; a direct user grant materializes
    let admin = seed_user(&pool, "admin").await?;
    let admin_token = token_for(admin, "admin");
    let req = Request::builder()
        .method("POST")
        .uri(format!("/access/requests/{request_id}/approve"))
        .header("authorization", format!("Bearer {admin_token}"))
        .body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), 1_048_576).await?;
    let decided: serde_json::Value = serde_json::from_slice(&bytes)?;
    assert_eq!(decided["status"], "approved");

    let grants: i64 = sqlx::query_scalar(
        "SELECT COUNT(1) FROM access_grants WHERE subject_type = 'user' AND subject_id = ? AND resource_type = 'unit' AND resource_id = ?",
    )
    .bind(owner)
    .bind(unit)
    .fetch_one(&pool)
    .await?;
    assert_eq!(grants, 1);

    // 4. the unit is now reachable
    let req = Request::builder()
        .method("GET")
        .uri(format!("/units/{unit}"))
        .header("authorization", format!("Bearer {owner_token}"))
        .body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn second_approval_of_same_request_conflicts() -> Result<()> {
    let (_dir, pool, app) = setup().await?;

    let now = Utc::now();
    let building = Uuid::new_v4();
    sqlx::query("INSERT INTO buildings (id, name, created_at, updated_at) VALUES (?, 'Hale Lani', ?, ?)")
        .bind(building)
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await?;

    let owner = seed_user(&pool, "owner").await?;
    let owner_token = token_for(owner, "owner");
    let admin = seed_user(&pool, "admin").await?;
    let admin_token = token_for(admin, "admin");

    let req = Request::builder()
        .method("POST")
        .uri("/access/requests")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {owner_token}"))
        .body(Body::from(
            json!({"request_type": "building", "building_id": building}).to_string(),
        ))?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let bytes = body::to_bytes(resp.into_body(), 1_048_576).await?;
    let request: serde_json::Value = serde_json::from_slice(&bytes)?;
    let request_id = request["id"].as_str().context("request id")?.to_string();

    for expected in [StatusCode::OK, StatusCode::CONFLICT] {
        let req = Request::builder()
            .method("POST")
            .uri(format!("/access/requests/{request_id}/approve"))
            .header("authorization", format!("Bearer {admin_token}"))
            .body(Body::empty())?;
        let resp: Response = app.clone().oneshot(req).await?;
        assert_eq!(resp.status(), expected);
    }

    Ok(())
}

#[tokio::test]
async fn request_for_missing_resource_is_not_found() -> Result<()> {
    let (_dir, pool, app) = setup().await?;
    let owner = seed_user(&pool, "owner").await?;
    let token = token_for(owner, "owner");

    let req = Request::builder()
        .method("POST")
        .uri("/access/requests")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(
            json!({"request_type": "building", "building_id": Uuid::new_v4()}).to_string(),
        ))?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    Ok(())
}
