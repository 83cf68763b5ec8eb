use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::json;
use sqlx::SqlitePool;
use tempfile::tempdir;
use tower::util::ServiceExt;

use hale::create_app;

async fn setup() -> Result<(tempfile::TempDir, SqlitePool, Router)> {
    let dir = tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test_auth.db");
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

fn post(uri: &str, payload: &serde_json::Value) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))?)
}

#[tokio::test]
async fn register_login_me_flow() -> Result<()> {
    let (_dir, _pool, app) = setup().await?;

    // short password rejected
    let resp: Response = app
        .clone()
        .oneshot(post(
            "/auth/register",
            &json!({"name": "A", "email": "a@example.com", "password": "short"}),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // privileged roles cannot be self-selected
    let resp: Response = app
        .clone()
        .oneshot(post(
            "/auth/register",
            &json!({"name": "A", "email": "a@example.com", "password": "password123", "role": "admin"}),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // valid registration defaults to owner
    let resp: Response = app
        .clone()
        .oneshot(post(
            "/auth/register",
            &json!({"name": "Leilani", "email": "leilani@example.com", "password": "password123"}),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let bytes = body::to_bytes(resp.into_body(), 1_048_576).await?;
    let auth: serde_json::Value = serde_json::from_slice(&bytes)?;
    let token = auth["token"].as_str().context("token")?.to_string();
    assert_eq!(auth["user"]["role"], "owner");

    // duplicate email conflicts
    let resp: Response = app
        .clone()
        .oneshot(post(
            "/auth/register",
            &json!({"name": "Other", "email": "leilani@example.com", "password": "password123"}),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // wrong password unauthorized
    let resp: Response = app
        .clone()
        .oneshot(post(
            "/auth/login",
            &json!({"email": "leilani@example.com", "password": "wrongpassword"}),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // correct login
    let resp: Response = app
        .clone()
        .oneshot(post(
            "/auth/login",
            &json!({"email": "leilani@example.com", "password": "password123"}),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // token reaches /auth/me
    let req = Request::builder()
        .method("GET")
        .uri("/auth/me")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // missing token is unauthorized
    let req = Request::builder().method("GET").uri("/auth/me").body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn login_attempts_are_rate_limited_per_origin() -> Result<()> {
    let (_dir, _pool, app) = setup().await?;

    let payload = json!({"email": "nobody@example.com", "password": "password123"});

    // ten attempts from one origin pass the limiter (and fail auth)
    for _ in 0..10 {
        let req = Request::builder()
            .method("POST")
            .uri("/auth/login")
            .header("content-type", "application/json")
            .header("x-forwarded-for", "203.0.113.7")
            .body(Body::from(payload.to_string()))?;
        let resp: Response = app.clone().oneshot(req).await?;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    // the eleventh is throttled with retry metadata
    let req = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json")
        .header("x-forwarded-for", "203.0.113.7")
        .body(Body::from(payload.to_string()))?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        resp.headers().get("retry-after").and_then(|v| v.to_str().ok()),
        Some("60")
    );
    assert_eq!(
        resp.headers().get("x-ratelimit-limit").and_then(|v| v.to_str().ok()),
        Some("10")
    );

    // a different origin is unaffected
    let req = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json")
        .header("x-forwarded-for", "198.51.100.4")
        .body(Body::from(payload.to_string()))?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn password_reset_does_not_leak_account_existence() -> Result<()> {
    let (_dir, _pool, app) = setup().await?;

    let resp: Response = app
        .clone()
        .oneshot(post(
            "/auth/register",
            &json!({"name": "Known", "email": "known@example.com", "password": "password123"}),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    for email in ["known@example.com", "unknown@example.com"] {
        let req = Request::builder()
            .method("POST")
            .uri("/auth/password-reset")
            .header("content-type", "application/json")
            .header("x-forwarded-for", email) // separate limiter buckets
            .body(Body::from(json!({"email": email}).to_string()))?;
        let resp: Response = app.clone().oneshot(req).await?;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    Ok(())
}
