//! Activity journal: domain events go out on a broadcast bus and a
//! listener projects them into `activity_log` (queryable) and
//! `event_store` (append-only, hash-chained). Journal failures are logged
//! and never break the request that emitted the event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod loggable;
pub use loggable::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent<T> {
    pub id: Uuid,
    pub name: &'static str,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub payload: T,
}

impl<T> DomainEvent<T> {
    pub fn new(name: &'static str, actor_id: Option<Uuid>, subject_id: Option<Uuid>, payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            occurred_at: Utc::now(),
            actor_id,
            subject_id,
            payload,
        }
    }
}

pub type EventBus = broadcast::Sender<Value>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<Value>) {
    broadcast::channel(1024)
}

/// Request context captured for the journal (origin IP, user agent).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        let ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from)
            });

        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Self { ip, user_agent }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityPayload {
    /// Current state of the entity
    #[serde(rename = "new")]
    pub current: Value,
    /// Previous state for update/delete actions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<RequestContext>,
    pub severity: Severity,
}

pub fn log_activity<T: Loggable>(
    event_bus: &EventBus,
    action: &str,
    actor_id: Option<Uuid>,
    entity: &T,
) {
    log_activity_with_context(event_bus, action, actor_id, entity, None, None);
}

pub fn log_activity_with_context<T: Loggable>(
    event_bus: &EventBus,
    action: &str,
    actor_id: Option<Uuid>,
    entity: &T,
    old_entity: Option<&T>,
    context: Option<RequestContext>,
) {
    let event_name = format!("{}.{}", T::entity_type(), action);

    // DomainEvent wants a 'static name; event names are a small bounded set
    // so leaking the formatted string is fine.
    let static_name: &'static str = Box::leak(event_name.into_boxed_str());

    let severity = entity.severity_for_action(action);
    let payload = ActivityPayload {
        current: serde_json::to_value(entity).unwrap_or_default(),
        old: old_entity.map(|e| serde_json::to_value(e).unwrap_or_default()),
        context,
        severity,
    };

    let event = DomainEvent::new(
        static_name,
        actor_id,
        Some(entity.subject_id()),
        serde_json::to_value(&payload).unwrap_or_default(),
    );

    // Fire and forget: journaling must never break the API path.
    let _ = event_bus.send(serde_json::to_value(event).unwrap_or_default());
}

fn describe(event_name: &str) -> &'static str {
    match event_name {
        "access_grant.created" => "Access grant created",
        "access_grant.revoked" => "Access grant revoked",
        "access_request.created" => "Access request filed",
        "access_request.approved" => "Access request approved",
        "access_request.rejected" => "Access request rejected",
        "subscription.trial_started" => "Trial started",
        "subscription.synced" => "Subscription synced with billing provider",
        "subscription.updated" => "Subscription updated",
        "building.created" => "Building created",
        "building.updated" => "Building updated",
        "building.deleted" => "Building deleted",
        "unit.created" => "Unit created",
        "unit.updated" => "Unit updated",
        "building_event.created" => "Building event recorded",
        "building_event.updated" => "Building event updated",
        "building_event.deleted" => "Building event deleted",
        "document.created" => "Document registered",
        "document.updated" => "Document updated",
        "document.emailed" => "Document sent by email",
        "contractor.created" => "Contractor added",
        "contractor.updated" => "Contractor updated",
        "user.registered" => "New user registered",
        _ => "System event",
    }
}

pub async fn start_activity_listener(mut rx: broadcast::Receiver<Value>, pool: SqlitePool) {
    tracing::info!("activity listener started");
    while let Ok(event) = rx.recv().await {
        let event_json = event.clone();

        let name = event.get("name").and_then(|v| v.as_str()).unwrap_or("unknown");
        let actor_id = event
            .get("actor_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());
        let subject_id = event
            .get("subject_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());
        let occurred_at = event
            .get("occurred_at")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        let severity = event
            .get("payload")
            .and_then(|p| p.get("severity"))
            .and_then(|s| s.as_str())
            .unwrap_or("important")
            .to_string();

        let properties = serde_json::to_string(&event_json).unwrap_or_default();

        let result = sqlx::query(
            "INSERT INTO activity_log (id, event_name, description, actor_id, subject_id, occurred_at, properties, severity) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(describe(name))
        .bind(actor_id)
        .bind(subject_id)
        .bind(occurred_at)
        .bind(&properties)
        .bind(&severity)
        .execute(&pool)
        .await;

        if let Err(e) = result {
            tracing::error!("failed to save activity log: {}", e);
        }

        // Append to the event store, chaining each entry to the previous
        // one's hash.
        let prev_hash: Option<String> =
            sqlx::query_scalar("SELECT hash FROM event_store ORDER BY created_at DESC LIMIT 1")
                .fetch_optional(&pool)
                .await
                .ok()
                .flatten();

        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        if let Some(ref ph) = prev_hash {
            hasher.update(ph.as_bytes());
        }
        hasher.update(properties.as_bytes());
        let hash = hex::encode(hasher.finalize());

        let store_result = sqlx::query(
            "INSERT INTO event_store (id, event_name, occurred_at, actor_id, subject_id, payload, severity, prev_hash, hash, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(occurred_at)
        .bind(actor_id)
        .bind(subject_id)
        .bind(&properties)
        .bind(&severity)
        .bind(&prev_hash)
        .bind(&hash)
        .bind(Utc::now())
        .execute(&pool)
        .await;

        if let Err(e) = store_result {
            tracing::error!("failed to append to event store: {}", e);
        }
    }
}
