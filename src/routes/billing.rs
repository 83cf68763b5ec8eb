use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::authz::{require_role, Principal, Role};
use crate::billing::BillingEvent;
use crate::errors::AppResult;
use crate::events::log_activity;
use crate::sync::{run_billing_sync, SyncOutcome};

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    pub matched: bool,
}

/// Provider status-change feed. Signature verification happens at the edge;
/// the payload arrives here already trusted.
#[utoipa::path(
    post,
    path = "/billing/webhook",
    tag = "Billing",
    request_body = BillingEvent,
    responses((status = 200, description = "Event processed", body = WebhookAck))
)]
pub async fn provider_webhook(
    State(state): State<AppState>,
    Json(event): Json<BillingEvent>,
) -> AppResult<Json<WebhookAck>> {
    let updated = state.subscriptions.apply_provider_event(&event).await?;

    if let Some(record) = &updated {
        log_activity(&state.event_bus, "updated", None, record);
    }

    Ok(Json(WebhookAck {
        received: true,
        matched: updated.is_some(),
    }))
}

#[utoipa::path(
    post,
    path = "/admin/sync",
    tag = "Billing",
    responses((status = 200, description = "Sync outcome", body = SyncOutcome))
)]
pub async fn trigger_sync(
    State(state): State<AppState>,
    principal: Principal,
) -> AppResult<Json<SyncOutcome>> {
    require_role(&principal, &[Role::SuperAdmin, Role::Admin])?;

    let outcome = run_billing_sync(&state.pool, &state.subscriptions, &state.sync_guard).await?;
    Ok(Json(outcome))
}
