//! Request-time permission dependency guard.
//!
//! Check order for a guarded operation:
//! 1. named permission against the catalog -> Forbidden (permission)
//! 2. resource scope against the resolver -> NotFound / Forbidden (resource)
//! 3. subscription gate for allow-listed operations -> SubscriptionRequired
//!
//! The guard itself holds no state; all state lives in the components it
//! composes. Ambiguous or failed checks always resolve to deny.

use crate::errors::{AppError, AppResult};
use crate::subscriptions::check_active_subscription;

use super::catalog::{self, Role};
use super::principal::Principal;

/// Operations that require an active subscription (or trial) in addition to
/// their permission string. Admin-class roles are exempt.
const SUBSCRIPTION_GATED: &[&str] = &["documents:email", "reports:premium"];

pub fn is_subscription_gated(operation: &str) -> bool {
    SUBSCRIPTION_GATED.iter().any(|op| *op == operation)
}

/// Deny with the missing permission name unless the principal's effective
/// set satisfies it.
pub fn require_permission(principal: &Principal, permission: &str) -> AppResult<()> {
    if catalog::has_permission(principal, permission) {
        return Ok(());
    }

    tracing::debug!(
        user_id = %principal.user_id,
        role = %principal.role,
        permission,
        "permission denied"
    );
    Err(AppError::forbidden(format!("missing permission '{permission}'")))
}

/// Role membership gate for the handful of endpoints that are inherently
/// role-bound rather than permission-bound (e.g. unit management).
pub fn require_role(principal: &Principal, allowed: &[Role]) -> AppResult<()> {
    if allowed.contains(&principal.role) {
        return Ok(());
    }

    Err(AppError::forbidden(format!(
        "role '{}' may not perform this action",
        principal.role
    )))
}

/// Subscription gate for allow-listed operations. Uses the subscription
/// snapshot resolved onto the principal (organization-level records take
/// precedence over personal ones at load time).
pub fn require_entitlement(principal: &Principal, operation: &str) -> AppResult<()> {
    if !is_subscription_gated(operation) {
        return Ok(());
    }

    if principal.role.is_admin() {
        return Ok(());
    }

    if check_active_subscription(principal.role, principal.subscription.as_ref()) {
        return Ok(());
    }

    let tier = principal
        .subscription
        .as_ref()
        .map(|snapshot| snapshot.tier.as_str())
        .unwrap_or("free");

    tracing::debug!(
        user_id = %principal.user_id,
        role = %principal.role,
        operation,
        tier,
        "subscription gate denied"
    );
    Err(AppError::subscription_required(tier))
}
