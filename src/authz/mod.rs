//! Authorization and entitlement engine.
//!
//! Four pieces compose every request-time decision:
//! - the permission catalog: static role -> permission mapping plus
//!   per-principal overrides, with a `"*"` wildcard that absorbs everything
//! - the principal: the authenticated caller with role, overrides,
//!   organizational affiliations and a cached subscription snapshot
//! - the access grant resolver: building/unit reachability via direct and
//!   organization-level grants, with admin bypass and the contractor
//!   structural wildcard
//! - the guard: composition of catalog + resolver + subscription engine
//!   into a single allow/deny with distinguishable error kinds

mod catalog;
mod guard;
mod principal;
mod resolver;

pub use catalog::{effective_permissions, has_permission, role_permissions, Role, WILDCARD};
pub use guard::{is_subscription_gated, require_entitlement, require_permission, require_role};
pub use principal::Principal;
pub use resolver::AccessResolver;
