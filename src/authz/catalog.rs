//! Role -> permission catalog. The single source of truth for what a role
//! may categorically do; resource reachability is the resolver's job.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::principal::Principal;

/// Universal permission: membership implies every other permission string.
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    PropertyManager,
    Hoa,
    HoaStaff,
    Contractor,
    ContractorStaff,
    Auditor,
    Owner,
    Tenant,
    Buyer,
    Guest,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::PropertyManager => "property_manager",
            Role::Hoa => "hoa",
            Role::HoaStaff => "hoa_staff",
            Role::Contractor => "contractor",
            Role::ContractorStaff => "contractor_staff",
            Role::Auditor => "auditor",
            Role::Owner => "owner",
            Role::Tenant => "tenant",
            Role::Buyer => "buyer",
            Role::Guest => "guest",
        }
    }

    /// Unknown role strings decode as Guest: empty permission set, no
    /// bypasses, so the safe default is deny rather than an error.
    pub fn parse(value: &str) -> Role {
        match value {
            "super_admin" => Role::SuperAdmin,
            "admin" => Role::Admin,
            "property_manager" => Role::PropertyManager,
            "hoa" => Role::Hoa,
            "hoa_staff" => Role::HoaStaff,
            "contractor" => Role::Contractor,
            "contractor_staff" => Role::ContractorStaff,
            "auditor" => Role::Auditor,
            "owner" => Role::Owner,
            "tenant" => Role::Tenant,
            "buyer" => Role::Buyer,
            _ => Role::Guest,
        }
    }

    /// Administrative bypass set: skips resource-grant resolution entirely.
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::SuperAdmin | Role::Admin)
    }

    /// Roles that may not inherit building-level grants when a unit is the
    /// named resource; their unit access must be granted explicitly.
    pub fn is_unit_scoped(&self) -> bool {
        matches!(self, Role::Owner | Role::Tenant | Role::Buyer)
    }

    /// Roles a user may pick for themselves at registration.
    pub fn is_self_service(&self) -> bool {
        matches!(
            self,
            Role::PropertyManager | Role::Contractor | Role::Owner | Role::Tenant | Role::Buyer
        )
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static permission sets per role.
pub fn role_permissions(role: Role) -> &'static [&'static str] {
    match role {
        Role::SuperAdmin => &[WILDCARD],
        Role::Admin => &[
            "users:read", "users:write",
            "buildings:read", "buildings:write",
            "events:read", "events:write",
            "documents:read", "documents:write",
            "access:read", "access:write",
            "contractors:read", "contractors:write",
            "requests:approve",
        ],
        // Property managers cannot create or edit buildings.
        Role::PropertyManager => &[
            "buildings:read",
            "events:read", "events:write",
            "documents:read", "documents:write",
            "contractors:read",
            "access:read", "access:write",
        ],
        Role::Hoa | Role::HoaStaff => &[
            "buildings:read",
            "events:read", "events:write",
            "documents:read", "documents:write",
            "contractors:read",
        ],
        Role::Contractor => &[
            "events:read", "events:write",
            "documents:read", "documents:write",
            "contractors:read",
        ],
        Role::ContractorStaff => &[
            "events:read", "events:write",
            "documents:read",
            "contractors:read",
        ],
        Role::Auditor => &[
            "events:read",
            "documents:read",
            "buildings:read",
            "contractors:read",
        ],
        Role::Owner | Role::Tenant | Role::Buyer => &[
            "events:read",
            "documents:read",
            "buildings:read",
        ],
        Role::Guest => &[],
    }
}

/// Union of the role's static permissions and the principal's explicit
/// overrides. A super_admin role or a `"*"` override collapses the set to
/// the universal wildcard.
pub fn effective_permissions(principal: &Principal) -> HashSet<String> {
    if principal.role == Role::SuperAdmin
        || principal.permission_overrides.iter().any(|p| p == WILDCARD)
    {
        return HashSet::from([WILDCARD.to_string()]);
    }

    role_permissions(principal.role)
        .iter()
        .map(|p| p.to_string())
        .chain(principal.permission_overrides.iter().cloned())
        .collect()
}

/// True iff the wildcard or the named permission is in the effective set.
pub fn has_permission(principal: &Principal, permission: &str) -> bool {
    if principal.role == Role::SuperAdmin {
        return true;
    }

    let allowed = role_permissions(principal.role);
    allowed.iter().any(|p| *p == WILDCARD || *p == permission)
        || principal
            .permission_overrides
            .iter()
            .any(|p| p == WILDCARD || p == permission)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn super_admin_has_everything() {
        let p = Principal::with_role(Uuid::new_v4(), Role::SuperAdmin);
        assert!(has_permission(&p, "buildings:write"));
        assert!(has_permission(&p, "anything:at_all"));
        assert_eq!(
            effective_permissions(&p),
            HashSet::from([WILDCARD.to_string()])
        );
    }

    #[test]
    fn wildcard_override_absorbs_all() {
        let p = Principal::with_role(Uuid::new_v4(), Role::Owner)
            .with_overrides(vec![WILDCARD.to_string()]);
        assert!(has_permission(&p, "users:write"));
        assert_eq!(
            effective_permissions(&p),
            HashSet::from([WILDCARD.to_string()])
        );
    }

    #[test]
    fn role_defaults_union_overrides() {
        let p = Principal::with_role(Uuid::new_v4(), Role::Owner)
            .with_overrides(vec!["events:write".to_string()]);

        assert!(has_permission(&p, "events:read"));
        assert!(has_permission(&p, "events:write"));
        assert!(!has_permission(&p, "buildings:write"));

        let effective = effective_permissions(&p);
        assert!(effective.contains("events:write"));
        assert!(effective.contains("documents:read"));
    }

    #[test]
    fn unknown_role_falls_back_to_empty_set() {
        assert_eq!(Role::parse("astronaut"), Role::Guest);
        let p = Principal::with_role(Uuid::new_v4(), Role::parse("astronaut"));
        assert!(!has_permission(&p, "events:read"));
        assert!(effective_permissions(&p).is_empty());
    }

    #[test]
    fn property_manager_cannot_write_buildings() {
        let p = Principal::with_role(Uuid::new_v4(), Role::PropertyManager);
        assert!(has_permission(&p, "buildings:read"));
        assert!(!has_permission(&p, "buildings:write"));
        assert!(has_permission(&p, "access:write"));
    }

    #[test]
    fn role_round_trips_through_strings() {
        for role in [
            Role::SuperAdmin,
            Role::Admin,
            Role::PropertyManager,
            Role::Hoa,
            Role::HoaStaff,
            Role::Contractor,
            Role::ContractorStaff,
            Role::Auditor,
            Role::Owner,
            Role::Tenant,
            Role::Buyer,
            Role::Guest,
        ] {
            assert_eq!(Role::parse(role.as_str()), role);
        }
    }
}
