//! Access grant resolution: may this principal reach this building, unit,
//! event or document?
//!
//! Resolution order for a building:
//! 1. administrative bypass (super_admin, admin)
//! 2. contractor structural wildcard
//! 3. direct user grant
//! 4. organization grant via PM company / AOAO affiliation
//!
//! Unit checks add a building-level fallback (management at the building
//! implies unit access), except for unit-scoped roles (owner, tenant,
//! buyer) whose unit access must be granted explicitly.
//!
//! Absence of the resource itself is reported as not-found BEFORE any
//! access decision; the two outcomes are never conflated.

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::cache::TtlCache;
use crate::errors::{AppError, AppResult};
use crate::models::access::ResourceType;

use super::catalog::Role;
use super::principal::Principal;

/// Grants rarely change mid-session; a few seconds of staleness is
/// acceptable for the allow path. Only positive results are cached so a
/// freshly approved grant takes effect immediately.
const GRANT_CACHE_TTL: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct AccessResolver {
    pool: SqlitePool,
    cache: Arc<TtlCache<bool>>,
}

impl AccessResolver {
    pub fn new(pool: SqlitePool, cache: Arc<TtlCache<bool>>) -> Self {
        Self { pool, cache }
    }

    // -------------------------------------------------------------------
    // Buildings
    // -------------------------------------------------------------------

    pub async fn require_building_access(&self, principal: &Principal, building_id: Uuid) -> AppResult<()> {
        let exists: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM buildings WHERE id = ?")
            .bind(building_id)
            .fetch_one(&self.pool)
            .await?;
        if exists == 0 {
            return Err(AppError::not_found(format!("building {building_id} not found")));
        }

        if self.can_access_building(principal, building_id).await? {
            Ok(())
        } else {
            Err(AppError::forbidden(format!(
                "not authorized for building {building_id}"
            )))
        }
    }

    pub async fn can_access_building(&self, principal: &Principal, building_id: Uuid) -> AppResult<bool> {
        if principal.role.is_admin() {
            return Ok(true);
        }

        // Contractors hold unconditional access to every building, with no
        // per-building grant rows. Product policy carried over as-is;
        // narrowing it to explicit contractor grants is an open product
        // decision, not an implementation one.
        if principal.role == Role::Contractor {
            return Ok(true);
        }

        self.subject_has_grant(principal, ResourceType::Building, building_id)
            .await
    }

    // -------------------------------------------------------------------
    // Units
    // -------------------------------------------------------------------

    pub async fn require_unit_access(&self, principal: &Principal, unit_id: Uuid) -> AppResult<()> {
        let building_id: Option<Uuid> = sqlx::query_scalar("SELECT building_id FROM units WHERE id = ?")
            .bind(unit_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(building_id) = building_id else {
            return Err(AppError::not_found(format!("unit {unit_id} not found")));
        };

        if self.unit_access_allowed(principal, unit_id, building_id).await? {
            Ok(())
        } else {
            Err(AppError::forbidden(format!("not authorized for unit {unit_id}")))
        }
    }

    pub async fn can_access_unit(&self, principal: &Principal, unit_id: Uuid) -> AppResult<bool> {
        let building_id: Option<Uuid> = sqlx::query_scalar("SELECT building_id FROM units WHERE id = ?")
            .bind(unit_id)
            .fetch_optional(&self.pool)
            .await?;

        match building_id {
            Some(building_id) => self.unit_access_allowed(principal, unit_id, building_id).await,
            None => Ok(false),
        }
    }

    async fn unit_access_allowed(
        &self,
        principal: &Principal,
        unit_id: Uuid,
        building_id: Uuid,
    ) -> AppResult<bool> {
        if principal.role.is_admin() || principal.role == Role::Contractor {
            return Ok(true);
        }

        if self
            .subject_has_grant(principal, ResourceType::Unit, unit_id)
            .await?
        {
            return Ok(true);
        }

        // Building-level management implies unit access, but unit-scoped
        // roles never inherit grants not explicitly extended to them.
        if principal.role.is_unit_scoped() {
            return Ok(false);
        }

        self.subject_has_grant(principal, ResourceType::Building, building_id)
            .await
    }

    // -------------------------------------------------------------------
    // Derived resources: events and documents resolve to their building
    // -------------------------------------------------------------------

    pub async fn require_event_access(&self, principal: &Principal, event_id: Uuid) -> AppResult<()> {
        let building_id: Option<Uuid> =
            sqlx::query_scalar("SELECT building_id FROM building_events WHERE id = ?")
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some(building_id) = building_id else {
            return Err(AppError::not_found(format!("event {event_id} not found")));
        };

        if self.can_access_building(principal, building_id).await? {
            Ok(())
        } else {
            Err(AppError::forbidden(format!("not authorized for event {event_id}")))
        }
    }

    pub async fn require_document_access(&self, principal: &Principal, document_id: Uuid) -> AppResult<()> {
        let building_id: Option<Uuid> =
            sqlx::query_scalar("SELECT building_id FROM documents WHERE id = ?")
                .bind(document_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some(building_id) = building_id else {
            return Err(AppError::not_found(format!("document {document_id} not found")));
        };

        if self.can_access_building(principal, building_id).await? {
            Ok(())
        } else {
            Err(AppError::forbidden(format!(
                "not authorized for document {document_id}"
            )))
        }
    }

    // -------------------------------------------------------------------
    // Grant lookup
    // -------------------------------------------------------------------

    async fn subject_has_grant(
        &self,
        principal: &Principal,
        resource_type: ResourceType,
        resource_id: Uuid,
    ) -> AppResult<bool> {
        let key = grant_cache_key(principal.user_id, resource_type, resource_id);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        if self
            .grant_exists("user", principal.user_id, resource_type, resource_id)
            .await?
        {
            self.cache.set(key, true, GRANT_CACHE_TTL);
            return Ok(true);
        }

        if let Some(pm_company_id) = principal.pm_company_id {
            if self
                .grant_exists("pm_company", pm_company_id, resource_type, resource_id)
                .await?
            {
                self.cache.set(key, true, GRANT_CACHE_TTL);
                return Ok(true);
            }
        }

        if let Some(aoao_id) = principal.aoao_organization_id {
            if self
                .grant_exists("aoao_organization", aoao_id, resource_type, resource_id)
                .await?
            {
                self.cache.set(key, true, GRANT_CACHE_TTL);
                return Ok(true);
            }
        }

        Ok(false)
    }

    async fn grant_exists(
        &self,
        subject_type: &str,
        subject_id: Uuid,
        resource_type: ResourceType,
        resource_id: Uuid,
    ) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM access_grants WHERE subject_type = ? AND subject_id = ? AND resource_type = ? AND resource_id = ?",
        )
        .bind(subject_type)
        .bind(subject_id)
        .bind(resource_type.as_str())
        .bind(resource_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    /// Drop the cached allow for one (user, resource) pair. Called on
    /// revocation; organization-wide revocations rely on the short TTL.
    pub fn invalidate(&self, user_id: Uuid, resource_type: ResourceType, resource_id: Uuid) {
        self.cache
            .delete(&grant_cache_key(user_id, resource_type, resource_id));
    }
}

fn grant_cache_key(user_id: Uuid, resource_type: ResourceType, resource_id: Uuid) -> String {
    format!("grant:{user_id}:{}:{resource_id}", resource_type.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory database");
        sqlx::migrate!().run(&pool).await.expect("migrations");
        pool
    }

    fn resolver(pool: &SqlitePool) -> AccessResolver {
        AccessResolver::new(pool.clone(), Arc::new(TtlCache::new()))
    }

    async fn seed_building(pool: &SqlitePool) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query("INSERT INTO buildings (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind("Test Tower")
            .bind(now)
            .bind(now)
            .execute(pool)
            .await
            .expect("insert building");
        id
    }

    async fn seed_user_grant(pool: &SqlitePool, user_id: Uuid, building_id: Uuid) {
        sqlx::query(
            "INSERT INTO access_grants (id, subject_type, subject_id, resource_type, resource_id, created_at) VALUES (?, 'user', ?, 'building', ?, ?)",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(building_id)
        .bind(Utc::now())
        .execute(pool)
        .await
        .expect("insert grant");
    }

    #[tokio::test]
    async fn admin_bypasses_grant_table() {
        let pool = test_pool().await;
        let building = seed_building(&pool).await;
        let resolver = resolver(&pool);

        let admin = Principal::with_role(Uuid::new_v4(), Role::Admin);
        assert!(resolver.can_access_building(&admin, building).await.unwrap());
    }

    #[tokio::test]
    async fn contractor_has_global_building_access() {
        let pool = test_pool().await;
        let building = seed_building(&pool).await;
        let resolver = resolver(&pool);

        // zero grant rows for this principal
        let contractor = Principal::with_role(Uuid::new_v4(), Role::Contractor);
        assert!(resolver.can_access_building(&contractor, building).await.unwrap());
    }

    #[tokio::test]
    async fn direct_grant_allows_and_absence_denies() {
        let pool = test_pool().await;
        let building = seed_building(&pool).await;
        let resolver = resolver(&pool);

        let owner = Principal::with_role(Uuid::new_v4(), Role::Owner);
        assert!(!resolver.can_access_building(&owner, building).await.unwrap());

        seed_user_grant(&pool, owner.user_id, building).await;
        assert!(resolver.can_access_building(&owner, building).await.unwrap());
    }

    #[tokio::test]
    async fn missing_building_is_not_found_not_forbidden() {
        let pool = test_pool().await;
        let resolver = resolver(&pool);

        let owner = Principal::with_role(Uuid::new_v4(), Role::Owner);
        let err = resolver
            .require_building_access(&owner, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn existing_building_without_grant_is_forbidden() {
        let pool = test_pool().await;
        let building = seed_building(&pool).await;
        let resolver = resolver(&pool);

        let owner = Principal::with_role(Uuid::new_v4(), Role::Owner);
        let err = resolver
            .require_building_access(&owner, building)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn owner_does_not_inherit_building_grant_for_units() {
        let pool = test_pool().await;
        let building = seed_building(&pool).await;
        let unit_id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO units (id, building_id, unit_number, created_at, updated_at) VALUES (?, ?, '101', ?, ?)",
        )
        .bind(unit_id)
        .bind(building)
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();

        let resolver = resolver(&pool);

        // Building-level grant exists for both, but only the property
        // manager falls back to it for unit access.
        let owner = Principal::with_role(Uuid::new_v4(), Role::Owner);
        seed_user_grant(&pool, owner.user_id, building).await;
        assert!(!resolver.can_access_unit(&owner, unit_id).await.unwrap());

        let manager = Principal::with_role(Uuid::new_v4(), Role::PropertyManager);
        seed_user_grant(&pool, manager.user_id, building).await;
        assert!(resolver.can_access_unit(&manager, unit_id).await.unwrap());
    }
}
