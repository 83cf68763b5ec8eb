use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::Loggable;

/// Property-management company. Holds building/unit grants on behalf of its
/// member users.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PmCompany {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for PmCompany {
    fn entity_type() -> &'static str { "pm_company" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbPmCompany {
    pub id: Uuid,
    pub name: String,
    pub contact_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbPmCompany> for PmCompany {
    fn from(value: DbPmCompany) -> Self {
        PmCompany {
            id: value.id,
            name: value.name,
            contact_email: value.contact_email,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

/// HOA / AOAO association.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AoaoOrganization {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for AoaoOrganization {
    fn entity_type() -> &'static str { "aoao_organization" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbAoaoOrganization {
    pub id: Uuid,
    pub name: String,
    pub contact_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbAoaoOrganization> for AoaoOrganization {
    fn from(value: DbAoaoOrganization) -> Self {
        AoaoOrganization {
            id: value.id,
            name: value.name,
            contact_email: value.contact_email,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OrganizationCreateRequest {
    #[schema(example = "Pacific Property Partners")]
    pub name: String,
    pub contact_email: Option<String>,
}
