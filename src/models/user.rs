use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::Role;
use crate::errors::AppError;
use crate::events::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    /// Permission strings granted atop the role defaults.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permission_overrides: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pm_company_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aoao_organization_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contractor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Loggable for User {
    fn entity_type() -> &'static str { "user" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Important }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub permission_overrides: Option<String>,
    pub pm_company_id: Option<Uuid>,
    pub aoao_organization_id: Option<Uuid>,
    pub contractor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbUser> for User {
    type Error = AppError;

    fn try_from(value: DbUser) -> Result<Self, Self::Error> {
        let permission_overrides = match value.permission_overrides.as_deref() {
            None | Some("") => Vec::new(),
            Some(raw) => serde_json::from_str::<Vec<String>>(raw)
                .map_err(|err| AppError::internal(format!("invalid permission overrides: {err}")))?,
        };

        Ok(User {
            id: value.id,
            name: value.name,
            email: value.email,
            role: Role::parse(&value.role),
            permission_overrides,
            pm_company_id: value.pm_company_id,
            aoao_organization_id: value.aoao_organization_id,
            contractor_id: value.contractor_id,
            created_at: value.created_at,
            updated_at: value.updated_at,
            deleted_at: value.deleted_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "Leilani Akana")]
    pub name: String,
    #[schema(example = "leilani@example.com")]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
    /// Self-service roles only; defaults to `owner`.
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "leilani@example.com")]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PasswordResetRequest {
    #[schema(example = "leilani@example.com")]
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}
