use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{Loggable, Severity};

// =============================================================================
// GRANT SUBJECTS AND RESOURCES
// =============================================================================

/// Who holds a grant: a single user, or an organization whose grant extends
/// to every current member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    User,
    PmCompany,
    AoaoOrganization,
}

impl SubjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectType::User => "user",
            SubjectType::PmCompany => "pm_company",
            SubjectType::AoaoOrganization => "aoao_organization",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "user" => Ok(SubjectType::User),
            "pm_company" => Ok(SubjectType::PmCompany),
            "aoao_organization" => Ok(SubjectType::AoaoOrganization),
            other => Err(AppError::internal(format!("unknown grant subject type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Building,
    Unit,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Building => "building",
            ResourceType::Unit => "unit",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "building" => Ok(ResourceType::Building),
            "unit" => Ok(ResourceType::Unit),
            other => Err(AppError::internal(format!("unknown resource type '{other}'"))),
        }
    }
}

// =============================================================================
// ACCESS GRANT
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccessGrant {
    pub id: Uuid,
    pub subject_type: SubjectType,
    pub subject_id: Uuid,
    pub resource_type: ResourceType,
    pub resource_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Loggable for AccessGrant {
    fn entity_type() -> &'static str { "access_grant" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbAccessGrant {
    pub id: Uuid,
    pub subject_type: String,
    pub subject_id: Uuid,
    pub resource_type: String,
    pub resource_id: Uuid,
    pub granted_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbAccessGrant> for AccessGrant {
    type Error = AppError;

    fn try_from(value: DbAccessGrant) -> Result<Self, Self::Error> {
        Ok(AccessGrant {
            id: value.id,
            subject_type: SubjectType::parse(&value.subject_type)?,
            subject_id: value.subject_id,
            resource_type: ResourceType::parse(&value.resource_type)?,
            resource_id: value.resource_id,
            granted_by: value.granted_by,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GrantCreateRequest {
    pub subject_type: SubjectType,
    pub subject_id: Uuid,
    pub resource_type: ResourceType,
    pub resource_id: Uuid,
}

// =============================================================================
// ACCESS REQUEST (approval workflow)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(AppError::internal(format!("unknown request status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccessRequest {
    pub id: Uuid,
    pub requester_user_id: Uuid,
    pub request_type: ResourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub building_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<Uuid>,
    /// Recorded from the requester's affiliation at creation time; approval
    /// materializes an organization-level grant when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_type: Option<SubjectType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub status: RequestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Loggable for AccessRequest {
    fn entity_type() -> &'static str { "access_request" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbAccessRequest {
    pub id: Uuid,
    pub requester_user_id: Uuid,
    pub request_type: String,
    pub building_id: Option<Uuid>,
    pub unit_id: Option<Uuid>,
    pub organization_type: Option<String>,
    pub organization_id: Option<Uuid>,
    pub notes: Option<String>,
    pub status: String,
    pub decided_by: Option<Uuid>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbAccessRequest> for AccessRequest {
    type Error = AppError;

    fn try_from(value: DbAccessRequest) -> Result<Self, Self::Error> {
        let organization_type = value
            .organization_type
            .as_deref()
            .map(SubjectType::parse)
            .transpose()?;

        Ok(AccessRequest {
            id: value.id,
            requester_user_id: value.requester_user_id,
            request_type: ResourceType::parse(&value.request_type)?,
            building_id: value.building_id,
            unit_id: value.unit_id,
            organization_type,
            organization_id: value.organization_id,
            notes: value.notes,
            status: RequestStatus::parse(&value.status)?,
            decided_by: value.decided_by,
            decided_at: value.decided_at,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AccessRequestCreate {
    pub request_type: ResourceType,
    pub building_id: Option<Uuid>,
    pub unit_id: Option<Uuid>,
    pub notes: Option<String>,
}
