use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::Loggable;

/// Document metadata. Bytes live in the external object store under
/// `storage_key`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Document {
    pub id: Uuid,
    pub building_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<Uuid>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub storage_key: String,
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Document {
    fn entity_type() -> &'static str { "document" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbDocument {
    pub id: Uuid,
    pub building_id: Uuid,
    pub unit_id: Option<Uuid>,
    pub event_id: Option<Uuid>,
    pub title: String,
    pub category: Option<String>,
    pub storage_key: String,
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbDocument> for Document {
    fn from(value: DbDocument) -> Self {
        Document {
            id: value.id,
            building_id: value.building_id,
            unit_id: value.unit_id,
            event_id: value.event_id,
            title: value.title,
            category: value.category,
            storage_key: value.storage_key,
            uploaded_by: value.uploaded_by,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DocumentCreateRequest {
    pub building_id: Uuid,
    pub unit_id: Option<Uuid>,
    pub event_id: Option<Uuid>,
    #[schema(example = "2026 reserve study")]
    pub title: String,
    pub category: Option<String>,
    #[schema(example = "buildings/hale-kai/reserve-study-2026.pdf")]
    pub storage_key: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DocumentUpdateRequest {
    pub title: Option<String>,
    pub category: Option<String>,
}

/// Subscription-gated: send a document to a recipient by email.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DocumentEmailRequest {
    #[schema(example = "board@halekai.example.com")]
    pub recipient: String,
    pub note: Option<String>,
}
