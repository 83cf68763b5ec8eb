use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::Loggable;

/// Maintenance record, notice or other logged occurrence at a building.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BuildingEvent {
    pub id: Uuid,
    pub building_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contractor_id: Option<Uuid>,
    pub event_type: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_date: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for BuildingEvent {
    fn entity_type() -> &'static str { "building_event" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbBuildingEvent {
    pub id: Uuid,
    pub building_id: Uuid,
    pub unit_id: Option<Uuid>,
    pub contractor_id: Option<Uuid>,
    pub event_type: String,
    pub title: String,
    pub description: Option<String>,
    pub event_date: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbBuildingEvent> for BuildingEvent {
    fn from(value: DbBuildingEvent) -> Self {
        BuildingEvent {
            id: value.id,
            building_id: value.building_id,
            unit_id: value.unit_id,
            contractor_id: value.contractor_id,
            event_type: value.event_type,
            title: value.title,
            description: value.description,
            event_date: value.event_date,
            created_by: value.created_by,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BuildingEventCreateRequest {
    pub building_id: Uuid,
    pub unit_id: Option<Uuid>,
    pub contractor_id: Option<Uuid>,
    #[schema(example = "maintenance")]
    pub event_type: String,
    #[schema(example = "Roof inspection")]
    pub title: String,
    pub description: Option<String>,
    pub event_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BuildingEventUpdateRequest {
    pub event_type: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub event_date: Option<DateTime<Utc>>,
    pub contractor_id: Option<Uuid>,
}
