use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::Loggable;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Building {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Building {
    fn entity_type() -> &'static str { "building" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbBuilding {
    pub id: Uuid,
    pub name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbBuilding> for Building {
    fn from(value: DbBuilding) -> Self {
        Building {
            id: value.id,
            name: value.name,
            address: value.address,
            city: value.city,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BuildingCreateRequest {
    #[schema(example = "Hale Kai Tower")]
    pub name: String,
    pub address: Option<String>,
    pub city: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BuildingUpdateRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
}
