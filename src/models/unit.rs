use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::Loggable;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Unit {
    pub id: Uuid,
    pub building_id: Uuid,
    pub unit_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub floor: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Unit {
    fn entity_type() -> &'static str { "unit" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbUnit {
    pub id: Uuid,
    pub building_id: Uuid,
    pub unit_number: String,
    pub floor: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbUnit> for Unit {
    fn from(value: DbUnit) -> Self {
        Unit {
            id: value.id,
            building_id: value.building_id,
            unit_number: value.unit_number,
            floor: value.floor,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UnitCreateRequest {
    pub building_id: Uuid,
    #[schema(example = "1204")]
    pub unit_number: String,
    pub floor: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UnitUpdateRequest {
    pub unit_number: Option<String>,
    pub floor: Option<i64>,
}
