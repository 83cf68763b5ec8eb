use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub id: Uuid,
    pub sender_user_id: Uuid,
    pub recipient_user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub building_id: Option<Uuid>,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbMessage {
    pub id: Uuid,
    pub sender_user_id: Uuid,
    pub recipient_user_id: Uuid,
    pub building_id: Option<Uuid>,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl From<DbMessage> for Message {
    fn from(value: DbMessage) -> Self {
        Message {
            id: value.id,
            sender_user_id: value.sender_user_id,
            recipient_user_id: value.recipient_user_id,
            building_id: value.building_id,
            subject: value.subject,
            body: value.body,
            created_at: value.created_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub recipient_user_id: Uuid,
    pub building_id: Option<Uuid>,
    #[schema(example = "Elevator maintenance window")]
    pub subject: String,
    pub body: String,
}
