//! Request and response bodies.

use chrono::{DateTime, Utc};
use parla_core::conversations::{ConversationRow, MessageRow};
use parla_core::models::auth::User;
use parla_core::scenarios::ScenarioRow;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: *user.id.as_uuid(),
            email: user.email.as_str().to_string(),
            name: user.name,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
}

/// Scenario as shown to learners; the model instructions stay server-side.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResponse {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub target_language: String,
    pub ai_role: String,
    pub opening_line: String,
}

impl From<ScenarioRow> for ScenarioResponse {
    fn from(row: ScenarioRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            title: row.title,
            description: row.description,
            target_language: row.target_language,
            ai_role: row.ai_role,
            opening_line: row.opening_line,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    pub scenario_slug: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResponse {
    pub id: Uuid,
    pub scenario_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ConversationRow> for ConversationResponse {
    fn from(row: ConversationRow) -> Self {
        Self {
            id: row.id,
            scenario_id: row.scenario_id,
            title: row.title,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub items: Vec<ConversationResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: Uuid,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<MessageRow> for MessageResponse {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            role: row.role,
            content: row.content,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetailResponse {
    #[serde(flatten)]
    pub conversation: ConversationResponse,
    pub messages: Vec<MessageResponse>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

/// Payload of a `delta` server-sent event.
#[derive(Debug, Serialize)]
pub struct DeltaEvent<'a> {
    pub content: &'a str,
}

/// Payload of the final `done` server-sent event.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoneEvent {
    pub user_message_id: Uuid,
    pub message_id: Uuid,
}

/// Payload of an `error` server-sent event.
#[derive(Debug, Serialize)]
pub struct StreamErrorEvent {
    pub message: String,
}
