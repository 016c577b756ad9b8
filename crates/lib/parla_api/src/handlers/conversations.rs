//! Conversation request handlers.

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use parla_core::chat::ChatRole;
use parla_core::{conversations, scenarios};
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::CurrentUser;
use crate::models::{
    ConversationDetailResponse, ConversationListResponse, ConversationResponse,
    CreateConversationRequest, ListQuery, MessageResponse,
};

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

/// `GET /conversations`: the user's conversations, most recent first.
pub async fn list_conversations_handler(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<ConversationListResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);
    let (rows, total) =
        conversations::list_conversations(&state.pool, user.id.as_uuid(), limit, offset).await?;
    Ok(Json(ConversationListResponse {
        items: rows.into_iter().map(ConversationResponse::from).collect(),
        total,
        limit,
        offset,
    }))
}

/// `POST /conversations`: start a conversation from a scenario.
pub async fn create_conversation_handler(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<CreateConversationRequest>,
) -> AppResult<(StatusCode, Json<ConversationResponse>)> {
    let scenario = scenarios::get_scenario_by_slug(&state.pool, &body.scenario_slug)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                AppError::Validation(format!("Unknown scenario '{}'", body.scenario_slug))
            }
            other => other.into(),
        })?;
    let row = conversations::start_conversation(&state.pool, user.id.as_uuid(), &scenario).await?;
    Ok((StatusCode::CREATED, Json(row.into())))
}

/// `GET /conversations/{id}`: a conversation with its visible messages.
///
/// The scenario's system prompt is not returned.
pub async fn get_conversation_handler(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ConversationDetailResponse>> {
    let row = conversations::get_conversation(&state.pool, user.id.as_uuid(), &id)
        .await
        .map_err(|e| not_found_or(e, id))?;
    let messages = conversations::get_messages(&state.pool, &row.id).await?;
    Ok(Json(ConversationDetailResponse {
        conversation: row.into(),
        messages: messages
            .into_iter()
            .filter(|m| ChatRole::parse(&m.role) != Some(ChatRole::System))
            .map(MessageResponse::from)
            .collect(),
    }))
}

/// `DELETE /conversations/{id}`: delete a conversation and its messages.
pub async fn delete_conversation_handler(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if conversations::delete_conversation(&state.pool, user.id.as_uuid(), &id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Conversation {id} not found")))
    }
}

fn not_found_or(e: sqlx::Error, id: Uuid) -> AppError {
    match e {
        sqlx::Error::RowNotFound => AppError::NotFound(format!("Conversation {id} not found")),
        other => other.into(),
    }
}
