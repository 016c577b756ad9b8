//! Conversation and message persistence.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::chat::ChatRole;
use crate::scenarios::ScenarioRow;

/// Row returned by conversation queries.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ConversationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub scenario_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row returned by message queries.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Start a conversation from a scenario.
///
/// Writes the conversation, the scenario's system prompt and its opening
/// line (as the first assistant message) in one transaction.
pub async fn start_conversation(
    pool: &PgPool,
    user_id: &Uuid,
    scenario: &ScenarioRow,
) -> Result<ConversationRow, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let conversation = sqlx::query_as::<_, ConversationRow>(
        r#"
        INSERT INTO conversations (id, user_id, scenario_id, title)
        VALUES ($1, $2, $3, $4)
        RETURNING id, user_id, scenario_id, title, created_at, updated_at
        "#,
    )
    .bind(Uuid::now_v7())
    .bind(user_id)
    .bind(scenario.id)
    .bind(&scenario.title)
    .fetch_one(&mut *tx)
    .await?;

    let opening = [
        (ChatRole::System, scenario.compose_system_prompt()),
        (ChatRole::Assistant, scenario.opening_line.clone()),
    ];
    for (role, content) in opening {
        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, role, content)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(conversation.id)
        .bind(role.as_str())
        .bind(content)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(conversation)
}

/// List conversations for a user, ordered by most recently updated first.
pub async fn list_conversations(
    pool: &PgPool,
    user_id: &Uuid,
    limit: i64,
    offset: i64,
) -> Result<(Vec<ConversationRow>, i64), sqlx::Error> {
    let total =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM conversations WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await?;

    let rows = sqlx::query_as::<_, ConversationRow>(
        r#"
        SELECT id, user_id, scenario_id, title, created_at, updated_at
        FROM conversations
        WHERE user_id = $1
        ORDER BY updated_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok((rows, total))
}

/// Get a conversation by ID (scoped to user).
pub async fn get_conversation(
    pool: &PgPool,
    user_id: &Uuid,
    conversation_id: &Uuid,
) -> Result<ConversationRow, sqlx::Error> {
    sqlx::query_as::<_, ConversationRow>(
        r#"
        SELECT id, user_id, scenario_id, title, created_at, updated_at
        FROM conversations
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(conversation_id)
    .bind(user_id)
    .fetch_one(pool)
    .await
}

/// Delete a conversation (messages cascade).
pub async fn delete_conversation(
    pool: &PgPool,
    user_id: &Uuid,
    conversation_id: &Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM conversations WHERE id = $1 AND user_id = $2")
        .bind(conversation_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Get messages for a conversation in the order they were written.
pub async fn get_messages(
    pool: &PgPool,
    conversation_id: &Uuid,
) -> Result<Vec<MessageRow>, sqlx::Error> {
    sqlx::query_as::<_, MessageRow>(
        r#"
        SELECT id, conversation_id, role, content, created_at
        FROM messages
        WHERE conversation_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await
}

/// Append one message and touch the conversation's `updated_at`.
pub async fn append_message(
    pool: &PgPool,
    conversation_id: &Uuid,
    role: ChatRole,
    content: &str,
) -> Result<MessageRow, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let message = sqlx::query_as::<_, MessageRow>(
        r#"
        INSERT INTO messages (id, conversation_id, role, content)
        VALUES ($1, $2, $3, $4)
        RETURNING id, conversation_id, role, content, created_at
        "#,
    )
    .bind(Uuid::now_v7())
    .bind(conversation_id)
    .bind(role.as_str())
    .bind(content)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE conversations SET updated_at = now() WHERE id = $1")
        .bind(conversation_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(message)
}

/// Get a single message, provided it belongs to one of the user's
/// conversations.
pub async fn get_message_for_user(
    pool: &PgPool,
    user_id: &Uuid,
    message_id: &Uuid,
) -> Result<MessageRow, sqlx::Error> {
    sqlx::query_as::<_, MessageRow>(
        r#"
        SELECT m.id, m.conversation_id, m.role, m.content, m.created_at
        FROM messages m
        JOIN conversations c ON c.id = m.conversation_id
        WHERE m.id = $1 AND c.user_id = $2
        "#,
    )
    .bind(message_id)
    .bind(user_id)
    .fetch_one(pool)
    .await
}
