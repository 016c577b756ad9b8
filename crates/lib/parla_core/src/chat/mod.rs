//! AI role-play chat.
//!
//! The completion provider is a black box behind [`ChatProvider`]: it turns
//! the conversation so far into a stream of text deltas and can read a
//! message aloud. This module wires it to the stored conversation:
//!
//! 1. [`begin_reply`] stores the learner's message and opens the provider stream;
//! 2. [`finish_reply`] drains the stream, forwarding each delta, then stores
//!    the assistant's full reply.

pub mod openai;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::conversations::{self, MessageRow};

/// Maximum length of a learner message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Chat errors.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "system" => Some(ChatRole::System),
            "user" => Some(ChatRole::User),
            "assistant" => Some(ChatRole::Assistant),
            _ => None,
        }
    }
}

/// One turn of the conversation as sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

/// Stream of reply text deltas.
pub type ReplyStream = BoxStream<'static, Result<String, ChatError>>;

/// Chat completion and speech synthesis provider.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Start streaming the assistant's next reply to `turns`.
    async fn stream_reply(&self, turns: Vec<ChatTurn>) -> Result<ReplyStream, ChatError>;

    /// Synthesize speech for `text`, returning MP3 bytes.
    async fn synthesize_speech(&self, text: &str) -> Result<Vec<u8>, ChatError>;
}

/// Trim and bound a learner message.
pub fn validate_content(content: &str) -> Result<&str, ChatError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ChatError::Validation("Message must not be empty".into()));
    }
    if trimmed.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ChatError::Validation(format!(
            "Message must be at most {MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok(trimmed)
}

/// Convert stored messages into provider turns, skipping unknown roles.
pub fn turns_from_messages(messages: &[MessageRow]) -> Vec<ChatTurn> {
    messages
        .iter()
        .filter_map(|m| match ChatRole::parse(&m.role) {
            Some(role) => Some(ChatTurn {
                role,
                content: m.content.clone(),
            }),
            None => {
                warn!(message_id = %m.id, role = %m.role, "skipping message with unknown role");
                None
            }
        })
        .collect()
}

/// A learner message that has been stored, and the reply stream it started.
pub struct PendingReply {
    pub user_message: MessageRow,
    pub stream: ReplyStream,
}

/// Store the learner's message and start the provider's reply.
pub async fn begin_reply(
    pool: &PgPool,
    provider: &dyn ChatProvider,
    user_id: &Uuid,
    conversation_id: &Uuid,
    content: &str,
) -> Result<PendingReply, ChatError> {
    let content = validate_content(content)?;
    let conversation = conversations::get_conversation(pool, user_id, conversation_id)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => ChatError::NotFound(format!("conversation {conversation_id}")),
            other => ChatError::Db(other),
        })?;

    let user_message =
        conversations::append_message(pool, &conversation.id, ChatRole::User, content).await?;
    let history = conversations::get_messages(pool, &conversation.id).await?;
    let stream = provider.stream_reply(turns_from_messages(&history)).await?;

    Ok(PendingReply {
        user_message,
        stream,
    })
}

/// Drain a reply stream, calling `on_delta` for every non-empty chunk, and
/// return the concatenated text.
pub async fn collect_reply<F>(mut stream: ReplyStream, mut on_delta: F) -> Result<String, ChatError>
where
    F: FnMut(&str) + Send,
{
    let mut reply = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if chunk.is_empty() {
            continue;
        }
        on_delta(&chunk);
        reply.push_str(&chunk);
    }
    Ok(reply)
}

/// Drain the reply stream and store the assistant's message.
pub async fn finish_reply<F>(
    pool: &PgPool,
    conversation_id: &Uuid,
    stream: ReplyStream,
    on_delta: F,
) -> Result<MessageRow, ChatError>
where
    F: FnMut(&str) + Send,
{
    let reply = collect_reply(stream, on_delta).await?;
    if reply.trim().is_empty() {
        return Err(ChatError::Provider("provider returned an empty reply".into()));
    }
    let message =
        conversations::append_message(pool, conversation_id, ChatRole::Assistant, &reply).await?;
    debug!(message_id = %message.id, chars = reply.chars().count(), "assistant reply stored");
    Ok(message)
}

/// Read one of the user's messages aloud.
pub async fn speak_message(
    pool: &PgPool,
    provider: &dyn ChatProvider,
    user_id: &Uuid,
    message_id: &Uuid,
) -> Result<Vec<u8>, ChatError> {
    let message = conversations::get_message_for_user(pool, user_id, message_id)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => ChatError::NotFound(format!("message {message_id}")),
            other => ChatError::Db(other),
        })?;
    if ChatRole::parse(&message.role) == Some(ChatRole::System) {
        return Err(ChatError::Validation(
            "System messages cannot be read aloud".into(),
        ));
    }
    provider.synthesize_speech(&message.content).await
}
