//! Chat handlers: streamed replies and speech.
//!
//! A reply is streamed to the client as server-sent events:
//!
//! ```text
//! event: delta   data: {"content":"Bon"}
//! event: delta   data: {"content":"jour !"}
//! event: done    data: {"userMessageId":"…","messageId":"…"}
//! ```
//!
//! A provider failure mid-stream ends the stream with an `error` event
//! instead of `done`. The reply is drained and stored by a spawned task, so
//! it is kept even if the client disconnects early.

use std::convert::Infallible;

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::Stream;
use futures_util::stream;
use parla_core::chat;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::CurrentUser;
use crate::models::{DeltaEvent, DoneEvent, SendMessageRequest, StreamErrorEvent};

/// `POST /conversations/{id}/messages`: send a message and stream the reply.
pub async fn send_message_handler(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<SendMessageRequest>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let pending = chat::begin_reply(
        &state.pool,
        state.chat.as_ref(),
        user.id.as_uuid(),
        &conversation_id,
        &body.content,
    )
    .await?;

    let (tx, rx) = mpsc::unbounded_channel::<Event>();
    let pool = state.pool.clone();
    let user_message_id = pending.user_message.id;

    tokio::spawn(async move {
        let delta_tx = tx.clone();
        let result = chat::finish_reply(&pool, &conversation_id, pending.stream, move |delta| {
            let _ = delta_tx.send(json_event("delta", &DeltaEvent { content: delta }));
        })
        .await;

        let last = match result {
            Ok(message) => {
                info!(%conversation_id, message_id = %message.id, "reply completed");
                json_event(
                    "done",
                    &DoneEvent {
                        user_message_id,
                        message_id: message.id,
                    },
                )
            }
            Err(e) => {
                warn!(%conversation_id, error = %e, "reply failed");
                json_event(
                    "error",
                    &StreamErrorEvent {
                        message: "The reply could not be completed".into(),
                    },
                )
            }
        };
        let _ = tx.send(last);
    });

    let events = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok::<_, Infallible>(event), rx))
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// `POST /messages/{id}/speech`: read a message aloud as MP3.
pub async fn speech_handler(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(message_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let audio =
        chat::speak_message(&state.pool, state.chat.as_ref(), user.id.as_uuid(), &message_id)
            .await?;
    Ok(([(CONTENT_TYPE, "audio/mpeg")], audio))
}

fn json_event<T: Serialize>(name: &'static str, payload: &T) -> Event {
    match Event::default().event(name).json_data(payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(event = name, error = %e, "could not encode event payload");
            Event::default().event(name)
        }
    }
}
