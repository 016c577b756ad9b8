//! OpenAI-compatible chat and speech provider.
//!
//! Replies stream from `/chat/completions` as server-sent events carrying
//! `choices[0].delta.content`; the stream ends with a `[DONE]` sentinel.
//! Speech comes from `/audio/speech` as MP3.

use std::env;

use async_trait::async_trait;
use futures_util::{StreamExt, future};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sse_stream::{Sse, SseStream};
use tracing::debug;

use super::{ChatError, ChatProvider, ChatTurn, ReplyStream};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_SPEECH_MODEL: &str = "tts-1";
const DEFAULT_VOICE: &str = "alloy";
const DONE_SENTINEL: &str = "[DONE]";

/// Provider settings.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub chat_model: String,
    pub speech_model: String,
    pub voice: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            speech_model: DEFAULT_SPEECH_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
        }
    }
}

impl OpenAiConfig {
    /// Read `OPENAI_API_KEY`, `OPENAI_BASE_URL`, `CHAT_MODEL`, `SPEECH_MODEL`
    /// and `SPEECH_VOICE`, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let var = |key: &str, fallback: String| {
            env::var(key)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(fallback)
        };
        Self {
            api_key: env::var("OPENAI_API_KEY").ok().filter(|v| !v.is_empty()),
            base_url: var("OPENAI_BASE_URL", defaults.base_url),
            chat_model: var("CHAT_MODEL", defaults.chat_model),
            speech_model: var("SPEECH_MODEL", defaults.speech_model),
            voice: var("SPEECH_VOICE", defaults.voice),
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// Chat provider backed by an OpenAI-compatible HTTP API.
#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    pub fn new(client: Client, config: OpenAiConfig) -> Self {
        Self { client, config }
    }

    fn api_key(&self) -> Result<&str, ChatError> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| ChatError::Config("OPENAI_API_KEY is not set".to_string()))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, ChatError> {
        let api_key = self.api_key()?;
        let resp = self
            .client
            .post(self.endpoint(path))
            .header("Authorization", format!("Bearer {api_key}"))
            .json(body)
            .send()
            .await
            .map_err(|e| ChatError::Provider(format!("{path} request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(ChatError::Provider(format!("{path} failed: {status} {body}")));
        }
        Ok(resp)
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    async fn stream_reply(&self, turns: Vec<ChatTurn>) -> Result<ReplyStream, ChatError> {
        debug!(model = %self.config.chat_model, turns = turns.len(), "requesting completion");
        let resp = self
            .post(
                "chat/completions",
                &CompletionRequest {
                    model: &self.config.chat_model,
                    messages: &turns,
                    stream: true,
                },
            )
            .await?;

        let deltas = SseStream::from_byte_stream(resp.bytes_stream())
            .take_while(|event| future::ready(!is_done(event)))
            .filter_map(|event| {
                future::ready(match event {
                    Ok(sse) => parse_delta(&sse).transpose(),
                    Err(e) => Some(Err(ChatError::Provider(format!(
                        "completion stream error: {e}"
                    )))),
                })
            });
        Ok(deltas.boxed())
    }

    async fn synthesize_speech(&self, text: &str) -> Result<Vec<u8>, ChatError> {
        debug!(model = %self.config.speech_model, chars = text.chars().count(), "requesting speech");
        let resp = self
            .post(
                "audio/speech",
                &SpeechRequest {
                    model: &self.config.speech_model,
                    input: text,
                    voice: &self.config.voice,
                    response_format: "mp3",
                },
            )
            .await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ChatError::Provider(format!("speech body read failed: {e}")))?;
        Ok(bytes.to_vec())
    }
}

fn is_done<E>(event: &Result<Sse, E>) -> bool {
    matches!(event, Ok(sse) if sse.data.as_deref().map(str::trim) == Some(DONE_SENTINEL))
}

/// Extract the text delta from one completion event.
///
/// Events without data, or whose first choice carries no content (role
/// announcements, finish markers), yield `None`.
fn parse_delta(sse: &Sse) -> Result<Option<String>, ChatError> {
    let Some(data) = sse.data.as_deref() else {
        return Ok(None);
    };
    let chunk: CompletionChunk = serde_json::from_str(data)
        .map_err(|e| ChatError::Provider(format!("completion chunk parse error: {e}")))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|c| !c.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(data: Option<&str>) -> Sse {
        Sse {
            event: None,
            data: data.map(str::to_string),
            id: None,
            retry: None,
        }
    }

    #[test]
    fn delta_content_is_extracted() {
        let sse = event(Some(r#"{"choices":[{"index":0,"delta":{"content":"Bonjour"}}]}"#));
        assert_eq!(parse_delta(&sse).unwrap().as_deref(), Some("Bonjour"));
    }

    #[test]
    fn role_only_and_finish_chunks_are_skipped() {
        let role = event(Some(r#"{"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#));
        assert_eq!(parse_delta(&role).unwrap(), None);

        let finish = event(Some(
            r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
        ));
        assert_eq!(parse_delta(&finish).unwrap(), None);

        let empty = event(Some(r#"{"choices":[]}"#));
        assert_eq!(parse_delta(&empty).unwrap(), None);

        assert_eq!(parse_delta(&event(None)).unwrap(), None);
    }

    #[test]
    fn malformed_chunk_is_a_provider_error() {
        let sse = event(Some("not json"));
        assert!(matches!(parse_delta(&sse), Err(ChatError::Provider(_))));
    }

    #[test]
    fn done_sentinel_is_recognised() {
        let done: Result<Sse, ChatError> = Ok(event(Some("[DONE]")));
        let data: Result<Sse, ChatError> = Ok(event(Some(r#"{"choices":[]}"#)));
        assert!(is_done(&done));
        assert!(!is_done(&data));
    }

    #[test]
    fn endpoint_joins_base_url_without_double_slash() {
        let provider = OpenAiProvider::new(
            Client::new(),
            OpenAiConfig {
                base_url: "http://localhost:8080/v1/".into(),
                ..OpenAiConfig::default()
            },
        );
        assert_eq!(
            provider.endpoint("chat/completions"),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn missing_api_key_is_a_config_error() {
        let provider = OpenAiProvider::new(Client::new(), OpenAiConfig::default());
        let err = provider.synthesize_speech("Hola").await.unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));
    }
}
