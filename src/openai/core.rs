use std::borrow::Cow;
use std::time::Duration;

use anyhow::{Error, Result};
use futures::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::core::AppConfig;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "user")]
    User,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Self {
        Message {
            role,
            content: content.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model API responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Model API reported an error: {0}")]
    Api(String),
    #[error("Model refused to respond: {0}")]
    Refusal(String),
}

/// Anything that can generate a structured result from a message
/// history, streaming the raw text of the result as it is generated.
///
/// The returned stream owns the upstream connection. Dropping it
/// before it finishes closes the connection.
pub trait StructuredCompletion: Send + Sync {
    fn completion_stream(
        &self,
        model: &str,
        messages: Vec<Message>,
        response_format: Value,
    ) -> BoxStream<'static, Result<String, Error>>;
}

/// Client for an OpenAI compatible chat completions API.
#[derive(Clone, Debug)]
pub struct OpenAiClient {
    api_hostname: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(api_hostname: &str, api_key: &str, timeout: Duration) -> Self {
        Self {
            api_hostname: api_hostname.to_string(),
            api_key: api_key.to_string(),
            timeout,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.openai_api_hostname,
            &config.openai_api_key,
            Duration::from_secs(config.request_timeout_secs),
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Delta {
    Content { content: String },

    Refusal { refusal: String },

    Stop {},
}

#[derive(Debug, Deserialize)]
struct CompletionChunkChoice {
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    choices: Vec<CompletionChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

// Errors can show up in the middle of an otherwise successful
// response as a `data:` frame with an `error` object instead of
// `choices`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StreamFrame {
    Chunk(CompletionChunk),
    Error { error: ApiErrorBody },
}

/// Bytes of an event stream that haven't been split into events yet.
/// A network chunk can end in the middle of a multibyte character so
/// only complete events get decoded.
#[derive(Debug, Default)]
struct EventBuffer {
    bytes: Vec<u8>,
}

impl EventBuffer {
    fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// Splits off the next complete event, without the blank line that
    /// ends it.
    fn next_event(&mut self) -> Option<Result<String, Error>> {
        let end = self.bytes.windows(2).position(|w| w == b"\n\n")?;
        let mut event: Vec<u8> = self.bytes.drain(..end + 2).collect();
        event.truncate(end);
        Some(String::from_utf8(event).map_err(Error::from))
    }

    fn remainder(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

impl StructuredCompletion for OpenAiClient {
    fn completion_stream(
        &self,
        model: &str,
        messages: Vec<Message>,
        response_format: Value,
    ) -> BoxStream<'static, Result<String, Error>> {
        let payload = json!({
            "model": model,
            "messages": messages,
            "response_format": response_format,
            "stream": true,
        });
        let url = format!(
            "{}/v1/chat/completions",
            self.api_hostname.trim_end_matches("/")
        );
        let api_key = self.api_key.clone();
        let timeout = self.timeout;

        Box::pin(async_stream::try_stream! {
            let response = reqwest::Client::new()
                .post(url)
                .bearer_auth(api_key)
                .header("Content-Type", "application/json")
                .timeout(timeout)
                .json(&payload)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                Err::<(), _>(ModelError::Status { status: status.as_u16(), body })?;
                return;
            }

            let mut stream = response.bytes_stream();
            let mut events = EventBuffer::default();

            'outer: while let Some(chunk) = stream.next().await {
                events.push(&chunk?);

                while let Some(event) = events.next_event() {
                    let event = event?;
                    let event_data = event.trim();
                    if !event_data.starts_with("data: ") {
                        continue;
                    }

                    let data = event_data[6..].trim();
                    if data.is_empty() {
                        continue;
                    }

                    if data == "[DONE]" {
                        break 'outer;
                    }

                    let frame = serde_json::from_str::<StreamFrame>(data).inspect_err(|e| {
                        tracing::error!("Parsing completion chunk failed for {}\nError:{}", data, e)
                    })?;
                    let chunk = match frame {
                        StreamFrame::Chunk(chunk) => chunk,
                        StreamFrame::Error { error } => {
                            Err::<(), _>(ModelError::Api(error.message))?;
                            return;
                        }
                    };

                    // Usage-only chunks have no choices
                    let Some(choice) = chunk.choices.first() else {
                        continue;
                    };

                    match &choice.delta {
                        Delta::Content { content } => {
                            if !content.is_empty() {
                                yield content.clone();
                            }
                        }
                        Delta::Refusal { refusal } => {
                            Err::<(), _>(ModelError::Refusal(refusal.clone()))?;
                            return;
                        }
                        Delta::Stop {} => {}
                    }

                    if let Some(reason) = &choice.finish_reason {
                        tracing::debug!("Completion finished: {}", reason);
                        break 'outer;
                    }
                }
            }

            let rest = events.remainder();
            if !rest.trim().is_empty() && !rest.contains("[DONE]") {
                tracing::warn!("Discarding incomplete SSE event: {}", rest.trim());
            }
        })
    }
}
