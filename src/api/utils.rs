use std::pin::Pin;
use std::task::{Context, Poll};

use anyhow::Error;
use axum::body::Body;
use axum::response::{IntoResponse, Response};
use futures_util::{Stream, StreamExt};
use http::header;
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::ai::chat::TranscriptStore;
use crate::ai::recipe::{HttpPageFetcher, RecipeBot};
use crate::ai::structured::{StreamChunk, StreamMode};
use crate::api::public::SessionMetadata;
use crate::openai::OpenAiClient;

/// Wraps a response body stream and signals `notifier` when it gets
/// dropped, which is how we find out the client went away.
pub struct DetectDisconnect<S> {
    stream: S,
    notifier: broadcast::Sender<()>,
}

impl<S> DetectDisconnect<S> {
    pub fn new(stream: S, notifier: broadcast::Sender<()>) -> Self {
        Self { stream, notifier }
    }
}

impl<S: Stream + Unpin> Stream for DetectDisconnect<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.stream).poll_next(cx)
    }
}

impl<S> Drop for DetectDisconnect<S> {
    fn drop(&mut self) {
        let _ = self.notifier.send(());
    }
}

/// Writes a session response as one JSON array streamed piece by
/// piece: `[{"session_id": "..."}, ...]`.
///
/// In delta mode the raw text from the model is written as is, so the
/// second element is the structured response itself. In partial mode
/// each snapshot is its own element.
pub struct ArrayFramer {
    mode: StreamMode,
    started: bool,
}

impl ArrayFramer {
    pub fn new(mode: StreamMode) -> Self {
        Self {
            mode,
            started: false,
        }
    }

    pub fn open(&self, session_id: &str) -> String {
        let metadata = SessionMetadata {
            session_id: session_id.to_string(),
        };
        format!("[{}", json!(metadata))
    }

    /// Text to write for `chunk`. The final chunk closes the array.
    pub fn frame(&mut self, chunk: &StreamChunk) -> String {
        match chunk {
            StreamChunk::Delta(text) if self.started => text.to_string(),
            StreamChunk::Delta(text) => {
                self.started = true;
                format!(",{}", text)
            }
            StreamChunk::Partial(snapshot) => {
                self.started = true;
                format!(",{}", snapshot)
            }
            StreamChunk::Done(_) => "]".to_string(),
        }
    }

    /// Text that reports `err` and closes the array. Returns `None` when
    /// the response is in the middle of a raw JSON value that can't be
    /// closed, in which case the body has to be aborted instead.
    pub fn error(&self, err: &Error) -> Option<String> {
        if self.mode == StreamMode::Delta && self.started {
            return None;
        }
        let event = json!({"type": "error", "message": err.to_string()});
        Some(format!(",{}]", event))
    }
}

/// What a streaming request asks the bot to do next.
pub enum NextTurn {
    Extract {
        fetcher: HttpPageFetcher,
        url: String,
        annotations: String,
    },
    Chat {
        message: String,
    },
}

/// Runs `turn` in a background task and streams the framed response
/// back. The session is saved once the task is done, including when
/// the model fails or the client disconnects.
pub fn stream_turn(
    store: TranscriptStore,
    client: OpenAiClient,
    mut bot: RecipeBot,
    turn: NextTurn,
    mode: StreamMode,
) -> Response {
    let (tx, rx) = mpsc::unbounded_channel::<Result<String, Error>>();
    let (disconnect_notifier, mut disconnect_receiver) = broadcast::channel::<()>(1);
    let body_stream = DetectDisconnect::new(UnboundedReceiverStream::new(rx), disconnect_notifier);

    tokio::spawn(async move {
        let session_id = bot.id().to_string();
        let mut framer = ArrayFramer::new(mode);
        let _ = tx.send(Ok(framer.open(&session_id)));

        {
            let chunks = match &turn {
                NextTurn::Extract {
                    fetcher,
                    url,
                    annotations,
                } => bot.extract(&client, fetcher, url, annotations, mode).await,
                NextTurn::Chat { message } => Ok(bot.chat(&client, message, mode)),
            };

            let result = match chunks {
                Ok(mut chunks) => loop {
                    tokio::select! {
                        _ = disconnect_receiver.recv() => {
                            tracing::info!("Client disconnected from session {}", session_id);
                            break Ok(());
                        }
                        next = chunks.next() => match next {
                            Some(Ok(chunk)) => {
                                let _ = tx.send(Ok(framer.frame(&chunk)));
                            }
                            Some(Err(e)) => break Err(e),
                            None => break Ok(()),
                        }
                    }
                },
                Err(e) => Err(e),
            };

            if let Err(e) = result {
                tracing::error!("Session {} failed: {}. Root cause: {}", session_id, e, e.root_cause());
                let _ = match framer.error(&e) {
                    Some(text) => tx.send(Ok(text)),
                    None => tx.send(Err(e)),
                };
            }
        }

        // Close the response before writing to the DB
        drop(tx);

        if let Err(e) = store.save(&bot).await {
            tracing::error!("Failed to save session {}: {}", session_id, e);
        }
    });

    (
        [(header::CONTENT_TYPE, "application/json")],
        Body::from_stream(body_stream),
    )
        .into_response()
}
