use anyhow::{Error, Result};
use futures::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::schema::{OutputSchema, StructuredOutput};

/// How incremental output is reported while a response streams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// Raw text that arrived since the last chunk
    #[default]
    Delta,
    /// A snapshot of the whole response so far
    Partial,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Delta(String),
    Partial(Value),
    /// The final parsed response. Always the last chunk of a stream
    /// that didn't fail.
    Done(StructuredOutput),
}

/// Gates the raw text fragments from the model so that a chunk is only
/// emitted once everything received so far parses as a partial
/// response. Fragments that end mid-token are held back and merged
/// into the next chunk.
///
/// An error from `upstream` is passed along and ends the stream
/// without a `Done` chunk.
pub fn structured_stream(
    upstream: BoxStream<'static, Result<String, Error>>,
    schema: OutputSchema,
    mode: StreamMode,
) -> BoxStream<'static, Result<StreamChunk, Error>> {
    Box::pin(async_stream::try_stream! {
        let mut upstream = upstream;
        let mut content = String::new();
        let mut pending = String::new();

        while let Some(fragment) = upstream.next().await {
            let fragment = fragment?;
            if fragment.is_empty() {
                continue;
            }
            content.push_str(&fragment);
            pending.push_str(&fragment);

            let Some(snapshot) = schema.parse_partial(&content) else {
                tracing::trace!("Holding back unparseable fragment {:?}", fragment);
                continue;
            };

            match mode {
                StreamMode::Delta => {
                    yield StreamChunk::Delta(std::mem::take(&mut pending));
                }
                StreamMode::Partial => {
                    pending.clear();
                    yield StreamChunk::Partial(snapshot);
                }
            }
        }

        let output = schema.parse(&content)?;

        // Whitespace after the closing brace never makes the text any
        // more parseable so it could still be pending
        if mode == StreamMode::Delta && !pending.is_empty() {
            yield StreamChunk::Delta(std::mem::take(&mut pending));
        }

        tracing::debug!("Structured response complete ({} bytes)", content.len());
        yield StreamChunk::Done(output);
    })
}
