//! Structured output from a model that streams JSON text.

pub mod partial;
mod schema;
mod stream;

pub use schema::{
    ConversationalResponse, OutputSchema, StructuredError, StructuredOutput, StructuredResponse,
};
pub use stream::{StreamChunk, StreamMode, structured_stream};
