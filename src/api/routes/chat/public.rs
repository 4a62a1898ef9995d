//! Public types for the chat API
use serde::{Deserialize, Serialize};

use crate::ai::chat::Turn;
use crate::ai::structured::StreamMode;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub mode: StreamMode,
}

#[derive(Serialize, Deserialize)]
pub struct ChatHistoryResponse {
    pub session_id: String,
    pub history: Vec<Turn>,
}
