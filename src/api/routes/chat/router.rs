//! Router for the chat API

use std::sync::{Arc, RwLock};

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use super::public;
use crate::ai::chat::{StoreError, TranscriptStore};
use crate::ai::recipe::RecipeBot;
use crate::api::public::ApiError;
use crate::api::state::AppState;
use crate::api::utils::{NextTurn, stream_turn};
use crate::openai::OpenAiClient;

type SharedState = Arc<RwLock<AppState>>;

/// Loads a session or explains why it can't be used.
async fn find_session(store: &TranscriptStore, id: &str) -> Result<RecipeBot, Response> {
    match store.load::<RecipeBot>(id).await {
        Ok(Some(bot)) => Ok(bot),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            format!("Chat session {} not found", id),
        )
            .into_response()),
        Err(e) if e.downcast_ref::<StoreError>().is_some() => Err((
            StatusCode::NOT_FOUND,
            format!("Chat session {} could not be restored", id),
        )
            .into_response()),
        Err(e) => Err(ApiError::from(e).into_response()),
    }
}

/// Add a message to an existing session and stream the response
async fn chat_handler(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
    axum::Json(payload): axum::Json<public::ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.message.trim().is_empty() {
        return Ok((StatusCode::BAD_REQUEST, "Missing message").into_response());
    }

    let (store, config) = {
        let shared_state = state.read().expect("Unable to read share state");
        (shared_state.store(), shared_state.config.clone())
    };

    let bot = match find_session(&store, &session_id).await {
        Ok(bot) => bot,
        Err(resp) => return Ok(resp),
    };

    let client = OpenAiClient::from_config(&config);
    let turn = NextTurn::Chat {
        message: payload.message,
    };
    Ok(stream_turn(store, client, bot, turn, payload.mode))
}

/// Get the user visible history of a session
async fn chat_history(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let store = state.read().expect("Unable to read share state").store();

    let bot = match find_session(&store, &session_id).await {
        Ok(bot) => bot,
        Err(resp) => return Ok(resp),
    };

    Ok(axum::Json(public::ChatHistoryResponse {
        history: bot.history(),
        session_id,
    })
    .into_response())
}

/// Create the chat router
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/chat/{session_id}", post(chat_handler))
        .route("/chat_history/{session_id}", get(chat_history))
}
