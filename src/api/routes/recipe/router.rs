//! Router for the recipe extraction API

use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};

use super::public;
use crate::ai::recipe::{HttpPageFetcher, RecipeBot};
use crate::api::public::ApiError;
use crate::api::state::AppState;
use crate::api::utils::{NextTurn, stream_turn};
use crate::openai::OpenAiClient;

type SharedState = Arc<RwLock<AppState>>;

/// Start a new session by extracting the recipe at a URL and stream
/// the result
async fn extract_recipe(
    State(state): State<SharedState>,
    axum::Json(payload): axum::Json<public::RecipeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let url = payload.url.trim().to_string();
    if url.is_empty() {
        return Ok((StatusCode::BAD_REQUEST, "Missing url").into_response());
    }

    let (store, config) = {
        let shared_state = state.read().expect("Unable to read share state");
        (shared_state.store(), shared_state.config.clone())
    };
    let fetcher = HttpPageFetcher::new(Duration::from_secs(config.request_timeout_secs));
    let client = OpenAiClient::from_config(&config);

    // Fetch up front so a bad URL fails the request instead of the
    // stream. Nothing is saved in that case.
    let mut bot = RecipeBot::new(&config.openai_model);
    bot.load_source(&fetcher, &url).await?;
    tracing::info!("Starting session {} for {}", bot.id(), url);

    let turn = NextTurn::Extract {
        fetcher,
        url,
        annotations: payload.annotations,
    };
    Ok(stream_turn(store, client, bot, turn, payload.mode))
}

/// Create the recipe router
pub fn router() -> Router<SharedState> {
    Router::new().route("/", post(extract_recipe))
}
