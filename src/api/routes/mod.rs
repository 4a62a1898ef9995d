//! API routes module

pub mod chat;
pub mod recipe;

use std::sync::{Arc, RwLock};

use axum::{Router, routing::get};

use crate::api::public::WelcomeResponse;
use crate::api::state::AppState;

type SharedState = Arc<RwLock<AppState>>;

async fn welcome() -> axum::Json<WelcomeResponse> {
    axum::Json(WelcomeResponse {
        message: "Welcome to the Recipe Bot API".to_string(),
    })
}

/// Create the combined API router
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(welcome))
        // Recipe extraction starts a session
        .nest("/recipe", recipe::router())
        // Follow-up messages and history
        .merge(chat::router())
}
