//! Public types for the recipe API
use serde::Deserialize;

use crate::ai::structured::StreamMode;

#[derive(Deserialize)]
pub struct RecipeRequest {
    pub url: String,
    pub annotations: String,
    #[serde(default)]
    pub mode: StreamMode,
}
