use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub db_path: String,
    pub static_path: String,
    pub openai_model: String,
    pub openai_api_hostname: String,
    pub openai_api_key: String,
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let storage_path = env::var("RECIPEBOT_STORAGE_PATH").unwrap_or("./".to_string());
        let db_path = format!("{}/db", storage_path.trim_end_matches('/'));
        let static_path =
            env::var("RECIPEBOT_STATIC_PATH").unwrap_or_else(|_| "./frontend/build".to_string());
        let openai_api_hostname = env::var("RECIPEBOT_LLM_HOST")
            .unwrap_or_else(|_| "https://api.openai.com".to_string());
        let openai_api_key =
            env::var("OPENAI_API_KEY").unwrap_or_else(|_| "thiswontworkforopenai".to_string());
        let openai_model =
            env::var("RECIPEBOT_LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let request_timeout_secs = env::var("RECIPEBOT_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60 * 5);

        Self {
            db_path,
            static_path,
            openai_api_hostname,
            openai_api_key,
            openai_model,
            request_timeout_secs,
        }
    }
}
