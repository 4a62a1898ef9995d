use tokio_rusqlite::Connection;

use crate::ai::chat::TranscriptStore;
use crate::core::AppConfig;

pub struct AppState {
    pub db: Connection,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(db: Connection, config: AppConfig) -> Self {
        Self { db, config }
    }

    pub fn store(&self) -> TranscriptStore {
        TranscriptStore::new(&self.db)
    }
}
