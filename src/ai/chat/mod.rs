pub mod core;
pub mod db;
pub mod models;

pub use self::core::{Session, SessionBuilder};
pub use self::db::{Persist, SessionRecord, StoreError, TranscriptStore};
pub use self::models::{Transcript, Turn};
