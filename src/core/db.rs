//! SQLite connection setup and schema management.

use std::fs;
use std::path::Path;

use anyhow::{Error, Result};
use tokio_rusqlite::Connection;

const DB_FILE_NAME: &str = "recipebot.db";

/// Open an async connection to the database that lives in the
/// `db_path` directory, creating the directory when it's missing.
pub async fn async_db(db_path: &str) -> Result<Connection, Error> {
    fs::create_dir_all(db_path)?;
    let db_file = Path::new(db_path).join(DB_FILE_NAME);
    let db = Connection::open(db_file).await?;
    Ok(db)
}

/// Create every table the app needs. Safe to run on every start.
pub fn initialize_db(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS session_record (
            id TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
}
