//! Durable storage for sessions, keyed by session ID.
//!
//! Each session is stored as a single JSON document. Documents carry a
//! `version` tag so the layout can change without breaking sessions
//! saved by an older build.
use anyhow::{Error, Result};
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::Connection;

use super::core::Session;
use super::models::Turn;
use crate::ai::recipe::PageSource;
use crate::ai::structured::OutputSchema;
use crate::core::db::initialize_db;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Session {id} could not be restored: {source}")]
    Corrupt {
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Session {id} could not be restored: {reason}")]
    Incompatible { id: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecordV1 {
    pub id: String,
    pub output_schema: OutputSchema,
    pub model: String,
    pub transcript: Vec<Turn>,
    #[serde(default)]
    pub source: Option<PageSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "version")]
pub enum SessionRecord {
    #[serde(rename = "1")]
    V1(SessionRecordV1),
}

/// Anything that can be saved to and restored from a `TranscriptStore`.
pub trait Persist: Sized {
    fn session_id(&self) -> &str;
    fn to_record(&self) -> SessionRecord;
    fn from_record(record: SessionRecord) -> Result<Self, StoreError>;
}

impl Persist for Session {
    fn session_id(&self) -> &str {
        &self.id
    }

    fn to_record(&self) -> SessionRecord {
        SessionRecord::V1(SessionRecordV1 {
            id: self.id.clone(),
            output_schema: self.output_schema(),
            model: self.model().to_string(),
            transcript: self.transcript().turns().to_vec(),
            source: None,
        })
    }

    fn from_record(record: SessionRecord) -> Result<Self, StoreError> {
        let SessionRecord::V1(record) = record;
        let session = Session::builder(&record.model, record.output_schema)
            .id(&record.id)
            .transcript(record.transcript)
            .build();
        Ok(session)
    }
}

#[derive(Clone)]
pub struct TranscriptStore {
    db: Connection,
}

impl TranscriptStore {
    pub fn new(db: &Connection) -> Self {
        Self { db: db.clone() }
    }

    /// Creates the backing table if it doesn't exist yet.
    pub async fn initialize(&self) -> Result<(), Error> {
        self.db
            .call(|conn| {
                initialize_db(conn)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Writes the full state of `item`, replacing anything previously
    /// saved under the same ID.
    pub async fn save(&self, item: &impl Persist) -> Result<(), Error> {
        let id = item.session_id().to_string();
        let data = serde_json::to_string(&item.to_record())?;
        let updated_at = chrono::Utc::now().to_rfc3339();

        let s_id = id.clone();
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO session_record (id, data, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
                    [s_id, data, updated_at],
                )?;
                Ok(())
            })
            .await?;

        tracing::info!("Saved session {}", id);
        Ok(())
    }

    /// Returns `Ok(None)` when nothing was saved under `id`. A record
    /// that exists but can't be read back is an error.
    pub async fn load<T: Persist>(&self, id: &str) -> Result<Option<T>, Error> {
        let s_id = id.to_owned();
        let data: Option<String> = self
            .db
            .call(move |conn| {
                let result = conn
                    .query_row(
                        "SELECT data FROM session_record WHERE id = ?1",
                        [s_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(result)
            })
            .await?;

        let Some(data) = data else {
            return Ok(None);
        };

        let record: SessionRecord =
            serde_json::from_str(&data).map_err(|source| StoreError::Corrupt {
                id: id.to_string(),
                source,
            })?;
        let item = T::from_record(record)
            .inspect_err(|e| tracing::error!("Failed to restore session: {}", e))?;
        Ok(Some(item))
    }
}
