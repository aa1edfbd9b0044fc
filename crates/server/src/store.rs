//! Session persistence
//!
//! Durable key-value store: one row per address. `intent`/`step` replace
//! wholesale on upsert while `data` scratch entries merge. Reads and
//! writes go through `spawn_blocking`; the per-address actor is the only
//! writer for its address, so rows never race.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use tokio::task;

use crate::db;
use crate::error::EngineError;
use crate::session::{Intent, Session, SessionData, SessionPatch};

#[derive(Clone)]
pub struct SessionStore {
    db_path: PathBuf,
}

impl SessionStore {
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    /// Load the session for an address, if one has ever been written.
    pub async fn get(&self, address: &str) -> Result<Option<Session>, EngineError> {
        let db_path = self.db_path.clone();
        let address = address.to_string();

        task::spawn_blocking(move || -> Result<Option<Session>, EngineError> {
            let conn = db::open(&db_path)?;
            let row: Option<(Option<String>, Option<String>, String, String)> = conn
                .query_row(
                    "SELECT intent, step, data, updated_at FROM sessions WHERE address = ?1",
                    params![address],
                    |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                    },
                )
                .optional()?;

            let Some((intent, step, data, updated_at)) = row else {
                return Ok(None);
            };

            let data: SessionData = serde_json::from_str(&data)?;
            let updated_at = updated_at
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| Utc::now());

            Ok(Some(Session {
                address,
                intent: intent.as_deref().and_then(Intent::parse),
                step,
                data,
                updated_at,
            }))
        })
        .await?
    }

    /// Write the full session state for its address.
    pub async fn save(&self, session: &Session) -> Result<(), EngineError> {
        let db_path = self.db_path.clone();
        let address = session.address.clone();
        let intent = session.intent.map(|i| i.as_str().to_string());
        let step = session.step.clone();
        let data = serde_json::to_string(&session.data)?;
        let updated_at = session.updated_at.to_rfc3339();

        task::spawn_blocking(move || -> Result<(), EngineError> {
            let conn = db::open(&db_path)?;
            conn.execute(
                "INSERT INTO sessions (address, intent, step, data, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(address) DO UPDATE SET
                   intent = excluded.intent,
                   step = excluded.step,
                   data = excluded.data,
                   updated_at = excluded.updated_at",
                params![address, intent, step, data, updated_at],
            )?;
            Ok(())
        })
        .await?
    }

    /// Merge a partial update into the stored session (creating it if
    /// absent) and return the result. `updated_at` is refreshed.
    pub async fn upsert(
        &self,
        address: &str,
        patch: SessionPatch,
    ) -> Result<Session, EngineError> {
        let mut session = self
            .get(address)
            .await?
            .unwrap_or_else(|| Session::new(address));
        session.apply(patch);
        self.save(&session).await?;
        Ok(session)
    }

    /// Reset the stored session to the null/null/{} state.
    pub async fn clear(&self, address: &str) -> Result<(), EngineError> {
        let db_path = self.db_path.clone();
        let address = address.to_string();
        let updated_at = Utc::now().to_rfc3339();

        task::spawn_blocking(move || -> Result<(), EngineError> {
            let conn = db::open(&db_path)?;
            conn.execute(
                "UPDATE sessions SET intent = NULL, step = NULL, data = '{}', updated_at = ?1
                 WHERE address = ?2",
                params![updated_at, address],
            )?;
            Ok(())
        })
        .await?
    }
}
